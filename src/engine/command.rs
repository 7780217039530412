//! Master 命令：路由到某个子智能体的一条自然语言指令

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::engine::ListElement;
use crate::memory::id_like_tokens;

/// 子智能体领域
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Mail,
    Calendar,
    Messaging,
}

impl AgentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentKind::Mail => "mail",
            AgentKind::Calendar => "calendar",
            AgentKind::Messaging => "messaging",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub agent: AgentKind,
    pub text: String,
}

impl Command {
    pub fn new(agent: AgentKind, text: impl Into<String>) -> Self {
        Self {
            agent,
            text: text.into(),
        }
    }
}

/// 忽略大小写与多余空白
fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

impl ListElement for Command {
    fn same_operation(&self, other: &Self) -> bool {
        self.agent == other.agent && normalize(&self.text) == normalize(&other.text)
    }

    fn label(&self) -> String {
        let text: String = self.text.chars().take(60).collect();
        format!("{}: {}", self.agent, text)
    }

    fn referenced_ids(&self) -> Vec<String> {
        id_like_tokens(&self.text)
    }
}

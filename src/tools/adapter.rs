//! 服务适配器接口
//!
//! 每个领域（mail / calendar / messaging）一个适配器，声明自己的工具表（读 / 写、补偿工具），
//! 由 ToolExecutor 加超时调用。

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::engine::AgentKind;

/// 适配器调用失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("tool '{0}' timed out")]
    Timeout(String),
}

impl ToolError {
    /// 网络与超时值得重试；其余为终态
    pub fn is_retryable(&self) -> bool {
        matches!(self, ToolError::Network(_) | ToolError::Timeout(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolAccess {
    Read,
    Write,
}

/// 工具声明
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub access: ToolAccess,
    /// 参数示例（写入 prompt）
    pub parameters: Value,
    /// 写操作记入撤销台账时的类型
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_type: Option<String>,
    /// 补偿工具；存在即视为可撤销
    #[serde(skip_serializing_if = "Option::is_none")]
    pub undo_tool: Option<String>,
}

impl ToolSpec {
    pub fn read(name: &str, description: &str, parameters: Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            access: ToolAccess::Read,
            parameters,
            action_type: None,
            undo_tool: None,
        }
    }

    pub fn write(name: &str, description: &str, parameters: Value, action_type: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            access: ToolAccess::Write,
            parameters,
            action_type: Some(action_type.to_string()),
            undo_tool: None,
        }
    }

    pub fn undo_with(mut self, tool: &str) -> Self {
        self.undo_tool = Some(tool.to_string());
        self
    }

    pub fn is_write(&self) -> bool {
        self.access == ToolAccess::Write
    }

    pub fn is_reversible(&self) -> bool {
        self.undo_tool.is_some()
    }

    pub fn action_type(&self) -> &str {
        self.action_type.as_deref().unwrap_or(&self.name)
    }
}

/// 领域服务适配器
#[async_trait]
pub trait ServiceAdapter: Send + Sync {
    fn domain(&self) -> AgentKind;

    fn tools(&self) -> Vec<ToolSpec>;

    async fn execute(&self, tool: &str, params: &Map<String, Value>) -> Result<Value, ToolError>;
}

/// 从参数中取 `ids` 字符串数组
pub fn string_ids(params: &Map<String, Value>, key: &str) -> Result<Vec<String>, ToolError> {
    let items = params
        .get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| ToolError::InvalidParams(format!("'{key}' must be an array of ids")))?;
    let ids: Vec<String> = items
        .iter()
        .filter_map(|v| v.as_str().map(String::from))
        .collect();
    if ids.is_empty() {
        return Err(ToolError::InvalidParams(format!("'{key}' is empty")));
    }
    Ok(ids)
}

pub fn string_param<'a>(params: &'a Map<String, Value>, key: &str) -> Result<&'a str, ToolError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidParams(format!("missing '{key}'")))
}

//! 知识累积器
//!
//! Master 持有一段格式化文本（accumulated_knowledge），Sub-Agent 持有一个 map（working_data）。
//! 两者每轮都被 oracle 的输出整体替换；引擎负责的只有两件事：
//! 1. 新值丢掉了仍被待执行元素引用的 id 时，把旧值中对应的行 / 条目带回并告警
//! 2. 超出 token 预算时告警（不截断）

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::memory::{KnowledgeBudget, TokenEstimator};

static ID_TOKEN_RE: OnceLock<Option<Regex>> = OnceLock::new();

/// 文本中形如 id 的片段：长度 >= 4、含数字（如 msg_1042、evt-77a、19af3c）
pub fn id_like_tokens(text: &str) -> Vec<String> {
    let re = ID_TOKEN_RE.get_or_init(|| Regex::new(r"[A-Za-z0-9][A-Za-z0-9_\-]{3,}").ok());
    let Some(re) = re else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    re.find_iter(text)
        .map(|m| m.as_str())
        .filter(|t| t.chars().any(|c| c.is_ascii_digit()))
        .filter(|t| seen.insert(t.to_string()))
        .map(String::from)
        .collect()
}

/// 按 id 字符边界判断 text 是否包含 id（避免 m1 命中 m12）
fn contains_id(text: &str, id: &str) -> bool {
    text.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
        .any(|t| t == id)
}

/// 摘要相对原始内容的 token 缩减比例（0.0 ~ 1.0）
pub fn reduction_ratio(raw: &str, summary: &str) -> f64 {
    let raw_tokens = TokenEstimator::estimate(raw);
    if raw_tokens == 0 {
        return 0.0;
    }
    let summary_tokens = TokenEstimator::estimate(summary);
    1.0 - (summary_tokens as f64 / raw_tokens as f64).min(1.0)
}

/// 一次替换的结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KnowledgeReport {
    pub tokens: usize,
    pub over_budget: bool,
    /// 被带回的 id
    pub carried_forward: Vec<String>,
}

/// 新值中缺失、旧值中存在、且仍被待执行元素引用的 id
fn missing_ids(previous: &str, next: &str, pending_refs: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    pending_refs
        .iter()
        .filter(|id| contains_id(previous, id) && !contains_id(next, id))
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}

/// Master 的累积知识（文本）
#[derive(Debug, Clone, Default)]
pub struct KnowledgeAccumulator {
    text: String,
    budget: KnowledgeBudget,
}

impl KnowledgeAccumulator {
    pub fn new(budget: KnowledgeBudget) -> Self {
        Self {
            text: String::new(),
            budget,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }

    /// 整体替换；丢失的依赖行被追加回去
    pub fn update(&mut self, next: String, pending_refs: &[String]) -> KnowledgeReport {
        let missing = missing_ids(&self.text, &next, pending_refs);
        let mut next = next;
        if !missing.is_empty() {
            tracing::warn!(ids = ?missing, "knowledge update dropped ids still referenced by pending commands; carrying forward");
            let carried: Vec<&str> = self
                .text
                .lines()
                .filter(|line| missing.iter().any(|id| contains_id(line, id)))
                .collect();
            if !next.is_empty() && !next.ends_with('\n') {
                next.push('\n');
            }
            for line in carried {
                next.push_str(line);
                next.push('\n');
            }
        }

        let (tokens, over_budget) = self.budget.check(&next);
        if over_budget {
            tracing::warn!(tokens, max = self.budget.max_tokens(), "accumulated knowledge over budget");
        }
        self.text = next;
        KnowledgeReport {
            tokens,
            over_budget,
            carried_forward: missing,
        }
    }
}

/// Sub-Agent 的工作数据（map）
#[derive(Debug, Clone, Default)]
pub struct WorkingData {
    data: Map<String, Value>,
    budget: KnowledgeBudget,
}

impl WorkingData {
    pub fn new(budget: KnowledgeBudget) -> Self {
        Self {
            data: Map::new(),
            budget,
        }
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn to_json_string(&self) -> String {
        serde_json::to_string(&self.data).unwrap_or_else(|_| "{}".to_string())
    }

    /// 整体替换；丢失依赖 id 的旧条目被带回（键冲突时加 `_carried` 后缀）
    pub fn update(&mut self, next: Map<String, Value>, pending_refs: &[String]) -> KnowledgeReport {
        let previous = self.to_json_string();
        let next_text = serde_json::to_string(&next).unwrap_or_default();
        let missing = missing_ids(&previous, &next_text, pending_refs);

        let mut next = next;
        if !missing.is_empty() {
            tracing::warn!(ids = ?missing, "working data update dropped ids still referenced by queued tool calls; carrying forward");
            for (key, value) in &self.data {
                let serialized = value.to_string();
                if !missing.iter().any(|id| contains_id(&serialized, id) || contains_id(key, id)) {
                    continue;
                }
                let slot = if next.contains_key(key) {
                    format!("{key}_carried")
                } else {
                    key.clone()
                };
                next.insert(slot, value.clone());
            }
        }

        let (tokens, over_budget) = self
            .budget
            .check(&serde_json::to_string(&next).unwrap_or_default());
        if over_budget {
            tracing::warn!(tokens, max = self.budget.max_tokens(), "working data over budget");
        }
        self.data = next;
        KnowledgeReport {
            tokens,
            over_budget,
            carried_forward: missing,
        }
    }
}

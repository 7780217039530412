//! Sub-Agent 工具调用

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::engine::ListElement;

/// 一次具体的服务调用：工具名 + 参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    /// 给用户看的简短说明
    #[serde(default)]
    pub description: String,
}

impl ToolCall {
    pub fn new(tool: impl Into<String>, params: Value) -> Self {
        let params = match params {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            tool: tool.into(),
            params,
            description: String::new(),
        }
    }

    /// 参数里出现的条目 id
    pub fn affected_ids(&self) -> Vec<String> {
        ids_in_object(&self.params)
    }
}

/// `id` / `*_id` 取单值，`ids` / `*_ids` 取数组
pub fn ids_in_object(map: &Map<String, Value>) -> Vec<String> {
    let mut ids = Vec::new();
    for (key, value) in map {
        if key == "id" || key.ends_with("_id") {
            push_id(&mut ids, value);
        } else if key == "ids" || key.ends_with("_ids") {
            if let Value::Array(items) = value {
                for item in items {
                    push_id(&mut ids, item);
                }
            }
        }
    }
    ids
}

fn push_id(ids: &mut Vec<String>, value: &Value) {
    match value {
        Value::String(s) if !s.is_empty() => ids.push(s.clone()),
        Value::Number(n) => ids.push(n.to_string()),
        _ => {}
    }
}

impl ListElement for ToolCall {
    fn same_operation(&self, other: &Self) -> bool {
        self.tool == other.tool && self.params == other.params
    }

    fn label(&self) -> String {
        self.tool.clone()
    }

    fn referenced_ids(&self) -> Vec<String> {
        self.affected_ids()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_affected_ids_reads_id_keys() {
        let call = ToolCall::new(
            "archive_emails",
            json!({"ids": ["m1", "m2"], "thread_id": "t9", "query": "from:bob"}),
        );
        let mut ids = call.affected_ids();
        ids.sort();
        assert_eq!(ids, vec!["m1", "m2", "t9"]);
    }

    #[test]
    fn test_same_operation_compares_params() {
        let a = ToolCall::new("get_email", json!({"id": "m1"}));
        let b = ToolCall::new("get_email", json!({"id": "m1"}));
        let c = ToolCall::new("get_email", json!({"id": "m2"}));
        assert!(a.same_operation(&b));
        assert!(!a.same_operation(&c));
    }

    #[test]
    fn test_deserialize_without_params() {
        let call: ToolCall = serde_json::from_value(json!({"tool": "list_events"})).unwrap();
        assert!(call.params.is_empty());
        assert!(call.description.is_empty());
    }
}

//! Oracle 响应文档与 JSON Schema（schemars 自动生成）
//!
//! 每种请求都带上对应 tier 的 schema：Master 规划 / Master 重评估 / Sub-Agent 规划与重评估。

use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::engine::{AgentKind, ElementStatus, RiskLevel, Scope, ToolCall};

/// 请求分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    /// 只读查询
    Read,
    /// 含写操作
    Write,
    /// 读写混合
    Mixed,
    /// 纯对话，无需调用子智能体
    Chat,
}

/// Master 命令列表中的一项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CommandDoc {
    /// 路由到的子智能体
    pub agent: AgentKind,
    /// 交给子智能体的自然语言指令
    pub text: String,
    /// 执行顺序（从 1 开始，唯一）
    pub order: u32,
    /// 重评估时回报的状态；首轮规划可省略
    #[serde(default)]
    pub status: Option<ElementStatus>,
}

/// Master 首轮规划
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MasterPlanDoc {
    pub command_list: Vec<CommandDoc>,
    pub query_type: QueryType,
    pub cross_account: bool,
    /// command_list 为空时直接回复用户
    #[serde(default)]
    pub natural_language_response: Option<String>,
}

/// Master 重评估：整表替换 + 累积知识
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MasterReassessDoc {
    pub command_list: Vec<CommandDoc>,
    /// 只保留决策相关的事实（id、计数、标量），不保留原始载荷
    pub accumulated_knowledge: String,
    pub is_complete: bool,
    #[serde(default)]
    pub natural_language_response: Option<String>,
}

/// 待确认动作（needs_confirmation = true 时给出）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PendingActionDoc {
    #[serde(rename = "type")]
    pub action_type: String,
    pub count: u32,
    #[serde(default)]
    pub confirmed: bool,
    pub risk_level: RiskLevel,
    /// 省略时按 count 推断（count > 1 为 bulk）
    #[serde(default)]
    pub scope: Option<Scope>,
    /// 省略时视为可撤销
    #[serde(default)]
    pub reversible: Option<bool>,
    #[serde(default)]
    pub preview: Option<String>,
}

/// oracle 对上一次写操作的描述（仅作交叉核对，台账以引擎记录为准）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LastActionDoc {
    #[serde(rename = "type")]
    pub action_type: String,
    pub count: u32,
    #[serde(default)]
    pub reversible: bool,
}

/// Sub-Agent 规划与重评估共用的文档
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SubAgentDoc {
    /// 本轮完整替换的工作数据
    pub working_data: Map<String, Value>,
    /// 剩余待执行的工具调用（已执行的不再列出）
    pub tool_call_list: Vec<ToolCall>,
    pub needs_confirmation: bool,
    pub natural_language_response: String,
    pub is_complete: bool,
    #[serde(default)]
    pub pending_action: Option<PendingActionDoc>,
    #[serde(default)]
    pub last_action: Option<LastActionDoc>,
}

fn to_schema_value<T: JsonSchema>() -> Value {
    serde_json::to_value(schema_for!(T)).unwrap_or(Value::Null)
}

pub fn master_plan_schema() -> Value {
    to_schema_value::<MasterPlanDoc>()
}

pub fn master_reassess_schema() -> Value {
    to_schema_value::<MasterReassessDoc>()
}

pub fn sub_agent_schema() -> Value {
    to_schema_value::<SubAgentDoc>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sub_agent_schema_requires_tier_fields() {
        let schema = sub_agent_schema();
        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|v| v.as_str())
            .collect();
        for field in [
            "working_data",
            "tool_call_list",
            "needs_confirmation",
            "natural_language_response",
            "is_complete",
        ] {
            assert!(required.contains(&field), "missing {field}");
        }
        assert!(!required.contains(&"pending_action"));
        assert!(schema["properties"]["pending_action"].is_object());
    }

    #[test]
    fn test_master_plan_schema_fields() {
        let schema = master_plan_schema();
        for field in ["command_list", "query_type", "cross_account"] {
            assert!(schema["properties"][field].is_object(), "missing {field}");
        }
    }

    #[test]
    fn test_pending_action_doc_uses_type_key() {
        let doc: PendingActionDoc = serde_json::from_value(json!({
            "type": "bulk_archive",
            "count": 47,
            "confirmed": false,
            "risk_level": "medium"
        }))
        .unwrap();
        assert_eq!(doc.action_type, "bulk_archive");
        assert_eq!(doc.scope, None);
        assert_eq!(doc.reversible, None);
    }
}

//! Oracle 指令构造：Master 规划 / Master 重评估 / Sub-Agent 规划与重评估
//!
//! 文案本身不是控制逻辑；这里只负责把当前控制状态拼进 user 指令。

use crate::engine::{AgentKind, Command, Entry, ListEngine, PendingAction, ToolCall};
use crate::tools::{ToolAccess, ToolSpec};

pub const MASTER_SYSTEM: &str = "You are the planning tier of a personal assistant that acts on \
the user's mail, calendar and messaging accounts. Break the request into an ordered command list, \
one command per sub-agent step. Keep accumulated_knowledge to decision-relevant facts only: ids, \
counts, names, dates. Never copy raw message bodies. Set is_complete only when every command is \
resolved.";

pub fn sub_agent_system(kind: AgentKind) -> String {
    format!(
        "You are the {kind} execution tier. Turn the command into concrete tool calls. \
Bulk or irreversible writes need needs_confirmation=true with a pending_action \
(type, count, risk_level, scope, reversible, preview). Keep working_data to ids, counts and \
scalars. Set is_complete only when no tool call remains."
    )
}

fn render_commands(entries: &[Entry<Command>]) -> String {
    if entries.is_empty() {
        return "(none)".to_string();
    }
    entries
        .iter()
        .map(|e| {
            let mut line = format!("{}. [{}] {}: {}", e.order, e.status, e.element.agent, e.element.text);
            if let Some(reason) = &e.failure {
                line.push_str(&format!(" ({reason})"));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_tool_calls(entries: &[Entry<ToolCall>]) -> String {
    if entries.is_empty() {
        return "(none)".to_string();
    }
    entries
        .iter()
        .map(|e| {
            let params = serde_json::to_string(&e.element.params).unwrap_or_default();
            format!("{}. [{}] {} {}", e.order, e.status, e.element.tool, params)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_tools(specs: &[&ToolSpec]) -> String {
    specs
        .iter()
        .map(|s| {
            let access = match s.access {
                ToolAccess::Read => "read".to_string(),
                ToolAccess::Write if s.is_reversible() => "write, reversible".to_string(),
                ToolAccess::Write => "write, irreversible".to_string(),
            };
            format!("- {} ({access}): {} params={}", s.name, s.description, s.parameters)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// agents 为 (领域, 工具名) 列表
pub fn master_plan(user_text: &str, agents: &[(AgentKind, Vec<String>)], knowledge: &str) -> String {
    let agents: Vec<String> = agents
        .iter()
        .map(|(kind, tools)| format!("- {kind}: {}", tools.join(", ")))
        .collect();
    format!(
        "Available agents:\n{}\n\nKnown facts:\n{}\n\nUser request:\n{}",
        agents.join("\n"),
        if knowledge.is_empty() { "(none)" } else { knowledge },
        user_text
    )
}

pub fn master_reassess(
    user_text: &str,
    commands: &ListEngine<Command>,
    knowledge: &str,
    finished: &str,
    result: &str,
) -> String {
    format!(
        "User request:\n{user_text}\n\nCommand list:\n{}\n\nKnown facts:\n{}\n\n\
Command just finished: {finished}\nResult: {result}\n\n\
Return the full updated command list (keep resolved commands with their status), \
the updated accumulated_knowledge and is_complete.",
        render_commands(commands.entries()),
        if knowledge.is_empty() { "(none)" } else { knowledge },
    )
}

pub fn sub_agent_plan(command: &str, tools: &str, working_data: &str) -> String {
    format!("Tools:\n{tools}\n\nWorking data:\n{working_data}\n\nCommand:\n{command}")
}

pub fn sub_agent_reassess(
    command: &str,
    tools: &str,
    calls: &ListEngine<ToolCall>,
    working_data: &str,
    finished: &str,
    result: &str,
) -> String {
    format!(
        "Tools:\n{tools}\n\nCommand:\n{command}\n\nTool calls so far:\n{}\n\nWorking data:\n{working_data}\n\n\
Tool call just finished: {finished}\nResult: {result}\n\n\
Return the remaining tool calls, the replaced working_data and the flags.",
        render_tool_calls(calls.entries()),
    )
}

pub fn sub_agent_confirmed(
    command: &str,
    tools: &str,
    calls: &ListEngine<ToolCall>,
    working_data: &str,
    action: &PendingAction,
) -> String {
    format!(
        "Tools:\n{tools}\n\nCommand:\n{command}\n\nTool calls so far:\n{}\n\nWorking data:\n{working_data}\n\n\
The user CONFIRMED the pending action '{}' ({} item(s)). Queue the confirmed write now; \
do not ask for confirmation again.",
        render_tool_calls(calls.entries()),
        action.action_type,
        action.count,
    )
}

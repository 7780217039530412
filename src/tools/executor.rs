//! 工具执行器
//!
//! 持有一个领域适配器与超时，execute(call) 在超时内调用 adapter.execute；
//! 未声明的工具不会到达适配器；每次调用输出结构化审计日志（JSON）。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::timeout;

use crate::engine::ToolCall;
use crate::tools::{ServiceAdapter, ToolError, ToolSpec};

/// 一次调用的结果：{success, result|error, execution_time_ms}
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub tool: String,
    pub result: Result<Value, ToolError>,
    pub execution_time_ms: u64,
}

impl ToolOutcome {
    pub fn success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn timed_out(&self) -> bool {
        matches!(self.result, Err(ToolError::Timeout(_)))
    }
}

pub struct ToolExecutor {
    adapter: Arc<dyn ServiceAdapter>,
    specs: HashMap<String, ToolSpec>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(adapter: Arc<dyn ServiceAdapter>, timeout_secs: u64) -> Self {
        let specs = adapter
            .tools()
            .into_iter()
            .map(|spec| (spec.name.clone(), spec))
            .collect();
        Self {
            adapter,
            specs,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn spec(&self, tool: &str) -> Option<&ToolSpec> {
        self.specs.get(tool)
    }

    /// 按名称排序的工具表（写入 prompt）
    pub fn specs(&self) -> Vec<&ToolSpec> {
        let mut specs: Vec<&ToolSpec> = self.specs.values().collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    pub fn is_write(&self, call: &ToolCall) -> bool {
        self.spec(&call.tool).is_some_and(ToolSpec::is_write)
    }

    /// 在超时内执行；输出 JSON 审计日志
    pub async fn execute(&self, call: &ToolCall) -> ToolOutcome {
        let start = Instant::now();
        let args_preview = args_preview(&call.params);

        let result = if self.specs.contains_key(&call.tool) {
            match timeout(self.timeout, self.adapter.execute(&call.tool, &call.params)).await {
                Ok(r) => r,
                Err(_) => Err(ToolError::Timeout(call.tool.clone())),
            }
        } else {
            Err(ToolError::UnknownTool(call.tool.clone()))
        };

        let outcome = match &result {
            Ok(_) => "ok",
            Err(ToolError::Timeout(_)) => "timeout",
            Err(_) => "error",
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = serde_json::json!({
            "event": "tool_audit",
            "domain": self.adapter.domain().as_str(),
            "tool": call.tool,
            "ok": result.is_ok(),
            "outcome": outcome,
            "duration_ms": duration_ms,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        ToolOutcome {
            tool: call.tool.clone(),
            result,
            execution_time_ms: duration_ms,
        }
    }
}

fn args_preview(args: &serde_json::Map<String, Value>) -> String {
    let s = serde_json::to_string(args).unwrap_or_default();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{Email, InMemoryMailbox};
    use serde_json::json;

    fn mailbox() -> Arc<InMemoryMailbox> {
        Arc::new(InMemoryMailbox::new(vec![Email::new(
            "m1",
            "news@example.com",
            "Weekly digest",
        )]))
    }

    #[tokio::test]
    async fn test_unknown_tool_does_not_reach_adapter() {
        let mb = mailbox();
        let executor = ToolExecutor::new(mb.clone(), 5);
        let outcome = executor
            .execute(&ToolCall::new("format_disk", json!({})))
            .await;
        assert_eq!(outcome.result, Err(ToolError::UnknownTool("format_disk".into())));
        assert!(mb.calls().is_empty());
    }

    #[tokio::test]
    async fn test_execute_success() {
        let executor = ToolExecutor::new(mailbox(), 5);
        let outcome = executor
            .execute(&ToolCall::new("get_email", json!({"id": "m1"})))
            .await;
        assert!(outcome.success());
        assert_eq!(outcome.result.unwrap()["subject"], "Weekly digest");
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let mb = mailbox();
        mb.set_delay(Some(Duration::from_millis(200)));
        let executor = ToolExecutor::new(mb.clone(), 5).with_timeout(Duration::from_millis(20));
        let outcome = executor
            .execute(&ToolCall::new("archive_emails", json!({"ids": ["m1"]})))
            .await;
        assert!(outcome.timed_out());
        assert!(!outcome.success());
    }

    #[test]
    fn test_is_write() {
        let executor = ToolExecutor::new(mailbox(), 5);
        assert!(executor.is_write(&ToolCall::new("archive_emails", json!({}))));
        assert!(!executor.is_write(&ToolCall::new("search_emails", json!({}))));
        assert!(!executor.is_write(&ToolCall::new("nope", json!({}))));
    }
}

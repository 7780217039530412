//! Sub-Agent：单领域执行层
//!
//! 持有工具调用列表、工作数据、确认闸门与撤销台账。每一轮 oracle 输出先做闸门一致性校验，
//! 再原子地替换列表；写操作成功后记入撤销台账。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;

use crate::agents::{prompts, EngineSettings};
use crate::core::{AgentError, ConsistencyError, ElementOutcome, Tier, TierStop};
use crate::engine::{
    ids_in_object, validate_round, AgentKind, ConfirmOutcome, ConfirmationGate, ElementStatus,
    Entry, LastAction, ListEngine, PendingAction, Scope, ToolCall, UndoLedger, WriteIntent,
};
use crate::llm::{sub_agent_schema, OracleRequest, RetryingOracle, SubAgentDoc};
use crate::memory::WorkingData;
use crate::tools::{ServiceAdapter, ToolError, ToolExecutor};

pub struct SubAgent {
    kind: AgentKind,
    oracle: Arc<RetryingOracle>,
    executor: ToolExecutor,
    settings: EngineSettings,
    calls: ListEngine<ToolCall>,
    working: WorkingData,
    gate: ConfirmationGate,
    ledger: UndoLedger,
    /// 当前命令；None 表示空闲
    command: Option<String>,
    response: String,
    complete: bool,
    declined: bool,
    now: DateTime<Utc>,
}

impl SubAgent {
    pub fn new(
        adapter: Arc<dyn ServiceAdapter>,
        oracle: Arc<RetryingOracle>,
        settings: EngineSettings,
    ) -> Self {
        let kind = adapter.domain();
        Self {
            kind,
            oracle,
            executor: ToolExecutor::new(adapter, settings.tool_timeout_secs),
            calls: ListEngine::new(settings.max_element_retries),
            working: WorkingData::new(settings.knowledge_budget),
            gate: ConfirmationGate::new(),
            ledger: UndoLedger::new(settings.undo_window),
            settings,
            command: None,
            response: String::new(),
            complete: false,
            declined: false,
            now: Utc::now(),
        }
    }

    pub fn kind(&self) -> AgentKind {
        self.kind
    }

    pub fn is_active(&self) -> bool {
        self.command.is_some()
    }

    pub fn gate(&self) -> &ConfirmationGate {
        &self.gate
    }

    pub fn pending_action(&self) -> Option<&PendingAction> {
        self.gate.pending()
    }

    pub fn last_action(&self) -> Option<&LastAction> {
        self.ledger.last()
    }

    pub fn working_data(&self) -> &WorkingData {
        &self.working
    }

    pub fn set_now(&mut self, now: DateTime<Utc>) {
        self.now = now;
    }

    /// 开始一条新命令
    pub fn begin(&mut self, command: &str) {
        tracing::info!(agent = %self.kind, command, "sub-agent begin");
        self.command = Some(command.to_string());
        self.calls.clear();
        self.working.clear();
        self.gate.reset();
        self.response.clear();
        self.complete = false;
        self.declined = false;
    }

    /// 放弃当前命令（轮次中止或新请求）；撤销台账保留
    pub fn reset(&mut self) {
        self.command = None;
        self.calls.clear();
        self.working.clear();
        self.gate.reset();
        self.response.clear();
        self.complete = false;
        self.declined = false;
    }

    /// 命令结束，返回交给 Master 的结果
    pub fn finish(&mut self, stop: TierStop) -> ElementOutcome {
        let response = std::mem::take(&mut self.response);
        let outcome = match stop {
            TierStop::Complete if self.declined => {
                ElementOutcome::failed(format!("declined by user. {response}").trim().to_string())
            }
            TierStop::Complete => ElementOutcome::Completed(response),
            TierStop::IterationLimit { iterations } => ElementOutcome::failed(format!(
                "{} agent stopped after {iterations} iterations without finishing",
                self.kind
            )),
            TierStop::AwaitingConfirmation => return ElementOutcome::Suspended,
        };
        self.reset();
        outcome
    }

    fn command_text(&self) -> &str {
        self.command.as_deref().unwrap_or_default()
    }

    fn tools_text(&self) -> String {
        prompts::render_tools(&self.executor.specs())
    }

    fn request(&self, user: String) -> OracleRequest {
        OracleRequest::new(prompts::sub_agent_system(self.kind), user, sub_agent_schema())
            .with_options(self.settings.oracle_options.clone())
    }

    pub async fn plan_initial(&mut self) -> Result<(), AgentError> {
        let user = prompts::sub_agent_plan(
            self.command_text(),
            &self.tools_text(),
            &self.working.to_json_string(),
        );
        let doc: SubAgentDoc = self.oracle.invoke_as(&self.request(user)).await?;
        self.apply_doc(doc, true)
    }

    /// 本轮排队写操作的闸门意图；已完成的同一操作不再计入
    fn write_intents(&self, calls: &[ToolCall]) -> Vec<WriteIntent> {
        calls
            .iter()
            .filter(|c| self.calls.known_status(c) != Some(ElementStatus::Completed))
            .filter_map(|c| {
                let spec = self.executor.spec(&c.tool).filter(|s| s.is_write())?;
                let ids = c.affected_ids();
                Some(WriteIntent {
                    tool: c.tool.clone(),
                    action_type: spec.action_type().to_string(),
                    count: ids.len().max(1) as u32,
                    ids,
                    reversible: spec.is_reversible(),
                })
            })
            .collect()
    }

    /// 校验并应用一轮 oracle 输出；失败时控制状态保持不变
    fn apply_doc(&mut self, doc: SubAgentDoc, initial: bool) -> Result<(), AgentError> {
        if doc.is_complete && doc.needs_confirmation {
            return Err(ConsistencyError::CompleteWhileAwaiting.into());
        }
        let pending = doc.pending_action.as_ref().map(PendingAction::from_doc);
        if let Some(p) = &pending {
            if p.scope == Scope::Bulk && p.count <= 1 {
                tracing::warn!(action = %p.action_type, count = p.count, "bulk scope reported for a single item");
            }
        }
        let intents = self.write_intents(&doc.tool_call_list);
        validate_round(doc.needs_confirmation, pending.as_ref(), &self.gate, &intents)?;

        let base = if initial { 1 } else { self.calls.next_order() };
        let entries: Vec<Entry<ToolCall>> = doc
            .tool_call_list
            .into_iter()
            .enumerate()
            .map(|(i, call)| Entry::pending(call, base + i as u32))
            .collect();

        if initial {
            if doc.is_complete && !entries.is_empty() {
                return Err(ConsistencyError::PrematureCompletion(entries.len()).into());
            }
            self.calls.initialize(entries)?;
        } else {
            // 只读调用可以再次执行，写操作完成后永不重跑
            let executor = &self.executor;
            let report = self.calls.apply_reassessment_with(entries, doc.is_complete, |c| {
                !executor.is_write(c)
            })?;
            if !report.rerun.is_empty() {
                tracing::debug!(agent = %self.kind, rerun = ?report.rerun, "read calls listed again");
            }
            if !report.retried.is_empty() {
                tracing::info!(agent = %self.kind, retried = ?report.retried, "retrying failed tool calls");
            }
        }

        let refs: Vec<String> = self
            .calls
            .pending()
            .flat_map(|e| e.element.affected_ids())
            .collect();
        self.working.update(doc.working_data, &refs);

        match pending {
            Some(p) if doc.needs_confirmation => self.gate.request(p, &intents),
            _ if self.gate.is_awaiting() => {
                // oracle 撤回了确认请求，剩余写操作已通过校验
                self.gate.reset();
            }
            _ => {
                let executor = &self.executor;
                let outstanding = self.calls.pending().any(|e| executor.is_write(&e.element));
                self.gate.settle(outstanding);
            }
        }

        if let (Some(reported), Some(recorded)) = (&doc.last_action, self.ledger.last()) {
            if reported.action_type != recorded.action_type || reported.count != recorded.count {
                tracing::debug!(
                    reported = %reported.action_type,
                    recorded = %recorded.action_type,
                    "oracle last_action differs from ledger; ledger kept"
                );
            }
        }

        self.response = doc.natural_language_response;
        self.complete = doc.is_complete;
        Ok(())
    }

    /// 用户明确确认：闸门进入 Confirmed，并做一轮观察到确认的重评估
    pub async fn confirm(&mut self) -> Result<ConfirmOutcome, AgentError> {
        if self.gate.confirm() == ConfirmOutcome::Stale {
            return Ok(ConfirmOutcome::Stale);
        }
        let Some(action) = self.gate.pending().cloned() else {
            return Ok(ConfirmOutcome::Stale);
        };
        let user = prompts::sub_agent_confirmed(
            self.command_text(),
            &self.tools_text(),
            &self.calls,
            &self.working.to_json_string(),
            &action,
        );
        let doc: SubAgentDoc = self.oracle.invoke_as(&self.request(user)).await?;
        self.apply_doc(doc, false)?;
        Ok(ConfirmOutcome::Confirmed)
    }

    /// 用户拒绝：丢弃待执行的写操作
    pub fn decline(&mut self) -> Option<PendingAction> {
        let action = self.gate.decline()?;
        let executor = &self.executor;
        let dropped = self
            .calls
            .drop_pending(|c| executor.is_write(c), "declined by user");
        tracing::info!(agent = %self.kind, action = %action.action_type, dropped, "pending writes dropped");
        self.declined = true;
        if self.calls.unresolved_count() == 0 {
            self.complete = true;
        }
        self.response = format!("Cancelled {} of {} item(s).", action.action_type, action.count);
        Some(action)
    }

    /// 执行最近一次写操作的补偿调用
    pub async fn undo(&mut self, now: DateTime<Utc>) -> Result<String, AgentError> {
        let action = self.ledger.take_undo(now)?;
        let Some(tool) = action.undo_tool.clone() else {
            self.ledger.restore(action.clone());
            return Err(crate::engine::UndoRejection::NotReversible(action.action_type).into());
        };
        let call = ToolCall::new(tool, json!({ "ids": action.affected_item_ids }));
        let outcome = self.executor.execute(&call).await;
        match outcome.result {
            Ok(_) => {
                tracing::info!(agent = %self.kind, action = %action.action_type, count = action.count, "undone");
                Ok(format!(
                    "Undid {} of {} item(s).",
                    action.action_type, action.count
                ))
            }
            Err(e) => {
                self.ledger.restore(action);
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl Tier for SubAgent {
    type Element = ToolCall;

    fn name(&self) -> String {
        format!("{}-agent", self.kind)
    }

    fn list(&self) -> &ListEngine<ToolCall> {
        &self.calls
    }

    fn list_mut(&mut self) -> &mut ListEngine<ToolCall> {
        &mut self.calls
    }

    fn is_complete(&self) -> bool {
        self.complete
    }

    fn is_blocked(&self) -> bool {
        self.gate.is_awaiting()
    }

    fn is_write_blocked(&self, call: &ToolCall) -> bool {
        self.gate.is_awaiting() && self.executor.is_write(call)
    }

    async fn execute(&mut self, order: u32) -> Result<ElementOutcome, AgentError> {
        let call = self
            .calls
            .get(order)
            .map(|e| e.element.clone())
            .ok_or(ConsistencyError::UnknownOrder(order))?;
        let spec = self.executor.spec(&call.tool).cloned();
        let outcome = self.executor.execute(&call).await;
        let is_write = spec.as_ref().is_some_and(|s| s.is_write());

        match outcome.result {
            Ok(value) => {
                if let Some(spec) = spec.filter(|s| s.is_write()) {
                    let mut ids = call.affected_ids();
                    if ids.is_empty() {
                        if let Some(obj) = value.as_object() {
                            ids = ids_in_object(obj);
                        }
                    }
                    self.ledger
                        .record(spec.action_type(), ids, spec.undo_tool.clone(), self.now);
                }
                Ok(ElementOutcome::Completed(value.to_string()))
            }
            Err(ToolError::Timeout(tool)) if is_write => {
                tracing::warn!(agent = %self.kind, %tool, "write timed out; outcome unknown");
                Ok(ElementOutcome::Failed {
                    reason: format!("tool '{tool}' timed out"),
                    possibly_applied: true,
                })
            }
            Err(e) => {
                let class = if e.is_retryable() { "retryable" } else { "terminal" };
                Ok(ElementOutcome::failed(format!("{e} ({class})")))
            }
        }
    }

    async fn reassess(&mut self, order: u32, outcome: &ElementOutcome) -> Result<(), AgentError> {
        let finished = self
            .calls
            .get(order)
            .map(|e| e.element.tool.clone())
            .unwrap_or_default();
        let user = prompts::sub_agent_reassess(
            self.command_text(),
            &self.tools_text(),
            &self.calls,
            &self.working.to_json_string(),
            &finished,
            &outcome.describe(),
        );
        let doc: SubAgentDoc = self.oracle.invoke_as(&self.request(user)).await?;
        self.apply_doc(doc, false)
    }
}

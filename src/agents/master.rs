//! Master：跨领域规划层
//!
//! 把用户请求拆成按序执行的命令，每条命令交给对应领域的 Sub-Agent 跑完自己的循环，
//! 再用结果重评估整张命令表。累积知识跨轮次保留，只存决策相关的事实。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::agents::{prompts, EngineSettings, SubAgent};
use crate::core::{run_tier, AgentError, ElementOutcome, EventSender, Tier, TierStop};
use crate::engine::{
    AgentKind, Command, ConfirmOutcome, Entry, ListElement, ListEngine, PendingAction,
    UndoRejection,
};
use crate::llm::{
    master_plan_schema, master_reassess_schema, CommandDoc, MasterPlanDoc, MasterReassessDoc,
    OracleRequest, RetryingOracle,
};
use crate::memory::KnowledgeAccumulator;
use crate::tools::AdapterRegistry;

pub struct Master {
    oracle: Arc<RetryingOracle>,
    registry: AdapterRegistry,
    settings: EngineSettings,
    commands: ListEngine<Command>,
    knowledge: KnowledgeAccumulator,
    /// 按需创建；撤销台账随 Sub-Agent 跨请求保留
    sub_agents: HashMap<AgentKind, SubAgent>,
    user_text: String,
    response: Option<String>,
    sub_responses: Vec<String>,
    complete: bool,
    cancel: CancellationToken,
    events: Option<EventSender>,
    now: DateTime<Utc>,
}

impl Master {
    pub fn new(
        oracle: Arc<RetryingOracle>,
        registry: AdapterRegistry,
        settings: EngineSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            oracle,
            registry,
            commands: ListEngine::new(settings.max_element_retries),
            knowledge: KnowledgeAccumulator::new(settings.knowledge_budget),
            settings,
            sub_agents: HashMap::new(),
            user_text: String::new(),
            response: None,
            sub_responses: Vec::new(),
            complete: false,
            cancel,
            events: None,
            now: Utc::now(),
        }
    }

    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    pub fn knowledge(&self) -> &KnowledgeAccumulator {
        &self.knowledge
    }

    pub fn sub_agent(&self, kind: AgentKind) -> Option<&SubAgent> {
        self.sub_agents.get(&kind)
    }

    pub fn set_now(&mut self, now: DateTime<Utc>) {
        self.now = now;
    }

    fn request(&self, user: String, schema: serde_json::Value) -> OracleRequest {
        OracleRequest::new(prompts::MASTER_SYSTEM, user, schema)
            .with_options(self.settings.oracle_options.clone())
    }

    /// 新请求：丢弃上一个请求的命令表与子智能体进度，知识与撤销台账保留
    pub async fn start(&mut self, user_text: &str) -> Result<(), AgentError> {
        self.abort_round();
        self.user_text = user_text.to_string();
        self.plan_initial().await
    }

    async fn plan_initial(&mut self) -> Result<(), AgentError> {
        let user = prompts::master_plan(
            &self.user_text,
            &self.registry.descriptions(),
            self.knowledge.text(),
        );
        let doc: MasterPlanDoc = self
            .oracle
            .invoke_as(&self.request(user, master_plan_schema()))
            .await?;
        tracing::info!(
            query_type = ?doc.query_type,
            cross_account = doc.cross_account,
            commands = doc.command_list.len(),
            "master plan"
        );

        if doc.command_list.is_empty() {
            self.complete = true;
            self.response = doc.natural_language_response;
            return Ok(());
        }
        let entries = doc.command_list.into_iter().map(command_entry).collect();
        self.commands.initialize(entries)?;
        self.response = doc.natural_language_response;
        Ok(())
    }

    /// 推进命令表直到完成、等待确认或达到迭代上限
    pub async fn drive(&mut self) -> Result<TierStop, AgentError> {
        let cancel = self.cancel.clone();
        let events = self.events.clone();
        let limits = self.settings.limits;
        run_tier(self, limits, &cancel, events.as_ref()).await
    }

    fn awaiting_sub(&mut self) -> Option<&mut SubAgent> {
        self.sub_agents.values_mut().find(|s| s.gate().is_awaiting())
    }

    pub fn pending_action(&self) -> Option<&PendingAction> {
        self.sub_agents
            .values()
            .find(|s| s.gate().is_awaiting())
            .and_then(SubAgent::pending_action)
    }

    pub fn is_awaiting_confirmation(&self) -> bool {
        self.pending_action().is_some()
    }

    pub async fn confirm(&mut self) -> Result<ConfirmOutcome, AgentError> {
        match self.awaiting_sub() {
            Some(sub) => sub.confirm().await,
            None => {
                tracing::warn!("confirmation with nothing awaiting; ignored");
                Ok(ConfirmOutcome::Stale)
            }
        }
    }

    pub fn decline(&mut self) -> Option<PendingAction> {
        self.awaiting_sub()?.decline()
    }

    /// 撤销所有子智能体中最近的一次写操作
    pub async fn undo(&mut self, now: DateTime<Utc>) -> Result<String, AgentError> {
        let latest = self
            .sub_agents
            .values_mut()
            .filter(|s| s.last_action().is_some())
            .max_by_key(|s| s.last_action().map(|a| a.timestamp));
        match latest {
            Some(sub) => sub.undo(now).await,
            None => Err(UndoRejection::NothingToUndo.into()),
        }
    }

    /// 中止当前轮次；累积知识与撤销台账不受影响
    pub fn abort_round(&mut self) {
        self.commands.clear();
        for sub in self.sub_agents.values_mut() {
            sub.reset();
        }
        self.response = None;
        self.sub_responses.clear();
        self.complete = false;
    }

    /// 本轮结束时给用户的回复
    pub fn final_message(&self) -> String {
        match &self.response {
            Some(text) if !text.trim().is_empty() => text.clone(),
            _ if !self.sub_responses.is_empty() => self.sub_responses.join("\n"),
            _ => "Done.".to_string(),
        }
    }

    fn sub_agent_mut(&mut self, kind: AgentKind) -> Option<&mut SubAgent> {
        if !self.sub_agents.contains_key(&kind) {
            let adapter = self.registry.get(kind)?;
            let sub = SubAgent::new(adapter, self.oracle.clone(), self.settings.clone());
            self.sub_agents.insert(kind, sub);
        }
        self.sub_agents.get_mut(&kind)
    }
}

fn command_entry(doc: CommandDoc) -> Entry<Command> {
    let entry = Entry::pending(Command::new(doc.agent, doc.text), doc.order);
    match doc.status {
        Some(status) => entry.with_status(status),
        None => entry,
    }
}

#[async_trait]
impl Tier for Master {
    type Element = Command;

    fn name(&self) -> String {
        "master".to_string()
    }

    fn list(&self) -> &ListEngine<Command> {
        &self.commands
    }

    fn list_mut(&mut self) -> &mut ListEngine<Command> {
        &mut self.commands
    }

    fn is_complete(&self) -> bool {
        self.complete
    }

    fn is_blocked(&self) -> bool {
        self.is_awaiting_confirmation()
    }

    fn is_write_blocked(&self, _command: &Command) -> bool {
        false
    }

    async fn execute(&mut self, order: u32) -> Result<ElementOutcome, AgentError> {
        let Some(command) = self.commands.get(order).map(|e| e.element.clone()) else {
            return Ok(ElementOutcome::failed(format!("unknown command order {order}")));
        };
        let now = self.now;
        let limits = self.settings.limits;
        let cancel = self.cancel.clone();
        let events = self.events.clone();

        let Some(sub) = self.sub_agent_mut(command.agent) else {
            tracing::warn!(agent = %command.agent, "no adapter registered");
            return Ok(ElementOutcome::failed(
                AgentError::UnknownAgent(command.agent.to_string()).to_string(),
            ));
        };
        sub.set_now(now);

        if !sub.is_active() {
            sub.begin(&command.text);
            if let Err(e) = sub.plan_initial().await {
                sub.reset();
                return Err(e);
            }
        }

        let stop = match run_tier(sub, limits, &cancel, events.as_ref()).await {
            Ok(stop) => stop,
            Err(e) => {
                sub.reset();
                return Err(e);
            }
        };
        let outcome = sub.finish(stop);
        if let ElementOutcome::Completed(text) = &outcome {
            if !text.trim().is_empty() {
                self.sub_responses.push(text.clone());
            }
        }
        Ok(outcome)
    }

    async fn reassess(&mut self, order: u32, outcome: &ElementOutcome) -> Result<(), AgentError> {
        let finished = self
            .commands
            .get(order)
            .map(|e| e.element.label())
            .unwrap_or_default();
        let user = prompts::master_reassess(
            &self.user_text,
            &self.commands,
            self.knowledge.text(),
            &finished,
            &outcome.describe(),
        );
        let doc: MasterReassessDoc = self
            .oracle
            .invoke_as(&self.request(user, master_reassess_schema()))
            .await?;

        let entries = doc.command_list.into_iter().map(command_entry).collect();
        self.commands.apply_reassessment(entries, doc.is_complete)?;

        let refs: Vec<String> = self
            .commands
            .pending()
            .flat_map(|e| e.element.referenced_ids())
            .collect();
        let report = self.knowledge.update(doc.accumulated_knowledge, &refs);
        tracing::debug!(tokens = report.tokens, over_budget = report.over_budget, "knowledge updated");

        if doc.natural_language_response.is_some() {
            self.response = doc.natural_language_response;
        }
        self.complete = doc.is_complete;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{RetryConfig, ScriptedOracle};
    use crate::tools::InMemoryMailbox;
    use serde_json::{json, Value};

    fn master(script: Arc<ScriptedOracle>) -> Master {
        let oracle = Arc::new(RetryingOracle::new(
            script,
            RetryConfig {
                max_retries: 0,
                initial_backoff_ms: 1,
                max_backoff_ms: 1,
            },
        ));
        let registry = AdapterRegistry::new().with(Arc::new(InMemoryMailbox::demo()));
        Master::new(oracle, registry, EngineSettings::default(), CancellationToken::new())
    }

    fn sub_done(text: &str) -> Value {
        json!({
            "working_data": {},
            "tool_call_list": [],
            "needs_confirmation": false,
            "natural_language_response": text,
            "is_complete": true,
        })
    }

    #[tokio::test]
    async fn test_chat_request_completes_without_commands() {
        let script = Arc::new(ScriptedOracle::new());
        script.push_ok(json!({
            "command_list": [],
            "query_type": "chat",
            "cross_account": false,
            "natural_language_response": "Hello!"
        }));
        let mut m = master(script.clone());
        m.start("hi").await.unwrap();
        assert_eq!(m.drive().await.unwrap(), TierStop::Complete);
        assert_eq!(m.final_message(), "Hello!");
        assert_eq!(script.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_unregistered_agent_fails_command() {
        let script = Arc::new(ScriptedOracle::new());
        script.push_ok(json!({
            "command_list": [{"agent": "messaging", "text": "ping the team", "order": 1}],
            "query_type": "write",
            "cross_account": false
        }));
        script.push_ok(json!({
            "command_list": [{"agent": "messaging", "text": "ping the team", "order": 1, "status": "failed"}],
            "accumulated_knowledge": "messaging unavailable",
            "is_complete": true,
            "natural_language_response": "I can't reach messaging."
        }));
        let mut m = master(script);
        m.start("ping the team").await.unwrap();
        assert_eq!(m.drive().await.unwrap(), TierStop::Complete);
        assert_eq!(m.list().entries()[0].status, crate::engine::ElementStatus::Failed);
        assert_eq!(m.knowledge().text(), "messaging unavailable");
    }

    #[tokio::test]
    async fn test_sub_responses_fill_missing_final_message() {
        let script = Arc::new(ScriptedOracle::new());
        script.push_ok(json!({
            "command_list": [{"agent": "mail", "text": "count unread", "order": 1}],
            "query_type": "read",
            "cross_account": false
        }));
        script.push_ok(sub_done("You have 3 unread emails."));
        script.push_ok(json!({
            "command_list": [{"agent": "mail", "text": "count unread", "order": 1, "status": "completed"}],
            "accumulated_knowledge": "unread=3",
            "is_complete": true
        }));
        let mut m = master(script);
        m.start("how many unread?").await.unwrap();
        assert_eq!(m.drive().await.unwrap(), TierStop::Complete);
        assert_eq!(m.final_message(), "You have 3 unread emails.");
    }

    #[tokio::test]
    async fn test_master_stops_at_iteration_ceiling() {
        let script = Arc::new(ScriptedOracle::new().with_responder(|req, idx| {
            if req.schema["properties"]["tool_call_list"].is_object() {
                return sub_done("");
            }
            json!({
                "command_list": [{"agent": "mail", "text": format!("step {idx}"), "order": 1}],
                "query_type": "read",
                "cross_account": false,
                "accumulated_knowledge": "",
                "is_complete": false
            })
        }));
        let mut m = master(script);
        m.start("loop forever").await.unwrap();
        assert_eq!(
            m.drive().await.unwrap(),
            TierStop::IterationLimit { iterations: 10 }
        );
    }

    #[tokio::test]
    async fn test_undo_with_no_history_is_rejected() {
        let script = Arc::new(ScriptedOracle::new());
        let mut m = master(script);
        let err = m.undo(Utc::now()).await.unwrap_err();
        assert!(matches!(err, AgentError::Undo(UndoRejection::NothingToUndo)));
    }
}

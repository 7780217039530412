//! 内存邮箱适配器：search / get / archive / unarchive / delete
//!
//! 用于 REPL 演示与测试；记录每次调用，可注入一次性失败与延迟。

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::engine::AgentKind;
use crate::tools::{string_ids, string_param, ServiceAdapter, ToolError, ToolSpec};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Email {
    pub id: String,
    pub from: String,
    pub subject: String,
    pub body: String,
    pub date: String,
    pub labels: Vec<String>,
    pub archived: bool,
}

impl Email {
    pub fn new(id: &str, from: &str, subject: &str) -> Self {
        Self {
            id: id.to_string(),
            from: from.to_string(),
            subject: subject.to_string(),
            body: String::new(),
            date: String::new(),
            labels: Vec::new(),
            archived: false,
        }
    }

    pub fn with_date(mut self, date: &str) -> Self {
        self.date = date.to_string();
        self
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.labels.push(label.to_string());
        self
    }

    pub fn with_body(mut self, body: &str) -> Self {
        self.body = body.to_string();
        self
    }

    fn header(&self) -> Value {
        json!({
            "id": self.id,
            "from": self.from,
            "subject": self.subject,
            "date": self.date,
            "labels": self.labels,
            "archived": self.archived,
        })
    }

    fn matches(&self, query: &str) -> bool {
        let q = query.to_lowercase();
        self.subject.to_lowercase().contains(&q)
            || self.from.to_lowercase().contains(&q)
            || self.body.to_lowercase().contains(&q)
            || self.labels.iter().any(|l| l.to_lowercase() == q)
    }
}

#[derive(Debug, Default)]
struct MailboxState {
    emails: Vec<Email>,
    calls: Vec<(String, Map<String, Value>)>,
    fail_next: Option<ToolError>,
    delay: Option<Duration>,
}

#[derive(Debug, Default)]
pub struct InMemoryMailbox {
    state: Mutex<MailboxState>,
}

impl InMemoryMailbox {
    pub fn new(emails: Vec<Email>) -> Self {
        Self {
            state: Mutex::new(MailboxState {
                emails,
                ..Default::default()
            }),
        }
    }

    /// 演示数据：若干 newsletter 与普通邮件
    pub fn demo() -> Self {
        let mut emails: Vec<Email> = (1..=5)
            .map(|i| {
                Email::new(
                    &format!("msg_{:04}", 1000 + i),
                    "digest@news.example.com",
                    &format!("Daily digest #{i}"),
                )
                .with_label("newsletter")
                .with_date("today")
            })
            .collect();
        emails.push(
            Email::new("msg_2001", "bob@example.com", "Quarterly planning")
                .with_body("Can we meet Thursday at 10?")
                .with_date("today"),
        );
        emails.push(
            Email::new("msg_2002", "alice@example.com", "Invoice 4471")
                .with_body("Attached is the invoice for March.")
                .with_date("yesterday"),
        );
        Self::new(emails)
    }

    fn lock(&self) -> MutexGuard<'_, MailboxState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn calls(&self) -> Vec<(String, Map<String, Value>)> {
        self.lock().calls.clone()
    }

    /// 指定工具被调用的次数
    pub fn call_count(&self, tool: &str) -> usize {
        self.lock().calls.iter().filter(|(t, _)| t == tool).count()
    }

    pub fn email(&self, id: &str) -> Option<Email> {
        self.lock().emails.iter().find(|e| e.id == id).cloned()
    }

    pub fn fail_next(&self, err: ToolError) {
        self.lock().fail_next = Some(err);
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        self.lock().delay = delay;
    }

    fn set_archived(&self, ids: &[String], archived: bool) -> Result<Vec<String>, ToolError> {
        let mut state = self.lock();
        if let Some(missing) = ids.iter().find(|id| !state.emails.iter().any(|e| &e.id == *id)) {
            return Err(ToolError::NotFound(missing.clone()));
        }
        for email in state.emails.iter_mut().filter(|e| ids.contains(&e.id)) {
            email.archived = archived;
        }
        Ok(ids.to_vec())
    }

    fn apply(&self, tool: &str, params: &Map<String, Value>) -> Result<Value, ToolError> {
        match tool {
            "search_emails" => {
                let state = self.lock();
                let query = params.get("query").and_then(Value::as_str);
                let include_archived = params
                    .get("include_archived")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                let hits: Vec<Value> = state
                    .emails
                    .iter()
                    .filter(|e| include_archived || !e.archived)
                    .filter(|e| query.map_or(true, |q| e.matches(q)))
                    .map(Email::header)
                    .collect();
                Ok(json!({ "count": hits.len(), "emails": hits }))
            }
            "get_email" => {
                let id = string_param(params, "id")?;
                let state = self.lock();
                let email = state
                    .emails
                    .iter()
                    .find(|e| e.id == id)
                    .ok_or_else(|| ToolError::NotFound(id.to_string()))?;
                serde_json::to_value(email).map_err(|e| ToolError::Network(e.to_string()))
            }
            "archive_emails" => {
                let ids = self.set_archived(&string_ids(params, "ids")?, true)?;
                Ok(json!({ "archived": ids, "count": ids.len() }))
            }
            "unarchive_emails" => {
                let ids = self.set_archived(&string_ids(params, "ids")?, false)?;
                Ok(json!({ "unarchived": ids, "count": ids.len() }))
            }
            "delete_emails" => {
                let ids = string_ids(params, "ids")?;
                let mut state = self.lock();
                let before = state.emails.len();
                state.emails.retain(|e| !ids.contains(&e.id));
                let deleted = before - state.emails.len();
                Ok(json!({ "deleted": ids, "count": deleted }))
            }
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }
}

#[async_trait]
impl ServiceAdapter for InMemoryMailbox {
    fn domain(&self) -> AgentKind {
        AgentKind::Mail
    }

    fn tools(&self) -> Vec<ToolSpec> {
        vec![
            ToolSpec::read(
                "search_emails",
                "Search the mailbox; returns headers only",
                json!({"query": "string (optional)", "include_archived": "bool (optional)"}),
            ),
            ToolSpec::read("get_email", "Fetch one email with body", json!({"id": "string"})),
            ToolSpec::write(
                "archive_emails",
                "Move emails out of the inbox",
                json!({"ids": ["string"]}),
                "archive",
            )
            .undo_with("unarchive_emails"),
            ToolSpec::write(
                "unarchive_emails",
                "Move archived emails back to the inbox",
                json!({"ids": ["string"]}),
                "unarchive",
            )
            .undo_with("archive_emails"),
            ToolSpec::write(
                "delete_emails",
                "Permanently delete emails",
                json!({"ids": ["string"]}),
                "delete",
            ),
        ]
    }

    async fn execute(&self, tool: &str, params: &Map<String, Value>) -> Result<Value, ToolError> {
        let (injected, delay) = {
            let mut state = self.lock();
            state.calls.push((tool.to_string(), params.clone()));
            (state.fail_next.take(), state.delay)
        };
        if let Some(err) = injected {
            return Err(err);
        }
        // 先落地再等待：模拟服务端已生效但响应迟到
        let result = self.apply(tool, params);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        result
    }
}

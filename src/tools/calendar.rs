//! 内存日历适配器：list / create / delete

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::engine::AgentKind;
use crate::tools::{string_ids, string_param, ServiceAdapter, ToolError, ToolSpec};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub id: String,
    pub title: String,
    pub start: String,
    pub end: Option<String>,
    pub attendees: Vec<String>,
}

#[derive(Debug, Default)]
struct CalendarState {
    events: Vec<Event>,
    next_id: u32,
    calls: Vec<(String, Map<String, Value>)>,
    fail_next: Option<ToolError>,
}

#[derive(Debug, Default)]
pub struct InMemoryCalendar {
    state: Mutex<CalendarState>,
}

impl InMemoryCalendar {
    pub fn new(events: Vec<Event>) -> Self {
        Self {
            state: Mutex::new(CalendarState {
                next_id: events.len() as u32 + 1,
                events,
                ..Default::default()
            }),
        }
    }

    pub fn demo() -> Self {
        Self::new(vec![Event {
            id: "evt_0001".to_string(),
            title: "Team standup".to_string(),
            start: "today 09:30".to_string(),
            end: Some("today 09:45".to_string()),
            attendees: vec!["team@example.com".to_string()],
        }])
    }

    fn lock(&self) -> MutexGuard<'_, CalendarState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn events(&self) -> Vec<Event> {
        self.lock().events.clone()
    }

    pub fn call_count(&self, tool: &str) -> usize {
        self.lock().calls.iter().filter(|(t, _)| t == tool).count()
    }

    pub fn fail_next(&self, err: ToolError) {
        self.lock().fail_next = Some(err);
    }
}

#[async_trait]
impl ServiceAdapter for InMemoryCalendar {
    fn domain(&self) -> AgentKind {
        AgentKind::Calendar
    }

    fn tools(&self) -> Vec<ToolSpec> {
        vec![
            ToolSpec::read(
                "list_events",
                "List calendar events",
                json!({"query": "string (optional)"}),
            ),
            ToolSpec::write(
                "create_event",
                "Create a calendar event",
                json!({"title": "string", "start": "string", "end": "string (optional)", "attendees": ["string"]}),
                "create_event",
            )
            .undo_with("delete_events"),
            ToolSpec::write(
                "delete_events",
                "Delete calendar events",
                json!({"ids": ["string"]}),
                "delete_event",
            ),
        ]
    }

    async fn execute(&self, tool: &str, params: &Map<String, Value>) -> Result<Value, ToolError> {
        let mut state = self.lock();
        state.calls.push((tool.to_string(), params.clone()));
        if let Some(err) = state.fail_next.take() {
            return Err(err);
        }
        match tool {
            "list_events" => {
                let query = params
                    .get("query")
                    .and_then(Value::as_str)
                    .map(str::to_lowercase);
                let events: Vec<&Event> = state
                    .events
                    .iter()
                    .filter(|e| {
                        query.as_deref().map_or(true, |q| {
                            e.title.to_lowercase().contains(q) || e.start.to_lowercase().contains(q)
                        })
                    })
                    .collect();
                Ok(json!({ "count": events.len(), "events": events }))
            }
            "create_event" => {
                let title = string_param(params, "title")?.to_string();
                let start = string_param(params, "start")?.to_string();
                let end = params.get("end").and_then(Value::as_str).map(String::from);
                let attendees = params
                    .get("attendees")
                    .and_then(Value::as_array)
                    .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
                    .unwrap_or_default();
                let id = format!("evt_{:04}", state.next_id);
                state.next_id += 1;
                state.events.push(Event {
                    id: id.clone(),
                    title,
                    start,
                    end,
                    attendees,
                });
                Ok(json!({ "id": id, "created": true }))
            }
            "delete_events" => {
                let ids = string_ids(params, "ids")?;
                if let Some(missing) = ids.iter().find(|id| !state.events.iter().any(|e| &e.id == *id)) {
                    return Err(ToolError::NotFound(missing.clone()));
                }
                state.events.retain(|e| !ids.contains(&e.id));
                Ok(json!({ "deleted": ids, "count": ids.len() }))
            }
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }
}

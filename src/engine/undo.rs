//! 撤销台账：只保留最近一次写操作，可撤销的写操作在固定窗口内允许补偿

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;

/// 撤销窗口（秒）
pub const DEFAULT_UNDO_WINDOW_SECS: i64 = 300;

/// 最近一次完成的写操作
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastAction {
    pub action_type: String,
    pub count: u32,
    pub timestamp: DateTime<Utc>,
    pub affected_item_ids: Vec<String>,
    pub reversible: bool,
    /// 仅可撤销时存在
    pub undo_deadline: Option<DateTime<Utc>>,
    /// 补偿工具名（由适配器声明）
    #[serde(skip)]
    pub undo_tool: Option<String>,
}

impl LastAction {
    pub fn record(
        action_type: impl Into<String>,
        affected_item_ids: Vec<String>,
        undo_tool: Option<String>,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Self {
        let reversible = undo_tool.is_some();
        Self {
            action_type: action_type.into(),
            count: affected_item_ids.len() as u32,
            timestamp: now,
            affected_item_ids,
            reversible,
            undo_deadline: reversible.then(|| now + window),
            undo_tool,
        }
    }

    pub fn is_undo_available(&self, now: DateTime<Utc>) -> bool {
        self.reversible && self.undo_deadline.is_some_and(|deadline| now <= deadline)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UndoRejection {
    #[error("there is no recent action to undo")]
    NothingToUndo,

    #[error("the last action ({0}) cannot be undone")]
    NotReversible(String),

    #[error("the undo window for {action_type} expired at {deadline}")]
    WindowExpired {
        action_type: String,
        deadline: DateTime<Utc>,
    },
}

#[derive(Debug, Clone)]
pub struct UndoLedger {
    last: Option<LastAction>,
    window: Duration,
}

impl Default for UndoLedger {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_UNDO_WINDOW_SECS))
    }
}

impl UndoLedger {
    pub fn new(window: Duration) -> Self {
        Self { last: None, window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn last(&self) -> Option<&LastAction> {
        self.last.as_ref()
    }

    /// 覆盖之前的记录
    pub fn record(
        &mut self,
        action_type: impl Into<String>,
        affected_item_ids: Vec<String>,
        undo_tool: Option<String>,
        now: DateTime<Utc>,
    ) -> &LastAction {
        let action = LastAction::record(action_type, affected_item_ids, undo_tool, now, self.window);
        tracing::debug!(
            action = %action.action_type,
            count = action.count,
            reversible = action.reversible,
            "last action recorded"
        );
        self.last.insert(action)
    }

    pub fn is_undo_available(&self, now: DateTime<Utc>) -> bool {
        self.last.as_ref().is_some_and(|a| a.is_undo_available(now))
    }

    /// 成功时取出记录（同一动作只能撤销一次）；拒绝时记录保持不变
    pub fn take_undo(&mut self, now: DateTime<Utc>) -> Result<LastAction, UndoRejection> {
        let action = self.last.as_ref().ok_or(UndoRejection::NothingToUndo)?;
        if !action.reversible {
            return Err(UndoRejection::NotReversible(action.action_type.clone()));
        }
        if let Some(deadline) = action.undo_deadline {
            if now > deadline {
                return Err(UndoRejection::WindowExpired {
                    action_type: action.action_type.clone(),
                    deadline,
                });
            }
        }
        self.last.take().ok_or(UndoRejection::NothingToUndo)
    }

    /// 补偿调用失败时放回记录（除非期间已有更新的动作）
    pub fn restore(&mut self, action: LastAction) {
        if self.last.is_none() {
            self.last = Some(action);
        }
    }

    pub fn clear(&mut self) {
        self.last = None;
    }
}

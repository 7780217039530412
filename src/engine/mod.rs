//! 控制状态引擎：列表状态机、命令与工具调用、确认闸门、撤销台账
//!
//! 本层不做任何 I/O，所有时间相关操作显式传入 now。

pub mod command;
pub mod gate;
pub mod list;
pub mod tool_call;
pub mod undo;

pub use command::{AgentKind, Command};
pub use gate::{
    validate_round, ApprovedScope, ConfirmOutcome, ConfirmationGate, GateRequirement, GateState,
    PendingAction, RiskLevel, Scope, WriteIntent,
};
pub use list::{ElementStatus, Entry, ListElement, ListEngine, Reconciliation};
pub use tool_call::{ids_in_object, ToolCall};
pub use undo::{LastAction, UndoLedger, UndoRejection, DEFAULT_UNDO_WINDOW_SECS};

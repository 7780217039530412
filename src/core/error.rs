//! 错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：根据 AgentError 决定 SurfaceIncomplete / AbortRound / Abort。
//! 所有错误都只作用于所在会话。

use thiserror::Error;

use crate::engine::UndoRejection;
use crate::llm::OracleError;
use crate::tools::ToolError;

/// 会话运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    /// 不变量被破坏：只中止当前轮次，不影响进程与其它会话
    #[error("Consistency error: {0}")]
    Consistency(#[from] ConsistencyError),

    #[error("Undo rejected: {0}")]
    Undo(#[from] UndoRejection),

    #[error("No adapter registered for agent '{0}'")]
    UnknownAgent(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Config error: {0}")]
    ConfigError(String),
}

/// 控制状态不变量被破坏（通常来自 oracle 的矛盾输出）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsistencyError {
    #[error("element '{0}' was executing but the new list drops it without resolving it")]
    DroppedExecuting(String),

    #[error("element '{0}' is not pending and cannot start executing")]
    NotRunnable(String),

    #[error("another element ('{0}') is already executing")]
    AlreadyExecuting(String),

    #[error("element '{0}' is not executing")]
    NotExecuting(String),

    #[error("no element with order {0}")]
    UnknownOrder(u32),

    #[error("reassessment may not mark '{0}' as executing")]
    ExecutingInReassessment(String),

    #[error("duplicate order {0} in list")]
    DuplicateOrder(u32),

    #[error("order must be >= 1 (element '{0}')")]
    InvalidOrder(String),

    #[error("'{0}' reported completed but was never executed")]
    CompletedWithoutExecution(String),

    #[error("is_complete asserted with {0} unresolved element(s)")]
    PrematureCompletion(usize),

    #[error("is_complete asserted while confirmation is still required")]
    CompleteWhileAwaiting,

    #[error("needs_confirmation set without a pending_action")]
    MissingPendingAction,

    #[error("pending action '{0}' requires a non-empty preview")]
    MissingPreview(String),

    #[error("high-risk bulk action '{0}' proposed without requiring confirmation")]
    UnconfirmedHighRiskBulk(String),

    #[error("write '{tool}' requires {required} but no confirmation was requested")]
    UngatedWrite { tool: String, required: String },

    #[error("no runnable element while the tier is neither blocked nor complete")]
    Stalled,
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryAction {
    /// 以「结果不完整」告知用户，保留已积累的知识
    SurfaceIncomplete(String),
    /// 中止当前轮次，向用户返回通用失败信息
    AbortRound(String),
    /// 会话已结束
    Abort,
}

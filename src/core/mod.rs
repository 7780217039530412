//! 核心编排层：错误与恢复、状态投影、会话监管、过程事件、编排循环

pub mod error;
pub mod events;
pub mod orchestrator;
pub mod recovery;
pub mod session_supervisor;
pub mod state;

pub use error::{AgentError, ConsistencyError, RecoveryAction};
pub use events::{EventSender, LoopEvent};
pub use orchestrator::{run_tier, ElementOutcome, LoopLimits, Tier, TierStop};
pub use recovery::RecoveryEngine;
pub use session_supervisor::SessionSupervisor;
pub use state::{SessionPhase, TurnReply};

//! 错误恢复引擎
//!
//! 根据 AgentError 类型返回 RecoveryAction，供会话决定向用户展示什么；
//! oracle 的有界重试已在 RetryingOracle 内完成，这里只处理重试耗尽后的结果。

use crate::core::{AgentError, RecoveryAction};
use crate::engine::UndoRejection;

/// 将错误映射为面向用户的动作
#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, err: &AgentError) -> RecoveryAction {
        match err {
            AgentError::Oracle(e) => {
                tracing::warn!(error = %e, "oracle failed after retries");
                RecoveryAction::SurfaceIncomplete(
                    "I couldn't finish planning this request right now. \
                     What I found so far is kept; please try again in a moment."
                        .to_string(),
                )
            }
            AgentError::Tool(e) => RecoveryAction::SurfaceIncomplete(format!(
                "A service call failed ({e}). The request was only partially completed."
            )),
            AgentError::Undo(rejection) => RecoveryAction::SurfaceIncomplete(match rejection {
                UndoRejection::WindowExpired { action_type, .. } => format!(
                    "The undo window for the last {action_type} has expired, so it can no longer be undone."
                ),
                other => format!("Nothing was undone: {other}."),
            }),
            AgentError::UnknownAgent(agent) => RecoveryAction::SurfaceIncomplete(format!(
                "I can't reach the {agent} service in this session."
            )),
            AgentError::Consistency(e) => {
                tracing::error!(error = %e, "consistency error, aborting round");
                RecoveryAction::AbortRound(
                    "Something went wrong while processing that request, so I stopped \
                     before making further changes."
                        .to_string(),
                )
            }
            AgentError::ConfigError(e) => {
                RecoveryAction::AbortRound(format!("Configuration problem: {e}"))
            }
            AgentError::Cancelled => RecoveryAction::Abort,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ConsistencyError;
    use crate::llm::OracleError;
    use crate::tools::ToolError;

    #[test]
    fn test_recovery_oracle_error_surfaces_incomplete() {
        let engine = RecoveryEngine::new();
        let action = engine.handle(&AgentError::Oracle(OracleError::Timeout));
        assert!(matches!(action, RecoveryAction::SurfaceIncomplete(_)));
    }

    #[test]
    fn test_recovery_consistency_aborts_round() {
        let engine = RecoveryEngine::new();
        let err = AgentError::Consistency(ConsistencyError::Stalled);
        match engine.handle(&err) {
            RecoveryAction::AbortRound(msg) => assert!(!msg.contains("Stalled")),
            other => panic!("Expected AbortRound, got {other:?}"),
        }
    }

    #[test]
    fn test_recovery_tool_error_mentions_cause() {
        let engine = RecoveryEngine::new();
        let err = AgentError::Tool(ToolError::Network("connection reset".to_string()));
        match engine.handle(&err) {
            RecoveryAction::SurfaceIncomplete(msg) => assert!(msg.contains("connection reset")),
            other => panic!("Expected SurfaceIncomplete, got {other:?}"),
        }
    }

    #[test]
    fn test_recovery_expired_undo_is_distinct() {
        let engine = RecoveryEngine::new();
        let err = AgentError::Undo(UndoRejection::WindowExpired {
            action_type: "archive".to_string(),
            deadline: chrono::Utc::now(),
        });
        match engine.handle(&err) {
            RecoveryAction::SurfaceIncomplete(msg) => assert!(msg.contains("expired")),
            other => panic!("Expected SurfaceIncomplete, got {other:?}"),
        }
    }

    #[test]
    fn test_recovery_cancelled() {
        let engine = RecoveryEngine::new();
        assert_eq!(engine.handle(&AgentError::Cancelled), RecoveryAction::Abort);
    }
}

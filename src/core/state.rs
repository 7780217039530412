//! 状态投影：会话阶段与对上游的回复
//!
//! 上游调用方只看到轻量的 TurnReply；完整控制状态留在 Session 内部。

use serde::Serialize;

/// 会话阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Idle,
    /// 有子智能体在等待确认
    AwaitingConfirmation,
    /// 上一轮因错误或迭代上限中止
    Interrupted,
    /// 会话已结束（取消）
    Ended,
}

/// processTurn 的返回：{message, done, awaiting_confirmation}
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TurnReply {
    pub message: String,
    pub done: bool,
    pub awaiting_confirmation: bool,
}

impl TurnReply {
    pub fn done(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            done: true,
            awaiting_confirmation: false,
        }
    }

    pub fn awaiting(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            done: false,
            awaiting_confirmation: true,
        }
    }

    /// 未完成（错误、迭代上限）
    pub fn incomplete(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            done: false,
            awaiting_confirmation: false,
        }
    }
}

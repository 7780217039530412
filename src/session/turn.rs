//! 单个会话：把一条用户输入变成一次 TurnReply
//!
//! 等待确认时只接受明确的肯定 / 否定；其它输入重新提问，不会被当作确认。

use chrono::{DateTime, Utc};

use crate::agents::Master;
use crate::core::{
    AgentError, RecoveryAction, RecoveryEngine, SessionPhase, SessionSupervisor, TierStop,
    TurnReply,
};
use crate::engine::ConfirmOutcome;

const AFFIRMATIVE: &[&str] = &["yes", "y", "confirm", "proceed", "ok", "go ahead"];
const NEGATIVE: &[&str] = &["no", "n", "cancel", "stop", "abort"];

/// 上游输入的分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserSignal {
    Affirmative,
    Negative,
    Undo,
    /// 普通请求
    Request,
}

impl UserSignal {
    /// 严格匹配：忽略大小写、首尾空白与结尾标点
    pub fn parse(text: &str) -> Self {
        let normalized = text
            .trim()
            .trim_end_matches(&['.', '!', '?'][..])
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        if AFFIRMATIVE.contains(&normalized.as_str()) {
            UserSignal::Affirmative
        } else if NEGATIVE.contains(&normalized.as_str()) {
            UserSignal::Negative
        } else if normalized == "undo" {
            UserSignal::Undo
        } else {
            UserSignal::Request
        }
    }
}

pub struct Session {
    id: String,
    master: Master,
    supervisor: SessionSupervisor,
    recovery: RecoveryEngine,
    phase: SessionPhase,
}

impl Session {
    pub fn new(id: impl Into<String>, master: Master, supervisor: SessionSupervisor) -> Self {
        Self {
            id: id.into(),
            master,
            supervisor,
            recovery: RecoveryEngine::new(),
            phase: SessionPhase::Idle,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn master(&self) -> &Master {
        &self.master
    }

    pub fn supervisor(&self) -> &SessionSupervisor {
        &self.supervisor
    }

    pub async fn process_turn(&mut self, text: &str) -> TurnReply {
        self.process_turn_at(text, Utc::now()).await
    }

    /// 处理一条用户输入；now 用于撤销窗口与活跃时间
    pub async fn process_turn_at(&mut self, text: &str, now: DateTime<Utc>) -> TurnReply {
        if self.supervisor.is_cancelled() {
            self.phase = SessionPhase::Ended;
            return TurnReply::done("This session has ended.");
        }
        self.supervisor.touch(now);
        self.master.set_now(now);

        let signal = UserSignal::parse(text);
        tracing::info!(session = %self.id, ?signal, phase = ?self.phase, "turn");

        if self.master.is_awaiting_confirmation() {
            return match signal {
                UserSignal::Affirmative => match self.master.confirm().await {
                    Ok(ConfirmOutcome::Confirmed) | Ok(ConfirmOutcome::Stale) => self.drive().await,
                    Err(e) => self.recover(e, true),
                },
                UserSignal::Negative => {
                    self.master.decline();
                    self.drive().await
                }
                _ => {
                    let prompt = self
                        .master
                        .pending_action()
                        .map(|p| p.prompt())
                        .unwrap_or_default();
                    TurnReply::awaiting(format!("Please answer yes or no.\n{prompt}"))
                }
            };
        }

        match signal {
            UserSignal::Affirmative | UserSignal::Negative => {
                TurnReply::done("Nothing is waiting for confirmation.")
            }
            UserSignal::Undo => match self.master.undo(now).await {
                Ok(message) => TurnReply::done(message),
                Err(e) => self.recover(e, false),
            },
            UserSignal::Request => {
                if let Err(e) = self.master.start(text).await {
                    return self.recover(e, true);
                }
                self.drive().await
            }
        }
    }

    async fn drive(&mut self) -> TurnReply {
        match self.master.drive().await {
            Ok(TierStop::Complete) => {
                self.phase = SessionPhase::Idle;
                TurnReply::done(self.master.final_message())
            }
            Ok(TierStop::AwaitingConfirmation) => {
                self.phase = SessionPhase::AwaitingConfirmation;
                let prompt = self
                    .master
                    .pending_action()
                    .map(|p| p.prompt())
                    .unwrap_or_else(|| "Waiting for your confirmation.".to_string());
                TurnReply::awaiting(prompt)
            }
            Ok(TierStop::IterationLimit { iterations }) => {
                tracing::warn!(session = %self.id, iterations, "request left unfinished at iteration ceiling");
                self.master.abort_round();
                self.phase = SessionPhase::Interrupted;
                TurnReply::incomplete(format!(
                    "I stopped after {iterations} steps without finishing this request. \
                     Anything already done is kept; please narrow the request and try again."
                ))
            }
            Err(e) => self.recover(e, true),
        }
    }

    /// 错误只作用于本会话；abort_round 为真时丢弃本轮的列表（知识保留）
    fn recover(&mut self, err: AgentError, abort_round: bool) -> TurnReply {
        tracing::warn!(session = %self.id, error = %err, "turn failed");
        let action = self.recovery.handle(&err);
        if abort_round {
            self.master.abort_round();
        }
        match action {
            RecoveryAction::SurfaceIncomplete(message) | RecoveryAction::AbortRound(message) => {
                if abort_round {
                    self.phase = SessionPhase::Interrupted;
                }
                TurnReply::incomplete(message)
            }
            RecoveryAction::Abort => {
                self.phase = SessionPhase::Ended;
                TurnReply::done("This session has ended.")
            }
        }
    }
}

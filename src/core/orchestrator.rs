//! 编排循环：驱动一个 tier（Master 或 Sub-Agent）逐轮推进
//!
//! plan_initial 之后：取 next_runnable -> 执行 -> 标记 completed / failed -> reassess；
//! 无可运行元素时：被闸门阻塞则挂起返回，已完成则结束，否则视为一致性错误。
//! 每个 tier 每次调用最多执行 max_iterations 轮，无论 oracle 如何表现都保证终止。
//! 取消只在轮与轮之间检查；进行中的调用会跑完或超时。

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::core::events::{send_event, EventSender, LoopEvent};
use crate::core::{AgentError, ConsistencyError};
use crate::engine::{ListElement, ListEngine};

/// 一个元素执行后的结果
#[derive(Debug, Clone, PartialEq)]
pub enum ElementOutcome {
    /// 成功，附带给 oracle 阅读的结果文本
    Completed(String),
    /// 失败；possibly_applied 表示写操作超时、结果未知
    Failed { reason: String, possibly_applied: bool },
    /// 执行被挂起（子智能体等待确认），元素保持 executing
    Suspended,
}

impl ElementOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        ElementOutcome::Failed {
            reason: reason.into(),
            possibly_applied: false,
        }
    }

    /// 写入 reassessment 请求的结果描述
    pub fn describe(&self) -> String {
        match self {
            ElementOutcome::Completed(result) => format!("completed: {result}"),
            ElementOutcome::Failed {
                reason,
                possibly_applied: true,
            } => format!("failed (possibly applied, do not retry blindly): {reason}"),
            ElementOutcome::Failed { reason, .. } => format!("failed: {reason}"),
            ElementOutcome::Suspended => "suspended awaiting confirmation".to_string(),
        }
    }
}

/// tier 停止推进的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierStop {
    Complete,
    AwaitingConfirmation,
    IterationLimit { iterations: usize },
}

#[derive(Debug, Clone, Copy)]
pub struct LoopLimits {
    pub max_iterations: usize,
}

impl Default for LoopLimits {
    fn default() -> Self {
        Self { max_iterations: 10 }
    }
}

/// 一层列表状态机的所有者
#[async_trait]
pub trait Tier: Send {
    type Element: ListElement;

    fn name(&self) -> String;

    fn list(&self) -> &ListEngine<Self::Element>;

    fn list_mut(&mut self) -> &mut ListEngine<Self::Element>;

    /// 最近一次重评估断言完成
    fn is_complete(&self) -> bool;

    /// 闸门处于等待确认
    fn is_blocked(&self) -> bool;

    /// 该元素当前是否因等待确认而不能执行
    fn is_write_blocked(&self, element: &Self::Element) -> bool;

    /// 执行一个已进入 executing 的元素
    async fn execute(&mut self, order: u32) -> Result<ElementOutcome, AgentError>;

    /// 用该元素的结果做一次重评估并替换列表
    async fn reassess(&mut self, order: u32, outcome: &ElementOutcome) -> Result<(), AgentError>;
}

/// 驱动 tier 直到完成、挂起或达到迭代上限
pub async fn run_tier<T: Tier + ?Sized>(
    tier: &mut T,
    limits: LoopLimits,
    cancel: &CancellationToken,
    events: Option<&EventSender>,
) -> Result<TierStop, AgentError> {
    let name = tier.name();
    let mut iterations = 0;

    loop {
        if cancel.is_cancelled() {
            send_event(events, LoopEvent::Error {
                text: "Cancelled".to_string(),
            });
            return Err(AgentError::Cancelled);
        }

        // 被挂起的元素优先恢复
        let resumed = tier.list().executing().map(|e| e.order);
        let candidate = match resumed {
            Some(order) => Some(order),
            None => tier.list().next_runnable(|e| tier.is_write_blocked(e)),
        };

        let Some(order) = candidate else {
            if tier.is_blocked() {
                send_event(events, LoopEvent::AwaitingConfirmation { tier: name.clone() });
                return Ok(TierStop::AwaitingConfirmation);
            }
            if tier.is_complete() && tier.list().unresolved_count() == 0 {
                send_event(events, LoopEvent::TierComplete { tier: name.clone() });
                return Ok(TierStop::Complete);
            }
            return Err(ConsistencyError::Stalled.into());
        };

        if iterations >= limits.max_iterations {
            tracing::warn!(tier = %name, iterations, "iteration ceiling reached");
            send_event(events, LoopEvent::IterationLimit {
                tier: name.clone(),
                iterations,
            });
            return Ok(TierStop::IterationLimit { iterations });
        }
        iterations += 1;
        send_event(events, LoopEvent::RoundStart {
            tier: name.clone(),
            round: iterations,
            max_rounds: limits.max_iterations,
        });

        if resumed.is_none() {
            tier.list_mut().mark_executing(order)?;
        }
        let label = tier
            .list()
            .get(order)
            .map(|e| e.element.label())
            .unwrap_or_default();
        tracing::info!(tier = %name, element = %label, round = iterations, "round");
        send_event(events, LoopEvent::ElementStarted {
            tier: name.clone(),
            label: label.clone(),
        });

        let outcome = match tier.execute(order).await {
            Ok(outcome) => outcome,
            Err(e) => {
                // 不留下悬空的 executing 元素
                let _ = tier.list_mut().mark_failed(order, e.to_string());
                send_event(events, LoopEvent::Error { text: e.to_string() });
                return Err(e);
            }
        };

        match &outcome {
            ElementOutcome::Completed(_) => tier.list_mut().mark_completed(order)?,
            ElementOutcome::Failed {
                reason,
                possibly_applied: true,
            } => tier.list_mut().mark_failed_no_retry(order, reason.clone())?,
            ElementOutcome::Failed { reason, .. } => tier.list_mut().mark_failed(order, reason.clone())?,
            ElementOutcome::Suspended => {
                send_event(events, LoopEvent::AwaitingConfirmation { tier: name.clone() });
                return Ok(TierStop::AwaitingConfirmation);
            }
        }
        send_event(events, LoopEvent::ElementFinished {
            tier: name.clone(),
            label,
            status: tier
                .list()
                .get(order)
                .map(|e| e.status.to_string())
                .unwrap_or_default(),
        });

        tier.reassess(order, &outcome).await?;
        send_event(events, LoopEvent::Reassessed {
            tier: name.clone(),
            unresolved: tier.list().unresolved_count(),
        });
    }
}

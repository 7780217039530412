//! 编排过程事件：供前端（REPL / 流式接口）观察每一轮的进展

use serde::Serialize;

/// 单步过程事件（可序列化为 JSON）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoopEvent {
    /// 第几轮（从 1 开始）
    RoundStart {
        tier: String,
        round: usize,
        max_rounds: usize,
    },
    /// 元素进入 executing
    ElementStarted { tier: String, label: String },
    /// 元素执行结束
    ElementFinished {
        tier: String,
        label: String,
        status: String,
    },
    /// 重评估已应用
    Reassessed { tier: String, unresolved: usize },
    /// 等待用户确认
    AwaitingConfirmation { tier: String },
    /// tier 完成
    TierComplete { tier: String },
    /// 达到迭代上限
    IterationLimit { tier: String, iterations: usize },
    Error { text: String },
}

pub type EventSender = tokio::sync::mpsc::UnboundedSender<LoopEvent>;

pub(crate) fn send_event(tx: Option<&EventSender>, ev: LoopEvent) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}

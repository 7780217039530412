//! 会话监管：生命周期、中断管理
//!
//! 每个会话持有一个 CancellationToken；会话结束时取消，编排循环在轮与轮之间检查。

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

/// 会话级生命周期：取消令牌与最近活跃时间
#[derive(Debug, Clone)]
pub struct SessionSupervisor {
    cancel_token: CancellationToken,
    last_active: DateTime<Utc>,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self {
            cancel_token: CancellationToken::new(),
            last_active: Utc::now(),
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// 结束会话
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_active = now;
    }

    pub fn last_active(&self) -> DateTime<Utc> {
        self.last_active
    }

    pub fn is_idle_since(&self, now: DateTime<Utc>, timeout_secs: u64) -> bool {
        (now - self.last_active).num_seconds() >= timeout_secs as i64
    }
}

impl Default for SessionSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_cancel_propagates_to_clones() {
        let sup = SessionSupervisor::new();
        let token = sup.cancel_token();
        sup.cancel();
        assert!(token.is_cancelled());
        assert!(sup.is_cancelled());
    }

    #[test]
    fn test_idle_detection() {
        let mut sup = SessionSupervisor::new();
        let now = Utc::now();
        sup.touch(now);
        assert!(!sup.is_idle_since(now + Duration::seconds(10), 60));
        assert!(sup.is_idle_since(now + Duration::seconds(61), 60));
    }
}

//! 会话管理
//!
//! 会话按 ID 按需创建，每个会话在自己的 Mutex 之后运行；不同会话之间不共享任何控制状态。

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::agents::{EngineSettings, Master};
use crate::core::{EventSender, SessionSupervisor, TurnReply};
use crate::llm::RetryingOracle;
use crate::session::Session;
use crate::tools::AdapterRegistry;

/// 会话构造时注入 oracle 与适配器
#[derive(Clone)]
pub struct SessionFactory {
    oracle: Arc<RetryingOracle>,
    registry: AdapterRegistry,
    settings: EngineSettings,
    events: Option<EventSender>,
}

impl SessionFactory {
    pub fn new(oracle: Arc<RetryingOracle>, registry: AdapterRegistry, settings: EngineSettings) -> Self {
        Self {
            oracle,
            registry,
            settings,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    pub fn create(&self, id: &str) -> Session {
        let supervisor = SessionSupervisor::new();
        let mut master = Master::new(
            self.oracle.clone(),
            self.registry.clone(),
            self.settings.clone(),
            supervisor.cancel_token(),
        );
        if let Some(events) = &self.events {
            master = master.with_events(events.clone());
        }
        Session::new(id, master, supervisor)
    }
}

struct SessionHandle {
    session: Arc<Mutex<Session>>,
    /// 不必拿到会话锁即可结束会话
    cancel: CancellationToken,
}

pub struct SessionManager {
    factory: SessionFactory,
    sessions: RwLock<HashMap<String, SessionHandle>>,
    session_timeout_secs: u64,
}

impl SessionManager {
    pub fn new(factory: SessionFactory, session_timeout_secs: u64) -> Self {
        Self {
            factory,
            sessions: RwLock::new(HashMap::new()),
            session_timeout_secs,
        }
    }

    async fn get_or_create(&self, session_id: &str) -> Arc<Mutex<Session>> {
        if let Some(handle) = self.sessions.read().await.get(session_id) {
            return handle.session.clone();
        }
        let mut sessions = self.sessions.write().await;
        let handle = sessions.entry(session_id.to_string()).or_insert_with(|| {
            tracing::info!(session = session_id, "session created");
            let session = self.factory.create(session_id);
            let cancel = session.supervisor().cancel_token();
            SessionHandle {
                session: Arc::new(Mutex::new(session)),
                cancel,
            }
        });
        handle.session.clone()
    }

    pub async fn process_turn(&self, user_text: &str, session_id: &str) -> TurnReply {
        self.process_turn_at(user_text, session_id, Utc::now()).await
    }

    pub async fn process_turn_at(
        &self,
        user_text: &str,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> TurnReply {
        let session = self.get_or_create(session_id).await;
        let mut session = session.lock().await;
        session.process_turn_at(user_text, now).await
    }

    /// 结束会话：取消令牌在下一轮开始前生效，进行中的调用会跑完
    pub async fn end_session(&self, session_id: &str) -> bool {
        match self.sessions.write().await.remove(session_id) {
            Some(handle) => {
                handle.cancel.cancel();
                tracing::info!(session = session_id, "session ended");
                true
            }
            None => false,
        }
    }

    /// 清理空闲会话；正在处理输入的会话（锁被占用）跳过
    pub async fn cleanup_expired(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.write().await;
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, handle)| {
                handle
                    .session
                    .try_lock()
                    .map(|s| s.supervisor().is_idle_since(now, self.session_timeout_secs))
                    .unwrap_or(false)
            })
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            if let Some(handle) = sessions.remove(id) {
                handle.cancel.cancel();
            }
        }
        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "expired sessions removed");
        }
        expired.len()
    }

    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

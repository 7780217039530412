//! 适配器注册表
//!
//! 会话构造时注入：按 AgentKind 存储 Arc<dyn ServiceAdapter>，Master 据此决定能路由到哪些子智能体。

use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::AgentKind;
use crate::tools::ServiceAdapter;

#[derive(Default, Clone)]
pub struct AdapterRegistry {
    adapters: HashMap<AgentKind, Arc<dyn ServiceAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn ServiceAdapter>) {
        self.adapters.insert(adapter.domain(), adapter);
    }

    pub fn with(mut self, adapter: Arc<dyn ServiceAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn get(&self, kind: AgentKind) -> Option<Arc<dyn ServiceAdapter>> {
        self.adapters.get(&kind).cloned()
    }

    /// 已注册的领域（稳定顺序，用于 prompt）
    pub fn kinds(&self) -> Vec<AgentKind> {
        let mut kinds: Vec<AgentKind> = self.adapters.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }

    /// (领域, 工具名列表)，Master 规划指令里的 Available agents 段落
    pub fn descriptions(&self) -> Vec<(AgentKind, Vec<String>)> {
        self.kinds()
            .into_iter()
            .filter_map(|kind| {
                let adapter = self.adapters.get(&kind)?;
                let tools = adapter.tools().into_iter().map(|t| t.name).collect();
                Some((kind, tools))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{InMemoryCalendar, InMemoryMailbox};

    #[test]
    fn test_registry_lookup() {
        let registry = AdapterRegistry::new()
            .with(Arc::new(InMemoryMailbox::default()))
            .with(Arc::new(InMemoryCalendar::default()));
        assert!(registry.get(AgentKind::Mail).is_some());
        assert!(registry.get(AgentKind::Messaging).is_none());
        assert_eq!(registry.kinds(), vec![AgentKind::Calendar, AgentKind::Mail]);
        let desc = registry.descriptions();
        assert!(desc[1].1.contains(&"archive_emails".to_string()));
    }
}

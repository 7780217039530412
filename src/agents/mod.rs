//! 两层智能体：Master（跨领域规划）与 Sub-Agent（单领域执行）

pub mod master;
pub mod prompts;
pub mod sub_agent;

use crate::config::AppConfig;
use crate::core::LoopLimits;
use crate::llm::OracleOptions;
use crate::memory::KnowledgeBudget;

pub use master::Master;
pub use sub_agent::SubAgent;

/// 每个 tier 每次调用的迭代上限不超过该值
pub const MAX_ITERATIONS_CEILING: usize = 10;

/// 两层共用的引擎参数（由配置构造）
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub limits: LoopLimits,
    pub max_element_retries: u32,
    pub undo_window: chrono::Duration,
    pub knowledge_budget: KnowledgeBudget,
    pub tool_timeout_secs: u64,
    pub oracle_options: OracleOptions,
}

impl EngineSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        let max_iterations = cfg.engine.max_iterations.clamp(1, MAX_ITERATIONS_CEILING);
        if max_iterations != cfg.engine.max_iterations {
            tracing::warn!(
                configured = cfg.engine.max_iterations,
                used = max_iterations,
                "engine.max_iterations clamped"
            );
        }
        Self {
            limits: LoopLimits { max_iterations },
            max_element_retries: cfg.engine.max_element_retries,
            undo_window: chrono::Duration::seconds(cfg.engine.undo_window_secs),
            knowledge_budget: KnowledgeBudget::new(cfg.engine.knowledge_max_tokens),
            tool_timeout_secs: cfg.tools.tool_timeout_secs,
            oracle_options: cfg.oracle.options(),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iteration_ceiling_is_clamped() {
        let mut cfg = AppConfig::default();
        cfg.engine.max_iterations = 50;
        assert_eq!(EngineSettings::from_config(&cfg).limits.max_iterations, 10);
        cfg.engine.max_iterations = 0;
        assert_eq!(EngineSettings::from_config(&cfg).limits.max_iterations, 1);
        cfg.engine.max_iterations = 4;
        assert_eq!(EngineSettings::from_config(&cfg).limits.max_iterations, 4);
    }
}

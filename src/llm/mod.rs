//! Oracle 层：决策服务抽象与实现（OpenAI 兼容 / DeepSeek / Mock）、响应 schema

pub mod deepseek;
pub mod mock;
pub mod openai;
pub mod schema;
pub mod traits;

use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;

pub use deepseek::{create_deepseek_oracle, DEEPSEEK_CHAT};
pub use mock::{MockOracle, ScriptedOracle};
pub use openai::{extract_json, OpenAiOracle, TokenUsage};
pub use schema::{
    master_plan_schema, master_reassess_schema, sub_agent_schema, CommandDoc, LastActionDoc,
    MasterPlanDoc, MasterReassessDoc, PendingActionDoc, QueryType, SubAgentDoc,
};
pub use traits::{Oracle, OracleError, OracleOptions, OracleRequest, RetryConfig, RetryingOracle};

/// 根据配置与环境变量选择 Oracle 后端（DeepSeek / OpenAI 兼容 / Mock）
pub fn create_oracle_from_config(cfg: &AppConfig) -> Arc<dyn Oracle> {
    let provider = cfg.oracle.provider.to_lowercase();
    let has_deepseek_key = std::env::var("DEEPSEEK_API_KEY").is_ok();
    let has_openai_key = std::env::var("OPENAI_API_KEY").is_ok();

    match provider.as_str() {
        "deepseek" if has_deepseek_key || has_openai_key => {
            tracing::info!("Using DeepSeek oracle");
            Arc::new(create_deepseek_oracle(Some(&cfg.oracle.model)))
        }
        "openai" if has_openai_key => {
            tracing::info!("Using OpenAI oracle ({})", cfg.oracle.model);
            Arc::new(OpenAiOracle::new(
                cfg.oracle.base_url.as_deref(),
                &cfg.oracle.model,
                None,
            ))
        }
        _ => {
            tracing::warn!("No API key set or provider is mock, using Mock oracle");
            Arc::new(MockOracle)
        }
    }
}

/// 按配置包装重试与超时
pub fn retrying_from_config(inner: Arc<dyn Oracle>, cfg: &AppConfig) -> RetryingOracle {
    RetryingOracle::new(inner, RetryConfig::from(&cfg.oracle.retry))
        .with_timeout(Duration::from_secs(cfg.oracle.timeouts.request))
}

//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `CONDUCTOR__*` 覆盖（双下划线表示嵌套，如 `CONDUCTOR__ENGINE__MAX_ITERATIONS=8`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::llm::{OracleOptions, RetryConfig};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub oracle: OracleSection,
    pub engine: EngineSection,
    pub tools: ToolsSection,
}

/// [app] 段：应用名、会话空闲过期时间
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 会话空闲超过该秒数后可被 SessionManager::cleanup_expired 回收
    pub session_timeout_secs: u64,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            session_timeout_secs: 3600,
        }
    }
}

/// [oracle] 段：决策服务（LLM）后端、采样参数、超时与重试
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OracleSection {
    /// 后端：openai / deepseek / mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeouts: OracleTimeoutsSection,
    pub retry: RetrySection,
}

impl Default for OracleSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            temperature: 0.2,
            max_tokens: 2048,
            timeouts: OracleTimeoutsSection::default(),
            retry: RetrySection::default(),
        }
    }
}

impl OracleSection {
    pub fn options(&self) -> OracleOptions {
        OracleOptions {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            model: Some(self.model.clone()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OracleTimeoutsSection {
    /// 单次 oracle 调用超时（秒）
    pub request: u64,
}

impl Default for OracleTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

/// [oracle.retry] 段：有界重试 + 指数退避
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        let base = RetryConfig::default();
        Self {
            max_retries: base.max_retries,
            initial_backoff_ms: base.initial_backoff_ms,
            max_backoff_ms: base.max_backoff_ms,
        }
    }
}

impl From<&RetrySection> for RetryConfig {
    fn from(section: &RetrySection) -> Self {
        RetryConfig {
            max_retries: section.max_retries,
            initial_backoff_ms: section.initial_backoff_ms,
            max_backoff_ms: section.max_backoff_ms,
        }
    }
}

/// [engine] 段：控制状态引擎的硬上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// 每个 tier 每轮对话的最大迭代次数（无论 oracle 如何回答都保证终止）
    pub max_iterations: usize,
    /// 同一失败元素最多被重新执行的次数
    pub max_element_retries: u32,
    /// 可撤销写操作的撤销窗口（秒）
    pub undo_window_secs: i64,
    /// 累积知识超过该 token 数时告警
    pub knowledge_max_tokens: usize,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            max_element_retries: 2,
            undo_window_secs: crate::engine::DEFAULT_UNDO_WINDOW_SECS,
            knowledge_max_tokens: 1500,
        }
    }
}

/// [tools] 段：服务适配器调用超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
        }
    }
}

/// 从 config 目录加载配置，环境变量 CONDUCTOR__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 CONDUCTOR__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("CONDUCTOR")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_when_no_file() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.engine.max_iterations, 10);
        assert_eq!(cfg.engine.undo_window_secs, 300);
        assert_eq!(cfg.engine.max_element_retries, 2);
        assert_eq!(cfg.tools.tool_timeout_secs, 30);
        assert_eq!(cfg.oracle.retry.max_retries, RetryConfig::default().max_retries);
    }

    #[test]
    fn test_load_explicit_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[engine]\nmax_iterations = 4\n\n[oracle]\nprovider = \"mock\"\n\n[oracle.retry]\nmax_retries = 1"
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.engine.max_iterations, 4);
        // 未写的键保持默认
        assert_eq!(cfg.engine.undo_window_secs, 300);
        assert_eq!(cfg.oracle.provider, "mock");
        assert_eq!(cfg.oracle.retry.max_retries, 1);
        assert_eq!(cfg.oracle.retry.max_backoff_ms, RetryConfig::default().max_backoff_ms);
    }
}

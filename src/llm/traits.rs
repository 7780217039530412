//! Oracle 抽象
//!
//! 决策服务（LLM）被视为「纯但可失败」的边界：给定指令与目标 schema，返回符合 schema 的结构化文档或失败。
//! RetryingOracle 负责单次调用超时、按 schema 解码与有界退避重试。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// 采样参数（temperature / max_tokens / model）
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OracleOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    pub model: Option<String>,
}

impl Default for OracleOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 2048,
            model: None,
        }
    }
}

/// 一次结构化请求：system 指令 + user 指令 + 响应 JSON Schema
#[derive(Debug, Clone)]
pub struct OracleRequest {
    pub system: String,
    pub user: String,
    pub schema: Value,
    pub options: OracleOptions,
}

impl OracleRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>, schema: Value) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            schema,
            options: OracleOptions::default(),
        }
    }

    pub fn with_options(mut self, options: OracleOptions) -> Self {
        self.options = options;
        self
    }
}

/// Oracle 调用失败
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OracleError {
    #[error("oracle timed out")]
    Timeout,

    #[error("oracle rate limited (retry after {retry_after_ms} ms)")]
    RateLimited { retry_after_ms: u64 },

    /// 输出不是 JSON 或不符合 schema
    #[error("malformed oracle output: {0}")]
    Malformed(String),

    #[error("oracle API error: {0}")]
    Api(String),
}

impl OracleError {
    /// 超时、限流、格式错误可重试；API 错误（鉴权、参数）不重试
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OracleError::Timeout | OracleError::RateLimited { .. } | OracleError::Malformed(_)
        )
    }
}

/// Oracle trait：所有后端（OpenAI 兼容 / DeepSeek / Mock）实现 invoke
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn invoke(&self, request: &OracleRequest) -> Result<Value, OracleError>;
}

/// 重试配置：最多 max_retries 次，退避从 initial_backoff_ms 指数增长，上限 max_backoff_ms
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8000,
        }
    }
}

impl RetryConfig {
    /// 第 attempt 次失败（从 0 计）后的等待时间；限流时至少等待服务端给出的时长
    pub fn delay_for(&self, attempt: u32, err: &OracleError) -> Duration {
        let exp = self
            .initial_backoff_ms
            .saturating_mul(1u64 << attempt.min(16))
            .min(self.max_backoff_ms);
        let ms = match err {
            OracleError::RateLimited { retry_after_ms } => exp.max(*retry_after_ms),
            _ => exp,
        };
        Duration::from_millis(ms)
    }
}

/// 带超时、解码与重试的 Oracle 包装
pub struct RetryingOracle {
    inner: Arc<dyn Oracle>,
    config: RetryConfig,
    timeout: Duration,
}

impl RetryingOracle {
    pub fn new(inner: Arc<dyn Oracle>, config: RetryConfig) -> Self {
        Self {
            inner,
            config,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 调用 oracle 并解码为 T；解码失败视为 Malformed，可重试错误按退避重试
    pub async fn invoke_as<T: DeserializeOwned>(&self, request: &OracleRequest) -> Result<T, OracleError> {
        let mut attempt: u32 = 0;
        loop {
            let result = match tokio::time::timeout(self.timeout, self.inner.invoke(request)).await {
                Ok(r) => r,
                Err(_) => Err(OracleError::Timeout),
            }
            .and_then(|doc| {
                serde_json::from_value::<T>(doc).map_err(|e| OracleError::Malformed(e.to_string()))
            });

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = self.config.delay_for(attempt, &e);
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "oracle call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

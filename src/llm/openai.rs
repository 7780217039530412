//! OpenAI 兼容 Oracle
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；schema 拼入 system 指令，
//! 回复中提取 JSON 对象后返回。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use serde_json::Value;

use crate::llm::{Oracle, OracleError, OracleRequest};

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        let p = self.prompt_tokens.load(Ordering::Relaxed);
        let c = self.completion_tokens.load(Ordering::Relaxed);
        (p, c, p + c)
    }
}

/// OpenAI 兼容 Oracle：持有 Client 与默认 model 名
pub struct OpenAiOracle {
    client: Client<OpenAIConfig>,
    model: String,
    pub usage: TokenUsage,
}

impl OpenAiOracle {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = match base_url {
            Some(url) => OpenAIConfig::new().with_api_base(url).with_api_key(api_key),
            None => OpenAIConfig::new().with_api_key(api_key),
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            usage: TokenUsage::default(),
        }
    }

    fn build_messages(request: &OracleRequest) -> Result<Vec<ChatCompletionRequestMessage>, OracleError> {
        let schema = serde_json::to_string_pretty(&request.schema).unwrap_or_default();
        let system = format!(
            "{}\n\nRespond with exactly one JSON object that conforms to this JSON Schema. \
             Output no prose and no Markdown.\n{}",
            request.system, schema
        );
        let system = ChatCompletionRequestSystemMessageArgs::default()
            .content(system)
            .build()
            .map_err(|e| OracleError::Api(e.to_string()))?;
        let user = ChatCompletionRequestUserMessageArgs::default()
            .content(request.user.clone())
            .build()
            .map_err(|e| OracleError::Api(e.to_string()))?;
        Ok(vec![
            ChatCompletionRequestMessage::System(system),
            ChatCompletionRequestMessage::User(user),
        ])
    }
}

/// 从回复文本中提取 JSON 对象（```json 代码块或首尾花括号之间）
pub fn extract_json(output: &str) -> Result<Value, OracleError> {
    let trimmed = output.trim();
    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim())
    } else {
        match (trimmed.find('{'), trimmed.rfind('}')) {
            (Some(start), Some(end)) if end > start => &trimmed[start..=end],
            _ => return Err(OracleError::Malformed(format!("no JSON object in: {trimmed}"))),
        }
    };
    serde_json::from_str(json_str).map_err(|e| OracleError::Malformed(format!("{e}: {json_str}")))
}

fn classify_api_error(message: String) -> OracleError {
    let lower = message.to_lowercase();
    if lower.contains("rate limit") || lower.contains("429") {
        OracleError::RateLimited { retry_after_ms: 1000 }
    } else if lower.contains("timed out") || lower.contains("timeout") {
        OracleError::Timeout
    } else {
        OracleError::Api(message)
    }
}

#[async_trait]
impl Oracle for OpenAiOracle {
    async fn invoke(&self, request: &OracleRequest) -> Result<Value, OracleError> {
        let model = request.options.model.clone().unwrap_or_else(|| self.model.clone());
        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(Self::build_messages(request)?)
            .temperature(request.options.temperature)
            .build()
            .map_err(|e| OracleError::Api(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(chat_request)
            .await
            .map_err(|e| classify_api_error(e.to_string()))?;

        if let Some(usage) = &response.usage {
            self.usage
                .add(usage.prompt_tokens as u64, usage.completion_tokens as u64);
        }

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        extract_json(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_from_fenced_block() {
        let out = "Here you go:\n```json\n{\"is_complete\": true}\n```";
        assert_eq!(extract_json(out).unwrap()["is_complete"], true);
    }

    #[test]
    fn test_extract_json_rejects_prose() {
        assert!(matches!(
            extract_json("I archived them all."),
            Err(OracleError::Malformed(_))
        ));
    }

    #[test]
    fn test_rate_limit_classified() {
        assert!(matches!(
            classify_api_error("HTTP 429 Too Many Requests".to_string()),
            OracleError::RateLimited { .. }
        ));
        assert!(matches!(
            classify_api_error("invalid api key".to_string()),
            OracleError::Api(_)
        ));
    }
}

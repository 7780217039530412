//! DeepSeek Oracle（OpenAI 兼容格式）
//!
//! - Base URL: https://api.deepseek.com
//! - 模型: deepseek-chat

use crate::llm::OpenAiOracle;

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";

/// 创建 DeepSeek Oracle：优先 `DEEPSEEK_API_KEY`，模型可由参数或 `DEEPSEEK_MODEL` 指定
pub fn create_deepseek_oracle(model: Option<&str>) -> OpenAiOracle {
    let api_key = std::env::var("DEEPSEEK_API_KEY")
        .ok()
        .or_else(|| std::env::var("OPENAI_API_KEY").ok());

    let model = model
        .map(String::from)
        .or_else(|| std::env::var("DEEPSEEK_MODEL").ok())
        .unwrap_or_else(|| DEEPSEEK_CHAT.to_string());

    OpenAiOracle::new(Some(DEEPSEEK_BASE_URL), &model, api_key.as_deref())
}

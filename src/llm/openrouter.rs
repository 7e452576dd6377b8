//! OpenRouter 客户端（OpenAI 兼容格式）
//!
//! - Base URL: https://openrouter.ai/api/v1
//! - Key: 环境变量 `OPENROUTER_KEY`（兼容 `OPENROUTER_API_KEY`）

use crate::llm::OpenAiClient;

pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const OPENROUTER_DEFAULT_MODEL: &str = "openai/gpt-4o";

/// 从环境变量读取 OpenRouter Key
pub fn openrouter_api_key() -> Option<String> {
    std::env::var("OPENROUTER_KEY")
        .ok()
        .or_else(|| std::env::var("OPENROUTER_API_KEY").ok())
        .filter(|k| !k.trim().is_empty())
}

/// 创建 OpenRouter 客户端；无 Key 时返回 None
pub fn create_openrouter_client(model: Option<&str>, base_url: Option<&str>) -> Option<OpenAiClient> {
    let api_key = openrouter_api_key()?;
    let model = model.unwrap_or(OPENROUTER_DEFAULT_MODEL);
    Some(OpenAiClient::new(
        Some(base_url.unwrap_or(OPENROUTER_BASE_URL)),
        model,
        &api_key,
    ))
}

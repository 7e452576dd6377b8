//! LLM 层：补全服务客户端抽象与实现（OpenAI 兼容 / OpenRouter / Mock）、重试包装

pub mod message;
pub mod mock;
pub mod openai;
pub mod openrouter;
pub mod traits;

pub use message::{Message, Role};
pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, TokenUsage};
pub use openrouter::{create_openrouter_client, openrouter_api_key, OPENROUTER_BASE_URL};
pub use traits::{LlmClient, LlmError, RetryConfig, RetryingLlmClient};

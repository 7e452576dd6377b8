//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / OpenRouter / Mock）实现 LlmClient::complete（非流式）。
//! LlmError 区分「传输失败」（网络、超时、限流、服务端错误）与「响应不合法」，
//! RetryingLlmClient 只对前者做有限次数的退避重试。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::llm::Message;

/// 补全服务错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("rate limited (retry after {retry_after_ms} ms)")]
    RateLimited { retry_after_ms: u64 },

    #[error("api error: {0}")]
    ApiError(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    /// 传输类错误（可重试）；InvalidResponse 属于模型输出问题，不重试
    pub fn is_transport(&self) -> bool {
        !matches!(self, LlmError::InvalidResponse(_))
    }
}

/// LLM 客户端 trait：一次请求、一次完整回复
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// 模型名（日志用）
    fn model_name(&self) -> &str {
        "unknown"
    }
}

/// 重试策略：总尝试次数与首次退避时长（之后每次翻倍）
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryConfig {
    fn delay_for(&self, attempt: u32, err: &LlmError) -> Duration {
        if let LlmError::RateLimited { retry_after_ms } = err {
            return Duration::from_millis(*retry_after_ms).max(self.base_delay);
        }
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// 带重试的包装客户端
pub struct RetryingLlmClient {
    inner: Arc<dyn LlmClient>,
    config: RetryConfig,
}

impl RetryingLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl LlmClient for RetryingLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.inner.complete(messages).await {
                Ok(content) => return Ok(content),
                Err(e) if e.is_transport() && attempt < max_attempts => {
                    let delay = self.config.delay_for(attempt, &e);
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "completion failed, retrying: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    fn fast_retry(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transport_error() {
        let mock = Arc::new(MockLlmClient::with_responses(vec![
            Err(LlmError::Network("connection reset".into())),
            Ok("fine".into()),
        ]));
        let client = RetryingLlmClient::new(mock.clone(), fast_retry(2));
        let out = client.complete(&[Message::user("hi")]).await;
        assert_eq!(out, Ok("fine".to_string()));
        assert_eq!(mock.calls(), 2);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_attempts() {
        let mock = Arc::new(MockLlmClient::with_responses(vec![
            Err(LlmError::Timeout),
            Err(LlmError::Timeout),
            Ok("too late".into()),
        ]));
        let client = RetryingLlmClient::new(mock.clone(), fast_retry(2));
        let out = client.complete(&[Message::user("hi")]).await;
        assert_eq!(out, Err(LlmError::Timeout));
        assert_eq!(mock.calls(), 2);
    }

    #[tokio::test]
    async fn test_invalid_response_is_not_retried() {
        let mock = Arc::new(MockLlmClient::with_responses(vec![
            Err(LlmError::InvalidResponse("empty".into())),
            Ok("unused".into()),
        ]));
        let client = RetryingLlmClient::new(mock.clone(), fast_retry(2));
        assert!(client.complete(&[Message::user("hi")]).await.is_err());
        assert_eq!(mock.calls(), 1);
    }

    #[test]
    fn test_error_kinds() {
        assert!(LlmError::Network("x".into()).is_transport());
        assert!(LlmError::RateLimited { retry_after_ms: 10 }.is_transport());
        assert!(!LlmError::InvalidResponse("x".into()).is_transport());
    }
}

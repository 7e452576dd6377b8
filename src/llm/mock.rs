//! Mock LLM 客户端（用于测试与无 API Key 的本地运行）
//!
//! 默认行为：把最后一条 User 消息里的请求原文包装成单步 echo 计划；
//! with_responses 则按顺序返回预置的结果（可混入错误），用完后回到默认行为。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError, Message, Role};

/// 计划提示里用户请求所在段落的前缀（见 plan::generator）
const REQUEST_MARKER: &str = "USER REQUEST:";

#[derive(Debug, Default)]
pub struct MockLlmClient {
    responses: Mutex<VecDeque<Result<String, LlmError>>>,
    calls: AtomicUsize,
    last_messages: Mutex<Vec<Message>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按顺序返回预置结果
    pub fn with_responses(responses: Vec<Result<String, LlmError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            ..Self::default()
        }
    }

    /// 已被调用的次数
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 最近一次调用收到的消息
    pub fn last_messages(&self) -> Vec<Message> {
        self.last_messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    fn echo_plan(messages: &[Message]) -> String {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        let request = last_user
            .find(REQUEST_MARKER)
            .map(|i| &last_user[i + REQUEST_MARKER.len()..])
            .and_then(|rest| rest.trim_start().lines().next())
            .unwrap_or(last_user)
            .trim();
        serde_json::json!({
            "steps": [
                { "tool": "echo", "args": { "text": format!("Echo from Mock: {request}") } }
            ]
        })
        .to_string()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_messages.lock() {
            *last = messages.to_vec();
        }
        let scripted = self
            .responses
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front());
        match scripted {
            Some(result) => result,
            None => Ok(Self::echo_plan(messages)),
        }
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

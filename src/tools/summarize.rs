//! summarize：用 LLM 总结一段文本或一个视频的字幕
//!
//! source 为短输入且能识别出视频 ID 时先抓取字幕，否则直接把 source 当作正文；
//! 输入按 max_input_chars 截断后发送给补全服务。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::llm::{LlmClient, Message};
use crate::tools::youtube::{extract_video_id, TranscriptClient};
use crate::tools::Tool;

const DEFAULT_SUMMARY_PROMPT: &str = "You are a concise summarizer. \
Summarize the following content in 3-5 clear bullet points. \
Be direct and informative.";

/// 视为「视频引用」而不是正文的最大输入长度
const MAX_REFERENCE_CHARS: usize = 200;

pub struct SummarizeTool {
    llm: Arc<dyn LlmClient>,
    transcripts: Arc<TranscriptClient>,
    max_input_chars: usize,
}

impl SummarizeTool {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        transcripts: Arc<TranscriptClient>,
        max_input_chars: usize,
    ) -> Self {
        Self {
            llm,
            transcripts,
            max_input_chars,
        }
    }

    async fn resolve_source(&self, source: &str) -> Result<String, String> {
        if source.chars().count() <= MAX_REFERENCE_CHARS {
            if let Some(id) = extract_video_id(source) {
                return self.transcripts.fetch(&id, None).await;
            }
        }
        Ok(source.to_string())
    }
}

#[async_trait]
impl Tool for SummarizeTool {
    fn name(&self) -> &str {
        "summarize"
    }

    fn description(&self) -> &str {
        "Summarize text in a few bullet points. If the source is a YouTube URL or video ID, \
         its transcript is fetched and summarized."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "source": { "type": "string", "description": "Text to summarize, or a YouTube URL / video ID" },
                "instructions": { "type": "string", "description": "Optional custom summarization instructions" }
            },
            "required": ["source"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let source = args.get("source").and_then(Value::as_str).unwrap_or_default();
        let content = self.resolve_source(source).await?;
        if content.trim().is_empty() {
            return Err("nothing to summarize".to_string());
        }

        let prompt = args
            .get("instructions")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(DEFAULT_SUMMARY_PROMPT);
        let input: String = content.chars().take(self.max_input_chars).collect();

        self.llm
            .complete(&[Message::system(prompt), Message::user(input)])
            .await
            .map_err(|e| format!("summarization failed: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, MockLlmClient};

    fn tool(mock: Arc<MockLlmClient>, max_input_chars: usize) -> SummarizeTool {
        let transcripts = Arc::new(TranscriptClient::new(
            "http://127.0.0.1:9/unreachable",
            vec!["en".to_string()],
            1,
        ));
        SummarizeTool::new(mock, transcripts, max_input_chars)
    }

    #[tokio::test]
    async fn test_summarizes_plain_text_with_cap() {
        let mock = Arc::new(MockLlmClient::with_responses(vec![Ok("- point".into())]));
        let long_text = "word ".repeat(100);
        let out = tool(mock.clone(), 10)
            .execute(serde_json::json!({"source": long_text}))
            .await;
        assert_eq!(out, Ok("- point".to_string()));

        let sent = mock.last_messages();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].content.chars().count(), 10);
    }

    #[tokio::test]
    async fn test_llm_failure_is_reported() {
        let mock = Arc::new(MockLlmClient::with_responses(vec![Err(LlmError::Timeout)]));
        let out = tool(mock, 100)
            .execute(serde_json::json!({"source": "some plain text to summarize"}))
            .await;
        assert_eq!(out, Err("summarization failed: request timed out".to_string()));
    }
}

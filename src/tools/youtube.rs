//! YouTube 工具：链接识别（link_detect）与字幕抓取（transcript_fetch）
//!
//! 视频 ID 支持 watch?v=、youtu.be/、/shorts/、/embed/ 以及裸 11 位 ID。
//! 字幕通过 timedtext 接口按语言列表依次尝试，返回的 XML 片段拼接为纯文本。

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde_json::Value;

use crate::tools::Tool;

pub const DEFAULT_TIMEDTEXT_URL: &str = "https://www.youtube.com/api/timedtext";

fn url_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"[?&]v=([A-Za-z0-9_-]{11})",
            r"youtu\.be/([A-Za-z0-9_-]{11})",
            r"youtube\.com/(?:shorts|embed|live)/([A-Za-z0-9_-]{11})",
        ]
        .into_iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

fn is_bare_id(s: &str) -> bool {
    s.len() == 11
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// 从任意输入中提取 YouTube 视频 ID
pub fn extract_video_id(input: &str) -> Option<String> {
    for re in url_patterns() {
        if let Some(id) = re.captures(input).and_then(|c| c.get(1)) {
            return Some(id.as_str().to_string());
        }
    }
    let trimmed = input.trim();
    is_bare_id(trimmed).then(|| trimmed.to_string())
}

/// 把 timedtext XML 转成纯文本
fn parse_timedtext(xml: &str) -> String {
    static TEXT_RE: OnceLock<Option<Regex>> = OnceLock::new();
    let Some(re) = TEXT_RE
        .get_or_init(|| Regex::new(r"(?s)<text[^>]*>(.*?)</text>").ok())
        .as_ref()
    else {
        return String::new();
    };
    re.captures_iter(xml)
        .filter_map(|c| c.get(1))
        .map(|m| decode_entities(m.as_str()))
        .map(|s| s.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn decode_entities(s: &str) -> String {
    s.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// 字幕客户端：transcript_fetch 与 summarize 共用
pub struct TranscriptClient {
    client: Client,
    base_url: String,
    languages: Vec<String>,
}

impl TranscriptClient {
    pub fn new(base_url: impl Into<String>, languages: Vec<String>, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
            languages,
        }
    }

    /// 依次尝试 preferred 与配置的语言（去重），返回第一份非空字幕
    pub async fn fetch(&self, video_id: &str, preferred: Option<&str>) -> Result<String, String> {
        let mut langs: Vec<&str> = Vec::new();
        for lang in preferred.into_iter().chain(self.languages.iter().map(String::as_str)) {
            if !langs.contains(&lang) {
                langs.push(lang);
            }
        }

        let mut last_error = None;
        for lang in &langs {
            let response = self
                .client
                .get(&self.base_url)
                .query(&[("lang", *lang), ("v", video_id)])
                .send()
                .await;
            let body = match response {
                Ok(r) if r.status().is_success() => r.text().await.map_err(|e| e.to_string()),
                Ok(r) => Err(format!("HTTP {}", r.status())),
                Err(e) => Err(e.to_string()),
            };
            match body {
                Ok(xml) => {
                    let text = parse_timedtext(&xml);
                    if !text.is_empty() {
                        tracing::debug!(video_id, lang, chars = text.len(), "transcript fetched");
                        return Ok(text);
                    }
                }
                Err(e) => {
                    tracing::debug!(video_id, lang, "transcript request failed: {}", e);
                    last_error = Some(e);
                }
            }
        }

        Err(match last_error {
            Some(e) => format!("transcript unavailable for {video_id}: {e}"),
            None => format!(
                "no transcript available for {video_id} (tried: {})",
                langs.join(", ")
            ),
        })
    }
}

/// link_detect：从文本中识别视频 ID
pub struct LinkDetectTool;

#[async_trait]
impl Tool for LinkDetectTool {
    fn name(&self) -> &str {
        "link_detect"
    }

    fn description(&self) -> &str {
        "Extract a YouTube video ID from raw user text (watch URL, youtu.be link, or bare ID)."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "text": { "type": "string", "description": "Raw text that may contain a YouTube link" }
            },
            "required": ["text"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let text = args.get("text").and_then(Value::as_str).unwrap_or_default();
        extract_video_id(text)
            .map(|id| format!("video_id={id}"))
            .ok_or_else(|| "No valid YouTube video ID found in input.".to_string())
    }
}

/// transcript_fetch：抓取视频字幕
pub struct TranscriptFetchTool {
    client: Arc<TranscriptClient>,
    max_chars: usize,
}

impl TranscriptFetchTool {
    pub fn new(client: Arc<TranscriptClient>, max_chars: usize) -> Self {
        Self { client, max_chars }
    }
}

#[async_trait]
impl Tool for TranscriptFetchTool {
    fn name(&self) -> &str {
        "transcript_fetch"
    }

    fn description(&self) -> &str {
        "Fetch the transcript of a YouTube video given its URL or 11-character ID."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "video": { "type": "string", "description": "YouTube URL or video ID" },
                "language": { "type": "string", "description": "Preferred transcript language, e.g. en" }
            },
            "required": ["video"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let video = args.get("video").and_then(Value::as_str).unwrap_or_default();
        let id = extract_video_id(video)
            .ok_or_else(|| format!("'{video}' is not a YouTube URL or video ID"))?;
        let language = args.get("language").and_then(Value::as_str);

        let text = self.client.fetch(&id, language).await?;
        let words = text.split_whitespace().count();
        Ok(format!(
            "transcript for {id} ({words} words): {}",
            truncate_chars(&text, self.max_chars)
        ))
    }
}

/// 超过 max_chars 时截断并追加 ...[truncated]
pub(crate) fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        format!("{}...[truncated]", s.chars().take(max_chars).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_video_id_forms() {
        assert_eq!(
            extract_video_id("summarize https://youtu.be/dQw4w9WgXcQ please").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(
            extract_video_id("https://www.youtube.com/shorts/abcDEF_1234").as_deref(),
            Some("abcDEF_1234")
        );
        assert_eq!(extract_video_id("  abcDEF-1234 ").as_deref(), Some("abcDEF-1234"));
        assert_eq!(extract_video_id("no link here"), None);
        assert_eq!(extract_video_id("https://example.com/watch?x=1"), None);
    }

    #[test]
    fn test_parse_timedtext() {
        let xml = r#"<?xml version="1.0"?><transcript><text start="0" dur="1.2">Hello &amp; welcome</text><text start="1.2" dur="2">it&#39;s
a test</text><text start="3" dur="1"></text></transcript>"#;
        assert_eq!(parse_timedtext(xml), "Hello & welcome it's a test");
        assert_eq!(parse_timedtext("<transcript/>"), "");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abc", 5), "abc");
        assert_eq!(truncate_chars("abcdef", 3), "abc...[truncated]");
    }

    #[tokio::test]
    async fn test_link_detect_tool() {
        let ok = LinkDetectTool
            .execute(serde_json::json!({"text": "see https://youtu.be/dQw4w9WgXcQ"}))
            .await;
        assert_eq!(ok, Ok("video_id=dQw4w9WgXcQ".to_string()));

        let err = LinkDetectTool
            .execute(serde_json::json!({"text": "nothing"}))
            .await;
        assert!(err.is_err());
    }
}

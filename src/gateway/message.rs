//! 网关消息协议定义
//!
//! 入站：`request`、`get_history`、`ping`；不是 JSON 的文本帧整体当作一次请求。
//! 出站：会话事件（见 `core::SessionEvent`）以及这里的控制消息 `error`、`history`、`pong`。

use serde::{Deserialize, Serialize};

use crate::memory::MemoryRecord;

/// 客户端发来的消息
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// 新请求，触发一个会话
    Request { text: String },

    /// 查询历史：给 sessionId 时返回该会话全部步骤，否则返回最近 limit 条
    GetHistory {
        #[serde(default)]
        session_id: Option<String>,
        #[serde(default)]
        limit: Option<usize>,
    },

    /// 心跳 ping
    Ping {
        #[serde(default)]
        timestamp: Option<u64>,
    },
}

/// 网关自身的控制消息
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    Error { code: String, message: String },

    History { records: Vec<MemoryRecord> },

    Pong {
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },
}

impl ControlMessage {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        ControlMessage::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

pub const ERR_PARSE: &str = "parse_error";
pub const ERR_INVALID_REQUEST: &str = "invalid_request";
pub const ERR_TOO_MANY_CONNECTIONS: &str = "too_many_connections";
pub const ERR_HISTORY: &str = "history_error";

/// 解析一个文本帧
///
/// 以 `{` 开头的按 JSON 消息解析，失败返回 parse_error；其他文本视为纯文本请求。
/// 空请求返回 invalid_request。
pub fn parse_client_frame(text: &str) -> Result<ClientMessage, ControlMessage> {
    let trimmed = text.trim();
    let message = if trimmed.starts_with('{') {
        serde_json::from_str::<ClientMessage>(trimmed)
            .map_err(|e| ControlMessage::error(ERR_PARSE, e.to_string()))?
    } else {
        ClientMessage::Request {
            text: trimmed.to_string(),
        }
    };

    match message {
        ClientMessage::Request { text } if text.trim().is_empty() => {
            Err(ControlMessage::error(ERR_INVALID_REQUEST, "request text is empty"))
        }
        other => Ok(other),
    }
}

/// 序列化为文本帧；失败时记录日志并返回 None
pub fn to_frame<T: Serialize>(message: &T) -> Option<String> {
    match serde_json::to_string(message) {
        Ok(json) => Some(json),
        Err(e) => {
            tracing::error!("Failed to serialize outbound message: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_request() {
        assert_eq!(
            parse_client_frame(r#"{"type":"request","text":"summarize https://youtu.be/abc"}"#).unwrap(),
            ClientMessage::Request {
                text: "summarize https://youtu.be/abc".into()
            }
        );
    }

    #[test]
    fn test_plain_text_is_request() {
        assert_eq!(
            parse_client_frame("  hello there \n").unwrap(),
            ClientMessage::Request {
                text: "hello there".into()
            }
        );
    }

    #[test]
    fn test_get_history_fields_optional() {
        assert_eq!(
            parse_client_frame(r#"{"type":"get_history","sessionId":"session_1","limit":5}"#).unwrap(),
            ClientMessage::GetHistory {
                session_id: Some("session_1".into()),
                limit: Some(5)
            }
        );
        assert_eq!(
            parse_client_frame(r#"{"type":"get_history"}"#).unwrap(),
            ClientMessage::GetHistory {
                session_id: None,
                limit: None
            }
        );
    }

    #[test]
    fn test_errors() {
        let err = parse_client_frame(r#"{"type":"request""#).unwrap_err();
        assert!(matches!(err, ControlMessage::Error { ref code, .. } if code == "parse_error"));

        let err = parse_client_frame(r#"{"type":"unknown"}"#).unwrap_err();
        assert!(matches!(err, ControlMessage::Error { ref code, .. } if code == "parse_error"));

        let err = parse_client_frame(r#"{"type":"request","text":"   "}"#).unwrap_err();
        assert!(matches!(err, ControlMessage::Error { ref code, .. } if code == "invalid_request"));

        assert!(parse_client_frame("   ").is_err());
    }

    #[test]
    fn test_control_wire_format() {
        assert_eq!(
            serde_json::to_value(ControlMessage::error("parse_error", "bad")).unwrap(),
            json!({"type": "error", "code": "parse_error", "message": "bad"})
        );
        assert_eq!(
            serde_json::to_value(ControlMessage::Pong { timestamp: Some(7) }).unwrap(),
            json!({"type": "pong", "timestamp": 7})
        );
        assert_eq!(
            serde_json::to_value(ControlMessage::History { records: vec![] }).unwrap(),
            json!({"type": "history", "records": []})
        );
    }
}

//! WebSocket 网关：会话传输层
//!
//! 客户端通过一个持久 WebSocket 连接提交请求并实时接收会话事件：
//! `session_started`、`step_started`、`step_completed`、`session_completed` / `session_failed`。
//! 另外支持 `get_history` 查询已持久化的步骤记录和 `ping` 心跳。

mod message;
mod server;

pub use message::{
    parse_client_frame, to_frame, ClientMessage, ControlMessage, ERR_HISTORY, ERR_INVALID_REQUEST,
    ERR_PARSE, ERR_TOO_MANY_CONNECTIONS,
};
pub use server::{Gateway, GatewayConfig};

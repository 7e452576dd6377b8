//! 工具调度器
//!
//! dispatch(tool, args) 的所有路径都以 Observation 结束：未知工具、参数校验失败、工具返回错误、
//! 超时、panic 都被转成 "Error: ..."，成功转成 "Success: ..."，错误不会越过这一层。
//! 每次调用输出一条结构化审计日志（JSON）。

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::time::timeout;

use crate::tools::{validate_args, ToolRegistry};

/// 单步执行的局部错误（只用于生成 Observation）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("unknown tool {0}")]
    UnknownTool(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("{0}")]
    Execution(String),

    #[error("tool '{tool}' timed out after {secs}s")]
    Timeout { tool: String, secs: u64 },

    #[error("tool '{0}' panicked")]
    Panicked(String),
}

impl DispatchError {
    fn outcome(&self) -> &'static str {
        match self {
            DispatchError::UnknownTool(_) => "unknown_tool",
            DispatchError::InvalidArguments(_) => "invalid_args",
            DispatchError::Execution(_) => "error",
            DispatchError::Timeout { .. } => "timeout",
            DispatchError::Panicked(_) => "panic",
        }
    }
}

/// 工具执行结果的字符串形式，附带成功/失败标记
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub success: bool,
    pub text: String,
}

impl Observation {
    pub fn success(message: impl AsRef<str>) -> Self {
        Self {
            success: true,
            text: format!("Success: {}", message.as_ref()),
        }
    }

    pub fn failure(err: &DispatchError) -> Self {
        Self {
            success: false,
            text: format!("Error: {err}"),
        }
    }
}

/// 工具调度器：只读持有注册表，对每次调用施加超时
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs.max(1)),
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub async fn dispatch(&self, tool_name: &str, args: &Value) -> Observation {
        let start = Instant::now();
        let result = self.try_dispatch(tool_name, args).await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.outcome(),
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": result.is_ok(),
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(args),
        });
        tracing::info!(audit = %audit, "tool");

        match result {
            Ok(message) => Observation::success(message),
            Err(e) => Observation::failure(&e),
        }
    }

    async fn try_dispatch(&self, tool_name: &str, args: &Value) -> Result<String, DispatchError> {
        let spec = self
            .registry
            .resolve(tool_name)
            .ok_or_else(|| DispatchError::UnknownTool(tool_name.to_string()))?;

        let validated =
            validate_args(&spec.parameters, args).map_err(DispatchError::InvalidArguments)?;

        let handler = spec.handler();
        let call = AssertUnwindSafe(handler.execute(validated)).catch_unwind();
        match timeout(self.timeout, call).await {
            Ok(Ok(Ok(message))) => Ok(message),
            Ok(Ok(Err(message))) => Err(DispatchError::Execution(message)),
            Ok(Err(_panic)) => Err(DispatchError::Panicked(tool_name.to_string())),
            Err(_) => Err(DispatchError::Timeout {
                tool: tool_name.to_string(),
                secs: self.timeout.as_secs(),
            }),
        }
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

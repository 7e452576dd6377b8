//! 会话级错误
//!
//! 步骤内错误（未知工具、参数校验、工具失败）在 ToolDispatcher 内变成 Observation，不会出现在这里；
//! 这里只有会让整个会话结束的错误，以及它们在 session_failed 事件里对应的原因码。

use thiserror::Error;

use crate::memory::MemoryError;
use crate::plan::{PlanError, StepError};

use super::state::SessionPhase;

pub const REASON_PLAN_GENERATION: &str = "plan_generation_error";
pub const REASON_PERSISTENCE: &str = "persistence_error";
pub const REASON_CLIENT_DISCONNECTED: &str = "client_disconnected";
pub const REASON_INTERNAL: &str = "internal_error";

#[derive(Error, Debug)]
pub enum AgentError {
    /// 客户端连接问题：结束会话，不影响进程
    #[error("transport error: {0}")]
    Transport(String),

    #[error("plan generation failed: {0}")]
    PlanGeneration(#[from] PlanError),

    #[error("persistence failed: {0}")]
    Persistence(#[from] MemoryError),

    #[error("invalid session transition {from:?} -> {to:?}")]
    InvalidTransition { from: SessionPhase, to: SessionPhase },

    #[error("step order violated: {0}")]
    StepOrder(#[from] StepError),

    #[error("config error: {0}")]
    ConfigError(String),
}

impl AgentError {
    /// session_failed 事件中的原因码
    pub fn reason_code(&self) -> &'static str {
        match self {
            AgentError::Transport(_) => REASON_CLIENT_DISCONNECTED,
            AgentError::PlanGeneration(_) => REASON_PLAN_GENERATION,
            AgentError::Persistence(_) => REASON_PERSISTENCE,
            AgentError::InvalidTransition { .. }
            | AgentError::StepOrder(_)
            | AgentError::ConfigError(_) => REASON_INTERNAL,
        }
    }
}

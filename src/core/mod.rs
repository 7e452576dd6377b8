//! 核心编排层：会话状态机、会话登记、主控循环与组件构建

pub mod builder;
pub mod error;
pub mod orchestrator;
pub mod session;
pub mod state;

pub use builder::{create_llm_from_config, AgentBuilder};
pub use error::{
    AgentError, REASON_CLIENT_DISCONNECTED, REASON_INTERNAL, REASON_PERSISTENCE,
    REASON_PLAN_GENERATION,
};
pub use orchestrator::{Orchestrator, SessionEvent, SessionReport};
pub use session::{new_session_id, Session, SessionId, SessionManager};
pub use state::SessionPhase;

//! 会话登记
//!
//! 每个被接受的请求对应一个会话；登记表只保存运行期信息（阶段、取消令牌），
//! 会话进入终态后即移除，历史由 MemoryStore 负责。

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use super::error::AgentError;
use super::state::SessionPhase;

pub type SessionId = String;

pub fn new_session_id() -> SessionId {
    format!("session_{}", uuid::Uuid::new_v4())
}

/// 单个运行中的会话
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub request: String,
    pub created_at: DateTime<Utc>,
    phase: SessionPhase,
    cancel_token: CancellationToken,
}

impl Session {
    pub fn new(request: impl Into<String>, cancel_token: CancellationToken) -> Self {
        Self {
            id: new_session_id(),
            request: request.into(),
            created_at: Utc::now(),
            phase: SessionPhase::Received,
            cancel_token,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }

    /// 按状态机推进；非法转移返回错误且不修改状态
    pub fn transition(&mut self, next: SessionPhase) -> Result<(), AgentError> {
        if !self.phase.can_transition_to(next) {
            return Err(AgentError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        tracing::debug!(session_id = %self.id, from = %self.phase, to = %next, "session transition");
        self.phase = next;
        Ok(())
    }
}

/// 会话管理器（session_id -> Session）
#[derive(Default)]
pub struct SessionManager {
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, session: Session) {
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session);
    }

    pub async fn remove(&self, session_id: &str) -> Option<Session> {
        self.sessions.write().await.remove(session_id)
    }

    /// 更新登记表中的阶段（仅用于观测，状态机校验在 Session::transition 完成）
    pub async fn set_phase(&self, session_id: &str, phase: SessionPhase) {
        if let Some(session) = self.sessions.write().await.get_mut(session_id) {
            session.phase = phase;
        }
    }

    pub async fn phase(&self, session_id: &str) -> Option<SessionPhase> {
        self.sessions.read().await.get(session_id).map(|s| s.phase)
    }

    /// 获取活跃会话数
    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn cancel(&self, session_id: &str) -> bool {
        match self.sessions.read().await.get(session_id) {
            Some(session) => {
                session.cancel_token.cancel();
                true
            }
            None => false,
        }
    }

    /// 取消所有运行中的会话（进程关闭时）
    pub async fn cancel_all(&self) -> usize {
        let sessions = self.sessions.read().await;
        for session in sessions.values() {
            session.cancel_token.cancel();
        }
        sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_transitions() {
        let mut session = Session::new("hello", CancellationToken::new());
        assert!(session.id.starts_with("session_"));
        assert_eq!(session.phase(), SessionPhase::Received);

        assert!(session.transition(SessionPhase::Executing).is_err());
        assert_eq!(session.phase(), SessionPhase::Received);

        session.transition(SessionPhase::Planning).unwrap();
        session.transition(SessionPhase::Executing).unwrap();
        session.transition(SessionPhase::Done).unwrap();
        assert!(session.transition(SessionPhase::Closed).is_err());
    }

    #[tokio::test]
    async fn test_manager_cancel_all() {
        let manager = SessionManager::new();
        let a = Session::new("a", CancellationToken::new());
        let b = Session::new("b", CancellationToken::new());
        let (token_a, token_b) = (a.cancel_token().clone(), b.cancel_token().clone());
        let id_a = a.id.clone();

        manager.insert(a).await;
        manager.insert(b).await;
        assert_eq!(manager.active_count().await, 2);

        manager.set_phase(&id_a, SessionPhase::Planning).await;
        assert_eq!(manager.phase(&id_a).await, Some(SessionPhase::Planning));

        assert_eq!(manager.cancel_all().await, 2);
        assert!(token_a.is_cancelled());
        assert!(token_b.is_cancelled());

        assert!(manager.remove(&id_a).await.is_some());
        assert_eq!(manager.active_count().await, 1);
        assert!(!manager.cancel("missing").await);
    }
}

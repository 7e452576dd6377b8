//! Orchestrator：单个会话的主控循环
//!
//! RECEIVED -> PLANNING（PlanGenerator）-> EXECUTING（按顺序逐步 dispatch、持久化、推送事件）-> DONE。
//! 规划失败或持久化失败进入 FAILED；取消令牌触发（客户端断开）进入 CLOSED。
//! 每个越过 RECEIVED 的会话恰好产生一个终态事件（session_completed 或 session_failed）。

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::error::{AgentError, REASON_CLIENT_DISCONNECTED};
use super::session::{Session, SessionId, SessionManager};
use super::state::SessionPhase;
use crate::memory::{MemoryRecord, MemoryStore};
use crate::plan::{Plan, PlanGenerator, StepStatus};
use crate::tools::{ToolDispatcher, ToolRegistry};

/// 推送给客户端的会话事件（线上格式：`{"type": "step_started", "index": 0, "toolName": "..."}`）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum SessionEvent {
    SessionStarted {
        session_id: SessionId,
    },
    StepStarted {
        index: usize,
        tool_name: String,
    },
    StepCompleted {
        index: usize,
        tool_name: String,
        observation: String,
        status: StepStatus,
    },
    SessionCompleted {
        succeeded: usize,
        failed: usize,
    },
    SessionFailed {
        reason: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
}

impl SessionEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionEvent::SessionCompleted { .. } | SessionEvent::SessionFailed { .. }
        )
    }
}

/// 会话结束后的摘要
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub session_id: SessionId,
    pub phase: SessionPhase,
    pub succeeded: usize,
    pub failed: usize,
}

enum Outcome {
    Completed {
        succeeded: usize,
        failed: usize,
    },
    Failed {
        error: AgentError,
        succeeded: usize,
        failed: usize,
    },
    Closed {
        succeeded: usize,
        failed: usize,
    },
}

impl Outcome {
    fn failed(error: impl Into<AgentError>, (succeeded, failed): (usize, usize)) -> Self {
        Outcome::Failed {
            error: error.into(),
            succeeded,
            failed,
        }
    }
}

/// 会话编排器：可被多个连接共享，每次 run_session 互不干扰
pub struct Orchestrator {
    registry: Arc<ToolRegistry>,
    planner: PlanGenerator,
    dispatcher: ToolDispatcher,
    memory: Arc<dyn MemoryStore>,
    sessions: Arc<SessionManager>,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<ToolRegistry>,
        planner: PlanGenerator,
        memory: Arc<dyn MemoryStore>,
        tool_timeout_secs: u64,
    ) -> Self {
        let dispatcher = ToolDispatcher::new(Arc::clone(&registry), tool_timeout_secs);
        Self {
            registry,
            planner,
            dispatcher,
            memory,
            sessions: Arc::new(SessionManager::new()),
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn memory(&self) -> &Arc<dyn MemoryStore> {
        &self.memory
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// 处理一个请求直到终态。事件按发生顺序写入 `events`；
    /// 若接收端已关闭，视为客户端断开并触发 `cancel`。
    pub async fn run_session(
        &self,
        request: &str,
        events: &mpsc::UnboundedSender<SessionEvent>,
        cancel: CancellationToken,
    ) -> SessionReport {
        let mut session = Session::new(request, cancel.clone());
        let session_id = session.id.clone();
        self.sessions.insert(session.clone()).await;
        tracing::info!(session_id = %session_id, "session accepted");

        emit(
            events,
            &cancel,
            SessionEvent::SessionStarted {
                session_id: session_id.clone(),
            },
        );

        let outcome = self.drive(&mut session, events, &cancel).await;

        let (terminal_phase, event, succeeded, failed) = match outcome {
            Outcome::Completed { succeeded, failed } => {
                tracing::info!(session_id = %session_id, succeeded, failed, "session completed");
                (
                    SessionPhase::Done,
                    SessionEvent::SessionCompleted { succeeded, failed },
                    succeeded,
                    failed,
                )
            }
            Outcome::Failed {
                error,
                succeeded,
                failed,
            } => {
                tracing::error!(session_id = %session_id, reason = error.reason_code(), succeeded, failed, "session failed: {}", error);
                (
                    SessionPhase::Failed,
                    SessionEvent::SessionFailed {
                        reason: error.reason_code().to_string(),
                        detail: Some(error.to_string()),
                    },
                    succeeded,
                    failed,
                )
            }
            Outcome::Closed { succeeded, failed } => {
                tracing::warn!(session_id = %session_id, succeeded, failed, "client disconnected, session closed");
                (
                    SessionPhase::Closed,
                    SessionEvent::SessionFailed {
                        reason: REASON_CLIENT_DISCONNECTED.to_string(),
                        detail: None,
                    },
                    succeeded,
                    failed,
                )
            }
        };

        if let Err(e) = session.transition(terminal_phase) {
            tracing::warn!(session_id = %session_id, "{}", e);
        }
        // 终态事件尽力发送：CLOSED 时接收端多半已不在
        let _ = events.send(event);
        self.sessions.remove(&session_id).await;

        SessionReport {
            session_id,
            phase: session.phase(),
            succeeded,
            failed,
        }
    }

    async fn drive(
        &self,
        session: &mut Session,
        events: &mpsc::UnboundedSender<SessionEvent>,
        cancel: &CancellationToken,
    ) -> Outcome {
        if let Err(e) = self.advance(session, SessionPhase::Planning).await {
            return Outcome::failed(e, (0, 0));
        }

        let generated = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Outcome::Closed { succeeded: 0, failed: 0 },
            result = self.planner.generate(&session.request, &self.registry) => result,
        };
        let mut plan = match generated {
            Ok(plan) => plan,
            Err(e) => return Outcome::failed(e, (0, 0)),
        };
        tracing::info!(
            session_id = %session.id,
            steps = plan.len(),
            tools = ?plan.tool_names(),
            "plan generated"
        );

        if let Err(e) = self.advance(session, SessionPhase::Executing).await {
            return Outcome::failed(e, (0, 0));
        }

        for index in 0..plan.len() {
            if cancel.is_cancelled() {
                return closed_at(&session.id, &plan, index);
            }

            let (tool, args) = match plan.start_step(index) {
                Ok(step) => (step.tool.clone(), step.args.clone()),
                Err(e) => return Outcome::failed(e, plan.counts()),
            };
            emit(
                events,
                cancel,
                SessionEvent::StepStarted {
                    index,
                    tool_name: tool.clone(),
                },
            );
            // step_started 发送失败说明客户端已离开，该步不再执行
            if cancel.is_cancelled() {
                return closed_at(&session.id, &plan, index);
            }

            // 已开始的步骤即使客户端断开也执行完并落盘
            let observation = self.dispatcher.dispatch(&tool, &args).await;

            let step = match plan.finish_step(index, &observation) {
                Ok(step) => step.clone(),
                Err(e) => return Outcome::failed(e, plan.counts()),
            };
            let record = MemoryRecord::from_step(&session.id, &step);
            if let Err(e) = self.memory.append(&record).await {
                return Outcome::failed(e, plan.counts());
            }

            emit(
                events,
                cancel,
                SessionEvent::StepCompleted {
                    index,
                    tool_name: tool,
                    observation: observation.text,
                    status: step.status(),
                },
            );
        }

        // 最后一步执行期间断开同样进入 CLOSED
        if cancel.is_cancelled() {
            return closed_at(&session.id, &plan, plan.len());
        }

        let (succeeded, failed) = plan.counts();
        if let Err(e) = self.advance(session, SessionPhase::Done).await {
            return Outcome::failed(e, (succeeded, failed));
        }
        Outcome::Completed { succeeded, failed }
    }

    async fn advance(&self, session: &mut Session, next: SessionPhase) -> Result<(), AgentError> {
        session.transition(next)?;
        self.sessions.set_phase(&session.id, next).await;
        Ok(())
    }
}

fn closed_at(session_id: &str, plan: &Plan, next_index: usize) -> Outcome {
    let (succeeded, failed) = plan.counts();
    tracing::info!(
        session_id = %session_id,
        skipped = plan.len() - next_index,
        "client gone, skipping remaining steps"
    );
    Outcome::Closed { succeeded, failed }
}

/// 发送事件；接收端关闭说明客户端已离开，触发取消
fn emit(
    events: &mpsc::UnboundedSender<SessionEvent>,
    cancel: &CancellationToken,
    event: SessionEvent,
) {
    if events.send(event).is_err() && !cancel.is_cancelled() {
        tracing::debug!("event receiver dropped, cancelling session");
        cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_wire_format() {
        let started = SessionEvent::StepStarted {
            index: 0,
            tool_name: "link_detect".into(),
        };
        assert_eq!(
            serde_json::to_value(&started).unwrap(),
            json!({"type": "step_started", "index": 0, "toolName": "link_detect"})
        );

        let completed = SessionEvent::StepCompleted {
            index: 1,
            tool_name: "echo".into(),
            observation: "Success: hi".into(),
            status: StepStatus::Succeeded,
        };
        assert_eq!(
            serde_json::to_value(&completed).unwrap(),
            json!({
                "type": "step_completed",
                "index": 1,
                "toolName": "echo",
                "observation": "Success: hi",
                "status": "succeeded"
            })
        );

        let failed = SessionEvent::SessionFailed {
            reason: "plan_generation_error".into(),
            detail: None,
        };
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            json!({"type": "session_failed", "reason": "plan_generation_error"})
        );
        assert!(failed.is_terminal());

        let announced = SessionEvent::SessionStarted {
            session_id: "session_1".into(),
        };
        assert_eq!(
            serde_json::to_value(&announced).unwrap(),
            json!({"type": "session_started", "sessionId": "session_1"})
        );
        assert!(!announced.is_terminal());
    }
}

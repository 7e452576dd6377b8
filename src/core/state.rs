//! 会话状态机
//!
//! RECEIVED -> PLANNING -> EXECUTING -> DONE；EXECUTING -> FAILED（PLANNING 也可直接 FAILED）；
//! 任意非终态 -> CLOSED（客户端断开）。DONE / FAILED / CLOSED 为终态。

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Received,
    Planning,
    Executing,
    Done,
    Failed,
    Closed,
}

impl SessionPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionPhase::Done | SessionPhase::Failed | SessionPhase::Closed
        )
    }

    pub fn can_transition_to(self, next: SessionPhase) -> bool {
        use SessionPhase::*;
        match (self, next) {
            (Received, Planning) => true,
            (Planning, Executing) | (Planning, Failed) => true,
            (Executing, Done) | (Executing, Failed) => true,
            (from, Closed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionPhase::Received => "RECEIVED",
            SessionPhase::Planning => "PLANNING",
            SessionPhase::Executing => "EXECUTING",
            SessionPhase::Done => "DONE",
            SessionPhase::Failed => "FAILED",
            SessionPhase::Closed => "CLOSED",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::SessionPhase::*;

    #[test]
    fn test_happy_path() {
        assert!(Received.can_transition_to(Planning));
        assert!(Planning.can_transition_to(Executing));
        assert!(Executing.can_transition_to(Done));
    }

    #[test]
    fn test_failure_and_close() {
        assert!(Planning.can_transition_to(Failed));
        assert!(Executing.can_transition_to(Failed));
        for phase in [Received, Planning, Executing] {
            assert!(phase.can_transition_to(Closed));
        }
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [Done, Failed, Closed] {
            assert!(terminal.is_terminal());
            for next in [Received, Planning, Executing, Done, Failed, Closed] {
                assert!(!terminal.can_transition_to(next));
            }
        }
        assert!(!Received.can_transition_to(Executing));
        assert!(!Received.can_transition_to(Failed));
    }
}

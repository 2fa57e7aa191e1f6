//! Session lifecycle states

use serde::Serialize;

/// `Connecting -> Ready -> Streaming -> {Closed | Failed}`
///
/// Terminal states trigger automatic registry cleanup. There is no
/// reconnecting state; reconnection is a fresh open from the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Transport being established
    Connecting,
    /// Transport ready, remote command/shell not yet attached
    Ready,
    /// Data flowing
    Streaming,
    /// Graceful stream end
    Closed,
    /// Transport or command error
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }

    /// Whether `next` is a legal successor state.
    pub fn can_advance_to(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Connecting, Ready) => true,
            (Ready, Streaming) => true,
            // Failure can strike at any pre-terminal point
            (Connecting | Ready | Streaming, Failed) => true,
            // A stream can end before or after data flowed
            (Ready | Streaming, Closed) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SessionState::*;

    #[test]
    fn happy_path_is_legal() {
        assert!(Connecting.can_advance_to(Ready));
        assert!(Ready.can_advance_to(Streaming));
        assert!(Streaming.can_advance_to(Closed));
    }

    #[test]
    fn failure_is_reachable_from_any_live_state() {
        assert!(Connecting.can_advance_to(Failed));
        assert!(Ready.can_advance_to(Failed));
        assert!(Streaming.can_advance_to(Failed));
    }

    #[test]
    fn terminal_states_are_final() {
        for terminal in [Closed, Failed] {
            assert!(terminal.is_terminal());
            for next in [Connecting, Ready, Streaming, Closed, Failed] {
                assert!(!terminal.can_advance_to(next));
            }
        }
    }

    #[test]
    fn no_skipping_ready() {
        assert!(!Connecting.can_advance_to(Streaming));
        assert!(!Connecting.can_advance_to(Closed));
    }
}

//! Session identity

use std::fmt;

/// What a session streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKind {
    Logs,
    Shell,
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionKind::Logs => write!(f, "logs"),
            SessionKind::Shell => write!(f, "ssh"),
        }
    }
}

/// Composite identity naming at most one live session.
///
/// Bulk teardown filters on `client_id` (client disconnect) or the full
/// triple (explicit unsubscribe).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub kind: SessionKind,
    pub pod_id: String,
    pub client_id: String,
}

impl SessionKey {
    pub fn logs(pod_id: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            kind: SessionKind::Logs,
            pod_id: pod_id.into(),
            client_id: client_id.into(),
        }
    }

    pub fn shell(pod_id: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            kind: SessionKind::Shell,
            pod_id: pod_id.into(),
            client_id: client_id.into(),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.kind, self.pod_id, self.client_id)
    }
}

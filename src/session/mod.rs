//! Session lifecycle
//!
//! A session is one client's live view onto one pod: either a streamed log
//! tail with periodic resource samples, or an interactive shell. The
//! registry owns every live session; the drivers in `logs` and `shell` run
//! them; `probe` holds the remote command contract.

mod key;
mod logs;
mod probe;
mod registry;
mod sampler;
mod shell;
mod state;

pub use key::{SessionKey, SessionKind};
pub use probe::{parse_resource_sample, ProbeSet, ResourceSample};
pub use registry::{SessionHandle, SessionInfo, SessionRegistry, SessionSettings};
pub use state::SessionState;

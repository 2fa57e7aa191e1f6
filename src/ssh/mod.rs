//! SSH transport layer
//!
//! One authenticated transport per (session, pod). The russh handle lives in
//! an owner task; sessions reach it only through the [`Transport`] trait so
//! lifecycle logic stays independent of the wire.

pub mod client;
pub mod config;
pub mod error;
#[cfg(test)]
pub mod mock;
pub mod owner;
pub mod transport;

pub use config::{AuthMethod, SshConfig};
pub use error::SshError;
pub use owner::{RusshTransport, RusshTransportFactory};
pub use transport::{ExecEvent, ShellCommand, ShellHandle, Transport, TransportFactory};

//! Transport seam between session lifecycle and the SSH wire
//!
//! Sessions only ever see these traits. The production implementation is
//! [`super::owner::RusshTransport`]; tests substitute a scripted mock so
//! lifecycle logic can be exercised without a network.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::error::SshError;
use crate::pods::PodRef;

/// Output of a long-running remote command, in arrival order.
///
/// The receiving channel closing means the remote stream ended (EOF or
/// channel close). stdout and stderr are independent producers; no total
/// order is guaranteed between them, only within each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecEvent {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
}

/// Commands that can be sent to an interactive shell
#[derive(Debug)]
pub enum ShellCommand {
    /// Bytes for the remote shell's stdin, forwarded verbatim
    Data(Vec<u8>),
    /// Resize the remote PTY (cols, rows)
    Resize(u16, u16),
    /// Close the shell
    Close,
}

/// A live interactive shell with PTY semantics
pub struct ShellHandle {
    /// Input and control channel into the remote shell
    pub cmd_tx: mpsc::Sender<ShellCommand>,
    /// Remote shell output (stdout and stderr interleaved), verbatim
    pub output_rx: mpsc::Receiver<Vec<u8>>,
}

/// One authenticated secure-shell connection to a pod
#[async_trait]
pub trait Transport: Send + Sync {
    /// Start a long-running remote command and stream its output.
    async fn open_exec(&self, command: &str) -> Result<mpsc::Receiver<ExecEvent>, SshError>;

    /// Run a short-lived remote command and capture its stdout.
    async fn exec_capture(&self, command: &str) -> Result<String, SshError>;

    /// Allocate a PTY and start an interactive shell.
    async fn open_shell(&self, cols: u16, rows: u16) -> Result<ShellHandle, SshError>;

    /// Disconnect. Idempotent; pending operations fail with `Disconnected`.
    async fn close(&self);
}

/// Opens one authenticated transport per call
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn connect(&self, pod: &PodRef) -> Result<Arc<dyn Transport>, SshError>;
}

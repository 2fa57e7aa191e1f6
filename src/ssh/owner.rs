//! Transport owner task
//!
//! Exactly one task owns the russh `Handle`. Everything else talks to it
//! through [`RusshTransport`], which sends commands over an mpsc channel.
//! This avoids lock contention on the handle and protocol violations from
//! concurrent access, and gives a single place where the connection is torn
//! down and pending callers are failed with `Disconnected`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{Handle, Msg};
use russh::{Channel, ChannelMsg};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::client::{ClientHandler, SshConnector};
use super::config::SshConfig;
use super::error::SshError;
use super::transport::{ExecEvent, ShellCommand, ShellHandle, Transport, TransportFactory};
use crate::pods::PodRef;

/// Capacity of per-command output channels
const STREAM_CHANNEL_CAPACITY: usize = 256;
/// Upper bound for a one-shot capture command round trip
const CAPTURE_TIMEOUT: Duration = Duration::from_secs(10);

enum OwnerCommand {
    OpenExec {
        command: String,
        reply_tx: oneshot::Sender<Result<mpsc::Receiver<ExecEvent>, SshError>>,
    },
    ExecCapture {
        command: String,
        reply_tx: oneshot::Sender<Result<String, SshError>>,
    },
    OpenShell {
        cols: u16,
        rows: u16,
        reply_tx: oneshot::Sender<Result<ShellHandle, SshError>>,
    },
    Disconnect,
}

/// Production [`Transport`] backed by a russh handle owner task
pub struct RusshTransport {
    cmd_tx: mpsc::Sender<OwnerCommand>,
}

#[async_trait]
impl Transport for RusshTransport {
    async fn open_exec(&self, command: &str) -> Result<mpsc::Receiver<ExecEvent>, SshError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(OwnerCommand::OpenExec {
                command: command.to_string(),
                reply_tx,
            })
            .await
            .map_err(|_| SshError::Disconnected)?;
        reply_rx.await.map_err(|_| SshError::Disconnected)?
    }

    async fn exec_capture(&self, command: &str) -> Result<String, SshError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(OwnerCommand::ExecCapture {
                command: command.to_string(),
                reply_tx,
            })
            .await
            .map_err(|_| SshError::Disconnected)?;
        reply_rx.await.map_err(|_| SshError::Disconnected)?
    }

    async fn open_shell(&self, cols: u16, rows: u16) -> Result<ShellHandle, SshError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(OwnerCommand::OpenShell {
                cols,
                rows,
                reply_tx,
            })
            .await
            .map_err(|_| SshError::Disconnected)?;
        reply_rx.await.map_err(|_| SshError::Disconnected)?
    }

    async fn close(&self) {
        let _ = self.cmd_tx.send(OwnerCommand::Disconnect).await;
    }
}

/// Spawn the owner task for an authenticated handle.
///
/// Consumes the handle; the returned transport is the only way to reach it.
pub fn spawn_transport_owner(
    handle: Handle<ClientHandler>,
    term: String,
    label: String,
) -> RusshTransport {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<OwnerCommand>(64);

    tokio::spawn(async move {
        let handle = handle;

        info!("Transport owner task started for {}", label);

        while let Some(cmd) = cmd_rx.recv().await {
            match cmd {
                OwnerCommand::OpenExec { command, reply_tx } => {
                    let channel = match handle.channel_open_session().await {
                        Ok(ch) => ch,
                        Err(e) => {
                            let _ = reply_tx.send(Err(SshError::ChannelError(e.to_string())));
                            continue;
                        }
                    };
                    let label = label.clone();
                    tokio::spawn(async move {
                        let _ = reply_tx.send(start_exec_stream(channel, &command, label).await);
                    });
                }

                OwnerCommand::ExecCapture { command, reply_tx } => {
                    let channel = match handle.channel_open_session().await {
                        Ok(ch) => ch,
                        Err(e) => {
                            let _ = reply_tx.send(Err(SshError::ChannelError(e.to_string())));
                            continue;
                        }
                    };
                    tokio::spawn(async move {
                        let result = tokio::time::timeout(
                            CAPTURE_TIMEOUT,
                            capture_command(channel, &command),
                        )
                        .await
                        .unwrap_or_else(|_| {
                            Err(SshError::Timeout("Capture command timed out".to_string()))
                        });
                        let _ = reply_tx.send(result);
                    });
                }

                OwnerCommand::OpenShell {
                    cols,
                    rows,
                    reply_tx,
                } => {
                    let channel = match handle.channel_open_session().await {
                        Ok(ch) => ch,
                        Err(e) => {
                            let _ = reply_tx.send(Err(SshError::ChannelError(e.to_string())));
                            continue;
                        }
                    };
                    let term = term.clone();
                    let label = label.clone();
                    tokio::spawn(async move {
                        let _ = reply_tx
                            .send(start_shell(channel, &term, cols, rows, label).await);
                    });
                }

                OwnerCommand::Disconnect => {
                    info!("Disconnect requested for {}", label);
                    break;
                }
            }
        }

        // Drain queued commands, failing each caller, then close the wire.
        cmd_rx.close();
        while let Ok(cmd) = cmd_rx.try_recv() {
            match cmd {
                OwnerCommand::OpenExec { reply_tx, .. } => {
                    let _ = reply_tx.send(Err(SshError::Disconnected));
                }
                OwnerCommand::ExecCapture { reply_tx, .. } => {
                    let _ = reply_tx.send(Err(SshError::Disconnected));
                }
                OwnerCommand::OpenShell { reply_tx, .. } => {
                    let _ = reply_tx.send(Err(SshError::Disconnected));
                }
                OwnerCommand::Disconnect => {}
            }
        }

        let _ = handle
            .disconnect(russh::Disconnect::ByApplication, "Session closed", "en")
            .await;
        info!("Transport owner task terminated for {}", label);
    });

    RusshTransport { cmd_tx }
}

/// Issue a long-running command and pump its output into an event channel.
async fn start_exec_stream(
    mut channel: Channel<Msg>,
    command: &str,
    label: String,
) -> Result<mpsc::Receiver<ExecEvent>, SshError> {
    channel
        .exec(true, command)
        .await
        .map_err(|e| SshError::ChannelError(format!("Exec request failed: {}", e)))?;

    let (events_tx, events_rx) = mpsc::channel::<ExecEvent>(STREAM_CHANNEL_CAPACITY);

    tokio::spawn(async move {
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { data } => {
                    if events_tx.send(ExecEvent::Stdout(data.to_vec())).await.is_err() {
                        break;
                    }
                }
                ChannelMsg::ExtendedData { data, ext } if ext == 1 => {
                    if events_tx.send(ExecEvent::Stderr(data.to_vec())).await.is_err() {
                        break;
                    }
                }
                ChannelMsg::Eof | ChannelMsg::Close => {
                    debug!("Exec channel ended for {}", label);
                    break;
                }
                ChannelMsg::ExitStatus { exit_status } => {
                    debug!("Exec exit status {} for {}", exit_status, label);
                }
                _ => {}
            }
        }
        // events_tx drops here, signalling stream end to the consumer
    });

    Ok(events_rx)
}

/// Run a short-lived command and collect its stdout.
async fn capture_command(mut channel: Channel<Msg>, command: &str) -> Result<String, SshError> {
    channel
        .exec(true, command)
        .await
        .map_err(|e| SshError::ChannelError(format!("Exec request failed: {}", e)))?;

    let mut output = Vec::new();
    while let Some(msg) = channel.wait().await {
        match msg {
            ChannelMsg::Data { data } => output.extend_from_slice(&data),
            ChannelMsg::Eof | ChannelMsg::Close => break,
            _ => {}
        }
    }

    Ok(String::from_utf8_lossy(&output).into_owned())
}

/// Allocate a PTY, start a shell, and spawn the bidirectional pump.
async fn start_shell(
    mut channel: Channel<Msg>,
    term: &str,
    cols: u16,
    rows: u16,
    label: String,
) -> Result<ShellHandle, SshError> {
    channel
        .request_pty(false, term, cols as u32, rows as u32, 0, 0, &[])
        .await
        .map_err(|e| SshError::ChannelError(format!("PTY request failed: {}", e)))?;

    channel
        .request_shell(false)
        .await
        .map_err(|e| SshError::ChannelError(format!("Shell request failed: {}", e)))?;

    info!("Interactive shell started for {}", label);

    let (cmd_tx, mut shell_cmd_rx) = mpsc::channel::<ShellCommand>(STREAM_CHANNEL_CAPACITY);
    let (output_tx, output_rx) = mpsc::channel::<Vec<u8>>(STREAM_CHANNEL_CAPACITY);

    tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(cmd) = shell_cmd_rx.recv() => {
                    match cmd {
                        ShellCommand::Data(data) => {
                            if let Err(e) = channel.data(&data[..]).await {
                                warn!("Failed to write to shell for {}: {}", label, e);
                                break;
                            }
                        }
                        ShellCommand::Resize(cols, rows) => {
                            if let Err(e) = channel
                                .window_change(cols as u32, rows as u32, 0, 0)
                                .await
                            {
                                // Resize failure is not fatal to the shell
                                warn!("Failed to resize PTY for {}: {}", label, e);
                            }
                        }
                        ShellCommand::Close => {
                            let _ = channel.eof().await;
                            break;
                        }
                    }
                }

                msg = channel.wait() => {
                    match msg {
                        Some(ChannelMsg::Data { data }) => {
                            if output_tx.send(data.to_vec()).await.is_err() {
                                break;
                            }
                        }
                        Some(ChannelMsg::ExtendedData { data, ext }) if ext == 1 => {
                            if output_tx.send(data.to_vec()).await.is_err() {
                                break;
                            }
                        }
                        Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                            debug!("Shell channel ended for {}", label);
                            break;
                        }
                        Some(ChannelMsg::ExitStatus { exit_status }) => {
                            debug!("Shell exit status {} for {}", exit_status, label);
                        }
                        Some(_) => {}
                    }
                }
            }
        }
        debug!("Shell pump stopped for {}", label);
        // output_tx drops here, signalling shell end to the consumer
    });

    Ok(ShellHandle { cmd_tx, output_rx })
}

/// Opens russh transports from a base configuration plus per-pod coordinates
pub struct RusshTransportFactory {
    base: SshConfig,
}

impl RusshTransportFactory {
    pub fn new(base: SshConfig) -> Self {
        Self { base }
    }
}

#[async_trait]
impl TransportFactory for RusshTransportFactory {
    async fn connect(&self, pod: &PodRef) -> Result<Arc<dyn Transport>, SshError> {
        let config = SshConfig {
            host: pod.host.clone(),
            port: pod.port,
            username: pod.username.clone(),
            ..self.base.clone()
        };
        let term = config.term.clone();
        let handle = SshConnector::new(config).connect().await?;
        let transport = spawn_transport_owner(handle, term, format!("pod {}", pod.id));
        Ok(Arc::new(transport))
    }
}

//! Interactive shell session driver
//!
//! One task per shell session: connect, open a PTY-backed shell, publish the
//! input channel for keystroke routing, and pump remote output back to the
//! client until either side ends it.

use tokio::sync::broadcast;
use tracing::warn;

use super::registry::DriverCtx;
use super::state::SessionState;
use crate::gateway::protocol::ServerEvent;
use crate::ssh::ShellCommand;

pub(crate) async fn run_shell_session(ctx: DriverCtx, mut cancel_rx: broadcast::Receiver<()>) {
    let DriverCtx {
        registry,
        key,
        epoch,
        pod,
        sink,
        cancel_tx,
    } = ctx;

    let factory = registry.factory();
    let transport = tokio::select! {
        biased;
        _ = cancel_rx.recv() => return,
        result = factory.connect(&pod) => match result {
            Ok(transport) => transport,
            Err(err) => {
                warn!("Shell session {} failed to connect: {}", key, err);
                registry.mark(&key, epoch, SessionState::Failed);
                sink.emit(ServerEvent::ShellError {
                    error: err.to_string(),
                });
                registry.finish(&key, epoch);
                return;
            }
        }
    };

    registry.mark(&key, epoch, SessionState::Ready);
    sink.emit(ServerEvent::ShellConnected);

    let (cols, rows) = {
        let settings = registry.settings();
        (settings.shell_cols, settings.shell_rows)
    };

    let handle = tokio::select! {
        biased;
        _ = cancel_rx.recv() => {
            transport.close().await;
            return;
        }
        result = transport.open_shell(cols, rows) => match result {
            Ok(handle) => handle,
            Err(err) => {
                warn!("Shell session {} failed to open PTY: {}", key, err);
                registry.mark(&key, epoch, SessionState::Failed);
                sink.emit(ServerEvent::ShellError {
                    error: err.to_string(),
                });
                transport.close().await;
                registry.finish(&key, epoch);
                return;
            }
        }
    };

    let cmd_tx = handle.cmd_tx;
    let mut output_rx = handle.output_rx;

    registry.set_shell_tx(&key, epoch, cmd_tx.clone());
    registry.mark(&key, epoch, SessionState::Streaming);

    loop {
        tokio::select! {
            biased;
            _ = cancel_rx.recv() => break,
            chunk = output_rx.recv() => match chunk {
                Some(chunk) => {
                    sink.emit(ServerEvent::ShellOutput {
                        data: String::from_utf8_lossy(&chunk).into_owned(),
                    });
                }
                None => {
                    registry.mark(&key, epoch, SessionState::Closed);
                    sink.emit(ServerEvent::ShellDisconnected);
                    break;
                }
            }
        }
    }

    // Ask the remote shell to wind down, then release everything
    let _ = cmd_tx.send(ShellCommand::Close).await;
    let _ = cancel_tx.send(());
    transport.close().await;
    registry.finish(&key, epoch);
}

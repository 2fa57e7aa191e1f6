//! Log streaming session driver
//!
//! One task per log session: connect, start the remote tail, batch its
//! output into line events, and spin up the resource sampler on the same
//! transport. Every await point also watches the cancel channel, so a
//! teardown interrupts the driver wherever it happens to be.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::warn;

use super::registry::DriverCtx;
use super::sampler::run_sampler;
use super::state::SessionState;
use crate::gateway::protocol::ServerEvent;
use crate::ssh::ExecEvent;

/// Split a raw output chunk into displayable lines.
///
/// Splitting is per chunk; a line broken across chunks arrives as two
/// entries. Empty fragments (trailing newline, blank lines) are dropped, so
/// a whitespace-only chunk produces no batch.
fn split_lines(chunk: &[u8], stderr: bool) -> Vec<String> {
    String::from_utf8_lossy(chunk)
        .split('\n')
        .filter(|line| !line.is_empty())
        .map(|line| {
            if stderr {
                format!("[STDERR] {}", line)
            } else {
                line.to_string()
            }
        })
        .collect()
}

pub(crate) async fn run_log_session(ctx: DriverCtx, mut cancel_rx: broadcast::Receiver<()>) {
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
                warn!("Log session {} failed to connect: {}", key, err);
                registry.mark(&key, epoch, SessionState::Failed);
                sink.emit(ServerEvent::LogsDisconnected {
                    error: Some(err.to_string()),
                });
                registry.finish(&key, epoch);
                return;
            }
        }
    };

    registry.mark(&key, epoch, SessionState::Ready);
    sink.emit(ServerEvent::LogsConnected);

    let probes = registry.probes();
    let mut stream = tokio::select! {
        biased;
        _ = cancel_rx.recv() => {
            transport.close().await;
            return;
        }
        result = transport.open_exec(&probes.log_tail) => match result {
            Ok(stream) => stream,
            Err(err) => {
                // Tail command failure is surfaced as one log line, then the
                // session ends as if the stream had closed
                warn!("Log session {} failed to start tail: {}", key, err);
                sink.emit(ServerEvent::LogsData {
                    lines: vec![format!("Error: {}", err)],
                });
                registry.mark(&key, epoch, SessionState::Closed);
                sink.emit(ServerEvent::LogsDisconnected { error: None });
                transport.close().await;
                registry.finish(&key, epoch);
                return;
            }
        }
    };

    registry.mark(&key, epoch, SessionState::Streaming);

    tokio::spawn(run_sampler(
        Arc::clone(&transport),
        probes,
        registry.settings().sample_interval,
        sink.clone(),
        cancel_tx.subscribe(),
    ));

    loop {
        tokio::select! {
            biased;
            _ = cancel_rx.recv() => break,
            event = stream.recv() => match event {
                Some(ExecEvent::Stdout(chunk)) => {
                    let lines = split_lines(&chunk, false);
                    if !lines.is_empty() {
                        sink.emit(ServerEvent::LogsData { lines });
                    }
                }
                Some(ExecEvent::Stderr(chunk)) => {
                    let lines = split_lines(&chunk, true);
                    if !lines.is_empty() {
                        sink.emit(ServerEvent::LogsData { lines });
                    }
                }
                None => {
                    registry.mark(&key, epoch, SessionState::Closed);
                    sink.emit(ServerEvent::LogsDisconnected { error: None });
                    break;
                }
            }
        }
    }

    // Stream ended or session cancelled: stop the sampler, release the
    // transport, and drop our own registry entry (a no-op after teardown).
    let _ = cancel_tx.send(());
    transport.close().await;
    registry.finish(&key, epoch);
}

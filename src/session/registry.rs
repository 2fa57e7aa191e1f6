//! Session registry
//!
//! Keyed table of live sessions, one entry per (kind, pod, client) triple.
//! The map is the only state shared between subscribe, unsubscribe,
//! disconnect and data-callback flows; every mutation goes through the
//! open/close lock, and drivers carry an epoch so a late-finishing task can
//! only remove its own generation, never a session reopened under the same
//! key.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::key::{SessionKey, SessionKind};
use super::logs::run_log_session;
use super::probe::ProbeSet;
use super::shell::run_shell_session;
use super::state::SessionState;
use crate::gateway::protocol::ClientSink;
use crate::pods::PodRef;
use crate::ssh::{ShellCommand, TransportFactory};

/// Tunables shared by every session
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Resource sampling interval for log sessions
    pub sample_interval: Duration,
    /// Initial PTY geometry for shell sessions
    pub shell_cols: u16,
    pub shell_rows: u16,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_secs(5),
            shell_cols: 80,
            shell_rows: 24,
        }
    }
}

/// Lightweight handle returned by `open`; state changes arrive as events.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub key: SessionKey,
    pub epoch: u64,
}

/// Point-in-time view of a live session
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub key: SessionKey,
    pub state: SessionState,
}

struct SessionEntry {
    epoch: u64,
    state: SessionState,
    cancel_tx: broadcast::Sender<()>,
    driver: Option<JoinHandle<()>>,
    shell_tx: Option<mpsc::Sender<ShellCommand>>,
}

/// Everything a session driver needs, bundled at spawn time
pub(crate) struct DriverCtx {
    pub registry: Arc<SessionRegistry>,
    pub key: SessionKey,
    pub epoch: u64,
    pub pod: PodRef,
    pub sink: ClientSink,
    pub cancel_tx: broadcast::Sender<()>,
}

pub struct SessionRegistry {
    sessions: DashMap<SessionKey, SessionEntry>,
    factory: Arc<dyn TransportFactory>,
    probes: Arc<ProbeSet>,
    settings: SessionSettings,
    epoch_counter: AtomicU64,
    /// Serializes open/close mutations so replace-on-reopen can never race
    /// another open or a mass disconnect for the same key.
    open_lock: tokio::sync::Mutex<()>,
}

impl SessionRegistry {
    pub fn new(
        factory: Arc<dyn TransportFactory>,
        probes: ProbeSet,
        settings: SessionSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            sessions: DashMap::new(),
            factory,
            probes: Arc::new(probes),
            settings,
            epoch_counter: AtomicU64::new(0),
            open_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub(crate) fn factory(&self) -> Arc<dyn TransportFactory> {
        Arc::clone(&self.factory)
    }

    pub(crate) fn probes(&self) -> Arc<ProbeSet> {
        Arc::clone(&self.probes)
    }

    pub(crate) fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Open a session for `key`, replacing any live one first.
    ///
    /// The prior session (if any) is torn down to completion — transport
    /// closed, driver joined — before the new entry exists, so there is
    /// never a moment with two transports under one key. Returns as soon as
    /// the new driver is spawned; connect and auth failures surface as
    /// terminal events on the sink, never as errors here.
    pub async fn open(
        self: &Arc<Self>,
        key: SessionKey,
        pod: PodRef,
        sink: ClientSink,
    ) -> SessionHandle {
        let _guard = self.open_lock.lock().await;

        self.teardown_entry(&key).await;

        let epoch = self.epoch_counter.fetch_add(1, Ordering::SeqCst);
        let (cancel_tx, cancel_rx) = broadcast::channel(4);

        info!("Opening session {} (epoch {})", key, epoch);

        self.sessions.insert(
            key.clone(),
            SessionEntry {
                epoch,
                state: SessionState::Connecting,
                cancel_tx: cancel_tx.clone(),
                driver: None,
                shell_tx: None,
            },
        );

        let ctx = DriverCtx {
            registry: Arc::clone(self),
            key: key.clone(),
            epoch,
            pod,
            sink,
            cancel_tx,
        };

        let driver = match key.kind {
            SessionKind::Logs => tokio::spawn(run_log_session(ctx, cancel_rx)),
            SessionKind::Shell => tokio::spawn(run_shell_session(ctx, cancel_rx)),
        };

        if let Some(mut entry) = self.sessions.get_mut(&key) {
            entry.driver = Some(driver);
        }

        SessionHandle { key, epoch }
    }

    /// Terminate and remove the named session; no-op if absent.
    pub async fn close(&self, key: &SessionKey) {
        let _guard = self.open_lock.lock().await;
        self.teardown_entry(key).await;
    }

    /// Terminate every session belonging to `client_id`. Safe with zero
    /// matches and safe concurrently with in-flight data callbacks.
    pub async fn close_all(&self, client_id: &str) {
        let _guard = self.open_lock.lock().await;

        let keys: Vec<SessionKey> = self
            .sessions
            .iter()
            .filter(|entry| entry.key().client_id == client_id)
            .map(|entry| entry.key().clone())
            .collect();

        if !keys.is_empty() {
            info!("Closing {} sessions for client {}", keys.len(), client_id);
        }

        for key in keys {
            self.teardown_entry(&key).await;
        }
    }

    /// Terminate everything (process shutdown).
    pub async fn shutdown(&self) {
        let _guard = self.open_lock.lock().await;

        let keys: Vec<SessionKey> = self.sessions.iter().map(|e| e.key().clone()).collect();
        info!("Shutting down {} sessions", keys.len());
        for key in keys {
            self.teardown_entry(&key).await;
        }
    }

    pub fn find(&self, key: &SessionKey) -> Option<SessionInfo> {
        self.sessions.get(key).map(|entry| SessionInfo {
            key: key.clone(),
            state: entry.state,
        })
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Forward client keystrokes verbatim to every live shell session of
    /// the client, in receipt order.
    pub async fn shell_input(&self, client_id: &str, data: Vec<u8>) {
        for tx in self.shell_senders(client_id) {
            let _ = tx.send(ShellCommand::Data(data.clone())).await;
        }
    }

    /// Apply a resize to every live shell session of the client.
    pub async fn shell_resize(&self, client_id: &str, cols: u16, rows: u16) {
        for tx in self.shell_senders(client_id) {
            let _ = tx.send(ShellCommand::Resize(cols, rows)).await;
        }
    }

    fn shell_senders(&self, client_id: &str) -> Vec<mpsc::Sender<ShellCommand>> {
        // Collected first: senders must not be awaited while holding map shards
        self.sessions
            .iter()
            .filter(|entry| {
                entry.key().kind == SessionKind::Shell && entry.key().client_id == client_id
            })
            .filter_map(|entry| entry.shell_tx.clone())
            .collect()
    }

    /// Remove the entry and wait for its driver to release everything.
    async fn teardown_entry(&self, key: &SessionKey) {
        if let Some((_, mut entry)) = self.sessions.remove(key) {
            debug!("Tearing down session {} (epoch {})", key, entry.epoch);
            let _ = entry.cancel_tx.send(());
            if let Some(driver) = entry.driver.take() {
                let _ = driver.await;
            }
        }
    }

    /// Advance a live session's state; stale epochs are discarded.
    pub(crate) fn mark(&self, key: &SessionKey, epoch: u64, next: SessionState) {
        if let Some(mut entry) = self.sessions.get_mut(key) {
            if entry.epoch != epoch {
                return;
            }
            if entry.state.can_advance_to(next) {
                debug!("Session {} -> {:?}", key, next);
                entry.state = next;
            } else {
                warn!(
                    "Illegal state transition {:?} -> {:?} for session {}",
                    entry.state, next, key
                );
            }
        }
    }

    /// Attach the shell input channel once the PTY is up.
    pub(crate) fn set_shell_tx(
        &self,
        key: &SessionKey,
        epoch: u64,
        tx: mpsc::Sender<ShellCommand>,
    ) {
        if let Some(mut entry) = self.sessions.get_mut(key) {
            if entry.epoch == epoch {
                entry.shell_tx = Some(tx);
            }
        }
    }

    /// Driver-side cleanup: remove the entry, but only our own generation.
    pub(crate) fn finish(&self, key: &SessionKey, epoch: u64) {
        if self
            .sessions
            .remove_if(key, |_, entry| entry.epoch == epoch)
            .is_some()
        {
            debug!("Session {} (epoch {}) removed", key, epoch);
        }
    }
}

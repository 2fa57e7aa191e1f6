//! Scripted in-memory transports for lifecycle tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::error::SshError;
use super::transport::{ExecEvent, ShellCommand, ShellHandle, Transport, TransportFactory};
use crate::pods::PodRef;

/// Test-side end of a mock shell
pub struct ShellServer {
    pub cmd_rx: mpsc::Receiver<ShellCommand>,
    pub output_tx: mpsc::Sender<Vec<u8>>,
}

/// One scripted transport; the test feeds streams and inspects counters
pub struct MockTransport {
    pub close_calls: AtomicUsize,
    pub capture_calls: AtomicUsize,
    pub exec_calls: AtomicUsize,
    capture_output: Mutex<String>,
    capture_delay: Mutex<Option<Duration>>,
    exec_tx: Mutex<Option<mpsc::Sender<ExecEvent>>>,
    shell_server: Mutex<Option<ShellServer>>,
    events: Arc<Mutex<Vec<String>>>,
}

impl MockTransport {
    fn new(events: Arc<Mutex<Vec<String>>>, capture_output: String) -> Self {
        Self {
            close_calls: AtomicUsize::new(0),
            capture_calls: AtomicUsize::new(0),
            exec_calls: AtomicUsize::new(0),
            capture_output: Mutex::new(capture_output),
            capture_delay: Mutex::new(None),
            exec_tx: Mutex::new(None),
            shell_server: Mutex::new(None),
            events,
        }
    }

    pub fn set_capture_output(&self, output: &str) {
        *self.capture_output.lock() = output.to_string();
    }

    /// Make every capture take this long, simulating a slow probe.
    pub fn set_capture_delay(&self, delay: Duration) {
        *self.capture_delay.lock() = Some(delay);
    }

    /// Wait until the session opened its exec stream, then hand back the
    /// feeding end.
    pub async fn exec_feed(&self) -> mpsc::Sender<ExecEvent> {
        for _ in 0..1000 {
            if let Some(tx) = self.exec_tx.lock().clone() {
                return tx;
            }
            tokio::task::yield_now().await;
        }
        panic!("exec stream was never opened");
    }

    /// Drop the feeding end, simulating remote command exit.
    pub fn end_exec(&self) {
        self.exec_tx.lock().take();
    }

    /// Wait until the session opened its shell, then hand back the test side.
    pub async fn shell(&self) -> ShellServer {
        for _ in 0..1000 {
            if let Some(server) = self.shell_server.lock().take() {
                return server;
            }
            tokio::task::yield_now().await;
        }
        panic!("shell was never opened");
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open_exec(&self, _command: &str) -> Result<mpsc::Receiver<ExecEvent>, SshError> {
        self.exec_calls.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(64);
        *self.exec_tx.lock() = Some(tx);
        Ok(rx)
    }

    async fn exec_capture(&self, _command: &str) -> Result<String, SshError> {
        self.capture_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.capture_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.capture_output.lock().clone())
    }

    async fn open_shell(&self, _cols: u16, _rows: u16) -> Result<ShellHandle, SshError> {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (output_tx, output_rx) = mpsc::channel(64);
        *self.shell_server.lock() = Some(ShellServer { cmd_rx, output_tx });
        Ok(ShellHandle { cmd_tx, output_rx })
    }

    async fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.events.lock().push("close".to_string());
    }
}

/// Factory producing scripted transports, with an ordered event log
pub struct MockFactory {
    pub connects: AtomicUsize,
    fail_with: Mutex<Option<String>>,
    transports: Mutex<Vec<Arc<MockTransport>>>,
    events: Arc<Mutex<Vec<String>>>,
    capture_output: Mutex<String>,
}

impl MockFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            connects: AtomicUsize::new(0),
            fail_with: Mutex::new(None),
            transports: Mutex::new(Vec::new()),
            events: Arc::new(Mutex::new(Vec::new())),
            capture_output: Mutex::new(String::new()),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        let factory = Self::new();
        *factory.fail_with.lock() = Some(message.to_string());
        factory
    }

    pub fn with_capture_output(output: &str) -> Arc<Self> {
        let factory = Self::new();
        *factory.capture_output.lock() = output.to_string();
        factory
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Ordered "connect"/"close" event log across all transports.
    pub fn event_log(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    /// Wait for the nth transport (0-based) to be connected.
    pub async fn transport(&self, index: usize) -> Arc<MockTransport> {
        for _ in 0..1000 {
            if let Some(t) = self.transports.lock().get(index) {
                return Arc::clone(t);
            }
            tokio::task::yield_now().await;
        }
        panic!("transport {} was never connected", index);
    }
}

#[async_trait]
impl TransportFactory for MockFactory {
    async fn connect(&self, _pod: &PodRef) -> Result<Arc<dyn Transport>, SshError> {
        if let Some(message) = self.fail_with.lock().clone() {
            return Err(SshError::ConnectionFailed(message));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.events.lock().push("connect".to_string());
        let transport = Arc::new(MockTransport::new(
            Arc::clone(&self.events),
            self.capture_output.lock().clone(),
        ));
        self.transports.lock().push(Arc::clone(&transport));
        Ok(transport)
    }
}

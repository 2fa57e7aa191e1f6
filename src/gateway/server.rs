//! WebSocket gateway
//!
//! Accepts browser connections, assigns each a client id, and bridges
//! between JSON protocol events and the session registry. One reader loop
//! and one writer task per client; session teardown on any disconnect path
//! goes through a single funnel at the end of the reader.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::protocol::{ClientEvent, ClientSink, ServerEvent};
use crate::pods::PodLocator;
use crate::session::{SessionKey, SessionRegistry};

/// Outbound event buffer per client; a slow client drops events rather than
/// stalling sessions
const EVENT_CHANNEL_CAPACITY: usize = 256;

pub struct Gateway {
    registry: Arc<SessionRegistry>,
    locator: Arc<PodLocator>,
}

impl Gateway {
    pub fn new(registry: Arc<SessionRegistry>, locator: Arc<PodLocator>) -> Arc<Self> {
        Arc::new(Self { registry, locator })
    }

    /// Accept loop; runs until the listener is dropped.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    // Interactive terminal traffic, keep latency down
                    if let Err(e) = stream.set_nodelay(true) {
                        warn!("Failed to set TCP_NODELAY: {}", e);
                    }
                    let gateway = Arc::clone(&self);
                    tokio::spawn(async move {
                        gateway.handle_client(stream, addr).await;
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }

    async fn handle_client(self: Arc<Self>, stream: TcpStream, addr: SocketAddr) {
        let client_id = Uuid::new_v4().to_string();

        let ws_stream = match accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                warn!("WebSocket handshake failed for {}: {}", addr, e);
                return;
            }
        };

        info!("Client {} connected from {}", client_id, addr);

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let (sink, mut event_rx) = ClientSink::channel(EVENT_CHANNEL_CAPACITY);

        // Writer: single owner of the outbound half, serializes all session
        // and dispatch events
        let writer_id = client_id.clone();
        let writer = tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                let json = match serde_json::to_string(&event) {
                    Ok(json) => json,
                    Err(e) => {
                        error!("Failed to serialize event for {}: {}", writer_id, e);
                        continue;
                    }
                };
                if let Err(e) = ws_sender.send(Message::Text(json)).await {
                    debug!("Send to client {} failed: {}", writer_id, e);
                    break;
                }
            }
            debug!("Writer stopped for client {}", writer_id);
        });

        while let Some(msg) = ws_receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(event) => {
                        dispatch(&self.registry, &self.locator, &client_id, event, &sink).await;
                    }
                    Err(e) => {
                        warn!("Unparseable event from client {}: {}", client_id, e);
                    }
                },
                Ok(Message::Close(_)) => {
                    debug!("Client {} sent close", client_id);
                    break;
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                Ok(_) => {}
                Err(e) => {
                    warn!("Receive error from client {}: {}", client_id, e);
                    break;
                }
            }
        }

        // Single teardown funnel: every disconnect path lands here
        self.registry.close_all(&client_id).await;
        drop(sink);
        let _ = writer.await;
        info!("Client {} disconnected", client_id);
    }
}

/// Route one client event to the registry.
///
/// Resolution failures are answered on the spot; no transport is attempted
/// for a pod the snapshot cannot place. Input and resize carry no pod id on
/// the wire and fan out to every live shell session of the client.
async fn dispatch(
    registry: &Arc<SessionRegistry>,
    locator: &PodLocator,
    client_id: &str,
    event: ClientEvent,
    sink: &ClientSink,
) {
    match event {
        ClientEvent::LogsSubscribe { pod_id } => match locator.resolve(&pod_id) {
            Ok(pod) => {
                registry
                    .open(SessionKey::logs(&pod_id, client_id), pod, sink.clone())
                    .await;
            }
            Err(err) => {
                warn!("Log subscribe for unknown pod {}: {}", pod_id, err);
                sink.emit(ServerEvent::LogsDisconnected {
                    error: Some(err.to_string()),
                });
            }
        },

        ClientEvent::LogsUnsubscribe { pod_id } => {
            registry.close(&SessionKey::logs(&pod_id, client_id)).await;
        }

        ClientEvent::ShellConnect { pod_id } => match locator.resolve(&pod_id) {
            Ok(pod) => {
                registry
                    .open(SessionKey::shell(&pod_id, client_id), pod, sink.clone())
                    .await;
            }
            Err(err) => {
                warn!("Shell connect for unknown pod {}: {}", pod_id, err);
                sink.emit(ServerEvent::ShellError {
                    error: err.to_string(),
                });
            }
        },

        ClientEvent::ShellInput { data } => {
            registry.shell_input(client_id, data.into_bytes()).await;
        }

        ClientEvent::ShellResize { cols, rows } => {
            registry.shell_resize(client_id, cols, rows).await;
        }

        ClientEvent::ShellDisconnect { pod_id } => {
            registry.close(&SessionKey::shell(&pod_id, client_id)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pods::{Pod, PodRuntime, PortBinding};
    use crate::session::{ProbeSet, SessionSettings};
    use crate::ssh::mock::MockFactory;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn locator_with_pod(id: &str) -> Arc<PodLocator> {
        let locator = Arc::new(PodLocator::new("root"));
        locator.replace(vec![Pod {
            id: id.to_string(),
            name: None,
            desired_status: Some("RUNNING".to_string()),
            runtime: Some(PodRuntime {
                ports: vec![PortBinding {
                    ip: "203.0.113.7".to_string(),
                    is_ip_public: true,
                    private_port: 22,
                    public_port: 40022,
                    kind: "tcp".to_string(),
                }],
            }),
        }]);
        locator
    }

    fn registry(factory: Arc<MockFactory>) -> Arc<SessionRegistry> {
        SessionRegistry::new(factory, ProbeSet::default(), SessionSettings::default())
    }

    async fn recv_event(rx: &mut mpsc::Receiver<ServerEvent>) -> ServerEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("sink closed")
    }

    #[tokio::test]
    async fn unknown_pod_log_subscribe_answers_without_connecting() {
        let factory = MockFactory::new();
        let registry = registry(Arc::clone(&factory));
        let locator = Arc::new(PodLocator::new("root"));
        let (sink, mut rx) = ClientSink::channel(16);

        dispatch(
            &registry,
            &locator,
            "c1",
            ClientEvent::LogsSubscribe {
                pod_id: "ghost".to_string(),
            },
            &sink,
        )
        .await;

        assert_eq!(
            recv_event(&mut rx).await,
            ServerEvent::LogsDisconnected {
                error: Some("Pod not found".to_string())
            }
        );
        assert_eq!(factory.connect_count(), 0);
        assert_eq!(registry.count(), 0);
    }

    #[tokio::test]
    async fn unknown_pod_shell_connect_answers_with_shell_error() {
        let factory = MockFactory::new();
        let registry = registry(Arc::clone(&factory));
        let locator = Arc::new(PodLocator::new("root"));
        let (sink, mut rx) = ClientSink::channel(16);

        dispatch(
            &registry,
            &locator,
            "c1",
            ClientEvent::ShellConnect {
                pod_id: "ghost".to_string(),
            },
            &sink,
        )
        .await;

        assert_eq!(
            recv_event(&mut rx).await,
            ServerEvent::ShellError {
                error: "Pod not found".to_string()
            }
        );
        assert_eq!(factory.connect_count(), 0);
    }

    #[tokio::test]
    async fn pod_without_shell_endpoint_reports_before_any_connect() {
        let factory = MockFactory::new();
        let registry = registry(Arc::clone(&factory));
        let locator = Arc::new(PodLocator::new("root"));
        locator.replace(vec![Pod {
            id: "p1".to_string(),
            name: None,
            desired_status: Some("RUNNING".to_string()),
            runtime: Some(PodRuntime {
                ports: vec![PortBinding {
                    ip: "10.0.0.5".to_string(),
                    is_ip_public: false,
                    private_port: 22,
                    public_port: 22,
                    kind: "tcp".to_string(),
                }],
            }),
        }]);
        let (sink, mut rx) = ClientSink::channel(16);

        dispatch(
            &registry,
            &locator,
            "c1",
            ClientEvent::ShellConnect {
                pod_id: "p1".to_string(),
            },
            &sink,
        )
        .await;

        assert_eq!(
            recv_event(&mut rx).await,
            ServerEvent::ShellError {
                error: "No SSH port available".to_string()
            }
        );
        assert_eq!(factory.connect_count(), 0);
    }

    #[tokio::test]
    async fn subscribe_then_unsubscribe_round_trips_through_registry() {
        let factory = MockFactory::new();
        let registry = registry(Arc::clone(&factory));
        let locator = locator_with_pod("p1");
        let (sink, mut rx) = ClientSink::channel(16);

        dispatch(
            &registry,
            &locator,
            "c1",
            ClientEvent::LogsSubscribe {
                pod_id: "p1".to_string(),
            },
            &sink,
        )
        .await;
        let transport = factory.transport(0).await;
        transport.exec_feed().await;
        assert_eq!(recv_event(&mut rx).await, ServerEvent::LogsConnected);

        dispatch(
            &registry,
            &locator,
            "c1",
            ClientEvent::LogsUnsubscribe {
                pod_id: "p1".to_string(),
            },
            &sink,
        )
        .await;

        assert_eq!(registry.count(), 0);
        assert_eq!(factory.event_log(), vec!["connect", "close"]);
        // Client-initiated close: no terminal event on the wire
        assert!(rx.try_recv().is_err());
    }
}

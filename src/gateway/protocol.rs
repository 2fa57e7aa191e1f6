//! Client-facing wire protocol
//!
//! JSON text messages over the WebSocket, tagged by `event`. Names match the
//! browser console's existing vocabulary, so payload shapes here are the
//! compatibility contract.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::session::ResourceSample;

/// Events sent by a browser client
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event")]
pub enum ClientEvent {
    #[serde(rename = "logs:subscribe")]
    LogsSubscribe {
        #[serde(rename = "podId")]
        pod_id: String,
    },

    #[serde(rename = "logs:unsubscribe")]
    LogsUnsubscribe {
        #[serde(rename = "podId")]
        pod_id: String,
    },

    #[serde(rename = "ssh:connect")]
    ShellConnect {
        #[serde(rename = "podId")]
        pod_id: String,
    },

    /// Raw keystrokes, forwarded verbatim to the remote shell
    #[serde(rename = "ssh:data")]
    ShellInput { data: String },

    #[serde(rename = "ssh:resize")]
    ShellResize { cols: u16, rows: u16 },

    #[serde(rename = "ssh:disconnect")]
    ShellDisconnect {
        #[serde(rename = "podId")]
        pod_id: String,
    },
}

/// Events sent back to a browser client
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event")]
pub enum ServerEvent {
    #[serde(rename = "logs:connected")]
    LogsConnected,

    /// Non-empty batch of new log lines, stderr-tagged entries included
    #[serde(rename = "logs:data")]
    LogsData { lines: Vec<String> },

    /// Terminal for the log session; error present only on failure
    #[serde(rename = "logs:disconnected")]
    LogsDisconnected {
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    #[serde(rename = "resources:data")]
    ResourcesData {
        #[serde(flatten)]
        sample: ResourceSample,
    },

    #[serde(rename = "ssh:connected")]
    ShellConnected,

    /// Remote shell output, verbatim
    #[serde(rename = "ssh:data")]
    ShellOutput { data: String },

    #[serde(rename = "ssh:error")]
    ShellError { error: String },

    #[serde(rename = "ssh:disconnected")]
    ShellDisconnected,
}

/// Per-client outbound event channel.
///
/// Sessions emit through a clone of this; a closed or saturated client never
/// blocks a session, the event is dropped and the disconnect path cleans up.
#[derive(Clone)]
pub struct ClientSink {
    tx: mpsc::Sender<ServerEvent>,
}

impl ClientSink {
    pub fn new(tx: mpsc::Sender<ServerEvent>) -> Self {
        Self { tx }
    }

    /// Create a sink and its receiving end.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Queue an event for the client.
    ///
    /// Non-blocking: a full or closed sink drops the event. A client that
    /// stops reading its socket loses events; its disconnect path cleans up.
    pub fn emit(&self, event: ServerEvent) {
        let _ = self.tx.try_send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_events_deserialize() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"event":"logs:subscribe","podId":"p1"}"#).unwrap();
        assert!(matches!(event, ClientEvent::LogsSubscribe { pod_id } if pod_id == "p1"));

        let event: ClientEvent =
            serde_json::from_str(r#"{"event":"ssh:resize","cols":120,"rows":40}"#).unwrap();
        assert!(matches!(
            event,
            ClientEvent::ShellResize {
                cols: 120,
                rows: 40
            }
        ));
    }

    #[test]
    fn disconnected_omits_absent_error() {
        let json =
            serde_json::to_string(&ServerEvent::LogsDisconnected { error: None }).unwrap();
        assert_eq!(json, r#"{"event":"logs:disconnected"}"#);

        let json = serde_json::to_string(&ServerEvent::LogsDisconnected {
            error: Some("Pod not found".to_string()),
        })
        .unwrap();
        assert!(json.contains(r#""error":"Pod not found""#));
    }

    #[test]
    fn resource_sample_flattens_into_event() {
        let sample = ResourceSample {
            cpu: 12.3,
            mem_percent: 45.0,
            mem_used: "900MB".to_string(),
            mem_total: "2000MB".to_string(),
            disk_used: "10G".to_string(),
            disk_total: "50G".to_string(),
        };
        let json = serde_json::to_string(&ServerEvent::ResourcesData { sample }).unwrap();
        assert!(json.contains(r#""event":"resources:data""#));
        assert!(json.contains(r#""memPercent":45.0"#));
        assert!(json.contains(r#""diskTotal":"50G""#));
    }
}

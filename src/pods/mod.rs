//! Pod inventory types and shell-endpoint resolution
//!
//! The control plane owns the inventory; this module only consumes its JSON
//! shape. A snapshot is replaced wholesale by the refresher and read at
//! session-open time. Nothing here does network I/O of its own.

pub mod inventory;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Private port that carries the pod's shell endpoint
pub const SHELL_PORT: u16 = 22;

/// One exposed port binding on a pod
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortBinding {
    pub ip: String,
    pub is_ip_public: bool,
    pub private_port: u16,
    pub public_port: u16,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// Runtime facts for a running pod
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodRuntime {
    #[serde(default)]
    pub ports: Vec<PortBinding>,
}

/// One rented compute instance, as reported by the control plane
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pod {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub desired_status: Option<String>,
    #[serde(default)]
    pub runtime: Option<PodRuntime>,
}

/// Connection coordinates for a pod's shell endpoint.
///
/// A point-in-time fact derived from the snapshot; may be stale by the time
/// the transport connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodRef {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub username: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LocateError {
    #[error("Pod not found")]
    PodNotFound,

    #[error("No SSH port available")]
    NoShellEndpoint,
}

/// Resolves pod identifiers against the latest inventory snapshot
pub struct PodLocator {
    snapshot: RwLock<Arc<Vec<Pod>>>,
    username: String,
}

impl PodLocator {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(Vec::new())),
            username: username.into(),
        }
    }

    /// Replace the snapshot wholesale. Sessions opened earlier keep the
    /// coordinates they resolved; nothing holds into the old snapshot.
    pub fn replace(&self, pods: Vec<Pod>) {
        *self.snapshot.write() = Arc::new(pods);
    }

    pub fn snapshot(&self) -> Arc<Vec<Pod>> {
        Arc::clone(&self.snapshot.read())
    }

    /// Resolve a pod id to shell-endpoint coordinates.
    ///
    /// The shell endpoint is the port binding whose private port is 22 and
    /// whose IP is public; its absence is a definite error surfaced before
    /// any transport is attempted.
    pub fn resolve(&self, pod_id: &str) -> Result<PodRef, LocateError> {
        let snapshot = self.snapshot();
        let pod = snapshot
            .iter()
            .find(|p| p.id == pod_id)
            .ok_or(LocateError::PodNotFound)?;

        let ports = pod
            .runtime
            .as_ref()
            .map(|r| r.ports.as_slice())
            .unwrap_or_default();

        let binding = ports
            .iter()
            .find(|p| p.private_port == SHELL_PORT && p.is_ip_public)
            .ok_or(LocateError::NoShellEndpoint)?;

        Ok(PodRef {
            id: pod.id.clone(),
            host: binding.ip.clone(),
            port: binding.public_port,
            username: self.username.clone(),
        })
    }
}

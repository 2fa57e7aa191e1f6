//! Inventory snapshot refresh
//!
//! The control plane is an external collaborator; this is the thin boundary
//! that pulls its pod list on a fixed interval and swaps it into the locator.
//! A failed fetch keeps the previous snapshot.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{Pod, PodLocator};

/// Where pod snapshots come from
#[async_trait]
pub trait InventorySource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<Pod>, InventoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("Inventory request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Inventory payload invalid: {0}")]
    Payload(String),
}

/// HTTP source returning a JSON array of pods
pub struct HttpInventorySource {
    client: reqwest::Client,
    url: String,
}

impl HttpInventorySource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl InventorySource for HttpInventorySource {
    async fn fetch(&self) -> Result<Vec<Pod>, InventoryError> {
        let response = self.client.get(&self.url).send().await?;
        let response = response
            .error_for_status()
            .map_err(InventoryError::Request)?;
        let pods = response
            .json::<Vec<Pod>>()
            .await
            .map_err(|e| InventoryError::Payload(e.to_string()))?;
        Ok(pods)
    }
}

/// Refresh the locator snapshot every `interval`, forever.
pub fn spawn_refresh_task(
    locator: Arc<PodLocator>,
    source: Arc<dyn InventorySource>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match source.fetch().await {
                Ok(pods) => {
                    debug!("Inventory refreshed: {} pods", pods.len());
                    locator.replace(pods);
                }
                Err(e) => {
                    warn!("Inventory refresh failed, keeping stale snapshot: {}", e);
                }
            }
        }
    })
}

//! Fan-out of session statuses to any number of viewers.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::StatusStore;
use crate::analysis::{AnalysisStatus, StatusSink};

pub const DEFAULT_HUB_CAPACITY: usize = 64;

/// Broadcast channel for statuses. Viewers that lag lose old updates,
/// never new ones.
#[derive(Debug, Clone)]
pub struct StatusHub {
    tx: broadcast::Sender<AnalysisStatus>,
}

impl StatusHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AnalysisStatus> {
        self.tx.subscribe()
    }

    /// Returns the number of viewers reached.
    pub fn publish(&self, status: AnalysisStatus) -> usize {
        self.tx.send(status).unwrap_or(0)
    }
}

impl Default for StatusHub {
    fn default() -> Self {
        Self::new(DEFAULT_HUB_CAPACITY)
    }
}

/// Persists each status, then broadcasts the ones the store accepted.
pub struct PersistingSink {
    store: Arc<StatusStore>,
    hub: StatusHub,
    source: String,
}

impl PersistingSink {
    /// `source` is recorded alongside every status for later recovery.
    pub fn new(store: Arc<StatusStore>, hub: StatusHub, source: impl Into<String>) -> Self {
        Self {
            store,
            hub,
            source: source.into(),
        }
    }
}

#[async_trait]
impl StatusSink for PersistingSink {
    async fn on_status(&self, status: AnalysisStatus) {
        match self.store.write(&status, &self.source).await {
            Ok(true) => {
                self.hub.publish(status);
            }
            Ok(false) => debug!("Dropped stale {} status", status.stage),
            Err(e) => {
                // Viewers still get live updates when the disk is unhappy.
                warn!("Failed to persist status: {}", e);
                self.hub.publish(status);
            }
        }
    }
}

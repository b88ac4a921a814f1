//! Single-slot record of the most recent session status.
//!
//! A viewer that opens while a session is running (or just finished)
//! reads this record to pick up where the session is.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{read_json, write_json, StoreError};
use crate::analysis::{AnalysisStatus, Stage};

pub const STATUS_FILE: &str = "current_analysis.json";

/// How long a record stays recoverable after its last write.
pub const RECOVERY_WINDOW: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub status: AnalysisStatus,
    /// Image source the session was started with.
    pub source: String,
    pub written_at: DateTime<Utc>,
}

/// Whether `incoming` may overwrite the stored status.
///
/// Only a brand-new session's INITIALIZING status may replace another
/// session's record, and nothing replaces a terminal status of the same
/// session.
pub fn should_replace(current: Option<&AnalysisStatus>, incoming: &AnalysisStatus) -> bool {
    match current {
        None => true,
        Some(current) if current.session_id != incoming.session_id => {
            incoming.stage == Stage::Initializing
        }
        Some(current) => !current.stage.is_terminal(),
    }
}

pub struct StatusStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl StatusStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(STATUS_FILE),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read-modify-write. Returns whether the status was stored.
    pub async fn write(&self, status: &AnalysisStatus, source: &str) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().await;

        let current = match read_json::<StatusRecord>(&self.path).await {
            Ok(record) => record,
            Err(StoreError::Json(e)) => {
                warn!("Discarding unreadable status record: {}", e);
                None
            }
            Err(e) => return Err(e),
        };

        if !should_replace(current.as_ref().map(|r| &r.status), status) {
            debug!(
                "Refusing {} status from session {} over stored record",
                status.stage, status.session_id
            );
            return Ok(false);
        }

        let record = StatusRecord {
            status: status.clone(),
            source: source.to_string(),
            written_at: Utc::now(),
        };
        write_json(&self.path, &record).await?;
        Ok(true)
    }

    /// The stored record, regardless of age.
    pub async fn read(&self) -> Result<Option<StatusRecord>, StoreError> {
        let _guard = self.lock.lock().await;
        read_json(&self.path).await
    }

    /// The stored record if it was written within [`RECOVERY_WINDOW`].
    pub async fn recover(&self) -> Result<Option<StatusRecord>, StoreError> {
        self.recover_at(Utc::now()).await
    }

    pub async fn recover_at(&self, now: DateTime<Utc>) -> Result<Option<StatusRecord>, StoreError> {
        Ok(self
            .read()
            .await?
            .filter(|record| {
                // Negative ages (clock skew) count as fresh.
                now.signed_duration_since(record.written_at)
                    .to_std()
                    .map_or(true, |age| age <= RECOVERY_WINDOW)
            }))
    }

    pub async fn clear(&self) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

//! Saved analysis results, newest first.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;

use super::{read_json, write_json, StoreError};
use crate::analysis::AnalysisResult;

pub const GALLERY_FILE: &str = "gallery.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GalleryEntry {
    /// Image URL, path or data URI.
    pub source: String,
    /// Page the image was found on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_url: Option<String>,
    pub saved_at: DateTime<Utc>,
    pub result: AnalysisResult,
}

impl GalleryEntry {
    pub fn new(source: impl Into<String>, page_url: Option<String>, result: AnalysisResult) -> Self {
        Self {
            source: source.into(),
            page_url,
            saved_at: Utc::now(),
            result,
        }
    }
}

pub struct Gallery {
    path: PathBuf,
    lock: Mutex<()>,
}

impl Gallery {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(GALLERY_FILE),
            lock: Mutex::new(()),
        }
    }

    /// Insert at the front. Returns the new entry count.
    pub async fn append(&self, entry: GalleryEntry) -> Result<usize, StoreError> {
        let _guard = self.lock.lock().await;
        let mut entries: Vec<GalleryEntry> = read_json(&self.path).await?.unwrap_or_default();
        info!("Saving {} to gallery", entry.result.determined_class);
        entries.insert(0, entry);
        write_json(&self.path, &entries).await?;
        Ok(entries.len())
    }

    /// Up to `limit` entries, newest first; all of them if `limit` is `None`.
    pub async fn list(&self, limit: Option<usize>) -> Result<Vec<GalleryEntry>, StoreError> {
        let _guard = self.lock.lock().await;
        let mut entries: Vec<GalleryEntry> = read_json(&self.path).await?.unwrap_or_default();
        if let Some(limit) = limit {
            entries.truncate(limit);
        }
        Ok(entries)
    }

    pub async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.list(None).await?.len())
    }
}

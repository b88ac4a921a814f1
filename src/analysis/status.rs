//! Status updates broadcast while a session runs.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::ErrorDescriptor;
use super::types::AnalysisResult;

/// Identity of one session, used to discard stale updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let full = self.0.simple().to_string();
        write!(f, "{}", &full[..8])
    }
}

/// Lifecycle stage of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Initializing,
    Downloading,
    Requesting,
    Ingesting,
    Finalizing,
    Succeeded,
    Failed,
    Cancelled,
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Succeeded | Stage::Failed | Stage::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Initializing => "initializing",
            Stage::Downloading => "downloading",
            Stage::Requesting => "requesting",
            Stage::Ingesting => "ingesting",
            Stage::Finalizing => "finalizing",
            Stage::Succeeded => "succeeded",
            Stage::Failed => "failed",
            Stage::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One externally visible update from a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisStatus {
    pub session_id: SessionId,
    pub stage: Stage,
    /// 0..=100, non-decreasing while the session is in flight.
    pub progress: u8,
    pub primary_text: String,
    pub detail_text: String,
    /// Tail of the streamed text, single line.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub streaming_preview: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<AnalysisResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDescriptor>,
    pub emitted_at: DateTime<Utc>,
}

impl AnalysisStatus {
    pub fn new(
        session_id: SessionId,
        stage: Stage,
        progress: u8,
        primary_text: impl Into<String>,
        detail_text: impl Into<String>,
    ) -> Self {
        Self {
            session_id,
            stage,
            progress: progress.min(100),
            primary_text: primary_text.into(),
            detail_text: detail_text.into(),
            streaming_preview: String::new(),
            result: None,
            error: None,
            emitted_at: Utc::now(),
        }
    }

    pub fn with_preview(mut self, preview: impl Into<String>) -> Self {
        self.streaming_preview = preview.into();
        self
    }

    pub fn with_result(mut self, result: AnalysisResult) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_error(mut self, error: ErrorDescriptor) -> Self {
        self.error = Some(error);
        self
    }
}

/// Receiver of session status updates.
///
/// The session awaits each call, so updates from one session arrive in
/// emission order. Persistence and fan-out are the sink's business.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn on_status(&self, status: AnalysisStatus);
}

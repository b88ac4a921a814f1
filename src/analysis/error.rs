//! Session error taxonomy.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest prefix of raw model output kept for diagnostics.
pub const RAW_PREVIEW_CHARS: usize = 500;

/// Every way a session can end other than success. None are retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Image fetch failed: {0}")]
    Fetch(String),

    #[error("{0}")]
    Provider(String),

    #[error("Stream interrupted: {0}")]
    Transport(String),

    #[error("Request encoding failed: {0}")]
    Encoding(String),

    #[error("Model output is not a valid analysis result: {reason}")]
    ResultFormat {
        reason: String,
        /// At most [`RAW_PREVIEW_CHARS`] characters of the raw output.
        raw_preview: String,
    },

    #[error("Cancelled by user")]
    CancelledByUser,

    #[error("Timed out after {0} seconds")]
    CancelledByTimeout(u64),

    #[error("Superseded by a newer analysis")]
    SupersededBySession,
}

/// Classification carried by failed and cancelled statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Fetch,
    Provider,
    Transport,
    Encoding,
    ResultFormat,
    CancelledByUser,
    CancelledByTimeout,
    SupersededBySession,
}

/// User-facing description of a terminal error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    pub kind: ErrorKind,
    /// Short headline.
    pub message: String,
    /// Longer guidance or the underlying cause.
    pub detail: String,
    /// Truncated raw model output, for result format failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

impl AnalysisError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AnalysisError::Configuration(_) => ErrorKind::Configuration,
            AnalysisError::Fetch(_) => ErrorKind::Fetch,
            AnalysisError::Provider(_) => ErrorKind::Provider,
            AnalysisError::Transport(_) => ErrorKind::Transport,
            AnalysisError::Encoding(_) => ErrorKind::Encoding,
            AnalysisError::ResultFormat { .. } => ErrorKind::ResultFormat,
            AnalysisError::CancelledByUser => ErrorKind::CancelledByUser,
            AnalysisError::CancelledByTimeout(_) => ErrorKind::CancelledByTimeout,
            AnalysisError::SupersededBySession => ErrorKind::SupersededBySession,
        }
    }

    /// Whether this error comes from the cancellation signal.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            AnalysisError::CancelledByUser
                | AnalysisError::CancelledByTimeout(_)
                | AnalysisError::SupersededBySession
        )
    }

    /// Cancelled (as opposed to failed) terminal stage. Timeouts are failures.
    pub fn ends_as_cancelled(&self) -> bool {
        matches!(
            self,
            AnalysisError::CancelledByUser | AnalysisError::SupersededBySession
        )
    }

    /// Build a format error, keeping only a bounded prefix of the raw text.
    pub fn result_format(reason: impl Into<String>, raw: &str) -> Self {
        AnalysisError::ResultFormat {
            reason: reason.into(),
            raw_preview: raw.chars().take(RAW_PREVIEW_CHARS).collect(),
        }
    }

    pub fn descriptor(&self) -> ErrorDescriptor {
        let (message, detail) = match self {
            AnalysisError::Configuration(msg) => ("Not configured".to_string(), msg.clone()),
            AnalysisError::Fetch(msg) => (
                "Could not load image".to_string(),
                format!("{}. Check the image address and try again.", msg),
            ),
            AnalysisError::Provider(msg) => ("Analysis failed".to_string(), msg.clone()),
            AnalysisError::Transport(msg) => (
                "Connection lost".to_string(),
                format!("The model stream was interrupted: {}", msg),
            ),
            AnalysisError::Encoding(msg) => ("Analysis failed".to_string(), msg.clone()),
            AnalysisError::ResultFormat { reason, .. } => (
                "Unreadable result".to_string(),
                format!(
                    "The model returned a malformed result that could not be parsed ({}). Please try again.",
                    reason
                ),
            ),
            AnalysisError::CancelledByUser => (
                "Analysis cancelled".to_string(),
                "You cancelled this image analysis.".to_string(),
            ),
            AnalysisError::CancelledByTimeout(secs) => (
                "Analysis timed out".to_string(),
                format!(
                    "No response within {} seconds. Retry or check your network.",
                    secs
                ),
            ),
            AnalysisError::SupersededBySession => (
                "Analysis replaced".to_string(),
                "A newer analysis was started.".to_string(),
            ),
        };
        let diagnostic = match self {
            AnalysisError::ResultFormat { raw_preview, .. } => Some(raw_preview.clone()),
            _ => None,
        };
        ErrorDescriptor {
            kind: self.kind(),
            message,
            detail,
            diagnostic,
        }
    }
}

//! Vision model providers.
//!
//! Each provider knows two things: how to build its streaming request and
//! how to pull a text delta out of one decoded stream record. Records that
//! don't carry a delta (heartbeats, usage blocks, malformed JSON) yield
//! `None` and never fail the session.

mod config;
mod gemini;
mod prompts;
mod volcengine;

pub use config::{Credential, ProviderConfig, ProviderKind};
pub use gemini::GeminiAdapter;
pub use prompts::{INSTRUCTION_SUFFIX, SYSTEM_PROMPT};
pub use volcengine::VolcengineAdapter;

use serde::Deserialize;

use crate::analysis::{AnalysisError, AnalysisRequest, StreamEventRecord};

/// A fully built HTTP request, ready for a transport to send.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: serde_json::Value,
}

impl ProviderRequest {
    /// Look up a header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Provider-specific request building and stream decoding.
pub trait ProviderAdapter: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Build the streaming request for one image.
    fn build_request(&self, request: &AnalysisRequest) -> Result<ProviderRequest, AnalysisError>;

    /// Text delta carried by one record, if any.
    fn extract_delta(&self, record: &StreamEventRecord) -> Option<String>;

    /// Complete (non-streaming) content carried by one record, if any.
    ///
    /// Used only when no record in the whole stream produced a delta.
    fn extract_fallback(&self, _record: &StreamEventRecord) -> Option<String> {
        None
    }

    /// Message for a non-2xx response: the body's `error.message` when it
    /// parses, else a generic message with the HTTP reason phrase.
    fn error_message(&self, reason: &str, body: &str) -> String {
        provider_error_message(body)
            .unwrap_or_else(|| format!("{} API error: {}", self.kind().display_name(), reason))
    }
}

/// Pick the adapter for a configured provider.
pub fn adapter_for(config: &ProviderConfig) -> Box<dyn ProviderAdapter> {
    match config.kind {
        ProviderKind::Gemini => Box::new(GeminiAdapter::new(config.endpoint.clone())),
        ProviderKind::Volcengine => Box::new(VolcengineAdapter::new(config.endpoint.clone())),
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorBody>,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// `error.message` from a provider error body, shared by both providers.
fn provider_error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorEnvelope>(body)
        .ok()?
        .error?
        .message
        .filter(|m| !m.trim().is_empty())
}

/// Strip a trailing slash so paths can be appended.
fn base_url(endpoint: Option<&str>, default: &str) -> String {
    endpoint.unwrap_or(default).trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_prefers_body() {
        let adapter = GeminiAdapter::new(None);
        let body = r#"{"error":{"code":400,"message":"API key not valid.","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(adapter.error_message("Bad Request", body), "API key not valid.");
    }

    #[test]
    fn test_error_message_falls_back_to_reason() {
        let adapter = VolcengineAdapter::new(None);
        assert_eq!(
            adapter.error_message("Unauthorized", "<html>nope</html>"),
            "Volcengine API error: Unauthorized"
        );
        assert_eq!(
            adapter.error_message("Too Many Requests", r#"{"error":{}}"#),
            "Volcengine API error: Too Many Requests"
        );
    }

    #[test]
    fn test_adapter_for_kind() {
        let config = ProviderConfig::new(ProviderKind::Volcengine, "doubao", Credential::new("k"));
        assert_eq!(adapter_for(&config).kind(), ProviderKind::Volcengine);
    }
}

//! Google Gemini streaming adapter.
//!
//! Uses `generateContent` with `alt=sse`, so the response is framed as
//! `data: <json>` lines. The system prompt travels in the top-level
//! `system_instruction` field and JSON output is requested through
//! `generationConfig.response_mime_type`.

use serde::{Deserialize, Serialize};

use super::prompts::SYSTEM_PROMPT;
use super::{base_url, ProviderAdapter, ProviderKind, ProviderRequest};
use crate::analysis::{AnalysisError, AnalysisRequest, StreamEventRecord};

const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Serialize)]
struct GeminiRequest<'a> {
    system_instruction: GeminiSystemInstruction<'a>,
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiSystemInstruction<'a> {
    parts: Vec<GeminiTextPart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiTextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiImagePart>,
}

#[derive(Debug, Serialize)]
struct GeminiImagePart {
    inline_data: GeminiInlineData,
}

#[derive(Debug, Serialize)]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct GeminiChunk {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}

/// Primary provider.
#[derive(Debug, Clone)]
pub struct GeminiAdapter {
    endpoint: String,
}

impl GeminiAdapter {
    pub fn new(endpoint: Option<String>) -> Self {
        Self {
            endpoint: base_url(endpoint.as_deref(), DEFAULT_ENDPOINT),
        }
    }

    fn url(&self, model_id: &str) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent?alt=sse",
            self.endpoint, model_id
        )
    }
}

impl ProviderAdapter for GeminiAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn build_request(&self, request: &AnalysisRequest) -> Result<ProviderRequest, AnalysisError> {
        let provider = request.provider();
        let body = GeminiRequest {
            system_instruction: GeminiSystemInstruction {
                parts: vec![GeminiTextPart {
                    text: SYSTEM_PROMPT,
                }],
            },
            contents: vec![GeminiContent {
                parts: vec![GeminiImagePart {
                    inline_data: GeminiInlineData {
                        mime_type: request.mime_type().to_string(),
                        data: request.image_base64(),
                    },
                }],
            }],
            generation_config: GeminiGenerationConfig {
                response_mime_type: "application/json",
            },
        };

        let body = serde_json::to_value(&body).map_err(|e| AnalysisError::Encoding(e.to_string()))?;

        Ok(ProviderRequest {
            url: self.url(&provider.model_id),
            headers: vec![
                ("Content-Type".to_string(), "application/json".to_string()),
                (
                    "x-goog-api-key".to_string(),
                    provider.credential.expose().to_string(),
                ),
            ],
            body,
        })
    }

    /// `candidates[0].content.parts[0].text`
    fn extract_delta(&self, record: &StreamEventRecord) -> Option<String> {
        let chunk: GeminiChunk = serde_json::from_str(record.payload()).ok()?;
        chunk
            .candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .next()?
            .text
            .filter(|t| !t.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Credential, ProviderConfig};

    fn request() -> AnalysisRequest {
        AnalysisRequest::new(
            b"png".to_vec(),
            "image/png",
            ProviderConfig::new(
                ProviderKind::Gemini,
                "gemini-2.5-flash",
                Credential::new("gemini-key"),
            ),
        )
    }

    #[test]
    fn test_build_request_wire_shape() {
        let built = GeminiAdapter::new(None).build_request(&request()).unwrap();
        assert_eq!(
            built.url,
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent?alt=sse"
        );
        assert_eq!(built.header("X-Goog-Api-Key"), Some("gemini-key"));
        assert!(built.header("authorization").is_none());

        let body = &built.body;
        assert_eq!(body["system_instruction"]["parts"][0]["text"], SYSTEM_PROMPT);
        let inline = &body["contents"][0]["parts"][0]["inline_data"];
        assert_eq!(inline["mime_type"], "image/png");
        assert_eq!(inline["data"], "cG5n");
        assert_eq!(body["generationConfig"]["response_mime_type"], "application/json");
    }

    #[test]
    fn test_endpoint_override() {
        let adapter = GeminiAdapter::new(Some("http://127.0.0.1:8080/".to_string()));
        let built = adapter.build_request(&request()).unwrap();
        assert!(built.url.starts_with("http://127.0.0.1:8080/v1beta/models/"));
    }

    #[test]
    fn test_extract_delta() {
        let adapter = GeminiAdapter::new(None);
        let record = StreamEventRecord::new(
            r#"{"candidates":[{"content":{"parts":[{"text":"{\"tags\":"}],"role":"model"}}]}"#,
        );
        assert_eq!(adapter.extract_delta(&record).as_deref(), Some("{\"tags\":"));
    }

    #[test]
    fn test_extract_delta_absent_or_malformed() {
        let adapter = GeminiAdapter::new(None);
        for payload in [
            "not json",
            "{}",
            r#"{"candidates":[]}"#,
            r#"{"candidates":[{"finishReason":"STOP"}]}"#,
            r#"{"candidates":[{"content":{"parts":[{"text":""}]}}]}"#,
            r#"{"usageMetadata":{"totalTokenCount":12}}"#,
        ] {
            assert_eq!(adapter.extract_delta(&StreamEventRecord::new(payload)), None, "{}", payload);
        }
        assert_eq!(adapter.extract_fallback(&StreamEventRecord::new("{}")), None);
    }
}

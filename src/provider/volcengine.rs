//! Volcengine Ark chat-completions adapter.
//!
//! OpenAI-style streaming: deltas arrive at `choices[0].delta.content`.
//! Some deployments answer with whole `choices[0].message.content`
//! objects instead, which [`ProviderAdapter::extract_fallback`] picks up.

use serde::{Deserialize, Serialize};

use super::prompts::{INSTRUCTION_SUFFIX, SYSTEM_PROMPT};
use super::{base_url, ProviderAdapter, ProviderKind, ProviderRequest};
use crate::analysis::{AnalysisError, AnalysisRequest, StreamEventRecord};

const DEFAULT_ENDPOINT: &str = "https://ark.cn-beijing.volces.com";
const MAX_COMPLETION_TOKENS: u32 = 4096;
const REASONING_EFFORT: &str = "minimal";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_completion_tokens: u32,
    reasoning_effort: &'static str,
    stream: bool,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
enum ChatMessage<'a> {
    System { content: &'a str },
    User { content: Vec<UserPart<'a>> },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum UserPart<'a> {
    ImageUrl { image_url: ImageUrl },
    Text { text: &'a str },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    delta: Option<ChatText>,
    message: Option<ChatText>,
}

#[derive(Debug, Deserialize)]
struct ChatText {
    content: Option<String>,
}

fn first_choice(record: &StreamEventRecord) -> Option<ChatChoice> {
    let chunk: ChatChunk = serde_json::from_str(record.payload()).ok()?;
    chunk.choices.into_iter().next()
}

/// Secondary provider.
#[derive(Debug, Clone)]
pub struct VolcengineAdapter {
    endpoint: String,
}

impl VolcengineAdapter {
    pub fn new(endpoint: Option<String>) -> Self {
        Self {
            endpoint: base_url(endpoint.as_deref(), DEFAULT_ENDPOINT),
        }
    }
}

impl ProviderAdapter for VolcengineAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Volcengine
    }

    fn build_request(&self, request: &AnalysisRequest) -> Result<ProviderRequest, AnalysisError> {
        let provider = request.provider();
        let body = ChatRequest {
            model: &provider.model_id,
            max_completion_tokens: MAX_COMPLETION_TOKENS,
            reasoning_effort: REASONING_EFFORT,
            stream: true,
            messages: vec![
                ChatMessage::System {
                    content: SYSTEM_PROMPT,
                },
                ChatMessage::User {
                    content: vec![
                        UserPart::ImageUrl {
                            image_url: ImageUrl {
                                url: request.data_uri(),
                            },
                        },
                        UserPart::Text {
                            text: INSTRUCTION_SUFFIX,
                        },
                    ],
                },
            ],
        };

        let body = serde_json::to_value(&body).map_err(|e| AnalysisError::Encoding(e.to_string()))?;

        Ok(ProviderRequest {
            url: format!("{}/api/v3/chat/completions", self.endpoint),
            headers: vec![
                ("Content-Type".to_string(), "application/json".to_string()),
                (
                    "Authorization".to_string(),
                    format!("Bearer {}", provider.credential.expose()),
                ),
            ],
            body,
        })
    }

    /// `choices[0].delta.content`
    fn extract_delta(&self, record: &StreamEventRecord) -> Option<String> {
        first_choice(record)?
            .delta?
            .content
            .filter(|c| !c.is_empty())
    }

    /// `choices[0].message.content`
    fn extract_fallback(&self, record: &StreamEventRecord) -> Option<String> {
        first_choice(record)?
            .message?
            .content
            .filter(|c| !c.is_empty())
    }
}

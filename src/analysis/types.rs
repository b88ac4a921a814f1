//! Request and result types for a single analysis.

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::provider::ProviderConfig;

/// Image plus provider selection. Built once the image has been fetched.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    image_bytes: Vec<u8>,
    mime_type: String,
    provider: ProviderConfig,
}

impl AnalysisRequest {
    pub fn new(image_bytes: Vec<u8>, mime_type: impl Into<String>, provider: ProviderConfig) -> Self {
        Self {
            image_bytes,
            mime_type: mime_type.into(),
            provider,
        }
    }

    pub fn image_bytes(&self) -> &[u8] {
        &self.image_bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn provider(&self) -> &ProviderConfig {
        &self.provider
    }

    /// Standard base64 of the image bytes.
    pub fn image_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.image_bytes)
    }

    /// `data:<mime>;base64,<payload>` form of the image.
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.image_base64())
    }
}

/// One descriptive tag, bilingual with a short explanation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub en: String,
    pub zh: String,
    pub wiki: String,
}

/// An artist or photographer whose style the image resembles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleMaster {
    pub name: String,
    pub reason: String,
}

/// A ready-made image search query with a short label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchSuggestion {
    pub label: String,
    pub query: String,
}

/// Structured output of a successful analysis.
///
/// Every field is required; a payload missing any of them is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub determined_class: String,
    pub analysis_summary: String,
    pub tags: Vec<Tag>,
    pub style_masters: Vec<StyleMaster>,
    #[serde(rename = "pinterest_search_chips")]
    pub search_suggestions: Vec<SearchSuggestion>,
    #[serde(rename = "ai_drawing_prompt")]
    pub drawing_prompt: String,
}

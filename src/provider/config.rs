//! Provider selection and credentials.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which remote vision model family a session talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Google Gemini (primary).
    #[default]
    Gemini,
    /// Volcengine Ark chat completions (secondary).
    Volcengine,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini",
            ProviderKind::Volcengine => "volcengine",
        }
    }

    /// Human-readable provider name used in status text.
    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "Google Gemini",
            ProviderKind::Volcengine => "Volcengine",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "gemini" | "google" | "primary" => Some(Self::Gemini),
            "volcengine" | "ark" | "doubao" | "secondary" => Some(Self::Volcengine),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// API credential. Never printed in full.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Raw secret, for building auth headers only.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Short redacted form, e.g. `AIza…9xQ`.
    pub fn redacted(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() <= 8 {
            return "****".to_string();
        }
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 3..].iter().collect();
        format!("{}…{}", head, tail)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential({})", self.redacted())
    }
}

/// Everything a session needs to reach one provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// Provider-side model identifier (e.g. `gemini-2.5-flash`).
    pub model_id: String,
    /// Display name of the configured model entry.
    pub model_name: String,
    pub credential: Credential,
    /// Base URL override; `None` uses the provider default.
    pub endpoint: Option<String>,
}

impl ProviderConfig {
    pub fn new(kind: ProviderKind, model_id: impl Into<String>, credential: Credential) -> Self {
        let model_id = model_id.into();
        Self {
            kind,
            model_name: model_id.clone(),
            model_id,
            credential,
            endpoint: None,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_model_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = name.into();
        self
    }
}

//! Turning accumulated model text into an [`AnalysisResult`].

use super::error::AnalysisError;
use super::types::AnalysisResult;

const FENCE: &str = "```";

/// Characters of accumulated text shown in the live preview.
pub const PREVIEW_CHARS: usize = 200;

/// Remove a leading (optionally language-tagged) and trailing Markdown
/// code fence plus surrounding whitespace. Clean text passes through.
pub fn strip_code_fences(text: &str) -> &str {
    let mut body = text.trim();

    if let Some(rest) = body.strip_prefix(FENCE) {
        let tag_len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
            .unwrap_or(rest.len());
        body = rest[tag_len..].trim_start();
    }
    if let Some(rest) = body.strip_suffix(FENCE) {
        body = rest.trim_end();
    }
    body
}

/// Parse the full model output. All-or-nothing: any missing field fails.
pub fn parse(full_text: &str) -> Result<AnalysisResult, AnalysisError> {
    let body = strip_code_fences(full_text);
    if body.is_empty() {
        return Err(AnalysisError::result_format("empty response", full_text));
    }
    serde_json::from_str(body).map_err(|e| AnalysisError::result_format(e.to_string(), full_text))
}

/// Single-line tail of the accumulated text for streaming previews.
///
/// Fences anywhere in the text are dropped and newlines become spaces.
pub fn streaming_preview(accumulated: &str) -> String {
    let cleaned = accumulated
        .replace("```json\n", "")
        .replace("```json", "")
        .replace(FENCE, "")
        .replace(['\r', '\n'], " ");
    let cleaned = cleaned.trim();

    let total = cleaned.chars().count();
    cleaned
        .chars()
        .skip(total.saturating_sub(PREVIEW_CHARS))
        .collect()
}

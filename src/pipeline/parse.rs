//! Oracle response parsing: strip any code fence, then decode strictly.

use thiserror::Error;

use crate::store::Classification;

/// Characters of the raw response kept in diagnostics.
pub const SNIPPET_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("response is not valid JSON: {0}")]
    NotJson(#[source] serde_json::Error),

    #[error("response does not match the classification schema: {0}")]
    Schema(String),
}

/// Remove a surrounding fenced code block, with or without a language tag.
/// Text without a fence is returned trimmed.
pub fn unwrap_fenced(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Drop the info string (e.g. `json`) up to the first newline.
    let inner = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };

    inner.trim_end().strip_suffix("```").unwrap_or(inner).trim()
}

/// Decode an oracle response into a validated [`Classification`].
pub fn parse_classification(text: &str) -> Result<Classification, ParseError> {
    let body = unwrap_fenced(text);
    let value: serde_json::Value = serde_json::from_str(body).map_err(ParseError::NotJson)?;

    if !value.is_object() {
        return Err(ParseError::Schema("expected a JSON object".to_string()));
    }

    let classification: Classification =
        serde_json::from_value(value).map_err(|e| ParseError::Schema(e.to_string()))?;

    if !(0.0..=1.0).contains(&classification.confidence) {
        return Err(ParseError::Schema(format!(
            "confidence {} outside [0, 1]",
            classification.confidence
        )));
    }

    Ok(classification)
}

/// First [`SNIPPET_CHARS`] characters of `text`, for log lines.
pub fn snippet(text: &str) -> String {
    let mut out: String = text.chars().take(SNIPPET_CHARS).collect();
    if text.chars().count() > SNIPPET_CHARS {
        out.push_str("...");
    }
    out
}

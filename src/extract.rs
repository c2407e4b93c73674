use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::models::{CaptionOption, CaptionResponse, GroundingMetadata, ServiceResult};

// ── Constants ────────────────────────────────────────────────────────────────

/// Raw completions at or below this length are not worth showing verbatim.
const MIN_RAW_LEN: usize = 10;

// ── Lazy static regexes ──────────────────────────────────────────────────────

static FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(\w*)?\s*\n?(.*?)\n?\s*```$").unwrap());

// ── Candidate extraction ─────────────────────────────────────────────────────

/// Isolate a best-effort JSON-object substring from a raw completion.
///
/// Tries the first `{` through the last `}` (greedy across lines), falls back
/// to the whole trimmed text, then strips a wrapping ```fence``` if one is
/// present. Always returns *some* string; the result is a candidate, not
/// guaranteed to parse.
///
/// The greedy brace span is a known heuristic limitation: a response holding
/// two independent JSON fragments collapses into one invalid span. Kept as-is
/// for behavior parity.
pub fn extract_candidate(raw: &str) -> String {
    let candidate = match raw.find('{') {
        Some(start) => match raw.rfind('}').filter(|&end| end >= start) {
            Some(end) => raw[start..=end].trim().to_string(),
            // Unclosed object: keep the tail so the resolver sees a JSON
            // attempt and reports a parse failure instead of echoing it back.
            None => raw[start..].trim().to_string(),
        },
        None => raw.trim().to_string(),
    };

    if let Some(caps) = FENCE_RE.captures(&candidate) {
        if let Some(inner) = caps.get(2) {
            return inner.as_str().trim().to_string();
        }
    }
    candidate
}

// ── Resolution ───────────────────────────────────────────────────────────────

/// Terminal state of the parse/validate/fallback ladder. One variant per
/// outcome so each branch is matched exhaustively instead of falling out of
/// nested conditionals.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Candidate parsed into the canonical `{options: [...]}` shape.
    Success(CaptionResponse),
    /// Candidate was a flat legacy `{caption, hashtags}` object, wrapped into
    /// a single option. Grounding is dropped on this path.
    SingleOption(CaptionResponse),
    /// Candidate was unparsable but the raw text is worth showing: one
    /// synthesized option embedding the full completion.
    RawText(CaptionResponse),
    /// Parsed fine, wrong shape, not salvageable.
    ShapeMismatch { candidate: String },
    /// Not valid JSON and no raw fallback available.
    Unparsable { detail: String },
}

/// Run the candidate string through parse → shape check → fallbacks.
pub fn resolve(raw: &str, candidate: &str) -> Resolution {
    let value: Value = match serde_json::from_str(candidate) {
        Ok(v) => v,
        Err(e) => return raw_fallback(raw, candidate, &e),
    };

    if has_canonical_shape(&value) {
        if let Ok(data) = serde_json::from_value::<CaptionResponse>(value.clone()) {
            return Resolution::Success(data);
        }
    }

    // Legacy single-option shape the model sometimes emits instead.
    if value.get("caption").is_some() && value.get("hashtags").is_some() {
        if let Ok(option) = serde_json::from_value::<CaptionOption>(value) {
            if !option.caption.is_empty() {
                return Resolution::SingleOption(CaptionResponse {
                    options: vec![option],
                });
            }
        }
    }

    Resolution::ShapeMismatch {
        candidate: candidate.to_string(),
    }
}

impl Resolution {
    /// Map a terminal state to the wire-level `ServiceResult`, attaching the
    /// completion's grounding metadata only where the branch allows it.
    pub fn into_result(self, grounding: Option<GroundingMetadata>) -> ServiceResult {
        match self {
            Resolution::Success(data) => ServiceResult {
                caption_data: Some(data),
                grounding_metadata: grounding,
                error: None,
            },
            Resolution::SingleOption(data) => ServiceResult {
                caption_data: Some(data),
                grounding_metadata: None,
                error: None,
            },
            Resolution::RawText(data) => ServiceResult {
                caption_data: Some(data),
                grounding_metadata: grounding,
                error: None,
            },
            Resolution::ShapeMismatch { candidate } => ServiceResult::failure(format!(
                "Received unexpected data format from AI. Raw: {candidate}"
            )),
            Resolution::Unparsable { detail } => ServiceResult {
                caption_data: None,
                grounding_metadata: grounding,
                error: Some(format!(
                    "Failed to understand AI's response. Details: {detail}"
                )),
            },
        }
    }
}

// ── Shape checks & fallbacks ─────────────────────────────────────────────────

fn has_canonical_shape(value: &Value) -> bool {
    let Some(options) = value.get("options").and_then(Value::as_array) else {
        return false;
    };
    !options.is_empty()
        && options.iter().all(|opt| {
            opt.get("caption").map(Value::is_string).unwrap_or(false)
                && opt.get("hashtags").map(Value::is_array).unwrap_or(false)
        })
}

fn raw_fallback(raw: &str, candidate: &str, err: &serde_json::Error) -> Resolution {
    if raw.len() > MIN_RAW_LEN && !candidate.starts_with('{') {
        let caption = format!(
            "AI Response (could not extract or parse JSON):\n{}",
            raw
        );
        return Resolution::RawText(CaptionResponse {
            options: vec![CaptionOption {
                caption,
                hashtags: Vec::new(),
            }],
        });
    }
    Resolution::Unparsable {
        detail: err.to_string(),
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

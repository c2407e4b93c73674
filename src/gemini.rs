use serde::{Deserialize, Serialize};

use crate::models::GroundingMetadata;

// ── Constants ────────────────────────────────────────────────────────────────

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-2.5-flash-preview-04-17";

// ── Configuration ────────────────────────────────────────────────────────────

/// Credential and endpoint settings, read from the environment once at
/// startup and injected into the pipeline. Requests never touch the
/// environment themselves.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

impl GeminiConfig {
    /// Returns `None` when `API_KEY` is unset or blank; the transport
    /// boundary turns that into a configuration error on every request.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("API_KEY")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())?;
        let model = std::env::var("GEMINI_MODEL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let base_url = std::env::var("GEMINI_BASE_URL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Some(Self {
            api_key,
            model,
            base_url,
        })
    }
}

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum GeminiError {
    #[error("The configured API Key on the server is invalid.")]
    Auth,
    #[error("API quota exceeded. Please check your Gemini API usage on the server.")]
    Quota,
    #[error("{0}")]
    Upstream(String),
}

// ── Request / response wire types ────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    tools: Vec<Tool>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct Tool {
    google_search: GoogleSearch,
}

#[derive(Debug, Serialize)]
struct GoogleSearch {}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    grounding_metadata: Option<GroundingMetadata>,
}

// ── Public result type ───────────────────────────────────────────────────────

/// Raw text of the first candidate plus any citations the search tool
/// attached to it.
#[derive(Debug)]
pub struct Completion {
    pub text: String,
    pub grounding: Option<GroundingMetadata>,
}

// ── Completion call ──────────────────────────────────────────────────────────

/// Submit one prompt to `generateContent` with web-search grounding enabled.
/// One outbound call, no retries; the service's own request lifecycle is the
/// only timeout in play.
pub async fn generate_completion(
    client: &reqwest::Client,
    config: &GeminiConfig,
    prompt: &str,
) -> Result<Completion, GeminiError> {
    let request = GenerateContentRequest {
        contents: vec![Content {
            parts: vec![Part {
                text: prompt.to_string(),
            }],
        }],
        tools: vec![Tool {
            google_search: GoogleSearch {},
        }],
    };

    let url = format!(
        "{}/v1beta/models/{}:generateContent",
        config.base_url.trim_end_matches('/'),
        config.model
    );

    let response = client
        .post(&url)
        .header("x-goog-api-key", &config.api_key)
        .json(&request)
        .send()
        .await
        .map_err(|e| GeminiError::Upstream(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        tracing::error!(%status, "Gemini API error: {}", body);
        return Err(classify_failure(status, &body));
    }

    let parsed: GenerateContentResponse = response
        .json()
        .await
        .map_err(|e| GeminiError::Upstream(format!("undecodable Gemini response: {e}")))?;

    let candidate = parsed
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| GeminiError::Upstream("no candidates in Gemini response".to_string()))?;

    let text = candidate
        .content
        .map(|c| {
            c.parts
                .into_iter()
                .map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .filter(|t| !t.is_empty())
        .ok_or_else(|| GeminiError::Upstream("no text in Gemini response".to_string()))?;

    Ok(Completion {
        text,
        grounding: candidate.grounding_metadata,
    })
}

// ── Failure classification ───────────────────────────────────────────────────

fn classify_failure(status: reqwest::StatusCode, body: &str) -> GeminiError {
    use reqwest::StatusCode;

    if status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || body.contains("API key not valid")
    {
        return GeminiError::Auth;
    }
    if status == StatusCode::TOO_MANY_REQUESTS
        || body.contains("RESOURCE_EXHAUSTED")
        || body.to_lowercase().contains("quota")
    {
        return GeminiError::Quota;
    }
    GeminiError::Upstream(format!("Gemini API error (status {status}): {body}"))
}

// ── Tests ────────────────────────────────────────────────────────────────────

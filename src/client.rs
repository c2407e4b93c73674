use serde_json::json;

use crate::models::ServiceResult;

const NETWORK_ERROR: &str = "Failed to generate caption due to a network or server error.";

/// Call the caption endpoint and normalize the outcome for presentation.
///
/// Mirrors the server's JSON contract: any 2xx body is a `ServiceResult`
/// (possibly a degraded one), a non-2xx body usually carries an `error`
/// field worth surfacing, and anything else collapses into a generic
/// network-error message. Never returns an Err; the caller always gets a
/// displayable result.
pub async fn generate_caption(
    http: &reqwest::Client,
    endpoint: &str,
    url: &str,
) -> ServiceResult {
    let response = match http.post(endpoint).json(&json!({ "url": url })).send().await {
        Ok(r) => r,
        Err(e) => {
            tracing::error!("caption request failed: {}", e);
            return ServiceResult::failure(NETWORK_ERROR);
        }
    };

    let status = response.status();
    if !status.is_success() {
        // Prefer the server's own error message when the body parses.
        let message = match response.json::<ServiceResult>().await {
            Ok(body) => body
                .error
                .unwrap_or_else(|| format!("API request failed: {status}")),
            Err(_) => format!("API request failed: {status}"),
        };
        return ServiceResult::failure(message);
    }

    match response.json::<ServiceResult>().await {
        Ok(result) => presentable(result),
        Err(e) => {
            tracing::error!("caption response was not valid JSON: {}", e);
            ServiceResult::failure(NETWORK_ERROR)
        }
    }
}

/// Drop grounding chunks with no web source; they have nothing to display.
fn presentable(mut result: ServiceResult) -> ServiceResult {
    if let Some(grounding) = result.grounding_metadata.as_mut() {
        if let Some(chunks) = grounding.grounding_chunks.as_mut() {
            chunks.retain(|chunk| chunk.web.is_some());
        }
    }
    result
}

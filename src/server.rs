use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use url::Url;

use crate::extract::{self, Resolution};
use crate::gemini::{self, GeminiConfig, GeminiError};
use crate::models::{GenerateRequest, ServiceResult};
use crate::prompt;

pub struct AppState {
    pub gemini: Option<GeminiConfig>,
    pub http: reqwest::Client,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/generate",
            post(generate_endpoint).fallback(method_not_allowed),
        )
        .with_state(Arc::new(state))
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn method_not_allowed(method: Method) -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        [(header::ALLOW, "POST")],
        Json(ServiceResult::failure(format!(
            "Method {method} Not Allowed"
        ))),
    )
        .into_response()
}

/// The one pipeline endpoint: URL in, `ServiceResult` out.
///
/// Request-level rejections (bad body, bad URL, missing key) return 4xx/5xx;
/// every terminal state of the resolver returns 200 because the transport
/// itself succeeded, even when the pipeline degraded. Nothing is allowed to
/// escape as an unhandled error.
async fn generate_endpoint(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(p) => p,
        Err(rejection) => {
            return failure_response(
                StatusCode::BAD_REQUEST,
                format!("Invalid request body: {}", rejection.body_text()),
            )
        }
    };

    let url = req.url.trim();
    if Url::parse(url).is_err() {
        return failure_response(
            StatusCode::BAD_REQUEST,
            "Invalid URL format. Please provide a full URL (e.g., https://example.com).",
        );
    }

    let Some(config) = state.gemini.as_ref() else {
        tracing::error!("API key not configured; cannot connect to Gemini");
        return failure_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "API Key not configured on the server. Cannot connect to Gemini.",
        );
    };

    tracing::info!(%url, "generating captions");
    let prompt = prompt::build_prompt(url);

    let completion = match gemini::generate_completion(&state.http, config, &prompt).await {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("caption generation failed: {}", e);
            let message = match &e {
                GeminiError::Auth | GeminiError::Quota => e.to_string(),
                GeminiError::Upstream(detail) => format!(
                    "Failed to generate caption due to an API error on the server. Details: {detail}"
                ),
            };
            return failure_response(StatusCode::INTERNAL_SERVER_ERROR, message);
        }
    };

    let candidate = extract::extract_candidate(&completion.text);
    let resolution = extract::resolve(&completion.text, &candidate);
    if !matches!(resolution, Resolution::Success(_)) {
        tracing::warn!("caption response did not match the canonical shape; degrading");
    }

    (
        StatusCode::OK,
        Json(resolution.into_result(completion.grounding)),
    )
        .into_response()
}

fn failure_response(status: StatusCode, error: impl Into<String>) -> Response {
    (status, Json(ServiceResult::failure(error))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_app(gemini: Option<GeminiConfig>) -> Router {
        app(AppState {
            gemini,
            http: reqwest::Client::new(),
        })
    }

    fn mock_config(server: &MockServer) -> GeminiConfig {
        GeminiConfig {
            api_key: "test-key".to_string(),
            model: "gemini-test".to_string(),
            base_url: server.uri(),
        }
    }

    fn post_generate(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/generate")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn read_result(response: Response) -> ServiceResult {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn get_is_method_not_allowed() {
        let response = test_app(None)
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/generate")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[header::ALLOW], "POST");
        let result = read_result(response).await;
        assert_eq!(result.error.as_deref(), Some("Method GET Not Allowed"));
        assert_eq!(result.caption_data, None);
    }

    #[tokio::test]
    async fn missing_url_field_is_bad_request() {
        let response = test_app(None).oneshot(post_generate("{}")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let result = read_result(response).await;
        let error = result.error.unwrap();
        assert!(error.contains("Invalid request body"));
        assert!(error.contains("url"));
    }

    #[tokio::test]
    async fn unparsable_body_is_bad_request() {
        let response = test_app(None)
            .oneshot(post_generate("not json at all"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let result = read_result(response).await;
        assert!(result.error.unwrap().contains("Invalid request body"));
    }

    #[tokio::test]
    async fn invalid_url_never_reaches_the_completion_client() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let response = test_app(Some(mock_config(&server)))
            .oneshot(post_generate(r#"{"url": "definitely not a url"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let result = read_result(response).await;
        assert!(result.error.unwrap().contains("Invalid URL"));
        assert_eq!(result.caption_data, None);
    }

    #[tokio::test]
    async fn missing_api_key_short_circuits_with_500() {
        let response = test_app(None)
            .oneshot(post_generate(r#"{"url": "https://example.com/article"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let result = read_result(response).await;
        assert!(result
            .error
            .unwrap()
            .contains("API Key not configured on the server"));
    }

    #[tokio::test]
    async fn canonical_completion_returns_captions_with_grounding() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{
                    "content": {
                        "parts": [{
                            "text": "```json\n{\"options\":[{\"caption\":\"Hi\",\"hashtags\":[\"#a\"]}]}\n```"
                        }]
                    },
                    "groundingMetadata": {
                        "groundingChunks": [
                            { "web": { "uri": "https://cited.example", "title": "Cited" } }
                        ]
                    }
                }]
            })))
            .mount(&server)
            .await;

        let response = test_app(Some(mock_config(&server)))
            .oneshot(post_generate(r#"{"url": "https://example.com/article"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let result = read_result(response).await;
        let data = result.caption_data.unwrap();
        assert_eq!(data.options.len(), 1);
        assert_eq!(data.options[0].caption, "Hi");
        assert_eq!(data.options[0].hashtags, vec!["#a".to_string()]);
        assert!(result.grounding_metadata.is_some());
        assert_eq!(result.error, None);
    }

    #[tokio::test]
    async fn prose_completion_degrades_to_raw_text_with_200() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{
                    "content": {
                        "parts": [{ "text": "Here are some thoughts on the video you shared." }]
                    }
                }]
            })))
            .mount(&server)
            .await;

        let response = test_app(Some(mock_config(&server)))
            .oneshot(post_generate(r#"{"url": "https://example.com/video"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let result = read_result(response).await;
        let data = result.caption_data.unwrap();
        assert!(data.options[0]
            .caption
            .contains("Here are some thoughts on the video"));
        assert_eq!(result.error, None);
    }

    #[tokio::test]
    async fn rejected_key_maps_to_500_auth_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("API key not valid"))
            .mount(&server)
            .await;

        let response = test_app(Some(mock_config(&server)))
            .oneshot(post_generate(r#"{"url": "https://example.com"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let result = read_result(response).await;
        assert_eq!(
            result.error.as_deref(),
            Some("The configured API Key on the server is invalid.")
        );
    }

    #[tokio::test]
    async fn shape_mismatch_still_returns_200_with_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{
                    "content": { "parts": [{ "text": "{\"unexpected\": true}" }] }
                }]
            })))
            .mount(&server)
            .await;

        let response = test_app(Some(mock_config(&server)))
            .oneshot(post_generate(r#"{"url": "https://example.com"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let result = read_result(response).await;
        assert_eq!(result.caption_data, None);
        assert!(result.error.unwrap().contains("unexpected data format"));
    }

    #[tokio::test]
    async fn health_is_ok() {
        let response = test_app(None)
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

use social_caption_api::gemini::GeminiConfig;
use social_caption_api::server::{app, AppState};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let gemini = GeminiConfig::from_env();
    if gemini.is_none() {
        tracing::error!("API_KEY is not set; every caption request will fail until it is configured");
    }

    let app = app(AppState {
        gemini,
        http: reqwest::Client::new(),
    });

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await.unwrap();
    tracing::info!("listening on {}", listener.local_addr().unwrap());
    axum::serve(listener, app).await.unwrap();
}

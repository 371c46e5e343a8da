//! API route definitions

use std::sync::Arc;
use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::{handlers, state::ServiceContext};

async fn handle_404() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": true,
            "message": "Not found. Use /health to check API status.",
        })),
    )
}

async fn handle_405() -> impl IntoResponse {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({
            "error": true,
            "message": "Method not allowed. Scoring endpoints accept POST only.",
        })),
    )
}

/// Create the main application router
pub fn create_router(ctx: Arc<ServiceContext>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/questionnaire-score", post(handlers::questionnaire_score))
        .route("/analyze-text", post(handlers::analyze_text))
        .route("/combined-predict", post(handlers::combined_predict))
        .fallback(handle_404)
        .method_not_allowed_fallback(handle_405)
        .with_state(ctx)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use super::handlers;
use super::AppState;
use crate::middleware::request_id::{make_span_with_request_id, request_id_middleware};

/// Creates the main API router with all routes
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.cors_origins);

    Router::new()
        .route("/health", get(handlers::health_check))
        // Recommendations
        .route("/api/chat", post(handlers::chat))
        .route("/api/feedback", post(handlers::submit_feedback))
        // User profiles
        .route("/api/user/:user_id", get(handlers::get_profile))
        .route(
            "/api/users/:user_id/preferences",
            put(handlers::update_preferences),
        )
        .route("/api/users/:user_id/summary", get(handlers::get_summary))
        .route("/api/users/:user_id/welcome", get(handlers::get_welcome))
        .route(
            "/api/users/:user_id/history",
            post(handlers::add_reading_history),
        )
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
                .layer(cors),
        )
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

use crate::api::{handlers, AppState};
use crate::metrics::track_metrics;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

/// Build the main API router
pub fn build_router(state: AppState, cors_enabled: bool) -> Router {
    let router = Router::new()
        // Health endpoints
        .route("/health", get(handlers::health_check))
        .route("/health/live", get(handlers::health_check))
        // Model information
        .route("/soil-types", get(handlers::soil_types))
        .route("/model", get(handlers::model_info))
        // Inference
        .route("/predict", post(handlers::predict))
        // Observability
        .route("/metrics", get(handlers::metrics))
        .route_layer(middleware::from_fn(track_metrics))
        // Add state
        .with_state(state)
        // Add middleware
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        );

    if cors_enabled {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

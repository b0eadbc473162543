use anyhow::Context;
use crop_recommender::{
    api::{build_router, AppState},
    config::Config,
    metrics,
    ml::PredictionService,
    telemetry,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize tracing
    telemetry::init_tracing(&config.observability)?;

    tracing::info!(
        service = %config.observability.service_name,
        "Starting Crop Recommender v{}",
        env!("CARGO_PKG_VERSION")
    );

    // Initialize Prometheus metrics
    if config.observability.prometheus_enabled {
        if let Err(e) = metrics::init_metrics() {
            tracing::warn!("Failed to initialize metrics: {}", e);
            tracing::warn!("Continuing without metrics");
        } else {
            tracing::info!("Prometheus metrics initialized");
        }
    } else {
        tracing::info!("Prometheus metrics disabled in configuration");
    }

    // Load trained artifacts
    let service = PredictionService::load(&config.artifacts.dir).with_context(|| {
        format!(
            "Failed to load artifacts from {} (run `crop-cli train` first)",
            config.artifacts.dir.display()
        )
    })?;
    let stats = service.stats();
    metrics::set_build_info(&stats.model_version);
    tracing::info!(
        model_version = %stats.model_version,
        trained_at = %stats.trained_at,
        crops = stats.n_crops,
        soil_types = stats.n_soil_types,
        "Model loaded"
    );

    let app_state = AppState::new(Arc::new(service));
    let app = build_router(app_state, config.server.cors_enabled);

    // Start HTTP server
    let http_addr = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&http_addr)
        .await
        .with_context(|| format!("Failed to bind {}", http_addr))?;

    tracing::info!("HTTP API server listening on http://{}", http_addr);
    tracing::info!("   Health check: http://{}/health", http_addr);
    tracing::info!("   Prediction:   http://{}/predict", http_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

//! Prometheus metrics for the crop recommendation service.
//!
//! Covers HTTP traffic, prediction outcomes and offline training runs.
//! All metrics live in one global registry exported by `GET /metrics`.
//!
//! # Example
//! ```no_run
//! use crop_recommender::metrics::PREDICTIONS_TOTAL;
//!
//! PREDICTIONS_TOTAL.with_label_values(&["success"]).inc();
//! ```

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, GaugeVec, Histogram, HistogramOpts, HistogramVec, Opts, Registry,
};
use std::time::Instant;

const NAMESPACE: &str = "crop_recommender";

lazy_static! {
    /// Global Prometheus registry for all metrics
    pub static ref PROMETHEUS_REGISTRY: Registry = Registry::new();

    // ============================================================================
    // HTTP Metrics
    // ============================================================================

    /// Total number of HTTP requests received
    ///
    /// Labels: method, path, status_code
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("http_requests_total", "Total number of HTTP requests")
            .namespace(NAMESPACE),
        &["method", "path", "status_code"]
    ).expect("Failed to create HTTP_REQUESTS_TOTAL metric");

    /// HTTP request duration in seconds
    ///
    /// Labels: method, path
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "http_request_duration_seconds",
            "HTTP request duration in seconds"
        )
        .namespace(NAMESPACE)
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
        &["method", "path"]
    ).expect("Failed to create HTTP_REQUEST_DURATION_SECONDS metric");

    // ============================================================================
    // Prediction Metrics
    // ============================================================================

    /// Total number of predictions attempted
    ///
    /// Labels: outcome (success, missing_field, unseen_category, error)
    pub static ref PREDICTIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("predictions_total", "Total number of crop predictions")
            .namespace(NAMESPACE),
        &["outcome"]
    ).expect("Failed to create PREDICTIONS_TOTAL metric");

    /// Time spent in the ensemble for one prediction
    pub static ref PREDICTION_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "prediction_duration_seconds",
            "Prediction duration in seconds"
        )
        .namespace(NAMESPACE)
        .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5])
    ).expect("Failed to create PREDICTION_DURATION_SECONDS metric");

    /// Crops recommended, by name
    ///
    /// Labels: crop
    pub static ref CROPS_RECOMMENDED_TOTAL: CounterVec = CounterVec::new(
        Opts::new("crops_recommended_total", "Total number of recommendations per crop")
            .namespace(NAMESPACE),
        &["crop"]
    ).expect("Failed to create CROPS_RECOMMENDED_TOTAL metric");

    // ============================================================================
    // Training Metrics
    // ============================================================================

    /// Total number of training runs
    ///
    /// Labels: outcome (success, failure)
    pub static ref TRAINING_RUNS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("training_runs_total", "Total number of training runs")
            .namespace(NAMESPACE),
        &["outcome"]
    ).expect("Failed to create TRAINING_RUNS_TOTAL metric");

    // ============================================================================
    // System Metrics
    // ============================================================================

    /// Build information
    ///
    /// Labels: version, model_version
    pub static ref BUILD_INFO: GaugeVec = GaugeVec::new(
        Opts::new("build_info", "Build and model information")
            .namespace(NAMESPACE),
        &["version", "model_version"]
    ).expect("Failed to create BUILD_INFO metric");

    /// Errors returned to clients
    pub static ref ERRORS_TOTAL: Counter = Counter::with_opts(
        Opts::new("errors_total", "Total number of error responses")
            .namespace(NAMESPACE)
    ).expect("Failed to create ERRORS_TOTAL metric");
}

fn register<C>(collector: &C) -> Result<(), prometheus::Error>
where
    C: prometheus::core::Collector + Clone + 'static,
{
    match PROMETHEUS_REGISTRY.register(Box::new(collector.clone())) {
        Ok(()) | Err(prometheus::Error::AlreadyReg) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Register every metric with the global registry.
///
/// Calling it again is a no-op, so tests and the server can both call it.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    register(&*HTTP_REQUESTS_TOTAL)?;
    register(&*HTTP_REQUEST_DURATION_SECONDS)?;

    register(&*PREDICTIONS_TOTAL)?;
    register(&*PREDICTION_DURATION_SECONDS)?;
    register(&*CROPS_RECOMMENDED_TOTAL)?;

    register(&*TRAINING_RUNS_TOTAL)?;

    register(&*BUILD_INFO)?;
    register(&*ERRORS_TOTAL)?;

    tracing::debug!("Prometheus metrics initialized");
    Ok(())
}

/// Record which model version is being served
pub fn set_build_info(model_version: &str) {
    BUILD_INFO
        .with_label_values(&[env!("CARGO_PKG_VERSION"), model_version])
        .set(1.0);
}

/// Generate Prometheus text format metrics
pub fn gather_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = PROMETHEUS_REGISTRY.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::from("# Error encoding metrics\n");
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Failed to convert metrics to string: {}", e);
        String::from("# Error converting metrics\n")
    })
}

/// Axum middleware recording request count and latency per matched route
///
/// ```no_run
/// use axum::{Router, middleware};
/// use crop_recommender::metrics::track_metrics;
///
/// let app: Router = Router::new().route_layer(middleware::from_fn(track_metrics));
/// ```
pub async fn track_metrics(req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let start = Instant::now();
    let response = next.run(req).await;
    let duration = start.elapsed().as_secs_f64();
    let status = response.status();

    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &path, status.as_str()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[&method, &path])
        .observe(duration);

    if status.is_client_error() || status.is_server_error() {
        ERRORS_TOTAL.inc();
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_metrics_is_idempotent() {
        assert!(init_metrics().is_ok());
        assert!(init_metrics().is_ok());
    }

    #[test]
    fn test_prediction_counter() {
        PREDICTIONS_TOTAL.with_label_values(&["success"]).inc();

        let value = PREDICTIONS_TOTAL.with_label_values(&["success"]).get();
        assert!(value >= 1.0);
    }

    #[test]
    fn test_gather_metrics() {
        init_metrics().unwrap();
        TRAINING_RUNS_TOTAL.with_label_values(&["success"]).inc();

        let metrics = gather_metrics();
        assert!(metrics.contains("crop_recommender_training_runs_total"));
    }

    #[test]
    fn test_build_info() {
        set_build_info("test-version");
        let value = BUILD_INFO
            .with_label_values(&[env!("CARGO_PKG_VERSION"), "test-version"])
            .get();
        assert_eq!(value, 1.0);
    }
}

//! Crop recommendation from soil samples.
//!
//! An offline pipeline trains a hard-voting ensemble (MLP, Gaussian naive
//! Bayes, kNN, logistic regression) on a soil CSV and writes its artifacts;
//! an axum service loads them once and answers `POST /predict`.

pub mod api;
pub mod config;
pub mod dataset;
pub mod error;
pub mod metrics;
pub mod ml;
pub mod models;
pub mod telemetry;

pub use error::{AppError, Result};

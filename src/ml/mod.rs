//! Machine Learning module for crop recommendation
//!
//! This module provides:
//! - Label encoding of soil types and crops
//! - Standard scaling of the feature vector
//! - Four voters (MLP, Gaussian Naive Bayes, kNN, Logistic Regression)
//! - A hard-voting ensemble over those voters
//! - The offline training pipeline and artifact persistence
//! - The prediction service used by the HTTP API

pub mod artifacts;
pub mod classifier;
pub mod encoder;
pub mod ensemble;
pub mod mlp;
pub mod models;
pub mod scaler;
pub mod service;
pub mod trainer;

pub use artifacts::ArtifactBundle;
pub use classifier::{Classifier, KnnClassifier, LogisticRegressionClassifier, NaiveBayesClassifier};
pub use encoder::LabelEncoder;
pub use ensemble::{Voter, VotingClassifier};
pub use mlp::MlpClassifier;
pub use models::{
    ClassMetrics, MlpConfig, ModelMetadata, ModelMetrics, ModelType, TrainingConfig,
    TrainingDataset,
};
pub use scaler::StandardScaler;
pub use service::{CropPrediction, PredictionService, ServiceStats};
pub use trainer::{DatasetProvenance, Trainer};

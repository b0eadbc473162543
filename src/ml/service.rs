use crate::error::{AppError, Result};
use crate::ml::artifacts::ArtifactBundle;
use crate::ml::classifier::Classifier;
use crate::ml::encoder::LabelEncoder;
use crate::ml::ensemble::VotingClassifier;
use crate::ml::models::ModelMetadata;
use crate::ml::scaler::StandardScaler;
use crate::models::{self, SoilSample, N_FEATURES};
use ndarray::Array2;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Outcome of one prediction
#[derive(Debug, Clone, Serialize)]
pub struct CropPrediction {
    /// Winning crop name
    pub crop: String,

    /// Encoded class of the winning crop
    pub class_code: usize,

    /// Crop each voter picked, keyed by voter
    pub votes: BTreeMap<String, String>,
}

/// Read-only view of the loaded model
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    pub model_version: String,
    pub trained_at: chrono::DateTime<chrono::Utc>,
    pub n_crops: usize,
    pub n_soil_types: usize,
    pub voters: Vec<String>,
}

/// Inference over a fixed set of trained artifacts.
///
/// The request path is: presence check, soil type lookup, numeric vector,
/// scaling, hard vote, crop name lookup. Nothing here mutates after load.
pub struct PredictionService {
    model: VotingClassifier,
    scaler: StandardScaler,
    soil_encoder: LabelEncoder,
    crop_encoder: LabelEncoder,
    metadata: ModelMetadata,
}

impl PredictionService {
    pub fn new(bundle: ArtifactBundle) -> Self {
        Self {
            model: bundle.model,
            scaler: bundle.scaler,
            soil_encoder: bundle.soil_encoder,
            crop_encoder: bundle.crop_encoder,
            metadata: bundle.metadata,
        }
    }

    /// Load artifacts from a directory
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(ArtifactBundle::load(dir)?))
    }

    /// Predict from a raw JSON payload.
    ///
    /// Missing keys and unseen soil types keep their own errors; every other
    /// failure is reported as the catch-all prediction error.
    pub fn predict_payload(&self, payload: &Value) -> Result<CropPrediction> {
        let object = payload.as_object().ok_or_else(|| {
            AppError::Prediction("Request body must be a JSON object".to_string())
        })?;

        models::require_keys(object)?;
        let soil_type = models::soil_type_of(object);
        let soil_code = self.soil_encoder.transform(&soil_type)?;
        let numeric = models::numeric_features(object)?;

        let sample = SoilSample::from_parts(soil_type, numeric);
        self.predict_encoded(&sample, soil_code)
            .map_err(AppError::into_prediction_error)
    }

    /// Predict for an already parsed sample
    pub fn predict_sample(&self, sample: &SoilSample) -> Result<CropPrediction> {
        let soil_code = self.soil_encoder.transform(&sample.soil_type)?;
        self.predict_encoded(sample, soil_code)
            .map_err(AppError::into_prediction_error)
    }

    fn predict_encoded(&self, sample: &SoilSample, soil_code: usize) -> Result<CropPrediction> {
        if !self.model.is_trained() {
            return Err(AppError::Prediction("Voting Ensemble is not trained".to_string()));
        }

        let vector = sample.feature_vector(soil_code).to_vec();
        let features = Array2::from_shape_vec((1, N_FEATURES), vector)
            .map_err(|e| AppError::Internal(format!("Failed to create feature array: {}", e)))?;
        let scaled = self.scaler.transform(&features)?;

        // One vote per voter for the single row
        let mut ballot = Vec::with_capacity(self.model.voters().len());
        let mut votes = BTreeMap::new();
        for (voter, predictions) in self.model.voters().iter().zip(self.model.votes(&scaled)?) {
            if let Some(&code) = predictions.first() {
                let name = self.crop_encoder.inverse_transform(code)?;
                votes.insert(voter.model_type().key().to_string(), name.to_string());
                ballot.push(code);
            }
        }

        let class_code = VotingClassifier::tally(&ballot, self.model.n_classes())
            .ok_or_else(|| AppError::Prediction("ensemble returned no prediction".to_string()))?;
        let crop = self.crop_encoder.inverse_transform(class_code)?.to_string();

        debug!(
            soil_type = %sample.soil_type,
            crop = %crop,
            votes = ?votes,
            "Prediction made"
        );

        Ok(CropPrediction {
            crop,
            class_code,
            votes,
        })
    }

    /// Soil types the encoder accepts, in code order
    pub fn soil_types(&self) -> &[String] {
        self.soil_encoder.classes()
    }

    /// Crops the model can recommend, in code order
    pub fn crops(&self) -> &[String] {
        self.crop_encoder.classes()
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            model_version: self.metadata.version.to_string(),
            trained_at: self.metadata.trained_at,
            n_crops: self.crop_encoder.n_classes(),
            n_soil_types: self.soil_encoder.n_classes(),
            voters: self
                .model
                .voters()
                .iter()
                .map(|v| v.model_type().key().to_string())
                .collect(),
        }
    }
}

use crate::error::{AppError, Result};
use crate::ml::classifier::Classifier;
use crate::ml::encoder::LabelEncoder;
use crate::ml::ensemble::VotingClassifier;
use crate::ml::models::ModelMetadata;
use crate::ml::scaler::StandardScaler;
use crate::models::N_FEATURES;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const MODEL_FILE: &str = "crop_recommendation_model.bin";
pub const SCALER_FILE: &str = "scaler.json";
pub const CROP_ENCODER_FILE: &str = "label_encoder_crop.json";
pub const SOIL_ENCODER_FILE: &str = "label_encoder_soil.json";
pub const METADATA_FILE: &str = "metadata.json";

/// Everything the prediction path needs, as produced by one training run
pub struct ArtifactBundle {
    pub model: VotingClassifier,
    pub scaler: StandardScaler,
    pub soil_encoder: LabelEncoder,
    pub crop_encoder: LabelEncoder,
    pub metadata: ModelMetadata,
}

impl ArtifactBundle {
    /// Write all artifacts into `dir`, creating it if needed
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let model_bytes = bincode::serialize(&self.model)?;
        fs::write(dir.join(MODEL_FILE), model_bytes)?;
        write_json(&dir.join(SCALER_FILE), &self.scaler)?;
        write_json(&dir.join(CROP_ENCODER_FILE), &self.crop_encoder)?;
        write_json(&dir.join(SOIL_ENCODER_FILE), &self.soil_encoder)?;
        write_json(&dir.join(METADATA_FILE), &self.metadata)?;

        info!(
            dir = %dir.display(),
            version = %self.metadata.version,
            "Artifacts saved"
        );
        Ok(())
    }

    /// Read all artifacts from `dir` and check they belong together
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();

        let model_path = dir.join(MODEL_FILE);
        let model_bytes = fs::read(&model_path)
            .map_err(|e| AppError::Artifact(format!("{}: {}", model_path.display(), e)))?;
        let model: VotingClassifier = bincode::deserialize(&model_bytes)
            .map_err(|e| AppError::Artifact(format!("{}: {}", model_path.display(), e)))?;

        let scaler: StandardScaler = read_json(&dir.join(SCALER_FILE))?;
        let crop_encoder = read_json::<LabelEncoder>(&dir.join(CROP_ENCODER_FILE))?.rebuild_index();
        let soil_encoder = read_json::<LabelEncoder>(&dir.join(SOIL_ENCODER_FILE))?.rebuild_index();
        let metadata: ModelMetadata = read_json(&dir.join(METADATA_FILE))?;

        let bundle = Self {
            model,
            scaler,
            soil_encoder,
            crop_encoder,
            metadata,
        };
        bundle.check_consistency()?;

        info!(
            dir = %dir.display(),
            version = %bundle.metadata.version,
            trained_at = %bundle.metadata.trained_at,
            "Artifacts loaded"
        );
        Ok(bundle)
    }

    fn check_consistency(&self) -> Result<()> {
        if !self.model.is_trained() {
            return Err(AppError::Artifact("model is not trained".to_string()));
        }
        if self.scaler.n_features() != N_FEATURES || self.metadata.n_features != N_FEATURES {
            return Err(AppError::Artifact(format!(
                "expected {} features, scaler has {} and metadata records {}",
                N_FEATURES,
                self.scaler.n_features(),
                self.metadata.n_features
            )));
        }
        if self.crop_encoder.n_classes() != self.metadata.n_classes {
            return Err(AppError::Artifact(format!(
                "crop encoder knows {} classes but metadata records {}",
                self.crop_encoder.n_classes(),
                self.metadata.n_classes
            )));
        }
        Ok(())
    }

    /// Paths of every file a bundle consists of
    pub fn files(dir: impl AsRef<Path>) -> Vec<PathBuf> {
        let dir = dir.as_ref();
        [
            MODEL_FILE,
            SCALER_FILE,
            CROP_ENCODER_FILE,
            SOIL_ENCODER_FILE,
            METADATA_FILE,
        ]
        .iter()
        .map(|f| dir.join(f))
        .collect()
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes =
        fs::read(path).map_err(|e| AppError::Artifact(format!("{}: {}", path.display(), e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AppError::Artifact(format!("{}: {}", path.display(), e)))
}

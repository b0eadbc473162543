use crate::dataset::{self, CleanDataset, DatasetSource};
use crate::error::{AppError, Result};
use crate::metrics::TRAINING_RUNS_TOTAL;
use crate::ml::artifacts::ArtifactBundle;
use crate::ml::classifier::Classifier;
use crate::ml::encoder::LabelEncoder;
use crate::ml::ensemble::VotingClassifier;
use crate::ml::models::{ModelMetadata, ModelMetrics, ModelType, TrainingConfig, TrainingDataset};
use crate::ml::scaler::StandardScaler;
use crate::models::{CROP_LABEL_KEY, FEATURE_KEYS, SOIL_TYPE_KEY};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

/// Where a dataset came from, recorded in the metadata
#[derive(Debug, Clone)]
pub struct DatasetProvenance {
    pub source: String,
    pub sha256: String,
}

/// The three scaled splits of one training run
struct Splits {
    train: TrainingDataset,
    validation: TrainingDataset,
    test: TrainingDataset,
}

/// Offline pipeline: encode, split, scale, fit, evaluate
pub struct Trainer {
    config: TrainingConfig,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Where the dataset should be read from under this configuration
    pub fn source(&self) -> DatasetSource {
        match &self.config.dataset_path {
            Some(path) => DatasetSource::Path(path.clone()),
            None => DatasetSource::Url(self.config.dataset_url.clone()),
        }
    }

    /// Fetch, clean, fit and persist. Returns the saved bundle.
    pub async fn run(&self, artifacts_dir: impl AsRef<Path>) -> Result<ArtifactBundle> {
        let source = self.source();
        let outcome = async {
            let raw = dataset::fetch(&source).await?;
            let provenance = DatasetProvenance {
                source: source.to_string(),
                sha256: dataset::fingerprint(&raw),
            };
            let cleaned = dataset::parse_csv(&raw)?;

            let config = self.config.clone();
            let bundle = tokio::task::spawn_blocking(move || {
                Trainer { config }.fit(&cleaned, provenance)
            })
            .await
            .map_err(|e| AppError::Internal(format!("training task failed: {}", e)))??;

            bundle.save(artifacts_dir.as_ref())?;
            Ok::<_, AppError>(bundle)
        }
        .await;

        let label = if outcome.is_ok() { "success" } else { "failure" };
        TRAINING_RUNS_TOTAL.with_label_values(&[label]).inc();
        outcome
    }

    /// Fit encoders, scaler and ensemble on a cleaned dataset
    pub fn fit(&self, data: &CleanDataset, provenance: DatasetProvenance) -> Result<ArtifactBundle> {
        let started = Instant::now();

        let soil_encoder = LabelEncoder::fit(
            SOIL_TYPE_KEY,
            data.samples.iter().map(|s| s.sample.soil_type.as_str()),
        )?;
        let crop_encoder =
            LabelEncoder::fit(CROP_LABEL_KEY, data.samples.iter().map(|s| s.crop.as_str()))?;

        let mut rows = Vec::with_capacity(data.samples.len());
        let mut labels = Vec::with_capacity(data.samples.len());
        for labeled in &data.samples {
            let soil_code = soil_encoder.transform(&labeled.sample.soil_type)?;
            rows.push(labeled.sample.feature_vector(soil_code).to_vec());
            labels.push(crop_encoder.transform(&labeled.crop)?);
        }
        let encoded = TrainingDataset::from_rows(&rows, labels)?;

        info!(
            samples = encoded.n_samples,
            soil_types = soil_encoder.n_classes(),
            crops = crop_encoder.n_classes(),
            "Dataset encoded"
        );

        let (scaler, splits) = self.split_and_scale(&encoded)?;

        info!(
            train = splits.train.n_samples,
            validation = splits.validation.n_samples,
            test = splits.test.n_samples,
            "Dataset split"
        );

        let mut model = VotingClassifier::from_config(&self.config);
        model.train(&splits.train)?;

        let class_names = crop_encoder.classes().to_vec();
        let validation_metrics = evaluate(&model, &splits.validation, &class_names)?;
        let test_metrics = evaluate(&model, &splits.test, &class_names)?;

        for (name, metrics) in &test_metrics {
            info!(
                model = name.as_str(),
                validation_accuracy = validation_metrics
                    .get(name)
                    .map(|m| m.accuracy)
                    .unwrap_or_default(),
                test_accuracy = metrics.accuracy,
                test_f1 = metrics.f1_score,
                "Model evaluated"
            );
        }

        let metadata = ModelMetadata {
            name: "crop-recommendation".to_string(),
            version: Uuid::new_v4(),
            model_type: ModelType::Ensemble,
            trained_at: chrono::Utc::now(),
            dataset_source: provenance.source,
            dataset_sha256: provenance.sha256,
            n_training_samples: splits.train.n_samples,
            n_validation_samples: splits.validation.n_samples,
            n_test_samples: splits.test.n_samples,
            n_features: encoded.n_features,
            feature_names: FEATURE_KEYS.iter().map(|k| k.to_string()).collect(),
            n_classes: crop_encoder.n_classes(),
            validation_metrics,
            test_metrics,
            hyperparameters: self.config.hyperparameters(),
        };

        info!(
            version = %metadata.version,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Training completed"
        );

        Ok(ArtifactBundle {
            model,
            scaler,
            soil_encoder,
            crop_encoder,
            metadata,
        })
    }

    /// Train / hold-out split, hold-out halved into validation and test,
    /// scaler fitted on the training rows only
    fn split_and_scale(&self, encoded: &TrainingDataset) -> Result<(StandardScaler, Splits)> {
        let seed = self.config.seed;
        let (train, holdout) = encoded.train_test_split(self.config.test_fraction, seed)?;
        let (validation, test) = holdout.train_test_split(self.config.validation_fraction, seed)?;

        if train.n_classes() < encoded.n_classes() {
            warn!(
                expected = encoded.n_classes(),
                "Training split is missing some crop classes"
            );
        }

        let (scaler, train_scaled) = StandardScaler::fit_transform(&train.features)?;
        let validation_scaled = scaler.transform(&validation.features)?;
        let test_scaled = scaler.transform(&test.features)?;

        Ok((
            scaler,
            Splits {
                train: train.with_features(train_scaled)?,
                validation: validation.with_features(validation_scaled)?,
                test: test.with_features(test_scaled)?,
            },
        ))
    }
}

/// Score the ensemble and every voter on one split
pub fn evaluate(
    model: &VotingClassifier,
    split: &TrainingDataset,
    class_names: &[String],
) -> Result<BTreeMap<String, ModelMetrics>> {
    let mut results = BTreeMap::new();

    for voter in model.voters() {
        let predictions = voter.predict(&split.features)?;
        results.insert(
            voter.model_type().key().to_string(),
            ModelMetrics::evaluate(&split.labels, &predictions, class_names),
        );
    }

    let predictions = model.predict(&split.features)?;
    results.insert(
        ModelType::Ensemble.key().to_string(),
        ModelMetrics::evaluate(&split.labels, &predictions, class_names),
    );

    Ok(results)
}

use crate::error::{AppError, Result};
use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use strum::{Display, EnumIter};
use uuid::Uuid;
use validator::Validate;

/// Training pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct TrainingConfig {
    /// Where to download the dataset from when no local file is given
    #[validate(length(min = 1))]
    pub dataset_url: String,

    /// Local CSV file, takes precedence over `dataset_url`
    pub dataset_path: Option<PathBuf>,

    /// Fraction held out from training (validation + test)
    #[validate(range(exclusive_min = 0.0, exclusive_max = 1.0))]
    pub test_fraction: f64,

    /// Fraction of the hold-out that becomes the test split
    #[validate(range(exclusive_min = 0.0, exclusive_max = 1.0))]
    pub validation_fraction: f64,

    /// Seed for shuffling and weight initialization
    pub seed: u64,

    /// Neighbours consulted by the kNN voter
    #[validate(range(min = 1))]
    pub knn_neighbors: usize,

    /// L2 penalty of the logistic regression voter
    #[validate(range(min = 0.0))]
    pub logistic_alpha: f64,

    /// Multi-layer perceptron hyperparameters
    #[validate(nested)]
    pub mlp: MlpConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            dataset_url: "https://raw.githubusercontent.com/AbhishekSenguptaGit/Crop-Recommendation/refs/heads/master/cropdata.csv".to_string(),
            dataset_path: None,
            test_fraction: 0.2,
            validation_fraction: 0.5,
            seed: 42,
            knn_neighbors: 5,
            logistic_alpha: 1.0,
            mlp: MlpConfig::default(),
        }
    }
}

impl TrainingConfig {
    /// Hyperparameters as flat strings, recorded in the model metadata
    pub fn hyperparameters(&self) -> BTreeMap<String, String> {
        [
            ("seed", self.seed.to_string()),
            ("test_fraction", self.test_fraction.to_string()),
            ("validation_fraction", self.validation_fraction.to_string()),
            ("knn.n_neighbors", self.knn_neighbors.to_string()),
            ("log_reg.alpha", self.logistic_alpha.to_string()),
            ("mlp.hidden_units", self.mlp.hidden_units.to_string()),
            ("mlp.max_epochs", self.mlp.max_epochs.to_string()),
            ("mlp.learning_rate", self.mlp.learning_rate.to_string()),
            ("mlp.alpha", self.mlp.alpha.to_string()),
            ("mlp.batch_size", self.mlp.batch_size.to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }
}

/// Multi-layer perceptron configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct MlpConfig {
    /// Width of the single hidden layer
    #[validate(range(min = 1))]
    pub hidden_units: usize,

    /// Upper bound on passes over the training data
    #[validate(range(min = 1))]
    pub max_epochs: usize,

    /// Adam step size
    #[validate(range(exclusive_min = 0.0))]
    pub learning_rate: f64,

    /// L2 penalty
    #[validate(range(min = 0.0))]
    pub alpha: f64,

    /// Mini-batch size, clipped to the number of samples
    #[validate(range(min = 1))]
    pub batch_size: usize,

    /// Minimum loss improvement that resets the patience counter
    pub tolerance: f64,

    /// Epochs without improvement before stopping
    #[validate(range(min = 1))]
    pub n_iter_no_change: usize,
}

impl Default for MlpConfig {
    fn default() -> Self {
        Self {
            hidden_units: 50,
            max_epochs: 1000,
            learning_rate: 0.001,
            alpha: 0.0001,
            batch_size: 200,
            tolerance: 0.0001,
            n_iter_no_change: 10,
        }
    }
}

/// Encoded training data: scaled or raw features plus class codes
#[derive(Debug, Clone)]
pub struct TrainingDataset {
    /// Feature matrix (n_samples × n_features)
    pub features: Array2<f64>,

    /// Class code per row
    pub labels: Vec<usize>,

    /// Number of samples
    pub n_samples: usize,

    /// Number of features
    pub n_features: usize,
}

impl TrainingDataset {
    /// Create a dataset from a feature matrix and matching labels
    pub fn new(features: Array2<f64>, labels: Vec<usize>) -> Result<Self> {
        if features.nrows() != labels.len() {
            return Err(AppError::Dataset(format!(
                "{} feature rows but {} labels",
                features.nrows(),
                labels.len()
            )));
        }

        Ok(Self {
            n_samples: features.nrows(),
            n_features: features.ncols(),
            features,
            labels,
        })
    }

    /// Create a dataset from row vectors
    pub fn from_rows(rows: &[Vec<f64>], labels: Vec<usize>) -> Result<Self> {
        let n_features = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut data = Vec::with_capacity(rows.len() * n_features);
        for row in rows {
            if row.len() != n_features {
                return Err(AppError::Dataset(format!(
                    "ragged rows: expected {} features, found {}",
                    n_features,
                    row.len()
                )));
            }
            data.extend_from_slice(row);
        }

        let features = Array2::from_shape_vec((rows.len(), n_features), data)
            .map_err(|e| AppError::Dataset(format!("Failed to create feature array: {}", e)))?;
        Self::new(features, labels)
    }

    /// Rows at the given indices, in that order
    pub fn select(&self, indices: &[usize]) -> TrainingDataset {
        let features = self.features.select(Axis(0), indices);
        let labels = indices.iter().map(|&i| self.labels[i]).collect();
        TrainingDataset {
            n_samples: indices.len(),
            n_features: self.n_features,
            features,
            labels,
        }
    }

    /// Same labels, different feature matrix (e.g. after scaling)
    pub fn with_features(&self, features: Array2<f64>) -> Result<TrainingDataset> {
        Self::new(features, self.labels.clone())
    }

    /// Shuffle with a seeded RNG, then hold out `ceil(n * test_size)` rows.
    /// Returns (train, test).
    pub fn train_test_split(
        &self,
        test_size: f64,
        seed: u64,
    ) -> Result<(TrainingDataset, TrainingDataset)> {
        if !(test_size > 0.0 && test_size < 1.0) {
            return Err(AppError::Validation(format!(
                "test_size must be in (0, 1), got {}",
                test_size
            )));
        }

        let n_test = (self.n_samples as f64 * test_size).ceil() as usize;
        if n_test == 0 || n_test >= self.n_samples {
            return Err(AppError::Dataset(format!(
                "cannot split {} samples with test_size {}",
                self.n_samples, test_size
            )));
        }

        let mut indices: Vec<usize> = (0..self.n_samples).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        indices.shuffle(&mut rng);

        let (test_idx, train_idx) = indices.split_at(n_test);
        Ok((self.select(train_idx), self.select(test_idx)))
    }

    /// Number of distinct classes, assuming dense codes
    pub fn n_classes(&self) -> usize {
        self.labels.iter().max().map(|m| m + 1).unwrap_or(0)
    }
}

/// Model evaluation metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetrics {
    /// Accuracy
    pub accuracy: f64,

    /// Macro-averaged precision
    pub precision: f64,

    /// Macro-averaged recall
    pub recall: f64,

    /// Macro-averaged F1 score
    pub f1_score: f64,

    /// Confusion matrix, rows are true classes
    pub confusion_matrix: Option<Array2<usize>>,

    /// Per-class metrics keyed by class name
    pub per_class_metrics: BTreeMap<String, ClassMetrics>,
}

/// Per-class evaluation metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

impl ModelMetrics {
    pub fn new() -> Self {
        Self {
            accuracy: 0.0,
            precision: 0.0,
            recall: 0.0,
            f1_score: 0.0,
            confusion_matrix: None,
            per_class_metrics: BTreeMap::new(),
        }
    }

    /// Score predictions against ground truth. `class_names[i]` names code `i`.
    pub fn evaluate(y_true: &[usize], y_pred: &[usize], class_names: &[String]) -> Self {
        let n_samples = y_true.len();
        let n_classes = class_names.len();
        if n_samples == 0 || n_classes == 0 {
            return ModelMetrics::new();
        }

        let mut confusion = Array2::<usize>::zeros((n_classes, n_classes));
        for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
            if t < n_classes && p < n_classes {
                confusion[[t, p]] += 1;
            }
        }

        let correct = y_true
            .iter()
            .zip(y_pred.iter())
            .filter(|(t, p)| t == p)
            .count();
        let accuracy = correct as f64 / n_samples as f64;

        let mut per_class = BTreeMap::new();
        for (class_idx, name) in class_names.iter().enumerate() {
            let tp = confusion[[class_idx, class_idx]];
            let predicted = confusion.column(class_idx).sum();
            let support = confusion.row(class_idx).sum();

            let precision = if predicted > 0 {
                tp as f64 / predicted as f64
            } else {
                0.0
            };

            let recall = if support > 0 {
                tp as f64 / support as f64
            } else {
                0.0
            };

            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };

            per_class.insert(
                name.clone(),
                ClassMetrics {
                    precision,
                    recall,
                    f1_score: f1,
                    support,
                },
            );
        }

        let n = n_classes as f64;
        ModelMetrics {
            accuracy,
            precision: per_class.values().map(|m| m.precision).sum::<f64>() / n,
            recall: per_class.values().map(|m| m.recall).sum::<f64>() / n,
            f1_score: per_class.values().map(|m| m.f1_score).sum::<f64>() / n,
            confusion_matrix: Some(confusion),
            per_class_metrics: per_class,
        }
    }
}

impl Default for ModelMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Description of a trained bundle, written next to the artifacts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Model name
    pub name: String,

    /// Unique version of this training run
    pub version: Uuid,

    /// Model type
    pub model_type: ModelType,

    /// Training timestamp
    pub trained_at: chrono::DateTime<chrono::Utc>,

    /// Where the dataset came from (path or URL)
    pub dataset_source: String,

    /// SHA-256 of the raw dataset bytes
    pub dataset_sha256: String,

    /// Number of training samples
    pub n_training_samples: usize,

    /// Number of validation samples
    pub n_validation_samples: usize,

    /// Number of test samples
    pub n_test_samples: usize,

    /// Number of features
    pub n_features: usize,

    /// Feature names in model input order
    pub feature_names: Vec<String>,

    /// Number of crop classes
    pub n_classes: usize,

    /// Validation metrics keyed by voter (`ensemble` for the vote)
    pub validation_metrics: BTreeMap<String, ModelMetrics>,

    /// Test metrics keyed by voter (`ensemble` for the vote)
    pub test_metrics: BTreeMap<String, ModelMetrics>,

    /// Hyperparameters
    pub hyperparameters: BTreeMap<String, String>,
}

/// Model type enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumIter)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    /// Multi-layer perceptron
    #[strum(serialize = "Multi-layer Perceptron")]
    MultiLayerPerceptron,

    /// Gaussian naive Bayes
    #[strum(serialize = "Gaussian Naive Bayes")]
    NaiveBayes,

    /// K-Nearest Neighbors
    #[strum(serialize = "K-Nearest Neighbors")]
    KNN,

    /// Logistic regression
    #[strum(serialize = "Logistic Regression")]
    LogisticRegression,

    /// Hard-voting ensemble of the above
    #[strum(serialize = "Voting Ensemble")]
    Ensemble,
}

impl ModelType {
    /// Short estimator key used in logs and metadata
    pub fn key(&self) -> &'static str {
        match self {
            ModelType::MultiLayerPerceptron => "mlp",
            ModelType::NaiveBayes => "gnb",
            ModelType::KNN => "knn",
            ModelType::LogisticRegression => "log_reg",
            ModelType::Ensemble => "ensemble",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("crop_{}", i)).collect()
    }

    #[test]
    fn test_training_dataset_from_rows() {
        let rows = vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]];
        let dataset = TrainingDataset::from_rows(&rows, vec![0, 1, 0]).unwrap();

        assert_eq!(dataset.n_samples, 3);
        assert_eq!(dataset.n_features, 2);
        assert_eq!(dataset.features.shape(), &[3, 2]);
        assert_eq!(dataset.n_classes(), 2);
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let rows = vec![vec![1.0, 2.0], vec![3.0]];
        assert!(TrainingDataset::from_rows(&rows, vec![0, 1]).is_err());
    }

    #[test]
    fn test_train_test_split() {
        let rows: Vec<Vec<f64>> = (0..100).map(|i| vec![i as f64, (i * 2) as f64]).collect();
        let labels = (0..100).map(|i| i % 2).collect();
        let dataset = TrainingDataset::from_rows(&rows, labels).unwrap();

        let (train, holdout) = dataset.train_test_split(0.2, 42).unwrap();
        assert_eq!(train.n_samples, 80);
        assert_eq!(holdout.n_samples, 20);

        let (valid, test) = holdout.train_test_split(0.5, 42).unwrap();
        assert_eq!(valid.n_samples, 10);
        assert_eq!(test.n_samples, 10);
    }

    #[test]
    fn test_split_is_deterministic_and_disjoint() {
        let rows: Vec<Vec<f64>> = (0..50).map(|i| vec![i as f64]).collect();
        let dataset = TrainingDataset::from_rows(&rows, vec![0; 50]).unwrap();

        let (a_train, a_test) = dataset.train_test_split(0.2, 7).unwrap();
        let (b_train, b_test) = dataset.train_test_split(0.2, 7).unwrap();
        assert_eq!(a_train.features, b_train.features);
        assert_eq!(a_test.features, b_test.features);

        let mut seen: Vec<f64> = a_train
            .features
            .iter()
            .chain(a_test.features.iter())
            .copied()
            .collect();
        seen.sort_by(|a, b| a.partial_cmp(b).unwrap());
        seen.dedup();
        assert_eq!(seen.len(), 50);
    }

    #[test]
    fn test_hold_out_rounds_up() {
        let rows: Vec<Vec<f64>> = (0..11).map(|i| vec![i as f64]).collect();
        let dataset = TrainingDataset::from_rows(&rows, vec![0; 11]).unwrap();
        let (train, test) = dataset.train_test_split(0.2, 1).unwrap();
        assert_eq!(test.n_samples, 3);
        assert_eq!(train.n_samples, 8);
    }

    #[test]
    fn test_evaluate_metrics() {
        let y_true = vec![0, 0, 1, 1, 2, 2];
        let y_pred = vec![0, 1, 1, 1, 2, 0];
        let metrics = ModelMetrics::evaluate(&y_true, &y_pred, &names(3));

        assert!((metrics.accuracy - 4.0 / 6.0).abs() < 1e-12);
        let class_1 = &metrics.per_class_metrics["crop_1"];
        assert!((class_1.precision - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(class_1.recall, 1.0);
        assert_eq!(class_1.support, 2);

        let confusion = metrics.confusion_matrix.unwrap();
        assert_eq!(confusion[[2, 0]], 1);
        assert_eq!(confusion.sum(), 6);
    }

    #[test]
    fn test_training_config_validation() {
        let config = TrainingConfig::default();
        assert!(config.validate().is_ok());

        let bad = TrainingConfig {
            test_fraction: 1.5,
            ..TrainingConfig::default()
        };
        assert!(bad.validate().is_err());

        let bad_mlp = TrainingConfig {
            mlp: MlpConfig {
                hidden_units: 0,
                ..MlpConfig::default()
            },
            ..TrainingConfig::default()
        };
        assert!(bad_mlp.validate().is_err());
    }

    #[test]
    fn test_model_type_display_and_keys() {
        assert_eq!(ModelType::LogisticRegression.to_string(), "Logistic Regression");
        assert_eq!(ModelType::KNN.to_string(), "K-Nearest Neighbors");

        let keys: Vec<&str> = ModelType::iter().map(|t| t.key()).collect();
        assert_eq!(keys, vec!["mlp", "gnb", "knn", "log_reg", "ensemble"]);
    }
}

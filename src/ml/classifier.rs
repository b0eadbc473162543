use crate::error::{AppError, Result};
use crate::ml::models::{ModelType, TrainingDataset};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::linear::logistic_regression::{LogisticRegression, LogisticRegressionParameters};
use smartcore::metrics::distance::euclidian::Euclidian;
use smartcore::neighbors::knn_classifier::{KNNClassifier, KNNClassifierParameters};
use std::f64::consts::PI;

/// Trait for classifiers
pub trait Classifier: Send + Sync {
    /// Train the classifier
    fn train(&mut self, dataset: &TrainingDataset) -> Result<()>;

    /// Predict class codes
    fn predict(&self, features: &Array2<f64>) -> Result<Vec<usize>>;

    /// Get model type
    fn model_type(&self) -> ModelType;

    /// Check if model is trained
    fn is_trained(&self) -> bool;
}

pub(crate) fn ndarray_to_densematrix(arr: &Array2<f64>) -> DenseMatrix<f64> {
    let shape = arr.shape();
    let data: Vec<f64> = arr.iter().copied().collect();
    DenseMatrix::new(shape[0], shape[1], data, false)
}

fn labels_to_i32(labels: &[usize]) -> Vec<i32> {
    labels.iter().map(|&x| x as i32).collect()
}

fn i32_to_labels(predictions: &[i32]) -> Result<Vec<usize>> {
    predictions
        .iter()
        .map(|&p| {
            usize::try_from(p)
                .map_err(|_| AppError::Prediction(format!("negative class code {}", p)))
        })
        .collect()
}

/// Index of the largest value; the first one wins ties and NaN never wins
pub(crate) fn argmax(values: ArrayView1<f64>) -> usize {
    let mut best = 0;
    let mut best_value = f64::NEG_INFINITY;
    for (i, &v) in values.iter().enumerate() {
        if v > best_value {
            best = i;
            best_value = v;
        }
    }
    best
}

fn check_trained(trained: bool, model_type: ModelType) -> Result<()> {
    if trained {
        Ok(())
    } else {
        Err(AppError::Prediction(format!("{} is not trained", model_type)))
    }
}

fn check_dataset(dataset: &TrainingDataset, model_type: ModelType) -> Result<()> {
    if dataset.n_samples == 0 {
        return Err(AppError::Training(format!(
            "cannot train {} on an empty dataset",
            model_type
        )));
    }
    Ok(())
}

/// Logistic Regression Classifier
#[derive(Serialize, Deserialize)]
pub struct LogisticRegressionClassifier {
    /// Trained model
    model: Option<LogisticRegression<f64, i32, DenseMatrix<f64>, Vec<i32>>>,

    /// L2 penalty
    alpha: f64,
}

impl LogisticRegressionClassifier {
    pub fn new(alpha: f64) -> Self {
        Self { model: None, alpha }
    }
}

impl Classifier for LogisticRegressionClassifier {
    fn train(&mut self, dataset: &TrainingDataset) -> Result<()> {
        check_dataset(dataset, self.model_type())?;

        let x = ndarray_to_densematrix(&dataset.features);
        let y = labels_to_i32(&dataset.labels);

        let params = LogisticRegressionParameters::default().with_alpha(self.alpha);
        let model = LogisticRegression::fit(&x, &y, params).map_err(|e| {
            AppError::Training(format!("Failed to train logistic regression: {}", e))
        })?;

        self.model = Some(model);
        Ok(())
    }

    fn predict(&self, features: &Array2<f64>) -> Result<Vec<usize>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| AppError::Prediction("Logistic Regression is not trained".to_string()))?;

        let x = ndarray_to_densematrix(features);
        let predictions = model
            .predict(&x)
            .map_err(|e| AppError::Prediction(format!("Prediction failed: {}", e)))?;

        i32_to_labels(&predictions)
    }

    fn model_type(&self) -> ModelType {
        ModelType::LogisticRegression
    }

    fn is_trained(&self) -> bool {
        self.model.is_some()
    }
}

/// K-Nearest Neighbors Classifier (Euclidean distance, uniform weights)
#[derive(Serialize, Deserialize)]
pub struct KnnClassifier {
    /// Trained model
    model: Option<KNNClassifier<f64, i32, DenseMatrix<f64>, Vec<i32>, Euclidian<f64>>>,

    /// Neighbours consulted per prediction
    k: usize,
}

impl KnnClassifier {
    pub fn new(k: usize) -> Self {
        Self { model: None, k }
    }
}

impl Classifier for KnnClassifier {
    fn train(&mut self, dataset: &TrainingDataset) -> Result<()> {
        check_dataset(dataset, self.model_type())?;
        if dataset.n_samples < self.k {
            return Err(AppError::Training(format!(
                "kNN needs at least k={} samples, got {}",
                self.k, dataset.n_samples
            )));
        }

        let x = ndarray_to_densematrix(&dataset.features);
        let y = labels_to_i32(&dataset.labels);

        let params = KNNClassifierParameters::default().with_k(self.k);
        let model = KNNClassifier::fit(&x, &y, params)
            .map_err(|e| AppError::Training(format!("Failed to train kNN: {}", e)))?;

        self.model = Some(model);
        Ok(())
    }

    fn predict(&self, features: &Array2<f64>) -> Result<Vec<usize>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| AppError::Prediction("K-Nearest Neighbors is not trained".to_string()))?;

        let x = ndarray_to_densematrix(features);
        let predictions = model
            .predict(&x)
            .map_err(|e| AppError::Prediction(format!("Prediction failed: {}", e)))?;

        i32_to_labels(&predictions)
    }

    fn model_type(&self) -> ModelType {
        ModelType::KNN
    }

    fn is_trained(&self) -> bool {
        self.model.is_some()
    }
}

/// Gaussian Naive Bayes Classifier
///
/// Per-class variances get `var_smoothing * max(feature variance)` added so
/// a feature that is constant within one class does not zero the likelihood.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NaiveBayesClassifier {
    /// Per-class feature means (n_classes × n_features)
    theta: Array2<f64>,

    /// Per-class smoothed feature variances (n_classes × n_features)
    var: Array2<f64>,

    /// Training rows per class; classes with zero rows never win
    class_count: Vec<usize>,

    /// Relative smoothing added to every variance
    var_smoothing: f64,

    /// Is trained
    trained: bool,
}

impl NaiveBayesClassifier {
    /// Smoothing used when none is configured
    pub const DEFAULT_VAR_SMOOTHING: f64 = 1e-9;

    pub fn new() -> Self {
        Self::with_var_smoothing(Self::DEFAULT_VAR_SMOOTHING)
    }

    pub fn with_var_smoothing(var_smoothing: f64) -> Self {
        Self {
            theta: Array2::zeros((0, 0)),
            var: Array2::zeros((0, 0)),
            class_count: Vec::new(),
            var_smoothing,
            trained: false,
        }
    }

    fn joint_log_likelihood(&self, row: ArrayView1<f64>) -> Array1<f64> {
        let n_samples: usize = self.class_count.iter().sum();
        let mut jll = Array1::from_elem(self.class_count.len(), f64::NEG_INFINITY);

        for (class, &count) in self.class_count.iter().enumerate() {
            if count == 0 {
                continue;
            }
            let prior = (count as f64 / n_samples as f64).ln();
            let mut log_likelihood = 0.0;
            for ((&x, &mean), &var) in row
                .iter()
                .zip(self.theta.row(class).iter())
                .zip(self.var.row(class).iter())
            {
                log_likelihood -= 0.5 * (2.0 * PI * var).ln();
                log_likelihood -= 0.5 * (x - mean).powi(2) / var;
            }
            jll[class] = prior + log_likelihood;
        }

        jll
    }
}

impl Default for NaiveBayesClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier for NaiveBayesClassifier {
    fn train(&mut self, dataset: &TrainingDataset) -> Result<()> {
        check_dataset(dataset, self.model_type())?;

        let n_classes = dataset.n_classes();
        let n_features = dataset.n_features;

        let overall_var = dataset.features.var_axis(Axis(0), 0.0);
        let max_var = overall_var.iter().cloned().fold(0.0, f64::max);
        let epsilon = if max_var > 0.0 {
            self.var_smoothing * max_var
        } else {
            self.var_smoothing
        };

        let mut theta = Array2::zeros((n_classes, n_features));
        let mut var = Array2::from_elem((n_classes, n_features), epsilon);
        let mut class_count = vec![0usize; n_classes];

        for class in 0..n_classes {
            let rows: Vec<usize> = dataset
                .labels
                .iter()
                .enumerate()
                .filter(|(_, &label)| label == class)
                .map(|(i, _)| i)
                .collect();
            if rows.is_empty() {
                continue;
            }

            let members = dataset.features.select(Axis(0), &rows);
            if let Some(mean) = members.mean_axis(Axis(0)) {
                theta.row_mut(class).assign(&mean);
            }
            let class_var = members.var_axis(Axis(0), 0.0) + epsilon;
            var.row_mut(class).assign(&class_var);
            class_count[class] = rows.len();
        }

        self.theta = theta;
        self.var = var;
        self.class_count = class_count;
        self.trained = true;

        Ok(())
    }

    fn predict(&self, features: &Array2<f64>) -> Result<Vec<usize>> {
        check_trained(self.trained, self.model_type())?;
        if features.ncols() != self.theta.ncols() {
            return Err(AppError::Prediction(format!(
                "Naive Bayes expects {} features, got {}",
                self.theta.ncols(),
                features.ncols()
            )));
        }

        Ok(features
            .rows()
            .into_iter()
            .map(|row| argmax(self.joint_log_likelihood(row).view()))
            .collect())
    }

    fn model_type(&self) -> ModelType {
        ModelType::NaiveBayes
    }

    fn is_trained(&self) -> bool {
        self.trained
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ndarray::array;

    /// Three well separated blobs in two dimensions
    pub(crate) fn create_test_dataset(n_per_class: usize) -> TrainingDataset {
        let centers = [(-4.0, -4.0), (0.0, 4.0), (4.0, -4.0)];
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for (class, (cx, cy)) in centers.iter().enumerate() {
            for i in 0..n_per_class {
                let jitter = (i % 7) as f64 * 0.1 - 0.3;
                let jitter2 = (i % 5) as f64 * 0.1 - 0.2;
                rows.push(vec![cx + jitter, cy + jitter2]);
                labels.push(class);
            }
        }
        TrainingDataset::from_rows(&rows, labels).unwrap()
    }

    fn probe() -> Array2<f64> {
        array![[-4.0, -4.0], [0.0, 4.0], [4.0, -4.0]]
    }

    #[test]
    fn test_argmax_prefers_first_on_ties() {
        assert_eq!(argmax(array![1.0, 3.0, 3.0].view()), 1);
        assert_eq!(argmax(array![f64::NAN, 0.5].view()), 1);
    }

    #[test]
    fn test_logistic_regression_classifier() {
        let dataset = create_test_dataset(20);
        let mut classifier = LogisticRegressionClassifier::new(1.0);

        assert!(!classifier.is_trained());
        assert!(classifier.predict(&probe()).is_err());

        classifier.train(&dataset).unwrap();

        assert!(classifier.is_trained());
        assert_eq!(classifier.predict(&probe()).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_knn_classifier() {
        let dataset = create_test_dataset(20);
        let mut classifier = KnnClassifier::new(5);

        classifier.train(&dataset).unwrap();

        assert!(classifier.is_trained());
        assert_eq!(classifier.predict(&probe()).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_knn_needs_k_samples() {
        let dataset = create_test_dataset(1);
        let mut classifier = KnnClassifier::new(5);
        assert!(classifier.train(&dataset).is_err());
    }

    #[test]
    fn test_naive_bayes_classifier() {
        let dataset = create_test_dataset(20);
        let mut classifier = NaiveBayesClassifier::new();

        classifier.train(&dataset).unwrap();

        assert!(classifier.is_trained());
        assert_eq!(classifier.predict(&probe()).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_naive_bayes_handles_constant_feature_within_class() {
        let rows = vec![
            vec![1.0, 0.0],
            vec![1.0, 0.2],
            vec![1.0, 0.1],
            vec![5.0, 3.0],
            vec![5.0, 3.1],
            vec![5.0, 2.9],
        ];
        let dataset = TrainingDataset::from_rows(&rows, vec![0, 0, 0, 1, 1, 1]).unwrap();
        let mut classifier = NaiveBayesClassifier::new();
        classifier.train(&dataset).unwrap();

        let predictions = classifier
            .predict(&array![[1.0, 0.1], [5.0, 3.0]])
            .unwrap();
        assert_eq!(predictions, vec![0, 1]);
    }

    #[test]
    fn test_naive_bayes_skips_absent_classes() {
        let rows = vec![vec![0.0], vec![0.1], vec![5.0], vec![5.1]];
        // Class 1 never occurs
        let dataset = TrainingDataset::from_rows(&rows, vec![0, 0, 2, 2]).unwrap();
        let mut classifier = NaiveBayesClassifier::new();
        classifier.train(&dataset).unwrap();

        let predictions = classifier.predict(&array![[2.4], [2.6]]).unwrap();
        assert!(predictions.iter().all(|&p| p != 1));
    }
}

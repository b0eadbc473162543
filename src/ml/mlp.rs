//! Single-hidden-layer perceptron trained with Adam.
//!
//! ReLU hidden units, softmax output, cross-entropy loss with an L2 penalty.
//! Training stops after `max_epochs` or once the epoch loss has failed to
//! improve by `tolerance` for more than `n_iter_no_change` epochs.

use crate::error::{AppError, Result};
use crate::ml::classifier::{argmax, Classifier};
use crate::ml::models::{MlpConfig, ModelType, TrainingDataset};
use ndarray::{Array, Array1, Array2, Axis, Dimension, Zip};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const ADAM_EPSILON: f64 = 1e-8;
const MIN_PROBABILITY: f64 = 1e-15;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MlpWeights {
    /// Input to hidden (n_features × hidden_units)
    w1: Array2<f64>,
    b1: Array1<f64>,
    /// Hidden to output (hidden_units × n_classes)
    w2: Array2<f64>,
    b2: Array1<f64>,
}

struct Gradients {
    w1: Array2<f64>,
    b1: Array1<f64>,
    w2: Array2<f64>,
    b2: Array1<f64>,
}

/// First and second moment estimates for every parameter
struct AdamState {
    t: i32,
    m: Gradients,
    v: Gradients,
}

impl Gradients {
    fn zeros_like(w: &MlpWeights) -> Self {
        Self {
            w1: Array2::zeros(w.w1.raw_dim()),
            b1: Array1::zeros(w.b1.raw_dim()),
            w2: Array2::zeros(w.w2.raw_dim()),
            b2: Array1::zeros(w.b2.raw_dim()),
        }
    }
}

fn adam_update<D: Dimension>(
    param: &mut Array<f64, D>,
    grad: &Array<f64, D>,
    m: &mut Array<f64, D>,
    v: &mut Array<f64, D>,
    step: f64,
) {
    m.zip_mut_with(grad, |m, &g| *m = BETA1 * *m + (1.0 - BETA1) * g);
    v.zip_mut_with(grad, |v, &g| *v = BETA2 * *v + (1.0 - BETA2) * g * g);
    Zip::from(param)
        .and(&*m)
        .and(&*v)
        .for_each(|p, &m, &v| *p -= step * m / (v.sqrt() + ADAM_EPSILON));
}

/// Glorot-uniform initialization, as used for ReLU/softmax stacks
fn glorot(rng: &mut StdRng, fan_in: usize, fan_out: usize) -> (Array2<f64>, Array1<f64>) {
    let bound = (6.0 / (fan_in + fan_out) as f64).sqrt();
    let w = Array2::from_shape_fn((fan_in, fan_out), |_| rng.gen_range(-bound..bound));
    let b = Array1::from_shape_fn(fan_out, |_| rng.gen_range(-bound..bound));
    (w, b)
}

fn softmax_rows(mut z: Array2<f64>) -> Array2<f64> {
    for mut row in z.rows_mut() {
        let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
    z
}

/// Multi-layer perceptron classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlpClassifier {
    config: MlpConfig,

    /// Seed for weight initialization and batch shuffling
    seed: u64,

    weights: Option<MlpWeights>,

    n_classes: usize,

    /// Epochs actually run during the last training
    n_epochs: usize,

    /// Mean loss of the last epoch
    final_loss: f64,
}

impl MlpClassifier {
    pub fn new(config: MlpConfig, seed: u64) -> Self {
        Self {
            config,
            seed,
            weights: None,
            n_classes: 0,
            n_epochs: 0,
            final_loss: f64::NAN,
        }
    }

    pub fn n_epochs(&self) -> usize {
        self.n_epochs
    }

    pub fn final_loss(&self) -> f64 {
        self.final_loss
    }

    /// Returns (hidden pre-activation, hidden activation, output probabilities)
    fn forward(w: &MlpWeights, x: &Array2<f64>) -> (Array2<f64>, Array2<f64>, Array2<f64>) {
        let z1 = x.dot(&w.w1) + &w.b1;
        let a1 = z1.mapv(|v| v.max(0.0));
        let probs = softmax_rows(a1.dot(&w.w2) + &w.b2);
        (z1, a1, probs)
    }

    /// Loss and gradients for one mini-batch
    fn backward(&self, w: &MlpWeights, x: &Array2<f64>, y: &Array2<f64>) -> (f64, Gradients) {
        let batch = x.nrows() as f64;
        let (z1, a1, probs) = Self::forward(w, x);

        let data_loss = -(y * &probs.mapv(|p| p.max(MIN_PROBABILITY).ln())).sum() / batch;
        let penalty = 0.5 * self.config.alpha
            * (w.w1.mapv(|v| v * v).sum() + w.w2.mapv(|v| v * v).sum())
            / batch;

        let d_out = (&probs - y) / batch;
        let g_w2 = a1.t().dot(&d_out) + &(&w.w2 * (self.config.alpha / batch));
        let g_b2 = d_out.sum_axis(Axis(0));

        let mut d_hidden = d_out.dot(&w.w2.t());
        Zip::from(&mut d_hidden).and(&z1).for_each(|d, &z| {
            if z <= 0.0 {
                *d = 0.0;
            }
        });
        let g_w1 = x.t().dot(&d_hidden) + &(&w.w1 * (self.config.alpha / batch));
        let g_b1 = d_hidden.sum_axis(Axis(0));

        (
            data_loss + penalty,
            Gradients {
                w1: g_w1,
                b1: g_b1,
                w2: g_w2,
                b2: g_b2,
            },
        )
    }

    fn apply(&self, w: &mut MlpWeights, grads: &Gradients, state: &mut AdamState) {
        state.t += 1;
        let lr = self.config.learning_rate;
        let step = lr * (1.0 - BETA2.powi(state.t)).sqrt() / (1.0 - BETA1.powi(state.t));

        adam_update(&mut w.w1, &grads.w1, &mut state.m.w1, &mut state.v.w1, step);
        adam_update(&mut w.b1, &grads.b1, &mut state.m.b1, &mut state.v.b1, step);
        adam_update(&mut w.w2, &grads.w2, &mut state.m.w2, &mut state.v.w2, step);
        adam_update(&mut w.b2, &grads.b2, &mut state.m.b2, &mut state.v.b2, step);
    }
}

impl Classifier for MlpClassifier {
    fn train(&mut self, dataset: &TrainingDataset) -> Result<()> {
        if dataset.n_samples == 0 {
            return Err(AppError::Training(
                "cannot train Multi-layer Perceptron on an empty dataset".to_string(),
            ));
        }

        let n_classes = dataset.n_classes();
        let mut rng = StdRng::seed_from_u64(self.seed);

        let (w1, b1) = glorot(&mut rng, dataset.n_features, self.config.hidden_units);
        let (w2, b2) = glorot(&mut rng, self.config.hidden_units, n_classes);
        let mut weights = MlpWeights { w1, b1, w2, b2 };

        let mut one_hot = Array2::<f64>::zeros((dataset.n_samples, n_classes));
        for (i, &label) in dataset.labels.iter().enumerate() {
            one_hot[[i, label]] = 1.0;
        }

        let mut state = AdamState {
            t: 0,
            m: Gradients::zeros_like(&weights),
            v: Gradients::zeros_like(&weights),
        };

        let batch_size = self.config.batch_size.min(dataset.n_samples).max(1);
        let mut indices: Vec<usize> = (0..dataset.n_samples).collect();
        let mut best_loss = f64::INFINITY;
        let mut no_improvement = 0;
        let mut epoch_loss = f64::NAN;
        let mut epochs = 0;

        for epoch in 0..self.config.max_epochs {
            indices.shuffle(&mut rng);
            let mut total = 0.0;

            for chunk in indices.chunks(batch_size) {
                let x = dataset.features.select(Axis(0), chunk);
                let y = one_hot.select(Axis(0), chunk);
                let (loss, grads) = self.backward(&weights, &x, &y);
                total += loss * chunk.len() as f64;
                self.apply(&mut weights, &grads, &mut state);
            }

            epoch_loss = total / dataset.n_samples as f64;
            epochs = epoch + 1;

            if !epoch_loss.is_finite() {
                return Err(AppError::Training(format!(
                    "Multi-layer Perceptron diverged at epoch {} (loss {})",
                    epochs, epoch_loss
                )));
            }

            if epoch_loss > best_loss - self.config.tolerance {
                no_improvement += 1;
            } else {
                no_improvement = 0;
            }
            if epoch_loss < best_loss {
                best_loss = epoch_loss;
            }
            if no_improvement > self.config.n_iter_no_change {
                debug!(epoch = epochs, loss = epoch_loss, "MLP loss plateaued, stopping");
                break;
            }
        }

        debug!(epochs, loss = epoch_loss, "MLP training finished");

        self.weights = Some(weights);
        self.n_classes = n_classes;
        self.n_epochs = epochs;
        self.final_loss = epoch_loss;
        Ok(())
    }

    fn predict(&self, features: &Array2<f64>) -> Result<Vec<usize>> {
        let weights = self.weights.as_ref().ok_or_else(|| {
            AppError::Prediction("Multi-layer Perceptron is not trained".to_string())
        })?;
        if features.ncols() != weights.w1.nrows() {
            return Err(AppError::Prediction(format!(
                "Multi-layer Perceptron expects {} features, got {}",
                weights.w1.nrows(),
                features.ncols()
            )));
        }

        let (_, _, probs) = Self::forward(weights, features);
        Ok(probs.rows().into_iter().map(argmax).collect())
    }

    fn model_type(&self) -> ModelType {
        ModelType::MultiLayerPerceptron
    }

    fn is_trained(&self) -> bool {
        self.weights.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::classifier::tests::create_test_dataset;
    use ndarray::array;

    fn small_config() -> MlpConfig {
        MlpConfig {
            hidden_units: 16,
            max_epochs: 300,
            learning_rate: 0.01,
            ..MlpConfig::default()
        }
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let probs = softmax_rows(array![[1.0, 2.0, 3.0], [1000.0, 1000.0, 1000.0]]);
        for row in probs.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-12);
        }
        assert!((probs[[1, 0]] - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_mlp_learns_separable_blobs() {
        let dataset = create_test_dataset(20);
        let mut classifier = MlpClassifier::new(small_config(), 42);

        assert!(!classifier.is_trained());
        classifier.train(&dataset).unwrap();
        assert!(classifier.is_trained());
        assert!(classifier.n_epochs() > 0);
        assert!(classifier.final_loss().is_finite());

        let probe = array![[-4.0, -4.0], [0.0, 4.0], [4.0, -4.0]];
        assert_eq!(classifier.predict(&probe).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_mlp_is_deterministic_for_a_seed() {
        let dataset = create_test_dataset(10);
        let mut a = MlpClassifier::new(small_config(), 7);
        let mut b = MlpClassifier::new(small_config(), 7);
        a.train(&dataset).unwrap();
        b.train(&dataset).unwrap();

        assert_eq!(a.final_loss(), b.final_loss());
        assert_eq!(a.n_epochs(), b.n_epochs());
    }

    #[test]
    fn test_mlp_rejects_wrong_width() {
        let dataset = create_test_dataset(5);
        let mut classifier = MlpClassifier::new(small_config(), 1);
        classifier.train(&dataset).unwrap();
        assert!(classifier.predict(&array![[1.0, 2.0, 3.0]]).is_err());
    }
}

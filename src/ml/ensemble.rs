use crate::error::{AppError, Result};
use crate::ml::classifier::{
    Classifier, KnnClassifier, LogisticRegressionClassifier, NaiveBayesClassifier,
};
use crate::ml::mlp::MlpClassifier;
use crate::ml::models::{ModelType, TrainingConfig, TrainingDataset};
use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

/// One member of the voting ensemble
#[derive(Serialize, Deserialize)]
pub enum Voter {
    Mlp(MlpClassifier),
    NaiveBayes(NaiveBayesClassifier),
    Knn(KnnClassifier),
    LogisticRegression(LogisticRegressionClassifier),
}

impl Voter {
    fn inner(&self) -> &dyn Classifier {
        match self {
            Voter::Mlp(m) => m,
            Voter::NaiveBayes(m) => m,
            Voter::Knn(m) => m,
            Voter::LogisticRegression(m) => m,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Classifier {
        match self {
            Voter::Mlp(m) => m,
            Voter::NaiveBayes(m) => m,
            Voter::Knn(m) => m,
            Voter::LogisticRegression(m) => m,
        }
    }
}

impl Classifier for Voter {
    fn train(&mut self, dataset: &TrainingDataset) -> Result<()> {
        self.inner_mut().train(dataset)
    }

    fn predict(&self, features: &Array2<f64>) -> Result<Vec<usize>> {
        self.inner().predict(features)
    }

    fn model_type(&self) -> ModelType {
        self.inner().model_type()
    }

    fn is_trained(&self) -> bool {
        self.inner().is_trained()
    }
}

/// Hard-voting classifier: every voter predicts a class code and the most
/// frequent code wins. Ties go to the smallest code.
#[derive(Serialize, Deserialize)]
pub struct VotingClassifier {
    voters: Vec<Voter>,

    /// Size of the class code space seen at training time
    n_classes: usize,
}

impl VotingClassifier {
    pub fn new(voters: Vec<Voter>) -> Self {
        Self {
            voters,
            n_classes: 0,
        }
    }

    /// The four-voter ensemble: MLP, Gaussian naive Bayes, kNN and
    /// logistic regression
    pub fn from_config(config: &TrainingConfig) -> Self {
        Self::new(vec![
            Voter::Mlp(MlpClassifier::new(config.mlp.clone(), config.seed)),
            Voter::NaiveBayes(NaiveBayesClassifier::new()),
            Voter::Knn(KnnClassifier::new(config.knn_neighbors)),
            Voter::LogisticRegression(LogisticRegressionClassifier::new(config.logistic_alpha)),
        ])
    }

    pub fn voters(&self) -> &[Voter] {
        &self.voters
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    /// Per-voter predictions, one vector per voter in voter order
    pub fn votes(&self, features: &Array2<f64>) -> Result<Vec<Vec<usize>>> {
        self.voters.iter().map(|v| v.predict(features)).collect()
    }

    /// Majority class among `votes`; ties resolve to the smallest code
    pub fn tally(votes: &[usize], n_classes: usize) -> Option<usize> {
        let width = votes
            .iter()
            .max()
            .map(|&m| (m + 1).max(n_classes))
            .unwrap_or(n_classes);
        let mut counts = vec![0usize; width];
        for &vote in votes {
            counts[vote] += 1;
        }

        let mut winner = None;
        let mut best = 0;
        for (class, &count) in counts.iter().enumerate() {
            if count > best {
                best = count;
                winner = Some(class);
            }
        }
        winner
    }
}

impl Classifier for VotingClassifier {
    fn train(&mut self, dataset: &TrainingDataset) -> Result<()> {
        if self.voters.is_empty() {
            return Err(AppError::Training("ensemble has no voters".to_string()));
        }

        self.voters
            .par_iter_mut()
            .map(|voter| {
                voter.train(dataset)?;
                info!(model = voter.model_type().key(), "Voter trained");
                Ok(())
            })
            .collect::<Result<Vec<()>>>()?;

        self.n_classes = dataset.n_classes();
        Ok(())
    }

    fn predict(&self, features: &Array2<f64>) -> Result<Vec<usize>> {
        if !self.is_trained() {
            return Err(AppError::Prediction("Voting Ensemble is not trained".to_string()));
        }

        let votes = self.votes(features)?;
        (0..features.nrows())
            .map(|row| {
                let ballot: Vec<usize> = votes.iter().map(|v| v[row]).collect();
                Self::tally(&ballot, self.n_classes)
                    .ok_or_else(|| AppError::Prediction("no votes cast".to_string()))
            })
            .collect()
    }

    fn model_type(&self) -> ModelType {
        ModelType::Ensemble
    }

    fn is_trained(&self) -> bool {
        !self.voters.is_empty() && self.voters.iter().all(|v| v.is_trained())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::classifier::tests::create_test_dataset;
    use crate::ml::models::MlpConfig;
    use ndarray::array;

    fn fast_config() -> TrainingConfig {
        TrainingConfig {
            mlp: MlpConfig {
                hidden_units: 16,
                max_epochs: 200,
                learning_rate: 0.01,
                ..MlpConfig::default()
            },
            ..TrainingConfig::default()
        }
    }

    #[test]
    fn test_tally_majority() {
        assert_eq!(VotingClassifier::tally(&[2, 2, 1, 0], 3), Some(2));
        assert_eq!(VotingClassifier::tally(&[1, 1, 1, 0], 3), Some(1));
    }

    #[test]
    fn test_tally_tie_goes_to_smallest_code() {
        assert_eq!(VotingClassifier::tally(&[3, 1, 3, 1], 4), Some(1));
        assert_eq!(VotingClassifier::tally(&[2, 0, 1, 3], 4), Some(0));
    }

    #[test]
    fn test_tally_empty() {
        assert_eq!(VotingClassifier::tally(&[], 3), None);
    }

    #[test]
    fn test_untrained_ensemble_refuses_to_predict() {
        let ensemble = VotingClassifier::from_config(&fast_config());
        assert!(!ensemble.is_trained());
        assert!(ensemble.predict(&array![[0.0, 0.0]]).is_err());
    }

    #[test]
    fn test_ensemble_trains_all_voters() {
        let dataset = create_test_dataset(20);
        let mut ensemble = VotingClassifier::from_config(&fast_config());

        ensemble.train(&dataset).unwrap();

        assert!(ensemble.is_trained());
        assert_eq!(ensemble.voters().len(), 4);
        assert_eq!(ensemble.n_classes(), 3);

        let probe = array![[-4.0, -4.0], [0.0, 4.0], [4.0, -4.0]];
        assert_eq!(ensemble.predict(&probe).unwrap(), vec![0, 1, 2]);

        let votes = ensemble.votes(&probe).unwrap();
        assert_eq!(votes.len(), 4);
        assert!(votes.iter().all(|v| v.len() == 3));
    }

    #[test]
    fn test_ensemble_survives_bincode_round_trip() {
        let dataset = create_test_dataset(15);
        let mut ensemble = VotingClassifier::from_config(&fast_config());
        ensemble.train(&dataset).unwrap();

        let bytes = bincode::serialize(&ensemble).unwrap();
        let restored: VotingClassifier = bincode::deserialize(&bytes).unwrap();

        let probe = array![[-3.9, -4.1], [0.2, 3.8], [4.1, -3.7], [0.0, 0.0]];
        assert_eq!(
            restored.predict(&probe).unwrap(),
            ensemble.predict(&probe).unwrap()
        );
    }
}

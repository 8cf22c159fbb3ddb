//! Stratified cross-validation objective.
//!
//! The fold assignment is computed once when the evaluator is built and
//! reused for every configuration, so scores of different trials are directly
//! comparable. Folds are trained in parallel; the mean is reduced in fold
//! order so results do not depend on thread scheduling.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use hs_model::{accuracy, ModelFactory};
use hs_types::{Configuration, DataError, Dataset, HsResult, ModelError};

/// Score given to a configuration that cannot be trained.
pub const SENTINEL_SCORE: f64 = 0.0;

/// Outcome of evaluating one configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Mean held-out accuracy, in `[0, 1]`.
    pub score: f64,
    pub fold_scores: Vec<f64>,
    /// Population standard deviation of `fold_scores`.
    pub std: f64,
    pub error: Option<String>,
}

impl Evaluation {
    fn from_folds(fold_scores: Vec<f64>) -> Self {
        let n = fold_scores.len().max(1) as f64;
        let score = fold_scores.iter().sum::<f64>() / n;
        let variance = fold_scores.iter().map(|s| (s - score).powi(2)).sum::<f64>() / n;
        Self {
            score,
            fold_scores,
            std: variance.sqrt(),
            error: None,
        }
    }

    /// A failed evaluation scored with [`SENTINEL_SCORE`].
    pub fn failed(error: String) -> Self {
        Self {
            score: SENTINEL_SCORE,
            fold_scores: Vec::new(),
            std: 0.0,
            error: Some(error),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

/// Maps a configuration to a scalar fitness where higher is better.
pub trait Objective: Send + Sync {
    fn evaluate(&self, configuration: &Configuration) -> Evaluation;
}

/// Class-stratified K-fold partition of a dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct StratifiedKFold {
    folds: Vec<Vec<usize>>,
}

impl StratifiedKFold {
    /// Shuffle each class's rows with a seeded RNG and deal them round-robin
    /// across folds. The fold cursor carries over from one class to the next
    /// so fold sizes differ by at most one.
    pub fn new(dataset: &Dataset, n_folds: usize, seed: u64) -> Result<Self, DataError> {
        if n_folds < 2 {
            return Err(DataError::InvalidFoldCount { n_folds });
        }
        if dataset.len() < n_folds {
            return Err(DataError::InsufficientSamples {
                n_samples: dataset.len(),
                n_folds,
            });
        }

        let counts = dataset.class_counts();
        let largest = counts.iter().copied().max().unwrap_or(0);
        if largest < n_folds {
            return Err(DataError::ClassTooSmall { largest, n_folds });
        }
        if let Some(smallest) = counts.iter().copied().filter(|&c| c > 0).min() {
            if smallest < n_folds {
                warn!(
                    "The least populated class has only {} members, fewer than {} folds",
                    smallest, n_folds
                );
            }
        }

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut folds = vec![Vec::new(); n_folds];
        let mut cursor = 0;
        for mut members in dataset.indices_by_class() {
            members.shuffle(&mut rng);
            for row in members {
                folds[cursor].push(row);
                cursor = (cursor + 1) % n_folds;
            }
        }
        for fold in folds.iter_mut() {
            fold.sort_unstable();
        }

        Ok(Self { folds })
    }

    pub fn n_folds(&self) -> usize {
        self.folds.len()
    }

    /// Held-out rows of fold `k`.
    pub fn test_rows(&self, k: usize) -> &[usize] {
        &self.folds[k]
    }

    /// Rows of every fold except `k`, ascending.
    pub fn train_rows(&self, k: usize) -> Vec<usize> {
        let mut rows: Vec<usize> = self
            .folds
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != k)
            .flat_map(|(_, fold)| fold.iter().copied())
            .collect();
        rows.sort_unstable();
        rows
    }
}

/// Scores configurations by stratified K-fold cross-validated accuracy.
pub struct CrossValidator {
    dataset: Arc<Dataset>,
    folds: StratifiedKFold,
    seed: u64,
    factory: Arc<dyn ModelFactory>,
}

impl CrossValidator {
    pub fn new(
        dataset: Arc<Dataset>,
        n_folds: usize,
        seed: u64,
        factory: Arc<dyn ModelFactory>,
    ) -> HsResult<Self> {
        let folds = StratifiedKFold::new(&dataset, n_folds, seed)?;
        debug!(
            "Built {} stratified folds over {} rows (seed {})",
            n_folds,
            dataset.len(),
            seed
        );
        Ok(Self {
            dataset,
            folds,
            seed,
            factory,
        })
    }

    pub fn folds(&self) -> &StratifiedKFold {
        &self.folds
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    fn model_seed(&self, fold: usize) -> u64 {
        self.seed
            .wrapping_mul(0x9E37_79B9_7F4A_7C15)
            .wrapping_add(fold as u64)
    }

    fn score_fold(&self, configuration: &Configuration, fold: usize) -> Result<f64, ModelError> {
        let mut model = self.factory.build(
            configuration,
            self.dataset.n_classes(),
            self.model_seed(fold),
        )?;
        model.fit(&self.dataset, &self.folds.train_rows(fold))?;
        accuracy(model.as_ref(), &self.dataset, self.folds.test_rows(fold))
    }
}

impl Objective for CrossValidator {
    fn evaluate(&self, configuration: &Configuration) -> Evaluation {
        let results: Vec<Result<f64, ModelError>> = (0..self.folds.n_folds())
            .into_par_iter()
            .map(|fold| self.score_fold(configuration, fold))
            .collect();

        match results.into_iter().collect::<Result<Vec<f64>, ModelError>>() {
            Ok(fold_scores) => Evaluation::from_folds(fold_scores),
            Err(e) => {
                warn!(
                    "Configuration [{}] could not be evaluated, scoring {}: {}",
                    configuration, SENTINEL_SCORE, e
                );
                Evaluation::failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hs_model::{BoosterFactory, Classifier};
    use hs_types::ParameterValue;

    /// Always predicts the configured class.
    struct ConstantModel(usize);

    impl Classifier for ConstantModel {
        fn fit(&mut self, _dataset: &Dataset, _rows: &[usize]) -> Result<(), ModelError> {
            Ok(())
        }

        fn predict(&self, _features: &[f64]) -> Result<usize, ModelError> {
            Ok(self.0)
        }
    }

    struct ConstantFactory;

    impl ModelFactory for ConstantFactory {
        fn build(
            &self,
            configuration: &Configuration,
            _n_classes: usize,
            _seed: u64,
        ) -> Result<Box<dyn Classifier>, ModelError> {
            let class = configuration.int("class")?;
            Ok(Box::new(ConstantModel(class as usize)))
        }

        fn name(&self) -> &str {
            "constant"
        }
    }

    fn balanced(n_per_class: usize, n_classes: usize) -> Dataset {
        let mut features = Vec::new();
        let mut labels = Vec::new();
        for c in 0..n_classes {
            for i in 0..n_per_class {
                features.push(vec![c as f64, i as f64]);
                labels.push(c);
            }
        }
        Dataset::new(features, labels).unwrap()
    }

    fn class_config(class: i64) -> Configuration {
        [("class".to_string(), ParameterValue::Int(class))]
            .into_iter()
            .collect()
    }

    #[test]
    fn folds_are_stratified_and_cover_every_row() {
        let ds = balanced(10, 3);
        let folds = StratifiedKFold::new(&ds, 5, 42).unwrap();

        let mut all: Vec<usize> = (0..5).flat_map(|k| folds.test_rows(k).to_vec()).collect();
        all.sort_unstable();
        assert_eq!(all, (0..30).collect::<Vec<_>>());

        for k in 0..5 {
            let rows = folds.test_rows(k);
            assert_eq!(rows.len(), 6);
            for class in 0..3 {
                let members = rows.iter().filter(|&&r| ds.label(r) == class).count();
                assert_eq!(members, 2, "fold {k} class {class}");
            }
            assert_eq!(folds.train_rows(k).len(), 24);
        }
    }

    #[test]
    fn fold_sizes_stay_balanced_with_uneven_classes() {
        let labels: Vec<usize> = (0..23).map(|i| usize::from(i >= 7)).collect();
        let features = (0..23).map(|i| vec![i as f64]).collect();
        let ds = Dataset::new(features, labels).unwrap();
        let folds = StratifiedKFold::new(&ds, 5, 1).unwrap();
        let sizes: Vec<usize> = (0..5).map(|k| folds.test_rows(k).len()).collect();
        assert!(sizes.iter().max().unwrap() - sizes.iter().min().unwrap() <= 1);
    }

    #[test]
    fn fold_assignment_depends_on_seed_only() {
        let ds = balanced(10, 3);
        assert_eq!(
            StratifiedKFold::new(&ds, 5, 42).unwrap(),
            StratifiedKFold::new(&ds, 5, 42).unwrap()
        );
        assert_ne!(
            StratifiedKFold::new(&ds, 5, 42).unwrap(),
            StratifiedKFold::new(&ds, 5, 43).unwrap()
        );
    }

    #[test]
    fn fold_construction_errors() {
        let ds = balanced(3, 2);
        assert_eq!(
            StratifiedKFold::new(&ds, 1, 0),
            Err(DataError::InvalidFoldCount { n_folds: 1 })
        );
        assert_eq!(
            StratifiedKFold::new(&ds, 7, 0),
            Err(DataError::InsufficientSamples {
                n_samples: 6,
                n_folds: 7
            })
        );
        assert_eq!(
            StratifiedKFold::new(&ds, 5, 0),
            Err(DataError::ClassTooSmall {
                largest: 3,
                n_folds: 5
            })
        );
    }

    #[test]
    fn constant_model_scores_class_share() {
        let ds = Arc::new(balanced(10, 2));
        let cv = CrossValidator::new(ds, 5, 42, Arc::new(ConstantFactory)).unwrap();
        let eval = cv.evaluate(&class_config(1));
        assert_eq!(eval.score, 0.5);
        assert_eq!(eval.fold_scores, vec![0.5; 5]);
        assert_eq!(eval.std, 0.0);
        assert!(!eval.is_failure());
    }

    #[test]
    fn invalid_configuration_gets_sentinel_score() {
        let ds = Arc::new(balanced(10, 2));
        let cv = CrossValidator::new(ds, 5, 42, Arc::new(ConstantFactory)).unwrap();
        let eval = cv.evaluate(&Configuration::default());
        assert_eq!(eval.score, SENTINEL_SCORE);
        assert!(eval.fold_scores.is_empty());
        assert!(eval.error.as_deref().unwrap().contains("class"));
    }

    #[test]
    fn boosted_evaluation_is_reproducible_and_bounded() {
        let ds = hs_data::SyntheticSpec::default()
            .with_samples(120)
            .with_features(5, 3, 1)
            .with_classes(3)
            .generate()
            .unwrap();
        let cv = CrossValidator::new(Arc::new(ds), 3, 42, Arc::new(BoosterFactory::new(5))).unwrap();
        let config: Configuration = [
            ("booster".to_string(), ParameterValue::from("dart")),
            ("rate_drop".to_string(), ParameterValue::from(0.2)),
            ("subsample".to_string(), ParameterValue::from(0.8)),
        ]
        .into_iter()
        .collect();

        let first = cv.evaluate(&config);
        let second = cv.evaluate(&config);
        assert_eq!(first, second);
        assert!((0.0..=1.0).contains(&first.score));
        assert_eq!(first.fold_scores.len(), 3);
    }
}

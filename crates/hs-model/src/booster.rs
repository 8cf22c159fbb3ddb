//! Softmax gradient boosting with `gbtree` and `dart` boosters.
//!
//! Each boosting round fits one regression tree per class on the softmax
//! gradients. With the `dart` booster a random subset of earlier rounds is
//! dropped while the new round is fitted, and the new and dropped rounds are
//! reweighted afterwards according to `normalize_type`.

use rand::seq::{index, SliceRandom};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use hs_types::{Configuration, Dataset, ModelError};

use crate::classifier::{Classifier, ModelFactory};
use crate::tree::{grow_tree, GrowPolicy, RegressionTree, TreeParams};

/// Boosting rounds used when the factory is not told otherwise.
pub const DEFAULT_N_ESTIMATORS: usize = 200;

/// Floor on the softmax hessian so leaves never divide by zero.
const MIN_HESSIAN: f64 = 1e-16;

/// How dropped rounds are chosen under `dart`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleType {
    Uniform,
    /// Drop probability proportional to the round's current weight.
    Weighted,
}

/// How new and dropped rounds are reweighted under `dart`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizeType {
    /// New round weighs `1 / (k + eta)`; dropped rounds scale by `k / (k + eta)`.
    Tree,
    /// New round weighs `1 / (1 + eta)`; dropped rounds scale by the same factor.
    Forest,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DartParams {
    pub sample_type: SampleType,
    pub normalize_type: NormalizeType,
    pub rate_drop: f64,
    pub skip_drop: f64,
}

impl Default for DartParams {
    fn default() -> Self {
        Self {
            sample_type: SampleType::Uniform,
            normalize_type: NormalizeType::Tree,
            rate_drop: 0.0,
            skip_drop: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Booster {
    GbTree,
    Dart(DartParams),
}

/// Hyperparameters of the boosted classifier.
///
/// Absent keys fall back to the conventional gradient-boosting defaults;
/// present keys must have the right type and lie in range.
#[derive(Debug, Clone, PartialEq)]
pub struct BoosterParams {
    pub booster: Booster,
    pub lambda: f64,
    pub alpha: f64,
    pub max_depth: usize,
    /// Leaf budget for `lossguide` growth; 0 means unlimited.
    pub max_leaves: usize,
    pub eta: f64,
    pub gamma: f64,
    pub grow_policy: GrowPolicy,
    pub subsample: f64,
    pub colsample_bytree: f64,
    pub min_child_weight: f64,
}

impl Default for BoosterParams {
    fn default() -> Self {
        Self {
            booster: Booster::GbTree,
            lambda: 1.0,
            alpha: 0.0,
            max_depth: 6,
            max_leaves: 0,
            eta: 0.3,
            gamma: 0.0,
            grow_policy: GrowPolicy::Depthwise,
            subsample: 1.0,
            colsample_bytree: 1.0,
            min_child_weight: 1.0,
        }
    }
}

impl BoosterParams {
    /// Read and validate parameters from a materialized configuration.
    pub fn from_configuration(config: &Configuration) -> Result<Self, ModelError> {
        let defaults = Self::default();

        let booster = match categorical_or(config, "booster", "gbtree")? {
            "gbtree" => Booster::GbTree,
            "dart" => Booster::Dart(DartParams::from_configuration(config)?),
            other => return Err(unsupported("booster", other)),
        };
        let grow_policy = match categorical_or(config, "grow_policy", "depthwise")? {
            "depthwise" => GrowPolicy::Depthwise,
            "lossguide" => GrowPolicy::Lossguide,
            other => return Err(unsupported("grow_policy", other)),
        };

        let max_depth = int_or(config, "max_depth", defaults.max_depth as i64)?;
        if max_depth < 1 {
            return Err(invalid("max_depth", format!("must be >= 1, got {max_depth}")));
        }
        let max_leaves = int_or(config, "max_leaves", 0)?;
        if max_leaves < 0 {
            return Err(invalid("max_leaves", format!("must be >= 0, got {max_leaves}")));
        }

        Ok(Self {
            booster,
            lambda: non_negative(config, "lambda", defaults.lambda)?,
            alpha: non_negative(config, "alpha", defaults.alpha)?,
            max_depth: max_depth as usize,
            max_leaves: max_leaves as usize,
            eta: fraction(config, "eta", defaults.eta)?,
            gamma: non_negative(config, "gamma", defaults.gamma)?,
            grow_policy,
            subsample: fraction(config, "subsample", defaults.subsample)?,
            colsample_bytree: fraction(config, "colsample_bytree", defaults.colsample_bytree)?,
            min_child_weight: non_negative(config, "min_child_weight", defaults.min_child_weight)?,
        })
    }

    fn tree_params(&self) -> TreeParams {
        TreeParams {
            max_depth: self.max_depth,
            max_leaves: self.max_leaves,
            lambda: self.lambda,
            alpha: self.alpha,
            gamma: self.gamma,
            min_child_weight: self.min_child_weight,
            eta: self.eta,
            grow_policy: self.grow_policy,
        }
    }
}

impl DartParams {
    fn from_configuration(config: &Configuration) -> Result<Self, ModelError> {
        let sample_type = match categorical_or(config, "sample_type", "uniform")? {
            "uniform" => SampleType::Uniform,
            "weighted" => SampleType::Weighted,
            other => return Err(unsupported("sample_type", other)),
        };
        let normalize_type = match categorical_or(config, "normalize_type", "tree")? {
            "tree" => NormalizeType::Tree,
            "forest" => NormalizeType::Forest,
            other => return Err(unsupported("normalize_type", other)),
        };
        Ok(Self {
            sample_type,
            normalize_type,
            rate_drop: probability(config, "rate_drop", 0.0)?,
            skip_drop: probability(config, "skip_drop", 0.0)?,
        })
    }
}

fn categorical_or<'a>(
    config: &'a Configuration,
    name: &str,
    default: &'a str,
) -> Result<&'a str, ModelError> {
    if config.contains(name) {
        config.categorical(name)
    } else {
        Ok(default)
    }
}

fn int_or(config: &Configuration, name: &str, default: i64) -> Result<i64, ModelError> {
    if config.contains(name) {
        config.int(name)
    } else {
        Ok(default)
    }
}

fn real_or(config: &Configuration, name: &str, default: f64) -> Result<f64, ModelError> {
    let value = if config.contains(name) {
        config.real(name)?
    } else {
        default
    };
    if !value.is_finite() {
        return Err(invalid(name, format!("must be finite, got {value}")));
    }
    Ok(value)
}

fn non_negative(config: &Configuration, name: &str, default: f64) -> Result<f64, ModelError> {
    let value = real_or(config, name, default)?;
    if value < 0.0 {
        return Err(invalid(name, format!("must be >= 0, got {value}")));
    }
    Ok(value)
}

/// Value in `(0, 1]`.
fn fraction(config: &Configuration, name: &str, default: f64) -> Result<f64, ModelError> {
    let value = real_or(config, name, default)?;
    if value <= 0.0 || value > 1.0 {
        return Err(invalid(name, format!("must be in (0, 1], got {value}")));
    }
    Ok(value)
}

/// Value in `[0, 1]`.
fn probability(config: &Configuration, name: &str, default: f64) -> Result<f64, ModelError> {
    let value = real_or(config, name, default)?;
    if !(0.0..=1.0).contains(&value) {
        return Err(invalid(name, format!("must be in [0, 1], got {value}")));
    }
    Ok(value)
}

fn invalid(name: &str, message: String) -> ModelError {
    ModelError::InvalidParameter {
        name: name.to_string(),
        message,
    }
}

fn unsupported(name: &str, value: &str) -> ModelError {
    ModelError::UnsupportedValue {
        name: name.to_string(),
        value: value.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

/// One boosting round: a tree per class sharing a weight.
#[derive(Debug, Clone)]
struct BoostingRound {
    trees: Vec<RegressionTree>,
    weight: f64,
}

/// Multi-class gradient-boosted tree classifier.
#[derive(Debug, Clone)]
pub struct GradientBoostedClassifier {
    params: BoosterParams,
    n_estimators: usize,
    n_classes: usize,
    seed: u64,
    n_features: usize,
    rounds: Vec<BoostingRound>,
}

impl GradientBoostedClassifier {
    pub fn new(params: BoosterParams, n_estimators: usize, n_classes: usize, seed: u64) -> Self {
        Self {
            params,
            n_estimators,
            n_classes,
            seed,
            n_features: 0,
            rounds: Vec::new(),
        }
    }

    pub fn n_rounds(&self) -> usize {
        self.rounds.len()
    }

    /// Current round weights (all 1.0 for `gbtree`).
    pub fn round_weights(&self) -> Vec<f64> {
        self.rounds.iter().map(|r| r.weight).collect()
    }

    /// Raw per-class scores for one feature vector.
    pub fn margins(&self, features: &[f64]) -> Vec<f64> {
        let mut margins = vec![0.0; self.n_classes];
        for round in &self.rounds {
            for (k, tree) in round.trees.iter().enumerate() {
                margins[k] += round.weight * tree.predict(features);
            }
        }
        margins
    }

    fn select_dropped(&self, rng: &mut ChaCha8Rng) -> Vec<usize> {
        let dart = match self.params.booster {
            Booster::Dart(dart) => dart,
            Booster::GbTree => return Vec::new(),
        };
        if self.rounds.is_empty() || rng.gen::<f64>() < dart.skip_drop {
            return Vec::new();
        }

        let n = self.rounds.len() as f64;
        let total_weight: f64 = self.rounds.iter().map(|r| r.weight).sum();
        (0..self.rounds.len())
            .filter(|&i| {
                let p = match dart.sample_type {
                    SampleType::Uniform => dart.rate_drop,
                    SampleType::Weighted if total_weight > 0.0 => {
                        (dart.rate_drop * n * self.rounds[i].weight / total_weight).min(1.0)
                    }
                    SampleType::Weighted => dart.rate_drop,
                };
                rng.gen::<f64>() < p
            })
            .collect()
    }
}

/// Softmax of `margins` written into `out`.
fn softmax(margins: &[f64], out: &mut [f64]) {
    let max = margins.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut sum = 0.0;
    for (o, &m) in out.iter_mut().zip(margins) {
        *o = (m - max).exp();
        sum += *o;
    }
    for o in out.iter_mut() {
        *o /= sum;
    }
}

impl Classifier for GradientBoostedClassifier {
    fn fit(&mut self, dataset: &Dataset, rows: &[usize]) -> Result<(), ModelError> {
        if rows.is_empty() {
            return Err(ModelError::TrainingFailed {
                message: "no training rows".to_string(),
            });
        }
        if self.n_classes < 2 {
            return Err(ModelError::TrainingFailed {
                message: format!("need at least 2 classes, got {}", self.n_classes),
            });
        }

        let k_classes = self.n_classes;
        let n_features = dataset.n_features();
        if n_features == 0 {
            return Err(ModelError::TrainingFailed {
                message: "dataset has no features".to_string(),
            });
        }
        let is_dart = matches!(self.params.booster, Booster::Dart(_));
        let tree_params = self.params.tree_params();
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);

        self.rounds.clear();
        self.n_features = n_features;

        // margins and per-round raw outputs are indexed [pos * k_classes + k]
        let mut margins = vec![0.0; rows.len() * k_classes];
        let mut contributions: Vec<Vec<f64>> = Vec::new();
        let mut grad = vec![vec![0.0; dataset.len()]; k_classes];
        let mut hess = vec![vec![0.0; dataset.len()]; k_classes];
        let mut probs = vec![0.0; k_classes];

        let n_rows = ((rows.len() as f64 * self.params.subsample).ceil() as usize).clamp(1, rows.len());
        let n_cols = ((n_features as f64 * self.params.colsample_bytree).ceil() as usize).clamp(1, n_features);

        for _ in 0..self.n_estimators {
            let dropped = self.select_dropped(&mut rng);

            let mut effective = margins.clone();
            for &d in &dropped {
                let w = self.rounds[d].weight;
                for (e, c) in effective.iter_mut().zip(&contributions[d]) {
                    *e -= w * c;
                }
            }

            for (pos, &row) in rows.iter().enumerate() {
                let offset = pos * k_classes;
                softmax(&effective[offset..offset + k_classes], &mut probs);
                let label = dataset.label(row);
                for k in 0..k_classes {
                    let p = probs[k];
                    let y = if label == k { 1.0 } else { 0.0 };
                    grad[k][row] = p - y;
                    hess[k][row] = (2.0 * p * (1.0 - p)).max(MIN_HESSIAN);
                }
            }

            let mut sample_rows: Vec<usize> = if n_rows < rows.len() {
                rows.choose_multiple(&mut rng, n_rows).copied().collect()
            } else {
                rows.to_vec()
            };
            sample_rows.sort_unstable();
            let mut features: Vec<usize> = index::sample(&mut rng, n_features, n_cols).into_vec();
            features.sort_unstable();

            let trees: Vec<RegressionTree> = (0..k_classes)
                .map(|k| grow_tree(dataset, &sample_rows, &features, &grad[k], &hess[k], &tree_params))
                .collect();

            let mut output = vec![0.0; rows.len() * k_classes];
            for (pos, &row) in rows.iter().enumerate() {
                let x = dataset.row(row);
                for (k, tree) in trees.iter().enumerate() {
                    output[pos * k_classes + k] = tree.predict(x);
                }
            }

            let new_weight = match (self.params.booster, dropped.len()) {
                (Booster::Dart(dart), k) if k > 0 => {
                    let k = k as f64;
                    let eta = self.params.eta;
                    let (dropped_scale, new_weight) = match dart.normalize_type {
                        NormalizeType::Tree => (k / (k + eta), 1.0 / (k + eta)),
                        NormalizeType::Forest => (1.0 / (1.0 + eta), 1.0 / (1.0 + eta)),
                    };
                    for &d in &dropped {
                        self.rounds[d].weight *= dropped_scale;
                    }
                    new_weight
                }
                _ => 1.0,
            };

            // rebuild margins from the reduced sum plus the reweighted rounds
            margins = effective;
            for &d in &dropped {
                let w = self.rounds[d].weight;
                for (m, c) in margins.iter_mut().zip(&contributions[d]) {
                    *m += w * c;
                }
            }
            for (m, o) in margins.iter_mut().zip(&output) {
                *m += new_weight * o;
            }

            if is_dart {
                contributions.push(output);
            }
            self.rounds.push(BoostingRound {
                trees,
                weight: new_weight,
            });
        }

        debug!(
            "Fitted {} boosting rounds on {} rows ({} classes)",
            self.rounds.len(),
            rows.len(),
            k_classes
        );
        Ok(())
    }

    fn predict(&self, features: &[f64]) -> Result<usize, ModelError> {
        if self.rounds.is_empty() {
            return Err(ModelError::NotFitted);
        }
        if features.len() != self.n_features {
            return Err(invalid(
                "features",
                format!("expected {} values, got {}", self.n_features, features.len()),
            ));
        }

        let margins = self.margins(features);
        let mut best = 0;
        for (k, &m) in margins.iter().enumerate() {
            if m > margins[best] {
                best = k;
            }
        }
        Ok(best)
    }
}

/// Builds [`GradientBoostedClassifier`]s with a fixed number of rounds.
#[derive(Debug, Clone)]
pub struct BoosterFactory {
    n_estimators: usize,
}

impl BoosterFactory {
    pub fn new(n_estimators: usize) -> Self {
        Self { n_estimators }
    }

    pub fn n_estimators(&self) -> usize {
        self.n_estimators
    }
}

impl Default for BoosterFactory {
    fn default() -> Self {
        Self::new(DEFAULT_N_ESTIMATORS)
    }
}

impl ModelFactory for BoosterFactory {
    fn build(
        &self,
        configuration: &Configuration,
        n_classes: usize,
        seed: u64,
    ) -> Result<Box<dyn Classifier>, ModelError> {
        if self.n_estimators == 0 {
            return Err(invalid("n_estimators", "must be >= 1".to_string()));
        }
        if n_classes < 2 {
            return Err(invalid("num_class", format!("must be >= 2, got {n_classes}")));
        }
        let params = BoosterParams::from_configuration(configuration)?;
        Ok(Box::new(GradientBoostedClassifier::new(
            params,
            self.n_estimators,
            n_classes,
            seed,
        )))
    }

    fn name(&self) -> &str {
        "gradient_boosting"
    }
}

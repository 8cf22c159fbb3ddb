//! # hs-model
//!
//! The classifier contract consumed by the objective evaluator, and a
//! softmax gradient-boosted tree classifier with `gbtree` and `dart`
//! boosters whose hyperparameters are read from a materialized
//! [`Configuration`](hs_types::Configuration).

mod booster;
mod classifier;
mod tree;

pub use booster::{
    Booster, BoosterFactory, BoosterParams, DartParams, GradientBoostedClassifier, NormalizeType,
    SampleType, DEFAULT_N_ESTIMATORS,
};
pub use classifier::{accuracy, Classifier, ModelFactory};
pub use tree::{GrowPolicy, RegressionTree};

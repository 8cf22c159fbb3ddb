//! # hs-optimizer
//!
//! Budgeted hyperparameter search for HyperSweep.
//!
//! Provides conditional search space definitions, the sampler contract and a
//! seeded random sampler, the stratified cross-validation objective, study
//! tracking, and the budget sweep with its cross-budget aggregation.

mod evaluator;
mod sampler;
mod space;
mod study;
mod sweep;

pub use evaluator::{CrossValidator, Evaluation, Objective, StratifiedKFold, SENTINEL_SCORE};
pub use sampler::{Proposal, RandomSampler, RandomSamplerFactory, Sampler, SamplerFactory};
pub use space::{DimensionKind, Guard, ParameterDef, ParameterSpace};
pub use study::{AbortedStudy, Study, StudyId, StudyRunner, StudyStatus, Trial};
pub use sweep::{aggregate, BudgetSweep, SweepFailure, SweepResult};

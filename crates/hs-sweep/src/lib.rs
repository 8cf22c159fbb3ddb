//! # hs-sweep
//!
//! Runs the booster search space through the budget sweep: builds the
//! dataset and cross-validation objective from a [`SweepConfig`], runs one
//! random-search study per budget, and exports the results.

pub mod config;
pub mod report;
pub mod space;

use std::sync::Arc;
use tracing::{info, warn};

use hs_model::BoosterFactory;
use hs_optimizer::{BudgetSweep, CrossValidator, RandomSamplerFactory, SweepFailure, SweepResult};
use hs_types::HsResult;

pub use config::{DatasetSource, SweepConfig};
pub use space::booster_space;

/// Run the whole sweep described by `config`.
///
/// When a study aborts and exports are enabled, the trial histories recorded
/// so far are still written before the error is returned.
pub fn run_sweep(config: &SweepConfig) -> HsResult<SweepResult> {
    config.validate()?;

    let dataset = Arc::new(config.dataset.load()?);
    info!(
        "Sweeping budgets {:?} over {} rows, {} features, {} classes",
        config.budgets,
        dataset.len(),
        dataset.n_features(),
        dataset.n_classes()
    );

    let evaluator = CrossValidator::new(
        dataset,
        config.n_folds,
        config.fold_seed,
        Arc::new(BoosterFactory::new(config.n_estimators)),
    )?;
    let space = booster_space();
    let sweep = BudgetSweep::new(
        space.clone(),
        Arc::new(evaluator),
        Box::new(RandomSamplerFactory::new(space.clone(), config.sampler_seed)),
    )?;

    match sweep.sweep(&config.budgets) {
        Ok(studies) => hs_optimizer::aggregate(studies),
        Err(SweepFailure::Aborted { completed, aborted }) => {
            warn!(
                "Sweep stopped at budget {} after {} completed budgets",
                aborted.budget,
                completed.len()
            );
            if config.export {
                let partial = completed.values().chain(std::iter::once(aborted.study.as_ref()));
                report::export_studies(partial, &space, &config.output_dir)?;
            }
            Err(SweepFailure::Aborted { completed, aborted }.into())
        }
        Err(failure) => Err(failure.into()),
    }
}

//! Budget sweeps and cross-budget aggregation.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use hs_types::{validation_error, HsError, HsResult};

use crate::evaluator::Objective;
use crate::sampler::SamplerFactory;
use crate::space::ParameterSpace;
use crate::study::{AbortedStudy, Study, StudyRunner, Trial};

/// Why a sweep did not produce a study for every budget.
#[derive(Debug, Error)]
pub enum SweepFailure {
    #[error("Invalid budgets: {0}")]
    InvalidBudgets(String),

    /// A study aborted; the studies finished before it are kept.
    #[error("{aborted}")]
    Aborted {
        completed: BTreeMap<usize, Study>,
        aborted: Box<AbortedStudy>,
    },
}

impl From<SweepFailure> for HsError {
    fn from(failure: SweepFailure) -> Self {
        match failure {
            SweepFailure::InvalidBudgets(message) => HsError::Validation(message),
            SweepFailure::Aborted { aborted, .. } => HsError::Sampler(aborted.error),
        }
    }
}

/// Runs one study per budget against a shared space and objective.
pub struct BudgetSweep {
    space: ParameterSpace,
    objective: Arc<dyn Objective>,
    samplers: Box<dyn SamplerFactory>,
}

impl BudgetSweep {
    pub fn new(
        space: ParameterSpace,
        objective: Arc<dyn Objective>,
        samplers: Box<dyn SamplerFactory>,
    ) -> HsResult<Self> {
        space.validate()?;
        Ok(Self {
            space,
            objective,
            samplers,
        })
    }

    pub fn space(&self) -> &ParameterSpace {
        &self.space
    }

    /// Run the budgets in the given order, each with a fresh sampler.
    ///
    /// Budgets must be positive and distinct. Stops at the first aborted
    /// study.
    pub fn sweep(&self, budgets: &[usize]) -> Result<BTreeMap<usize, Study>, SweepFailure> {
        validate_budgets(budgets)?;

        let runner = StudyRunner::new(&self.space, self.objective.as_ref());
        let mut studies = BTreeMap::new();

        for &budget in budgets {
            let mut sampler = self.samplers.create(budget);
            match runner.run(sampler.as_mut(), budget) {
                Ok(study) => {
                    studies.insert(budget, study);
                }
                Err(aborted) => {
                    return Err(SweepFailure::Aborted {
                        completed: studies,
                        aborted: Box::new(aborted),
                    })
                }
            }
        }

        info!("Sweep finished {} budgets: {:?}", studies.len(), budgets);
        Ok(studies)
    }

    /// [`BudgetSweep::sweep`] followed by [`aggregate`].
    pub fn run(&self, budgets: &[usize]) -> HsResult<SweepResult> {
        let studies = self.sweep(budgets)?;
        aggregate(studies)
    }
}

fn validate_budgets(budgets: &[usize]) -> Result<(), SweepFailure> {
    if budgets.is_empty() {
        return Err(SweepFailure::InvalidBudgets(
            "at least one budget is required".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    for &budget in budgets {
        if budget == 0 {
            return Err(SweepFailure::InvalidBudgets(
                "budgets must be positive".to_string(),
            ));
        }
        if !seen.insert(budget) {
            return Err(SweepFailure::InvalidBudgets(format!(
                "budget {budget} appears more than once"
            )));
        }
    }
    Ok(())
}

/// Immutable outcome of a sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepResult {
    pub per_budget: BTreeMap<usize, Study>,
    pub global_best_budget: usize,
}

impl SweepResult {
    /// `None` only when `global_best_budget` names no study, which
    /// [`aggregate`] never produces but an edited export can.
    pub fn global_best(&self) -> Option<&Study> {
        self.per_budget.get(&self.global_best_budget)
    }

    pub fn global_best_trial(&self) -> Option<&Trial> {
        self.global_best().and_then(Study::best_trial)
    }

    /// `(budget, best score)` in ascending budget order. Studies without
    /// trials have no best score and are left out.
    pub fn trend(&self) -> Vec<(usize, f64)> {
        self.per_budget
            .iter()
            .filter_map(|(&budget, study)| study.best_score().map(|score| (budget, score)))
            .collect()
    }
}

/// Pick the study with the highest best score. Exact ties go to the smaller
/// budget; a study without trials ranks below any study with trials.
pub fn aggregate(studies: BTreeMap<usize, Study>) -> HsResult<SweepResult> {
    let mut global_best_budget: Option<usize> = None;
    for (&budget, study) in &studies {
        let better = match global_best_budget {
            None => true,
            Some(current) => study.best_score() > studies[&current].best_score(),
        };
        if better {
            global_best_budget = Some(budget);
        }
    }

    let global_best_budget =
        global_best_budget.ok_or_else(|| validation_error!("cannot aggregate an empty sweep"))?;

    let result = SweepResult {
        per_budget: studies,
        global_best_budget,
    };
    if let Some(best) = result.global_best_trial() {
        info!(
            "Global best: budget {} trial {} with score {:.4}",
            global_best_budget, best.id, best.score
        );
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::Evaluation;
    use crate::sampler::{Proposal, RandomSamplerFactory, Sampler};
    use chrono::Utc;
    use hs_types::{Configuration, ParameterValue, SamplerError};

    /// Scores by `x`, but caps at 0.9 so distinct budgets can tie.
    struct Capped;

    impl Objective for Capped {
        fn evaluate(&self, configuration: &Configuration) -> Evaluation {
            let score = configuration.real("x").unwrap_or(0.0).min(0.9);
            Evaluation {
                score,
                fold_scores: vec![score],
                std: 0.0,
                error: None,
            }
        }
    }

    fn space() -> ParameterSpace {
        ParameterSpace::new()
            .add_real("x", 0.0, 1.0)
            .add_categorical("mode", &["A", "B"])
            .add_real("rate", 0.0, 1.0)
            .when("mode", "B")
    }

    fn sweep_with_seed(seed: u64) -> BudgetSweep {
        BudgetSweep::new(
            space(),
            Arc::new(Capped),
            Box::new(RandomSamplerFactory::new(space(), seed)),
        )
        .unwrap()
    }

    fn study_with_scores(budget: usize, scores: &[f64]) -> Study {
        let mut study = Study::new(budget, "fixed");
        for (id, &score) in scores.iter().enumerate() {
            let evaluation = Evaluation {
                score,
                fold_scores: vec![score],
                std: 0.0,
                error: None,
            };
            study.record(Trial::new(id, Configuration::default(), evaluation, Utc::now(), 0));
        }
        study.mark_completed();
        study
    }

    #[test]
    fn one_study_per_budget() {
        let studies = sweep_with_seed(42).sweep(&[10, 30, 50]).unwrap();
        assert_eq!(studies.keys().copied().collect::<Vec<_>>(), vec![10, 30, 50]);
        for (budget, study) in &studies {
            assert_eq!(study.trials.len(), *budget);
            assert!(study.is_complete());
        }
    }

    #[test]
    fn smaller_budget_is_a_prefix_of_larger() {
        let studies = sweep_with_seed(7).sweep(&[10, 30]).unwrap();
        let short = &studies[&10];
        let long = &studies[&30];
        for (a, b) in short.trials.iter().zip(&long.trials[..10]) {
            assert_eq!(a.configuration, b.configuration);
            assert_eq!(a.score, b.score);
        }
    }

    #[test]
    fn rejects_invalid_budgets() {
        let sweep = sweep_with_seed(0);
        for budgets in [vec![], vec![10, 0], vec![10, 30, 10]] {
            assert!(matches!(
                sweep.sweep(&budgets),
                Err(SweepFailure::InvalidBudgets(_))
            ));
        }
    }

    #[test]
    fn rejects_invalid_space() {
        let bad = ParameterSpace::new().add_real("x", 1.0, 0.0);
        let result = BudgetSweep::new(
            bad.clone(),
            Arc::new(Capped),
            Box::new(RandomSamplerFactory::new(bad, 0)),
        );
        assert!(matches!(result, Err(HsError::Space(_))));
    }

    #[test]
    fn aggregate_tie_prefers_smaller_budget() {
        let mut studies = BTreeMap::new();
        studies.insert(10, study_with_scores(10, &[0.5, 0.9]));
        studies.insert(30, study_with_scores(30, &[0.9, 0.2, 0.4]));
        let result = aggregate(studies).unwrap();
        assert_eq!(result.global_best_budget, 10);
        assert_eq!(result.global_best_trial().unwrap().id, 1);
    }

    #[test]
    fn aggregate_picks_highest_score() {
        let mut studies = BTreeMap::new();
        studies.insert(10, study_with_scores(10, &[0.5]));
        studies.insert(30, study_with_scores(30, &[0.7]));
        studies.insert(50, study_with_scores(50, &[0.6]));
        let result = aggregate(studies).unwrap();
        assert_eq!(result.global_best_budget, 30);
        assert_eq!(result.trend(), vec![(10, 0.5), (30, 0.7), (50, 0.6)]);
    }

    #[test]
    fn empty_study_ranks_last() {
        let mut studies = BTreeMap::new();
        studies.insert(5, study_with_scores(5, &[]));
        studies.insert(10, study_with_scores(10, &[0.0]));
        let result = aggregate(studies).unwrap();
        assert_eq!(result.global_best_budget, 10);
        assert_eq!(result.trend(), vec![(10, 0.0)]);
    }

    #[test]
    fn aggregate_of_nothing_is_an_error() {
        assert!(matches!(
            aggregate(BTreeMap::new()),
            Err(HsError::Validation(_))
        ));
    }

    /// Fails to propose once the given trial number is reached.
    struct Failing {
        limit: usize,
        next: usize,
    }

    impl Sampler for Failing {
        fn propose(&mut self) -> Result<Proposal, SamplerError> {
            if self.next >= self.limit {
                return Err(SamplerError::ProposeFailed {
                    trial_number: self.next,
                    message: "limit reached".into(),
                });
            }
            self.next += 1;
            Ok(Proposal {
                trial_number: self.next - 1,
                values: [("x".to_string(), ParameterValue::Real(0.5)), ("mode".to_string(), "A".into())]
                    .into_iter()
                    .collect(),
            })
        }

        fn report(&mut self, _proposal: &Proposal, _score: f64) -> Result<(), SamplerError> {
            Ok(())
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    struct FailingFactory;

    impl SamplerFactory for FailingFactory {
        fn create(&self, _budget: usize) -> Box<dyn Sampler> {
            Box::new(Failing { limit: 15, next: 0 })
        }
    }

    #[test]
    fn aborted_study_stops_the_sweep() {
        let sweep = BudgetSweep::new(space(), Arc::new(Capped), Box::new(FailingFactory)).unwrap();
        match sweep.sweep(&[10, 30, 50]) {
            Err(SweepFailure::Aborted { completed, aborted }) => {
                assert_eq!(completed.keys().copied().collect::<Vec<_>>(), vec![10]);
                assert_eq!(aborted.budget, 30);
                assert_eq!(aborted.study.trials.len(), 15);
            }
            other => panic!("expected an aborted sweep, got {other:?}"),
        }
    }

    #[test]
    fn unknown_global_best_budget_reads_as_none() {
        let result = sweep_with_seed(3).run(&[5]).unwrap();
        let mut value = serde_json::to_value(&result).unwrap();
        value["global_best_budget"] = serde_json::json!(77);
        let edited: SweepResult = serde_json::from_value(value).unwrap();
        assert!(edited.global_best().is_none());
        assert!(edited.global_best_trial().is_none());
        assert_eq!(edited.trend().len(), 1);
    }

    #[test]
    fn sweep_result_round_trips_through_json() {
        let result = sweep_with_seed(3).run(&[5, 10]).unwrap();
        let json = serde_json::to_string(&result).unwrap();
        let back: SweepResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.global_best_budget, result.global_best_budget);
        assert_eq!(back.per_budget.len(), 2);
        assert_eq!(back.per_budget[&10].trials.len(), 10);
    }
}

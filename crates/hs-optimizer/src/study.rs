//! Trial tracking and the budgeted study loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use hs_types::{Configuration, SamplerError};

use crate::evaluator::{Evaluation, Objective};
use crate::sampler::Sampler;
use crate::space::ParameterSpace;

/// Unique study identifier.
pub type StudyId = Uuid;

/// One evaluated configuration. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    /// Position in the study, starting at 0.
    pub id: usize,
    pub configuration: Configuration,
    pub score: f64,
    pub fold_scores: Vec<f64>,
    pub std: f64,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl Trial {
    pub fn new(
        id: usize,
        configuration: Configuration,
        evaluation: Evaluation,
        started_at: DateTime<Utc>,
        duration_ms: u64,
    ) -> Self {
        Self {
            id,
            configuration,
            score: evaluation.score,
            fold_scores: evaluation.fold_scores,
            std: evaluation.std,
            error: evaluation.error,
            started_at,
            duration_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StudyStatus {
    Running,
    Completed,
    Aborted,
}

/// A bounded search at one trial budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Study {
    pub id: StudyId,
    pub budget: usize,
    pub sampler: String,
    pub trials: Vec<Trial>,
    /// Index into `trials`.
    best_trial: Option<usize>,
    /// Best score after each trial; non-decreasing.
    pub best_history: Vec<f64>,
    pub status: StudyStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl Study {
    pub fn new(budget: usize, sampler: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            budget,
            sampler: sampler.into(),
            trials: Vec::with_capacity(budget),
            best_trial: None,
            best_history: Vec::with_capacity(budget),
            status: StudyStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            error: None,
        }
    }

    /// Append a trial and return whether it became the new best. Only a
    /// strictly higher score replaces the best, so ties keep the earliest.
    /// A NaN best is replaced by the next comparable score.
    pub fn record(&mut self, trial: Trial) -> bool {
        let improved = match self.best_trial() {
            None => true,
            Some(best) => {
                trial.score > best.score || (best.score.is_nan() && !trial.score.is_nan())
            }
        };
        if improved {
            self.best_trial = Some(self.trials.len());
        }
        self.trials.push(trial);
        if let Some(best) = self.best_score() {
            self.best_history.push(best);
        }
        improved
    }

    /// `None` for a study without trials, or one whose stored best index
    /// does not point at a trial.
    pub fn best_trial(&self) -> Option<&Trial> {
        self.best_trial.and_then(|i| self.trials.get(i))
    }

    pub fn best_score(&self) -> Option<f64> {
        self.best_trial().map(|t| t.score)
    }

    pub fn is_complete(&self) -> bool {
        self.status == StudyStatus::Completed
    }

    pub fn mark_completed(&mut self) {
        self.status = StudyStatus::Completed;
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_aborted(&mut self, error: String) {
        self.status = StudyStatus::Aborted;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }
}

/// A study that stopped early because its sampler failed. Carries every
/// trial recorded before the failure.
#[derive(Debug, Error)]
#[error("Study for budget {budget} aborted: {error}")]
pub struct AbortedStudy {
    pub budget: usize,
    pub study: Box<Study>,
    #[source]
    pub error: SamplerError,
}

/// Drives one bounded search over a space with a given objective.
pub struct StudyRunner<'a> {
    space: &'a ParameterSpace,
    objective: &'a dyn Objective,
}

impl<'a> StudyRunner<'a> {
    pub fn new(space: &'a ParameterSpace, objective: &'a dyn Objective) -> Self {
        Self { space, objective }
    }

    /// Run exactly `budget` trials with `sampler`.
    ///
    /// Each trial is proposed, materialized, evaluated, recorded and then
    /// reported back to the sampler. A sampler failure, including a proposal
    /// the space rejects, aborts the study.
    pub fn run(&self, sampler: &mut dyn Sampler, budget: usize) -> Result<Study, AbortedStudy> {
        let mut study = Study::new(budget, sampler.name());
        info!(
            "Starting study {} with budget {} ({} sampler)",
            study.id, budget, study.sampler
        );

        for id in 0..budget {
            if let Err(error) = self.step(&mut study, sampler, id) {
                study.mark_aborted(error.to_string());
                tracing::error!(
                    "Study {} aborted after {} trials: {}",
                    study.id,
                    study.trials.len(),
                    error
                );
                return Err(AbortedStudy {
                    budget,
                    study: Box::new(study),
                    error,
                });
            }
        }

        study.mark_completed();
        if let Some(best) = study.best_trial() {
            info!(
                "Study {} finished: best score {:.4} at trial {} [{}]",
                study.id, best.score, best.id, best.configuration
            );
        }
        Ok(study)
    }

    fn step(
        &self,
        study: &mut Study,
        sampler: &mut dyn Sampler,
        id: usize,
    ) -> Result<(), SamplerError> {
        let proposal = sampler.propose()?;
        let configuration = self.space.materialize(&proposal).map_err(|source| {
            SamplerError::InvalidProposal {
                trial_number: id,
                source,
            }
        })?;

        let started_at = Utc::now();
        let clock = Instant::now();
        let mut evaluation = self.objective.evaluate(&configuration);
        let duration_ms = clock.elapsed().as_millis() as u64;
        if !evaluation.score.is_finite() {
            warn!(
                "Trial {} returned non-finite score {}; recording the sentinel",
                id, evaluation.score
            );
            evaluation = Evaluation::failed(format!(
                "objective returned non-finite score {}",
                evaluation.score
            ));
        }

        let score = evaluation.score;
        debug!(
            "Trial {} scored {:.4} in {} ms [{}]",
            id, score, duration_ms, configuration
        );
        let trial = Trial::new(id, configuration, evaluation, started_at, duration_ms);
        if study.record(trial) {
            info!("Trial {} is the new best with score {:.4}", id, score);
        }

        sampler.report(&proposal, score)
    }
}

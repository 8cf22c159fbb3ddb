//! The sampler contract and the seeded random sampler.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use hs_types::{ParameterValue, SamplerError};

use crate::space::{DimensionKind, ParameterSpace};

/// A raw assignment emitted by a sampler before materialization. It may
/// carry values for dimensions that turn out to be inactive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub trial_number: usize,
    pub values: BTreeMap<String, ParameterValue>,
}

/// Proposes candidates and learns from their scores.
///
/// Adaptive samplers use `report` to steer later proposals. Every proposal is
/// reported exactly once, in proposal order.
pub trait Sampler: Send {
    fn propose(&mut self) -> Result<Proposal, SamplerError>;

    fn report(&mut self, proposal: &Proposal, score: f64) -> Result<(), SamplerError>;

    /// Human-readable sampler name.
    fn name(&self) -> &str;
}

/// Creates a fresh sampler for each study of a sweep.
pub trait SamplerFactory: Send + Sync {
    fn create(&self, budget: usize) -> Box<dyn Sampler>;
}

// ---- Random search ----

/// Independent uniform sampling across every dimension of the space,
/// log-uniform for log-scaled ranges.
#[derive(Debug, Clone)]
pub struct RandomSampler {
    space: ParameterSpace,
    rng: ChaCha8Rng,
    next_trial: usize,
    reported: usize,
}

impl RandomSampler {
    pub fn new(space: ParameterSpace, seed: u64) -> Self {
        Self {
            space,
            rng: ChaCha8Rng::seed_from_u64(seed),
            next_trial: 0,
            reported: 0,
        }
    }

    fn sample_value(rng: &mut ChaCha8Rng, kind: &DimensionKind) -> ParameterValue {
        match kind {
            DimensionKind::Categorical { choices } => {
                let idx = rng.gen_range(0..choices.len());
                ParameterValue::Categorical(choices[idx].clone())
            }
            DimensionKind::IntRange { low, high } => ParameterValue::Int(rng.gen_range(*low..=*high)),
            DimensionKind::RealRange { low, high, log } => {
                if *log {
                    let log_val: f64 = rng.gen_range(low.ln()..=high.ln());
                    ParameterValue::Real(log_val.exp().clamp(*low, *high))
                } else {
                    ParameterValue::Real(rng.gen_range(*low..=*high))
                }
            }
        }
    }
}

impl Sampler for RandomSampler {
    fn propose(&mut self) -> Result<Proposal, SamplerError> {
        let trial_number = self.next_trial;
        self.space
            .validate()
            .map_err(|e| SamplerError::ProposeFailed {
                trial_number,
                message: e.to_string(),
            })?;

        let mut values = BTreeMap::new();
        for param in self.space.parameters() {
            let value = Self::sample_value(&mut self.rng, &param.kind);
            values.insert(param.name.clone(), value);
        }

        self.next_trial += 1;
        Ok(Proposal {
            trial_number,
            values,
        })
    }

    fn report(&mut self, proposal: &Proposal, score: f64) -> Result<(), SamplerError> {
        if proposal.trial_number != self.reported || proposal.trial_number >= self.next_trial {
            return Err(SamplerError::ReportFailed {
                trial_number: proposal.trial_number,
                message: format!("expected a report for trial {}", self.reported),
            });
        }
        debug!("Trial {} reported score {:.4}", proposal.trial_number, score);
        self.reported += 1;
        Ok(())
    }

    fn name(&self) -> &str {
        "random"
    }
}

/// Builds [`RandomSampler`]s that all share one seed, so every study of a
/// sweep sees the same proposal sequence.
#[derive(Debug, Clone)]
pub struct RandomSamplerFactory {
    space: ParameterSpace,
    seed: u64,
}

impl RandomSamplerFactory {
    pub fn new(space: ParameterSpace, seed: u64) -> Self {
        Self { space, seed }
    }
}

impl SamplerFactory for RandomSamplerFactory {
    fn create(&self, budget: usize) -> Box<dyn Sampler> {
        debug!("Creating random sampler (seed {}) for budget {}", self.seed, budget);
        Box::new(RandomSampler::new(self.space.clone(), self.seed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_space() -> ParameterSpace {
        ParameterSpace::new()
            .add_categorical("booster", &["gbtree", "dart"])
            .add_int("max_depth", 3, 12)
            .add_real("eta", 0.01, 0.3)
            .add_log_real("lambda", 1e-8, 1.0)
            .add_real("rate_drop", 1e-8, 1.0)
            .when("booster", "dart")
    }

    #[test]
    fn random_sampler_respects_bounds() {
        let space = sample_space();
        let mut sampler = RandomSampler::new(space.clone(), 42);

        for i in 0..200 {
            let proposal = sampler.propose().unwrap();
            assert_eq!(proposal.trial_number, i);
            // every dimension is sampled, active or not
            assert_eq!(proposal.values.len(), 5);
            space.materialize(&proposal).unwrap();

            let depth = proposal.values["max_depth"].as_int().unwrap();
            assert!((3..=12).contains(&depth));
            let lambda = proposal.values["lambda"].as_real().unwrap();
            assert!((1e-8..=1.0).contains(&lambda));

            sampler.report(&proposal, 0.5).unwrap();
        }
    }

    #[test]
    fn log_dimension_spreads_across_decades() {
        let space = ParameterSpace::new().add_log_real("lambda", 1e-8, 1.0);
        let mut sampler = RandomSampler::new(space, 7);
        let small = (0..400)
            .map(|_| sampler.propose().unwrap().values["lambda"].as_real().unwrap())
            .filter(|v| *v < 1e-4)
            .count();
        // half of the log range lies below 1e-4
        assert!(small > 100, "only {small} samples below 1e-4");
    }

    #[test]
    fn same_seed_same_sequence() {
        let factory = RandomSamplerFactory::new(sample_space(), 3);
        let mut a = factory.create(10);
        let mut b = factory.create(30);
        for _ in 0..10 {
            assert_eq!(a.propose().unwrap(), b.propose().unwrap());
        }
    }

    #[test]
    fn out_of_order_report_fails() {
        let mut sampler = RandomSampler::new(sample_space(), 0);
        let first = sampler.propose().unwrap();
        let second = sampler.propose().unwrap();
        let err = sampler.report(&second, 0.1).unwrap_err();
        assert!(matches!(err, SamplerError::ReportFailed { trial_number: 1, .. }));
        sampler.report(&first, 0.1).unwrap();
        sampler.report(&second, 0.1).unwrap();
    }

    #[test]
    fn invalid_space_fails_to_propose() {
        let space = ParameterSpace::new().add_int("depth", 5, 1);
        let mut sampler = RandomSampler::new(space, 0);
        assert!(matches!(
            sampler.propose(),
            Err(SamplerError::ProposeFailed { trial_number: 0, .. })
        ));
    }
}

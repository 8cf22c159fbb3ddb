//! Conditional search space definitions.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use hs_types::{Configuration, ParameterValue, SpaceError};

use crate::sampler::Proposal;

/// Activation condition: the named categorical dimension must hold `value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guard {
    pub dimension: String,
    pub value: String,
}

/// Describes the domain of a dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DimensionKind {
    /// Finite set of string choices.
    Categorical { choices: Vec<String> },
    /// Integer range [low, high] inclusive.
    IntRange { low: i64, high: i64 },
    /// Continuous range [low, high]; sampled in log-space when `log` is set.
    RealRange { low: f64, high: f64, log: bool },
}

/// A single dimension in the search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    pub name: String,
    pub kind: DimensionKind,
    /// `None` for unconditional dimensions.
    pub guard: Option<Guard>,
}

impl ParameterDef {
    fn contains(&self, value: &ParameterValue) -> bool {
        match (&self.kind, value) {
            (DimensionKind::Categorical { choices }, ParameterValue::Categorical(v)) => {
                choices.iter().any(|c| c == v)
            }
            (DimensionKind::IntRange { low, high }, ParameterValue::Int(v)) => {
                (*low..=*high).contains(v)
            }
            (DimensionKind::RealRange { low, high, .. }, value) => match value.as_real() {
                Some(v) => v.is_finite() && *low <= v && v <= *high,
                None => false,
            },
            _ => false,
        }
    }
}

/// An ordered list of dimensions, some of them conditional on an
/// earlier-declared categorical dimension.
///
/// Built with a chain of `add_*` calls; [`ParameterSpace::when`] attaches a
/// guard to the most recently added dimension. Call
/// [`ParameterSpace::validate`] before sampling from a hand-built space.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpace {
    parameters: Vec<ParameterDef>,
}

impl ParameterSpace {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, name: impl Into<String>, kind: DimensionKind) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind,
            guard: None,
        });
        self
    }

    pub fn add_categorical(self, name: impl Into<String>, choices: &[&str]) -> Self {
        let choices = choices.iter().map(|c| c.to_string()).collect();
        self.push(name, DimensionKind::Categorical { choices })
    }

    pub fn add_int(self, name: impl Into<String>, low: i64, high: i64) -> Self {
        self.push(name, DimensionKind::IntRange { low, high })
    }

    pub fn add_real(self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.push(
            name,
            DimensionKind::RealRange {
                low,
                high,
                log: false,
            },
        )
    }

    pub fn add_log_real(self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.push(
            name,
            DimensionKind::RealRange {
                low,
                high,
                log: true,
            },
        )
    }

    /// Make the last added dimension active only when `dimension == value`.
    pub fn when(mut self, dimension: impl Into<String>, value: impl Into<String>) -> Self {
        if let Some(last) = self.parameters.last_mut() {
            last.guard = Some(Guard {
                dimension: dimension.into(),
                value: value.into(),
            });
        }
        self
    }

    pub fn parameters(&self) -> &[ParameterDef] {
        &self.parameters
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Check names, bounds, choices and guards.
    pub fn validate(&self) -> Result<(), SpaceError> {
        let mut seen: HashSet<&str> = HashSet::new();

        for (pos, def) in self.parameters.iter().enumerate() {
            if !seen.insert(def.name.as_str()) {
                return Err(SpaceError::DuplicateDimension {
                    name: def.name.clone(),
                });
            }

            match &def.kind {
                DimensionKind::Categorical { choices } => {
                    if choices.is_empty() {
                        return Err(SpaceError::EmptyChoices {
                            name: def.name.clone(),
                        });
                    }
                }
                DimensionKind::IntRange { low, high } => {
                    if low > high {
                        return Err(SpaceError::InvalidBounds {
                            name: def.name.clone(),
                            low: *low as f64,
                            high: *high as f64,
                        });
                    }
                }
                DimensionKind::RealRange { low, high, log } => {
                    if !low.is_finite() || !high.is_finite() || low > high {
                        return Err(SpaceError::InvalidBounds {
                            name: def.name.clone(),
                            low: *low,
                            high: *high,
                        });
                    }
                    if *log && *low <= 0.0 {
                        return Err(SpaceError::InvalidLogBounds {
                            name: def.name.clone(),
                        });
                    }
                }
            }

            if let Some(guard) = &def.guard {
                let governing = self.parameters[..pos]
                    .iter()
                    .find(|p| p.name == guard.dimension)
                    .ok_or_else(|| SpaceError::UnknownGuard {
                        name: def.name.clone(),
                        guard: guard.dimension.clone(),
                    })?;
                match &governing.kind {
                    DimensionKind::Categorical { choices } => {
                        if !choices.contains(&guard.value) {
                            return Err(SpaceError::GuardValueNotAllowed {
                                name: def.name.clone(),
                                guard: guard.dimension.clone(),
                                value: guard.value.clone(),
                            });
                        }
                    }
                    _ => {
                        return Err(SpaceError::GuardNotCategorical {
                            name: def.name.clone(),
                            guard: guard.dimension.clone(),
                        })
                    }
                }
            }
        }

        Ok(())
    }

    /// Resolve a proposal into a configuration holding exactly the active
    /// dimensions.
    ///
    /// Unconditional dimensions are resolved first, then conditional ones in
    /// declaration order against what has been resolved so far. A guard on an
    /// inactive dimension never holds. Proposed values for inactive
    /// dimensions are dropped.
    pub fn materialize(&self, proposal: &Proposal) -> Result<Configuration, SpaceError> {
        let mut resolved: BTreeMap<String, ParameterValue> = BTreeMap::new();

        let (unconditional, conditional): (Vec<&ParameterDef>, Vec<&ParameterDef>) =
            self.parameters.iter().partition(|p| p.guard.is_none());

        for def in unconditional {
            let value = Self::resolve(def, &proposal.values)?;
            resolved.insert(def.name.clone(), value);
        }

        for def in conditional {
            let active = def.guard.as_ref().is_some_and(|guard| {
                resolved
                    .get(&guard.dimension)
                    .and_then(ParameterValue::as_categorical)
                    == Some(guard.value.as_str())
            });
            if active {
                let value = Self::resolve(def, &proposal.values)?;
                resolved.insert(def.name.clone(), value);
            }
        }

        Ok(resolved.into_iter().collect())
    }

    fn resolve(
        def: &ParameterDef,
        values: &BTreeMap<String, ParameterValue>,
    ) -> Result<ParameterValue, SpaceError> {
        let value = values.get(&def.name).ok_or_else(|| SpaceError::MissingValue {
            name: def.name.clone(),
        })?;
        if !def.contains(value) {
            return Err(SpaceError::OutOfDomain {
                name: def.name.clone(),
                value: value.to_string(),
            });
        }
        Ok(value.clone())
    }
}

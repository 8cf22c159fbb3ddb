//! Concrete parameter values and materialized configurations.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::ModelError;

/// A concrete parameter value produced by materializing a proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Int(i64),
    Real(f64),
    Categorical(String),
}

impl ParameterValue {
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Self::Real(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            Self::Categorical(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_categorical(&self) -> Option<&str> {
        match self {
            Self::Categorical(v) => Some(v),
            _ => None,
        }
    }
}

impl std::fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Real(v) => write!(f, "{v}"),
            Self::Categorical(v) => write!(f, "{v}"),
        }
    }
}

impl From<f64> for ParameterValue {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<i64> for ParameterValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for ParameterValue {
    fn from(v: &str) -> Self {
        Self::Categorical(v.to_string())
    }
}

/// An immutable name → value mapping for one trial.
///
/// Keys are ordered so exports and logs list parameters deterministically.
/// Only keys that were active at materialization time are present; readers
/// must use the fallible accessors rather than assume a key exists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Configuration {
    values: BTreeMap<String, ParameterValue>,
}

impl Configuration {
    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParameterValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Real-valued parameter (integers are widened).
    pub fn real(&self, name: &str) -> Result<f64, ModelError> {
        self.require(name)?
            .as_real()
            .ok_or_else(|| ModelError::WrongType {
                name: name.to_string(),
                expected: "real".to_string(),
            })
    }

    pub fn int(&self, name: &str) -> Result<i64, ModelError> {
        self.require(name)?
            .as_int()
            .ok_or_else(|| ModelError::WrongType {
                name: name.to_string(),
                expected: "integer".to_string(),
            })
    }

    pub fn categorical(&self, name: &str) -> Result<&str, ModelError> {
        self.require(name)?
            .as_categorical()
            .ok_or_else(|| ModelError::WrongType {
                name: name.to_string(),
                expected: "categorical".to_string(),
            })
    }

    fn require(&self, name: &str) -> Result<&ParameterValue, ModelError> {
        self.values.get(name).ok_or_else(|| ModelError::MissingParameter {
            name: name.to_string(),
        })
    }
}

impl FromIterator<(String, ParameterValue)> for Configuration {
    fn from_iter<I: IntoIterator<Item = (String, ParameterValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl std::fmt::Display for Configuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (name, value) in &self.values {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{name}={value}")?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Configuration {
        [
            ("booster".to_string(), ParameterValue::from("dart")),
            ("max_depth".to_string(), ParameterValue::from(6i64)),
            ("eta".to_string(), ParameterValue::from(0.1)),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn typed_accessors() {
        let config = sample();
        assert_eq!(config.categorical("booster").unwrap(), "dart");
        assert_eq!(config.int("max_depth").unwrap(), 6);
        assert_eq!(config.real("eta").unwrap(), 0.1);
        // integers widen to reals
        assert_eq!(config.real("max_depth").unwrap(), 6.0);
    }

    #[test]
    fn missing_key_is_an_error() {
        let err = sample().real("rate_drop").unwrap_err();
        assert_eq!(
            err,
            ModelError::MissingParameter {
                name: "rate_drop".into()
            }
        );
    }

    #[test]
    fn wrong_type_is_an_error() {
        let err = sample().int("booster").unwrap_err();
        assert!(matches!(err, ModelError::WrongType { .. }));
    }

    #[test]
    fn display_is_ordered() {
        assert_eq!(sample().to_string(), "booster=dart, eta=0.1, max_depth=6");
    }

    #[test]
    fn serializes_as_flat_map() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["booster"], "dart");
        assert_eq!(json["max_depth"], 6);
        let back: Configuration = serde_json::from_value(json).unwrap();
        assert_eq!(back, sample());
    }
}

//! Immutable feature/label table shared by every evaluation in a sweep.

use serde::{Deserialize, Serialize};

use crate::errors::{DataError, HsResult};

/// A dense feature matrix with integer class labels `0..n_classes`.
///
/// Construction validates the table once; afterwards the dataset is
/// read-only and is shared across folds, trials and budgets behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    features: Vec<Vec<f64>>,
    labels: Vec<usize>,
    n_features: usize,
    n_classes: usize,
}

impl Dataset {
    /// Build a dataset, inferring the class count from the largest label.
    ///
    /// Labels must be dense ids: a label at or above the sample count is
    /// rejected, since every class id below it would need a slot.
    pub fn new(features: Vec<Vec<f64>>, labels: Vec<usize>) -> HsResult<Self> {
        let n_samples = labels.len();
        if let Some((row, &label)) = labels.iter().enumerate().find(|(_, l)| **l >= n_samples) {
            return Err(DataError::SparseLabel {
                row,
                label,
                n_samples,
            }
            .into());
        }
        let n_classes = labels.iter().copied().max().map_or(0, |m| m + 1);
        Self::with_classes(features, labels, n_classes)
    }

    /// Build a dataset with an explicit class count (some classes may be
    /// absent from the labels).
    pub fn with_classes(
        features: Vec<Vec<f64>>,
        labels: Vec<usize>,
        n_classes: usize,
    ) -> HsResult<Self> {
        if features.is_empty() || labels.is_empty() {
            return Err(DataError::Empty.into());
        }
        if features.len() != labels.len() {
            return Err(DataError::LengthMismatch {
                features: features.len(),
                labels: labels.len(),
            }
            .into());
        }

        let n_features = features[0].len();
        if n_features == 0 {
            return Err(DataError::Empty.into());
        }
        for (row, values) in features.iter().enumerate() {
            if values.len() != n_features {
                return Err(DataError::RaggedRow {
                    row,
                    expected: n_features,
                    got: values.len(),
                }
                .into());
            }
        }
        for (row, &label) in labels.iter().enumerate() {
            if label >= n_classes {
                return Err(DataError::LabelOutOfRange {
                    row,
                    label,
                    n_classes,
                }
                .into());
            }
        }

        Ok(Self {
            features,
            labels,
            n_features,
            n_classes,
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    /// Feature vector of one row.
    pub fn row(&self, index: usize) -> &[f64] {
        &self.features[index]
    }

    pub fn label(&self, index: usize) -> usize {
        self.labels[index]
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Number of rows per class, indexed by label.
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.n_classes];
        for &label in &self.labels {
            counts[label] += 1;
        }
        counts
    }

    /// Row indices grouped by class label.
    pub fn indices_by_class(&self) -> Vec<Vec<usize>> {
        let mut groups = vec![Vec::new(); self.n_classes];
        for (i, &label) in self.labels.iter().enumerate() {
            groups[label].push(i);
        }
        groups
    }
}

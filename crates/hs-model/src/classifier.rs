//! Contract between the objective evaluator and a trainable classifier.

use hs_types::{Configuration, Dataset, ModelError};

/// A multi-class classifier trained on a subset of a shared dataset.
pub trait Classifier: Send {
    /// Train on the given row indices. The dataset is read-only.
    fn fit(&mut self, dataset: &Dataset, rows: &[usize]) -> Result<(), ModelError>;

    /// Predict the class label of one feature vector.
    fn predict(&self, features: &[f64]) -> Result<usize, ModelError>;
}

/// Instantiates classifiers from materialized configurations.
///
/// `build` fails with a [`ModelError`] when the configuration cannot be
/// turned into a trainable model.
pub trait ModelFactory: Send + Sync {
    fn build(
        &self,
        configuration: &Configuration,
        n_classes: usize,
        seed: u64,
    ) -> Result<Box<dyn Classifier>, ModelError>;

    /// Human-readable model family name.
    fn name(&self) -> &str;
}

/// Fraction of `rows` whose label the model predicts correctly.
pub fn accuracy(
    model: &dyn Classifier,
    dataset: &Dataset,
    rows: &[usize],
) -> Result<f64, ModelError> {
    if rows.is_empty() {
        return Ok(0.0);
    }
    let mut correct = 0usize;
    for &row in rows {
        if model.predict(dataset.row(row))? == dataset.label(row) {
            correct += 1;
        }
    }
    Ok(correct as f64 / rows.len() as f64)
}

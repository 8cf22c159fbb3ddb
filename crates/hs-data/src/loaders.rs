use std::path::Path;

use hs_types::{DataError, Dataset, HsResult};

/// Header names recognised as the label column (case-insensitive).
const LABEL_HEADERS: &[&str] = &["label", "class", "target", "y"];

/// Loads a numeric feature table with an integer label column from CSV.
#[derive(Debug, Clone)]
pub struct CsvLoader {
    has_headers: bool,
    label_column: Option<String>,
}

impl CsvLoader {
    pub fn new() -> Self {
        Self {
            has_headers: true,
            label_column: None,
        }
    }

    pub fn without_headers(mut self) -> Self {
        self.has_headers = false;
        self
    }

    /// Use a specific header as the label column instead of auto-detection.
    pub fn with_label_column(mut self, name: impl Into<String>) -> Self {
        self.label_column = Some(name.into());
        self
    }

    /// Load a dataset from a CSV file. Without headers the last column holds
    /// the label.
    pub fn load<P: AsRef<Path>>(&self, file_path: P) -> HsResult<Dataset> {
        use csv::ReaderBuilder;

        let path = file_path.as_ref();
        tracing::info!("Loading CSV dataset from: {}", path.display());

        let mut rdr = ReaderBuilder::new()
            .has_headers(self.has_headers)
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| DataError::LoadingFailed {
                message: format!("Failed to open CSV file {}: {}", path.display(), e),
            })?;

        let headers = if self.has_headers {
            Some(
                rdr.headers()
                    .map_err(|e| DataError::LoadingFailed {
                        message: format!("Failed to read CSV headers: {}", e),
                    })?
                    .clone(),
            )
        } else {
            None
        };

        if let Some(ref h) = headers {
            tracing::debug!("CSV headers: {:?}", h);
        }

        let mut label_idx = match &headers {
            Some(h) => Some(self.detect_label_column(h)?),
            None => None,
        };

        let mut features = Vec::new();
        let mut labels = Vec::new();
        let first_line = if self.has_headers { 2 } else { 1 };

        for (offset, result) in rdr.records().enumerate() {
            let line = offset + first_line;
            let record = result.map_err(|e| DataError::LoadingFailed {
                message: format!("Failed to read CSV record at line {}: {}", line, e),
            })?;
            if record.len() < 2 {
                return Err(DataError::ParseError {
                    line,
                    message: format!("expected at least 2 columns, got {}", record.len()),
                }
                .into());
            }

            let label_idx = *label_idx.get_or_insert(record.len() - 1);
            let mut row = Vec::with_capacity(record.len() - 1);
            for (i, field) in record.iter().enumerate() {
                if i == label_idx {
                    labels.push(parse_label(field, line)?);
                } else {
                    row.push(parse_feature(field, line)?);
                }
            }
            features.push(row);
        }

        let dataset = Dataset::new(features, labels)?;
        tracing::info!(
            "Loaded {} rows with {} features and {} classes",
            dataset.len(),
            dataset.n_features(),
            dataset.n_classes()
        );
        Ok(dataset)
    }

    fn detect_label_column(&self, headers: &csv::StringRecord) -> HsResult<usize> {
        if let Some(name) = &self.label_column {
            return headers
                .iter()
                .position(|h| h.eq_ignore_ascii_case(name))
                .ok_or_else(|| {
                    DataError::LoadingFailed {
                        message: format!("Label column '{}' not found in CSV headers", name),
                    }
                    .into()
                });
        }

        let detected = headers
            .iter()
            .position(|h| LABEL_HEADERS.contains(&h.to_lowercase().as_str()));
        Ok(detected.unwrap_or_else(|| headers.len().saturating_sub(1)))
    }
}

impl Default for CsvLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_feature(field: &str, line: usize) -> Result<f64, DataError> {
    field.parse::<f64>().map_err(|_| DataError::ParseError {
        line,
        message: format!("invalid feature value '{}'", field),
    })
}

/// Labels may be written as integers or as integral floats ("2.0").
fn parse_label(field: &str, line: usize) -> Result<usize, DataError> {
    if let Ok(label) = field.parse::<usize>() {
        return Ok(label);
    }
    match field.parse::<f64>() {
        Ok(v) if v >= 0.0 && v.fract() == 0.0 => Ok(v as usize),
        _ => Err(DataError::ParseError {
            line,
            message: format!("invalid class label '{}'", field),
        }),
    }
}

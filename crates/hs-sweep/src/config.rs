//! Sweep configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::info;

use hs_data::{CsvLoader, SyntheticSpec};
use hs_model::DEFAULT_N_ESTIMATORS;
use hs_types::{config_error, Dataset, HsResult};

/// Environment variable naming the JSON configuration file.
pub const CONFIG_ENV: &str = "HS_SWEEP_CONFIG";
/// Environment variable overriding the export directory.
pub const OUTPUT_DIR_ENV: &str = "HS_OUTPUT_DIR";

/// Where the sweep's dataset comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DatasetSource {
    Synthetic(SyntheticSpec),
    Csv {
        path: PathBuf,
        #[serde(default)]
        label_column: Option<String>,
    },
}

impl Default for DatasetSource {
    fn default() -> Self {
        Self::Synthetic(SyntheticSpec::default())
    }
}

impl DatasetSource {
    pub fn load(&self) -> HsResult<Dataset> {
        match self {
            Self::Synthetic(spec) => spec.generate(),
            Self::Csv { path, label_column } => {
                let loader = match label_column {
                    Some(name) => CsvLoader::new().with_label_column(name.clone()),
                    None => CsvLoader::new(),
                };
                loader.load(path)
            }
        }
    }
}

/// Top-level configuration for a budget sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Trial budgets, run in this order.
    pub budgets: Vec<usize>,
    pub n_folds: usize,
    /// Seed of the stratified fold assignment and of per-fold model seeds.
    pub fold_seed: u64,
    /// Seed shared by the sampler of every budget.
    pub sampler_seed: u64,
    /// Boosting rounds per model.
    pub n_estimators: usize,
    pub dataset: DatasetSource,
    pub output_dir: PathBuf,
    /// Write CSV/JSON exports after the sweep.
    pub export: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            budgets: vec![10, 30, 50, 100, 150],
            n_folds: 5,
            fold_seed: 42,
            sampler_seed: 42,
            n_estimators: DEFAULT_N_ESTIMATORS,
            dataset: DatasetSource::default(),
            output_dir: PathBuf::from("hs-output"),
            export: true,
        }
    }
}

impl SweepConfig {
    pub fn with_budgets(mut self, budgets: Vec<usize>) -> Self {
        self.budgets = budgets;
        self
    }

    pub fn with_folds(mut self, n_folds: usize, seed: u64) -> Self {
        self.n_folds = n_folds;
        self.fold_seed = seed;
        self
    }

    pub fn with_sampler_seed(mut self, seed: u64) -> Self {
        self.sampler_seed = seed;
        self
    }

    pub fn with_estimators(mut self, n: usize) -> Self {
        self.n_estimators = n;
        self
    }

    pub fn with_dataset(mut self, dataset: DatasetSource) -> Self {
        self.dataset = dataset;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_export(mut self, export: bool) -> Self {
        self.export = export;
        self
    }

    /// Parse a JSON configuration file. Missing keys take their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> HsResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| config_error!("Invalid config file {}: {}", path.display(), e))?;
        info!("Loaded sweep configuration from {}", path.display());
        Ok(config)
    }

    /// Resolve the configuration from an explicit path, else the
    /// `HS_SWEEP_CONFIG` file, else defaults; then apply environment
    /// overrides and validate.
    pub fn resolve(path: Option<PathBuf>) -> HsResult<Self> {
        let path = path.or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let config = config.with_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(OUTPUT_DIR_ENV).filter(|d| !d.is_empty()) {
            self.output_dir = PathBuf::from(dir);
        }
        self
    }

    pub fn validate(&self) -> HsResult<()> {
        if self.budgets.is_empty() {
            return Err(config_error!("at least one budget is required"));
        }
        let mut seen = HashSet::new();
        for &budget in &self.budgets {
            if budget == 0 {
                return Err(config_error!("budgets must be positive"));
            }
            if !seen.insert(budget) {
                return Err(config_error!("budget {} is listed twice", budget));
            }
        }
        if self.n_folds < 2 {
            return Err(config_error!("n_folds must be >= 2, got {}", self.n_folds));
        }
        if self.n_estimators == 0 {
            return Err(config_error!("n_estimators must be >= 1"));
        }
        Ok(())
    }
}

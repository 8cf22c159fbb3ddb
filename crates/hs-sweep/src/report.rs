//! Exports and summaries of sweep results.
//!
//! Each study's trial history goes to `trials_<budget>.csv`, the
//! best-score-per-budget series to `trend.csv`, and the whole result to
//! `sweep_result.json`.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use hs_optimizer::{ParameterSpace, Study, SweepResult};
use hs_types::{HsResult, ParameterValue};

pub const TREND_FILE: &str = "trend.csv";
pub const RESULT_FILE: &str = "sweep_result.json";

pub fn trials_file_name(budget: usize) -> String {
    format!("trials_{budget}.csv")
}

/// Export form of a value. Reals always carry a decimal point so an integral
/// real stays distinguishable from an integer.
fn export_value(value: &ParameterValue) -> String {
    match value {
        ParameterValue::Real(v) => format!("{v:?}"),
        other => other.to_string(),
    }
}

/// Write one row per trial. Parameter columns follow the space's declaration
/// order; inactive parameters are left empty.
pub fn write_trials_csv(study: &Study, space: &ParameterSpace, path: &Path) -> HsResult<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    let names: Vec<&str> = space.parameters().iter().map(|p| p.name.as_str()).collect();
    let mut header = vec!["trial", "score", "best_so_far", "std", "duration_ms", "error"];
    header.extend(names.iter().copied());
    wtr.write_record(&header)?;

    for (trial, best) in study.trials.iter().zip(&study.best_history) {
        let mut row = vec![
            trial.id.to_string(),
            trial.score.to_string(),
            best.to_string(),
            trial.std.to_string(),
            trial.duration_ms.to_string(),
            trial.error.clone().unwrap_or_default(),
        ];
        row.extend(names.iter().map(|name| {
            trial
                .configuration
                .get(name)
                .map(export_value)
                .unwrap_or_default()
        }));
        wtr.write_record(&row)?;
    }

    wtr.flush()?;
    Ok(())
}

/// Write `budget,best_score,best_trial` rows in ascending budget order.
pub fn write_trend_csv(result: &SweepResult, path: &Path) -> HsResult<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(["budget", "best_score", "best_trial"])?;
    for (budget, score) in result.trend() {
        let best_trial = result.per_budget[&budget]
            .best_trial()
            .map(|t| t.id.to_string())
            .unwrap_or_default();
        wtr.write_record([budget.to_string(), score.to_string(), best_trial])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_json(result: &SweepResult, path: &Path) -> HsResult<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, result)?;
    writer.flush()?;
    Ok(())
}

/// Write every per-study CSV for the given studies into `dir`.
pub fn export_studies<'a, I>(studies: I, space: &ParameterSpace, dir: &Path) -> HsResult<Vec<PathBuf>>
where
    I: IntoIterator<Item = &'a Study>,
{
    fs::create_dir_all(dir)?;
    let mut written = Vec::new();
    for study in studies {
        let path = dir.join(trials_file_name(study.budget));
        write_trials_csv(study, space, &path)?;
        written.push(path);
    }
    Ok(written)
}

/// Write all exports for a finished sweep and return the created paths.
pub fn export(result: &SweepResult, space: &ParameterSpace, dir: &Path) -> HsResult<Vec<PathBuf>> {
    let mut written = export_studies(result.per_budget.values(), space, dir)?;

    let trend = dir.join(TREND_FILE);
    write_trend_csv(result, &trend)?;
    written.push(trend);

    let json = dir.join(RESULT_FILE);
    write_json(result, &json)?;
    written.push(json);

    info!("Exported {} files to {}", written.len(), dir.display());
    Ok(written)
}

/// Log each budget's best parameters and the global best.
pub fn log_summary(result: &SweepResult) {
    for (budget, study) in &result.per_budget {
        match study.best_trial() {
            Some(best) => info!(
                "Budget {:>4}: best accuracy {:.4} (trial {}) [{}]",
                budget, best.score, best.id, best.configuration
            ),
            None => info!("Budget {:>4}: no trials", budget),
        }
    }

    let trend: Vec<String> = result
        .trend()
        .iter()
        .map(|(budget, score)| format!("{budget}={score:.4}"))
        .collect();
    info!("Best score by budget: {}", trend.join(", "));

    if let Some(best) = result.global_best_trial() {
        info!(
            "Global best at budget {}: accuracy {:.4} [{}]",
            result.global_best_budget, best.score, best.configuration
        );
    }
}

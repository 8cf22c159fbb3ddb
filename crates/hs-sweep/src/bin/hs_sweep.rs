use std::path::PathBuf;

use hs_sweep::{booster_space, report, run_sweep, SweepConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hs_sweep=info,hs_optimizer=info".into()),
        )
        .init();

    let config = SweepConfig::resolve(std::env::args_os().nth(1).map(PathBuf::from))?;
    let result = run_sweep(&config)?;

    report::log_summary(&result);
    if config.export {
        report::export(&result, &booster_space(), &config.output_dir)?;
    }

    Ok(())
}

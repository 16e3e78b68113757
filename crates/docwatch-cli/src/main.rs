mod bootstrap_helpers;
mod cli_args;
mod config;
mod runtime;

use anyhow::Result;
use clap::Parser;

use crate::bootstrap_helpers::init_tracing;
use crate::cli_args::Cli;
use crate::config::DocwatchConfig;
use crate::runtime::run_docwatch;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();
    let config = DocwatchConfig::from_cli(cli)?;
    tracing::info!(
        bind = %config.bind,
        monitors = config.monitors.len(),
        default_interval_ms =
            u64::try_from(config.default_interval.as_millis()).unwrap_or(u64::MAX),
        "starting docwatch"
    );
    run_docwatch(config).await
}

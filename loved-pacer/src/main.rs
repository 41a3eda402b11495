//! Paced queue probe.
//!
//! Loads the limiter configuration, pushes a batch of probe jobs through the
//! queue and prints when each one started, so the configured interval can be
//! checked against what the queue actually does.

use loved_limiter::PacedJobClient;

mod cli;
mod config_helpers;
mod probe;
mod tracing_setup;

use cli::CliArgs;
use config_helpers::{load_config, queue_from_config};
use tracing_setup::install_tracing_from_config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse()?;

    if args.help_requested {
        CliArgs::print_help();
        return Ok(());
    }

    // Resolve config path: CLI > environment variable
    let config_path = args
        .config_path
        .clone()
        .or_else(|| std::env::var("LOVED_CONFIG_PATH").ok());

    let config = load_config(config_path.as_deref())?;
    install_tracing_from_config(&config.logging);

    tracing::info!(
        config_path = ?config_path,
        min_interval_ms = config.limiter.min_interval_ms,
        concurrency = config.limiter.concurrency,
        jobs = args.jobs,
        work_ms = probe::millis(args.work),
        "starting probe batch"
    );

    let queue = queue_from_config(&config.limiter)?;
    let client = PacedJobClient::new(queue);

    let report = probe::run(&client, args.jobs, args.work).await?;

    tracing::info!(
        elapsed_ms = report.elapsed_ms,
        smallest_gap_ms = ?report.smallest_gap_ms,
        failed = report.stats.failed,
        "probe batch finished"
    );
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}

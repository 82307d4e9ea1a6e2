//! Snapshot Rotator - Main entry point
//!
//! Runs one backup batch from a configuration file and exits.

use anyhow::{Context, Result};
use clap::Parser;
use snapshot_rotator::{
    config::Config, notify::MailNotifier, rsync::RsyncCommand, utils, utils::logger::RunLog, Batch,
    BackupError,
};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Load configuration
    let config = Config::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    // Initialize logging
    let run_log = RunLog::create(&config.general.log_dir, chrono::Local::now())
        .with_context(|| format!("creating log file in {}", config.general.log_dir.display()))?;
    let log_level = args.log_level.as_deref().unwrap_or(&config.general.log_level);
    utils::logger::init(log_level, run_log.clone())?;

    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string());

    tracing::info!(
        "Starting snapshot-rotator v{} on {} ({} jobs, log: {})",
        env!("CARGO_PKG_VERSION"),
        host,
        config.jobs.len(),
        run_log.path().map(|p| p.display().to_string()).unwrap_or_default()
    );

    let client = RsyncCommand::new(&config.general.rsync_path)
        .with_timeout(config.general.transfer_timeout());
    let notifier = MailNotifier::new(config.smtp.clone());
    let batch = Batch::new(config, client, notifier, run_log, host);

    match batch.run().await {
        Ok(_) => Ok(ExitCode::SUCCESS),
        Err(BackupError::Mount(_)) => Ok(ExitCode::from(1)),
        Err(e) => Err(e.into()),
    }
}

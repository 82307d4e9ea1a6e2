//! Runs every configured job in order and reports the outcome.

use super::{BackupRun, JobRunner};
use crate::config::Config;
use crate::fs::mount::is_mount_point;
use crate::notify::{BatchReport, Notifier};
use crate::rsync::RemoteSync;
use crate::utils::errors::{BackupError, Result};
use crate::utils::format::{format_duration, format_megabytes};
use crate::utils::logger::RunLog;
use std::time::Instant;
use tracing::{error, info, warn};

/// Totals across all jobs of one batch
#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub runs: Vec<BackupRun>,
    pub total_bytes: u64,
    /// False once any job or module failed
    pub happy: bool,
}

/// One execution of the whole configuration
pub struct Batch<C, N> {
    config: Config,
    client: C,
    notifier: N,
    run_log: RunLog,
    host: String,
}

impl<C: RemoteSync, N: Notifier> Batch<C, N> {
    pub fn new(config: Config, client: C, notifier: N, run_log: RunLog, host: impl Into<String>) -> Self {
        Self {
            config,
            client,
            notifier,
            run_log,
            host: host.into(),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Run all jobs sequentially.
    ///
    /// Only an unmounted backup volume fails the batch; everything else is
    /// recorded in the summary and reflected in the report's happy flag.
    pub async fn run(&self) -> Result<BatchSummary> {
        let start_time = Instant::now();
        let general = &self.config.general;

        if general.mount_check && !is_mount_point(&general.backup_folder) {
            error!("!! backup point {} not mounted", general.backup_folder.display());
            self.send_report(false, 0).await;
            return Err(BackupError::Mount(general.backup_folder.clone()));
        }

        let runner = JobRunner::new(&self.client, &general.backup_folder, general.purge_ceiling);
        let mut summary = BatchSummary {
            runs: Vec::with_capacity(self.config.jobs.len()),
            total_bytes: 0,
            happy: true,
        };

        for job in &self.config.jobs {
            let run = runner.run(job).await;
            summary.total_bytes += run.subtotal;
            summary.happy &= run.is_happy();
            summary.runs.push(run);
        }

        info!(
            bytes = summary.total_bytes,
            happy = summary.happy,
            "Batch backup finished on \"{}\". Total size was {} ({})",
            self.host,
            format_megabytes(summary.total_bytes),
            format_duration(start_time.elapsed().as_secs())
        );

        self.send_report(summary.happy, summary.total_bytes).await;
        Ok(summary)
    }

    async fn send_report(&self, happy: bool, total_bytes: u64) {
        let report = BatchReport {
            host: self.host.clone(),
            happy,
            total_bytes,
            body: self.run_log.contents(),
        };

        if let Err(e) = self.notifier.notify(&report).await {
            warn!("Failed to send batch report: {}", e);
        }
    }
}

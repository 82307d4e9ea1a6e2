//! Backup job executor - runs one configured job end to end.
//!
//! A job lists the modules its host exports, then for each module rotates
//! the generation ring and syncs into the new generation 0. A failure on
//! one module is logged and the job moves on to the next; only a missing
//! backup root or a failed listing stops the whole job.

pub mod batch;

pub use batch::{Batch, BatchSummary};

use crate::config::JobConfig;
use crate::fs::generation::GenerationRing;
use crate::rsync::{Endpoint, RemoteSync, SyncRequest};
use crate::utils::errors::{BackupError, Result};
use crate::utils::format::{format_duration, format_megabytes};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info};

/// Outcome of one module within a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetStatus {
    Synced { bytes: u64 },
    Failed { error: String },
}

#[derive(Debug, Clone)]
pub struct TargetOutcome {
    pub folder: String,
    pub status: TargetStatus,
}

/// Result of running one job
#[derive(Debug, Clone)]
pub struct BackupRun {
    pub job: String,
    /// Bytes reported by every successful sync in this job
    pub subtotal: u64,
    /// Per-module results, in discovery order
    pub targets: Vec<TargetOutcome>,
    /// Set when the job stopped before reaching any module
    pub error: Option<String>,
    pub duration_secs: u64,
}

impl BackupRun {
    fn new(job: &str) -> Self {
        Self {
            job: job.to_string(),
            subtotal: 0,
            targets: Vec::new(),
            error: None,
            duration_secs: 0,
        }
    }

    pub fn is_happy(&self) -> bool {
        self.error.is_none()
            && self
                .targets
                .iter()
                .all(|t| matches!(t.status, TargetStatus::Synced { .. }))
    }

    pub fn failed_targets(&self) -> usize {
        self.targets
            .iter()
            .filter(|t| matches!(t.status, TargetStatus::Failed { .. }))
            .count()
    }
}

/// Runs jobs against a [`RemoteSync`] client below one backup root
pub struct JobRunner<'a, C> {
    client: &'a C,
    backup_root: &'a Path,
    purge_ceiling: u32,
}

impl<'a, C: RemoteSync> JobRunner<'a, C> {
    pub fn new(client: &'a C, backup_root: &'a Path, purge_ceiling: u32) -> Self {
        Self {
            client,
            backup_root,
            purge_ceiling,
        }
    }

    /// Directory holding every generation of every module of `job`
    pub fn target_path(&self, job: &JobConfig) -> PathBuf {
        self.backup_root.join(&job.name)
    }

    /// Execute a job. Never fails as a whole; problems end up in the returned run.
    pub async fn run(&self, job: &JobConfig) -> BackupRun {
        let start_time = Instant::now();
        let mut run = BackupRun::new(&job.name);

        info!(job = %job.name, "*** Job \"{}\" begun ***", job.name);

        let target_path = self.target_path(job);
        if let Err(e) = self.prepare(&target_path).await {
            error!(job = %job.name, "!! {}", e);
            run.error = Some(e.to_string());
            run.duration_secs = start_time.elapsed().as_secs();
            return run;
        }

        let endpoint = Endpoint::from_job(job);
        info!(job = %job.name, "Requesting rsync targets from {}", endpoint.host);
        let folders = match self.client.list_targets(&endpoint).await {
            Ok(folders) => folders,
            Err(e) => {
                error!(job = %job.name, "Directory listing error: {}", e);
                run.error = Some(e.to_string());
                run.duration_secs = start_time.elapsed().as_secs();
                return run;
            }
        };
        debug!(job = %job.name, count = folders.len(), ?folders, "Discovered targets");

        for folder in folders {
            info!(job = %job.name, "Syncing \"{}\" to {}", folder, target_path.display());

            match self.run_target(job, &endpoint, &target_path, &folder).await {
                Ok(bytes) => {
                    run.subtotal += bytes;
                    info!(job = %job.name, folder = %folder, bytes, "Synchronized {}", format_megabytes(bytes));
                    run.targets.push(TargetOutcome {
                        folder,
                        status: TargetStatus::Synced { bytes },
                    });
                }
                Err(e) => {
                    error!(job = %job.name, folder = %folder, "!! Error: {}", e);
                    run.targets.push(TargetOutcome {
                        folder,
                        status: TargetStatus::Failed {
                            error: e.to_string(),
                        },
                    });
                }
            }
        }

        run.duration_secs = start_time.elapsed().as_secs();
        info!(
            job = %job.name,
            bytes = run.subtotal,
            failed = run.failed_targets(),
            "Job {} complete with {} processed in {}",
            job.name,
            format_megabytes(run.subtotal),
            format_duration(run.duration_secs)
        );

        run
    }

    /// Rotate one module's generations and sync into the new generation 0
    pub async fn run_target(
        &self,
        job: &JobConfig,
        endpoint: &Endpoint,
        target_path: &Path,
        folder: &str,
    ) -> Result<u64> {
        check_folder_name(target_path, folder)?;

        let ring = GenerationRing::new(target_path, folder, job.rotate_level, self.purge_ceiling);
        let rotation = ring.rotate().await?;

        if let Some(link_dest) = &rotation.link_dest {
            debug!(link_dest = %link_dest.display(), "Hard-linking unchanged files from previous generation");
        }

        let request = SyncRequest {
            source: endpoint.module_uri(folder),
            destination: rotation.current,
            link_dest: rotation.link_dest,
        };
        self.client.sync(endpoint, &request).await
    }

    async fn prepare(&self, target_path: &Path) -> Result<()> {
        let root_is_dir = tokio::fs::metadata(self.backup_root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !root_is_dir {
            return Err(BackupError::rotation(self.backup_root, "backup folder does not exist"));
        }

        tokio::fs::create_dir_all(target_path).await.map_err(|e| {
            BackupError::rotation(target_path, format!("cannot create job directory: {}", e))
        })
    }
}

/// Module names come from the remote host and become path components.
fn check_folder_name(target_path: &Path, folder: &str) -> Result<()> {
    // Listing output is decoded lossily, so a non-UTF-8 name shows up as U+FFFD.
    if folder.contains(char::REPLACEMENT_CHARACTER) {
        return Err(BackupError::rotation(
            target_path,
            format!("module name {:?} is not valid UTF-8", folder),
        ));
    }
    if folder.is_empty() || folder == "." || folder == ".." || folder.contains('/') || folder.contains('\0') {
        return Err(BackupError::rotation(
            target_path,
            format!("refusing unsafe module name {:?}", folder),
        ));
    }
    Ok(())
}

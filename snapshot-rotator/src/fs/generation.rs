//! Fixed-depth ring of numbered snapshot directories.
//!
//! Each sync target owns the directories `<target_path>/<folder>.<k>` for
//! `k` in `0..depth`. Generation 0 is always the newest. A rotation makes
//! room for a new snapshot in three steps that must run in this order:
//!
//! 1. purge every generation from `depth - 1` up to the purge ceiling
//! 2. shift the survivors up by one, highest index first
//! 3. create an empty generation 0
//!
//! Shifting is a plain rename so hard-linked content is never copied.

use crate::utils::errors::{BackupError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Result of a successful rotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rotation {
    /// Freshly created, empty generation 0
    pub current: PathBuf,

    /// Previous snapshot (now generation 1), if there is one
    pub link_dest: Option<PathBuf>,
}

/// Generation directories of one `(target_path, folder)` pair
#[derive(Debug, Clone)]
pub struct GenerationRing {
    target_path: PathBuf,
    folder: String,
    depth: u32,
    purge_ceiling: u32,
}

impl GenerationRing {
    pub fn new(
        target_path: impl Into<PathBuf>,
        folder: impl Into<String>,
        depth: u32,
        purge_ceiling: u32,
    ) -> Self {
        Self {
            target_path: target_path.into(),
            folder: folder.into(),
            depth: depth.max(1),
            purge_ceiling,
        }
    }

    pub fn target_path(&self) -> &Path {
        &self.target_path
    }

    pub fn generation_path(&self, index: u32) -> PathBuf {
        self.target_path.join(format!("{}.{}", self.folder, index))
    }

    /// Indices of the generations currently on disk, ascending
    pub async fn existing(&self) -> Result<Vec<u32>> {
        let mut entries = match tokio::fs::read_dir(&self.target_path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(BackupError::rotation(&self.target_path, e.to_string())),
        };

        let prefix = format!("{}.", self.folder);
        let mut indices = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| BackupError::rotation(&self.target_path, e.to_string()))?
        {
            let name = entry.file_name();
            let Some(suffix) = name.to_str().and_then(|n| n.strip_prefix(prefix.as_str())) else {
                continue;
            };
            if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
                continue;
            }
            if let Ok(index) = suffix.parse::<u32>() {
                if is_dir(&entry.path()).await {
                    indices.push(index);
                }
            }
        }

        indices.sort_unstable();
        Ok(indices)
    }

    /// Run purge, shift and allocate, then pick the link-dest source
    pub async fn rotate(&self) -> Result<Rotation> {
        self.purge().await?;
        self.shift().await?;
        let current = self.allocate().await?;

        // Only valid after the shift: generation 1 is now the previous generation 0.
        let previous = self.generation_path(1);
        let link_dest = if is_dir(&previous).await {
            Some(previous)
        } else {
            None
        };

        Ok(Rotation { current, link_dest })
    }

    /// Delete generations `depth - 1 ..= purge_ceiling`.
    ///
    /// Every index is attempted even if an earlier deletion fails; the
    /// failures are reported together afterwards.
    pub async fn purge(&self) -> Result<usize> {
        let mut removed = 0;
        let mut failures = Vec::new();

        for index in self.depth - 1..=self.purge_ceiling {
            let path = self.generation_path(index);
            if !is_dir(&path).await {
                continue;
            }
            match tokio::fs::remove_dir_all(&path).await {
                Ok(()) => {
                    debug!(path = %path.display(), "Purged generation");
                    removed += 1;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to purge generation");
                    failures.push(format!("{}: {}", path.display(), e));
                }
            }
        }

        if failures.is_empty() {
            Ok(removed)
        } else {
            Err(BackupError::rotation(
                &self.target_path,
                format!("purge failed for {}", failures.join("; ")),
            ))
        }
    }

    /// Rename generation `x` to `x + 1` for `x` from `depth - 2` down to 0
    pub async fn shift(&self) -> Result<()> {
        for index in (0..self.depth - 1).rev() {
            let from = self.generation_path(index);
            if !is_dir(&from).await {
                continue;
            }

            let to = self.generation_path(index + 1);
            if tokio::fs::symlink_metadata(&to).await.is_ok() {
                return Err(BackupError::rotation(
                    &from,
                    format!("cannot shift, {} is still occupied", to.display()),
                ));
            }

            tokio::fs::rename(&from, &to).await.map_err(|e| {
                BackupError::rotation(&from, format!("cannot rename to {}: {}", to.display(), e))
            })?;
            debug!(from = %from.display(), to = %to.display(), "Shifted generation");
        }

        Ok(())
    }

    /// Create the target directory if needed and a new, empty generation 0
    pub async fn allocate(&self) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.target_path).await.map_err(|e| {
            BackupError::rotation(&self.target_path, format!("cannot create target directory: {}", e))
        })?;

        let current = self.generation_path(0);
        match tokio::fs::create_dir(&current).await {
            Ok(()) => Ok(current),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(BackupError::rotation(
                &current,
                "generation 0 already exists, a previous run left it behind",
            )),
            Err(e) => Err(BackupError::rotation(
                &current,
                format!("cannot create generation 0: {}", e),
            )),
        }
    }
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

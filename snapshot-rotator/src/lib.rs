//! Snapshot Rotator Library
//!
//! Pulls every module an rsync daemon exports into a fixed-depth ring of
//! hard-linked snapshot generations on local disk.

pub mod config;
pub mod executor;
pub mod fs;
pub mod notify;
pub mod rsync;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use executor::{Batch, BatchSummary, JobRunner};
pub use utils::errors::BackupError;
pub type Result<T> = std::result::Result<T, BackupError>;

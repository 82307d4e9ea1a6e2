//! Configuration management for the snapshot rotator.
//!
//! Loads configuration from a TOML file with environment variable overrides
//! (`SNAPSHOT_ROTATOR__GENERAL__BACKUP_FOLDER`, `SNAPSHOT_ROTATOR__SMTP__PASSWORD`, ...).

use crate::utils::errors::{BackupError, Result};
use ::config::{Environment, File, FileFormat};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "SNAPSHOT_ROTATOR";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub general: GeneralConfig,

    #[serde(default)]
    pub smtp: SmtpConfig,

    /// Backup jobs, run in the order they appear in the file
    #[serde(rename = "job", default)]
    pub jobs: Vec<JobConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    /// Root directory every job writes below
    pub backup_folder: PathBuf,

    /// Refuse to run unless `backup_folder` is a mount point
    #[serde(default)]
    pub mount_check: bool,

    /// Directory for per-run log files
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Highest generation index inspected when purging old generations.
    /// Covers generations left behind after a job's rotate_level was lowered.
    #[serde(default = "default_purge_ceiling")]
    pub purge_ceiling: u32,

    /// rsync executable
    #[serde(default = "default_rsync_path")]
    pub rsync_path: PathBuf,

    /// Kill listings and transfers that run longer than this
    #[serde(default)]
    pub transfer_timeout_secs: Option<u64>,
}

#[derive(Clone, Default, Deserialize)]
pub struct SmtpConfig {
    #[serde(default)]
    pub enable: bool,

    /// `host` or `host:port`
    #[serde(default)]
    pub server: String,

    /// Sender address, also used as the SMTP login
    #[serde(default)]
    pub email: String,

    #[serde(default)]
    pub password: String,

    #[serde(default)]
    pub recipients: Vec<String>,
}

#[derive(Clone, Deserialize)]
pub struct JobConfig {
    /// Job name; also the directory below `backup_folder`
    pub name: String,

    /// rsync daemon host
    pub host: String,

    pub username: String,

    pub password: String,

    /// Number of generations kept per module
    pub rotate_level: u32,
}

// Keep passwords out of anything that formats the configuration.
impl fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("enable", &self.enable)
            .field("server", &self.server)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("recipients", &self.recipients)
            .finish()
    }
}

impl fmt::Debug for JobConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobConfig")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("rotate_level", &self.rotate_level)
            .finish()
    }
}

// Default values
fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_purge_ceiling() -> u32 {
    98
}

fn default_rsync_path() -> PathBuf {
    PathBuf::from("rsync")
}

impl Config {
    /// Load configuration from a TOML file, applying environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text without environment overrides
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.jobs.is_empty() {
            return Err(BackupError::Config("no [[job]] sections configured".into()));
        }

        let mut seen = HashSet::new();
        for job in &self.jobs {
            if job.name.is_empty() || job.name == "." || job.name == ".." || job.name.contains('/') {
                return Err(BackupError::Config(format!(
                    "job name {:?} cannot be used as a directory name",
                    job.name
                )));
            }
            if !seen.insert(job.name.as_str()) {
                return Err(BackupError::Config(format!("duplicate job name {:?}", job.name)));
            }
            if job.host.trim().is_empty() {
                return Err(BackupError::Config(format!("job {:?}: host is empty", job.name)));
            }
            if job.rotate_level < 1 {
                return Err(BackupError::Config(format!(
                    "job {:?}: rotate_level must be at least 1",
                    job.name
                )));
            }
            if job.rotate_level - 1 > self.general.purge_ceiling {
                return Err(BackupError::Config(format!(
                    "job {:?}: rotate_level {} exceeds purge_ceiling {}",
                    job.name, job.rotate_level, self.general.purge_ceiling
                )));
            }
        }

        if self.smtp.enable {
            if self.smtp.server.is_empty() {
                return Err(BackupError::Config("smtp.server is required when smtp is enabled".into()));
            }
            if self.smtp.email.is_empty() {
                return Err(BackupError::Config("smtp.email is required when smtp is enabled".into()));
            }
            if self.smtp.recipients.is_empty() {
                return Err(BackupError::Config(
                    "smtp.recipients is required when smtp is enabled".into(),
                ));
            }
        }

        Ok(())
    }
}

impl GeneralConfig {
    pub fn transfer_timeout(&self) -> Option<Duration> {
        self.transfer_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [general]
        backup_folder = "/mnt/backup"
        mount_check = true

        [smtp]
        enable = true
        server = "mail.example.com:587"
        email = "backup@example.com"
        password = "mailpass"
        recipients = ["ops@example.com", "admin@example.com"]

        [[job]]
        name = "fileserver"
        host = "fs01.example.com"
        username = "backup"
        password = "s3cret"
        rotate_level = 7

        [[job]]
        name = "accounts"
        host = "acct01"
        username = "backup"
        password = "hunter2"
        rotate_level = 3
    "#;

    #[test]
    fn test_parse_full_config() {
        let config = Config::from_toml_str(SAMPLE).unwrap();

        assert_eq!(config.general.backup_folder, PathBuf::from("/mnt/backup"));
        assert!(config.general.mount_check);
        assert_eq!(config.smtp.recipients.len(), 2);
        assert_eq!(config.jobs.len(), 2);
        assert_eq!(config.jobs[0].name, "fileserver");
        assert_eq!(config.jobs[0].rotate_level, 7);
        assert_eq!(config.jobs[1].name, "accounts");
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_toml_str(
            r#"
            [general]
            backup_folder = "/srv/backup"

            [[job]]
            name = "web"
            host = "web01"
            username = "u"
            password = "p"
            rotate_level = 1
            "#,
        )
        .unwrap();

        assert!(!config.general.mount_check);
        assert_eq!(config.general.log_dir, PathBuf::from("logs"));
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.purge_ceiling, 98);
        assert_eq!(config.general.rsync_path, PathBuf::from("rsync"));
        assert!(config.general.transfer_timeout().is_none());
        assert!(!config.smtp.enable);
    }

    #[test]
    fn test_rejects_zero_rotate_level() {
        let err = Config::from_toml_str(&SAMPLE.replace("rotate_level = 3", "rotate_level = 0"))
            .unwrap_err();
        assert!(matches!(err, BackupError::Config(ref m) if m.contains("rotate_level")));
    }

    #[test]
    fn test_rejects_duplicate_job_names() {
        let err = Config::from_toml_str(&SAMPLE.replace("\"accounts\"", "\"fileserver\"")).unwrap_err();
        assert!(matches!(err, BackupError::Config(ref m) if m.contains("duplicate")));
    }

    #[test]
    fn test_rejects_path_like_job_name() {
        let err = Config::from_toml_str(&SAMPLE.replace("\"accounts\"", "\"../etc\"")).unwrap_err();
        assert!(matches!(err, BackupError::Config(_)));
    }

    #[test]
    fn test_rejects_rotate_level_above_purge_ceiling() {
        let content = SAMPLE.replace("mount_check = true", "mount_check = true\npurge_ceiling = 5");
        let err = Config::from_toml_str(&content).unwrap_err();
        assert!(matches!(err, BackupError::Config(ref m) if m.contains("purge_ceiling")));
    }

    #[test]
    fn test_rejects_smtp_without_recipients() {
        let content = SAMPLE.replace(
            "recipients = [\"ops@example.com\", \"admin@example.com\"]",
            "recipients = []",
        );
        let err = Config::from_toml_str(&content).unwrap_err();
        assert!(matches!(err, BackupError::Config(ref m) if m.contains("recipients")));
    }

    #[test]
    fn test_debug_output_hides_password() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("s3cret"));
        assert!(!rendered.contains("mailpass"));
        assert!(rendered.contains("fs01.example.com"));
    }
}

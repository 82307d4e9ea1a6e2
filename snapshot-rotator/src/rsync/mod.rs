//! Client side of the rsync daemon protocol.
//!
//! The rest of the crate talks to remote hosts through the [`RemoteSync`]
//! trait; [`RsyncCommand`] implements it by running the rsync executable.

pub mod report;

use crate::config::JobConfig;
use crate::utils::errors::{BackupError, Result};
use report::{parse_module_list, parse_total_size};
use std::ffi::OsString;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Flags for every transfer: exact mirror, permissive modes, no remote ownership
const SYNC_FLAGS: &[&str] = &[
    "-rav",
    "--delete",
    "--no-perms",
    "--chmod=ugo=rwX",
    "--no-super",
    "--no-group",
    "--no-human-readable",
];

/// Credentials and address of an rsync daemon
#[derive(Clone)]
pub struct Endpoint {
    pub host: String,
    pub username: String,
    password: String,
}

impl Endpoint {
    pub fn new(host: &str, username: &str, password: &str) -> Self {
        Self {
            host: host.trim().to_string(),
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    pub fn from_job(job: &JobConfig) -> Self {
        Self::new(&job.host, &job.username, &job.password)
    }

    /// `user@host::`, which lists the modules a daemon exports
    pub fn daemon_url(&self) -> String {
        format!("{}@{}::", self.username, self.host)
    }

    /// Source URI for the contents of one module
    pub fn module_uri(&self, folder: &str) -> String {
        format!("{}{}/", self.daemon_url(), folder)
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// One transfer into a fresh generation directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    pub source: String,
    pub destination: PathBuf,
    /// Previous generation to hard-link unchanged files from
    pub link_dest: Option<PathBuf>,
}

pub trait RemoteSync {
    /// Modules exported by the daemon, in the order it lists them
    fn list_targets(&self, endpoint: &Endpoint) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Mirror `request.source` into `request.destination`, returning the byte count
    fn sync(&self, endpoint: &Endpoint, request: &SyncRequest) -> impl Future<Output = Result<u64>> + Send;
}

/// [`RemoteSync`] backed by the rsync executable
#[derive(Debug, Clone)]
pub struct RsyncCommand {
    program: PathBuf,
    timeout: Option<Duration>,
}

impl RsyncCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn command(&self, endpoint: &Endpoint) -> Command {
        let mut cmd = Command::new(&self.program);
        // The password only ever lives in the child's environment.
        cmd.env("RSYNC_PASSWORD", endpoint.password())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn run(&self, mut cmd: Command) -> std::result::Result<Output, String> {
        let output = cmd.output();
        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, output).await {
                Ok(result) => result,
                Err(_) => return Err(format!("timed out after {}s", limit.as_secs_f64())),
            },
            None => output.await,
        };
        result.map_err(|e| format!("cannot run {}: {}", self.program.display(), e))
    }
}

impl RemoteSync for RsyncCommand {
    async fn list_targets(&self, endpoint: &Endpoint) -> Result<Vec<String>> {
        let mut cmd = self.command(endpoint);
        cmd.arg(endpoint.daemon_url());

        let output = self
            .run(cmd)
            .await
            .map_err(|message| BackupError::discovery(&endpoint.host, message))?;
        if !output.status.success() {
            return Err(BackupError::discovery(&endpoint.host, failure_text(&output)));
        }

        Ok(parse_module_list(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn sync(&self, endpoint: &Endpoint, request: &SyncRequest) -> Result<u64> {
        let args = sync_args(request);
        debug!(source = %request.source, ?args, "Running rsync");

        let mut cmd = self.command(endpoint);
        cmd.args(&args);

        let output = self
            .run(cmd)
            .await
            .map_err(|message| BackupError::sync(&request.source, message))?;
        if !output.status.success() {
            return Err(BackupError::sync(&request.source, failure_text(&output)));
        }

        parse_total_size(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Command line for a transfer, without the program name
pub fn sync_args(request: &SyncRequest) -> Vec<OsString> {
    let mut args: Vec<OsString> = SYNC_FLAGS.iter().map(OsString::from).collect();
    if let Some(link_dest) = &request.link_dest {
        let mut flag = OsString::from("--link-dest=");
        flag.push(link_dest.as_os_str());
        args.push(flag);
    }
    args.push(OsString::from(&request.source));
    args.push(request.destination.clone().into_os_string());
    args
}

fn failure_text(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        format!("rsync {}", output.status)
    } else {
        format!("{} (rsync {})", stderr, output.status)
    }
}

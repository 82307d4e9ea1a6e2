//! Shared fixtures: an in-process rsync daemon stand-in.

#![allow(dead_code)]

use snapshot_rotator::config::{Config, JobConfig};
use snapshot_rotator::notify::{BatchReport, Notifier};
use snapshot_rotator::rsync::{Endpoint, RemoteSync, SyncRequest};
use snapshot_rotator::BackupError;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use walkdir::WalkDir;

/// What a fake module does when synced
#[derive(Debug, Clone)]
pub enum Module {
    /// Mirror this local directory, hard-linking unchanged files from link-dest
    Tree(PathBuf),
    /// Succeed without writing anything, reporting this many bytes
    Reported(u64),
    /// Fail like rsync exiting non-zero
    Fails(String),
}

#[derive(Debug, Clone)]
enum Host {
    Modules(Vec<(String, Module)>),
    Unreachable(String),
}

#[derive(Default)]
pub struct FakeRemote {
    hosts: HashMap<String, Host>,
    listings: Mutex<Vec<String>>,
    requests: Mutex<Vec<SyncRequest>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, host: &str, name: &str, module: Module) -> Self {
        let entry = self
            .hosts
            .entry(host.to_string())
            .or_insert_with(|| Host::Modules(Vec::new()));
        if let Host::Modules(modules) = entry {
            modules.push((name.to_string(), module));
        }
        self
    }

    pub fn with_unreachable(mut self, host: &str, message: &str) -> Self {
        self.hosts
            .insert(host.to_string(), Host::Unreachable(message.to_string()));
        self
    }

    /// Hosts that were asked for their module list
    pub fn listings(&self) -> Vec<String> {
        self.listings.lock().unwrap().clone()
    }

    pub fn requests(&self) -> Vec<SyncRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn module(&self, endpoint: &Endpoint, source: &str) -> Option<Module> {
        let name = source
            .strip_prefix(&endpoint.daemon_url())?
            .trim_end_matches('/');
        match self.hosts.get(&endpoint.host)? {
            Host::Modules(modules) => modules
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, m)| m.clone()),
            Host::Unreachable(_) => None,
        }
    }
}

impl RemoteSync for FakeRemote {
    async fn list_targets(&self, endpoint: &Endpoint) -> snapshot_rotator::Result<Vec<String>> {
        self.listings.lock().unwrap().push(endpoint.host.clone());
        match self.hosts.get(&endpoint.host) {
            None => Ok(Vec::new()),
            Some(Host::Unreachable(message)) => Err(BackupError::discovery(&endpoint.host, message.clone())),
            Some(Host::Modules(modules)) => Ok(modules.iter().map(|(n, _)| n.clone()).collect()),
        }
    }

    async fn sync(&self, endpoint: &Endpoint, request: &SyncRequest) -> snapshot_rotator::Result<u64> {
        self.requests.lock().unwrap().push(request.clone());
        match self.module(endpoint, &request.source) {
            Some(Module::Tree(source)) => {
                Ok(mirror(&source, &request.destination, request.link_dest.as_deref())?)
            }
            Some(Module::Reported(bytes)) => Ok(bytes),
            Some(Module::Fails(message)) => Err(BackupError::sync(&request.source, message)),
            None => Err(BackupError::sync(&request.source, "@ERROR: Unknown module")),
        }
    }
}

/// Copy `source` into `dest`, hard-linking files identical to their link-dest counterpart
fn mirror(source: &Path, dest: &Path, link_dest: Option<&Path>) -> io::Result<u64> {
    let mut total = 0;
    for entry in WalkDir::new(source).min_depth(1) {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry.path().strip_prefix(source).unwrap();
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }

        let content = fs::read(entry.path())?;
        total += content.len() as u64;

        let previous = link_dest.map(|l| l.join(relative));
        match previous {
            Some(prev) if fs::read(&prev).map(|c| c == content).unwrap_or(false) => {
                fs::hard_link(&prev, &target)?;
            }
            _ => {
                fs::write(&target, &content)?;
            }
        }
    }
    Ok(total)
}

/// Records every report instead of sending it
#[derive(Default)]
pub struct RecordingNotifier {
    reports: Mutex<Vec<BatchReport>>,
}

impl RecordingNotifier {
    pub fn reports(&self) -> Vec<BatchReport> {
        self.reports.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    async fn notify(&self, report: &BatchReport) -> snapshot_rotator::Result<()> {
        self.reports.lock().unwrap().push(report.clone());
        Ok(())
    }
}

pub struct BrokenNotifier;

impl Notifier for BrokenNotifier {
    async fn notify(&self, _report: &BatchReport) -> snapshot_rotator::Result<()> {
        Err(BackupError::Notify("connection refused".into()))
    }
}

pub fn job(name: &str, host: &str, rotate_level: u32) -> JobConfig {
    Config::from_toml_str(&format!(
        r#"
        [general]
        backup_folder = "/unused"

        [[job]]
        name = "{name}"
        host = "{host}"
        username = "backup"
        password = "secret"
        rotate_level = {rotate_level}
        "#
    ))
    .unwrap()
    .jobs
    .remove(0)
}

/// Write `files` (relative path, content) below `root`, replacing what was there
pub fn write_tree(root: &Path, files: &[(&str, &str)]) {
    if root.exists() {
        fs::remove_dir_all(root).unwrap();
    }
    for (relative, content) in files {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
}

pub fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
}

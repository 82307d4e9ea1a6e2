//! Logging configuration using tracing.
//!
//! Console output goes through a regular fmt layer. A second, plain-text layer
//! writes into the [`RunLog`] for the current batch, which keeps a copy of
//! everything it receives so the whole run can be mailed out at the end.

use chrono::{DateTime, Local};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::{self, time::ChronoLocal, MakeWriter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Initialize logging with the specified level, mirroring every line into `run_log`
pub fn init(level: &str, run_log: RunLog) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_timer(ChronoLocal::new(TIMESTAMP_FORMAT.to_string())),
        )
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_timer(ChronoLocal::new(TIMESTAMP_FORMAT.to_string()))
                .with_writer(run_log),
        )
        .try_init()?;

    Ok(())
}

/// Text log of one batch run: persisted to a file and captured in memory
#[derive(Clone)]
pub struct RunLog {
    inner: Arc<Mutex<RunLogInner>>,
    path: Option<PathBuf>,
}

struct RunLogInner {
    file: Option<File>,
    captured: Vec<u8>,
}

impl RunLog {
    /// Create `<log_dir>/backup-<timestamp>.log`, creating the directory if needed
    pub fn create(log_dir: &Path, started: DateTime<Local>) -> io::Result<Self> {
        std::fs::create_dir_all(log_dir)?;
        let path = log_dir.join(format!("backup-{}.log", started.format("%Y-%m-%d-%H%M.%S")));
        let file = File::create(&path)?;

        Ok(Self {
            inner: Arc::new(Mutex::new(RunLogInner {
                file: Some(file),
                captured: Vec::new(),
            })),
            path: Some(path),
        })
    }

    /// A run log that is never written to disk
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RunLogInner {
                file: None,
                captured: Vec::new(),
            })),
            path: None,
        }
    }

    /// Location of the log file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Everything logged so far
    pub fn contents(&self) -> String {
        match self.inner.lock() {
            Ok(inner) => String::from_utf8_lossy(&inner.captured).into_owned(),
            Err(poisoned) => String::from_utf8_lossy(&poisoned.into_inner().captured).into_owned(),
        }
    }
}

pub struct RunLogWriter {
    inner: Arc<Mutex<RunLogInner>>,
}

impl Write for RunLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "run log lock poisoned"))?;
        inner.captured.extend_from_slice(buf);
        if let Some(file) = inner.file.as_mut() {
            file.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "run log lock poisoned"))?;
        match inner.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for RunLog {
    type Writer = RunLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        RunLogWriter {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_in_memory_capture() -> io::Result<()> {
        let log = RunLog::in_memory();
        let mut writer = log.make_writer();
        writer.write_all(b"first line\n")?;
        log.make_writer().write_all(b"second line\n")?;

        assert_eq!(log.contents(), "first line\nsecond line\n");
        assert!(log.path().is_none());
        Ok(())
    }

    #[test]
    fn test_file_backed_log() -> io::Result<()> {
        let temp_dir = TempDir::new()?;
        let log_dir = temp_dir.path().join("logs");
        let started = Local.with_ymd_and_hms(2024, 3, 9, 12, 30, 5).unwrap();

        let log = RunLog::create(&log_dir, started)?;
        let path = log.path().unwrap().to_path_buf();
        assert_eq!(path, log_dir.join("backup-2024-03-09-1230.05.log"));

        let mut writer = log.make_writer();
        writer.write_all(b"Job complete\n")?;
        writer.flush()?;

        assert_eq!(std::fs::read_to_string(&path)?, "Job complete\n");
        assert_eq!(log.contents(), "Job complete\n");
        Ok(())
    }

    #[test]
    fn test_clones_share_capture() -> io::Result<()> {
        let log = RunLog::in_memory();
        let handle = log.clone();
        handle.make_writer().write_all(b"shared\n")?;
        assert_eq!(log.contents(), "shared\n");
        Ok(())
    }
}

//! End-of-batch notification.

pub mod mail;

use crate::utils::errors::Result;
use std::future::Future;

pub use mail::MailNotifier;

/// What a batch hands to its notifier once every job has run
#[derive(Debug, Clone)]
pub struct BatchReport {
    /// Machine the batch ran on
    pub host: String,
    pub happy: bool,
    pub total_bytes: u64,
    /// Full text of the run log
    pub body: String,
}

impl BatchReport {
    pub fn subject(&self) -> String {
        if self.happy {
            format!("Backup complete on {}", self.host)
        } else {
            format!("BACKUP FAILED ON {}", self.host)
        }
    }
}

pub trait Notifier {
    fn notify(&self, report: &BatchReport) -> impl Future<Output = Result<()>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(happy: bool) -> BatchReport {
        BatchReport {
            host: "vault".to_string(),
            happy,
            total_bytes: 0,
            body: String::new(),
        }
    }

    #[test]
    fn test_subject_on_success() {
        assert_eq!(report(true).subject(), "Backup complete on vault");
    }

    #[test]
    fn test_subject_on_failure() {
        assert_eq!(report(false).subject(), "BACKUP FAILED ON vault");
    }
}

//! SMTP delivery of the run log.

use super::{BatchReport, Notifier};
use crate::config::SmtpConfig;
use crate::utils::errors::{BackupError, Result};
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, info};

const DEFAULT_SMTP_PORT: u16 = 25;

/// Mails the batch report when `[smtp] enable = true`, otherwise does nothing
#[derive(Debug, Clone)]
pub struct MailNotifier {
    config: SmtpConfig,
}

impl MailNotifier {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enable
    }

    /// Assemble the message without sending it
    pub fn build_message(&self, report: &BatchReport) -> Result<Message> {
        let from: Mailbox = self
            .config
            .email
            .parse()
            .map_err(|e| BackupError::Notify(format!("invalid sender {:?}: {}", self.config.email, e)))?;

        let mut builder = Message::builder().from(from).subject(report.subject());
        for recipient in &self.config.recipients {
            let to: Mailbox = recipient
                .trim()
                .parse()
                .map_err(|e| BackupError::Notify(format!("invalid recipient {:?}: {}", recipient, e)))?;
            builder = builder.to(to);
        }

        builder
            .body(report.body.clone())
            .map_err(|e| BackupError::Notify(e.to_string()))
    }
}

impl Notifier for MailNotifier {
    async fn notify(&self, report: &BatchReport) -> Result<()> {
        if !self.config.enable {
            debug!("SMTP disabled, not sending report");
            return Ok(());
        }

        let message = self.build_message(report)?;
        let (host, port) = split_server(&self.config.server)?;

        // Plain SMTP with login, no STARTTLS.
        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
            .port(port)
            .credentials(Credentials::new(
                self.config.email.clone(),
                self.config.password.clone(),
            ))
            .build();

        transport
            .send(message)
            .await
            .map_err(|e| BackupError::Notify(format!("sending via {}: {}", self.config.server, e)))?;

        info!(recipients = self.config.recipients.len(), subject = %report.subject(), "Report mailed");
        Ok(())
    }
}

fn split_server(server: &str) -> Result<(&str, u16)> {
    match server.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse()
                .map_err(|_| BackupError::Notify(format!("invalid SMTP port in {:?}", server)))?;
            Ok((host, port))
        }
        None => Ok((server, DEFAULT_SMTP_PORT)),
    }
}

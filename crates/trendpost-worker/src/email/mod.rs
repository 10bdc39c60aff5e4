pub mod smtp;
pub mod templates;

use async_trait::async_trait;

pub use smtp::SmtpMailer;

/// A fully rendered report, ready to hand to a mailer.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportEmail {
    pub subject: String,
    pub text: String,
    pub html: String,
}

#[async_trait]
pub trait ReportMailer: Send + Sync {
    /// Sends the report to the configured recipient and returns its Message-ID.
    async fn send_report(&self, email: &ReportEmail) -> anyhow::Result<String>;

    /// Notifies the operator of a failed run. Returns `false` when no
    /// notification address is configured.
    async fn send_error_notification(
        &self,
        error: &str,
        details: Option<&str>,
    ) -> anyhow::Result<bool>;

    async fn check_connection(&self) -> anyhow::Result<()>;
}

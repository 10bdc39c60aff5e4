use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use lettre::{
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::{info, warn};
use trendpost_core::config::SmtpConfig;
use uuid::Uuid;

use super::{templates, ReportEmail, ReportMailer};

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
    error_to: Option<Mailbox>,
    subject_prefix: String,
    noop: bool,
}

fn mailbox(name: Option<&str>, address: &str) -> anyhow::Result<Mailbox> {
    let address = address
        .trim()
        .parse()
        .map_err(|e| anyhow!("invalid email address {address:?}: {e}"))?;
    Ok(Mailbox::new(name.map(str::to_string), address))
}

impl SmtpMailer {
    pub fn from_config(config: &SmtpConfig) -> anyhow::Result<Self> {
        let builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
        }
        .with_context(|| format!("invalid SMTP host {}", config.host))?;

        let mut builder = builder
            .port(config.port)
            .timeout(Some(Duration::from_secs(30)));
        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        let error_to = config
            .error_notification_to
            .as_deref()
            .map(|addr| mailbox(None, addr))
            .transpose()?;

        Ok(Self {
            transport: builder.build(),
            from: mailbox(Some(&config.from_name), &config.from_address)?,
            to: mailbox(None, &config.to_address)?,
            error_to,
            subject_prefix: config.subject_prefix.clone(),
            noop: config.noop,
        })
    }

    fn message_id(&self) -> String {
        format!("<{}@{}>", Uuid::new_v4(), self.from.email.domain())
    }

    async fn deliver(
        &self,
        to: &Mailbox,
        subject: &str,
        text: String,
        html: String,
    ) -> anyhow::Result<String> {
        let message_id = self.message_id();
        if self.noop {
            info!(
                to = %to,
                subject,
                message_id = %message_id,
                "SMTP noop transport enabled; skipping network dispatch"
            );
            return Ok(message_id);
        }

        let email = Message::builder()
            .from(self.from.clone())
            .to(to.clone())
            .subject(subject)
            .message_id(Some(message_id.clone()))
            .multipart(MultiPart::alternative_plain_html(text, html))
            .context("smtp message build failed")?;
        self.transport
            .send(email)
            .await
            .context("smtp send failed")?;
        info!(to = %to, message_id = %message_id, "email sent");
        Ok(message_id)
    }
}

#[async_trait]
impl ReportMailer for SmtpMailer {
    async fn send_report(&self, email: &ReportEmail) -> anyhow::Result<String> {
        self.deliver(&self.to, &email.subject, email.text.clone(), email.html.clone())
            .await
    }

    async fn send_error_notification(
        &self,
        error: &str,
        details: Option<&str>,
    ) -> anyhow::Result<bool> {
        let Some(to) = &self.error_to else {
            warn!("no error notification address configured");
            return Ok(false);
        };
        let (text, html) = templates::render_error_notification(error, details);
        let subject = format!("{} ERROR - Report Generation Failed", self.subject_prefix);
        self.deliver(to, &subject, text, html).await?;
        Ok(true)
    }

    async fn check_connection(&self) -> anyhow::Result<()> {
        if self.noop {
            return Ok(());
        }
        let reachable = self
            .transport
            .test_connection()
            .await
            .context("SMTP connection test failed")?;
        if !reachable {
            bail!("SMTP server did not accept the connection");
        }
        Ok(())
    }
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use trendpost_core::config::Config;

use crate::analytics::{AnalyticsSource, Ga4Client};
use crate::email::{ReportMailer, SmtpMailer};
use crate::llm::{self, TextGenerator};
use crate::retry::RetryPolicy;

/// Everything a report run needs, shared between the scheduler and the CLI.
pub struct AppState {
    /// Parsed configuration, loaded once at startup from environment variables.
    pub config: Arc<Config>,
    pub analytics: Arc<dyn AnalyticsSource>,
    pub generator: Arc<dyn TextGenerator>,
    pub mailer: Arc<dyn ReportMailer>,
    /// Applied to the fetch, generation and send calls of a run.
    pub retry: RetryPolicy,

    /// Set while a run is in flight; at most one run at a time.
    run_in_flight: AtomicBool,
}

impl AppState {
    pub fn new(
        config: Config,
        analytics: Arc<dyn AnalyticsSource>,
        generator: Arc<dyn TextGenerator>,
        mailer: Arc<dyn ReportMailer>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            analytics,
            generator,
            mailer,
            retry: RetryPolicy::default(),
            run_in_flight: AtomicBool::new(false),
        }
    }

    /// Builds the real GA4, language-model and SMTP clients from `config`.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let analytics = Ga4Client::from_config(&config.analytics)
            .context("failed to build analytics client")?;
        let generator =
            llm::from_config(&config.llm).context("failed to build language model client")?;
        let mailer = SmtpMailer::from_config(&config.smtp).context("failed to build mailer")?;
        Ok(Self::new(
            config,
            Arc::new(analytics),
            generator,
            Arc::new(mailer),
        ))
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Claims the single run slot. `None` while another run holds it.
    pub fn try_begin_run(&self) -> Option<RunPermit<'_>> {
        self.run_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunPermit {
                flag: &self.run_in_flight,
            })
    }

    pub fn run_in_flight(&self) -> bool {
        self.run_in_flight.load(Ordering::Acquire)
    }
}

/// Releases the run slot on drop.
pub struct RunPermit<'a> {
    flag: &'a AtomicBool,
}

impl Drop for RunPermit<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::Serialize;
use tracing::{error, info, info_span, warn, Instrument};
use trendpost_core::error::CoreError;
use trendpost_core::period::ReportPeriod;
use trendpost_core::summary::{assemble, AnalyticsSummary};
use uuid::Uuid;

use crate::email::{templates, ReportEmail};
use crate::error::PipelineError;
use crate::prompt::{summary_prompt, system_prompt};
use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub period: ReportPeriod,
    pub insights: usize,
    pub recommendations: usize,
    pub message_id: String,
}

/// The `interval_days` complete days ending yesterday.
pub fn report_period(today: NaiveDate, interval_days: u32) -> Result<ReportPeriod, CoreError> {
    let yesterday = today
        .checked_sub_days(Days::new(1))
        .ok_or_else(|| CoreError::InvalidPeriod(format!("no day before {today}")))?;
    ReportPeriod::ending_on(yesterday, interval_days)
}

/// Runs the whole pipeline once. On failure the error is logged and the
/// operator notified before it is returned; no report is sent.
pub async fn run_report(state: &AppState, now: DateTime<Utc>) -> Result<RunReport, PipelineError> {
    let run_id = Uuid::new_v4().to_string();
    let span = info_span!("report_run", run_id = %run_id);
    async {
        info!(site = %state.config.target_website, "starting report run");
        match execute(state, now, &run_id).await {
            Ok(report) => {
                info!(
                    period = %report.period,
                    insights = report.insights,
                    recommendations = report.recommendations,
                    message_id = %report.message_id,
                    "report run completed"
                );
                Ok(report)
            }
            Err(err) => {
                error!(stage = err.stage(), error = %err, "report run failed");
                notify_failure(state, &err, &run_id).await;
                Err(err)
            }
        }
    }
    .instrument(span)
    .await
}

async fn execute(
    state: &AppState,
    now: DateTime<Utc>,
    run_id: &str,
) -> Result<RunReport, PipelineError> {
    let config = state.config.as_ref();
    let local_now = now.with_timezone(&config.schedule.timezone);
    let period = report_period(local_now.date_naive(), config.schedule.interval_days)?;
    let previous = period.previous()?;
    info!(period = %period, previous = %previous, "report period");

    let analytics = state.analytics.as_ref();
    let current_bundle = state
        .retry
        .run("fetch current period", move || analytics.fetch_bundle(period))
        .await
        .map_err(PipelineError::Fetch)?;
    let previous_bundle = state
        .retry
        .run("fetch previous period", move || {
            analytics.fetch_bundle(previous)
        })
        .await
        .map_err(PipelineError::Fetch)?;
    info!(
        source = analytics.name(),
        sessions = ?current_bundle.audience.sessions,
        users = ?current_bundle.audience.total_users,
        conversions = current_bundle.total_conversions(),
        "analytics fetched"
    );

    let summary = assemble(&current_bundle, &previous_bundle, period, &config.analysis)?;
    info!(
        insights = summary.insights().len(),
        recommendations = summary.recommendations().len(),
        "analysis complete"
    );

    let prose = generate_prose(state, &summary).await?;
    let email = render_email(state, &summary, &prose, &local_now);

    let mailer = state.mailer.as_ref();
    let email_ref = &email;
    let message_id = state
        .retry
        .run("send report", move || mailer.send_report(email_ref))
        .await
        .map_err(PipelineError::Delivery)?;

    Ok(RunReport {
        run_id: run_id.to_string(),
        period,
        insights: summary.insights().len(),
        recommendations: summary.recommendations().len(),
        message_id,
    })
}

async fn generate_prose(state: &AppState, summary: &AnalyticsSummary) -> Result<String, PipelineError> {
    let prompt = summary_prompt(summary, &state.config.target_website);
    let prompt = prompt.as_str();
    let generator = state.generator.as_ref();
    let prose = state
        .retry
        .run("generate summary", move || {
            generator.generate(system_prompt(), prompt)
        })
        .await
        .map_err(PipelineError::Generation)?;
    info!(backend = generator.name(), chars = prose.len(), "summary generated");
    Ok(prose)
}

fn render_email(
    state: &AppState,
    summary: &AnalyticsSummary,
    prose: &str,
    generated_at: &DateTime<chrono_tz::Tz>,
) -> ReportEmail {
    let config = state.config.as_ref();
    let site = config.target_website.as_str();
    ReportEmail {
        subject: templates::subject(&config.smtp.subject_prefix, site, summary.period()),
        text: templates::render_text(summary, prose, site, generated_at),
        html: templates::render_html(summary, prose, site, generated_at),
    }
}

async fn notify_failure(state: &AppState, err: &PipelineError, run_id: &str) {
    let details = format!(
        "Stage: {}\nRun: {run_id}\nSite: {}",
        err.stage(),
        state.config.target_website
    );
    match state
        .mailer
        .send_error_notification(&err.to_string(), Some(&details))
        .await
    {
        Ok(true) => info!("error notification sent"),
        Ok(false) => {}
        Err(notify_err) => warn!(error = %format!("{notify_err:#}"), "failed to send error notification"),
    }
}

/// Outcome of probing one collaborator.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionCheck {
    pub name: &'static str,
    pub error: Option<String>,
}

impl ConnectionCheck {
    fn from_result(name: &'static str, result: anyhow::Result<()>) -> Self {
        Self {
            name,
            error: result.err().map(|e| format!("{e:#}")),
        }
    }

    pub fn ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionReport {
    pub checks: Vec<ConnectionCheck>,
}

impl ConnectionReport {
    pub fn all_ok(&self) -> bool {
        self.checks.iter().all(ConnectionCheck::ok)
    }
}

/// Checks the analytics source, the language model and the mail server.
pub async fn test_connections(state: &AppState) -> ConnectionReport {
    let (analytics, generator, mailer) = tokio::join!(
        state.analytics.check_connection(),
        state.generator.health_check(),
        state.mailer.check_connection(),
    );
    let checks = vec![
        ConnectionCheck::from_result("analytics", analytics),
        ConnectionCheck::from_result("llm", generator),
        ConnectionCheck::from_result("smtp", mailer),
    ];
    for check in &checks {
        match &check.error {
            None => info!(collaborator = check.name, "connection ok"),
            Some(e) => error!(collaborator = check.name, error = %e, "connection failed"),
        }
    }
    ConnectionReport { checks }
}

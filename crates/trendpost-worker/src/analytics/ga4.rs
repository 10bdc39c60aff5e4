use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use trendpost_core::config::AnalyticsSourceConfig;
use trendpost_core::metrics::{
    AcquisitionEntry, AnalyticsBundle, AudienceMetrics, ConversionMetrics, EngagementMetrics,
    GeographicEntry,
};
use trendpost_core::period::ReportPeriod;

use super::auth::TokenProvider;
use super::AnalyticsSource;

const ACQUISITION_LIMIT: u32 = 5;
const GEOGRAPHY_LIMIT: u32 = 10;

pub struct Ga4Client {
    http: reqwest::Client,
    api_base: String,
    property_id: String,
    tokens: TokenProvider,
    conversion_events: Vec<String>,
}

impl Ga4Client {
    pub fn new(
        api_base: &str,
        property_id: &str,
        tokens: TokenProvider,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()
            .context("failed to build analytics HTTP client")?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            property_id: property_id.to_string(),
            tokens,
            conversion_events: ConversionMetrics::DEFAULT_CATEGORIES
                .iter()
                .map(|e| e.to_string())
                .collect(),
        })
    }

    pub fn from_config(config: &AnalyticsSourceConfig) -> anyhow::Result<Self> {
        let tokens = TokenProvider::from_credentials(&config.credentials, config.token_uri.clone())?;
        let client = Self::new(&config.api_base, &config.property_id, tokens)?;
        info!(property_id = %config.property_id, "Google Analytics client ready");
        Ok(client)
    }

    /// Event names counted as conversions, in report order.
    pub fn with_conversion_events<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.conversion_events = events.into_iter().map(Into::into).collect();
        self
    }

    async fn run_report(&self, request: &RunReportRequest) -> anyhow::Result<ReportTable> {
        let token = self.tokens.access_token(&self.http).await?;
        let url = format!(
            "{}/v1beta/properties/{}:runReport",
            self.api_base, self.property_id
        );
        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(request)
            .send()
            .await
            .context("runReport request failed")?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("runReport returned {status}: {body}");
        }
        let table: ReportTable = response
            .json()
            .await
            .context("invalid runReport response")?;
        Ok(table)
    }

    async fn fetch_audience(&self, period: ReportPeriod) -> anyhow::Result<AudienceMetrics> {
        let table = self
            .run_report(&RunReportRequest::totals(
                period,
                &["totalUsers", "newUsers", "sessions"],
            ))
            .await
            .context("audience report")?;
        if table.rows.is_empty() {
            warn!("no audience data returned");
        }
        Ok(AudienceMetrics {
            total_users: table.metric_count("totalUsers")?,
            new_users: table.metric_count("newUsers")?,
            sessions: table.metric_count("sessions")?,
        })
    }

    async fn fetch_engagement(&self, period: ReportPeriod) -> anyhow::Result<EngagementMetrics> {
        let table = self
            .run_report(&RunReportRequest::totals(
                period,
                &["userEngagementDuration", "engagedSessions", "sessions"],
            ))
            .await
            .context("engagement report")?;
        let duration = table.metric_total("userEngagementDuration")?;
        let engaged = table.metric_count("engagedSessions")?;
        let sessions = table.metric_count("sessions")?;
        let engagement = match (engaged, sessions) {
            (Some(engaged), Some(sessions)) => {
                EngagementMetrics::from_totals(engaged, sessions, duration.unwrap_or(0.0))?
            }
            _ => EngagementMetrics::new(None, engaged, None)?,
        };
        Ok(engagement)
    }

    async fn fetch_acquisition(
        &self,
        period: ReportPeriod,
    ) -> anyhow::Result<Vec<AcquisitionEntry>> {
        let table = self
            .run_report(&RunReportRequest::ranked(
                period,
                &["sessionSource", "sessionMedium"],
                "totalUsers",
                ACQUISITION_LIMIT,
            ))
            .await
            .context("acquisition report")?;
        table
            .rows
            .iter()
            .map(|row| -> anyhow::Result<AcquisitionEntry> {
                Ok(AcquisitionEntry::new(
                    row.dimension(0),
                    row.dimension(1),
                    parse_count(row.metric(0))?,
                ))
            })
            .collect()
    }

    async fn fetch_geography(&self, period: ReportPeriod) -> anyhow::Result<Vec<GeographicEntry>> {
        let table = self
            .run_report(&RunReportRequest::ranked(
                period,
                &["city", "country"],
                "totalUsers",
                GEOGRAPHY_LIMIT,
            ))
            .await
            .context("geography report")?;
        table
            .rows
            .iter()
            .map(|row| -> anyhow::Result<GeographicEntry> {
                Ok(GeographicEntry::new(
                    row.dimension(0),
                    row.dimension(1),
                    parse_count(row.metric(0))?,
                ))
            })
            .collect()
    }

    /// One report per event name. An event that cannot be fetched (for
    /// example, not configured on the property) counts as zero.
    async fn fetch_conversions(&self, period: ReportPeriod) -> ConversionMetrics {
        let mut counts = Vec::with_capacity(self.conversion_events.len());
        for event in &self.conversion_events {
            let request = RunReportRequest::event_count(period, event);
            let count = match self.run_report(&request).await {
                Ok(table) => match table.rows.first().map(|row| parse_count(row.metric(0))) {
                    Some(Ok(count)) => count,
                    Some(Err(err)) => {
                        warn!(event = %event, error = %err, "unreadable conversion count");
                        0
                    }
                    None => {
                        debug!(event = %event, "no data for conversion event");
                        0
                    }
                },
                Err(err) => {
                    warn!(
                        event = %event,
                        error = %format!("{err:#}"),
                        "could not fetch conversion event; it may not be configured"
                    );
                    0
                }
            };
            counts.push((event.clone(), count));
        }
        ConversionMetrics::new(counts)
    }
}

#[async_trait]
impl AnalyticsSource for Ga4Client {
    async fn fetch_bundle(&self, period: ReportPeriod) -> anyhow::Result<AnalyticsBundle> {
        info!(period = %period, "fetching analytics");
        let audience = self.fetch_audience(period).await?;
        let engagement = self.fetch_engagement(period).await?;
        let acquisition = self.fetch_acquisition(period).await?;
        let conversions = self.fetch_conversions(period).await;
        let geographic = self.fetch_geography(period).await?;

        let bundle = AnalyticsBundle {
            period,
            audience,
            engagement,
            conversions,
            acquisition,
            geographic,
        };
        info!(
            period = %period,
            users = ?bundle.audience.total_users,
            sessions = ?bundle.audience.sessions,
            conversions = bundle.total_conversions(),
            "analytics fetched"
        );
        Ok(bundle)
    }

    async fn check_connection(&self) -> anyhow::Result<()> {
        let yesterday = Utc::now().date_naive() - chrono::Duration::days(1);
        let period = ReportPeriod::ending_on(yesterday, 1)?;
        self.run_report(&RunReportRequest::totals(period, &["sessions"]))
            .await
            .context("Google Analytics connection test")?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "google_analytics"
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunReportRequest {
    date_ranges: Vec<DateRange>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    dimensions: Vec<Named>,
    metrics: Vec<Named>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    order_bys: Vec<OrderBy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimension_filter: Option<FilterExpression>,
    /// int64 fields travel as strings in the API's JSON mapping.
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<String>,
}

impl RunReportRequest {
    fn totals(period: ReportPeriod, metrics: &[&str]) -> Self {
        Self {
            date_ranges: vec![DateRange::from(period)],
            dimensions: vec![],
            metrics: named(metrics),
            order_bys: vec![],
            dimension_filter: None,
            limit: None,
        }
    }

    fn ranked(period: ReportPeriod, dimensions: &[&str], metric: &str, limit: u32) -> Self {
        Self {
            date_ranges: vec![DateRange::from(period)],
            dimensions: named(dimensions),
            metrics: named(&[metric]),
            order_bys: vec![OrderBy {
                metric: MetricOrderBy {
                    metric_name: metric.to_string(),
                },
                desc: true,
            }],
            dimension_filter: None,
            limit: Some(limit.to_string()),
        }
    }

    fn event_count(period: ReportPeriod, event: &str) -> Self {
        Self {
            date_ranges: vec![DateRange::from(period)],
            dimensions: named(&["eventName"]),
            metrics: named(&["eventCount"]),
            order_bys: vec![],
            dimension_filter: Some(FilterExpression {
                filter: Filter {
                    field_name: "eventName".to_string(),
                    string_filter: StringFilter {
                        match_type: "EXACT".to_string(),
                        value: event.to_string(),
                    },
                },
            }),
            limit: None,
        }
    }
}

fn named(names: &[&str]) -> Vec<Named> {
    names
        .iter()
        .map(|name| Named {
            name: name.to_string(),
        })
        .collect()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DateRange {
    start_date: String,
    end_date: String,
}

impl From<ReportPeriod> for DateRange {
    fn from(period: ReportPeriod) -> Self {
        Self {
            start_date: period.start().format("%Y-%m-%d").to_string(),
            end_date: period.end().format("%Y-%m-%d").to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Named {
    name: String,
}

#[derive(Debug, Serialize)]
struct OrderBy {
    metric: MetricOrderBy,
    desc: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MetricOrderBy {
    metric_name: String,
}

#[derive(Debug, Serialize)]
struct FilterExpression {
    filter: Filter,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Filter {
    field_name: String,
    string_filter: StringFilter,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StringFilter {
    match_type: String,
    value: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ReportTable {
    metric_headers: Vec<Named>,
    rows: Vec<ReportRow>,
}

impl ReportTable {
    /// Value of a totals-only report's metric. `None` when the response has
    /// no column for it; zero when the column exists but no rows came back.
    fn metric_total(&self, name: &str) -> anyhow::Result<Option<f64>> {
        let Some(index) = self.metric_headers.iter().position(|h| h.name == name) else {
            return Ok(None);
        };
        match self.rows.first() {
            None => Ok(Some(0.0)),
            Some(row) => parse_decimal(row.metric(index)).map(Some),
        }
    }

    fn metric_count(&self, name: &str) -> anyhow::Result<Option<u64>> {
        let Some(index) = self.metric_headers.iter().position(|h| h.name == name) else {
            return Ok(None);
        };
        match self.rows.first() {
            None => Ok(Some(0)),
            Some(row) => parse_count(row.metric(index)).map(Some),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ReportRow {
    dimension_values: Vec<Cell>,
    metric_values: Vec<Cell>,
}

impl ReportRow {
    fn dimension(&self, index: usize) -> &str {
        self.dimension_values
            .get(index)
            .map(|c| c.value.as_str())
            .unwrap_or_default()
    }

    fn metric(&self, index: usize) -> &str {
        self.metric_values
            .get(index)
            .map(|c| c.value.as_str())
            .unwrap_or_default()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Cell {
    value: String,
}

fn parse_decimal(raw: &str) -> anyhow::Result<f64> {
    let value: f64 = raw
        .trim()
        .parse()
        .with_context(|| format!("invalid metric value {raw:?}"))?;
    if !value.is_finite() || value < 0.0 {
        bail!("invalid metric value {raw:?}");
    }
    Ok(value)
}

/// Counts arrive as integer strings; decimals are rounded.
fn parse_count(raw: &str) -> anyhow::Result<u64> {
    match raw.trim().parse::<u64>() {
        Ok(count) => Ok(count),
        Err(_) => parse_decimal(raw).map(|v| v.round() as u64),
    }
}

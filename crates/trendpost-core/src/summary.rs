use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classifier::{classify, ChangeResult, MetricValue};
use crate::config::AnalysisConfig;
use crate::error::{CoreError, Result};
use crate::insights::{find_change, generate_insights};
use crate::metrics::{AnalyticsBundle, TrackedMetric};
use crate::period::ReportPeriod;
use crate::recommendations::generate_recommendations;

/// One row of a ranked breakdown (traffic sources, locations).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakdownRow {
    pub label: String,
    pub users: u64,
    pub share_percent: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    period: ReportPeriod,
    metric_changes: Vec<ChangeResult>,
    insights: Vec<String>,
    recommendations: Vec<String>,
    raw_bundle_current: AnalyticsBundle,
}

impl AnalyticsSummary {
    pub fn period(&self) -> ReportPeriod {
        self.period
    }

    pub fn period_days(&self) -> i64 {
        self.period.days()
    }

    pub fn metric_changes(&self) -> &[ChangeResult] {
        &self.metric_changes
    }

    pub fn change(&self, metric: TrackedMetric) -> Option<&ChangeResult> {
        find_change(&self.metric_changes, metric)
    }

    pub fn insights(&self) -> &[String] {
        &self.insights
    }

    pub fn recommendations(&self) -> &[String] {
        &self.recommendations
    }

    pub fn current_bundle(&self) -> &AnalyticsBundle {
        &self.raw_bundle_current
    }

    /// The `limit` largest traffic sources, in provider order.
    pub fn top_sources(&self, limit: usize) -> Vec<BreakdownRow> {
        let bundle = &self.raw_bundle_current;
        bundle
            .acquisition
            .iter()
            .take(limit)
            .map(|entry| BreakdownRow {
                label: entry.label(),
                users: entry.users,
                share_percent: bundle.user_share(entry.users),
            })
            .collect()
    }

    /// The `limit` largest cities, in provider order.
    pub fn top_locations(&self, limit: usize) -> Vec<BreakdownRow> {
        let bundle = &self.raw_bundle_current;
        bundle
            .geographic
            .iter()
            .take(limit)
            .map(|entry| BreakdownRow {
                label: entry.label(),
                users: entry.users,
                share_percent: bundle.user_share(entry.users),
            })
            .collect()
    }
}

/// Compares `current` against `previous` and produces the run's summary.
///
/// A bundle missing any value of the fixed metric list fails with
/// `IncompleteBundle` instead of being read as zero. `current` must cover
/// exactly `period`.
pub fn assemble(
    current: &AnalyticsBundle,
    previous: &AnalyticsBundle,
    period: ReportPeriod,
    config: &AnalysisConfig,
) -> Result<AnalyticsSummary> {
    config.validate().map_err(CoreError::InvalidConfig)?;
    if current.period != period {
        return Err(CoreError::InvalidPeriod(format!(
            "current bundle covers {} but the report period is {period}",
            current.period
        )));
    }

    let mut metric_changes = Vec::with_capacity(TrackedMetric::ALL.len());
    for metric in TrackedMetric::ALL {
        let value = MetricValue::new(
            metric.key(),
            current.require(metric, "current")?,
            previous.require(metric, "previous")?,
        )?;
        let change = classify(&value, config.trend_threshold_percent);
        debug!(
            metric = metric.key(),
            current = change.current,
            previous = change.previous,
            delta_percent = ?change.delta_percent,
            trend = ?change.trend,
            "metric classified"
        );
        metric_changes.push(change);
    }

    let insights = generate_insights(current, previous, &metric_changes, config);
    let recommendations = generate_recommendations(current, &metric_changes, config);

    debug!(
        period = %period,
        insights = insights.len(),
        recommendations = recommendations.len(),
        "summary assembled"
    );

    Ok(AnalyticsSummary {
        period,
        metric_changes,
        insights,
        recommendations,
        raw_bundle_current: current.clone(),
    })
}

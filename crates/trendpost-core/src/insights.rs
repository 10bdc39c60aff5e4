use crate::classifier::{ChangeResult, Trend};
use crate::config::AnalysisConfig;
use crate::format;
use crate::metrics::{AnalyticsBundle, TrackedMetric};

/// One sentence at most per category, in a fixed category order.
pub fn generate_insights(
    current: &AnalyticsBundle,
    previous: &AnalyticsBundle,
    changes: &[ChangeResult],
    config: &AnalysisConfig,
) -> Vec<String> {
    [
        volume_insight("Traffic", "sessions", find_change(changes, TrackedMetric::Sessions)),
        volume_insight(
            "Total users",
            "users",
            find_change(changes, TrackedMetric::TotalUsers),
        ),
        engagement_insight(current, config),
        acquisition_insight(current, previous),
        conversion_insight(current),
        geographic_insight(current),
    ]
    .into_iter()
    .flatten()
    .collect()
}

pub(crate) fn find_change(changes: &[ChangeResult], metric: TrackedMetric) -> Option<&ChangeResult> {
    changes.iter().find(|change| change.metric == metric.key())
}

fn volume_insight(subject: &str, unit: &str, change: Option<&ChangeResult>) -> Option<String> {
    let change = change?;
    let span = format!(
        "{} → {} {unit}",
        format::metric(change.previous),
        format::metric(change.current)
    );
    match (change.trend, change.delta_percent) {
        (Trend::Stable, _) => None,
        (Trend::Up, None) => Some(format!(
            "{subject} is new this period: {} {unit} with none in the previous period",
            format::metric(change.current)
        )),
        (Trend::Up, Some(pct)) => Some(format!(
            "{subject} increased by {pct:.1}% compared to the previous period ({span})"
        )),
        (Trend::Down, Some(pct)) => Some(format!(
            "{subject} decreased by {:.1}% compared to the previous period ({span})",
            pct.abs()
        )),
        (Trend::Down, None) => None,
    }
}

fn engagement_insight(current: &AnalyticsBundle, config: &AnalysisConfig) -> Option<String> {
    let rate = current.engagement.engagement_rate()?;
    if rate > config.engagement_high_percent {
        Some(format!(
            "Strong engagement rate of {rate:.1}% indicates visitors are finding content valuable"
        ))
    } else if rate < config.engagement_low_percent {
        Some(format!(
            "Low engagement rate of {rate:.1}% suggests content may need improvement"
        ))
    } else {
        None
    }
}

fn acquisition_insight(current: &AnalyticsBundle, previous: &AnalyticsBundle) -> Option<String> {
    let top = current.top_source()?;
    let reach = match current.user_share(top.users) {
        Some(share) => format!("{share:.1}% of users"),
        None => format!("{} users", format::count(top.users)),
    };
    let mut sentence = format!("Primary traffic source: {} ({reach})", top.label());
    if let Some(prior) = previous.top_source() {
        if prior.source != top.source || prior.medium != top.medium {
            sentence.push_str(&format!(", taking over from {}", prior.label()));
        }
    }
    Some(sentence)
}

fn conversion_insight(current: &AnalyticsBundle) -> Option<String> {
    let total = current.total_conversions();
    if total == 0 {
        return None;
    }
    let mut sentence = format!(
        "Total conversions: {} (rate: {:.2}%)",
        format::count(total),
        current.conversion_rate()
    );
    if let Some(dominant) = current.conversions.dominant() {
        sentence.push_str(&format!(
            ", led by {} ({})",
            dominant.category,
            format::count(dominant.count)
        ));
    }
    Some(sentence)
}

fn geographic_insight(current: &AnalyticsBundle) -> Option<String> {
    let top = current.top_city()?;
    Some(match current.user_share(top.users) {
        Some(share) => format!("Top location: {} ({share:.1}% of users)", top.label()),
        None => format!(
            "Top location: {} ({} users)",
            top.label(),
            format::count(top.users)
        ),
    })
}

use crate::classifier::{ChangeResult, Trend};
use crate::config::AnalysisConfig;
use crate::insights::find_change;
use crate::metrics::{AnalyticsBundle, TrackedMetric};

/// Below this many sessions a low conversion rate is treated as noise.
const MIN_SESSIONS_FOR_CONVERSION_RATE: u64 = 100;

/// Rules run in priority order and each fires at most once; every firing
/// rule is kept.
pub fn generate_recommendations(
    current: &AnalyticsBundle,
    changes: &[ChangeResult],
    config: &AnalysisConfig,
) -> Vec<String> {
    [
        engagement_rule(current, config),
        acquisition_concentration_rule(current, config),
        conversion_rule(current, config),
        geographic_concentration_rule(current, config),
        traffic_decline_rule(changes),
    ]
    .into_iter()
    .flatten()
    .collect()
}

fn engagement_rule(current: &AnalyticsBundle, config: &AnalysisConfig) -> Option<String> {
    let rate = current.engagement.engagement_rate()?;
    (rate < config.engagement_low_percent).then(|| {
        format!(
            "Engagement rate is only {rate:.1}%: improve above-the-fold content, page load speed \
             and overall user experience"
        )
    })
}

fn acquisition_concentration_rule(
    current: &AnalyticsBundle,
    config: &AnalysisConfig,
) -> Option<String> {
    let top = current.top_source()?;
    let share = current.user_share(top.users)?;
    (share > config.acquisition_concentration_percent).then(|| {
        format!(
            "{} brings {share:.1}% of users: diversify acquisition channels through SEO, social \
             media and content marketing",
            top.label()
        )
    })
}

fn conversion_rule(current: &AnalyticsBundle, config: &AnalysisConfig) -> Option<String> {
    if current.total_conversions() == 0 {
        return Some(
            "No conversions were recorded: add or verify conversion tracking events".to_string(),
        );
    }
    let sessions = current.audience.sessions.unwrap_or(0);
    let rate = current.conversion_rate();
    (rate < config.conversion_rate_low_percent && sessions > MIN_SESSIONS_FOR_CONVERSION_RATE)
        .then(|| {
            format!(
                "Conversion rate is {rate:.2}%: review call-to-action placement and form \
                 accessibility"
            )
        })
}

fn geographic_concentration_rule(
    current: &AnalyticsBundle,
    config: &AnalysisConfig,
) -> Option<String> {
    let top = current.top_city()?;
    let share = current.user_share(top.users)?;
    (share > config.geo_concentration_percent).then(|| {
        format!(
            "{share:.1}% of users come from {}: consider content or campaigns aimed at other \
             regions",
            top.label()
        )
    })
}

fn traffic_decline_rule(changes: &[ChangeResult]) -> Option<String> {
    let sessions = find_change(changes, TrackedMetric::Sessions)?;
    (sessions.trend == Trend::Down).then(|| {
        "Traffic is declining: review recent content changes and SEO optimization".to_string()
    })
}

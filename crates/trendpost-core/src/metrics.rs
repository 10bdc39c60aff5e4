use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::period::ReportPeriod;

/// The fixed list of metrics compared period over period, in report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackedMetric {
    Sessions,
    TotalUsers,
    NewUsers,
    EngagementRate,
}

impl TrackedMetric {
    pub const ALL: [TrackedMetric; 4] = [
        TrackedMetric::Sessions,
        TrackedMetric::TotalUsers,
        TrackedMetric::NewUsers,
        TrackedMetric::EngagementRate,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            TrackedMetric::Sessions => "sessions",
            TrackedMetric::TotalUsers => "total_users",
            TrackedMetric::NewUsers => "new_users",
            TrackedMetric::EngagementRate => "engagement_rate",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TrackedMetric::Sessions => "Sessions",
            TrackedMetric::TotalUsers => "Total users",
            TrackedMetric::NewUsers => "New users",
            TrackedMetric::EngagementRate => "Engagement rate",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|metric| metric.key() == key)
    }

    pub fn is_percentage(&self) -> bool {
        matches!(self, TrackedMetric::EngagementRate)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudienceMetrics {
    pub total_users: Option<u64>,
    pub new_users: Option<u64>,
    pub sessions: Option<u64>,
}

impl AudienceMetrics {
    pub fn new(total_users: u64, new_users: u64, sessions: u64) -> Self {
        Self {
            total_users: Some(total_users),
            new_users: Some(new_users),
            sessions: Some(sessions),
        }
    }
}

/// Engagement figures. The rate is a percentage of sessions in `[0, 100]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawEngagement")]
pub struct EngagementMetrics {
    engagement_rate: Option<f64>,
    engaged_sessions: Option<u64>,
    average_engagement_time: Option<f64>,
}

#[derive(Deserialize)]
struct RawEngagement {
    engagement_rate: Option<f64>,
    engaged_sessions: Option<u64>,
    average_engagement_time: Option<f64>,
}

impl TryFrom<RawEngagement> for EngagementMetrics {
    type Error = CoreError;

    fn try_from(raw: RawEngagement) -> Result<Self> {
        Self::new(
            raw.engagement_rate,
            raw.engaged_sessions,
            raw.average_engagement_time,
        )
    }
}

impl EngagementMetrics {
    pub fn new(
        engagement_rate: Option<f64>,
        engaged_sessions: Option<u64>,
        average_engagement_time: Option<f64>,
    ) -> Result<Self> {
        if let Some(rate) = engagement_rate {
            if !rate.is_finite() || !(0.0..=100.0).contains(&rate) {
                return Err(CoreError::InvalidMetric {
                    metric: TrackedMetric::EngagementRate.key().to_string(),
                    value: rate,
                });
            }
        }
        if let Some(seconds) = average_engagement_time {
            if !seconds.is_finite() || seconds < 0.0 {
                return Err(CoreError::InvalidMetric {
                    metric: "average_engagement_time".to_string(),
                    value: seconds,
                });
            }
        }
        Ok(Self {
            engagement_rate,
            engaged_sessions,
            average_engagement_time,
        })
    }

    /// Derives the rate and average time from raw session totals.
    /// With zero sessions both derived values are zero.
    pub fn from_totals(
        engaged_sessions: u64,
        sessions: u64,
        total_engagement_seconds: f64,
    ) -> Result<Self> {
        let (rate, average) = if sessions > 0 {
            (
                (engaged_sessions as f64 / sessions as f64 * 100.0).min(100.0),
                total_engagement_seconds / sessions as f64,
            )
        } else {
            (0.0, 0.0)
        };
        Self::new(Some(rate), Some(engaged_sessions), Some(average))
    }

    pub fn engagement_rate(&self) -> Option<f64> {
        self.engagement_rate
    }

    pub fn engaged_sessions(&self) -> Option<u64> {
        self.engaged_sessions
    }

    pub fn average_engagement_time(&self) -> Option<f64> {
        self.average_engagement_time
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionEntry {
    pub source: String,
    pub medium: String,
    pub users: u64,
}

impl AcquisitionEntry {
    pub fn new(source: impl Into<String>, medium: impl Into<String>, users: u64) -> Self {
        Self {
            source: source.into(),
            medium: medium.into(),
            users,
        }
    }

    /// `google/organic`
    pub fn label(&self) -> String {
        format!("{}/{}", self.source, self.medium)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeographicEntry {
    pub city: String,
    pub country: String,
    pub users: u64,
}

impl GeographicEntry {
    pub fn new(city: impl Into<String>, country: impl Into<String>, users: u64) -> Self {
        Self {
            city: city.into(),
            country: country.into(),
            users,
        }
    }

    pub fn label(&self) -> String {
        if self.country.is_empty() {
            self.city.clone()
        } else {
            format!("{}, {}", self.city, self.country)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionCount {
    pub category: String,
    pub count: u64,
}

/// Conversion event counts by category, in provider order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionMetrics {
    pub categories: Vec<ConversionCount>,
}

impl ConversionMetrics {
    /// Event names counted as conversions when nothing else is configured.
    pub const DEFAULT_CATEGORIES: [&'static str; 3] = ["form_submit", "email_click", "phone_click"];

    pub fn new<I, S>(counts: I) -> Self
    where
        I: IntoIterator<Item = (S, u64)>,
        S: Into<String>,
    {
        Self {
            categories: counts
                .into_iter()
                .map(|(category, count)| ConversionCount {
                    category: category.into(),
                    count,
                })
                .collect(),
        }
    }

    pub fn total(&self) -> u64 {
        self.categories.iter().map(|c| c.count).sum()
    }

    /// Category with the highest count; the earliest one wins a tie.
    pub fn dominant(&self) -> Option<&ConversionCount> {
        first_max_by_key(&self.categories, |c| c.count)
    }
}

/// One reporting period's full set of raw metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsBundle {
    pub period: ReportPeriod,
    pub audience: AudienceMetrics,
    pub engagement: EngagementMetrics,
    pub conversions: ConversionMetrics,
    pub acquisition: Vec<AcquisitionEntry>,
    pub geographic: Vec<GeographicEntry>,
}

impl AnalyticsBundle {
    pub fn value(&self, metric: TrackedMetric) -> Option<f64> {
        match metric {
            TrackedMetric::Sessions => self.audience.sessions.map(|v| v as f64),
            TrackedMetric::TotalUsers => self.audience.total_users.map(|v| v as f64),
            TrackedMetric::NewUsers => self.audience.new_users.map(|v| v as f64),
            TrackedMetric::EngagementRate => self.engagement.engagement_rate(),
        }
    }

    /// Like [`Self::value`], but a missing value is an `IncompleteBundle` error.
    pub fn require(&self, metric: TrackedMetric, bundle: &'static str) -> Result<f64> {
        self.value(metric).ok_or(CoreError::IncompleteBundle {
            bundle,
            field: metric.key(),
        })
    }

    pub fn total_conversions(&self) -> u64 {
        self.conversions.total()
    }

    /// Conversions per session, in percent. Zero when there were no sessions.
    pub fn conversion_rate(&self) -> f64 {
        match self.audience.sessions {
            Some(sessions) if sessions > 0 => {
                self.total_conversions() as f64 / sessions as f64 * 100.0
            }
            _ => 0.0,
        }
    }

    /// Highest-user source/medium pair; the earliest one wins a tie.
    pub fn top_source(&self) -> Option<&AcquisitionEntry> {
        first_max_by_key(&self.acquisition, |e| e.users)
    }

    /// Highest-user city; the earliest one wins a tie.
    pub fn top_city(&self) -> Option<&GeographicEntry> {
        first_max_by_key(&self.geographic, |e| e.users)
    }

    /// Share of total users, in percent. `None` when total users are unknown or zero.
    pub fn user_share(&self, users: u64) -> Option<f64> {
        match self.audience.total_users {
            Some(total) if total > 0 => Some(users as f64 / total as f64 * 100.0),
            _ => None,
        }
    }
}

/// `Iterator::max_by_key` keeps the last maximum; reports need the first.
pub(crate) fn first_max_by_key<T>(items: &[T], key: impl Fn(&T) -> u64) -> Option<&T> {
    let mut best: Option<&T> = None;
    for item in items {
        match best {
            Some(current) if key(item) <= key(current) => {}
            _ => best = Some(item),
        }
    }
    best
}

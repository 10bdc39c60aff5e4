use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::format;

pub const DEFAULT_TREND_THRESHOLD_PERCENT: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

impl Trend {
    pub fn arrow(&self) -> &'static str {
        match self {
            Trend::Up => "↑",
            Trend::Down => "↓",
            Trend::Stable => "→",
        }
    }
}

/// A validated observation of one metric across two periods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMetricValue")]
pub struct MetricValue {
    name: String,
    current: f64,
    previous: f64,
}

#[derive(Deserialize)]
struct RawMetricValue {
    name: String,
    current: f64,
    previous: f64,
}

impl TryFrom<RawMetricValue> for MetricValue {
    type Error = CoreError;

    fn try_from(raw: RawMetricValue) -> Result<Self> {
        Self::new(raw.name, raw.current, raw.previous)
    }
}

impl MetricValue {
    /// Rejects negative and non-finite values; counts and rates are never negative.
    pub fn new(name: impl Into<String>, current: f64, previous: f64) -> Result<Self> {
        let name = name.into();
        for value in [current, previous] {
            if !value.is_finite() || value < 0.0 {
                return Err(CoreError::InvalidMetric {
                    metric: name,
                    value,
                });
            }
        }
        Ok(Self {
            name,
            current,
            previous,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn previous(&self) -> f64 {
        self.previous
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeResult {
    pub metric: String,
    pub current: f64,
    pub previous: f64,
    pub delta_absolute: f64,
    /// `None` when the previous value was zero and the current one is not.
    pub delta_percent: Option<f64>,
    pub trend: Trend,
}

impl ChangeResult {
    /// The metric appeared this period after being zero in the previous one.
    pub fn is_new(&self) -> bool {
        self.delta_percent.is_none()
    }

    /// `+25.0%`, `-4.8%`, or `new`.
    pub fn delta_label(&self) -> String {
        match self.delta_percent {
            Some(pct) => format::signed_percent(pct),
            None => "new".to_string(),
        }
    }
}

/// Classifies the change between the two values of `value`.
///
/// A change is `Stable` while its magnitude stays below `threshold_percent`.
/// Growth from zero has no defined percentage and is always `Up`.
pub fn classify(value: &MetricValue, threshold_percent: f64) -> ChangeResult {
    let current = value.current();
    let previous = value.previous();
    let delta_absolute = current - previous;

    let (delta_percent, trend) = if previous == 0.0 {
        if current == 0.0 {
            (Some(0.0), Trend::Stable)
        } else {
            (None, Trend::Up)
        }
    } else {
        let pct = delta_absolute / previous * 100.0;
        let trend = if pct == 0.0 || pct.abs() < threshold_percent {
            Trend::Stable
        } else if pct > 0.0 {
            Trend::Up
        } else {
            Trend::Down
        };
        (Some(pct), trend)
    };

    ChangeResult {
        metric: value.name().to_string(),
        current,
        previous,
        delta_absolute,
        delta_percent,
        trend,
    }
}

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// An inclusive date range covered by one report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPeriod")]
pub struct ReportPeriod {
    start: NaiveDate,
    end: NaiveDate,
}

#[derive(Deserialize)]
struct RawPeriod {
    start: NaiveDate,
    end: NaiveDate,
}

impl TryFrom<RawPeriod> for ReportPeriod {
    type Error = CoreError;

    fn try_from(raw: RawPeriod) -> Result<Self> {
        Self::new(raw.start, raw.end)
    }
}

impl ReportPeriod {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if end < start {
            return Err(CoreError::InvalidPeriod(format!(
                "end date {end} is before start date {start}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Parses `YYYY-MM-DD` bounds.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        let parse = |raw: &str, field: &str| {
            NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
                CoreError::InvalidPeriod(format!("invalid {field} (expected YYYY-MM-DD)"))
            })
        };
        Self::new(parse(start, "start date")?, parse(end, "end date")?)
    }

    /// The `days`-long period that ends on `end`.
    pub fn ending_on(end: NaiveDate, days: u32) -> Result<Self> {
        if days == 0 {
            return Err(CoreError::InvalidPeriod(
                "period must span at least one day".to_string(),
            ));
        }
        let start = end
            .checked_sub_days(Days::new(u64::from(days) - 1))
            .ok_or_else(|| out_of_range(end))?;
        Self::new(start, end)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Inclusive number of days.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// The period of equal length ending the day before this one starts.
    pub fn previous(&self) -> Result<Self> {
        let end = self
            .start
            .checked_sub_days(Days::new(1))
            .ok_or_else(|| out_of_range(self.start))?;
        let start = end
            .checked_sub_days(Days::new(self.days().unsigned_abs() - 1))
            .ok_or_else(|| out_of_range(end))?;
        Ok(Self { start, end })
    }
}

fn out_of_range(from: NaiveDate) -> CoreError {
    CoreError::InvalidPeriod(format!("period before {from} is out of the supported date range"))
}

impl std::fmt::Display for ReportPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

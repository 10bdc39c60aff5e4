use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// A classifier input was negative or not a finite number.
    #[error("invalid value for metric {metric}: {value}")]
    InvalidMetric { metric: String, value: f64 },

    /// A bundle is missing a value the fixed metric list depends on.
    #[error("incomplete {bundle} bundle: missing {field}")]
    IncompleteBundle {
        bundle: &'static str,
        field: &'static str,
    },

    #[error("invalid period: {0}")]
    InvalidPeriod(String),

    /// Analysis thresholds out of range.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

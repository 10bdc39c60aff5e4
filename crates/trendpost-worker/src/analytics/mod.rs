use async_trait::async_trait;
use trendpost_core::metrics::AnalyticsBundle;
use trendpost_core::period::ReportPeriod;

pub mod auth;
pub mod ga4;

pub use ga4::Ga4Client;

/// Source of one period's raw metrics.
///
/// A failed fetch means no usable bundle; implementations never substitute
/// zeros for a failed request.
#[async_trait]
pub trait AnalyticsSource: Send + Sync {
    async fn fetch_bundle(&self, period: ReportPeriod) -> anyhow::Result<AnalyticsBundle>;

    /// Cheap request proving credentials and property access.
    async fn check_connection(&self) -> anyhow::Result<()>;

    fn name(&self) -> &'static str;
}

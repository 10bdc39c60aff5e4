use thiserror::Error;
use trendpost_core::error::CoreError;

/// Failure of one report run, tagged with the stage that failed.
///
/// Collaborator errors stay opaque; only the stage matters to the caller.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("analytics fetch failed: {0:#}")]
    Fetch(anyhow::Error),

    #[error("analysis failed: {0}")]
    Analysis(#[from] CoreError),

    #[error("summary generation failed: {0:#}")]
    Generation(anyhow::Error),

    #[error("report delivery failed: {0:#}")]
    Delivery(anyhow::Error),
}

impl PipelineError {
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::Fetch(_) => "fetch",
            PipelineError::Analysis(_) => "analysis",
            PipelineError::Generation(_) => "generation",
            PipelineError::Delivery(_) => "delivery",
        }
    }
}

pub mod classifier;
pub mod config;
pub mod error;
pub mod format;
pub mod insights;
pub mod metrics;
pub mod period;
pub mod recommendations;
pub mod summary;

pub mod analytics;
pub mod email;
pub mod error;
pub mod llm;
pub mod logging;
pub mod pipeline;
pub mod prompt;
pub mod retry;
pub mod scheduler;
pub mod state;

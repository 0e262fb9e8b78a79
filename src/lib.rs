//! Fraud Analysis Pipeline
//!
//! Turns one customer's transaction history into:
//! - a natural-language summary
//! - a bounded list of investigative questions
//! - a coarse risk level (Low / Medium / High)
//!
//! by prompting an external text-generation service and validating its output.
//!
//! PIPELINE:
//! VALIDATE → FETCH → FORMAT → PROMPT → COMPLETE (retry/backoff) → PARSE → RESULT

pub mod api;
pub mod completion;
pub mod config;
pub mod error;
pub mod formatter;
pub mod intent;
pub mod models;
pub mod orchestrator;
pub mod parser;
pub mod prompt;
pub mod store;

pub use error::{AnalysisError, Result};

// Re-export common types
pub use config::{AppConfig, QuestionBounds};
pub use models::*;
pub use orchestrator::{AnalysisStage, Analyzer};

//! Completion service boundary
//!
//! A `CompletionService` performs exactly one request against a text
//! generation backend and classifies its failure. Retries, backoff and the
//! wall-clock bound live in `RetryingCompletionClient`.

use crate::config::CompletionConfig;
use crate::error::{CompletionError, ConfigError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::warn;

pub mod gemini;
pub mod retry;

pub use gemini::GeminiCompletionService;
pub use retry::{
    FixedJitter, Jitter, RandomJitter, RecordingSleeper, RetryPolicy, RetryingCompletionClient,
    Sleeper, TokioSleeper,
};

/// One text-in, text-out call to a generation backend.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;

    /// Model or backend name, for diagnostics.
    fn model(&self) -> &str;
}

/// Build the completion client described by `config`.
///
/// Without a credential every call fails as rejected, so the HTTP server can
/// still serve customer listings and summaries.
pub fn client_from_config(
    config: &CompletionConfig,
) -> Result<RetryingCompletionClient, ConfigError> {
    let service: Arc<dyn CompletionService> = if config.is_configured() {
        Arc::new(GeminiCompletionService::new(config)?)
    } else {
        warn!("GEMINI_API_KEY not set; analysis requests will be rejected");
        Arc::new(UnconfiguredCompletionService)
    };

    Ok(RetryingCompletionClient::new(
        service,
        config.retry,
        config.request_timeout,
    ))
}

/// Stand-in used when no completion credential is configured.
pub struct UnconfiguredCompletionService;

#[async_trait]
impl CompletionService for UnconfiguredCompletionService {
    async fn complete(&self, _prompt: &str) -> Result<String, CompletionError> {
        Err(CompletionError::Unauthorized(
            "GEMINI_API_KEY is not set".to_string(),
        ))
    }

    fn model(&self) -> &str {
        "unconfigured"
    }
}

/// Scripted completion service for development & testing.
/// Replays queued outcomes in order and records every prompt it receives.
pub struct ScriptedCompletionService {
    outcomes: Mutex<VecDeque<Result<String, CompletionError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedCompletionService {
    pub fn new<I>(outcomes: I) -> Self
    where
        I: IntoIterator<Item = Result<String, CompletionError>>,
    {
        Self {
            outcomes: Mutex::new(outcomes.into_iter().collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Always answers with the same text.
    pub fn always(text: impl Into<String>) -> Self {
        Self::new(std::iter::once(Ok(text.into())))
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or_default()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletionService {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        let mut outcomes = self
            .outcomes
            .lock()
            .map_err(|_| CompletionError::Unavailable("script poisoned".to_string()))?;

        // The last outcome repeats once the script runs out.
        if outcomes.len() > 1 {
            outcomes
                .pop_front()
                .unwrap_or_else(|| Err(CompletionError::Unavailable("script empty".to_string())))
        } else {
            outcomes
                .front()
                .cloned()
                .unwrap_or_else(|| Err(CompletionError::Unavailable("script empty".to_string())))
        }
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

//! Configuration management for the analysis pipeline
//!
//! Values come from the process environment (a `.env` file is honoured by the
//! binaries). The loader takes any key lookup so tests never touch the real
//! environment.

use crate::completion::RetryPolicy;
use crate::error::ConfigError;
use crate::models::{MAX_QUESTIONS, MIN_QUESTIONS};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MAX_TRANSACTIONS: usize = 50;

/// Inclusive bounds on the number of investigative questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuestionBounds {
    pub min: usize,
    pub max: usize,
}

impl QuestionBounds {
    pub fn contains(&self, count: usize) -> bool {
        (self.min..=self.max).contains(&count)
    }
}

impl Default for QuestionBounds {
    fn default() -> Self {
        Self {
            min: MIN_QUESTIONS,
            max: MAX_QUESTIONS,
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub completion: CompletionConfig,
    pub pipeline: PipelineConfig,
    pub store: StoreConfig,
    pub server: ServerConfig,
}

/// Completion service connection settings
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    /// Empty when no credential is configured.
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    /// Per-attempt timeout
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl CompletionConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

/// Pipeline shaping
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Most recent transactions kept in the prompt
    pub max_transactions: usize,
    pub questions: QuestionBounds,
    pub store_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub data_file: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

impl AppConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = AppConfig::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let retry = RetryPolicy {
            max_attempts: parse_or(
                &get,
                "COMPLETION_MAX_ATTEMPTS",
                defaults.completion.retry.max_attempts,
            )?,
            base_delay: Duration::from_millis(parse_or(
                &get,
                "COMPLETION_BASE_DELAY_MS",
                defaults.completion.retry.base_delay.as_millis() as u64,
            )?),
            max_delay: Duration::from_millis(parse_or(
                &get,
                "COMPLETION_MAX_DELAY_MS",
                defaults.completion.retry.max_delay.as_millis() as u64,
            )?),
            max_total_wait: Duration::from_millis(parse_or(
                &get,
                "COMPLETION_MAX_TOTAL_WAIT_MS",
                defaults.completion.retry.max_total_wait.as_millis() as u64,
            )?),
        };

        if retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "COMPLETION_MAX_ATTEMPTS",
                value: "0".to_string(),
            });
        }

        let max_transactions: usize =
            parse_or(&get, "MAX_TRANSACTIONS", defaults.pipeline.max_transactions)?;
        if max_transactions == 0 {
            return Err(ConfigError::Invalid {
                key: "MAX_TRANSACTIONS",
                value: "0".to_string(),
            });
        }

        let port = match get("PORT") {
            Some(_) => parse_or(&get, "PORT", defaults.server.port)?,
            None => parse_or(&get, "API_PORT", defaults.server.port)?,
        };

        Ok(Self {
            completion: CompletionConfig {
                api_key: get("GEMINI_API_KEY").unwrap_or_default(),
                model: get("GEMINI_MODEL").unwrap_or(defaults.completion.model),
                base_url: get("GEMINI_BASE_URL")
                    .map(|url| url.trim_end_matches('/').to_string())
                    .unwrap_or(defaults.completion.base_url),
                request_timeout: Duration::from_secs(parse_or(
                    &get,
                    "COMPLETION_TIMEOUT_SECS",
                    defaults.completion.request_timeout.as_secs(),
                )?),
                retry,
            },
            pipeline: PipelineConfig {
                max_transactions,
                questions: QuestionBounds::default(),
                store_timeout: Duration::from_secs(parse_or(
                    &get,
                    "STORE_TIMEOUT_SECS",
                    defaults.pipeline.store_timeout.as_secs(),
                )?),
            },
            store: StoreConfig {
                data_file: get("DATA_FILE_PATH")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.store.data_file),
            },
            server: ServerConfig { port },
        })
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(default),
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            completion: CompletionConfig {
                api_key: String::new(),
                model: DEFAULT_GEMINI_MODEL.to_string(),
                base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
                request_timeout: Duration::from_secs(30),
                retry: RetryPolicy::default(),
            },
            pipeline: PipelineConfig {
                max_transactions: DEFAULT_MAX_TRANSACTIONS,
                questions: QuestionBounds::default(),
                store_timeout: Duration::from_secs(10),
            },
            store: StoreConfig {
                data_file: PathBuf::from("data/transactions.csv"),
            },
            server: ServerConfig { port: 8080 },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.completion.model, "gemini-2.0-flash");
        assert_eq!(config.completion.retry.max_attempts, 3);
        assert_eq!(config.pipeline.questions, QuestionBounds { min: 5, max: 8 });
        assert_eq!(config.pipeline.max_transactions, 50);
        assert_eq!(config.server.port, 8080);
        assert!(!config.completion.is_configured());
    }

    #[test]
    fn test_overrides_from_lookup() {
        let config = AppConfig::from_lookup(lookup(&[
            ("GEMINI_API_KEY", "secret"),
            ("COMPLETION_MAX_ATTEMPTS", "5"),
            ("COMPLETION_BASE_DELAY_MS", "250"),
            ("MAX_TRANSACTIONS", "10"),
            ("API_PORT", "9000"),
            ("GEMINI_BASE_URL", "http://localhost:1234/"),
        ]))
        .unwrap();

        assert!(config.completion.is_configured());
        assert_eq!(config.completion.retry.max_attempts, 5);
        assert_eq!(config.completion.retry.base_delay, Duration::from_millis(250));
        assert_eq!(config.pipeline.max_transactions, 10);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.completion.base_url, "http://localhost:1234");
    }

    #[test]
    fn test_port_takes_precedence_over_api_port() {
        let config =
            AppConfig::from_lookup(lookup(&[("PORT", "3000"), ("API_PORT", "9000")])).unwrap();
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let err = AppConfig::from_lookup(lookup(&[("MAX_TRANSACTIONS", "lots")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "MAX_TRANSACTIONS", .. }));
    }

    #[test]
    fn test_zero_attempts_is_rejected() {
        assert!(AppConfig::from_lookup(lookup(&[("COMPLETION_MAX_ATTEMPTS", "0")])).is_err());
    }

    #[test]
    fn test_question_bounds_contains() {
        let bounds = QuestionBounds::default();
        assert!(!bounds.contains(4));
        assert!(bounds.contains(5));
        assert!(bounds.contains(8));
        assert!(!bounds.contains(9));
    }
}

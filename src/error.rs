//! Error types for the transaction analysis pipeline

use std::time::Duration;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Terminal failure of one analysis request.
#[derive(Error, Debug)]
pub enum AnalysisError {

    // =============================
    // Input / Store
    // =============================

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Customer not found: {0}")]
    CustomerNotFound(String),

    #[error("Transaction store unavailable: {0}")]
    StoreUnavailable(String),

    // =============================
    // Completion Service
    // =============================

    #[error("Completion service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Completion service rate limited: {0}")]
    RateLimited(String),

    #[error("Completion service timed out: {0}")]
    Timeout(String),

    #[error("Completion service rejected the request: {0}")]
    CompletionRejected(String),

    #[error("Malformed completion response: {reason}")]
    MalformedResponse { reason: String, raw: String },

    // =============================
    // Runtime
    // =============================

    #[error("Analysis cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl AnalysisError {
    /// Whether the caller may reasonably retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AnalysisError::ServiceUnavailable(_)
                | AnalysisError::RateLimited(_)
                | AnalysisError::Timeout(_)
                | AnalysisError::StoreUnavailable(_)
        )
    }

    /// Stable label for logs and API payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::InvalidInput(_) => "invalid_input",
            AnalysisError::CustomerNotFound(_) => "customer_not_found",
            AnalysisError::StoreUnavailable(_) => "store_unavailable",
            AnalysisError::ServiceUnavailable(_) => "service_unavailable",
            AnalysisError::RateLimited(_) => "rate_limited",
            AnalysisError::Timeout(_) => "timeout",
            AnalysisError::CompletionRejected(_) => "completion_rejected",
            AnalysisError::MalformedResponse { .. } => "malformed_response",
            AnalysisError::Cancelled => "cancelled",
            AnalysisError::Config(_) => "config",
        }
    }

    /// Raw completion text retained for diagnostics, if any.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            AnalysisError::MalformedResponse { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

/// Outcome of a single completion attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompletionError {
    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },

    #[error("request timed out")]
    Timeout,

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The service answered but withheld content (safety or prompt block).
    #[error("response blocked: {0}")]
    Blocked(String),

    #[error("cancelled")]
    Cancelled,
}

impl CompletionError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CompletionError::RateLimited { .. }
                | CompletionError::Timeout
                | CompletionError::Unavailable(_)
        )
    }
}

impl From<CompletionError> for AnalysisError {
    fn from(err: CompletionError) -> Self {
        match err {
            CompletionError::RateLimited { .. } => {
                AnalysisError::RateLimited("retry attempts exhausted".to_string())
            }
            CompletionError::Timeout => {
                AnalysisError::Timeout("retry attempts exhausted".to_string())
            }
            CompletionError::Unavailable(detail) => AnalysisError::ServiceUnavailable(detail),
            CompletionError::Unauthorized(detail)
            | CompletionError::InvalidRequest(detail)
            | CompletionError::Blocked(detail) => AnalysisError::CompletionRejected(detail),
            CompletionError::Cancelled => AnalysisError::Cancelled,
        }
    }
}

/// Transaction store failures.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("customer {0} not found")]
    NotFound(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("invalid record at line {line}: {detail}")]
    InvalidRecord { line: u64, detail: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl From<StoreError> for AnalysisError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(customer_id) => AnalysisError::CustomerNotFound(customer_id),
            other => AnalysisError::StoreUnavailable(other.to_string()),
        }
    }
}

/// Configuration loading failures.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_error_retry_classification() {
        assert!(CompletionError::RateLimited { retry_after: None }.is_retryable());
        assert!(CompletionError::Timeout.is_retryable());
        assert!(CompletionError::Unavailable("503".into()).is_retryable());
        assert!(!CompletionError::Unauthorized("bad key".into()).is_retryable());
        assert!(!CompletionError::InvalidRequest("400".into()).is_retryable());
        assert!(!CompletionError::Blocked("SAFETY".into()).is_retryable());
        assert!(!CompletionError::Cancelled.is_retryable());
    }

    #[test]
    fn test_completion_error_maps_to_analysis_kind() {
        let err: AnalysisError = CompletionError::Timeout.into();
        assert_eq!(err.kind(), "timeout");
        assert!(err.is_retryable());

        let err: AnalysisError = CompletionError::Unauthorized("401".into()).into();
        assert_eq!(err.kind(), "completion_rejected");
        assert!(!err.is_retryable());

        let err: AnalysisError = CompletionError::Blocked("finish reason: SAFETY".into()).into();
        assert_eq!(err.kind(), "completion_rejected");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_store_not_found_is_distinct() {
        let err: AnalysisError = StoreError::NotFound("C99999".into()).into();
        assert!(matches!(err, AnalysisError::CustomerNotFound(ref id) if id == "C99999"));

        let err: AnalysisError = StoreError::Unavailable("disk".into()).into();
        assert_eq!(err.kind(), "store_unavailable");
    }

    #[test]
    fn test_malformed_response_keeps_raw_text() {
        let err = AnalysisError::MalformedResponse {
            reason: "missing risk level".into(),
            raw: "Summary: ok".into(),
        };
        assert_eq!(err.raw_response(), Some("Summary: ok"));
        assert!(!err.is_retryable());
    }
}

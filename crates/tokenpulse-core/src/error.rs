use std::time::Duration;
use thiserror::Error;

/// Aggregation pipeline errors
#[derive(Error, Debug)]
pub enum AggregatorError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("upstream {upstream} returned status {status}")]
    UpstreamStatus { upstream: &'static str, status: u16 },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("cancelled")]
    Cancelled,

    #[error("all upstreams failed for this tick")]
    AllUpstreamsFailed,
}

impl AggregatorError {
    /// Whether a retry wrapper should re-attempt after this error
    ///
    /// Transport failures, rate limiting, and upstream 5xx responses are
    /// transient; configuration errors and cancellation are terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            AggregatorError::Http(_)
            | AggregatorError::Parse(_)
            | AggregatorError::RateLimited { .. }
            | AggregatorError::UpstreamStatus { .. } => true,
            AggregatorError::Config(_)
            | AggregatorError::Cancelled
            | AggregatorError::AllUpstreamsFailed => false,
        }
    }
}

/// Snapshot store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Read API errors, mapped to HTTP status codes by the transport layer
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("cache unavailable")]
    CacheUnavailable,

    #[error("token not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

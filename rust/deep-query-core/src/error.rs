//! Infrastructural error types for the deep query engine.
//!
//! Content-level rejections (a question failing validation, a child answer
//! not matching a parent keyword, a circular question) are *not* represented
//! here — they are values returned by the component that detects them. Only
//! failures of the LLM/search gateways, configuration, and budget/cancel
//! signals propagate as [`EngineError`].

use thiserror::Error;

/// Errors that cross a gateway or orchestrator boundary.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The LLM or search provider failed outside of a rate limit.
    #[error("backend request failed: {0}")]
    Backend(String),

    /// The provider reported rate limiting; retriable by the gateway.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimit { retry_after_ms: u64 },

    /// A gateway response could not be parsed into the expected shape.
    #[error("failed to parse provider response: {0}")]
    Parse(String),

    /// `LLM_CALLS_PER_DOC` or `SEARCH_CALLS_PER_DOC` was exhausted.
    #[error("budget exhausted: {0}")]
    BudgetExhausted(String),

    /// An external cancel signal was observed at a suspension point.
    #[error("cancelled")]
    Cancelled,

    /// Invalid or inconsistent `EngineConfig`.
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result alias used at gateway and orchestrator boundaries.
pub type Result<T> = std::result::Result<T, EngineError>;

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            EngineError::RateLimit {
                retry_after_ms: 1000,
            }
        } else if let Some(status) = err.status() {
            if status.as_u16() == 429 {
                EngineError::RateLimit {
                    retry_after_ms: 1000,
                }
            } else {
                EngineError::Backend(format!("HTTP {status}: {err}"))
            }
        } else {
            EngineError::Backend(err.to_string())
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Parse(err.to_string())
    }
}

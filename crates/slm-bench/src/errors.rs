//! Error taxonomy with retry classification.
//!
//! Every failure of the chat service maps onto a [`ChatError`] variant, and
//! every variant onto a [`RetryCategory`]. The executor and runner branch on
//! the category instead of matching strings.
//!
//! ## Retry categories
//!
//! | Category   | Retried | Examples                                        |
//! |------------|---------|-------------------------------------------------|
//! | Transient  | yes     | service unreachable, timeout, broken stream, 5xx |
//! | Fatal      | no      | model not found, request rejected (4xx)         |
//! | Cancelled  | no      | user interrupt; unwinds the whole run           |
//!
//! ## Propagation
//!
//! Item-level errors stop at the item (recorded as a failed result),
//! model-level errors stop at the model (skipped), and only
//! [`BenchError`] reaches `main`.

use std::fmt;
use std::time::Duration;

use bench_core::{DatasetError, PersistError};
use thiserror::Error;

/// Classification used by the executor to decide whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryCategory {
    /// Network hiccup or overloaded backend; safe to retry after a backoff.
    Transient,
    /// Retrying the same request cannot succeed.
    Fatal,
    /// User interrupt; terminal for the whole benchmark.
    Cancelled,
}

impl RetryCategory {
    pub fn is_retriable(self) -> bool {
        matches!(self, Self::Transient)
    }
}

impl fmt::Display for RetryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Fatal => write!(f, "fatal"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Errors from the chat completion service.
#[derive(Debug, Clone, Error)]
pub enum ChatError {
    /// Connection to the service could not be established.
    #[error("Cannot connect to inference service at {url}: {message}")]
    Unreachable { url: String, message: String },

    /// The service does not know the requested model.
    #[error("Model '{0}' not found")]
    ModelNotFound(String),

    /// The service answered with a non-success status.
    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Transport failure after the connection was established.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A response line or body could not be decoded.
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// The service reported an error in the middle of a stream.
    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Cancelled")]
    Cancelled,
}

impl ChatError {
    /// Classify this error for retry logic.
    pub fn retry_category(&self) -> RetryCategory {
        match self {
            Self::Unreachable { .. }
            | Self::Timeout(_)
            | Self::Transport(_)
            | Self::Malformed(_)
            | Self::Stream(_) => RetryCategory::Transient,
            Self::Rejected { status, .. } if *status >= 500 || *status == 429 => {
                RetryCategory::Transient
            }
            Self::Rejected { .. } | Self::ModelNotFound(_) => RetryCategory::Fatal,
            Self::Cancelled => RetryCategory::Cancelled,
        }
    }

    /// Returns `true` if the executor may retry after this error.
    pub fn is_retriable(&self) -> bool {
        self.retry_category().is_retriable()
    }

    /// Returns `true` if the service itself could not be reached.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable { .. })
    }
}

/// User-initiated cancellation. Never retried, never recorded as an item failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Benchmark interrupted by user")]
pub struct Cancelled;

/// Errors that end a benchmark session.
#[derive(Debug, Error)]
pub enum BenchError {
    #[error(transparent)]
    Dataset(#[from] DatasetError),

    /// The inference service could not be reached at startup.
    #[error("Inference service unavailable: {0}")]
    ServiceUnavailable(ChatError),

    #[error("Failed to save results: {0}")]
    Persist(#[from] PersistError),

    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

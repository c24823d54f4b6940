//! Node-level error type.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by a node's `execute` method.
///
/// The engine uses the variant to decide retry behaviour:
/// - `Execution { retryable: true, .. }` — re-tried with exponential back-off.
/// - everything else — recorded as the step's error straight away.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum NodeError {
    /// Required node configuration is missing or malformed.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The node's own logic failed (network error, non-2xx response,
    /// business-rule violation).
    #[error("execution error: {message}")]
    Execution {
        message: String,
        /// HTTP status code, when the failure came from an HTTP response.
        status: Option<u16>,
        /// Whether the failure is transient and worth another attempt.
        retryable: bool,
    },

    /// The node did not finish within its time budget.
    #[error("node timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The run was cancelled while the node was in progress.
    #[error("node execution cancelled")]
    Cancelled,
}

impl NodeError {
    /// A missing or invalid configuration value.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// A permanent failure; no retry should be attempted.
    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Execution {
            message: msg.into(),
            status: None,
            retryable: false,
        }
    }

    /// A transient failure; the engine should re-try the node.
    pub fn retryable(msg: impl Into<String>) -> Self {
        Self::Execution {
            message: msg.into(),
            status: None,
            retryable: true,
        }
    }

    /// A non-2xx HTTP response. 5xx, 408 and 429 are transient, every
    /// other status is permanent.
    pub fn http_status(status: u16, msg: impl Into<String>) -> Self {
        Self::Execution {
            message: msg.into(),
            status: Some(status),
            retryable: status >= 500 || status == 408 || status == 429,
        }
    }

    /// `true` when the engine may retry the node after this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Execution { retryable: true, .. })
    }

    /// HTTP status attached to the failure, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Execution { status, .. } => *status,
            _ => None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Execution { .. } => ErrorKind::Execution,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}

/// Coarse classification of a [`NodeError`], recorded on step reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Execution,
    Timeout,
    Cancelled,
}

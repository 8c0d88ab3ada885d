//! # Dispatch Error Types
//!
//! Two enums: [`PublishError`] for a single call to the social platform,
//! and [`DispatchError`] for everything a cycle (or its setup) can hit.
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Dispatch Error Categories                         │
//! │                                                                         │
//! │  PublishError (per post)                 retryable?                     │
//! │  ───────────────────────                 ──────────                     │
//! │  RateLimited         429                 yes                            │
//! │  Rejected            5xx                 yes                            │
//! │  Rejected            other 4xx           no                             │
//! │  Unauthorized        401 / 403           no                             │
//! │  Transport           connect / read      yes                            │
//! │  Timeout             no reply in time    yes                            │
//! │  InvalidResponse     2xx without an id   no                             │
//! │                                                                         │
//! │  DispatchError (per cycle)                                              │
//! │  ─────────────────────────                                              │
//! │  InvalidConfig / ConfigLoadFailed / ConfigSaveFailed                    │
//! │  Database            loading the due list failed                        │
//! │  Client              HTTP client could not be built                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use postcraft_core::dispatch::FailureKind;

/// Result type alias for dispatcher operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Result type alias for a single publish call.
pub type PublishResult<T> = Result<T, PublishError>;

// =============================================================================
// Publish Errors
// =============================================================================

/// Failure of one publish call.
#[derive(Debug, Clone, Error)]
pub enum PublishError {
    /// The platform throttled us (HTTP 429).
    #[error("rate limited by LinkedIn: {0}")]
    RateLimited(String),

    /// The platform refused the request.
    #[error("LinkedIn rejected the post (HTTP {status}): {message}")]
    Rejected {
        status: u16,
        message: String,
        retryable: bool,
    },

    /// The access token was refused (HTTP 401/403).
    #[error("LinkedIn refused the access token (HTTP {status}): {message}")]
    Unauthorized { status: u16, message: String },

    /// The request never got a response.
    #[error("connection to LinkedIn failed: {0}")]
    Transport(String),

    /// No response within the configured timeout.
    #[error("LinkedIn did not respond within {0} seconds")]
    Timeout(u64),

    /// A success status whose body we could not use.
    #[error("unexpected LinkedIn response: {0}")]
    InvalidResponse(String),
}

impl PublishError {
    /// Maps a non-2xx status and its body to an error.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            429 => PublishError::RateLimited(body),
            401 | 403 => PublishError::Unauthorized {
                status,
                message: body,
            },
            500..=599 => PublishError::Rejected {
                status,
                message: body,
                retryable: true,
            },
            _ => PublishError::Rejected {
                status,
                message: body,
                retryable: false,
            },
        }
    }

    /// Whether the post should be tried again on a later cycle.
    pub fn is_retryable(&self) -> bool {
        match self {
            PublishError::RateLimited(_)
            | PublishError::Transport(_)
            | PublishError::Timeout(_) => true,
            PublishError::Rejected { retryable, .. } => *retryable,
            PublishError::Unauthorized { .. } | PublishError::InvalidResponse(_) => false,
        }
    }

    pub fn kind(&self) -> FailureKind {
        if self.is_retryable() {
            FailureKind::Retryable
        } else {
            FailureKind::Permanent
        }
    }
}

impl From<reqwest::Error> for PublishError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            // reqwest does not report the configured duration
            PublishError::Transport(format!("request timed out: {err}"))
        } else if err.is_decode() {
            PublishError::InvalidResponse(err.to_string())
        } else {
            PublishError::Transport(err.to_string())
        }
    }
}

// =============================================================================
// Dispatch Errors
// =============================================================================

/// Dispatcher error type.
#[derive(Debug, Error)]
pub enum DispatchError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid dispatcher configuration.
    #[error("Invalid dispatcher configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Runtime Errors
    // =========================================================================
    /// Database error that prevents the cycle from running.
    #[error("Database error: {0}")]
    Database(#[from] postcraft_db::DbError),

    /// The HTTP client could not be constructed.
    #[error("HTTP client error: {0}")]
    Client(String),
}

impl From<std::io::Error> for DispatchError {
    fn from(err: std::io::Error) -> Self {
        DispatchError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for DispatchError {
    fn from(err: toml::de::Error) -> Self {
        DispatchError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for DispatchError {
    fn from(err: toml::ser::Error) -> Self {
        DispatchError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            PublishError::from_status(429, "slow down".into()),
            PublishError::RateLimited(_)
        ));
        assert!(matches!(
            PublishError::from_status(401, String::new()),
            PublishError::Unauthorized { status: 401, .. }
        ));
        assert!(matches!(
            PublishError::from_status(403, String::new()),
            PublishError::Unauthorized { status: 403, .. }
        ));
        assert!(matches!(
            PublishError::from_status(503, String::new()),
            PublishError::Rejected { status: 503, retryable: true, .. }
        ));
        assert!(matches!(
            PublishError::from_status(422, String::new()),
            PublishError::Rejected { status: 422, retryable: false, .. }
        ));
    }

    #[test]
    fn test_retryability() {
        assert!(PublishError::from_status(429, String::new()).is_retryable());
        assert!(PublishError::from_status(500, String::new()).is_retryable());
        assert!(PublishError::Transport("reset".into()).is_retryable());
        assert!(PublishError::Timeout(15).is_retryable());

        assert!(!PublishError::from_status(400, String::new()).is_retryable());
        assert!(!PublishError::from_status(401, String::new()).is_retryable());
        assert!(!PublishError::InvalidResponse("no id".into()).is_retryable());

        assert_eq!(PublishError::Timeout(15).kind(), FailureKind::Retryable);
        assert_eq!(
            PublishError::from_status(422, String::new()).kind(),
            FailureKind::Permanent
        );
    }

    #[test]
    fn test_messages_carry_status() {
        let err = PublishError::from_status(422, "duplicate content".into());
        assert_eq!(
            err.to_string(),
            "LinkedIn rejected the post (HTTP 422): duplicate content"
        );
    }
}

//! # Error Types
//!
//! Domain-specific error types for postcraft-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  postcraft-core errors (this file)                                     │
//! │  ├── CouponRejection  - Business-rule "no" (returned, never thrown)    │
//! │  ├── PricingError     - Malformed coupon / missing plan price          │
//! │  ├── CoreError        - Illegal state transitions, general domain      │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  postcraft-db      └── DbError                                         │
//! │  postcraft-dispatch└── DispatchError / PublishError                    │
//! │  apps/api          └── ApiError (HTTP body)                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::PostStatus;

// =============================================================================
// Coupon Rejection
// =============================================================================

/// Reasons a coupon cannot be applied.
///
/// The `Display` text is shown verbatim by the checkout UI, so the strings
/// are part of the contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponRejection {
    #[error("not active")]
    NotActive,

    #[error("not yet valid")]
    NotYetValid,

    #[error("expired")]
    Expired,

    #[error("usage limit exceeded")]
    UsageLimitExceeded,

    #[error("usage limit per user exceeded")]
    PerUserLimitExceeded,

    #[error("not applicable to this plan")]
    NotApplicableToPlan,

    #[error("minimum order amount not met")]
    MinimumOrderNotMet,

    #[error("invalid coupon code")]
    InvalidCode,
}

impl CouponRejection {
    /// Machine-readable code for API clients.
    pub fn code(&self) -> &'static str {
        match self {
            CouponRejection::NotActive => "COUPON_NOT_ACTIVE",
            CouponRejection::NotYetValid => "COUPON_NOT_YET_VALID",
            CouponRejection::Expired => "COUPON_EXPIRED",
            CouponRejection::UsageLimitExceeded => "COUPON_USAGE_LIMIT_EXCEEDED",
            CouponRejection::PerUserLimitExceeded => "COUPON_PER_USER_LIMIT_EXCEEDED",
            CouponRejection::NotApplicableToPlan => "COUPON_NOT_APPLICABLE",
            CouponRejection::MinimumOrderNotMet => "COUPON_MINIMUM_NOT_MET",
            CouponRejection::InvalidCode => "COUPON_INVALID_CODE",
        }
    }
}

// =============================================================================
// Pricing Error
// =============================================================================

/// Programmer/configuration errors raised by the pricing engine.
///
/// Unlike [`CouponRejection`], these are fatal to the request: the data the
/// engine was handed is inconsistent and no honest quote can be produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PricingError {
    /// A required numeric input was missing or a record is malformed.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl PricingError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        PricingError::Configuration(msg.into())
    }
}

// =============================================================================
// Core Error
// =============================================================================

/// General domain errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A scheduled post was asked to move along an edge the state machine
    /// does not have (e.g. `posted -> pending`).
    ///
    /// ## When This Occurs
    /// - A second dispatcher tries to record an outcome for a post it never claimed
    /// - Requeue is requested for a post that has not failed
    #[error("Invalid post transition: {from} -> {to}")]
    InvalidTransition { from: PostStatus, to: PostStatus },

    /// Pricing engine configuration error.
    #[error(transparent)]
    Pricing(#[from] PricingError),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too short.
    #[error("{field} must be at least {min} characters")]
    TooShort { field: String, min: usize },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Invalid format (e.g., invalid timestamp, bad coupon code characters).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

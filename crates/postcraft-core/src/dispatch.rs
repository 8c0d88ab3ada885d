//! # Dispatch State Machine
//!
//! Pure transitions for [`ScheduledPost`]. The repository turns each of
//! these into a conditional UPDATE; the dispatcher decides which one to
//! apply. Nothing here touches the database or the network.
//!
//! ## Edges
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  from        event                                   to                 │
//! │  ──────────  ──────────────────────────────────────  ─────────────────  │
//! │  pending     claim (attempts += 1)                   in_flight          │
//! │  pending     owner missing / not linked / expired    failed             │
//! │  in_flight   delivered                               posted             │
//! │  in_flight   retryable error, attempts < max         pending            │
//! │  in_flight   retryable error, attempts >= max        failed             │
//! │  in_flight   permanent error                         failed             │
//! │  in_flight   claim older than lease                  pending            │
//! │  failed      requeue (attempts = 0)                  pending            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{CoreError, CoreResult};
use crate::types::{CredentialLookup, PostStatus, ScheduledPost, SocialCredentials};

// =============================================================================
// Transitions
// =============================================================================

/// Whether the state machine has an edge `from -> to`.
pub fn can_transition(from: PostStatus, to: PostStatus) -> bool {
    use PostStatus::*;
    matches!(
        (from, to),
        (Pending, InFlight)
            | (Pending, Failed)
            | (InFlight, Posted)
            | (InFlight, Pending)
            | (InFlight, Failed)
            | (Failed, Pending)
    )
}

/// Returns `to` if the edge exists, otherwise [`CoreError::InvalidTransition`].
pub fn transition(from: PostStatus, to: PostStatus) -> CoreResult<PostStatus> {
    if can_transition(from, to) {
        Ok(to)
    } else {
        Err(CoreError::InvalidTransition { from, to })
    }
}

/// Whether a post should be picked up by a cycle running at `now`.
///
/// Posts scheduled long ago are still due; there is no staleness cutoff.
pub fn is_due(post: &ScheduledPost, now: DateTime<Utc>, max_attempts: i64) -> bool {
    post.status == PostStatus::Pending && post.scheduled_at <= now && post.attempts < max_attempts
}

/// Status an in-flight post moves to after a failed delivery.
///
/// `attempts` already includes the attempt that just failed.
///
/// ## Example
/// ```rust
/// use postcraft_core::dispatch::{status_after_failure, FailureKind};
/// use postcraft_core::PostStatus;
///
/// assert_eq!(status_after_failure(1, 3, FailureKind::Retryable), PostStatus::Pending);
/// assert_eq!(status_after_failure(3, 3, FailureKind::Retryable), PostStatus::Failed);
/// assert_eq!(status_after_failure(1, 3, FailureKind::Permanent), PostStatus::Failed);
/// ```
pub fn status_after_failure(attempts: i64, max_attempts: i64, kind: FailureKind) -> PostStatus {
    match kind {
        FailureKind::Retryable if attempts < max_attempts => PostStatus::Pending,
        _ => PostStatus::Failed,
    }
}

/// Whether an in-flight claim taken at `claimed_at` has outlived `lease`.
///
/// A dispatcher that crashed mid-delivery leaves its post in flight; once
/// the lease runs out the post goes back to pending.
pub fn claim_is_stale(claimed_at: Option<DateTime<Utc>>, lease: Duration, now: DateTime<Utc>) -> bool {
    match claimed_at {
        Some(at) => at + lease <= now,
        None => true,
    }
}

/// Whether a delivery failure is worth another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Rate limits, 5xx, timeouts, connection errors.
    Retryable,
    /// Rejected content, revoked or expired credentials.
    Permanent,
}

// =============================================================================
// Credentials
// =============================================================================

/// Why a post cannot be delivered on behalf of its owner.
///
/// Every variant is permanent: retrying cannot fix it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CredentialProblem {
    #[error("user not found")]
    UserMissing,

    #[error("LinkedIn account not connected")]
    NotLinked,

    #[error("LinkedIn access token expired")]
    TokenExpired,
}

/// Resolves a credential lookup into usable credentials.
pub fn usable_credentials(
    lookup: CredentialLookup,
    now: DateTime<Utc>,
) -> Result<SocialCredentials, CredentialProblem> {
    match lookup {
        CredentialLookup::UserMissing => Err(CredentialProblem::UserMissing),
        CredentialLookup::NotLinked => Err(CredentialProblem::NotLinked),
        CredentialLookup::Linked(creds) if creds.access_token.trim().is_empty() => {
            Err(CredentialProblem::NotLinked)
        }
        CredentialLookup::Linked(creds) if creds.is_expired(now) => {
            Err(CredentialProblem::TokenExpired)
        }
        CredentialLookup::Linked(creds) => Ok(creds),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

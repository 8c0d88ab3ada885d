//! # Repository Module
//!
//! Database repository implementations for Postcraft.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Handler / Dispatcher                                                   │
//! │       │                                                                 │
//! │       │  db.scheduled_posts().claim(&id, now, 3)                        │
//! │       ▼                                                                 │
//! │  ScheduledPostRepository                                                │
//! │  ├── find_due(now, max_attempts, limit)                                 │
//! │  ├── claim(id, now, max_attempts)        ← conditional UPDATE           │
//! │  ├── mark_posted / record_failure / fail_unclaimed                      │
//! │  └── requeue / release_stale_claims                                     │
//! │       │                                                                 │
//! │       │  SQL                                                            │
//! │       ▼                                                                 │
//! │  SQLite                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`plan::PlanRepository`] - Plan catalog
//! - [`coupon::CouponRepository`] - Coupon lookup and atomic redemption
//! - [`user::UserRepository`] - Users and linked social credentials
//! - [`scheduled_post::ScheduledPostRepository`] - Publishing queue

pub mod coupon;
pub mod plan;
pub mod scheduled_post;
pub mod user;

use crate::error::{DbError, DbResult};

/// Decodes a JSON string-array column.
pub(crate) fn decode_string_list(column: &str, raw: &str) -> DbResult<Vec<String>> {
    serde_json::from_str(raw)
        .map_err(|e| DbError::InvalidData(format!("{column} is not a JSON string array: {e}")))
}

/// Encodes a string list for a JSON array column.
pub(crate) fn encode_string_list(column: &str, values: &[String]) -> DbResult<String> {
    serde_json::to_string(values)
        .map_err(|e| DbError::InvalidData(format!("cannot encode {column}: {e}")))
}

//! # postcraft-db: Database Layer for Postcraft
//!
//! SQLite access for the pricing catalog and the scheduled post queue,
//! using sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Postcraft Data Flow                              │
//! │                                                                         │
//! │  HTTP handler (apps/api)          Dispatcher (postcraft-dispatch)       │
//! │       │                                  │                              │
//! │       ▼                                  ▼                              │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  postcraft-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────────┐  ┌────────────┐  │   │
//! │  │   │   Database    │    │   Repositories     │  │ Migrations │  │   │
//! │  │   │   (pool.rs)   │    │                    │  │ (embedded) │  │   │
//! │  │   │               │    │ PlanRepository     │  │            │  │   │
//! │  │   │ SqlitePool    │◄───│ CouponRepository   │  │ 001_init   │  │   │
//! │  │   │               │    │ UserRepository     │  │            │  │   │
//! │  │   │               │    │ ScheduledPostRepo  │  │            │  │   │
//! │  │   └───────────────┘    └────────────────────┘  └────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite (WAL)                                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use postcraft_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("postcraft.db")).await?;
//!
//! let plans = db.plans().list_active().await?;
//! let due = db.scheduled_posts().find_due(Utc::now(), 3, 50).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::coupon::{CouponRepository, RedeemOutcome, RedeemRequest};
pub use repository::plan::PlanRepository;
pub use repository::scheduled_post::{PostStats, ScheduledPostRepository};
pub use repository::user::UserRepository;

//! # postcraft-core: Pure Business Logic for Postcraft
//!
//! Everything in this crate is deterministic and free of I/O. The database
//! layer, the dispatcher and the HTTP API all call into it.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Postcraft Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    apps/api (axum)                              │   │
//! │  │   /api/pricing/quote   /api/coupons/*   /internal/dispatch      │   │
//! │  └──────────────┬──────────────────────────────────┬───────────────┘   │
//! │                 │                                  │                    │
//! │  ┌──────────────▼───────────────────┐  ┌───────────▼───────────────┐   │
//! │  │   ★ postcraft-core (THIS) ★      │  │   postcraft-dispatch      │   │
//! │  │                                  │◄─┤   cycle, publisher,       │   │
//! │  │  money · pricing · dispatch FSM  │  │   notifier                │   │
//! │  │  types · validation · normalize  │  └───────────┬───────────────┘   │
//! │  └──────────────▲───────────────────┘              │                    │
//! │                 │                                  │                    │
//! │  ┌──────────────┴──────────────────────────────────▼───────────────┐   │
//! │  │                    postcraft-db (SQLite)                        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Integer minor-unit money with round-half-up percentages
//! - [`types`] - Plans, coupons, quotes, scheduled posts, credentials
//! - [`pricing`] - Coupon validation, discount math, price quotes
//! - [`dispatch`] - Scheduled post state machine
//! - [`normalize`] - Legacy post documents to one canonical shape
//! - [`validation`] - Field-level input rules
//! - [`error`] - Domain error types
//!
//! ## Example
//!
//! ```rust
//! use chrono::{Duration, Utc};
//! use postcraft_core::pricing::calculate_price_quote;
//! use postcraft_core::{Coupon, DiscountKind, Money};
//!
//! let now = Utc::now();
//! let mut coupon = Coupon::new("LAUNCH50", DiscountKind::Percentage, 50, now - Duration::days(1), now + Duration::days(30));
//! coupon.max_discount = Some(30_000);
//!
//! let quote = calculate_price_quote(
//!     Some(Money::from_minor(79_900)),
//!     Some("launch50"),
//!     Some(&coupon),
//!     Some("pro"),
//!     now,
//! )
//! .unwrap();
//!
//! assert!(quote.valid);
//! assert_eq!(quote.discount_amount, 30_000);
//! assert_eq!(quote.final_amount, 49_900);
//! ```

pub mod dispatch;
pub mod error;
pub mod money;
pub mod normalize;
pub mod pricing;
pub mod types;
pub mod validation;

pub use error::{CoreError, CouponRejection, PricingError, ValidationError};
pub use money::Money;
pub use types::*;

/// Delivery attempts allowed per scheduled post before it is failed for good.
pub const MAX_DISPATCH_ATTEMPTS: i64 = 3;

/// Longest post body accepted for scheduling (LinkedIn share commentary limit).
pub const MAX_POST_LENGTH: usize = 3000;

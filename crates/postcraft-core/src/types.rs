//! # Domain Types
//!
//! Core domain types used throughout Postcraft.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  Catalog (admin-owned)          Checkout (derived)                      │
//! │  ┌─────────────────┐            ┌─────────────────┐                     │
//! │  │      Plan       │            │   PriceQuote    │  never persisted    │
//! │  │  price (paise)  │───────────►│  base/discount  │                     │
//! │  └─────────────────┘            │  final/valid    │                     │
//! │  ┌─────────────────┐            └─────────────────┘                     │
//! │  │     Coupon      │───────────►┌─────────────────┐                     │
//! │  │  kind/value     │            │CouponRedemption │  one per payment    │
//! │  │  window/limits  │            └─────────────────┘                     │
//! │  └─────────────────┘                                                    │
//! │                                                                         │
//! │  Publishing (dispatcher-owned once claimed)                             │
//! │  ┌─────────────────┐            ┌─────────────────┐                     │
//! │  │  ScheduledPost  │◄───────────│SocialCredentials│  per user           │
//! │  │  status/attempts│            └─────────────────┘                     │
//! │  └─────────────────┘                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;
use uuid::Uuid;

use crate::error::CouponRejection;
use crate::money::Money;
use crate::validation::canonical_coupon_code;

// =============================================================================
// Plan
// =============================================================================

/// A purchasable subscription tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Plan {
    pub id: String,
    pub name: String,
    /// Price in minor units (paise).
    pub price: i64,
    pub duration_days: i64,
    pub features: Vec<String>,
    pub is_active: bool,
}

impl Plan {
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_minor(self.price)
    }
}

// =============================================================================
// Coupon
// =============================================================================

/// How a coupon's `value` is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum DiscountKind {
    /// `value` is a whole percent (0-100) of the order amount.
    Percentage,
    /// `value` is an amount in minor units.
    Fixed,
}

impl fmt::Display for DiscountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscountKind::Percentage => write!(f, "percentage"),
            DiscountKind::Fixed => write!(f, "fixed"),
        }
    }
}

/// A discount rule applicable to plan purchases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Coupon {
    pub id: String,

    /// Canonical (trimmed, upper-case) code.
    pub code: String,

    #[serde(rename = "type")]
    pub kind: DiscountKind,

    /// Percent for [`DiscountKind::Percentage`], minor units for [`DiscountKind::Fixed`].
    pub value: i64,

    /// Orders below this amount are rejected.
    pub min_amount: Option<i64>,

    /// Cap on a percentage discount. Ignored for fixed coupons.
    pub max_discount: Option<i64>,

    /// Total redemptions allowed across all users.
    pub usage_limit: Option<i64>,

    /// Redemptions allowed per user.
    pub per_user_limit: i64,

    /// Redemptions so far.
    pub usage_count: i64,

    #[ts(as = "String")]
    pub valid_from: DateTime<Utc>,

    #[ts(as = "String")]
    pub valid_until: DateTime<Utc>,

    /// Plan whitelist; empty means every plan.
    pub applicable_plans: Vec<String>,

    pub is_active: bool,
}

impl Coupon {
    /// Creates an active coupon with no limits beyond one use per user.
    pub fn new(
        code: &str,
        kind: DiscountKind,
        value: i64,
        valid_from: DateTime<Utc>,
        valid_until: DateTime<Utc>,
    ) -> Self {
        Coupon {
            id: Uuid::new_v4().to_string(),
            code: canonical_coupon_code(code),
            kind,
            value,
            min_amount: None,
            max_discount: None,
            usage_limit: None,
            per_user_limit: 1,
            usage_count: 0,
            valid_from,
            valid_until,
            applicable_plans: Vec::new(),
            is_active: true,
        }
    }

    /// True when a total usage limit is set and already reached.
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        matches!(self.usage_limit, Some(limit) if self.usage_count >= limit)
    }

    /// Whether the plan whitelist admits `plan_id`.
    ///
    /// An empty whitelist admits everything, including a missing plan id.
    pub fn applies_to_plan(&self, plan_id: Option<&str>) -> bool {
        if self.applicable_plans.is_empty() {
            return true;
        }
        match plan_id {
            Some(id) => self.applicable_plans.iter().any(|p| p == id),
            None => false,
        }
    }

    /// Whether `code` names this coupon, ignoring case and surrounding whitespace.
    pub fn matches_code(&self, code: &str) -> bool {
        canonical_coupon_code(code) == self.code
    }
}

// =============================================================================
// Price Quote
// =============================================================================

/// Result of applying (or not applying) a coupon to a plan price.
///
/// Always recomputed; coupon usage and validity windows move between requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PriceQuote {
    pub base_amount: i64,
    pub discount_amount: i64,
    pub final_amount: i64,
    pub valid: bool,
    pub error: Option<String>,
    /// Canonical code of the coupon that was evaluated, if any.
    pub coupon_code: Option<String>,
}

impl PriceQuote {
    /// Quote with no coupon: the identity.
    pub fn undiscounted(base: Money) -> Self {
        PriceQuote {
            base_amount: base.minor(),
            discount_amount: 0,
            final_amount: base.minor(),
            valid: true,
            error: None,
            coupon_code: None,
        }
    }

    /// Quote for a coupon that was rejected; the customer still pays the base.
    pub fn rejected(base: Money, coupon_code: Option<String>, reason: CouponRejection) -> Self {
        PriceQuote {
            base_amount: base.minor(),
            discount_amount: 0,
            final_amount: base.minor(),
            valid: false,
            error: Some(reason.to_string()),
            coupon_code,
        }
    }

    pub fn discounted(base: Money, discount: Money, coupon_code: String) -> Self {
        PriceQuote {
            base_amount: base.minor(),
            discount_amount: discount.minor(),
            final_amount: (base - discount).minor(),
            valid: true,
            error: None,
            coupon_code: Some(coupon_code),
        }
    }
}

// =============================================================================
// Coupon Redemption
// =============================================================================

/// A coupon applied to a captured payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct CouponRedemption {
    pub id: String,
    pub coupon_id: String,
    pub coupon_code: String,
    pub user_id: String,
    pub plan_id: String,
    /// Payment gateway id; unique, which makes redemption idempotent.
    pub payment_id: String,
    pub discount_amount: i64,
    pub final_amount: i64,
    pub redeemed_at: DateTime<Utc>,
}

// =============================================================================
// Post Status
// =============================================================================

/// Lifecycle of a scheduled post.
///
/// ```text
///            claim                 success
/// pending ─────────► in_flight ─────────────► posted
///    ▲                  │
///    │ retryable, <cap  │ permanent, or cap reached
///    └──────────────────┤
///                       ▼
///                     failed ── requeue (external) ──► pending
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum PostStatus {
    /// Waiting for its scheduled time or for a retry.
    Pending,
    /// Claimed by a dispatcher; delivery in progress.
    InFlight,
    /// Delivered (terminal).
    Posted,
    /// Given up (terminal unless requeued).
    Failed,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Pending => "pending",
            PostStatus::InFlight => "in_flight",
            PostStatus::Posted => "posted",
            PostStatus::Failed => "failed",
        }
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, PostStatus::Posted | PostStatus::Failed)
    }
}

impl Default for PostStatus {
    fn default() -> Self {
        PostStatus::Pending
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Scheduled Post
// =============================================================================

/// A post queued for delivery to the social platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ScheduledPost {
    pub id: String,
    pub user_id: String,
    /// Topic title carried over from content generation (audit only).
    pub title: Option<String>,
    pub content: String,
    /// URN of an already uploaded image asset.
    pub image_ref: Option<String>,
    #[ts(as = "String")]
    pub scheduled_at: DateTime<Utc>,
    pub status: PostStatus,
    pub attempts: i64,
    #[ts(as = "Option<String>")]
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// When the current (or last) dispatcher claim was taken.
    #[ts(as = "Option<String>")]
    pub claimed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub external_post_id: Option<String>,
    pub external_url: Option<String>,
    #[ts(as = "Option<String>")]
    pub posted_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// Canonical input for scheduling a post (see [`crate::normalize`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewScheduledPost {
    pub user_id: String,
    pub title: Option<String>,
    pub content: String,
    pub image_ref: Option<String>,
    pub scheduled_at: DateTime<Utc>,
}

// =============================================================================
// Social Credentials
// =============================================================================

/// A user's linked social account.
#[derive(Clone, PartialEq, Eq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SocialCredentials {
    pub user_id: String,
    pub access_token: String,
    /// `None` when the platform did not report an expiry.
    pub token_expires_at: Option<DateTime<Utc>>,
    /// The member id the platform knows the user by.
    pub external_account_id: String,
}

impl SocialCredentials {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.token_expires_at, Some(expiry) if expiry <= now)
    }
}

// Tokens must never reach the logs.
impl fmt::Debug for SocialCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocialCredentials")
            .field("user_id", &self.user_id)
            .field("access_token", &"<redacted>")
            .field("token_expires_at", &self.token_expires_at)
            .field("external_account_id", &self.external_account_id)
            .finish()
    }
}

/// What the credential store knows about a post's owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialLookup {
    /// No user row.
    UserMissing,
    /// User exists but never linked a social account.
    NotLinked,
    Linked(SocialCredentials),
}

// =============================================================================
// Unit Tests
// =============================================================================

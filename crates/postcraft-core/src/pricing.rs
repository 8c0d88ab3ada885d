//! # Pricing Engine
//!
//! Coupon validation, discount calculation and price quote assembly.
//!
//! ## Quote Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  calculate_price_quote(plan_price, code, coupon, plan_id, now)          │
//! │                                                                         │
//! │  plan_price missing ─────────────────────► Err(Configuration)           │
//! │  no code, no coupon ─────────────────────► identity quote               │
//! │  code without record / code mismatch ────► valid=false "invalid code"   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  check_integrity ── malformed ───────────► Err(Configuration)           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  validate_coupon ── rejection ───────────► valid=false + reason         │
//! │   1. usage limit   2. active   3. window   4. plan whitelist            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  calculate_discount ── min order ────────► valid=false + reason         │
//! │   percentage: round_half_up(amount * pct / 100), capped                 │
//! │   fixed:      value                                                     │
//! │   both:       min(discount, amount)                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  PriceQuote { base, discount, final = base - discount, valid }          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing here persists state. Incrementing a coupon's usage happens in
//! `postcraft-db` when a paid checkout is redeemed.

use chrono::{DateTime, Utc};

use crate::error::{CouponRejection, PricingError};
use crate::money::Money;
use crate::types::{Coupon, DiscountKind, PriceQuote};
use crate::validation::canonical_coupon_code;

// =============================================================================
// Discount Calculation
// =============================================================================

/// Outcome of applying a coupon's discount rule to an order amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscountCalculation {
    pub order_amount: Money,
    pub discount: Money,
    pub final_amount: Money,
    /// Set when the order does not qualify (discount is then zero).
    pub rejection: Option<CouponRejection>,
}

impl DiscountCalculation {
    fn rejected(order_amount: Money, reason: CouponRejection) -> Self {
        DiscountCalculation {
            order_amount,
            discount: Money::zero(),
            final_amount: order_amount,
            rejection: Some(reason),
        }
    }

    #[inline]
    pub fn is_applied(&self) -> bool {
        self.rejection.is_none()
    }
}

/// Rejects coupon records that no honest quote can be built from.
///
/// ## Malformed When
/// - `value < 0`, or a percentage `value > 100`
/// - any of `min_amount`, `max_discount`, `usage_limit`, `per_user_limit`,
///   `usage_count` is negative
/// - `valid_from > valid_until`
pub fn check_integrity(coupon: &Coupon) -> Result<(), PricingError> {
    if coupon.value < 0 {
        return Err(PricingError::configuration(format!(
            "coupon {} has negative value {}",
            coupon.code, coupon.value
        )));
    }

    if coupon.kind == DiscountKind::Percentage && coupon.value > 100 {
        return Err(PricingError::configuration(format!(
            "coupon {} has percentage {} above 100",
            coupon.code, coupon.value
        )));
    }

    let optional_fields = [
        ("min_amount", coupon.min_amount),
        ("max_discount", coupon.max_discount),
        ("usage_limit", coupon.usage_limit),
    ];
    for (field, value) in optional_fields {
        if matches!(value, Some(v) if v < 0) {
            return Err(PricingError::configuration(format!(
                "coupon {} has negative {}",
                coupon.code, field
            )));
        }
    }

    if coupon.per_user_limit < 0 || coupon.usage_count < 0 {
        return Err(PricingError::configuration(format!(
            "coupon {} has a negative usage counter or limit",
            coupon.code
        )));
    }

    if coupon.valid_from > coupon.valid_until {
        return Err(PricingError::configuration(format!(
            "coupon {} validity window ends before it starts",
            coupon.code
        )));
    }

    Ok(())
}

// =============================================================================
// Coupon Validation
// =============================================================================

/// Checks whether a coupon may be used right now for `plan_id`.
///
/// The usage limit is checked first: an exhausted coupon always reports
/// [`CouponRejection::UsageLimitExceeded`], whatever else is wrong with it.
/// The validity window is inclusive at both ends.
///
/// ## Example
/// ```rust
/// use chrono::{Duration, Utc};
/// use postcraft_core::pricing::validate_coupon;
/// use postcraft_core::{Coupon, CouponRejection, DiscountKind};
///
/// let now = Utc::now();
/// let mut coupon = Coupon::new("OLD", DiscountKind::Fixed, 500, now - Duration::days(30), now - Duration::days(1));
/// assert_eq!(validate_coupon(&coupon, Some("pro"), now), Err(CouponRejection::Expired));
///
/// coupon.usage_limit = Some(10);
/// coupon.usage_count = 10;
/// assert_eq!(validate_coupon(&coupon, Some("pro"), now), Err(CouponRejection::UsageLimitExceeded));
/// ```
pub fn validate_coupon(
    coupon: &Coupon,
    plan_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(), CouponRejection> {
    if coupon.is_exhausted() {
        return Err(CouponRejection::UsageLimitExceeded);
    }

    if !coupon.is_active {
        return Err(CouponRejection::NotActive);
    }

    if now < coupon.valid_from {
        return Err(CouponRejection::NotYetValid);
    }

    if now > coupon.valid_until {
        return Err(CouponRejection::Expired);
    }

    if !coupon.applies_to_plan(plan_id) {
        return Err(CouponRejection::NotApplicableToPlan);
    }

    Ok(())
}

/// [`validate_coupon`] plus the per-user redemption limit.
///
/// `user_redemptions` is how many times this user has already redeemed
/// the coupon.
pub fn validate_coupon_for_user(
    coupon: &Coupon,
    plan_id: Option<&str>,
    user_redemptions: i64,
    now: DateTime<Utc>,
) -> Result<(), CouponRejection> {
    validate_coupon(coupon, plan_id, now)?;

    if user_redemptions >= coupon.per_user_limit {
        return Err(CouponRejection::PerUserLimitExceeded);
    }

    Ok(())
}

// =============================================================================
// Discount Math
// =============================================================================

/// Applies a coupon's discount rule to `order_amount`.
///
/// The discount never exceeds the order amount, so the final amount is
/// never negative. A minimum-order shortfall is a rejection, not an error.
///
/// ## Example
/// ```rust
/// use chrono::{Duration, Utc};
/// use postcraft_core::pricing::calculate_discount;
/// use postcraft_core::{Coupon, DiscountKind, Money};
///
/// let now = Utc::now();
/// let coupon = Coupon::new("FLAT2000", DiscountKind::Fixed, 2_000, now, now + Duration::days(7));
///
/// let calc = calculate_discount(Money::from_minor(900), &coupon).unwrap();
/// assert_eq!(calc.discount.minor(), 900);
/// assert_eq!(calc.final_amount.minor(), 0);
/// ```
pub fn calculate_discount(
    order_amount: Money,
    coupon: &Coupon,
) -> Result<DiscountCalculation, PricingError> {
    check_integrity(coupon)?;

    if order_amount.is_negative() {
        return Err(PricingError::configuration(format!(
            "order amount {} is negative",
            order_amount.minor()
        )));
    }

    if let Some(min) = coupon.min_amount {
        if order_amount.minor() < min {
            return Ok(DiscountCalculation::rejected(
                order_amount,
                CouponRejection::MinimumOrderNotMet,
            ));
        }
    }

    let raw = match coupon.kind {
        DiscountKind::Percentage => {
            let pct = order_amount.percentage(coupon.value);
            match coupon.max_discount {
                Some(cap) => pct.min(Money::from_minor(cap)),
                None => pct,
            }
        }
        DiscountKind::Fixed => Money::from_minor(coupon.value),
    };

    let discount = raw.min(order_amount);

    Ok(DiscountCalculation {
        order_amount,
        discount,
        final_amount: order_amount - discount,
        rejection: None,
    })
}

// =============================================================================
// Price Quote
// =============================================================================

/// Builds the quote shown at checkout.
///
/// `coupon` is the record the caller resolved for `coupon_code` (if any).
/// Coupon rejections come back as `valid: false` quotes; only missing or
/// malformed configuration is an `Err`.
pub fn calculate_price_quote(
    plan_price: Option<Money>,
    coupon_code: Option<&str>,
    coupon: Option<&Coupon>,
    plan_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<PriceQuote, PricingError> {
    let base = plan_price.ok_or_else(|| PricingError::configuration("plan price is missing"))?;

    if base.is_negative() {
        return Err(PricingError::configuration(format!(
            "plan price {} is negative",
            base.minor()
        )));
    }

    let code = coupon_code
        .map(canonical_coupon_code)
        .filter(|c| !c.is_empty());

    let coupon = match (code.as_deref(), coupon) {
        (None, None) => return Ok(PriceQuote::undiscounted(base)),
        (Some(_), None) => {
            return Ok(PriceQuote::rejected(base, code, CouponRejection::InvalidCode));
        }
        (Some(supplied), Some(c)) if c.code != supplied => {
            return Ok(PriceQuote::rejected(base, code, CouponRejection::InvalidCode));
        }
        (_, Some(c)) => c,
    };

    check_integrity(coupon)?;

    let applied_code = Some(coupon.code.clone());

    if let Err(reason) = validate_coupon(coupon, plan_id, now) {
        return Ok(PriceQuote::rejected(base, applied_code, reason));
    }

    let calc = calculate_discount(base, coupon)?;
    match calc.rejection {
        Some(reason) => Ok(PriceQuote::rejected(base, applied_code, reason)),
        None => Ok(PriceQuote::discounted(
            base,
            calc.discount,
            coupon.code.clone(),
        )),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

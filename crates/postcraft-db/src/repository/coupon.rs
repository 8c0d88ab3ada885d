//! # Coupon Repository
//!
//! Coupon lookup for quotes, and atomic redemption after a payment is
//! captured.
//!
//! ## Redemption Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   SINGLE TRANSACTION (redeem)                           │
//! │                                                                         │
//! │  0. BEGIN IMMEDIATE (writers queue on the busy timeout)                │
//! │                                                                         │
//! │  1. SELECT redemption WHERE payment_id = ?                             │
//! │     └── found? → AlreadyRedeemed (no second increment)                 │
//! │                                                                         │
//! │  2. SELECT coupon, plan, user's redemption count                       │
//! │     └── validate_coupon_for_user + calculate_discount (postcraft-core) │
//! │                                                                         │
//! │  3. UPDATE coupons SET usage_count = usage_count + 1                   │
//! │     WHERE id = ? AND (usage_limit IS NULL OR usage_count < usage_limit)│
//! │     └── 0 rows? → Rejected("usage limit exceeded")                     │
//! │                                                                         │
//! │  4. INSERT coupon_redemptions                                          │
//! │                                                                         │
//! │  COMMIT                                                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The conditional increment is what holds `usage_count <= usage_limit`
//! when two checkouts race for the last use.

use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::{decode_string_list, encode_string_list};
use postcraft_core::pricing::{calculate_discount, validate_coupon_for_user};
use postcraft_core::validation::canonical_coupon_code;
use postcraft_core::{Coupon, CouponRedemption, CouponRejection, DiscountKind, Money};

const COUPON_COLUMNS: &str = r#"
    id, code, kind, value, min_amount, max_discount, usage_limit,
    per_user_limit, usage_count, valid_from, valid_until,
    applicable_plans, is_active
"#;

const REDEMPTION_COLUMNS: &str = r#"
    id, coupon_id, coupon_code, user_id, plan_id, payment_id,
    discount_amount, final_amount, redeemed_at
"#;

/// Input for [`CouponRepository::redeem`].
#[derive(Debug, Clone)]
pub struct RedeemRequest {
    pub code: String,
    pub user_id: String,
    pub plan_id: String,
    /// Gateway payment id; one redemption per payment.
    pub payment_id: String,
}

/// What happened to a redemption request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedeemOutcome {
    /// New redemption recorded; usage incremented.
    Redeemed(CouponRedemption),
    /// This payment was already redeemed; nothing changed.
    AlreadyRedeemed(CouponRedemption),
    /// The coupon cannot be applied; nothing changed.
    Rejected(CouponRejection),
}

/// Repository for coupon operations.
#[derive(Debug, Clone)]
pub struct CouponRepository {
    pool: SqlitePool,
}

impl CouponRepository {
    /// Creates a new CouponRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CouponRepository { pool }
    }

    /// Looks a coupon up by code, case-insensitively.
    pub async fn get_by_code(&self, code: &str) -> DbResult<Option<Coupon>> {
        let code = canonical_coupon_code(code);
        if code.is_empty() {
            return Ok(None);
        }
        fetch_coupon(&self.pool, &code).await
    }

    /// Inserts a new coupon. The code is stored in canonical form.
    pub async fn insert(&self, coupon: &Coupon) -> DbResult<()> {
        let now = Utc::now();
        let code = canonical_coupon_code(&coupon.code);
        let plans = encode_string_list("applicable_plans", &coupon.applicable_plans)?;

        debug!(code = %code, kind = %coupon.kind, value = coupon.value, "Inserting coupon");

        sqlx::query(
            r#"
            INSERT INTO coupons (
                id, code, kind, value, min_amount, max_discount, usage_limit,
                per_user_limit, usage_count, valid_from, valid_until,
                applicable_plans, is_active, created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7,
                ?8, ?9, ?10, ?11,
                ?12, ?13, ?14, ?14
            )
            "#,
        )
        .bind(&coupon.id)
        .bind(&code)
        .bind(coupon.kind)
        .bind(coupon.value)
        .bind(coupon.min_amount)
        .bind(coupon.max_discount)
        .bind(coupon.usage_limit)
        .bind(coupon.per_user_limit)
        .bind(coupon.usage_count)
        .bind(coupon.valid_from)
        .bind(coupon.valid_until)
        .bind(plans)
        .bind(coupon.is_active)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } if field.ends_with("code") => {
                DbError::duplicate("coupon code", code.clone())
            }
            other => other,
        })?;

        Ok(())
    }

    /// How many times `user_id` has redeemed the coupon.
    pub async fn count_user_redemptions(&self, coupon_id: &str, user_id: &str) -> DbResult<i64> {
        count_user_redemptions(&self.pool, coupon_id, user_id).await
    }

    /// Gets the redemption recorded for a payment, if any.
    pub async fn get_redemption_by_payment(
        &self,
        payment_id: &str,
    ) -> DbResult<Option<CouponRedemption>> {
        fetch_redemption(&self.pool, payment_id).await
    }

    /// Records a coupon redemption for a captured payment.
    ///
    /// Idempotent per `payment_id`. Coupon rules are re-checked against the
    /// transaction's view of the coupon, so a quote that was valid a minute
    /// ago can still come back [`RedeemOutcome::Rejected`].
    pub async fn redeem(&self, req: &RedeemRequest, now: DateTime<Utc>) -> DbResult<RedeemOutcome> {
        let code = canonical_coupon_code(&req.code);
        // Write lock up front. A deferred transaction that reads first
        // cannot upgrade while another redemption holds a read snapshot.
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;

        if let Some(existing) = fetch_redemption(&mut *tx, &req.payment_id).await? {
            debug!(payment_id = %req.payment_id, "Payment already redeemed");
            return Ok(RedeemOutcome::AlreadyRedeemed(existing));
        }

        let Some(coupon) = fetch_coupon(&mut *tx, &code).await? else {
            return Ok(RedeemOutcome::Rejected(CouponRejection::InvalidCode));
        };

        let price: Option<i64> =
            sqlx::query_scalar("SELECT price FROM plans WHERE id = ?1 AND is_active = 1")
                .bind(&req.plan_id)
                .fetch_optional(&mut *tx)
                .await?;
        let price = price.ok_or_else(|| DbError::not_found("Plan", req.plan_id.clone()))?;

        let used = count_user_redemptions(&mut *tx, &coupon.id, &req.user_id).await?;
        if let Err(reason) = validate_coupon_for_user(&coupon, Some(&req.plan_id), used, now) {
            info!(code = %code, user_id = %req.user_id, reason = %reason, "Redemption rejected");
            return Ok(RedeemOutcome::Rejected(reason));
        }

        let calc = calculate_discount(Money::from_minor(price), &coupon)
            .map_err(|e| DbError::InvalidData(e.to_string()))?;
        if let Some(reason) = calc.rejection {
            return Ok(RedeemOutcome::Rejected(reason));
        }

        let updated = sqlx::query(
            r#"
            UPDATE coupons SET
                usage_count = usage_count + 1,
                updated_at = ?2
            WHERE id = ?1
              AND (usage_limit IS NULL OR usage_count < usage_limit)
            "#,
        )
        .bind(&coupon.id)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            warn!(code = %code, "Usage limit reached during redemption");
            return Ok(RedeemOutcome::Rejected(CouponRejection::UsageLimitExceeded));
        }

        let redemption = CouponRedemption {
            id: Uuid::new_v4().to_string(),
            coupon_id: coupon.id.clone(),
            coupon_code: coupon.code.clone(),
            user_id: req.user_id.clone(),
            plan_id: req.plan_id.clone(),
            payment_id: req.payment_id.clone(),
            discount_amount: calc.discount.minor(),
            final_amount: calc.final_amount.minor(),
            redeemed_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO coupon_redemptions (
                id, coupon_id, coupon_code, user_id, plan_id, payment_id,
                discount_amount, final_amount, redeemed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&redemption.id)
        .bind(&redemption.coupon_id)
        .bind(&redemption.coupon_code)
        .bind(&redemption.user_id)
        .bind(&redemption.plan_id)
        .bind(&redemption.payment_id)
        .bind(redemption.discount_amount)
        .bind(redemption.final_amount)
        .bind(redemption.redeemed_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            code = %redemption.coupon_code,
            user_id = %redemption.user_id,
            payment_id = %redemption.payment_id,
            discount = redemption.discount_amount,
            "Coupon redeemed"
        );

        Ok(RedeemOutcome::Redeemed(redemption))
    }
}

// =============================================================================
// Shared Queries
// =============================================================================

async fn fetch_coupon<'e, E>(executor: E, canonical_code: &str) -> DbResult<Option<Coupon>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let sql = format!("SELECT {COUPON_COLUMNS} FROM coupons WHERE code = ?1");
    let row = sqlx::query_as::<_, CouponRecord>(&sql)
        .bind(canonical_code)
        .fetch_optional(executor)
        .await?;

    row.map(Coupon::try_from).transpose()
}

async fn fetch_redemption<'e, E>(executor: E, payment_id: &str) -> DbResult<Option<CouponRedemption>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let sql = format!("SELECT {REDEMPTION_COLUMNS} FROM coupon_redemptions WHERE payment_id = ?1");
    let row = sqlx::query_as::<_, CouponRedemption>(&sql)
        .bind(payment_id)
        .fetch_optional(executor)
        .await?;
    Ok(row)
}

async fn count_user_redemptions<'e, E>(executor: E, coupon_id: &str, user_id: &str) -> DbResult<i64>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM coupon_redemptions WHERE coupon_id = ?1 AND user_id = ?2",
    )
    .bind(coupon_id)
    .bind(user_id)
    .fetch_one(executor)
    .await?;
    Ok(count)
}

// =============================================================================
// Record Types
// =============================================================================

#[derive(Debug, Clone, sqlx::FromRow)]
struct CouponRecord {
    id: String,
    code: String,
    kind: DiscountKind,
    value: i64,
    min_amount: Option<i64>,
    max_discount: Option<i64>,
    usage_limit: Option<i64>,
    per_user_limit: i64,
    usage_count: i64,
    valid_from: DateTime<Utc>,
    valid_until: DateTime<Utc>,
    applicable_plans: String,
    is_active: bool,
}

impl TryFrom<CouponRecord> for Coupon {
    type Error = DbError;

    fn try_from(row: CouponRecord) -> DbResult<Coupon> {
        Ok(Coupon {
            applicable_plans: decode_string_list("coupons.applicable_plans", &row.applicable_plans)?,
            id: row.id,
            code: row.code,
            kind: row.kind,
            value: row.value,
            min_amount: row.min_amount,
            max_discount: row.max_discount,
            usage_limit: row.usage_limit,
            per_user_limit: row.per_user_limit,
            usage_count: row.usage_count,
            valid_from: row.valid_from,
            valid_until: row.valid_until,
            is_active: row.is_active,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::Duration;
    use postcraft_core::Plan;
    use tempfile::TempDir;

    async fn setup() -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        insert_plan(&db).await;
        db
    }

    /// On-disk database with a real pool, so redemptions can overlap.
    async fn file_backed() -> (TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let config = DbConfig::new(dir.path().join("postcraft.db")).max_connections(8);
        let db = Database::new(config).await.unwrap();
        insert_plan(&db).await;
        (dir, db)
    }

    async fn insert_plan(db: &Database) {
        db.plans()
            .upsert(&Plan {
                id: "pro".into(),
                name: "Pro".into(),
                price: 79_900,
                duration_days: 30,
                features: vec![],
                is_active: true,
            })
            .await
            .unwrap();
    }

    fn coupon(code: &str) -> Coupon {
        let now = Utc::now();
        let mut c = Coupon::new(
            code,
            DiscountKind::Percentage,
            50,
            now - Duration::days(1),
            now + Duration::days(30),
        );
        c.max_discount = Some(30_000);
        c
    }

    fn request(payment_id: &str, user_id: &str) -> RedeemRequest {
        RedeemRequest {
            code: "launch50".into(),
            user_id: user_id.into(),
            plan_id: "pro".into(),
            payment_id: payment_id.into(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_lookup_case_insensitive() {
        let db = setup().await;
        let mut c = coupon("Launch50");
        c.applicable_plans = vec!["pro".into()];
        db.coupons().insert(&c).await.unwrap();

        let found = db.coupons().get_by_code("  LAUNCH50 ").await.unwrap().unwrap();
        assert_eq!(found, c);
        assert!(db.coupons().get_by_code("other").await.unwrap().is_none());
        assert!(db.coupons().get_by_code("").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_code_rejected() {
        let db = setup().await;
        db.coupons().insert(&coupon("LAUNCH50")).await.unwrap();
        let err = db.coupons().insert(&coupon("launch50")).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_redeem_records_amounts_and_increments() {
        let db = setup().await;
        db.coupons().insert(&coupon("LAUNCH50")).await.unwrap();

        let outcome = db
            .coupons()
            .redeem(&request("pay_1", "u1"), Utc::now())
            .await
            .unwrap();

        let RedeemOutcome::Redeemed(r) = outcome else {
            panic!("expected redemption, got {outcome:?}");
        };
        assert_eq!(r.discount_amount, 30_000);
        assert_eq!(r.final_amount, 49_900);
        assert_eq!(r.coupon_code, "LAUNCH50");

        let c = db.coupons().get_by_code("LAUNCH50").await.unwrap().unwrap();
        assert_eq!(c.usage_count, 1);
    }

    #[tokio::test]
    async fn test_redeem_same_payment_twice_increments_once() {
        let db = setup().await;
        let mut c = coupon("LAUNCH50");
        c.per_user_limit = 5;
        db.coupons().insert(&c).await.unwrap();

        let first = db.coupons().redeem(&request("pay_1", "u1"), Utc::now()).await.unwrap();
        let second = db.coupons().redeem(&request("pay_1", "u1"), Utc::now()).await.unwrap();

        let (RedeemOutcome::Redeemed(a), RedeemOutcome::AlreadyRedeemed(b)) = (first, second) else {
            panic!("expected Redeemed then AlreadyRedeemed");
        };
        assert_eq!(a, b);

        let c = db.coupons().get_by_code("LAUNCH50").await.unwrap().unwrap();
        assert_eq!(c.usage_count, 1);
        assert_eq!(db.coupons().count_user_redemptions(&c.id, "u1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_redeem_at_limit_is_rejected() {
        let db = setup().await;
        let mut c = coupon("LAUNCH50");
        c.usage_limit = Some(1);
        db.coupons().insert(&c).await.unwrap();

        let first = db.coupons().redeem(&request("pay_1", "u1"), Utc::now()).await.unwrap();
        assert!(matches!(first, RedeemOutcome::Redeemed(_)));

        let second = db.coupons().redeem(&request("pay_2", "u2"), Utc::now()).await.unwrap();
        assert_eq!(second, RedeemOutcome::Rejected(CouponRejection::UsageLimitExceeded));

        let c = db.coupons().get_by_code("LAUNCH50").await.unwrap().unwrap();
        assert_eq!(c.usage_count, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_redemptions_for_last_use() {
        let (_dir, db) = file_backed().await;
        let mut c = coupon("LAUNCH50");
        c.usage_limit = Some(1);
        db.coupons().insert(&c).await.unwrap();
        let now = Utc::now();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let repo = db.coupons();
                let req = request(&format!("pay_{i}"), &format!("u{i}"));
                tokio::spawn(async move { repo.redeem(&req, now).await })
            })
            .collect();

        let mut redeemed = 0;
        let mut limited = 0;
        for handle in handles {
            match handle.await.unwrap().unwrap() {
                RedeemOutcome::Redeemed(_) => redeemed += 1,
                RedeemOutcome::Rejected(CouponRejection::UsageLimitExceeded) => limited += 1,
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
        assert_eq!(redeemed, 1);
        assert_eq!(limited, 7);

        let c = db.coupons().get_by_code("LAUNCH50").await.unwrap().unwrap();
        assert_eq!(c.usage_count, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_redemptions_without_limit_all_count() {
        let (_dir, db) = file_backed().await;
        db.coupons().insert(&coupon("LAUNCH50")).await.unwrap();
        let now = Utc::now();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let repo = db.coupons();
                let req = request(&format!("pay_{i}"), &format!("u{i}"));
                tokio::spawn(async move { repo.redeem(&req, now).await })
            })
            .collect();

        for handle in handles {
            let outcome = handle.await.unwrap().unwrap();
            assert!(matches!(outcome, RedeemOutcome::Redeemed(_)), "{outcome:?}");
        }

        let c = db.coupons().get_by_code("LAUNCH50").await.unwrap().unwrap();
        assert_eq!(c.usage_count, 8);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_retries_of_one_payment_redeem_once() {
        let (_dir, db) = file_backed().await;
        db.coupons().insert(&coupon("LAUNCH50")).await.unwrap();
        let now = Utc::now();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let repo = db.coupons();
                tokio::spawn(async move { repo.redeem(&request("pay_1", "u1"), now).await })
            })
            .collect();

        let mut redeemed = 0;
        let mut replayed = 0;
        for handle in handles {
            match handle.await.unwrap().unwrap() {
                RedeemOutcome::Redeemed(_) => redeemed += 1,
                RedeemOutcome::AlreadyRedeemed(_) => replayed += 1,
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
        assert_eq!((redeemed, replayed), (1, 3));

        let c = db.coupons().get_by_code("LAUNCH50").await.unwrap().unwrap();
        assert_eq!(c.usage_count, 1);
    }

    #[tokio::test]
    async fn test_per_user_limit() {
        let db = setup().await;
        db.coupons().insert(&coupon("LAUNCH50")).await.unwrap();

        let first = db.coupons().redeem(&request("pay_1", "u1"), Utc::now()).await.unwrap();
        assert!(matches!(first, RedeemOutcome::Redeemed(_)));

        let again = db.coupons().redeem(&request("pay_2", "u1"), Utc::now()).await.unwrap();
        assert_eq!(again, RedeemOutcome::Rejected(CouponRejection::PerUserLimitExceeded));

        let other_user = db.coupons().redeem(&request("pay_3", "u2"), Utc::now()).await.unwrap();
        assert!(matches!(other_user, RedeemOutcome::Redeemed(_)));
    }

    #[tokio::test]
    async fn test_redeem_unknown_code_and_plan() {
        let db = setup().await;
        let outcome = db.coupons().redeem(&request("pay_1", "u1"), Utc::now()).await.unwrap();
        assert_eq!(outcome, RedeemOutcome::Rejected(CouponRejection::InvalidCode));

        db.coupons().insert(&coupon("LAUNCH50")).await.unwrap();
        let mut req = request("pay_1", "u1");
        req.plan_id = "nope".into();
        let err = db.coupons().redeem(&req, Utc::now()).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_redeem_expired_coupon() {
        let db = setup().await;
        let now = Utc::now();
        let mut c = coupon("LAUNCH50");
        c.valid_from = now - Duration::days(10);
        c.valid_until = now - Duration::days(1);
        db.coupons().insert(&c).await.unwrap();

        let outcome = db.coupons().redeem(&request("pay_1", "u1"), now).await.unwrap();
        assert_eq!(outcome, RedeemOutcome::Rejected(CouponRejection::Expired));
        assert!(db.coupons().get_redemption_by_payment("pay_1").await.unwrap().is_none());
    }
}

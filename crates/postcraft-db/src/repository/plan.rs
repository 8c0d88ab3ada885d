//! # Plan Repository
//!
//! Read access to the plan catalog, plus the upsert used by the seed binary.
//! Plans are edited by admin tooling outside this service.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use crate::repository::{decode_string_list, encode_string_list};
use postcraft_core::Plan;

/// Repository for plan operations.
#[derive(Debug, Clone)]
pub struct PlanRepository {
    pool: SqlitePool,
}

impl PlanRepository {
    /// Creates a new PlanRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PlanRepository { pool }
    }

    /// Lists active plans, cheapest first.
    pub async fn list_active(&self) -> DbResult<Vec<Plan>> {
        let rows = sqlx::query_as::<_, PlanRecord>(
            r#"
            SELECT id, name, price, duration_days, features, is_active
            FROM plans
            WHERE is_active = 1
            ORDER BY price ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Plan::try_from).collect()
    }

    /// Gets a plan by id, active or not.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Plan>> {
        let row = sqlx::query_as::<_, PlanRecord>(
            r#"
            SELECT id, name, price, duration_days, features, is_active
            FROM plans
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Plan::try_from).transpose()
    }

    /// Gets a plan by id only if it is on sale.
    pub async fn get_active(&self, id: &str) -> DbResult<Option<Plan>> {
        Ok(self.get_by_id(id).await?.filter(|p| p.is_active))
    }

    /// Inserts a plan or replaces the existing row with the same id.
    pub async fn upsert(&self, plan: &Plan) -> DbResult<()> {
        let now = Utc::now();
        let features = encode_string_list("features", &plan.features)?;

        debug!(plan_id = %plan.id, price = plan.price, "Upserting plan");

        sqlx::query(
            r#"
            INSERT INTO plans (id, name, price, duration_days, features, is_active, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                price = excluded.price,
                duration_days = excluded.duration_days,
                features = excluded.features,
                is_active = excluded.is_active,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&plan.id)
        .bind(&plan.name)
        .bind(plan.price)
        .bind(plan.duration_days)
        .bind(features)
        .bind(plan.is_active)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Counts all plans.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM plans")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

// =============================================================================
// Record Types
// =============================================================================

#[derive(Debug, Clone, sqlx::FromRow)]
struct PlanRecord {
    id: String,
    name: String,
    price: i64,
    duration_days: i64,
    features: String,
    is_active: bool,
}

impl TryFrom<PlanRecord> for Plan {
    type Error = crate::error::DbError;

    fn try_from(row: PlanRecord) -> DbResult<Plan> {
        Ok(Plan {
            features: decode_string_list("plans.features", &row.features)?,
            id: row.id,
            name: row.name,
            price: row.price,
            duration_days: row.duration_days,
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
    use crate::error::DbError;
    use crate::pool::{Database, DbConfig};

    fn plan(id: &str, price: i64, active: bool) -> Plan {
        Plan {
            id: id.to_string(),
            name: id.to_uppercase(),
            price,
            duration_days: 30,
            features: vec!["Scheduling".into(), "Analytics".into()],
            is_active: active,
        }
    }

    #[tokio::test]
    async fn test_upsert_and_list_active() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.plans();

        repo.upsert(&plan("pro", 79_900, true)).await.unwrap();
        repo.upsert(&plan("starter", 29_900, true)).await.unwrap();
        repo.upsert(&plan("legacy", 9_900, false)).await.unwrap();

        let active = repo.list_active().await.unwrap();
        let ids: Vec<_> = active.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["starter", "pro"]);
        assert_eq!(active[1].features, vec!["Scheduling", "Analytics"]);
        assert_eq!(repo.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_upsert_replaces() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.plans();

        repo.upsert(&plan("pro", 79_900, true)).await.unwrap();
        repo.upsert(&plan("pro", 89_900, true)).await.unwrap();

        let pro = repo.get_by_id("pro").await.unwrap().unwrap();
        assert_eq!(pro.price, 89_900);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_get_active_hides_inactive() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.plans();
        repo.upsert(&plan("legacy", 9_900, false)).await.unwrap();

        assert!(repo.get_by_id("legacy").await.unwrap().is_some());
        assert!(repo.get_active("legacy").await.unwrap().is_none());
        assert!(repo.get_active("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_features_column() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO plans (id, name, price, duration_days, features, is_active, created_at, updated_at)
             VALUES ('bad', 'Bad', 100, 30, 'not json', 1, ?1, ?1)",
        )
        .bind(now)
        .execute(db.pool())
        .await
        .unwrap();

        let err = db.plans().get_by_id("bad").await.unwrap_err();
        assert!(matches!(err, DbError::InvalidData(_)));
    }
}

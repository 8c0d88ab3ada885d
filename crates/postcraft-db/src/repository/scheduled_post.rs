//! # Scheduled Post Repository
//!
//! The publishing queue. Every status change is a single conditional
//! UPDATE that names the status it expects to find, so two dispatchers
//! racing on one row cannot both win.
//!
//! ## Claim Protocol
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Dispatcher A                          Dispatcher B                     │
//! │       │                                     │                           │
//! │       │ UPDATE ... SET status='in_flight'   │                           │
//! │       │ WHERE id=? AND status='pending'     │                           │
//! │       │   AND attempts < 3                  │                           │
//! │       │ → 1 row  (owns the post)            │                           │
//! │       │                                     │ same UPDATE               │
//! │       │                                     │ → 0 rows (skipped)        │
//! │       ▼                                     ▼                           │
//! │  publish → mark_posted / record_failure     move on                     │
//! │            (WHERE status='in_flight')                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use postcraft_core::dispatch::transition;
use postcraft_core::{CoreError, NewScheduledPost, PostStatus, ScheduledPost};

const POST_COLUMNS: &str = r#"
    id, user_id, title, content, image_ref, scheduled_at, status, attempts,
    last_attempt_at, claimed_at, last_error, external_post_id, external_url,
    posted_at, created_at, updated_at
"#;

/// Post counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostStats {
    pub pending: i64,
    pub in_flight: i64,
    pub posted: i64,
    pub failed: i64,
}

/// Repository for scheduled post operations.
#[derive(Debug, Clone)]
pub struct ScheduledPostRepository {
    pool: SqlitePool,
}

impl ScheduledPostRepository {
    /// Creates a new ScheduledPostRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ScheduledPostRepository { pool }
    }

    /// Queues a post.
    pub async fn insert(&self, new: &NewScheduledPost, now: DateTime<Utc>) -> DbResult<ScheduledPost> {
        let id = Uuid::new_v4().to_string();

        debug!(
            post_id = %id,
            user_id = %new.user_id,
            scheduled_at = %new.scheduled_at,
            "Scheduling post"
        );

        let sql = format!(
            r#"
            INSERT INTO scheduled_posts (
                id, user_id, title, content, image_ref, scheduled_at,
                status, attempts, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', 0, ?7, ?7)
            RETURNING {POST_COLUMNS}
            "#
        );

        let post = sqlx::query_as::<_, ScheduledPost>(&sql)
            .bind(&id)
            .bind(&new.user_id)
            .bind(&new.title)
            .bind(&new.content)
            .bind(&new.image_ref)
            .bind(new.scheduled_at)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;

        Ok(post)
    }

    /// Gets a post by id.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<ScheduledPost>> {
        let sql = format!("SELECT {POST_COLUMNS} FROM scheduled_posts WHERE id = ?1");
        let post = sqlx::query_as::<_, ScheduledPost>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(post)
    }

    /// Pending posts whose time has come and that still have attempts left,
    /// oldest first.
    ///
    /// Posts scheduled far in the past are included.
    pub async fn find_due(
        &self,
        now: DateTime<Utc>,
        max_attempts: i64,
        limit: u32,
    ) -> DbResult<Vec<ScheduledPost>> {
        let sql = format!(
            r#"
            SELECT {POST_COLUMNS}
            FROM scheduled_posts
            WHERE status = 'pending'
              AND scheduled_at <= ?1
              AND attempts < ?2
            ORDER BY scheduled_at ASC, id ASC
            LIMIT ?3
            "#
        );

        let posts = sqlx::query_as::<_, ScheduledPost>(&sql)
            .bind(now)
            .bind(max_attempts)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(posts)
    }

    /// Takes exclusive ownership of a pending post: `pending → in_flight`,
    /// `attempts + 1`, `last_attempt_at = claimed_at = now`.
    ///
    /// Returns `None` if another dispatcher got there first (or the post is
    /// no longer eligible).
    pub async fn claim(
        &self,
        id: &str,
        now: DateTime<Utc>,
        max_attempts: i64,
    ) -> DbResult<Option<ScheduledPost>> {
        let sql = format!(
            r#"
            UPDATE scheduled_posts SET
                status = 'in_flight',
                attempts = attempts + 1,
                last_attempt_at = ?2,
                claimed_at = ?2,
                updated_at = ?2
            WHERE id = ?1
              AND status = 'pending'
              AND attempts < ?3
            RETURNING {POST_COLUMNS}
            "#
        );

        let claimed = sqlx::query_as::<_, ScheduledPost>(&sql)
            .bind(id)
            .bind(now)
            .bind(max_attempts)
            .fetch_optional(&self.pool)
            .await?;

        match &claimed {
            Some(post) => debug!(post_id = %id, attempts = post.attempts, "Post claimed"),
            None => debug!(post_id = %id, "Post already claimed elsewhere"),
        }

        Ok(claimed)
    }

    /// `in_flight → posted`. Clears the error and stamps `posted_at`.
    ///
    /// Returns `false` if the post was not in flight.
    pub async fn mark_posted(
        &self,
        id: &str,
        external_post_id: &str,
        external_url: Option<&str>,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE scheduled_posts SET
                status = 'posted',
                external_post_id = ?2,
                external_url = ?3,
                last_error = NULL,
                claimed_at = NULL,
                posted_at = ?4,
                updated_at = ?4
            WHERE id = ?1 AND status = 'in_flight'
            "#,
        )
        .bind(id)
        .bind(external_post_id)
        .bind(external_url)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Records a failed delivery and moves the in-flight post to `next`
    /// (`pending` to retry, `failed` to give up).
    ///
    /// Returns `false` if the post was not in flight.
    pub async fn record_failure(
        &self,
        id: &str,
        next: PostStatus,
        error: &str,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let next = transition(PostStatus::InFlight, next)?;

        let result = sqlx::query(
            r#"
            UPDATE scheduled_posts SET
                status = ?2,
                last_error = ?3,
                claimed_at = NULL,
                updated_at = ?4
            WHERE id = ?1 AND status = 'in_flight'
            "#,
        )
        .bind(id)
        .bind(next)
        .bind(error)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// `pending → failed` without claiming, for posts that can never be
    /// delivered (owner missing, account not linked, token expired).
    /// Attempts are left unchanged.
    ///
    /// Returns `false` if the post was no longer pending.
    pub async fn fail_unclaimed(&self, id: &str, reason: &str, now: DateTime<Utc>) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE scheduled_posts SET
                status = 'failed',
                last_error = ?2,
                updated_at = ?3
            WHERE id = ?1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(reason)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// `failed → pending` with attempts reset, for an operator retry.
    pub async fn requeue(&self, id: &str, now: DateTime<Utc>) -> DbResult<ScheduledPost> {
        let sql = format!(
            r#"
            UPDATE scheduled_posts SET
                status = 'pending',
                attempts = 0,
                last_error = NULL,
                claimed_at = NULL,
                updated_at = ?2
            WHERE id = ?1 AND status = 'failed'
            RETURNING {POST_COLUMNS}
            "#
        );

        let requeued = sqlx::query_as::<_, ScheduledPost>(&sql)
            .bind(id)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(post) = requeued {
            info!(post_id = %id, "Post requeued");
            return Ok(post);
        }

        match self.get_by_id(id).await? {
            None => Err(DbError::not_found("ScheduledPost", id)),
            Some(post) => Err(DbError::Domain(CoreError::InvalidTransition {
                from: post.status,
                to: PostStatus::Pending,
            })),
        }
    }

    /// Returns in-flight posts whose claim is older than `lease` to
    /// `pending`, or to `failed` if they have no attempts left.
    ///
    /// The attempt that was in progress stays counted.
    pub async fn release_stale_claims(
        &self,
        lease: Duration,
        max_attempts: i64,
        now: DateTime<Utc>,
    ) -> DbResult<u64> {
        let cutoff = now - lease;

        let result = sqlx::query(
            r#"
            UPDATE scheduled_posts SET
                status = CASE WHEN attempts < ?2 THEN 'pending' ELSE 'failed' END,
                last_error = 'claim expired before delivery was recorded',
                claimed_at = NULL,
                updated_at = ?3
            WHERE status = 'in_flight'
              AND (claimed_at IS NULL OR claimed_at <= ?1)
            "#,
        )
        .bind(cutoff)
        .bind(max_attempts)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let released = result.rows_affected();
        if released > 0 {
            warn!(released, "Released stale post claims");
        }
        Ok(released)
    }

    /// Post counts by status.
    pub async fn stats(&self) -> DbResult<PostStats> {
        let rows: Vec<(PostStatus, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM scheduled_posts GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let mut stats = PostStats::default();
        for (status, count) in rows {
            match status {
                PostStatus::Pending => stats.pending = count,
                PostStatus::InFlight => stats.in_flight = count,
                PostStatus::Posted => stats.posted = count,
                PostStatus::Failed => stats.failed = count,
            }
        }
        Ok(stats)
    }

    /// Failed posts, most recently updated first.
    pub async fn list_failed(&self, limit: u32) -> DbResult<Vec<ScheduledPost>> {
        let sql = format!(
            r#"
            SELECT {POST_COLUMNS}
            FROM scheduled_posts
            WHERE status = 'failed'
            ORDER BY updated_at DESC, id ASC
            LIMIT ?1
            "#
        );

        let posts = sqlx::query_as::<_, ScheduledPost>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(posts)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    async fn setup() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn new_post(user: &str, scheduled_at: DateTime<Utc>) -> NewScheduledPost {
        NewScheduledPost {
            user_id: user.to_string(),
            title: Some("Topic".into()),
            content: "Five lessons from shipping weekly".into(),
            image_ref: None,
            scheduled_at,
        }
    }

    async fn set_attempts(db: &Database, id: &str, attempts: i64) {
        sqlx::query("UPDATE scheduled_posts SET attempts = ?2 WHERE id = ?1")
            .bind(id)
            .bind(attempts)
            .execute(db.pool())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_insert_defaults() {
        let db = setup().await;
        let now = Utc::now();
        let post = db.scheduled_posts().insert(&new_post("u1", now), now).await.unwrap();

        assert_eq!(post.status, PostStatus::Pending);
        assert_eq!(post.attempts, 0);
        assert_eq!(post.title.as_deref(), Some("Topic"));
        assert!(post.posted_at.is_none());

        let loaded = db.scheduled_posts().get_by_id(&post.id).await.unwrap().unwrap();
        assert_eq!(loaded, post);
    }

    #[tokio::test]
    async fn test_find_due_filters_and_orders() {
        let db = setup().await;
        let repo = db.scheduled_posts();
        let now = Utc::now();

        let old = repo.insert(&new_post("u1", now - Duration::days(400)), now).await.unwrap();
        let recent = repo.insert(&new_post("u1", now - Duration::minutes(1)), now).await.unwrap();
        let future = repo.insert(&new_post("u1", now + Duration::minutes(5)), now).await.unwrap();
        let exhausted = repo.insert(&new_post("u1", now - Duration::hours(1)), now).await.unwrap();
        set_attempts(&db, &exhausted.id, 3).await;

        let due = repo.find_due(now, 3, 50).await.unwrap();
        let ids: Vec<_> = due.iter().map(|p| p.id.clone()).collect();
        assert_eq!(ids, vec![old.id.clone(), recent.id.clone()]);
        assert!(!ids.contains(&future.id));
        assert!(!ids.contains(&exhausted.id));

        let limited = repo.find_due(now, 3, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].id, old.id);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_claim_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let config = DbConfig::new(dir.path().join("postcraft.db")).max_connections(8);
        let db = Database::new(config).await.unwrap();
        let now = Utc::now();
        let post = db.scheduled_posts().insert(&new_post("u1", now), now).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let repo = db.scheduled_posts();
                let id = post.id.clone();
                tokio::spawn(async move { repo.claim(&id, now, 3).await })
            })
            .collect();

        let mut winners = Vec::new();
        for handle in handles {
            if let Some(claimed) = handle.await.unwrap().unwrap() {
                winners.push(claimed);
            }
        }
        assert_eq!(winners.len(), 1);
        assert_eq!(winners[0].status, PostStatus::InFlight);
        assert_eq!(winners[0].attempts, 1);
        assert_eq!(winners[0].last_attempt_at, Some(now));
        assert_eq!(winners[0].claimed_at, Some(now));

        let stored = db.scheduled_posts().get_by_id(&post.id).await.unwrap().unwrap();
        assert_eq!(stored.attempts, 1);
    }

    #[tokio::test]
    async fn test_claim_respects_attempt_cap() {
        let db = setup().await;
        let repo = db.scheduled_posts();
        let now = Utc::now();
        let post = repo.insert(&new_post("u1", now), now).await.unwrap();
        set_attempts(&db, &post.id, 3).await;

        assert!(repo.claim(&post.id, now, 3).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mark_posted() {
        let db = setup().await;
        let repo = db.scheduled_posts();
        let now = Utc::now();
        let post = repo.insert(&new_post("u1", now), now).await.unwrap();

        // Not in flight yet.
        assert!(!repo.mark_posted(&post.id, "urn:li:share:1", None, now).await.unwrap());

        repo.claim(&post.id, now, 3).await.unwrap().unwrap();
        repo.record_failure(&post.id, PostStatus::Pending, "HTTP 503", now)
            .await
            .unwrap();
        repo.claim(&post.id, now, 3).await.unwrap().unwrap();

        let url = "https://www.linkedin.com/feed/update/urn:li:share:1";
        assert!(repo.mark_posted(&post.id, "urn:li:share:1", Some(url), now).await.unwrap());

        let posted = repo.get_by_id(&post.id).await.unwrap().unwrap();
        assert_eq!(posted.status, PostStatus::Posted);
        assert_eq!(posted.attempts, 2);
        assert_eq!(posted.last_error, None);
        assert_eq!(posted.posted_at, Some(now));
        assert_eq!(posted.external_url.as_deref(), Some(url));

        // A second success report changes nothing.
        assert!(!repo.mark_posted(&post.id, "urn:li:share:2", None, now).await.unwrap());
    }

    #[tokio::test]
    async fn test_record_failure_paths() {
        let db = setup().await;
        let repo = db.scheduled_posts();
        let now = Utc::now();
        let post = repo.insert(&new_post("u1", now), now).await.unwrap();

        repo.claim(&post.id, now, 3).await.unwrap().unwrap();
        assert!(repo
            .record_failure(&post.id, PostStatus::Failed, "HTTP 401", now)
            .await
            .unwrap());

        let failed = repo.get_by_id(&post.id).await.unwrap().unwrap();
        assert_eq!(failed.status, PostStatus::Failed);
        assert_eq!(failed.last_error.as_deref(), Some("HTTP 401"));
        assert!(failed.claimed_at.is_none());

        let err = repo
            .record_failure(&post.id, PostStatus::Posted, "nope", now)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_fail_unclaimed_keeps_attempts() {
        let db = setup().await;
        let repo = db.scheduled_posts();
        let now = Utc::now();
        let post = repo.insert(&new_post("ghost", now), now).await.unwrap();

        assert!(repo.fail_unclaimed(&post.id, "user not found", now).await.unwrap());
        let failed = repo.get_by_id(&post.id).await.unwrap().unwrap();
        assert_eq!(failed.status, PostStatus::Failed);
        assert_eq!(failed.attempts, 0);

        assert!(!repo.fail_unclaimed(&post.id, "again", now).await.unwrap());
    }

    #[tokio::test]
    async fn test_requeue() {
        let db = setup().await;
        let repo = db.scheduled_posts();
        let now = Utc::now();
        let post = repo.insert(&new_post("u1", now), now).await.unwrap();

        let err = repo.requeue(&post.id, now).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::InvalidTransition {
                from: PostStatus::Pending,
                to: PostStatus::Pending
            })
        ));

        set_attempts(&db, &post.id, 3).await;
        repo.fail_unclaimed(&post.id, "HTTP 500", now).await.unwrap();

        let requeued = repo.requeue(&post.id, now).await.unwrap();
        assert_eq!(requeued.status, PostStatus::Pending);
        assert_eq!(requeued.attempts, 0);
        assert_eq!(requeued.last_error, None);

        assert!(matches!(
            repo.requeue("missing", now).await.unwrap_err(),
            DbError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_release_stale_claims() {
        let db = setup().await;
        let repo = db.scheduled_posts();
        let now = Utc::now();
        let lease = Duration::minutes(10);

        let stale = repo.insert(&new_post("u1", now), now).await.unwrap();
        let fresh = repo.insert(&new_post("u1", now), now).await.unwrap();
        let last_try = repo.insert(&new_post("u1", now), now).await.unwrap();

        repo.claim(&stale.id, now - Duration::minutes(30), 3).await.unwrap();
        repo.claim(&fresh.id, now - Duration::minutes(1), 3).await.unwrap();
        set_attempts(&db, &last_try.id, 2).await;
        repo.claim(&last_try.id, now - Duration::minutes(30), 3).await.unwrap();

        let released = repo.release_stale_claims(lease, 3, now).await.unwrap();
        assert_eq!(released, 2);

        let stale = repo.get_by_id(&stale.id).await.unwrap().unwrap();
        assert_eq!(stale.status, PostStatus::Pending);
        assert_eq!(stale.attempts, 1);

        let fresh = repo.get_by_id(&fresh.id).await.unwrap().unwrap();
        assert_eq!(fresh.status, PostStatus::InFlight);

        let last_try = repo.get_by_id(&last_try.id).await.unwrap().unwrap();
        assert_eq!(last_try.status, PostStatus::Failed);
        assert_eq!(last_try.attempts, 3);
    }

    #[tokio::test]
    async fn test_stats_and_list_failed() {
        let db = setup().await;
        let repo = db.scheduled_posts();
        let now = Utc::now();

        let a = repo.insert(&new_post("u1", now), now).await.unwrap();
        let b = repo.insert(&new_post("u1", now), now).await.unwrap();
        repo.insert(&new_post("u1", now), now).await.unwrap();

        repo.claim(&a.id, now, 3).await.unwrap();
        repo.fail_unclaimed(&b.id, "LinkedIn account not connected", now)
            .await
            .unwrap();

        let stats = repo.stats().await.unwrap();
        assert_eq!(
            stats,
            PostStats {
                pending: 1,
                in_flight: 1,
                posted: 0,
                failed: 1
            }
        );

        let failed = repo.list_failed(10).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, b.id);
    }
}

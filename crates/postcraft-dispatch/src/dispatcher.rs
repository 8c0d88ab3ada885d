//! # Dispatcher
//!
//! Runs one delivery cycle per call. Something outside the process (a cron
//! hitting `POST /internal/dispatch`) decides when cycles happen.
//!
//! ## Cycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Dispatch Cycle                                 │
//! │                                                                         │
//! │  1. release stale claims (in_flight older than the lease)               │
//! │  2. load due posts: pending, scheduled_at <= now, attempts < max        │
//! │  3. for each post, one at a time:                                       │
//! │                                                                         │
//! │     credentials ──missing/expired──► failed (attempts unchanged)        │
//! │          │                                                              │
//! │          ▼                                                              │
//! │     claim (pending → in_flight, attempts+1) ──lost──► skipped           │
//! │          │                                                              │
//! │          ▼                                                              │
//! │     publish (bounded by timeout)                                        │
//! │          ├── ok ─────────────────────────► posted                       │
//! │          ├── retryable, attempts < max ──► pending                      │
//! │          └── otherwise ──────────────────► failed                       │
//! │                                                                         │
//! │  4. CycleSummary { processed, success, failed, skipped, results }       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only step 2 can fail the cycle. Anything that goes wrong with a single
//! post is logged, counted and left for the next cycle.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::DispatcherConfig;
use crate::error::{DispatchResult, PublishError};
use crate::notifier::{DispatchNotifier, NoOpNotifier};
use crate::publisher::{PublishRequest, SocialPublisher};
use postcraft_core::dispatch::{status_after_failure, usable_credentials};
use postcraft_core::{PostStatus, ScheduledPost};
use postcraft_db::Database;

// =============================================================================
// Results
// =============================================================================

/// What happened to one post during a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PostOutcome {
    /// Delivered; the post is now `posted`.
    Posted,
    /// Delivery failed; the post is back in `pending`.
    Retrying,
    /// The post is now `failed`.
    Failed,
    /// Another dispatcher owned the post, or it changed state under us.
    Skipped,
    /// The outcome could not be recorded (database error).
    Errored,
}

impl PostOutcome {
    fn is_failure(&self) -> bool {
        matches!(self, PostOutcome::Retrying | PostOutcome::Failed | PostOutcome::Errored)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostResult {
    pub post_id: String,
    pub outcome: PostOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PostResult {
    fn new(post_id: &str, outcome: PostOutcome) -> Self {
        PostResult {
            post_id: post_id.to_string(),
            outcome,
            external_id: None,
            error: None,
        }
    }

    fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Totals for one cycle.
///
/// `failed` counts every post whose delivery did not succeed this cycle,
/// whether or not it will be retried.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleSummary {
    pub processed: usize,
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
    pub results: Vec<PostResult>,
}

impl CycleSummary {
    fn record(&mut self, result: PostResult) {
        self.processed += 1;
        match result.outcome {
            PostOutcome::Posted => self.success += 1,
            PostOutcome::Skipped => self.skipped += 1,
            outcome if outcome.is_failure() => self.failed += 1,
            _ => {}
        }
        self.results.push(result);
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

pub struct Dispatcher {
    db: Database,
    publisher: Arc<dyn SocialPublisher>,
    notifier: Arc<dyn DispatchNotifier>,
    config: DispatcherConfig,
}

impl Dispatcher {
    /// Creates a dispatcher that reports to nobody.
    pub fn new(db: Database, publisher: Arc<dyn SocialPublisher>, config: DispatcherConfig) -> Self {
        Dispatcher {
            db,
            publisher,
            notifier: Arc::new(NoOpNotifier),
            config,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn DispatchNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Runs one cycle with `now` as the clock for due checks and every
    /// timestamp it writes.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> DispatchResult<CycleSummary> {
        let max_attempts = self.config.dispatch.max_attempts;
        let posts = self.db.scheduled_posts();

        if let Err(e) = posts
            .release_stale_claims(self.config.claim_lease(), max_attempts, now)
            .await
        {
            error!(?e, "Failed to release stale claims");
        }

        let due = posts
            .find_due(now, max_attempts, self.config.dispatch.batch_size)
            .await?;

        let mut summary = CycleSummary::default();

        if due.is_empty() {
            debug!("No posts due");
            self.notifier.cycle_completed(&summary);
            return Ok(summary);
        }

        info!(count = due.len(), publisher = self.publisher.name(), "Dispatching due posts");

        for post in &due {
            let result = match self.process_post(post, now).await {
                Ok(result) => result,
                Err(e) => {
                    error!(?e, post_id = %post.id, "Failed to record dispatch outcome");
                    PostResult::new(&post.id, PostOutcome::Errored).with_error(e.to_string())
                }
            };
            summary.record(result);
        }

        self.notifier.cycle_completed(&summary);
        Ok(summary)
    }

    async fn process_post(&self, post: &ScheduledPost, now: DateTime<Utc>) -> DispatchResult<PostResult> {
        let posts = self.db.scheduled_posts();

        let lookup = self.db.users().credentials_for(&post.user_id).await?;
        let credentials = match usable_credentials(lookup, now) {
            Ok(credentials) => credentials,
            Err(problem) => {
                let reason = problem.to_string();
                if !posts.fail_unclaimed(&post.id, &reason, now).await? {
                    return Ok(PostResult::new(&post.id, PostOutcome::Skipped));
                }
                warn!(post_id = %post.id, user_id = %post.user_id, reason = %reason, "Post cannot be delivered");
                self.notifier.post_failed(post, &reason, false);
                return Ok(PostResult::new(&post.id, PostOutcome::Failed).with_error(reason));
            }
        };

        let Some(claimed) = posts.claim(&post.id, now, self.config.dispatch.max_attempts).await? else {
            return Ok(PostResult::new(&post.id, PostOutcome::Skipped));
        };

        let request = PublishRequest {
            author_id: credentials.external_account_id.clone(),
            access_token: credentials.access_token.clone(),
            text: claimed.content.clone(),
            visibility: self.config.linkedin.visibility,
            image: claimed.image_ref.clone(),
        };

        let published = match tokio::time::timeout(
            self.config.publish_timeout(),
            self.publisher.publish(&request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(PublishError::Timeout(self.config.linkedin.timeout_secs)),
        };

        match published {
            Ok(receipt) => {
                let recorded = posts
                    .mark_posted(&claimed.id, &receipt.external_id, receipt.url.as_deref(), now)
                    .await?;
                if !recorded {
                    // The claim was released while we were publishing.
                    warn!(post_id = %claimed.id, external_id = %receipt.external_id, "Published but post was no longer in flight");
                }
                self.notifier.post_published(&claimed, &receipt);
                Ok(PostResult {
                    external_id: Some(receipt.external_id),
                    ..PostResult::new(&claimed.id, PostOutcome::Posted)
                })
            }
            Err(e) => {
                let message = e.to_string();
                let next = status_after_failure(claimed.attempts, self.config.dispatch.max_attempts, e.kind());
                posts.record_failure(&claimed.id, next, &message, now).await?;

                let will_retry = next == PostStatus::Pending;
                self.notifier.post_failed(&claimed, &message, will_retry);

                let outcome = if will_retry {
                    PostOutcome::Retrying
                } else {
                    PostOutcome::Failed
                };
                Ok(PostResult::new(&claimed.id, outcome).with_error(message))
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::{MockPublisher, PublishReceipt};
    use chrono::Duration;
    use postcraft_core::NewScheduledPost;
    use postcraft_db::DbConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn setup() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    async fn linked_user(db: &Database, id: &str) {
        db.users().insert(id, id).await.unwrap();
        db.users()
            .link_social_account(id, &format!("tok-{id}"), None, &format!("li-{id}"))
            .await
            .unwrap();
    }

    async fn schedule(db: &Database, user_id: &str, at: DateTime<Utc>) -> ScheduledPost {
        let new = NewScheduledPost {
            user_id: user_id.to_string(),
            title: None,
            content: format!("post by {user_id}"),
            image_ref: None,
            scheduled_at: at,
        };
        db.scheduled_posts().insert(&new, at).await.unwrap()
    }

    fn dispatcher(db: &Database, publisher: Arc<MockPublisher>) -> Dispatcher {
        Dispatcher::new(db.clone(), publisher, DispatcherConfig::default())
    }

    #[derive(Default)]
    struct CountingNotifier {
        published: AtomicUsize,
        failed: AtomicUsize,
        cycles: AtomicUsize,
    }

    impl DispatchNotifier for CountingNotifier {
        fn post_published(&self, _post: &ScheduledPost, _receipt: &PublishReceipt) {
            self.published.fetch_add(1, Ordering::SeqCst);
        }
        fn post_failed(&self, _post: &ScheduledPost, _error: &str, _will_retry: bool) {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
        fn cycle_completed(&self, _summary: &CycleSummary) {
            self.cycles.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_empty_cycle() {
        let db = setup().await;
        let publisher = Arc::new(MockPublisher::new());

        let summary = dispatcher(&db, publisher.clone()).run_cycle(Utc::now()).await.unwrap();

        assert_eq!(summary, CycleSummary::default());
        assert_eq!(publisher.publish_count(), 0);
    }

    #[tokio::test]
    async fn test_two_delivered_one_without_credentials() {
        let db = setup().await;
        let now = Utc::now();
        linked_user(&db, "asha").await;
        linked_user(&db, "ravi").await;
        db.users().insert("meera", "meera").await.unwrap();

        let a = schedule(&db, "asha", now - Duration::minutes(3)).await;
        let b = schedule(&db, "ravi", now - Duration::minutes(2)).await;
        let c = schedule(&db, "meera", now - Duration::minutes(1)).await;

        let publisher = Arc::new(MockPublisher::new());
        let notifier = Arc::new(CountingNotifier::default());
        let summary = dispatcher(&db, publisher.clone())
            .with_notifier(notifier.clone())
            .run_cycle(now)
            .await
            .unwrap();

        assert_eq!(
            (summary.processed, summary.success, summary.failed, summary.skipped),
            (3, 2, 1, 0)
        );
        assert_eq!(publisher.publish_count(), 2);
        assert_eq!(notifier.published.load(Ordering::SeqCst), 2);
        assert_eq!(notifier.failed.load(Ordering::SeqCst), 1);
        assert_eq!(notifier.cycles.load(Ordering::SeqCst), 1);

        let posts = db.scheduled_posts();
        for id in [&a.id, &b.id] {
            let post = posts.get_by_id(id).await.unwrap().unwrap();
            assert_eq!(post.status, PostStatus::Posted);
            assert_eq!(post.attempts, 1);
            assert_eq!(post.posted_at, Some(now));
            assert!(post.external_post_id.is_some());
            assert!(post.last_error.is_none());
        }

        let unlinked = posts.get_by_id(&c.id).await.unwrap().unwrap();
        assert_eq!(unlinked.status, PostStatus::Failed);
        assert_eq!(unlinked.attempts, 0);
        assert_eq!(unlinked.last_error.as_deref(), Some("LinkedIn account not connected"));
    }

    #[tokio::test]
    async fn test_publish_request_uses_account_and_content() {
        let db = setup().await;
        let now = Utc::now();
        linked_user(&db, "asha").await;
        schedule(&db, "asha", now - Duration::minutes(1)).await;

        let publisher = Arc::new(MockPublisher::new());
        dispatcher(&db, publisher.clone()).run_cycle(now).await.unwrap();

        let requests = publisher.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].author_id, "li-asha");
        assert_eq!(requests[0].access_token, "tok-asha");
        assert_eq!(requests[0].text, "post by asha");
    }

    #[tokio::test]
    async fn test_missing_user_and_expired_token_fail_without_attempt() {
        let db = setup().await;
        let now = Utc::now();

        db.users().insert("old", "old").await.unwrap();
        db.users()
            .link_social_account("old", "tok", Some(now - Duration::hours(1)), "li-old")
            .await
            .unwrap();

        let ghost = schedule(&db, "ghost", now - Duration::minutes(2)).await;
        let expired = schedule(&db, "old", now - Duration::minutes(1)).await;

        let publisher = Arc::new(MockPublisher::new());
        let summary = dispatcher(&db, publisher.clone()).run_cycle(now).await.unwrap();

        assert_eq!(summary.failed, 2);
        assert_eq!(publisher.publish_count(), 0);

        let posts = db.scheduled_posts();
        let ghost = posts.get_by_id(&ghost.id).await.unwrap().unwrap();
        assert_eq!(ghost.status, PostStatus::Failed);
        assert_eq!(ghost.last_error.as_deref(), Some("user not found"));

        let expired = posts.get_by_id(&expired.id).await.unwrap().unwrap();
        assert_eq!(expired.status, PostStatus::Failed);
        assert_eq!(expired.attempts, 0);
        assert_eq!(expired.last_error.as_deref(), Some("LinkedIn access token expired"));
    }

    #[tokio::test]
    async fn test_retryable_failure_stays_eligible_until_cap() {
        let db = setup().await;
        let now = Utc::now();
        linked_user(&db, "asha").await;
        let post = schedule(&db, "asha", now - Duration::minutes(1)).await;

        let publisher = Arc::new(MockPublisher::new());
        for _ in 0..3 {
            publisher.push_failure(PublishError::from_status(503, "unavailable".into()));
        }
        let dispatcher = dispatcher(&db, publisher.clone());
        let posts = db.scheduled_posts();

        for attempt in 1..=2 {
            let summary = dispatcher.run_cycle(now).await.unwrap();
            assert_eq!(summary.failed, 1);
            assert_eq!(summary.results[0].outcome, PostOutcome::Retrying);

            let stored = posts.get_by_id(&post.id).await.unwrap().unwrap();
            assert_eq!(stored.status, PostStatus::Pending);
            assert_eq!(stored.attempts, attempt);
            assert!(stored.last_error.as_deref().unwrap_or_default().contains("503"));
        }

        let summary = dispatcher.run_cycle(now).await.unwrap();
        assert_eq!(summary.results[0].outcome, PostOutcome::Failed);

        let stored = posts.get_by_id(&post.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PostStatus::Failed);
        assert_eq!(stored.attempts, 3);

        // Exhausted posts are never selected again.
        let summary = dispatcher.run_cycle(now).await.unwrap();
        assert_eq!(summary.processed, 0);
        assert_eq!(publisher.publish_count(), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_fails_immediately() {
        let db = setup().await;
        let now = Utc::now();
        linked_user(&db, "asha").await;
        let post = schedule(&db, "asha", now - Duration::minutes(1)).await;

        let publisher = Arc::new(MockPublisher::new());
        publisher.push_failure(PublishError::from_status(401, "revoked".into()));

        let summary = dispatcher(&db, publisher).run_cycle(now).await.unwrap();
        assert_eq!(summary.results[0].outcome, PostOutcome::Failed);

        let stored = db.scheduled_posts().get_by_id(&post.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PostStatus::Failed);
        assert_eq!(stored.attempts, 1);
    }

    #[tokio::test]
    async fn test_timeout_returns_post_to_pending() {
        let db = setup().await;
        let now = Utc::now();
        linked_user(&db, "asha").await;
        let post = schedule(&db, "asha", now - Duration::minutes(1)).await;

        let publisher = Arc::new(MockPublisher::new().with_delay(std::time::Duration::from_secs(5)));
        let mut config = DispatcherConfig::default();
        config.linkedin.timeout_secs = 1;
        let dispatcher = Dispatcher::new(db.clone(), publisher, config);

        let summary = dispatcher.run_cycle(now).await.unwrap();
        assert_eq!(summary.results[0].outcome, PostOutcome::Retrying);
        assert!(summary.results[0]
            .error
            .as_deref()
            .unwrap_or_default()
            .contains("within 1 seconds"));

        let stored = db.scheduled_posts().get_by_id(&post.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PostStatus::Pending);
        assert_eq!(stored.attempts, 1);
    }

    #[tokio::test]
    async fn test_future_posts_are_left_alone() {
        let db = setup().await;
        let now = Utc::now();
        linked_user(&db, "asha").await;
        schedule(&db, "asha", now + Duration::hours(1)).await;
        let ancient = schedule(&db, "asha", now - Duration::days(400)).await;

        let publisher = Arc::new(MockPublisher::new());
        let summary = dispatcher(&db, publisher).run_cycle(now).await.unwrap();

        assert_eq!(summary.processed, 1);
        assert_eq!(summary.results[0].post_id, ancient.id);
    }

    #[tokio::test]
    async fn test_stale_claim_is_retried() {
        let db = setup().await;
        let now = Utc::now();
        linked_user(&db, "asha").await;
        let post = schedule(&db, "asha", now - Duration::hours(2)).await;

        // A dispatcher that crashed mid-delivery an hour ago.
        db.scheduled_posts()
            .claim(&post.id, now - Duration::hours(1), 3)
            .await
            .unwrap()
            .unwrap();

        let publisher = Arc::new(MockPublisher::new());
        let summary = dispatcher(&db, publisher).run_cycle(now).await.unwrap();
        assert_eq!(summary.success, 1);

        let stored = db.scheduled_posts().get_by_id(&post.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PostStatus::Posted);
        assert_eq!(stored.attempts, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_overlapping_cycles_deliver_each_post_once() {
        let dir = tempfile::tempdir().unwrap();
        let config = DbConfig::new(dir.path().join("postcraft.db")).max_connections(8);
        let db = Database::new(config).await.unwrap();
        let now = Utc::now();
        linked_user(&db, "asha").await;
        linked_user(&db, "ravi").await;
        for i in 0..6 {
            schedule(&db, "asha", now - Duration::minutes(10 - i)).await;
            schedule(&db, "ravi", now - Duration::minutes(10 - i)).await;
        }

        let publisher = Arc::new(
            MockPublisher::new().with_delay(std::time::Duration::from_millis(20)),
        );
        let cycles: Vec<_> = (0..3)
            .map(|_| {
                let dispatcher = dispatcher(&db, publisher.clone());
                tokio::spawn(async move { dispatcher.run_cycle(now).await })
            })
            .collect();

        let mut delivered = 0;
        for cycle in cycles {
            let summary = cycle.await.unwrap().unwrap();
            assert_eq!(summary.failed, 0);
            delivered += summary.success;
        }

        assert_eq!(delivered, 12);
        assert_eq!(publisher.publish_count(), 12);

        let stats = db.scheduled_posts().stats().await.unwrap();
        assert_eq!(stats.posted, 12);
        assert_eq!(stats.in_flight, 0);
    }
}

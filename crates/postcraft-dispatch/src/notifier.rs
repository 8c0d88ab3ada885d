//! # Dispatch Notifier
//!
//! Hooks the dispatcher calls as posts are published or given up on.
//! A notifier is handed to [`crate::Dispatcher::with_notifier`]; there is
//! no global instance.

use tracing::{info, warn};

use crate::dispatcher::CycleSummary;
use crate::publisher::PublishReceipt;
use postcraft_core::ScheduledPost;

/// Receives dispatch events.
pub trait DispatchNotifier: Send + Sync {
    /// A post went live.
    fn post_published(&self, post: &ScheduledPost, receipt: &PublishReceipt);

    /// A delivery attempt failed. `will_retry` is false once the post is
    /// in `failed`.
    fn post_failed(&self, post: &ScheduledPost, error: &str, will_retry: bool);

    /// A cycle finished.
    fn cycle_completed(&self, summary: &CycleSummary);
}

/// Notifier that does nothing.
pub struct NoOpNotifier;

impl DispatchNotifier for NoOpNotifier {
    fn post_published(&self, _post: &ScheduledPost, _receipt: &PublishReceipt) {}
    fn post_failed(&self, _post: &ScheduledPost, _error: &str, _will_retry: bool) {}
    fn cycle_completed(&self, _summary: &CycleSummary) {}
}

/// Notifier that emits structured log events.
pub struct TracingNotifier;

impl DispatchNotifier for TracingNotifier {
    fn post_published(&self, post: &ScheduledPost, receipt: &PublishReceipt) {
        info!(
            post_id = %post.id,
            user_id = %post.user_id,
            external_id = %receipt.external_id,
            "Scheduled post published"
        );
    }

    fn post_failed(&self, post: &ScheduledPost, error: &str, will_retry: bool) {
        warn!(
            post_id = %post.id,
            user_id = %post.user_id,
            attempts = post.attempts,
            will_retry,
            error,
            "Scheduled post delivery failed"
        );
    }

    fn cycle_completed(&self, summary: &CycleSummary) {
        info!(
            processed = summary.processed,
            success = summary.success,
            failed = summary.failed,
            skipped = summary.skipped,
            "Dispatch cycle completed"
        );
    }
}

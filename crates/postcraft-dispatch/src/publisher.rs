//! # Social Publisher
//!
//! The capability the dispatcher delivers through. [`crate::linkedin`]
//! talks to the real API; [`MockPublisher`] replays scripted outcomes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{DispatchError, PublishError, PublishResult};

// =============================================================================
// Visibility
// =============================================================================

/// Who can see a published post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostVisibility {
    /// Anyone on or off LinkedIn.
    #[default]
    Public,
    /// First-degree connections only.
    Connections,
}

impl PostVisibility {
    /// Value of `MemberNetworkVisibility` in a UGC post.
    pub fn as_linkedin(&self) -> &'static str {
        match self {
            PostVisibility::Public => "PUBLIC",
            PostVisibility::Connections => "CONNECTIONS",
        }
    }
}

impl fmt::Display for PostVisibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PostVisibility::Public => write!(f, "public"),
            PostVisibility::Connections => write!(f, "connections"),
        }
    }
}

impl std::str::FromStr for PostVisibility {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "public" | "anyone" => Ok(PostVisibility::Public),
            "connections" | "connections_only" => Ok(PostVisibility::Connections),
            other => Err(DispatchError::InvalidConfig(format!(
                "Unknown post visibility: '{}'. Valid options: public, connections",
                other
            ))),
        }
    }
}

// =============================================================================
// Request / Receipt
// =============================================================================

/// One post to publish on behalf of a member.
#[derive(Clone, PartialEq, Eq)]
pub struct PublishRequest {
    /// Platform member id of the author.
    pub author_id: String,
    pub access_token: String,
    pub text: String,
    pub visibility: PostVisibility,
    /// URN of an already uploaded image asset.
    pub image: Option<String>,
}

impl fmt::Debug for PublishRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublishRequest")
            .field("author_id", &self.author_id)
            .field("access_token", &"<redacted>")
            .field("text_len", &self.text.chars().count())
            .field("visibility", &self.visibility)
            .field("image", &self.image)
            .finish()
    }
}

/// What the platform returned for a published post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishReceipt {
    /// Platform id of the post, e.g. `urn:li:share:7011`.
    pub external_id: String,
    pub url: Option<String>,
}

// =============================================================================
// Publisher Trait
// =============================================================================

#[async_trait]
pub trait SocialPublisher: Send + Sync {
    /// Publishes one post. Implementations do not retry; the dispatcher
    /// decides what to do with a failure.
    async fn publish(&self, request: &PublishRequest) -> PublishResult<PublishReceipt>;

    fn name(&self) -> &'static str;
}

// =============================================================================
// Mock Publisher
// =============================================================================

/// Scripted publisher for tests and local runs.
///
/// Outcomes queued with [`MockPublisher::push_outcome`] are returned in
/// order; once the queue is empty every call succeeds.
#[derive(Default)]
pub struct MockPublisher {
    outcomes: Mutex<VecDeque<PublishResult<PublishReceipt>>>,
    requests: Mutex<Vec<PublishRequest>>,
    delay: Option<Duration>,
    publish_count: AtomicU64,
}

impl MockPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_outcome(&self, outcome: PublishResult<PublishReceipt>) {
        if let Ok(mut queue) = self.outcomes.lock() {
            queue.push_back(outcome);
        }
    }

    pub fn push_failure(&self, error: PublishError) {
        self.push_outcome(Err(error));
    }

    pub fn publish_count(&self) -> u64 {
        self.publish_count.load(Ordering::SeqCst)
    }

    /// Requests seen so far, in call order.
    pub fn requests(&self) -> Vec<PublishRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl SocialPublisher for MockPublisher {
    async fn publish(&self, request: &PublishRequest) -> PublishResult<PublishReceipt> {
        let n = self.publish_count.fetch_add(1, Ordering::SeqCst) + 1;

        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .outcomes
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front());

        tracing::info!(author_id = %request.author_id, call = n, "[MOCK] Publishing post");

        scripted.unwrap_or_else(|| {
            let external_id = format!("urn:li:share:mock-{n}");
            Ok(PublishReceipt {
                url: Some(crate::linkedin::permalink(&external_id)),
                external_id,
            })
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

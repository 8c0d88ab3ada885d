//! # LinkedIn Publisher
//!
//! Publishes member posts through the UGC Posts API.
//!
//! ## Request
//! ```text
//! POST {api_url}/v2/ugcPosts
//! Authorization: Bearer {access_token}
//! X-Restli-Protocol-Version: 2.0.0
//!
//! {
//!   "author": "urn:li:person:{author_id}",
//!   "lifecycleState": "PUBLISHED",
//!   "specificContent": {
//!     "com.linkedin.ugc.ShareContent": {
//!       "shareCommentary": { "text": "..." },
//!       "shareMediaCategory": "NONE" | "IMAGE",
//!       "media": [{ "status": "READY", "media": "urn:li:digitalmediaAsset:..." }]
//!     }
//!   },
//!   "visibility": { "com.linkedin.ugc.MemberNetworkVisibility": "PUBLIC" }
//! }
//! ```
//!
//! The new post id comes back in the JSON `id` field or, when the body is
//! empty, in the `x-restli-id` header.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::LinkedInSettings;
use crate::error::{DispatchError, DispatchResult, PublishError, PublishResult};
use crate::publisher::{PublishReceipt, PublishRequest, SocialPublisher};

const RESTLI_PROTOCOL_VERSION: &str = "2.0.0";
const RESTLI_ID_HEADER: &str = "x-restli-id";
const FEED_URL: &str = "https://www.linkedin.com/feed/update";

/// Public URL of a post.
pub fn permalink(external_id: &str) -> String {
    format!("{}/{}", FEED_URL, external_id)
}

pub struct LinkedInPublisher {
    client: Client,
    endpoint: String,
    timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
struct UgcPostResponse {
    #[serde(default)]
    id: Option<String>,
}

impl LinkedInPublisher {
    pub fn new(settings: &LinkedInSettings) -> DispatchResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| DispatchError::Client(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/v2/ugcPosts", settings.api_url.trim_end_matches('/')),
            timeout_secs: settings.timeout_secs,
        })
    }

    fn body(request: &PublishRequest) -> Value {
        let mut share = json!({
            "shareCommentary": { "text": request.text },
            "shareMediaCategory": "NONE",
        });

        if let Some(asset) = &request.image {
            share["shareMediaCategory"] = json!("IMAGE");
            share["media"] = json!([{ "status": "READY", "media": asset }]);
        }

        json!({
            "author": format!("urn:li:person:{}", request.author_id),
            "lifecycleState": "PUBLISHED",
            "specificContent": { "com.linkedin.ugc.ShareContent": share },
            "visibility": {
                "com.linkedin.ugc.MemberNetworkVisibility": request.visibility.as_linkedin()
            },
        })
    }

    fn map_send_error(&self, err: reqwest::Error) -> PublishError {
        if err.is_timeout() {
            PublishError::Timeout(self.timeout_secs)
        } else {
            PublishError::from(err)
        }
    }
}

#[async_trait]
impl SocialPublisher for LinkedInPublisher {
    async fn publish(&self, request: &PublishRequest) -> PublishResult<PublishReceipt> {
        debug!(author_id = %request.author_id, has_image = request.image.is_some(), "Publishing to LinkedIn");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&request.access_token)
            .header("X-Restli-Protocol-Version", RESTLI_PROTOCOL_VERSION)
            .json(&Self::body(request))
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::from_status(status.as_u16(), body));
        }

        let header_id = response
            .headers()
            .get(RESTLI_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response.text().await.map_err(|e| self.map_send_error(e))?;
        let body_id = if body.trim().is_empty() {
            None
        } else {
            serde_json::from_str::<UgcPostResponse>(&body)
                .map_err(|e| PublishError::InvalidResponse(e.to_string()))?
                .id
        };

        let external_id = body_id
            .or(header_id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                PublishError::InvalidResponse(format!("HTTP {} without a post id", status.as_u16()))
            })?;

        info!(author_id = %request.author_id, external_id = %external_id, "Published to LinkedIn");

        Ok(PublishReceipt {
            url: Some(permalink(&external_id)),
            external_id,
        })
    }

    fn name(&self) -> &'static str {
        "linkedin"
    }
}

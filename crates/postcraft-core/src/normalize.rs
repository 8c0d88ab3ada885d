//! # Post Document Normalization
//!
//! Content documents written by older versions of the generator use
//! several spellings for the same field. They are mapped to one
//! [`NewScheduledPost`] here, at the ingestion boundary, so nothing
//! downstream ever looks at a field variant.
//!
//! ```text
//!   content     ◄── content | postContent | text
//!   scheduledAt ◄── scheduledAt | scheduledTime | scheduled_time
//!   imageRef    ◄── imageRef | imageUrl | image
//!   userId      ◄── userId | user_id | owner
//!   title       ◄── title | topicTitle | Topic
//! ```
//!
//! Timestamps are accepted as RFC 3339 strings, epoch milliseconds, or
//! `{ "_seconds": .., "_nanoseconds": .. }` objects. Years must fall in
//! 0000..=9999 so the stored text still sorts chronologically.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::error::ValidationError;
use crate::types::NewScheduledPost;
use crate::validation::{validate_identifier, validate_post_content, ValidationResult};

#[derive(Debug, Deserialize)]
struct PostDocument {
    #[serde(default, alias = "postContent", alias = "text")]
    content: Option<String>,

    #[serde(
        default,
        rename = "scheduledAt",
        alias = "scheduledTime",
        alias = "scheduled_time"
    )]
    scheduled_at: Option<Value>,

    #[serde(default, rename = "imageRef", alias = "imageUrl", alias = "image")]
    image_ref: Option<String>,

    #[serde(default, rename = "userId", alias = "user_id", alias = "owner")]
    user_id: Option<String>,

    #[serde(default, alias = "topicTitle", alias = "Topic")]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EpochSeconds {
    #[serde(alias = "_seconds")]
    seconds: i64,
    #[serde(default, alias = "_nanoseconds")]
    nanoseconds: u32,
}

/// Maps any known document shape to a validated [`NewScheduledPost`].
///
/// ## Example
/// ```rust
/// use postcraft_core::normalize::normalize_post_document;
/// use serde_json::json;
///
/// let post = normalize_post_document(json!({
///     "postContent": "Shipping day!",
///     "scheduledTime": "2026-03-01T09:00:00Z",
///     "user_id": "u-42",
///     "Topic": "Launches"
/// }))
/// .unwrap();
///
/// assert_eq!(post.content, "Shipping day!");
/// assert_eq!(post.user_id, "u-42");
/// assert_eq!(post.title.as_deref(), Some("Launches"));
/// ```
pub fn normalize_post_document(document: Value) -> ValidationResult<NewScheduledPost> {
    if !document.is_object() {
        return Err(ValidationError::InvalidFormat {
            field: "document".to_string(),
            reason: "must be a JSON object".to_string(),
        });
    }

    // Two spellings of one field in the same document is a duplicate-field error.
    let doc: PostDocument =
        serde_json::from_value(document).map_err(|e| ValidationError::InvalidFormat {
            field: "document".to_string(),
            reason: e.to_string(),
        })?;

    let content = doc.content.ok_or_else(|| ValidationError::Required {
        field: "content".to_string(),
    })?;
    validate_post_content(&content)?;

    let user_id = validate_identifier(
        "userId",
        doc.user_id.as_deref().unwrap_or_default(),
    )?;

    let scheduled_at = match doc.scheduled_at {
        Some(Value::Null) | None => {
            return Err(ValidationError::Required {
                field: "scheduledAt".to_string(),
            })
        }
        Some(raw) => parse_timestamp(raw)?,
    };

    Ok(NewScheduledPost {
        user_id,
        title: non_blank(doc.title),
        content,
        image_ref: non_blank(doc.image_ref),
        scheduled_at,
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Stored timestamps are compared as text; a signed or five-digit year
/// would sort ahead of every four-digit one.
const STORABLE_YEARS: std::ops::RangeInclusive<i32> = 0..=9999;

fn parse_timestamp(raw: Value) -> ValidationResult<DateTime<Utc>> {
    let invalid = |reason: &str| ValidationError::InvalidFormat {
        field: "scheduledAt".to_string(),
        reason: reason.to_string(),
    };

    let parsed = match raw {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| invalid("expected an RFC 3339 timestamp")),
        Value::Number(n) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
            .ok_or_else(|| invalid("expected epoch milliseconds")),
        obj @ Value::Object(_) => {
            let epoch: EpochSeconds = serde_json::from_value(obj)
                .map_err(|_| invalid("expected { seconds, nanoseconds }"))?;
            Utc.timestamp_opt(epoch.seconds, epoch.nanoseconds)
                .single()
                .ok_or_else(|| invalid("timestamp out of range"))
        }
        _ => Err(invalid("unsupported timestamp type")),
    }?;

    if !STORABLE_YEARS.contains(&parsed.year()) {
        return Err(invalid("year must be between 0000 and 9999"));
    }
    Ok(parsed)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_shape() {
        let post = normalize_post_document(json!({
            "content": "Hello",
            "scheduledAt": "2026-01-02T03:04:05+05:30",
            "imageRef": "urn:li:digitalmediaAsset:C5",
            "userId": "u1",
            "title": "Greetings"
        }))
        .unwrap();

        assert_eq!(post.content, "Hello");
        assert_eq!(post.image_ref.as_deref(), Some("urn:li:digitalmediaAsset:C5"));
        assert_eq!(post.scheduled_at.to_rfc3339(), "2026-01-01T21:34:05+00:00");
    }

    #[test]
    fn test_legacy_variants_map_to_same_post() {
        let variants = [
            json!({"content": "x", "scheduledAt": "2026-05-01T10:00:00Z", "userId": "u1", "imageUrl": "img"}),
            json!({"postContent": "x", "scheduledTime": "2026-05-01T10:00:00Z", "user_id": "u1", "image": "img"}),
            json!({"text": "x", "scheduled_time": 1_777_629_600_000_i64, "owner": "u1", "imageRef": "img"}),
            json!({"text": "x", "scheduledTime": {"_seconds": 1_777_629_600_i64, "_nanoseconds": 0}, "owner": "u1", "image": "img"}),
        ];

        let posts: Vec<_> = variants
            .into_iter()
            .map(|doc| normalize_post_document(doc).unwrap())
            .collect();

        for post in &posts {
            assert_eq!(post, &posts[0]);
        }
    }

    #[test]
    fn test_topic_variants() {
        let a = normalize_post_document(json!({
            "content": "x", "scheduledAt": "2026-05-01T10:00:00Z", "userId": "u1", "topicTitle": "AI"
        }))
        .unwrap();
        let b = normalize_post_document(json!({
            "content": "x", "scheduledAt": "2026-05-01T10:00:00Z", "userId": "u1", "Topic": "AI"
        }))
        .unwrap();
        assert_eq!(a.title.as_deref(), Some("AI"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_missing_content() {
        let err = normalize_post_document(json!({
            "scheduledAt": "2026-05-01T10:00:00Z", "userId": "u1"
        }))
        .unwrap_err();
        assert!(matches!(err, ValidationError::Required { ref field } if field == "content"));
    }

    #[test]
    fn test_content_too_long() {
        let err = normalize_post_document(json!({
            "content": "x".repeat(3001), "scheduledAt": "2026-05-01T10:00:00Z", "userId": "u1"
        }))
        .unwrap_err();
        assert!(matches!(err, ValidationError::TooLong { max: 3000, .. }));
    }

    #[test]
    fn test_missing_user_and_time() {
        assert!(normalize_post_document(json!({
            "content": "x", "scheduledAt": "2026-05-01T10:00:00Z"
        }))
        .is_err());
        assert!(normalize_post_document(json!({ "content": "x", "userId": "u1" })).is_err());
        assert!(normalize_post_document(json!({
            "content": "x", "userId": "u1", "scheduledAt": null
        }))
        .is_err());
    }

    #[test]
    fn test_bad_timestamp() {
        let err = normalize_post_document(json!({
            "content": "x", "scheduledAt": "tomorrow morning", "userId": "u1"
        }))
        .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidFormat { .. }));
    }

    #[test]
    fn test_out_of_range_years_rejected() {
        // Year 10000 and year -1 in each numeric encoding.
        let docs = [
            json!({"content": "x", "scheduledAt": 253_402_300_800_000_i64, "userId": "u1"}),
            json!({"content": "x", "scheduledAt": -62_198_755_200_000_i64, "userId": "u1"}),
            json!({"content": "x", "scheduledAt": {"_seconds": 253_402_300_800_i64}, "userId": "u1"}),
        ];
        for doc in docs {
            let err = normalize_post_document(doc).unwrap_err();
            assert!(
                matches!(err, ValidationError::InvalidFormat { ref reason, .. } if reason.contains("year")),
                "{err:?}"
            );
        }

        // Last representable instant still accepted.
        let post = normalize_post_document(json!({
            "content": "x", "scheduledAt": 253_402_300_799_999_i64, "userId": "u1"
        }))
        .unwrap();
        assert_eq!(post.scheduled_at.year(), 9999);
    }

    #[test]
    fn test_conflicting_variants_rejected() {
        assert!(normalize_post_document(json!({
            "content": "a", "text": "b", "scheduledAt": "2026-05-01T10:00:00Z", "userId": "u1"
        }))
        .is_err());
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(normalize_post_document(json!(["content"])).is_err());
    }

    #[test]
    fn test_blank_optional_fields_dropped() {
        let post = normalize_post_document(json!({
            "content": "x", "scheduledAt": "2026-05-01T10:00:00Z", "userId": "u1", "image": "  ", "title": ""
        }))
        .unwrap();
        assert_eq!(post.image_ref, None);
        assert_eq!(post.title, None);
    }
}

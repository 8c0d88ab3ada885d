//! # Validation Module
//!
//! Field-level input rules for Postcraft.
//!
//! ## Where Validation Happens
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: HTTP handler (apps/api)                                      │
//! │  └── JSON deserialization (shape and types)                            │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── Coupon codes, user ids, post bodies                               │
//! │  └── Called by normalize and by the API                                │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: SQLite                                                       │
//! │  └── NOT NULL, UNIQUE, CHECK and foreign key constraints               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use postcraft_core::validation::{validate_coupon_code, validate_post_content};
//!
//! assert_eq!(validate_coupon_code(" launch50 ").unwrap(), "LAUNCH50");
//! assert!(validate_post_content("").is_err());
//! ```

use crate::error::ValidationError;
use crate::MAX_POST_LENGTH;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest coupon code accepted.
pub const MAX_COUPON_CODE_LENGTH: usize = 32;

// =============================================================================
// Coupon Codes
// =============================================================================

/// Canonical form of a coupon code: trimmed and upper-cased.
///
/// Performs no validation; lookups and comparisons go through this.
pub fn canonical_coupon_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Validates a user-entered coupon code and returns its canonical form.
///
/// ## Rules
/// - Must not be empty after trimming
/// - At most 32 characters
/// - Letters, digits, hyphens and underscores only
pub fn validate_coupon_code(code: &str) -> ValidationResult<String> {
    let canonical = canonical_coupon_code(code);

    if canonical.is_empty() {
        return Err(ValidationError::Required {
            field: "couponCode".to_string(),
        });
    }

    if canonical.chars().count() > MAX_COUPON_CODE_LENGTH {
        return Err(ValidationError::TooLong {
            field: "couponCode".to_string(),
            max: MAX_COUPON_CODE_LENGTH,
        });
    }

    if !canonical
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "couponCode".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(canonical)
}

// =============================================================================
// Identifiers
// =============================================================================

/// Validates an opaque identifier (user id, plan id, payment id).
///
/// Returns the trimmed value.
pub fn validate_identifier(field: &str, value: &str) -> ValidationResult<String> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.len() > 128 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 128,
        });
    }

    Ok(value.to_string())
}

// =============================================================================
// Post Content
// =============================================================================

/// Validates a post body.
///
/// ## Rules
/// - Must contain something other than whitespace
/// - At most 3000 characters (counted as chars, not bytes)
///
/// The body is returned as-is; leading blank lines and spacing are
/// part of how LinkedIn posts are formatted.
pub fn validate_post_content(content: &str) -> ValidationResult<()> {
    if content.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "content".to_string(),
        });
    }

    if content.chars().count() > MAX_POST_LENGTH {
        return Err(ValidationError::TooLong {
            field: "content".to_string(),
            max: MAX_POST_LENGTH,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_coupon_code() {
        assert_eq!(canonical_coupon_code("  summer-25\n"), "SUMMER-25");
        assert_eq!(canonical_coupon_code(""), "");
    }

    #[test]
    fn test_validate_coupon_code() {
        assert_eq!(validate_coupon_code("launch50").unwrap(), "LAUNCH50");
        assert!(matches!(
            validate_coupon_code("   "),
            Err(ValidationError::Required { .. })
        ));
        assert!(matches!(
            validate_coupon_code("NO SPACES"),
            Err(ValidationError::InvalidFormat { .. })
        ));
        assert!(matches!(
            validate_coupon_code(&"A".repeat(33)),
            Err(ValidationError::TooLong { max: 32, .. })
        ));
    }

    #[test]
    fn test_validate_identifier() {
        assert_eq!(validate_identifier("userId", " u-1 ").unwrap(), "u-1");
        assert!(validate_identifier("userId", "").is_err());
    }

    #[test]
    fn test_validate_post_content() {
        assert!(validate_post_content("Hello LinkedIn").is_ok());
        assert!(validate_post_content(" \n\t ").is_err());

        // 3000 multi-byte chars is fine; the limit is on characters.
        assert!(validate_post_content(&"é".repeat(MAX_POST_LENGTH)).is_ok());
        assert!(matches!(
            validate_post_content(&"x".repeat(MAX_POST_LENGTH + 1)),
            Err(ValidationError::TooLong { .. })
        ));
    }
}

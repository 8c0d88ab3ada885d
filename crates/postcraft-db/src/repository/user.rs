//! # User Repository
//!
//! Users and their linked LinkedIn accounts. The dispatcher only reads
//! credentials; linking happens in the OAuth flow, outside this service,
//! and the write methods here exist for that flow and for tests.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use postcraft_core::{CredentialLookup, SocialCredentials};

/// Repository for users and social credentials.
#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    /// Creates a new UserRepository.
    pub fn new(pool: SqlitePool) -> Self {
        UserRepository { pool }
    }

    /// Creates a user.
    pub async fn insert(&self, id: &str, display_name: &str) -> DbResult<()> {
        sqlx::query("INSERT INTO users (id, display_name, created_at) VALUES (?1, ?2, ?3)")
            .bind(id)
            .bind(display_name)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Links (or re-links) a social account to a user.
    pub async fn link_social_account(
        &self,
        user_id: &str,
        access_token: &str,
        token_expires_at: Option<DateTime<Utc>>,
        external_account_id: &str,
    ) -> DbResult<()> {
        let now = Utc::now();

        debug!(user_id = %user_id, "Linking social account");

        sqlx::query(
            r#"
            INSERT INTO social_accounts (
                user_id, access_token, token_expires_at, external_account_id,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            ON CONFLICT(user_id) DO UPDATE SET
                access_token = excluded.access_token,
                token_expires_at = excluded.token_expires_at,
                external_account_id = excluded.external_account_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(access_token)
        .bind(token_expires_at)
        .bind(external_account_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Removes a user's linked account.
    pub async fn unlink_social_account(&self, user_id: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM social_accounts WHERE user_id = ?1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// What is known about `user_id`'s ability to publish.
    ///
    /// Expiry is not judged here; see `postcraft_core::dispatch::usable_credentials`.
    pub async fn credentials_for(&self, user_id: &str) -> DbResult<CredentialLookup> {
        let row = sqlx::query_as::<_, CredentialRecord>(
            r#"
            SELECT
                u.id AS user_id,
                s.access_token,
                s.token_expires_at,
                s.external_account_id
            FROM users u
            LEFT JOIN social_accounts s ON s.user_id = u.id
            WHERE u.id = ?1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            None => CredentialLookup::UserMissing,
            Some(CredentialRecord {
                user_id,
                access_token: Some(access_token),
                token_expires_at,
                external_account_id: Some(external_account_id),
            }) => CredentialLookup::Linked(SocialCredentials {
                user_id,
                access_token,
                token_expires_at,
                external_account_id,
            }),
            Some(_) => CredentialLookup::NotLinked,
        })
    }
}

// =============================================================================
// Record Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct CredentialRecord {
    user_id: String,
    access_token: Option<String>,
    token_expires_at: Option<DateTime<Utc>>,
    external_account_id: Option<String>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::Duration;

    #[tokio::test]
    async fn test_credential_lookup_states() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let users = db.users();

        assert_eq!(
            users.credentials_for("ghost").await.unwrap(),
            CredentialLookup::UserMissing
        );

        users.insert("u1", "Asha").await.unwrap();
        assert_eq!(
            users.credentials_for("u1").await.unwrap(),
            CredentialLookup::NotLinked
        );

        let expiry = Utc::now() + Duration::days(60);
        users
            .link_social_account("u1", "tok-1", Some(expiry), "li-123")
            .await
            .unwrap();

        let CredentialLookup::Linked(creds) = users.credentials_for("u1").await.unwrap() else {
            panic!("expected linked credentials");
        };
        assert_eq!(creds.access_token, "tok-1");
        assert_eq!(creds.external_account_id, "li-123");
        assert_eq!(creds.token_expires_at, Some(expiry));
    }

    #[tokio::test]
    async fn test_relink_and_unlink() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let users = db.users();
        users.insert("u1", "Asha").await.unwrap();

        users.link_social_account("u1", "old", None, "li-1").await.unwrap();
        users.link_social_account("u1", "new", None, "li-1").await.unwrap();

        let CredentialLookup::Linked(creds) = users.credentials_for("u1").await.unwrap() else {
            panic!("expected linked credentials");
        };
        assert_eq!(creds.access_token, "new");
        assert_eq!(creds.token_expires_at, None);

        assert!(users.unlink_social_account("u1").await.unwrap());
        assert_eq!(
            users.credentials_for("u1").await.unwrap(),
            CredentialLookup::NotLinked
        );
    }

    #[tokio::test]
    async fn test_link_requires_user() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let err = db
            .users()
            .link_social_account("ghost", "tok", None, "li")
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::DbError::ForeignKeyViolation { .. }));
    }
}

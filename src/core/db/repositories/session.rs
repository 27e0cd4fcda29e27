//! Session store keyed by token fingerprints.
//!
//! Raw tokens are never persisted; each row holds the SHA-256 fingerprint of
//! an issued token together with its absolute expiry. The table acts as a
//! revocation list for the local trust model: logout tombstones the row
//! (`revoked_at`) rather than deleting it, so an explicit revocation stays
//! distinguishable from a token that was simply never recorded. The expiry
//! sweep removes spent rows of both kinds.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use crate::core::db::models::Session;

/// Session repository error types
#[derive(Debug, thiserror::Error)]
pub enum SessionRepositoryError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

/// What the store knows about a token fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionLiveness {
    /// A non-expired, non-revoked row exists.
    Live,
    /// The row was tombstoned by an explicit logout.
    Revoked,
    /// No usable record. Cryptographic validity remains authoritative; the
    /// verification path accepts these as unconfirmed.
    Unknown,
}

/// Session repository for database operations
#[derive(Clone)]
pub struct SessionRepository {
    pool: PgPool,
}

impl SessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// One-way fingerprint of a raw token (SHA-256, hex).
    pub fn fingerprint(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Record an issued token. Upserts per fingerprint, so at most one row
    /// exists for any issued token.
    pub async fn create(
        &self,
        user_id: Uuid,
        fingerprint: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Session, SessionRepositoryError> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            INSERT INTO sessions (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (token_hash) DO UPDATE
                SET expires_at = EXCLUDED.expires_at, revoked_at = NULL
            RETURNING id, user_id, token_hash, expires_at, revoked_at, created_at
            "#,
        )
        .bind(user_id)
        .bind(fingerprint)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(session)
    }

    /// Liveness of a fingerprint for the verification path.
    pub async fn liveness(
        &self,
        fingerprint: &str,
    ) -> Result<SessionLiveness, SessionRepositoryError> {
        let session = self.find_by_fingerprint(fingerprint).await?;

        Ok(match session {
            Some(s) if s.is_revoked() => SessionLiveness::Revoked,
            Some(s) if !s.is_expired(Utc::now()) => SessionLiveness::Live,
            _ => SessionLiveness::Unknown,
        })
    }

    /// Find a session row by fingerprint
    pub async fn find_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> Result<Option<Session>, SessionRepositoryError> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            SELECT id, user_id, token_hash, expires_at, revoked_at, created_at
            FROM sessions
            WHERE token_hash = $1
            "#,
        )
        .bind(fingerprint)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    /// Tombstone the session for a fingerprint. Idempotent: returns false if
    /// no live row matched.
    pub async fn revoke(&self, fingerprint: &str) -> Result<bool, SessionRepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET revoked_at = NOW()
            WHERE token_hash = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(fingerprint)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Tombstone every live session for an account (logout everywhere).
    /// Deleting the rows instead would leave the tokens merely unconfirmed,
    /// which the verification path accepts. Returns the number of sessions
    /// revoked.
    pub async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, SessionRepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET revoked_at = NOW()
            WHERE user_id = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Delete all rows whose expiry has passed, tombstoned or not.
    /// Returns the number of rows removed.
    pub async fn sweep_expired(&self) -> Result<u64, SessionRepositoryError> {
        let result = sqlx::query(
            r#"
            DELETE FROM sessions
            WHERE expires_at < NOW()
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

//! Account lifecycle: registration, login, logout.
//!
//! Login failures deliberately collapse to a single error so a caller cannot
//! distinguish "no such account" from "wrong password".

use tracing::info;

use crate::core::auth::jwt::{JwtError, TokenCodec};
use crate::core::db::models::PublicUser;
use crate::core::db::repositories::session::{SessionRepository, SessionRepositoryError};
use crate::core::db::repositories::user::{UserRepository, UserRepositoryError};

const MIN_PASSWORD_LEN: usize = 8;
const MIN_NAME_LEN: usize = 2;
const MAX_NAME_LEN: usize = 100;

/// Authentication error types
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid email address")]
    InvalidEmail,
    #[error("Password must be at least {MIN_PASSWORD_LEN} characters and contain an uppercase letter, a lowercase letter and a digit")]
    WeakPassword,
    #[error("Name must be between {MIN_NAME_LEN} and {MAX_NAME_LEN} characters")]
    InvalidName,
    #[error("An account with this email already exists")]
    DuplicateAccount,
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Token error: {0}")]
    Token(#[from] JwtError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<UserRepositoryError> for AuthError {
    fn from(e: UserRepositoryError) -> Self {
        match e {
            UserRepositoryError::EmailAlreadyExists => AuthError::DuplicateAccount,
            UserRepositoryError::NotFound => AuthError::InvalidCredentials,
            UserRepositoryError::HashingError(msg) => AuthError::Internal(msg),
            UserRepositoryError::DatabaseError(e) => AuthError::Internal(e.to_string()),
        }
    }
}

impl From<SessionRepositoryError> for AuthError {
    fn from(e: SessionRepositoryError) -> Self {
        AuthError::Internal(e.to_string())
    }
}

/// An established session: the account plus its freshly minted token.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AuthSession {
    pub user: PublicUser,
    pub token: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

/// Credential service for the local trust model.
#[derive(Clone)]
pub struct AuthService {
    users: UserRepository,
    sessions: SessionRepository,
    codec: TokenCodec,
}

impl AuthService {
    pub fn new(users: UserRepository, sessions: SessionRepository, codec: TokenCodec) -> Self {
        Self {
            users,
            sessions,
            codec,
        }
    }

    /// Create an account and log it in.
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, AuthError> {
        validate_name(name)?;
        validate_email(email)?;
        validate_password(password)?;

        let user = self.users.create(name.trim(), email, password).await?;
        info!(user_id = %user.id, "account registered");

        self.establish_session(user).await
    }

    /// Verify credentials and mint a session token.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        // One error for both absent account and wrong password
        let user = self
            .users
            .authenticate(email, password)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        info!(user_id = %user.id, "login succeeded");
        self.establish_session(user).await
    }

    /// Revoke the session behind a raw token. Idempotent: logging out an
    /// unknown or already revoked token succeeds quietly.
    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        let fingerprint = SessionRepository::fingerprint(token);
        let revoked = self.sessions.revoke(&fingerprint).await?;
        if revoked {
            info!("session revoked");
        }
        Ok(())
    }

    /// Revoke every live session the account holds (logout everywhere).
    /// Returns how many sessions were revoked.
    pub async fn logout_all(&self, user_id: uuid::Uuid) -> Result<u64, AuthError> {
        let revoked = self.sessions.revoke_all_for_user(user_id).await?;
        if revoked > 0 {
            info!(user_id = %user_id, revoked, "all sessions revoked");
        }
        Ok(revoked)
    }

    async fn establish_session(
        &self,
        user: crate::core::db::models::User,
    ) -> Result<AuthSession, AuthError> {
        let (token, expires_at) = self.codec.sign(&user)?;

        let fingerprint = SessionRepository::fingerprint(&token);
        self.sessions
            .create(user.id, &fingerprint, expires_at)
            .await?;

        Ok(AuthSession {
            user: PublicUser::from(user),
            token,
            expires_at,
        })
    }
}

fn validate_name(name: &str) -> Result<(), AuthError> {
    let len = name.trim().chars().count();
    if (MIN_NAME_LEN..=MAX_NAME_LEN).contains(&len) {
        Ok(())
    } else {
        Err(AuthError::InvalidName)
    }
}

fn validate_email(email: &str) -> Result<(), AuthError> {
    let Some((local, domain)) = email.split_once('@') else {
        return Err(AuthError::InvalidEmail);
    };
    let domain_ok = domain.split('.').count() >= 2
        && domain.split('.').all(|part| !part.is_empty());
    if local.is_empty() || !domain_ok || email.contains(char::is_whitespace) {
        return Err(AuthError::InvalidEmail);
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), AuthError> {
    let long_enough = password.chars().count() >= MIN_PASSWORD_LEN;
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());

    if long_enough && has_upper && has_lower && has_digit {
        Ok(())
    } else {
        Err(AuthError::WeakPassword)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // Validation Tests (don't require database)
    // ========================================================================

    #[test]
    fn test_validate_email_accepts_normal_addresses() {
        assert!(validate_email("alice@example.com").is_ok());
        assert!(validate_email("a.b+tag@sub.example.co").is_ok());
    }

    #[test]
    fn test_validate_email_rejects_bad_addresses() {
        assert!(validate_email("").is_err());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("alice@").is_err());
        assert!(validate_email("alice@localhost").is_err());
        assert!(validate_email("alice@example..com").is_err());
        assert!(validate_email("alice @example.com").is_err());
    }

    #[test]
    fn test_validate_password_accepts_strong() {
        assert!(validate_password("Sup3rSecret").is_ok());
        assert!(validate_password("Aa345678").is_ok());
    }

    #[test]
    fn test_validate_password_rejects_weak() {
        // Too short
        assert!(validate_password("Aa1").is_err());
        // Missing digit
        assert!(validate_password("NoDigitsHere").is_err());
        // Missing uppercase
        assert!(validate_password("alllower1").is_err());
        // Missing lowercase
        assert!(validate_password("ALLUPPER1").is_err());
        assert!(validate_password("").is_err());
    }

    #[test]
    fn test_validate_name_bounds() {
        assert!(validate_name("Bo").is_ok());
        assert!(validate_name("  Alice  ").is_ok());
        assert!(validate_name("A").is_err());
        assert!(validate_name("").is_err());
        assert!(validate_name(&"x".repeat(101)).is_err());
    }

    // ========================================================================
    // Integration Tests (require database)
    // ========================================================================

    async fn test_pool() -> sqlx::PgPool {
        use crate::core::db::pool::{DbConfig, create_pool};

        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");
        create_pool(&DbConfig::new(url))
            .await
            .expect("Failed to create test pool")
    }

    async fn test_service() -> (AuthService, sqlx::PgPool) {
        use crate::core::auth::jwt::TokenCodec;

        let pool = test_pool().await;
        let service = AuthService::new(
            UserRepository::new(pool.clone()),
            SessionRepository::new(pool.clone()),
            TokenCodec::new("test_secret_key_for_auth_service", "inkpost-test", 24),
        );
        (service, pool)
    }

    async fn cleanup(pool: &sqlx::PgPool, email: &str) {
        // Sessions go with the user via CASCADE
        sqlx::query("DELETE FROM users WHERE email = $1")
            .bind(email)
            .execute(pool)
            .await
            .ok();
    }

    fn unique_email(tag: &str) -> String {
        format!("{tag}_{}@example.com", uuid::Uuid::new_v4())
    }

    #[tokio::test]
    #[ignore = "requires running PostgreSQL database"]
    async fn test_register_then_login_round_trip() {
        let (service, pool) = test_service().await;
        let email = unique_email("round_trip");

        let registered = service
            .register("Round Trip", &email, "Sup3rSecret")
            .await
            .unwrap();
        assert_eq!(registered.user.email, email);
        assert!(!registered.token.is_empty());

        let logged_in = service.login(&email, "Sup3rSecret").await.unwrap();
        assert_eq!(logged_in.user.id, registered.user.id);

        cleanup(&pool, &email).await;
    }

    #[tokio::test]
    #[ignore = "requires running PostgreSQL database"]
    async fn test_login_failures_are_indistinguishable() {
        let (service, pool) = test_service().await;
        let email = unique_email("collapse");

        service
            .register("Collapse", &email, "Sup3rSecret")
            .await
            .unwrap();

        let wrong_password = service.login(&email, "Wr0ngPassword").await.unwrap_err();
        let absent_account = service
            .login("nobody@example.com", "Sup3rSecret")
            .await
            .unwrap_err();

        assert!(matches!(wrong_password, AuthError::InvalidCredentials));
        assert!(matches!(absent_account, AuthError::InvalidCredentials));
        assert_eq!(wrong_password.to_string(), absent_account.to_string());

        cleanup(&pool, &email).await;
    }

    #[tokio::test]
    #[ignore = "requires running PostgreSQL database"]
    async fn test_duplicate_registration_rejected() {
        let (service, pool) = test_service().await;
        let email = unique_email("duplicate");

        service
            .register("First", &email, "Sup3rSecret")
            .await
            .unwrap();
        let err = service
            .register("Second", &email, "Sup3rSecret")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::DuplicateAccount));

        cleanup(&pool, &email).await;
    }

    #[tokio::test]
    #[ignore = "requires running PostgreSQL database"]
    async fn test_logout_is_idempotent() {
        let (service, pool) = test_service().await;
        let email = unique_email("logout");

        let session = service
            .register("Logout", &email, "Sup3rSecret")
            .await
            .unwrap();

        service.logout(&session.token).await.unwrap();
        service.logout(&session.token).await.unwrap();
        service.logout("not.a.recorded.token").await.unwrap();

        cleanup(&pool, &email).await;
    }

    #[tokio::test]
    #[ignore = "requires running PostgreSQL database"]
    async fn test_logout_all_revokes_every_session() {
        use crate::core::db::repositories::session::SessionLiveness;

        let (service, pool) = test_service().await;
        let email = unique_email("logout_all");

        let first = service
            .register("Everywhere", &email, "Sup3rSecret")
            .await
            .unwrap();
        let second = service.login(&email, "Sup3rSecret").await.unwrap();

        let revoked = service.logout_all(first.user.id).await.unwrap();
        assert_eq!(revoked, 2);

        for token in [&first.token, &second.token] {
            let fp = SessionRepository::fingerprint(token);
            assert_eq!(
                service.sessions.liveness(&fp).await.unwrap(),
                SessionLiveness::Revoked
            );
        }

        cleanup(&pool, &email).await;
    }
}

//! Bearer token encoding and verification.
//!
//! Locally issued tokens are signed with HS256 over the configured shared
//! secret. Federated deployments verify RS256 signatures against a remote key
//! set instead; both paths go through [`verify`] with an explicitly
//! allow-listed algorithm so the token header can never pick its own.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::db::models::{Role, User};

/// Token verification errors
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Malformed token")]
    Malformed,

    #[error("Invalid signature")]
    SignatureInvalid,

    #[error("Token expired")]
    Expired,

    #[error("Token encoding failed: {0}")]
    EncodingError(String),

    #[error("Token decoding failed: {0}")]
    DecodingError(String),
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => JwtError::Expired,
            ErrorKind::InvalidSignature
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidAlgorithmName
            | ErrorKind::InvalidIssuer => JwtError::SignatureInvalid,
            ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => JwtError::Malformed,
            _ => JwtError::DecodingError(err.to_string()),
        }
    }
}

/// Token claims. The expiry is embedded as an absolute instant at signing
/// time; verification compares it against the current instant directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (account ID)
    pub sub: String,
    /// Account email
    pub email: String,
    /// Display name
    pub name: String,
    /// Account role
    pub role: Role,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration instant (Unix timestamp)
    pub exp: i64,
    /// Issuer
    pub iss: String,
    /// Unique token ID
    pub jti: String,
}

impl Claims {
    /// Get the subject as a UUID.
    pub fn user_id(&self) -> Result<Uuid, JwtError> {
        Uuid::parse_str(&self.sub).map_err(|_| JwtError::Malformed)
    }
}

/// Structural token header: signing algorithm and optional key id.
///
/// Produced by [`decode_header`], which makes no trust decision.
#[derive(Debug, Clone)]
pub struct TokenHead {
    pub algorithm: Algorithm,
    pub key_id: Option<String>,
}

/// Parse a token's header without verifying anything.
pub fn decode_header(token: &str) -> Result<TokenHead, JwtError> {
    let header = jsonwebtoken::decode_header(token).map_err(|_| JwtError::Malformed)?;
    Ok(TokenHead {
        algorithm: header.alg,
        key_id: header.kid,
    })
}

/// Verify a token's signature and expiry with the supplied key material.
///
/// Only `algorithm` is accepted regardless of what the token header claims.
/// Expiry is checked with zero leeway. When `issuer` is given, a mismatched
/// `iss` claim fails verification.
pub fn verify(
    token: &str,
    key: &DecodingKey,
    algorithm: Algorithm,
    issuer: Option<&str>,
) -> Result<Claims, JwtError> {
    let mut validation = Validation::new(algorithm);
    validation.leeway = 0;
    validation.validate_aud = false;
    if let Some(issuer) = issuer {
        validation.set_issuer(&[issuer]);
    }

    let data = decode::<Claims>(token, key, &validation)?;
    Ok(data.claims)
}

/// Codec for locally issued tokens (symmetric trust model).
#[derive(Clone)]
pub struct TokenCodec {
    issuer: String,
    token_ttl_hours: i64,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl TokenCodec {
    /// Create a codec from the shared secret.
    pub fn new(secret: &str, issuer: impl Into<String>, token_ttl_hours: i64) -> Self {
        Self {
            issuer: issuer.into(),
            token_ttl_hours,
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Sign a token for an account. Returns the compact token string and the
    /// absolute expiry instant embedded in it.
    pub fn sign(&self, user: &User) -> Result<(String, DateTime<Utc>), JwtError> {
        let now = Utc::now();
        let expires_at = now + Duration::hours(self.token_ttl_hours);

        let claims = Claims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            iss: self.issuer.clone(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| JwtError::EncodingError(e.to_string()))?;

        Ok((token, expires_at))
    }

    /// Verify a locally issued token.
    pub fn verify(&self, token: &str) -> Result<Claims, JwtError> {
        verify(
            token,
            &self.decoding_key,
            Algorithm::HS256,
            Some(&self.issuer),
        )
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_user() -> User {
        User {
            id: Uuid::new_v4(),
            email: "test@example.com".to_string(),
            name: "Test User".to_string(),
            password_hash: "irrelevant".to_string(),
            role: "user".to_string(),
            verified: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn create_test_codec() -> TokenCodec {
        TokenCodec::new("test_secret_key_for_testing_only_32bytes!", "inkpost", 24)
    }

    #[test]
    fn test_sign_and_verify_round_trip() {
        let codec = create_test_codec();
        let user = test_user();

        let (token, expires_at) = codec.sign(&user).unwrap();
        assert!(!token.is_empty());
        assert!(expires_at > Utc::now());

        let claims = codec.verify(&token).unwrap();
        assert_eq!(claims.user_id().unwrap(), user.id);
        assert_eq!(claims.email, "test@example.com");
        assert_eq!(claims.name, "Test User");
        assert_eq!(claims.role, Role::User);
        assert_eq!(claims.exp, expires_at.timestamp());
    }

    #[test]
    fn test_each_token_has_unique_jti() {
        let codec = create_test_codec();
        let user = test_user();

        let (token1, _) = codec.sign(&user).unwrap();
        let (token2, _) = codec.sign(&user).unwrap();

        let claims1 = codec.verify(&token1).unwrap();
        let claims2 = codec.verify(&token2).unwrap();
        assert_ne!(claims1.jti, claims2.jti);
    }

    #[test]
    fn test_expired_token_rejected() {
        // Negative TTL puts the expiry in the past
        let codec = TokenCodec::new("test_secret", "inkpost", -1);
        let (token, _) = codec.sign(&test_user()).unwrap();

        let result = codec.verify(&token);
        assert!(matches!(result, Err(JwtError::Expired)), "got {:?}", result);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let codec1 = TokenCodec::new("secret_one", "inkpost", 24);
        let codec2 = TokenCodec::new("secret_two", "inkpost", 24);

        let (token, _) = codec1.sign(&test_user()).unwrap();
        let result = codec2.verify(&token);
        assert!(matches!(result, Err(JwtError::SignatureInvalid)));
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        let (token, _) = TokenCodec::new("secret", "other-issuer", 24)
            .sign(&test_user())
            .unwrap();

        let result = TokenCodec::new("secret", "inkpost", 24).verify(&token);
        assert!(matches!(result, Err(JwtError::SignatureInvalid)));
    }

    #[test]
    fn test_malformed_token_rejected() {
        let codec = create_test_codec();

        assert!(matches!(codec.verify(""), Err(JwtError::Malformed)));
        assert!(matches!(
            codec.verify("not.a.token"),
            Err(JwtError::Malformed)
        ));
        assert!(matches!(
            codec.verify("onlyonesegment"),
            Err(JwtError::Malformed)
        ));
    }

    #[test]
    fn test_decode_header_structural_only() {
        let codec = create_test_codec();
        let (token, _) = codec.sign(&test_user()).unwrap();

        let head = decode_header(&token).unwrap();
        assert_eq!(head.algorithm, Algorithm::HS256);
        assert!(head.key_id.is_none());
    }

    #[test]
    fn test_decode_header_malformed() {
        assert!(matches!(
            decode_header("garbage"),
            Err(JwtError::Malformed)
        ));
    }

    #[test]
    fn test_algorithm_substitution_rejected() {
        // A valid HS256 token must not pass when the caller only allows RS256,
        // even though the header says HS256.
        let codec = create_test_codec();
        let (token, _) = codec.sign(&test_user()).unwrap();

        let result = verify(&token, codec.decoding_key(), Algorithm::RS256, None);
        assert!(result.is_err());
    }

    #[test]
    fn test_claims_serialization_roundtrip() {
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            email: "a@b.co".to_string(),
            name: "A".to_string(),
            role: Role::Admin,
            iat: 1_700_000_000,
            exp: 1_700_086_400,
            iss: "inkpost".to_string(),
            jti: Uuid::new_v4().to_string(),
        };

        let json = serde_json::to_string(&claims).unwrap();
        assert!(json.contains(r#""role":"admin""#));

        let back: Claims = serde_json::from_str(&json).unwrap();
        assert_eq!(back.role, Role::Admin);
        assert_eq!(back.exp, claims.exp);
    }

    #[test]
    fn test_claims_bad_subject() {
        let claims = Claims {
            sub: "not-a-uuid".to_string(),
            email: String::new(),
            name: String::new(),
            role: Role::User,
            iat: 0,
            exp: 0,
            iss: String::new(),
            jti: String::new(),
        };
        assert!(matches!(claims.user_id(), Err(JwtError::Malformed)));
    }

    #[test]
    fn test_jwt_error_display() {
        assert_eq!(format!("{}", JwtError::Malformed), "Malformed token");
        assert_eq!(format!("{}", JwtError::Expired), "Token expired");
        assert_eq!(
            format!("{}", JwtError::SignatureInvalid),
            "Invalid signature"
        );
    }
}

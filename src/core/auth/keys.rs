//! Remote verification key set for the federated trust model.
//!
//! Tokens minted by a third-party identity provider are verified against the
//! provider's published RSA public keys. The key set is fetched over HTTP,
//! cached with a freshness TTL, and refreshed on demand when a token names a
//! key id the cache does not hold (the provider rotates keys without notice).
//! When the provider is unreachable, a cached set keeps serving until a
//! staleness budget runs out, after which verification fails closed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::DecodingKey;
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

/// Key set error types
#[derive(Debug, thiserror::Error)]
pub enum KeySetError {
    #[error("No key with id '{0}' in the provider key set")]
    KeyNotFound(String),
    #[error("Key set unavailable: {0}")]
    Unavailable(String),
    #[error("Malformed key material for key id '{kid}': {reason}")]
    MalformedKey { kid: String, reason: String },
}

/// A single published RSA public key, JWK-shaped.
#[derive(Debug, Clone, Deserialize)]
pub struct PublicKey {
    pub kid: String,
    pub kty: String,
    #[serde(default)]
    pub alg: Option<String>,
    /// Modulus, base64url
    pub n: String,
    /// Exponent, base64url
    pub e: String,
}

impl PublicKey {
    /// Build a verification key from the published components.
    pub fn decoding_key(&self) -> Result<DecodingKey, KeySetError> {
        DecodingKey::from_rsa_components(&self.n, &self.e).map_err(|e| {
            KeySetError::MalformedKey {
                kid: self.kid.clone(),
                reason: e.to_string(),
            }
        })
    }
}

/// The provider's key set document: `{"keys": [...]}`.
#[derive(Debug, Clone, Deserialize)]
pub struct PublicKeySet {
    pub keys: Vec<PublicKey>,
}

/// Source of the provider key set. Abstracted so the cache logic can be
/// tested against a scripted sequence of responses.
#[async_trait]
pub trait KeySetFetcher: Send + Sync {
    async fn fetch(&self) -> Result<PublicKeySet, KeySetError>;
}

/// Fetches the key set document over HTTP.
pub struct HttpKeySetFetcher {
    url: String,
    client: reqwest::Client,
}

impl HttpKeySetFetcher {
    pub fn new(url: String, timeout: Duration) -> Result<Self, KeySetError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| KeySetError::Unavailable(e.to_string()))?;

        Ok(Self { url, client })
    }
}

#[async_trait]
impl KeySetFetcher for HttpKeySetFetcher {
    async fn fetch(&self) -> Result<PublicKeySet, KeySetError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| KeySetError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(KeySetError::Unavailable(format!(
                "key set endpoint returned {}",
                response.status()
            )));
        }

        response
            .json::<PublicKeySet>()
            .await
            .map_err(|e| KeySetError::Unavailable(e.to_string()))
    }
}

struct CachedKeys {
    by_kid: HashMap<String, PublicKey>,
    fetched_at: Instant,
}

/// Cached view of the provider key set.
///
/// `resolve` is the only entry point the verification path needs: given a
/// token's key id it returns a ready [`DecodingKey`], refreshing the cache
/// when it is past its TTL or when the key id is unknown. Concurrent refresh
/// attempts collapse into a single fetch.
pub struct RemoteKeySet {
    fetcher: Arc<dyn KeySetFetcher>,
    ttl: Duration,
    stale_budget: Duration,
    cache: RwLock<Option<Arc<CachedKeys>>>,
    refresh_guard: Mutex<()>,
}

impl RemoteKeySet {
    pub fn new(fetcher: Arc<dyn KeySetFetcher>, ttl: Duration, stale_budget: Duration) -> Self {
        Self {
            fetcher,
            ttl,
            stale_budget,
            cache: RwLock::new(None),
            refresh_guard: Mutex::new(()),
        }
    }

    /// Resolve a key id to a verification key.
    pub async fn resolve(&self, kid: &str) -> Result<DecodingKey, KeySetError> {
        self.find(kid).await?.decoding_key()
    }

    /// Resolve a key id to its published key material.
    pub async fn find(&self, kid: &str) -> Result<PublicKey, KeySetError> {
        // Fast path: fresh cache that holds the key id.
        let seen = self.cache.read().await.clone();
        if let Some(cached) = &seen {
            if cached.fetched_at.elapsed() <= self.ttl {
                if let Some(key) = cached.by_kid.get(kid) {
                    return Ok(key.clone());
                }
                // Fresh cache without this kid: the provider may have
                // rotated. Fall through and refresh once.
            }
        }

        let refreshed = self.refresh(seen).await?;
        refreshed
            .by_kid
            .get(kid)
            .cloned()
            .ok_or_else(|| KeySetError::KeyNotFound(kid.to_string()))
    }

    /// Single-flight refresh. Losers of the guard reuse whatever the winner
    /// fetched instead of issuing their own request. `seen` is the cache
    /// generation the caller already inspected and found wanting.
    async fn refresh(
        &self,
        seen: Option<Arc<CachedKeys>>,
    ) -> Result<Arc<CachedKeys>, KeySetError> {
        let _guard = self.refresh_guard.lock().await;

        // Another task may have refreshed while we waited for the guard.
        if let Some(cached) = self.cache.read().await.clone() {
            let is_new_generation = !seen
                .as_ref()
                .is_some_and(|s| Arc::ptr_eq(s, &cached));
            if is_new_generation && cached.fetched_at.elapsed() <= self.ttl {
                return Ok(cached);
            }
        }

        match self.fetcher.fetch().await {
            Ok(set) => {
                info!(keys = set.keys.len(), "refreshed provider key set");
                let cached = Arc::new(CachedKeys {
                    by_kid: set.keys.into_iter().map(|k| (k.kid.clone(), k)).collect(),
                    fetched_at: Instant::now(),
                });
                *self.cache.write().await = Some(cached.clone());
                Ok(cached)
            }
            Err(e) => {
                // Fallback: serve the last good set while it is within the
                // staleness budget.
                if let Some(cached) = self.cache.read().await.clone() {
                    if cached.fetched_at.elapsed() <= self.stale_budget {
                        warn!(
                            error = %e,
                            "key set refresh failed, serving cached keys"
                        );
                        return Ok(cached);
                    }
                }
                Err(e)
            }
        }
    }
}

//! Verification key resolution.
//!
//! Two modes:
//! - **Shared secret**: the client secret is the HMAC key for every token.
//! - **Remote**: keys come from the provider's certificates endpoint, either a
//!   JWKS document or a legacy `{kid: PEM}` map.
//!
//! Remote key sets are cached as immutable snapshots in a `moka` cache keyed by
//! a generation number. A refresh advances the generation, so readers of the
//! old snapshot are never disturbed and concurrent misses share one fetch.

use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use jsonwebtoken::{Algorithm, DecodingKey};
use moka::future::Cache;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::client::HttpClient;
use crate::error::KeyError;

/// One verification key.
#[derive(Clone)]
pub struct SigningKey {
    kid: Option<String>,
    algorithm: Option<Algorithm>,
    key: DecodingKey,
}

impl SigningKey {
    /// HMAC key derived from the client secret.
    #[must_use]
    pub fn shared_secret(secret: &[u8]) -> Self {
        Self { kid: None, algorithm: None, key: DecodingKey::from_secret(secret) }
    }

    /// Key identifier.
    #[must_use]
    pub fn kid(&self) -> Option<&str> {
        self.kid.as_deref()
    }

    /// Algorithm the key is pinned to, when the key document names one.
    #[must_use]
    pub const fn algorithm(&self) -> Option<Algorithm> {
        self.algorithm
    }

    /// Key material for `jsonwebtoken`.
    #[must_use]
    pub const fn decoding_key(&self) -> &DecodingKey {
        &self.key
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// A JWK entry from a JWKS document.
#[derive(Debug, Deserialize)]
struct JwkEntry {
    kid: Option<String>,
    kty: String,
    #[serde(default, rename = "use")]
    use_: Option<String>,
    #[serde(default)]
    alg: Option<String>,
    // RSA
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
    // EC
    #[serde(default)]
    crv: Option<String>,
    #[serde(default)]
    x: Option<String>,
    #[serde(default)]
    y: Option<String>,
}

impl JwkEntry {
    fn into_signing_key(self) -> Result<SigningKey, String> {
        if self.use_.as_deref().is_some_and(|u| u != "sig") {
            return Err(format!("key use {:?} is not signing", self.use_));
        }

        let algorithm = match self.alg.as_deref() {
            Some(alg) => Some(Algorithm::from_str(alg).map_err(|_| format!("unknown algorithm {alg}"))?),
            None => None,
        };

        let key = match self.kty.as_str() {
            "RSA" => {
                let (Some(n), Some(e)) = (self.n.as_deref(), self.e.as_deref()) else {
                    return Err("RSA key without n/e".to_string());
                };
                DecodingKey::from_rsa_components(n, e).map_err(|e| e.to_string())?
            }
            "EC" => {
                if !matches!(self.crv.as_deref(), Some("P-256" | "P-384")) {
                    return Err(format!("unsupported curve {:?}", self.crv));
                }
                let (Some(x), Some(y)) = (self.x.as_deref(), self.y.as_deref()) else {
                    return Err("EC key without x/y".to_string());
                };
                DecodingKey::from_ec_components(x, y).map_err(|e| e.to_string())?
            }
            other => return Err(format!("unsupported key type {other}")),
        };

        Ok(SigningKey { kid: self.kid, algorithm, key })
    }
}

fn pem_key(pem: &str) -> Result<DecodingKey, String> {
    DecodingKey::from_rsa_pem(pem.as_bytes())
        .or_else(|_| DecodingKey::from_ec_pem(pem.as_bytes()))
        .map_err(|e| e.to_string())
}

/// Immutable set of verification keys from one fetch.
#[derive(Debug, Clone, Default)]
pub struct SigningKeySet {
    keys: Vec<SigningKey>,
}

impl SigningKeySet {
    /// Parse a key document.
    ///
    /// Accepts `{"keys": [...]}` (JWKS) or `{"<kid>": "<PEM public key>", ...}`.
    /// Entries that cannot be used are skipped.
    ///
    /// # Errors
    ///
    /// Returns error if the body is not one of those shapes or holds no usable key.
    pub fn from_document(body: &str) -> Result<Self, KeyError> {
        let document: Value = serde_json::from_str(body).map_err(|e| KeyError::malformed(e.to_string()))?;
        let Value::Object(document) = document else {
            return Err(KeyError::malformed("key document is not a JSON object"));
        };

        let mut keys = Vec::new();
        match document.get("keys") {
            Some(Value::Array(entries)) => {
                for entry in entries {
                    let parsed = serde_json::from_value::<JwkEntry>(entry.clone())
                        .map_err(|e| e.to_string())
                        .and_then(JwkEntry::into_signing_key);
                    match parsed {
                        Ok(key) => keys.push(key),
                        Err(reason) => tracing::warn!(%reason, "Skipping unusable JWK entry"),
                    }
                }
            }
            Some(_) => return Err(KeyError::malformed("\"keys\" is not an array")),
            None => {
                for (kid, pem) in &document {
                    let Some(pem) = pem.as_str() else {
                        tracing::warn!(%kid, "Skipping non-string key entry");
                        continue;
                    };
                    match pem_key(pem) {
                        Ok(key) => keys.push(SigningKey { kid: Some(kid.clone()), algorithm: None, key }),
                        Err(reason) => tracing::warn!(%kid, %reason, "Skipping unusable PEM key"),
                    }
                }
            }
        }

        if keys.is_empty() {
            return Err(KeyError::malformed("no usable verification key"));
        }
        Ok(Self { keys })
    }

    /// Find the key for a token.
    ///
    /// A token without `kid` only matches a set holding exactly one key.
    #[must_use]
    pub fn get(&self, kid: Option<&str>) -> Option<&SigningKey> {
        match kid {
            Some(kid) => self.keys.iter().find(|k| k.kid() == Some(kid)),
            None if self.keys.len() == 1 => self.keys.first(),
            None => None,
        }
    }

    /// Key identifiers in document order.
    #[must_use]
    pub fn key_ids(&self) -> Vec<String> {
        self.keys.iter().filter_map(|k| k.kid.clone()).collect()
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Check if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Fetches and caches the provider's key document.
pub struct JwksResolver {
    http: HttpClient,
    endpoint: Url,
    cache: Cache<u64, Arc<SigningKeySet>>,
    generation: AtomicU64,
    refresh_limiter: Option<DefaultDirectRateLimiter>,
}

impl JwksResolver {
    /// Create a resolver. A zero `refresh_cooldown` disables refresh throttling.
    #[must_use]
    pub fn new(http: HttpClient, endpoint: Url, refresh_cooldown: Duration) -> Self {
        Self {
            http,
            endpoint,
            cache: Cache::builder().max_capacity(8).build(),
            generation: AtomicU64::new(0),
            refresh_limiter: Quota::with_period(refresh_cooldown).map(RateLimiter::direct),
        }
    }

    /// Resolve the key for `kid`, fetching the key set on first use and once
    /// more when `kid` is unknown to a previously fetched set.
    ///
    /// # Errors
    ///
    /// Returns error if the fetch fails or no key matches.
    pub async fn resolve(&self, kid: Option<&str>) -> Result<SigningKey, KeyError> {
        let generation = self.generation.load(Ordering::Acquire);
        let (set, fetched_now) = self.snapshot(generation).await?;
        if let Some(key) = set.get(kid) {
            return Ok(key.clone());
        }
        if fetched_now {
            return Err(KeyError::not_found(kid));
        }

        // Callers that saw the same stale snapshot share one refresh generation
        let next = generation + 1;
        match self.generation.compare_exchange(generation, next, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => self.retire(generation).await,
            Err(actual) if actual != next => {
                let (set, _) = self.snapshot(actual).await?;
                return set.get(kid).cloned().ok_or_else(|| KeyError::not_found(kid));
            }
            Err(_) => {}
        }

        let set = self.refresh(next, kid, set).await?;
        set.get(kid).cloned().ok_or_else(|| KeyError::not_found(kid))
    }

    /// Snapshot for a refresh generation.
    ///
    /// The limiter is consulted once per generation, inside the shared fetch.
    /// When throttled, `current` is installed unchanged.
    async fn refresh(
        &self,
        generation: u64,
        kid: Option<&str>,
        current: Arc<SigningKeySet>,
    ) -> Result<Arc<SigningKeySet>, KeyError> {
        let init = async {
            if self.refresh_limiter.as_ref().is_some_and(|l| l.check().is_err()) {
                tracing::debug!(?kid, "Key refresh throttled");
                return Ok(current);
            }
            tracing::info!(?kid, generation, "Unknown key id, refreshing key set");
            self.fetch().await
        };
        self.cache.try_get_with(generation, init).await.map_err(|e| (*e).clone())
    }

    /// Drop the snapshot preceding `replaced`.
    ///
    /// `replaced` itself stays cached for callers that loaded its generation
    /// before the advance.
    async fn retire(&self, replaced: u64) {
        if let Some(stale) = replaced.checked_sub(1) {
            self.cache.invalidate(&stale).await;
        }
    }

    /// Drop the cached key set; the next lookup fetches again.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.cache.invalidate_all();
    }

    /// Key identifiers of the current snapshot, if one is cached.
    pub async fn cached_key_ids(&self) -> Option<Vec<String>> {
        let generation = self.generation.load(Ordering::Acquire);
        self.cache.get(&generation).await.map(|set| set.key_ids())
    }

    /// Snapshot for `generation`, and whether this call had to wait for a fetch.
    ///
    /// Concurrent misses on the same generation share a single fetch. A failed
    /// fetch is not cached.
    async fn snapshot(&self, generation: u64) -> Result<(Arc<SigningKeySet>, bool), KeyError> {
        if let Some(set) = self.cache.get(&generation).await {
            return Ok((set, false));
        }
        let set = self
            .cache
            .try_get_with(generation, self.fetch())
            .await
            .map_err(|e| (*e).clone())?;
        Ok((set, true))
    }

    async fn fetch(&self) -> Result<Arc<SigningKeySet>, KeyError> {
        let response = self.http.get(&self.endpoint, None).await?;
        if !response.is_ok() {
            tracing::warn!(status = response.status, "Key endpoint returned an error");
            return Err(KeyError::Status { status: response.status });
        }

        let set = SigningKeySet::from_document(&response.body)?;
        tracing::info!(keys = set.len(), "Fetched verification keys");
        Ok(Arc::new(set))
    }
}

impl std::fmt::Debug for JwksResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwksResolver")
            .field("endpoint", &self.endpoint.as_str())
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Source of verification keys for the token verifier.
#[derive(Debug, Clone)]
pub enum KeyResolver {
    /// HMAC key from the client secret.
    Shared(SigningKey),
    /// Keys fetched from the certificates endpoint.
    Remote(Arc<JwksResolver>),
}

impl KeyResolver {
    /// Shared-secret mode.
    #[must_use]
    pub fn shared_secret(secret: &str) -> Self {
        Self::Shared(SigningKey::shared_secret(secret.as_bytes()))
    }

    /// Remote mode.
    #[must_use]
    pub fn remote(http: HttpClient, endpoint: Url, refresh_cooldown: Duration) -> Self {
        Self::Remote(Arc::new(JwksResolver::new(http, endpoint, refresh_cooldown)))
    }

    /// Resolve the key for a token's `kid`. The shared secret ignores `kid`.
    ///
    /// # Errors
    ///
    /// Returns error if the remote key set cannot be fetched or has no match.
    pub async fn resolve(&self, kid: Option<&str>) -> Result<SigningKey, KeyError> {
        match self {
            Self::Shared(key) => Ok(key.clone()),
            Self::Remote(jwks) => jwks.resolve(kid).await,
        }
    }

    /// Drop cached remote keys. No effect in shared-secret mode.
    pub fn invalidate(&self) {
        if let Self::Remote(jwks) = self {
            jwks.invalidate();
        }
    }

    /// Key identifiers currently cached.
    pub async fn cached_key_ids(&self) -> Option<Vec<String>> {
        match self {
            Self::Shared(_) => None,
            Self::Remote(jwks) => jwks.cached_key_ids().await,
        }
    }
}

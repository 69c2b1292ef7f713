//! Retrieval of a provider's published signing keys (a JWKS document) and
//! selection of the key matching a token's `kid`.
//!
//! [`HttpKeyResolver`] fetches the key set on every call. [`CachedKeyResolver`]
//! wraps any resolver with a time-bounded cache per endpoint; a cached set is
//! only used while it is fresh and still publishes the requested `kid`.

use crate::errors::{KeyFetchError, OIDCError, TokenValidationError};
use encoding_rs::{Encoding, UTF_8};
use jsonwebtoken::DecodingKey;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use serde_derive::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Bound on a single key set request.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// One entry of the `keys` array, kept as the provider sent it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct KeyRecord(Map<String, Value>);

impl KeyRecord {
    pub fn kid(&self) -> Option<&str> {
        self.field("kid")
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    /// Builds an RSA verification key from the record's `n`/`e` components.
    pub fn decoding_key(&self) -> Result<DecodingKey, TokenValidationError> {
        match self.field("kty") {
            Some("RSA") | None => {}
            Some(other) => {
                return Err(TokenValidationError::InvalidKey(format!(
                    "key type {other} cannot verify RS256"
                )));
            }
        }
        let n = self
            .field("n")
            .ok_or_else(|| TokenValidationError::InvalidKey("missing 'n' in RSA JWK".into()))?;
        let e = self
            .field("e")
            .ok_or_else(|| TokenValidationError::InvalidKey("missing 'e' in RSA JWK".into()))?;
        Ok(DecodingKey::from_rsa_components(n, e)?)
    }
}

impl From<Map<String, Value>> for KeyRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// A JWKS-style document: `{"keys": [...]}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KeySet {
    pub keys: Vec<KeyRecord>,
}

impl KeySet {
    pub fn parse(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// First record whose `kid` equals `kid` exactly.
    pub fn find(&self, kid: &str) -> Option<&KeyRecord> {
        self.keys.iter().find(|key| key.kid() == Some(kid))
    }
}

/// Extracts the `charset` parameter of a `Content-Type` value. This is the
/// only place the key set body's encoding is determined, see [`decode_body`].
pub fn charset_from_content_type(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("charset") {
            return None;
        }
        let value = value.trim().trim_matches('"');
        if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        }
    })
}

/// Source of provider key sets.
#[rocket::async_trait]
pub trait KeyResolver: Send + Sync {
    /// Fetches the complete key set published at `endpoint`.
    async fn fetch_key_set(&self, endpoint: &str) -> Result<KeySet, OIDCError>;

    /// Returns the key whose `kid` matches, or `None` when the provider does
    /// not publish it. `None` is not an error here; the caller decides.
    async fn resolve_key(&self, endpoint: &str, kid: &str) -> Result<Option<KeyRecord>, OIDCError> {
        Ok(self.fetch_key_set(endpoint).await?.find(kid).cloned())
    }
}

/// Fetches the key set over HTTP on every call.
#[derive(Debug, Clone)]
pub struct HttpKeyResolver {
    client: reqwest::Client,
}

impl HttpKeyResolver {
    pub fn new() -> Result<Self, OIDCError> {
        Self::with_timeout(DEFAULT_FETCH_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, OIDCError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("auth-oidc"));

        let client = reqwest::ClientBuilder::new()
            // Following redirects opens the client up to SSRF vulnerabilities.
            .redirect(reqwest::redirect::Policy::none())
            .timeout(timeout)
            .default_headers(headers)
            .build()?;
        Ok(Self { client })
    }

    /// Uses an already configured client as is.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn fetch(&self, endpoint: &str) -> Result<KeySet, KeyFetchError> {
        let response = self.client.get(endpoint).send().await?;
        // redirects are not followed, so 3xx must be refused here as well
        let status = response.status();
        if !status.is_success() {
            return Err(KeyFetchError::Status(status));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response.bytes().await?;

        let text = decode_body(&body, &content_type)?;
        Ok(KeySet::parse(&text)?)
    }
}

/// Decodes a response body with the charset named in `content_type`.
///
/// UTF-8 is used when the parameter is absent or names no known encoding.
/// Byte sequences invalid in the chosen encoding are an error, never replaced.
pub fn decode_body(body: &[u8], content_type: &str) -> Result<String, KeyFetchError> {
    let encoding = match charset_from_content_type(content_type) {
        Some(label) => Encoding::for_label(label.as_bytes()).unwrap_or_else(|| {
            tracing::debug!(charset = %label, "unknown charset in response content type, assuming utf-8");
            UTF_8
        }),
        None => {
            tracing::debug!(content_type, "no charset in response content type, assuming utf-8");
            UTF_8
        }
    };

    encoding
        .decode_without_bom_handling_and_without_replacement(body)
        .map(|text| text.into_owned())
        .ok_or(KeyFetchError::Decode(encoding.name()))
}

#[rocket::async_trait]
impl KeyResolver for HttpKeyResolver {
    async fn fetch_key_set(&self, endpoint: &str) -> Result<KeySet, OIDCError> {
        self.fetch(endpoint).await.map_err(|err| {
            tracing::error!(endpoint, error = %err, "error getting signing keys");
            OIDCError::key_fetch(endpoint, err)
        })
    }
}

#[derive(Debug)]
struct CachedKeySet {
    fetched_at: Instant,
    keys: Arc<KeySet>,
}

/// Caches key sets per endpoint for at most `ttl`.
///
/// A lookup is answered from the cache only when the entry is younger than
/// `ttl` and contains the requested `kid`; otherwise the set is fetched again
/// through the wrapped resolver and the entry replaced.
#[derive(Debug, Clone)]
pub struct CachedKeyResolver<R: KeyResolver> {
    inner: R,
    ttl: Duration,
    sets: Arc<RwLock<HashMap<String, CachedKeySet>>>,
}

impl<R: KeyResolver> CachedKeyResolver<R> {
    pub fn new(inner: R, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            sets: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Drops every cached set.
    pub async fn clear(&self) {
        self.sets.write().await.clear();
    }

    async fn cached(&self, endpoint: &str) -> Option<Arc<KeySet>> {
        let sets = self.sets.read().await;
        let entry = sets.get(endpoint)?;
        if entry.fetched_at.elapsed() < self.ttl {
            Some(entry.keys.clone())
        } else {
            None
        }
    }
}

#[rocket::async_trait]
impl<R: KeyResolver> KeyResolver for CachedKeyResolver<R> {
    async fn fetch_key_set(&self, endpoint: &str) -> Result<KeySet, OIDCError> {
        let keys = self.inner.fetch_key_set(endpoint).await?;
        self.sets.write().await.insert(
            endpoint.to_string(),
            CachedKeySet {
                fetched_at: Instant::now(),
                keys: Arc::new(keys.clone()),
            },
        );
        Ok(keys)
    }

    async fn resolve_key(&self, endpoint: &str, kid: &str) -> Result<Option<KeyRecord>, OIDCError> {
        if let Some(keys) = self.cached(endpoint).await {
            if let Some(key) = keys.find(kid) {
                tracing::debug!(endpoint, kid, "signing key served from cache");
                return Ok(Some(key.clone()));
            }
        }

        tracing::debug!(endpoint, kid, "refreshing cached signing keys");
        Ok(self.fetch_key_set(endpoint).await?.find(kid).cloned())
    }
}

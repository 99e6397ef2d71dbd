//! Process-wide cache of remote JSON Web Key Sets
//!
//! Key sets are fetched lazily from `{issuer}/.well-known/jwks.json` the first
//! time a key for that issuer is requested and are then kept for the life of
//! the cache. Nothing is refreshed in the background: a rotated key becomes
//! visible only after [`JwkCache::clear`] or a restart.
//!
//! Two tasks missing the same issuer at the same time may both fetch. Both
//! write the same immutable set, so the last write wins without harm.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use super::jwks::{JwkCollection, JwkRecord};
use crate::constants::{DEFAULT_JWKS_TIMEOUT_SECS, JWKS_WELL_KNOWN_PATH};
use crate::metrics::AuthMetrics;

/// Error type for JWK cache operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JwkCacheError {
    /// Failed to fetch the key set
    Fetch(String),
    /// The key set response was not valid JWKS JSON
    Parse(String),
    /// The key set has no key with this kid
    KeyNotFound(String),
}

impl std::fmt::Display for JwkCacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwkCacheError::Fetch(msg) => write!(f, "Failed to fetch JWKS: {}", msg),
            JwkCacheError::Parse(msg) => write!(f, "Failed to parse JWKS: {}", msg),
            JwkCacheError::KeyNotFound(kid) => write!(f, "Key '{}' not found in JWKS", kid),
        }
    }
}

impl std::error::Error for JwkCacheError {}

/// JWK cache configuration
#[derive(Debug, Clone)]
pub struct JwkCacheConfig {
    /// HTTP request timeout (in seconds)
    pub timeout_secs: u64,
}

impl Default for JwkCacheConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_JWKS_TIMEOUT_SECS,
        }
    }
}

/// Cache of key sets keyed by issuer base URL
pub struct JwkCache {
    http: reqwest::Client,
    sets: RwLock<HashMap<String, Arc<JwkCollection>>>,
}

/// Thread-safe shared JWK cache
pub type SharedJwkCache = Arc<JwkCache>;

impl Default for JwkCache {
    fn default() -> Self {
        Self::new(JwkCacheConfig::default())
    }
}

impl std::fmt::Debug for JwkCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwkCache")
            .field("issuers", &self.cached_issuers())
            .finish()
    }
}

impl JwkCache {
    pub fn new(config: JwkCacheConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http,
            sets: RwLock::new(HashMap::new()),
        }
    }

    /// URL of the key set published below `issuer_base_url`
    pub fn jwks_url(issuer_base_url: &str) -> String {
        format!(
            "{}/{}",
            issuer_base_url.trim_end_matches('/'),
            JWKS_WELL_KNOWN_PATH
        )
    }

    /// Look up a key by issuer and kid, fetching the issuer's set on a miss.
    pub async fn get_key(
        &self,
        issuer_base_url: &str,
        key_id: &str,
    ) -> Result<JwkRecord, JwkCacheError> {
        let jwks = self.get_collection(issuer_base_url).await?;
        jwks.find_key_by_kid(key_id)
            .cloned()
            .ok_or_else(|| JwkCacheError::KeyNotFound(key_id.to_string()))
    }

    /// Get the issuer's key set, fetching it if it is not cached yet
    pub async fn get_collection(
        &self,
        issuer_base_url: &str,
    ) -> Result<Arc<JwkCollection>, JwkCacheError> {
        if let Some(jwks) = self.cached_collection(issuer_base_url) {
            return Ok(jwks);
        }

        let url = Self::jwks_url(issuer_base_url);
        tracing::debug!(url = %url, "Fetching JWKS");

        let result = self.fetch(&url).await;
        AuthMetrics::global().record_jwks_fetch(result.is_ok());
        let jwks = Arc::new(result?);

        self.sets
            .write()
            .insert(issuer_base_url.to_string(), Arc::clone(&jwks));

        tracing::info!(
            issuer = %issuer_base_url,
            keys = jwks.keys.len(),
            "JWKS fetched and cached"
        );

        Ok(jwks)
    }

    /// Get the cached key set for an issuer, if any
    pub fn cached_collection(&self, issuer_base_url: &str) -> Option<Arc<JwkCollection>> {
        self.sets.read().get(issuer_base_url).cloned()
    }

    /// Seed the cache with a known key set
    pub fn insert(&self, issuer_base_url: &str, jwks: JwkCollection) {
        self.sets
            .write()
            .insert(issuer_base_url.to_string(), Arc::new(jwks));
    }

    /// Issuers that currently have a cached key set
    pub fn cached_issuers(&self) -> Vec<String> {
        let mut issuers: Vec<String> = self.sets.read().keys().cloned().collect();
        issuers.sort();
        issuers
    }

    /// Drop every cached key set
    pub fn clear(&self) {
        self.sets.write().clear();
    }

    async fn fetch(&self, url: &str) -> Result<JwkCollection, JwkCacheError> {
        let response = self
            .http
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    JwkCacheError::Fetch("Request timed out".to_string())
                } else if e.is_connect() {
                    JwkCacheError::Fetch(format!("Connection failed: {}", e))
                } else {
                    JwkCacheError::Fetch(format!("Request failed: {}", e))
                }
            })?;

        if !response.status().is_success() {
            return Err(JwkCacheError::Fetch(format!(
                "HTTP {} response",
                response.status()
            )));
        }

        response
            .json::<JwkCollection>()
            .await
            .map_err(|e| JwkCacheError::Parse(format!("Invalid JSON: {}", e)))
    }
}

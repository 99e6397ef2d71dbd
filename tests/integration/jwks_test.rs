// JWKS retrieval and caching against a mock identity provider

use std::sync::Arc;

use authgate::auth::{JwkCache, JwkCacheConfig, JwkCacheError};
use authgate::metrics::AuthMetrics;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::test_harness::{auth0_domain, jwks_server, TestKey};

#[tokio::test]
async fn test_key_set_is_fetched_once_per_issuer() {
    let key = TestKey::new("key-1");
    let server = jwks_server(&[&key], 1).await;
    let cache = Arc::new(JwkCache::new(JwkCacheConfig::default()));
    let issuer = auth0_domain(&server);

    let first = cache.get_key(&issuer, "key-1").await.unwrap();
    assert_eq!(first.kid(), Some("key-1"));
    let first_json = serde_json::to_vec(&first).unwrap();
    for _ in 0..2 {
        let record = cache.get_key(&issuer, "key-1").await.unwrap();
        assert_eq!(record, first);
        assert_eq!(serde_json::to_vec(&record).unwrap(), first_json);
    }
    assert_eq!(cache.cached_issuers(), vec![issuer]);
}

#[tokio::test]
async fn test_unknown_kid_does_not_refetch() {
    let key = TestKey::new("key-1");
    let server = jwks_server(&[&key], 1).await;
    let cache = JwkCache::default();
    let issuer = auth0_domain(&server);

    assert!(cache.get_key(&issuer, "key-1").await.is_ok());
    assert!(matches!(
        cache.get_key(&issuer, "other").await,
        Err(JwkCacheError::KeyNotFound(kid)) if kid == "other"
    ));
}

#[tokio::test]
async fn test_concurrent_lookups_share_one_key_set() {
    let key = TestKey::new("key-1");
    let server = jwks_server(&[&key], 1..=4).await;
    let cache = Arc::new(JwkCache::default());
    let issuer = auth0_domain(&server);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let issuer = issuer.clone();
            tokio::spawn(async move { cache.get_key(&issuer, "key-1").await })
        })
        .collect();
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }

    // Later lookups are served from the cache.
    assert!(cache.get_key(&issuer, "key-1").await.is_ok());
    assert_eq!(cache.cached_issuers().len(), 1);
}

#[tokio::test]
async fn test_server_error_is_not_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/jwks.json"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;
    let cache = JwkCache::default();
    let issuer = auth0_domain(&server);
    let failures_before = AuthMetrics::global().jwks_fetch_count(false);

    assert!(matches!(
        cache.get_key(&issuer, "key-1").await,
        Err(JwkCacheError::Fetch(_))
    ));
    assert!(cache.get_key(&issuer, "key-1").await.is_err());
    assert!(cache.cached_issuers().is_empty());
    assert!(AuthMetrics::global().jwks_fetch_count(false) >= failures_before + 2);
}

#[tokio::test]
async fn test_invalid_json_is_a_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/jwks.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;
    let cache = JwkCache::default();

    assert!(matches!(
        cache.get_key(&auth0_domain(&server), "key-1").await,
        Err(JwkCacheError::Parse(_))
    ));
}

#[tokio::test]
async fn test_clear_forces_refetch() {
    let key = TestKey::new("key-1");
    let server = jwks_server(&[&key], 2).await;
    let cache = JwkCache::default();
    let issuer = auth0_domain(&server);

    assert!(cache.get_key(&issuer, "key-1").await.is_ok());
    cache.clear();
    assert!(cache.cached_issuers().is_empty());
    assert!(cache.get_key(&issuer, "key-1").await.is_ok());
}

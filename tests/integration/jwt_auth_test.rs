// JWT Authentication End-to-End Integration Tests
//
// Tokens are verified through the gate against the internal shared-secret
// domain and a mock identity provider publishing an ES256 key set.

use authgate::auth::{JwtError, JwtParser, ParserConfig, VerificationFailure};
use authgate::{AuthError, ProtectionGate};
use serde_json::json;

use super::test_harness::{
    auth0_claims, auth0_domain, auth0_settings, capture_logs, hs_token, internal_claims,
    jwks_server, now, settings, TestKey, AUTH0_AUDIENCE, HS_KEY, PROXY_URL,
};

#[tokio::test]
async fn test_internal_token_is_verified_and_normalized() {
    let gate = ProtectionGate::from_settings(settings(&[])).unwrap();
    let token = hs_token(&internal_claims("read:x write:x"), HS_KEY);

    let data = gate.verify_token(&token).await.unwrap();
    assert_eq!(data.scopes(), ["read:x", "write:x"]);
    assert_eq!(data.issuer(), Some(PROXY_URL));
    // Metadata is flattened into the claims, the raw payload keeps it.
    assert_eq!(data.claim("clinician_id"), Some(&json!("4321")));
    assert!(data.claim("metadata").is_none());
    assert_eq!(data.raw()["metadata"]["clinician_id"], "4321");
}

#[tokio::test]
async fn test_internal_token_with_wrong_key_is_rejected() {
    let gate = ProtectionGate::from_settings(settings(&[])).unwrap();
    let token = hs_token(&internal_claims("read:x"), "whoops");

    let err = gate.verify_token(&token).await.unwrap_err();
    assert!(matches!(err, AuthError::TokenInvalid(_)));
}

#[tokio::test]
async fn test_expired_token_is_rejected() {
    let gate = ProtectionGate::from_settings(settings(&[])).unwrap();
    let mut claims = internal_claims("read:x");
    claims["exp"] = json!(now() - 60);

    let err = gate.verify_token(&hs_token(&claims, HS_KEY)).await.unwrap_err();
    assert_eq!(err, AuthError::TokenExpired);
}

#[tokio::test]
async fn test_not_yet_valid_token_is_rejected() {
    let gate = ProtectionGate::from_settings(settings(&[])).unwrap();
    let mut claims = internal_claims("read:x");
    claims["nbf"] = json!(now() + 3600);

    let err = gate.verify_token(&hs_token(&claims, HS_KEY)).await.unwrap_err();
    assert!(matches!(err, AuthError::TokenInvalid(_)));
}

#[tokio::test]
async fn test_non_string_scope_is_rejected() {
    let gate = ProtectionGate::from_settings(settings(&[])).unwrap();
    let mut claims = internal_claims("read:x");
    claims["scope"] = json!(["read:x"]);

    let err = gate.verify_token(&hs_token(&claims, HS_KEY)).await.unwrap_err();
    assert_eq!(err, AuthError::ScopeEncodingInvalid);
}

#[tokio::test]
async fn test_garbage_token_is_invalid() {
    let gate = ProtectionGate::from_settings(settings(&[])).unwrap();
    for token in ["", "abc", "a.b", "a.b.c.d", "!!!.???.***"] {
        assert!(
            matches!(gate.verify_token(token).await, Err(AuthError::TokenInvalid(_))),
            "Expected invalid token for {:?}",
            token
        );
    }
}

#[tokio::test]
async fn test_auth0_token_verified_with_published_key() {
    let key = TestKey::new("key-1");
    let server = jwks_server(&[&key], 1).await;
    let gate = ProtectionGate::from_settings(auth0_settings(&server, &[])).unwrap();

    // Second verification is served from the cached key set.
    for _ in 0..2 {
        let token = key.sign(&auth0_claims(&server, "read:x"));
        let data = gate.verify_token(&token).await.unwrap();
        assert_eq!(data.subject(), Some("auth0|abc"));
        assert_eq!(data.scopes(), ["read:x"]);
    }
}

#[tokio::test]
async fn test_auth0_token_with_wrong_audience_is_rejected() {
    let key = TestKey::new("key-1");
    let server = jwks_server(&[&key], 1).await;
    let gate = ProtectionGate::from_settings(auth0_settings(&server, &[])).unwrap();

    let mut claims = auth0_claims(&server, "read:x");
    claims["aud"] = json!("https://someone-else.example.com");

    let err = gate.verify_token(&key.sign(&claims)).await.unwrap_err();
    assert!(matches!(err, AuthError::TokenInvalid(_)));
}

#[tokio::test]
async fn test_auth0_token_signed_by_unpublished_key_is_rejected() {
    let published = TestKey::new("key-1");
    let server = jwks_server(&[&published], 1).await;
    let gate = ProtectionGate::from_settings(auth0_settings(&server, &[])).unwrap();

    // Same kid, different private key.
    let impostor = TestKey::new("key-1");
    let err = gate
        .verify_token(&impostor.sign(&auth0_claims(&server, "read:x")))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::TokenInvalid(_)));
}

#[tokio::test]
async fn test_missing_jwk_is_logged() {
    let key = TestKey::new("key-1");
    let server = jwks_server(&[&key], 1).await;
    let gate = ProtectionGate::from_settings(auth0_settings(&server, &[])).unwrap();

    let token = key.sign_with_header(
        json!({"alg": "ES256", "kid": "12345"}),
        &auth0_claims(&server, "read:x"),
    );
    let (result, logs) = capture_logs(gate.verify_token(&token)).await;

    assert!(matches!(result, Err(AuthError::KeyResolution(_))));
    assert!(logs.text().contains("Could not retrieve JWT key from header"));
}

#[tokio::test]
async fn test_missing_kid_is_logged() {
    let key = TestKey::new("key-1");
    let server = jwks_server(&[&key], 0).await;
    let gate = ProtectionGate::from_settings(auth0_settings(&server, &[])).unwrap();

    let token = key.sign_with_header(json!({"alg": "ES256"}), &auth0_claims(&server, "read:x"));
    let (result, logs) = capture_logs(gate.verify_token(&token)).await;

    assert!(matches!(result, Err(AuthError::KeyResolution(_))));
    assert!(logs.text().contains("JWT provided with no kid field in header"));
}

#[tokio::test]
async fn test_login_token_skips_audience_and_issuer_checks() {
    let key = TestKey::new("key-1");
    let server = jwks_server(&[&key], 0).await;
    let settings = auth0_settings(&server, &[("AUTH0_HS_KEY", "login-secret")]);
    let gate = ProtectionGate::from_settings(settings).unwrap();

    let claims = json!({
        "sub": "auth0|abc",
        "iss": auth0_domain(&server),
        "aud": "https://not-the-api.example.com",
        "exp": now() + 3600,
        "scope": "login",
    });
    let data = gate.verify_token(&hs_token(&claims, "login-secret")).await.unwrap();
    assert_eq!(data.scopes(), ["login"]);

    let err = gate
        .verify_token(&hs_token(&claims, "wrong-secret"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::TokenInvalid(_)));
}

#[tokio::test]
async fn test_hmac_token_for_identity_provider_without_login_domain_is_rejected() {
    let key = TestKey::new("key-1");
    let server = jwks_server(&[&key], 0).await;
    let gate = ProtectionGate::from_settings(auth0_settings(&server, &[])).unwrap();

    let token = hs_token(&auth0_claims(&server, "read:x"), HS_KEY);
    let err = gate.verify_token(&token).await.unwrap_err();
    assert!(matches!(err, AuthError::TokenInvalid(_)));
}

#[tokio::test]
async fn test_standard_parser_decodes_directly() {
    let key = TestKey::new("key-1");
    let server = jwks_server(&[&key], 1).await;
    let gate = ProtectionGate::from_settings(auth0_settings(&server, &[])).unwrap();
    let parser = gate.registry().get("auth0").unwrap();

    assert_eq!(
        parser.to_string(),
        format!("Auth0 standard JwtParser with domain {}", auth0_domain(&server))
    );

    let token = key.sign(&auth0_claims(&server, "read:x"));
    let header = authgate::auth::unverified_header(&token).unwrap();
    let data = parser.decode_jwt(&token, &header).await.unwrap();
    assert_eq!(data.claim("aud"), Some(&json!(AUTH0_AUDIENCE)));
}

#[tokio::test]
async fn test_base_parser_is_not_implemented() {
    let parser = JwtParser::base(ParserConfig::new(PROXY_URL, PROXY_URL, vec![]));
    let err = parser
        .decode_jwt("token", &serde_json::Map::new())
        .await
        .unwrap_err();
    assert_eq!(err, JwtError::NotImplemented);
}

#[tokio::test]
async fn test_expired_auth0_token_maps_to_expired() {
    let key = TestKey::new("key-1");
    let server = jwks_server(&[&key], 1).await;
    let gate = ProtectionGate::from_settings(auth0_settings(&server, &[])).unwrap();
    let parser = gate.registry().get("auth0").unwrap();

    let mut claims = auth0_claims(&server, "read:x");
    claims["exp"] = json!(now() - 60);
    let token = key.sign(&claims);
    let header = authgate::auth::unverified_header(&token).unwrap();

    assert_eq!(
        parser.decode_jwt(&token, &header).await.unwrap_err(),
        JwtError::Verification(VerificationFailure::Expired)
    );
}

// Protected route integration tests
//
// Routes are built the way a service would build them at startup; each
// request goes through ProtectedRoute::authorize with its captured logs
// inspected afterwards.

use authgate::authorization::{
    and_, field_in_body_matches_jwt_claim, field_in_path_matches_jwt_claim, key_present,
    non_production_only_route, scopes_present,
};
use authgate::config::Settings;
use authgate::metrics::AuthMetrics;
use authgate::pipeline::RequestContext;
use authgate::{AuthError, ProtectedRoute, ProtectionGate};
use http::StatusCode;
use rstest::rstest;
use serde_json::json;

use super::test_harness::{
    capture_logs, hs_token, internal_claims, settings, HS_KEY, PROXY_URL,
};

#[derive(Debug, Clone, Copy)]
enum Endpoint {
    /// Built in a development environment, validation may be switched off
    SecuredDevelopment,
    /// Built in production, validation always on
    SecuredProduction,
    /// Default policy built from declared scopes
    Scoped,
}

fn route(endpoint: Endpoint, ignore_validation: bool) -> ProtectedRoute {
    let gate = ProtectionGate::from_settings(settings(&[
        ("ENVIRONMENT", "DEVELOPMENT"),
        (
            "IGNORE_JWT_VALIDATION",
            if ignore_validation { "true" } else { "false" },
        ),
    ]))
    .unwrap();

    match endpoint {
        Endpoint::SecuredDevelopment => gate.protect_as(scopes_present("hello:world"), false),
        Endpoint::SecuredProduction => gate.protect_as(scopes_present("hello:world"), true),
        Endpoint::Scoped => gate.protect_as(scopes_present(["hello:world"]), true),
    }
}

#[rstest]
#[case::dev_ignored_missing_scope(Endpoint::SecuredDevelopment, true, "foo:bar", StatusCode::OK)]
#[case::dev_missing_scope(Endpoint::SecuredDevelopment, false, "foo:bar", StatusCode::FORBIDDEN)]
#[case::dev_ignored_with_scope(Endpoint::SecuredDevelopment, true, "hello:world", StatusCode::OK)]
#[case::dev_with_scope(Endpoint::SecuredDevelopment, false, "hello:world", StatusCode::OK)]
#[case::prod_ignored_missing_scope(Endpoint::SecuredProduction, true, "foo:bar", StatusCode::FORBIDDEN)]
#[case::prod_missing_scope(Endpoint::SecuredProduction, false, "foo:bar", StatusCode::FORBIDDEN)]
#[case::prod_ignored_with_scope(Endpoint::SecuredProduction, true, "hello:world", StatusCode::OK)]
#[case::prod_with_scope(Endpoint::SecuredProduction, false, "hello:world", StatusCode::OK)]
#[case::scoped_ignored_missing_scope(Endpoint::Scoped, true, "foo:bar", StatusCode::FORBIDDEN)]
#[case::scoped_missing_scope(Endpoint::Scoped, false, "foo:bar", StatusCode::FORBIDDEN)]
#[case::scoped_ignored_with_scope(Endpoint::Scoped, true, "hello:world", StatusCode::OK)]
#[case::scoped_with_scope(Endpoint::Scoped, false, "hello:world", StatusCode::OK)]
#[tokio::test]
async fn test_protection(
    #[case] endpoint: Endpoint,
    #[case] ignore_validation: bool,
    #[case] jwt_scopes: &str,
    #[case] expect_status: StatusCode,
) {
    let route = route(endpoint, ignore_validation);
    let request = RequestContext::new("GET", "/")
        .with_bearer(&hs_token(&internal_claims(jwt_scopes), HS_KEY));

    let (result, logs) = capture_logs(route.authorize(&request)).await;
    let status = result
        .as_ref()
        .map(|_| StatusCode::OK)
        .unwrap_or_else(|e| e.status_code());
    assert_eq!(status, expect_status);

    if expect_status == StatusCode::OK && !ignore_validation {
        assert!(
            logs.text().is_empty(),
            "Expected no jwt logging on security success, got {}",
            logs.text()
        );
    }
    if expect_status != StatusCode::OK {
        assert!(logs.text().contains("missing required scopes: ['hello:world']"));
    }
}

#[tokio::test]
async fn test_bypassed_failure_is_logged_as_warning() {
    let route = route(Endpoint::SecuredDevelopment, true);
    let request = RequestContext::new("GET", "/")
        .with_bearer(&hs_token(&internal_claims("foo:bar"), "not-the-key"));

    let (result, logs) = capture_logs(route.authorize(&request)).await;
    assert!(result.is_ok());
    let text = logs.text();
    assert!(text.contains("WARN"));
    assert!(text.contains("JWT validation is disabled"));
}

#[tokio::test]
async fn test_development_gate_without_hs_key_bypasses() {
    let gate = ProtectionGate::from_settings(
        Settings::from_source(
            [
                ("PROXY_URL", PROXY_URL),
                ("ENVIRONMENT", "DEVELOPMENT"),
                ("IGNORE_JWT_VALIDATION", "true"),
            ]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        )
        .unwrap(),
    )
    .unwrap();
    assert!(gate.registry().is_empty());

    let route = gate.protect_as(scopes_present("hello:world"), false);
    let request = RequestContext::new("GET", "/")
        .with_bearer(&hs_token(&internal_claims("hello:world"), "any-key"));
    let token_data = route.authorize(&request).await.unwrap();
    assert_eq!(token_data.scopes(), ["hello:world"]);
}

#[tokio::test]
async fn test_validated_user() {
    let route = route(Endpoint::Scoped, false);

    let request = RequestContext::new("GET", "/secured_endpoint")
        .with_bearer(&hs_token(&internal_claims("hello:world"), HS_KEY));
    let user = route.validated_user(&request).await.unwrap();
    assert_eq!(user.user_id, "1234567890");
    assert_eq!(user.token_data.scopes(), ["hello:world"]);

    let request = RequestContext::new("GET", "/secured_endpoint")
        .with_bearer(&hs_token(&internal_claims("foo:bar"), HS_KEY));
    let (result, logs) = capture_logs(route.validated_user(&request)).await;
    assert_eq!(result.unwrap_err().status_code(), StatusCode::FORBIDDEN);
    assert!(logs.text().contains("missing required scopes: ['hello:world']"));
}

#[tokio::test]
async fn test_user_id_falls_back_through_configured_keys() {
    let gate = ProtectionGate::from_settings(settings(&[(
        "VALID_USER_ID_KEYS",
        "clinician_id,sub",
    )]))
    .unwrap();
    let route = gate.protect_scopes(Vec::<String>::new());

    let request = RequestContext::new("GET", "/")
        .with_bearer(&hs_token(&internal_claims("read:x"), HS_KEY));
    let user = route.validated_user(&request).await.unwrap();
    assert_eq!(user.user_id, "4321");
}

#[tokio::test]
async fn test_missing_bearer_is_unauthorized() {
    let route = route(Endpoint::Scoped, false);
    for request in [
        RequestContext::new("GET", "/"),
        RequestContext::new("GET", "/").with_header("Authorization", "Basic dXNlcjpwYXNz"),
    ] {
        let err = route.authorize(&request).await.unwrap_err();
        assert_eq!(err, AuthError::TokenMissing);
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }
}

#[tokio::test]
async fn test_policy_sees_request_parameters() {
    let gate = ProtectionGate::from_settings(settings(&[])).unwrap();
    let route = gate.protect(and_([
        scopes_present("read:patient"),
        field_in_path_matches_jwt_claim("clinician_id", "clinician_id"),
        field_in_body_matches_jwt_claim("author", "sub"),
    ]));
    let token = hs_token(&internal_claims("read:patient"), HS_KEY);

    let allowed = RequestContext::new("POST", "/clinician/4321/notes")
        .with_bearer(&token)
        .with_path_param("clinician_id", "4321")
        .with_body(r#"{"author": "1234567890"}"#);
    assert!(route.authorize(&allowed).await.is_ok());

    let wrong_path = RequestContext::new("POST", "/clinician/9999/notes")
        .with_bearer(&token)
        .with_path_param("clinician_id", "9999")
        .with_body(r#"{"author": "1234567890"}"#);
    assert!(matches!(
        route.authorize(&wrong_path).await,
        Err(AuthError::AuthorizationDenied { .. })
    ));

    let not_json = RequestContext::new("POST", "/clinician/4321/notes")
        .with_bearer(&token)
        .with_path_param("clinician_id", "4321")
        .with_body("author=1234567890");
    assert!(route.authorize(&not_json).await.is_err());
}

#[tokio::test]
async fn test_environment_routes() {
    let dev = ProtectionGate::from_settings(settings(&[("ENVIRONMENT", "DEVELOPMENT")])).unwrap();
    let prod = ProtectionGate::from_settings(settings(&[])).unwrap();
    let token = hs_token(&internal_claims("read:x"), HS_KEY);
    let request = RequestContext::new("GET", "/debug").with_bearer(&token);

    assert!(dev
        .protect(non_production_only_route())
        .authorize(&request)
        .await
        .is_ok());
    assert!(prod
        .protect(non_production_only_route())
        .authorize(&request)
        .await
        .is_err());
}

#[tokio::test]
async fn test_outcomes_are_counted() {
    let gate = ProtectionGate::from_settings(settings(&[])).unwrap();
    let route = gate.protect(key_present("clinician_id"));
    let metrics = AuthMetrics::global();
    let authorized_before = metrics.outcome_count("authorized");
    let missing_before = metrics.outcome_count("missing");

    let request = RequestContext::new("GET", "/")
        .with_bearer(&hs_token(&internal_claims("read:x"), HS_KEY));
    route.authorize(&request).await.unwrap();
    let _ = route.authorize(&RequestContext::new("GET", "/")).await;

    assert!(metrics.outcome_count("authorized") > authorized_before);
    assert!(metrics.outcome_count("missing") > missing_before);
    assert!(authgate::metrics::render().contains("authgate_auth_outcomes_total"));
}

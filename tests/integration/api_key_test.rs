// API key check wired from settings

use authgate::api_key::ApiKeyCheck;
use authgate::pipeline::RequestContext;
use authgate::{AuthError, ServiceError};
use http::StatusCode;
use rstest::rstest;

use super::test_harness::settings;

#[test]
fn test_no_check_without_configured_key() {
    assert!(ApiKeyCheck::from_settings(&settings(&[])).is_none());
}

#[rstest]
#[case::missing(None, StatusCode::UNAUTHORIZED)]
#[case::wrong(Some("invalid_key"), StatusCode::FORBIDDEN)]
#[case::empty(Some(""), StatusCode::UNAUTHORIZED)]
#[case::valid(Some("valid_key"), StatusCode::OK)]
fn test_api_key(#[case] provided: Option<&str>, #[case] expected: StatusCode) {
    let check = ApiKeyCheck::from_settings(&settings(&[("API_KEY", "valid_key")])).unwrap();
    let mut request = RequestContext::new("GET", "/api_key_endpoint");
    if let Some(key) = provided {
        request = request.with_header("X-Api-Key", key);
    }

    let status = match check.check(&request) {
        Ok(()) => StatusCode::OK,
        Err(e) => ServiceError::from(e).to_http_response().status(),
    };
    assert_eq!(status, expected);
}

#[test]
fn test_bearer_token_is_not_an_api_key() {
    let check = ApiKeyCheck::new("valid_key");
    let request = RequestContext::new("GET", "/").with_header("Authorization", "Bearer valid_key");
    assert_eq!(check.check(&request), Err(AuthError::ApiKeyMissing));
}

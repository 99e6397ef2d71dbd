// Request context unit tests

use std::collections::HashMap;

use authgate::auth::TokenData;
use authgate::authorization::{
    argument_not_present, argument_present, or_, AuthorizationEnvironment, Predicate,
};
use authgate::pipeline::{parse_query_string, RequestContext};
use bytes::Bytes;
use serde_json::json;

fn from_uri(uri: &str) -> RequestContext {
    let (parts, _) = http::Request::builder()
        .method("POST")
        .uri(uri)
        .header("Authorization", "Bearer abc")
        .header("X-Api-Key", "key-123")
        .body(())
        .unwrap()
        .into_parts();
    let mut path_params = HashMap::new();
    path_params.insert("patient_id".to_string(), "p-1".to_string());
    RequestContext::from_http(&parts, path_params, Bytes::from_static(br#"{"a": 1}"#))
}

#[test]
fn test_from_http_parts() {
    let ctx = from_uri("/patient/p-1?product_name=GDM&tag=two%20words");

    assert_eq!(ctx.method(), "POST");
    assert_eq!(ctx.path(), "/patient/p-1");
    assert_eq!(ctx.header("authorization"), Some("Bearer abc"));
    assert_eq!(ctx.header("x-api-key"), Some("key-123"));
    assert_eq!(ctx.query_param("product_name"), Some("GDM"));
    assert_eq!(ctx.query_param("tag"), Some("two words"));
    assert_eq!(ctx.path_param("patient_id"), Some("p-1"));
    assert_eq!(ctx.json_body(), Some(json!({"a": 1})));
    assert!(!ctx.request_id().is_empty());
    assert!(ctx.timestamp() > 0);
}

#[test]
fn test_request_ids_are_unique() {
    let a = RequestContext::new("GET", "/");
    let b = RequestContext::new("GET", "/");
    assert_ne!(a.request_id(), b.request_id());
}

#[test]
fn test_parse_query_string() {
    let params = parse_query_string("a=1&b=x+y&flag&c=%2Fpath&a=2");
    assert_eq!(params.get("a").map(String::as_str), Some("2"));
    assert_eq!(params.get("b").map(String::as_str), Some("x y"));
    assert_eq!(params.get("flag").map(String::as_str), Some(""));
    assert_eq!(params.get("c").map(String::as_str), Some("/path"));
    assert!(parse_query_string("").is_empty());
}

#[test]
fn test_non_json_body() {
    let ctx = RequestContext::new("POST", "/").with_body("plain text");
    assert_eq!(ctx.json_body(), None);
    assert_eq!(RequestContext::new("POST", "/").json_body(), None);
}

#[tokio::test]
async fn test_query_arguments_feed_predicates() {
    let token = TokenData::new(vec![], serde_json::Map::new());
    let policy = or_([
        argument_present("product_name", "GDM"),
        argument_not_present("patient_id"),
    ]);

    let gdm = from_uri("/patients?product_name=GDM&patient_id=1");
    assert!(policy.evaluate(&AuthorizationEnvironment::new(&token, &gdm, true)).await);

    let other = from_uri("/patients?product_name=SEND&patient_id=1");
    assert!(!policy.evaluate(&AuthorizationEnvironment::new(&token, &other, true)).await);

    let no_patient = from_uri("/patients?product_name=SEND");
    assert!(policy.evaluate(&AuthorizationEnvironment::new(&token, &no_patient, true)).await);
}

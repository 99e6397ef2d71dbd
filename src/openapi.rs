// OpenAPI security glue
//
// Produces the bearer security scheme and per-operation security requirement
// objects so a host's generated OpenAPI document matches what the gate
// enforces.

use serde_json::{json, Map, Value};

use crate::constants::BEARER_SCHEME_NAME;

/// `components.securitySchemes` entry for JWT bearer auth
pub fn bearer_security_scheme() -> Value {
    json!({
        BEARER_SCHEME_NAME: {
            "type": "http",
            "scheme": "bearer",
            "bearerFormat": "JWT"
        }
    })
}

/// Operation-level `security` value requiring `scopes`
pub fn security_requirement<S: AsRef<str>>(scopes: &[S]) -> Value {
    let scopes: Vec<&str> = scopes.iter().map(AsRef::as_ref).collect();
    json!([{ BEARER_SCHEME_NAME: scopes }])
}

/// Add the bearer scheme to a document's `components.securitySchemes`,
/// keeping any schemes already declared there
pub fn install_security_scheme(document: &mut Value) {
    let Some(root) = document.as_object_mut() else {
        return;
    };
    let components = root
        .entry("components")
        .or_insert_with(|| Value::Object(Map::new()));
    let Some(components) = components.as_object_mut() else {
        return;
    };
    let schemes = components
        .entry("securitySchemes")
        .or_insert_with(|| Value::Object(Map::new()));
    if let (Some(schemes), Value::Object(bearer)) = (schemes.as_object_mut(), bearer_security_scheme()) {
        schemes.extend(bearer);
    }
}

/// Set the `security` requirement on one operation of a document
pub fn secure_operation<S: AsRef<str>>(document: &mut Value, path: &str, method: &str, scopes: &[S]) -> bool {
    match document
        .get_mut("paths")
        .and_then(|paths| paths.get_mut(path))
        .and_then(|item| item.get_mut(method.to_ascii_lowercase()))
        .and_then(Value::as_object_mut)
    {
        Some(operation) => {
            operation.insert("security".to_string(), security_requirement(scopes));
            true
        }
        None => false,
    }
}

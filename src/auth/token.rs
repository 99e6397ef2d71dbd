//! Normalized result of a successful token decode.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::constants::UNKNOWN_USER_ID;

/// Scopes and flattened claims of a verified token.
///
/// `claims` always carries `raw` (the claim set as decoded), `sub` and `iss`;
/// the latter two are JSON null when the token did not include them. Values
/// are immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenData {
    scopes: Vec<String>,
    claims: Map<String, Value>,
}

impl TokenData {
    /// Build token data, filling in `raw`, `sub` and `iss` when absent.
    pub fn new(scopes: Vec<String>, mut claims: Map<String, Value>) -> Self {
        if !claims.contains_key("raw") {
            let raw = Value::Object(claims.clone());
            claims.insert("raw".to_string(), raw);
        }
        claims.entry("sub").or_insert(Value::Null);
        claims.entry("iss").or_insert(Value::Null);

        Self { scopes, claims }
    }

    /// Token data without scopes, mostly useful for callers that only need
    /// claim lookups.
    pub fn from_claims(claims: Map<String, Value>) -> Self {
        Self::new(Vec::new(), claims)
    }

    /// Scopes in token order, duplicates preserved
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    pub fn claims(&self) -> &Map<String, Value> {
        &self.claims
    }

    pub fn claim(&self, key: &str) -> Option<&Value> {
        self.claims.get(key)
    }

    /// The claim set exactly as it was decoded
    pub fn raw(&self) -> &Value {
        self.claims.get("raw").unwrap_or(&Value::Null)
    }

    pub fn subject(&self) -> Option<&str> {
        self.claims.get("sub").and_then(Value::as_str)
    }

    pub fn issuer(&self) -> Option<&str> {
        self.claims.get("iss").and_then(Value::as_str)
    }

    /// Resolve the acting user's id from the first non-empty claim in
    /// `valid_keys`, or `"unknown"`.
    pub fn current_user_id<S: AsRef<str>>(&self, valid_keys: &[S]) -> String {
        valid_keys
            .iter()
            .filter_map(|key| self.claims.get(key.as_ref()))
            .find_map(|value| match value {
                Value::Null => None,
                Value::String(s) if s.is_empty() => None,
                Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            })
            .unwrap_or_else(|| UNKNOWN_USER_ID.to_string())
    }

    pub fn into_parts(self) -> (Vec<String>, Map<String, Value>) {
        (self.scopes, self.claims)
    }
}

//! Endpoint authorization policies.
//!
//! A policy is a tree of [`Predicate`]s evaluated against the verified token
//! and the incoming request. Leaves check scopes, claims, path parameters,
//! query arguments, body fields or the deployment environment; [`and_`] and
//! [`or_`] combine them.
//!
//! ```
//! use authgate::authorization::{and_, key_present, or_, scopes_present};
//!
//! let policy = or_(vec![
//!     scopes_present(["read:patient", "write:patient"]),
//!     and_(vec![key_present("clinician_id"), scopes_present("read:patient")]),
//! ]);
//! assert!(policy.requirement().contains("read:patient"));
//! ```
//!
//! Predicates never fail: anything missing or malformed evaluates to `false`.

mod predicates;

pub use predicates::{
    and_, argument_not_present, argument_present, field_in_body_matches_jwt_claim,
    field_in_path_matches_jwt_claim, key_contains_value, key_contains_value_in_list, key_present,
    match_keys, non_production_only_route, or_, predicate_fn, production_only_route,
    scopes_present,
};

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::auth::TokenData;
use crate::pipeline::RequestContext;

/// What a predicate gets to look at. Borrowed for one evaluation only.
#[derive(Debug, Clone, Copy)]
pub struct AuthorizationEnvironment<'a> {
    pub scopes: &'a [String],
    pub claims: &'a Map<String, Value>,
    pub request: &'a RequestContext,
    /// Whether the route was built in a production environment
    pub production: bool,
}

impl<'a> AuthorizationEnvironment<'a> {
    pub fn new(token_data: &'a TokenData, request: &'a RequestContext, production: bool) -> Self {
        Self {
            scopes: token_data.scopes(),
            claims: token_data.claims(),
            request,
            production,
        }
    }

    pub fn claim(&self, key: &str) -> Option<&'a Value> {
        self.claims.get(key)
    }
}

/// A boolean authorization rule
#[async_trait]
pub trait Predicate: Send + Sync {
    async fn evaluate(&self, env: &AuthorizationEnvironment<'_>) -> bool;

    /// Human-readable statement of what this predicate demands, logged when
    /// a request is denied
    fn requirement(&self) -> String;
}

/// Predicates are shared between routes and requests
pub type SharedPredicate = Arc<dyn Predicate>;

/// Anything that can be read as a list of required scopes. A single string
/// is one scope, not a whitespace-separated list.
pub trait IntoScopes {
    fn into_scopes(self) -> Vec<String>;
}

impl IntoScopes for &str {
    fn into_scopes(self) -> Vec<String> {
        vec![self.to_string()]
    }
}

impl IntoScopes for String {
    fn into_scopes(self) -> Vec<String> {
        vec![self]
    }
}

impl IntoScopes for Vec<String> {
    fn into_scopes(self) -> Vec<String> {
        self
    }
}

impl IntoScopes for Vec<&str> {
    fn into_scopes(self) -> Vec<String> {
        self.into_iter().map(str::to_string).collect()
    }
}

impl IntoScopes for &[&str] {
    fn into_scopes(self) -> Vec<String> {
        self.iter().map(|s| s.to_string()).collect()
    }
}

impl IntoScopes for &[String] {
    fn into_scopes(self) -> Vec<String> {
        self.to_vec()
    }
}

impl<const N: usize> IntoScopes for [&str; N] {
    fn into_scopes(self) -> Vec<String> {
        self.iter().map(|s| s.to_string()).collect()
    }
}

/// Render names as `['a', 'b']`, the format used in denial logs
pub(crate) fn quoted_list<S: AsRef<str>>(items: &[S]) -> String {
    let quoted: Vec<String> = items
        .iter()
        .map(|item| format!("'{}'", item.as_ref()))
        .collect();
    format!("[{}]", quoted.join(", "))
}

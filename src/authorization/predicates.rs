// Built-in authorization predicates and combinators

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{quoted_list, AuthorizationEnvironment, IntoScopes, Predicate, SharedPredicate};

/// A claim counts as present unless it is null or an empty string, array or
/// object. `false` and `0` are present.
fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
        Some(_) => true,
    }
}

struct KeyPresent {
    key: String,
}

#[async_trait]
impl Predicate for KeyPresent {
    async fn evaluate(&self, env: &AuthorizationEnvironment<'_>) -> bool {
        is_present(env.claim(&self.key))
    }

    fn requirement(&self) -> String {
        format!("missing required claim: '{}'", self.key)
    }
}

/// True when the claim is present and not empty
pub fn key_present(key: impl Into<String>) -> SharedPredicate {
    Arc::new(KeyPresent { key: key.into() })
}

struct KeyContainsValue {
    key: String,
    values: Vec<Value>,
}

#[async_trait]
impl Predicate for KeyContainsValue {
    async fn evaluate(&self, env: &AuthorizationEnvironment<'_>) -> bool {
        env.claim(&self.key)
            .map(|claim| self.values.contains(claim))
            .unwrap_or(false)
    }

    fn requirement(&self) -> String {
        match self.values.as_slice() {
            [value] => format!("claim '{}' must equal {}", self.key, value),
            values => format!(
                "claim '{}' must be one of {}",
                self.key,
                Value::Array(values.to_vec())
            ),
        }
    }
}

/// True when `claims[key] == value`
pub fn key_contains_value(key: impl Into<String>, value: impl Into<Value>) -> SharedPredicate {
    Arc::new(KeyContainsValue {
        key: key.into(),
        values: vec![value.into()],
    })
}

/// True when `claims[key]` equals any of `values`
pub fn key_contains_value_in_list<V: Into<Value>>(
    key: impl Into<String>,
    values: impl IntoIterator<Item = V>,
) -> SharedPredicate {
    Arc::new(KeyContainsValue {
        key: key.into(),
        values: values.into_iter().map(Into::into).collect(),
    })
}

struct ScopesPresent {
    required: Vec<String>,
}

#[async_trait]
impl Predicate for ScopesPresent {
    async fn evaluate(&self, env: &AuthorizationEnvironment<'_>) -> bool {
        let granted: HashSet<&str> = env.scopes.iter().map(String::as_str).collect();
        self.required
            .iter()
            .all(|scope| granted.contains(scope.as_str()))
    }

    fn requirement(&self) -> String {
        format!("missing required scopes: {}", quoted_list(&self.required))
    }
}

/// True when every required scope was granted. An empty requirement always
/// holds.
pub fn scopes_present(required: impl IntoScopes) -> SharedPredicate {
    Arc::new(ScopesPresent {
        required: required.into_scopes(),
    })
}

struct MatchKeys {
    /// (route parameter, claim)
    pairs: Vec<(String, String)>,
}

#[async_trait]
impl Predicate for MatchKeys {
    async fn evaluate(&self, env: &AuthorizationEnvironment<'_>) -> bool {
        self.pairs.iter().all(|(param, claim)| {
            match (env.request.path_param(param), env.claim(claim)) {
                (Some(param_value), Some(Value::String(claim_value))) => {
                    param_value == claim_value
                }
                _ => false,
            }
        })
    }

    fn requirement(&self) -> String {
        let pairs: Vec<String> = self
            .pairs
            .iter()
            .map(|(param, claim)| format!("{}={}", param, claim))
            .collect();
        format!("path parameters must match claims: {}", quoted_list(&pairs))
    }
}

/// True when each route parameter equals the named string claim. No pairs
/// means nothing to check.
pub fn match_keys<P, C>(pairs: impl IntoIterator<Item = (P, C)>) -> SharedPredicate
where
    P: Into<String>,
    C: Into<String>,
{
    Arc::new(MatchKeys {
        pairs: pairs
            .into_iter()
            .map(|(param, claim)| (param.into(), claim.into()))
            .collect(),
    })
}

struct ArgumentPresent {
    argument: String,
    expected_value: String,
}

#[async_trait]
impl Predicate for ArgumentPresent {
    async fn evaluate(&self, env: &AuthorizationEnvironment<'_>) -> bool {
        env.request.query_param(&self.argument) == Some(self.expected_value.as_str())
    }

    fn requirement(&self) -> String {
        format!(
            "query argument '{}' must equal '{}'",
            self.argument, self.expected_value
        )
    }
}

/// True when the query string has `argument=expected_value`
pub fn argument_present(
    argument: impl Into<String>,
    expected_value: impl Into<String>,
) -> SharedPredicate {
    Arc::new(ArgumentPresent {
        argument: argument.into(),
        expected_value: expected_value.into(),
    })
}

struct ArgumentNotPresent {
    argument: String,
}

#[async_trait]
impl Predicate for ArgumentNotPresent {
    async fn evaluate(&self, env: &AuthorizationEnvironment<'_>) -> bool {
        env.request.query_param(&self.argument).is_none()
    }

    fn requirement(&self) -> String {
        format!("query argument '{}' must be absent", self.argument)
    }
}

/// True when the query string does not mention `argument`
pub fn argument_not_present(argument: impl Into<String>) -> SharedPredicate {
    Arc::new(ArgumentNotPresent {
        argument: argument.into(),
    })
}

struct FieldInPathMatchesClaim {
    path_field: String,
    claim: String,
}

#[async_trait]
impl Predicate for FieldInPathMatchesClaim {
    async fn evaluate(&self, env: &AuthorizationEnvironment<'_>) -> bool {
        match (env.request.path_param(&self.path_field), env.claim(&self.claim)) {
            (Some(field), Some(Value::String(claim))) => field == claim,
            _ => false,
        }
    }

    fn requirement(&self) -> String {
        format!(
            "path field '{}' must match claim '{}'",
            self.path_field, self.claim
        )
    }
}

/// True when the path parameter and the claim are both present and equal
pub fn field_in_path_matches_jwt_claim(
    path_field: impl Into<String>,
    claim: impl Into<String>,
) -> SharedPredicate {
    Arc::new(FieldInPathMatchesClaim {
        path_field: path_field.into(),
        claim: claim.into(),
    })
}

struct FieldInBodyMatchesClaim {
    body_field: String,
    claim: String,
}

#[async_trait]
impl Predicate for FieldInBodyMatchesClaim {
    async fn evaluate(&self, env: &AuthorizationEnvironment<'_>) -> bool {
        let Some(body) = env.request.json_body() else {
            return false;
        };
        match (body.get(&self.body_field), env.claim(&self.claim)) {
            (Some(field), Some(claim)) if !field.is_null() && !claim.is_null() => field == claim,
            _ => false,
        }
    }

    fn requirement(&self) -> String {
        format!(
            "body field '{}' must match claim '{}'",
            self.body_field, self.claim
        )
    }
}

/// True when the JSON body field and the claim are both present, non-null
/// and equal. A body that is not JSON never matches.
pub fn field_in_body_matches_jwt_claim(
    body_field: impl Into<String>,
    claim: impl Into<String>,
) -> SharedPredicate {
    Arc::new(FieldInBodyMatchesClaim {
        body_field: body_field.into(),
        claim: claim.into(),
    })
}

struct EnvironmentRoute {
    production: bool,
}

#[async_trait]
impl Predicate for EnvironmentRoute {
    async fn evaluate(&self, env: &AuthorizationEnvironment<'_>) -> bool {
        env.production == self.production
    }

    fn requirement(&self) -> String {
        if self.production {
            "route only available in production".to_string()
        } else {
            "route not available in production".to_string()
        }
    }
}

pub fn production_only_route() -> SharedPredicate {
    Arc::new(EnvironmentRoute { production: true })
}

pub fn non_production_only_route() -> SharedPredicate {
    Arc::new(EnvironmentRoute { production: false })
}

struct All {
    predicates: Vec<SharedPredicate>,
}

#[async_trait]
impl Predicate for All {
    async fn evaluate(&self, env: &AuthorizationEnvironment<'_>) -> bool {
        for predicate in &self.predicates {
            if !predicate.evaluate(env).await {
                return false;
            }
        }
        true
    }

    fn requirement(&self) -> String {
        let parts: Vec<String> = self.predicates.iter().map(|p| p.requirement()).collect();
        format!("all of ({})", parts.join("; "))
    }
}

struct Any {
    predicates: Vec<SharedPredicate>,
}

#[async_trait]
impl Predicate for Any {
    async fn evaluate(&self, env: &AuthorizationEnvironment<'_>) -> bool {
        for predicate in &self.predicates {
            if predicate.evaluate(env).await {
                return true;
            }
        }
        false
    }

    fn requirement(&self) -> String {
        let parts: Vec<String> = self.predicates.iter().map(|p| p.requirement()).collect();
        format!("any of ({})", parts.join("; "))
    }
}

/// True when every predicate holds; stops at the first false
pub fn and_(predicates: impl IntoIterator<Item = SharedPredicate>) -> SharedPredicate {
    Arc::new(All {
        predicates: predicates.into_iter().collect(),
    })
}

/// True when any predicate holds; stops at the first true
pub fn or_(predicates: impl IntoIterator<Item = SharedPredicate>) -> SharedPredicate {
    Arc::new(Any {
        predicates: predicates.into_iter().collect(),
    })
}

struct FnPredicate<F> {
    requirement: String,
    check: F,
}

#[async_trait]
impl<F> Predicate for FnPredicate<F>
where
    F: Fn(&AuthorizationEnvironment<'_>) -> bool + Send + Sync,
{
    async fn evaluate(&self, env: &AuthorizationEnvironment<'_>) -> bool {
        (self.check)(env)
    }

    fn requirement(&self) -> String {
        self.requirement.clone()
    }
}

/// Wrap a synchronous check as a predicate
pub fn predicate_fn<F>(requirement: impl Into<String>, check: F) -> SharedPredicate
where
    F: Fn(&AuthorizationEnvironment<'_>) -> bool + Send + Sync + 'static,
{
    Arc::new(FnPredicate {
        requirement: requirement.into(),
        check,
    })
}

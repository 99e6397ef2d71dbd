//! Route protection.
//!
//! A [`ProtectionGate`] is built once at startup from the settings and the
//! trust-domain registry. Each protected endpoint gets a [`ProtectedRoute`]
//! carrying its authorization policy; the host framework calls
//! [`ProtectedRoute::authorize`] (or [`ProtectedRoute::validated_user`]) for
//! every request.
//!
//! Per request the gate moves through [`GateState`]:
//!
//! ```text
//! Unverified -> TokenExtracted -> Decoded -> Authorized
//!       \              \              \
//!        +--------------+--------------+--> Rejected
//! ```
//!
//! The current state is recorded on the `protected_route` tracing span.

use std::fmt;
use std::sync::Arc;

use jsonwebtoken::Algorithm;
use serde_json::Value;
use tracing::Instrument;

use crate::auth::{
    extract_bearer_token, unverified_claims, unverified_header, JwkCache, JwkCacheConfig,
    ParserConfig, ParserRegistry, TokenData,
};
use crate::authorization::{scopes_present, AuthorizationEnvironment, IntoScopes, SharedPredicate};
use crate::config::{ConfigError, Settings};
use crate::error::AuthError;
use crate::metrics::AuthMetrics;
use crate::pipeline::RequestContext;

/// Where a request is in the authorization state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Unverified,
    TokenExtracted,
    Decoded,
    Authorized,
    Rejected,
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GateState::Unverified => "unverified",
            GateState::TokenExtracted => "token_extracted",
            GateState::Decoded => "decoded",
            GateState::Authorized => "authorized",
            GateState::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

/// The acting user of an authorized request
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedUser {
    pub user_id: String,
    pub token_data: TokenData,
}

struct GateInner {
    settings: Settings,
    registry: ParserRegistry,
    /// Normalization used for unverified tokens whose issuer is unknown
    fallback_config: ParserConfig,
}

/// Shared entry point for protecting routes. Cheap to clone.
#[derive(Clone)]
pub struct ProtectionGate {
    inner: Arc<GateInner>,
}

impl fmt::Debug for ProtectionGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtectionGate")
            .field("settings", &self.inner.settings)
            .field("trust_domains", &self.inner.registry.names())
            .finish()
    }
}

impl ProtectionGate {
    pub fn new(settings: Settings, registry: ParserRegistry) -> Self {
        let fallback_config = ParserConfig::new(
            settings.proxy_url.clone(),
            settings.hs_issuer.clone(),
            Vec::new(),
        )
        .with_metadata_key(settings.hs_metadata_key.clone())
        .with_scope_key(settings.hs_scope_key.clone())
        .with_verify(false);

        Self {
            inner: Arc::new(GateInner {
                settings,
                registry,
                fallback_config,
            }),
        }
    }

    /// Build the gate and its trust domains from settings alone
    pub fn from_settings(settings: Settings) -> Result<Self, ConfigError> {
        let jwk_cache = Arc::new(JwkCache::new(JwkCacheConfig {
            timeout_secs: settings.jwks_timeout_secs,
        }));
        let registry = ParserRegistry::from_settings(&settings, jwk_cache)?;
        Ok(Self::new(settings, registry))
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub fn registry(&self) -> &ParserRegistry {
        &self.inner.registry
    }

    /// Protect a route with an explicit policy
    pub fn protect(&self, policy: SharedPredicate) -> ProtectedRoute {
        self.protect_as(policy, self.inner.settings.is_production())
    }

    /// Protect a route whose environment is fixed by the caller rather than
    /// read from the settings. A production route never skips validation.
    pub fn protect_as(&self, policy: SharedPredicate, production: bool) -> ProtectedRoute {
        ProtectedRoute {
            gate: self.clone(),
            policy,
            production,
            ignore_validation: self.inner.settings.ignore_jwt_validation && !production,
        }
    }

    /// Protect a route with the default policy: the declared scopes
    pub fn protect_scopes(&self, scopes: impl IntoScopes) -> ProtectedRoute {
        self.protect(scopes_present(scopes))
    }

    /// Verify a token against the trust domain named by its issuer
    pub async fn verify_token(&self, token: &str) -> Result<TokenData, AuthError> {
        let header = unverified_header(token)?;
        let claims = unverified_claims(token)?;

        let issuer = claims
            .get("iss")
            .and_then(Value::as_str)
            .ok_or_else(|| AuthError::TokenInvalid("token has no issuer".to_string()))?;
        let algorithm = header
            .get("alg")
            .and_then(Value::as_str)
            .and_then(|alg| alg.parse::<Algorithm>().ok())
            .ok_or_else(|| AuthError::TokenInvalid("unsupported algorithm".to_string()))?;

        let domain = self
            .inner
            .registry
            .select(issuer, algorithm)
            .ok_or_else(|| AuthError::TokenInvalid(format!("unknown issuer '{}'", issuer)))?;

        Ok(domain.parser.decode_jwt(token, &header).await?)
    }

    /// Normalize a token's claims without verifying anything
    pub fn unverified_token_data(&self, token: &str) -> Result<TokenData, AuthError> {
        let claims = unverified_claims(token)?;
        let config = claims
            .get("iss")
            .and_then(Value::as_str)
            .and_then(|issuer| self.inner.registry.select_by_issuer(issuer))
            .map(|domain| domain.parser.config())
            .unwrap_or(&self.inner.fallback_config);
        Ok(config.parse_access_token(claims)?)
    }
}

/// A route guarded by a policy. Whether the route counts as production is
/// fixed when it is built.
#[derive(Clone)]
pub struct ProtectedRoute {
    gate: ProtectionGate,
    policy: SharedPredicate,
    production: bool,
    ignore_validation: bool,
}

impl fmt::Debug for ProtectedRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtectedRoute")
            .field("policy", &self.policy.requirement())
            .field("production", &self.production)
            .field("ignore_validation", &self.ignore_validation)
            .finish()
    }
}

impl ProtectedRoute {
    pub fn policy(&self) -> &SharedPredicate {
        &self.policy
    }

    pub fn is_production(&self) -> bool {
        self.production
    }

    /// Whether this route accepts unverified tokens
    pub fn ignores_validation(&self) -> bool {
        self.ignore_validation
    }

    /// Authenticate the request's bearer token and evaluate the policy.
    pub async fn authorize(&self, request: &RequestContext) -> Result<TokenData, AuthError> {
        let span = tracing::debug_span!(
            "protected_route",
            request_id = %request.request_id(),
            state = %GateState::Unverified
        );

        let result = self.run(request, &span).instrument(span.clone()).await;

        let outcome = match &result {
            Ok(_) if self.ignore_validation => "bypassed",
            Ok(_) => "authorized",
            Err(e) => e.kind(),
        };
        AuthMetrics::global().record_outcome(outcome);
        span.record(
            "state",
            tracing::field::display(if result.is_ok() {
                GateState::Authorized
            } else {
                GateState::Rejected
            }),
        );

        result
    }

    /// Authorize and resolve the acting user's id
    pub async fn validated_user(&self, request: &RequestContext) -> Result<ValidatedUser, AuthError> {
        let token_data = self.authorize(request).await?;
        let user_id = token_data.current_user_id(self.gate.settings().valid_user_id_keys.as_slice());
        Ok(ValidatedUser {
            user_id,
            token_data,
        })
    }

    async fn run(&self, request: &RequestContext, span: &tracing::Span) -> Result<TokenData, AuthError> {
        let Some(token) = extract_bearer_token(request.headers()) else {
            tracing::debug!("auth missing");
            return Err(AuthError::TokenMissing);
        };
        span.record("state", tracing::field::display(GateState::TokenExtracted));

        if self.ignore_validation {
            return self.run_unverified(request, &token, span).await;
        }

        let token_data = self.gate.verify_token(&token).await.map_err(|e| {
            tracing::debug!(reason = %e, "Token rejected");
            e
        })?;
        span.record("state", tracing::field::display(GateState::Decoded));

        let env = AuthorizationEnvironment::new(&token_data, request, self.production);
        if !self.policy.evaluate(&env).await {
            let requirement = self.policy.requirement();
            tracing::debug!("{}", requirement);
            return Err(AuthError::AuthorizationDenied { requirement });
        }

        Ok(token_data)
    }

    async fn run_unverified(
        &self,
        request: &RequestContext,
        token: &str,
        span: &tracing::Span,
    ) -> Result<TokenData, AuthError> {
        let token_data = self.gate.unverified_token_data(token).map_err(|e| {
            tracing::debug!(reason = %e, "Token rejected");
            e
        })?;
        span.record("state", tracing::field::display(GateState::Decoded));

        let env = AuthorizationEnvironment::new(&token_data, request, self.production);
        if !self.policy.evaluate(&env).await {
            tracing::warn!(
                requirement = %self.policy.requirement(),
                "Authorization failed but JWT validation is disabled, allowing request"
            );
        }

        Ok(token_data)
    }
}

// Configuration module

mod jwt;

pub use jwt::{TrustDomainConfig, TrustDomainFile, TrustDomainKind};

use std::collections::HashMap;

use serde::Deserialize;
use thiserror::Error;

use crate::constants::{
    DEFAULT_AUTH0_ALGORITHMS, DEFAULT_JWKS_TIMEOUT_SECS, DEFAULT_METADATA_KEY, DEFAULT_SCOPE_KEY,
    DEFAULT_VALID_USER_ID_KEYS, ENV_AUTH0_ALGORITHMS, ENV_AUTH0_AUDIENCE, ENV_HS_KEY,
    ENV_IGNORE_JWT_VALIDATION, ENV_JWKS_TIMEOUT_SECS, ENV_PROXY_URL, PRODUCTION_ENVIRONMENT,
    SETTINGS_ENV_VARS,
};

/// Errors raised while loading settings or trust-domain files
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("required setting {0} is not set")]
    Missing(String),

    #[error("invalid value for {var}: {reason}")]
    Invalid { var: String, reason: String },

    #[error("cannot ignore JWT validation in a production environment")]
    InsecureProduction,

    #[error("failed to load configuration: {0}")]
    Load(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::Load(err.to_string())
    }
}

/// Settings for the identity provider trust domains (standard and login)
#[derive(Debug, Clone, PartialEq)]
pub struct Auth0Settings {
    /// Issuer base URL, also where the JWKS is published. Always ends in
    /// `/`, the form the provider writes into `iss`.
    pub domain: String,
    pub audience: String,
    pub metadata_key: String,
    pub scope_key: String,
    pub algorithms: Vec<String>,
    /// Secret for login-flow tokens. No login trust domain without it.
    pub login_hs_key: Option<String>,
}

/// Service settings, validated once at startup.
///
/// Build a fresh instance per test with [`Settings::from_source`]; nothing
/// here is memoized.
#[derive(Clone, PartialEq)]
pub struct Settings {
    /// Internal signing secret. Only optional when validation is ignored
    /// outside production; no internal trust domain without it.
    pub hs_key: Option<String>,
    pub hs_issuer: String,
    pub proxy_url: String,
    pub hs_metadata_key: String,
    pub hs_scope_key: String,
    pub ignore_jwt_validation: bool,
    pub environment: String,
    /// Claims tried in order when resolving the acting user's id
    pub valid_user_id_keys: Vec<String>,
    pub auth0: Option<Auth0Settings>,
    pub api_key: Option<String>,
    pub jwks_timeout_secs: u64,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("hs_issuer", &self.hs_issuer)
            .field("proxy_url", &self.proxy_url)
            .field("ignore_jwt_validation", &self.ignore_jwt_validation)
            .field("environment", &self.environment)
            .field("valid_user_id_keys", &self.valid_user_id_keys)
            .field("auth0_domain", &self.auth0.as_ref().map(|a| &a.domain))
            .field("api_key_configured", &self.api_key.is_some())
            .field("jwks_timeout_secs", &self.jwks_timeout_secs)
            .finish()
    }
}

/// Environment variables as read by the `config` crate (lower-cased keys)
#[derive(Debug, Default, Deserialize)]
struct RawSettings {
    hs_key: Option<String>,
    hs_issuer: Option<String>,
    proxy_url: Option<String>,
    hs_metadata_key: Option<String>,
    hs_scope_key: Option<String>,
    ignore_jwt_validation: Option<String>,
    environment: Option<String>,
    valid_user_id_keys: Option<String>,
    auth0_domain: Option<String>,
    auth0_audience: Option<String>,
    auth0_metadata: Option<String>,
    auth0_scope_key: Option<String>,
    auth0_algorithms: Option<String>,
    auth0_hs_key: Option<String>,
    api_key: Option<String>,
    jwks_timeout_secs: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(value: Option<String>, var: &str) -> Result<String, ConfigError> {
    non_empty(value).ok_or_else(|| ConfigError::Missing(var.to_string()))
}

fn parse_bool(value: Option<String>, var: &str) -> Result<bool, ConfigError> {
    match non_empty(value) {
        None => Ok(false),
        Some(v) => match v.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid {
                var: var.to_string(),
                reason: format!("expected a boolean, got '{}'", v),
            }),
        },
    }
}

fn parse_list(value: Option<String>) -> Option<Vec<String>> {
    non_empty(value).map(|v| {
        v.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect()
    })
}

impl Settings {
    /// Load settings from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let source: HashMap<String, String> = SETTINGS_ENV_VARS
            .iter()
            .filter_map(|name| std::env::var(name).ok().map(|v| (name.to_string(), v)))
            .collect();
        Self::from_source(source)
    }

    /// Load settings from an explicit variable map instead of the process
    /// environment.
    pub fn from_source(source: HashMap<String, String>) -> Result<Self, ConfigError> {
        let raw: RawSettings = config::Config::builder()
            .add_source(config::Environment::default().source(Some(source)))
            .build()?
            .try_deserialize()?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawSettings) -> Result<Self, ConfigError> {
        let ignore_jwt_validation =
            parse_bool(raw.ignore_jwt_validation, ENV_IGNORE_JWT_VALIDATION)?;
        let environment =
            non_empty(raw.environment).unwrap_or_else(|| PRODUCTION_ENVIRONMENT.to_string());
        let validation_disabled = ignore_jwt_validation
            && !environment.eq_ignore_ascii_case(PRODUCTION_ENVIRONMENT);
        let hs_key = if validation_disabled {
            non_empty(raw.hs_key)
        } else {
            Some(required(raw.hs_key, ENV_HS_KEY)?)
        };
        let proxy_url = required(raw.proxy_url, ENV_PROXY_URL)?;
        let hs_issuer = non_empty(raw.hs_issuer).unwrap_or_else(|| proxy_url.clone());

        let valid_user_id_keys = parse_list(raw.valid_user_id_keys)
            .filter(|keys| !keys.is_empty())
            .unwrap_or_else(|| {
                DEFAULT_VALID_USER_ID_KEYS
                    .iter()
                    .map(|k| k.to_string())
                    .collect()
            });

        let jwks_timeout_secs = match non_empty(raw.jwks_timeout_secs) {
            None => DEFAULT_JWKS_TIMEOUT_SECS,
            Some(v) => v.parse::<u64>().map_err(|e| ConfigError::Invalid {
                var: ENV_JWKS_TIMEOUT_SECS.to_string(),
                reason: e.to_string(),
            })?,
        };

        let auth0 = match non_empty(raw.auth0_domain) {
            None => None,
            Some(domain) => Some(Auth0Settings {
                domain: format!("{}/", domain.trim_end_matches('/')),
                audience: required(raw.auth0_audience, ENV_AUTH0_AUDIENCE)?,
                metadata_key: non_empty(raw.auth0_metadata)
                    .unwrap_or_else(|| DEFAULT_METADATA_KEY.to_string()),
                scope_key: non_empty(raw.auth0_scope_key)
                    .unwrap_or_else(|| DEFAULT_SCOPE_KEY.to_string()),
                algorithms: parse_list(raw.auth0_algorithms)
                    .filter(|algs| !algs.is_empty())
                    .unwrap_or_else(|| {
                        DEFAULT_AUTH0_ALGORITHMS
                            .iter()
                            .map(|a| a.to_string())
                            .collect()
                    }),
                login_hs_key: non_empty(raw.auth0_hs_key),
            }),
        };

        let settings = Self {
            hs_key,
            hs_issuer,
            proxy_url,
            hs_metadata_key: non_empty(raw.hs_metadata_key)
                .unwrap_or_else(|| DEFAULT_METADATA_KEY.to_string()),
            hs_scope_key: non_empty(raw.hs_scope_key)
                .unwrap_or_else(|| DEFAULT_SCOPE_KEY.to_string()),
            ignore_jwt_validation,
            environment,
            valid_user_id_keys,
            auth0,
            api_key: non_empty(raw.api_key),
            jwks_timeout_secs,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Reject combinations that are individually valid but unsafe together
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.is_production() && self.ignore_jwt_validation {
            return Err(ConfigError::InsecureProduction);
        }
        if let Some(auth0) = &self.auth0 {
            if auth0.algorithms.iter().any(|alg| alg.starts_with("HS")) {
                return Err(ConfigError::Invalid {
                    var: ENV_AUTH0_ALGORITHMS.to_string(),
                    reason: "the standard trust domain only accepts asymmetric algorithms"
                        .to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case(PRODUCTION_ENVIRONMENT)
    }

    /// Whether unverified tokens may be accepted. Never true in production.
    pub fn ignore_validation_active(&self) -> bool {
        self.ignore_jwt_validation && !self.is_production()
    }
}

/// Environment variables this crate reads, for diagnostics
pub fn known_env_vars() -> &'static [&'static str] {
    SETTINGS_ENV_VARS
}

//! Trust-domain registry.
//!
//! Maps each configured trust domain to its parser and picks the parser for
//! an incoming token. Selection uses two unverified inputs, the `iss` claim
//! and the header `alg`: the issuer names the domain and the algorithm
//! family separates the login (HMAC) and standard (asymmetric) parsers of
//! the same identity provider. Nothing selected this way is trusted until the
//! chosen parser has verified the token.

use std::sync::Arc;

use jsonwebtoken::Algorithm;

use super::jwk_cache::SharedJwkCache;
use super::parser::{parse_algorithms, JwtParser, ParserConfig};
use crate::config::{ConfigError, Settings, TrustDomainFile, TrustDomainKind};
use crate::constants::{DEFAULT_AUTH0_LOGIN_ALGORITHM, DEFAULT_HS_ALGORITHMS};

pub const INTERNAL_DOMAIN: &str = "internal";
pub const AUTH0_STANDARD_DOMAIN: &str = "auth0";
pub const AUTH0_LOGIN_DOMAIN: &str = "auth0_login";

/// A named parser
#[derive(Debug, Clone)]
pub struct TrustDomain {
    pub name: String,
    pub parser: Arc<JwtParser>,
}

fn same_issuer(a: &str, b: &str) -> bool {
    a.trim_end_matches('/') == b.trim_end_matches('/')
}

#[derive(Debug, Clone, Default)]
pub struct ParserRegistry {
    domains: Vec<TrustDomain>,
}

fn invalid(var: &str) -> impl Fn(super::parser::JwtError) -> ConfigError + '_ {
    move |e| ConfigError::Invalid {
        var: var.to_string(),
        reason: e.to_string(),
    }
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the trust domains implied by the settings: the internal domain
    /// when `HS_KEY` is set, plus the identity provider's standard and login
    /// domains when configured.
    pub fn from_settings(settings: &Settings, jwk_cache: SharedJwkCache) -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        if let Some(hs_key) = &settings.hs_key {
            let hs_algorithms =
                parse_algorithms(DEFAULT_HS_ALGORITHMS).map_err(invalid("HS_KEY"))?;
            registry.register(
                INTERNAL_DOMAIN,
                JwtParser::internal(
                    ParserConfig::new(&settings.proxy_url, &settings.hs_issuer, hs_algorithms)
                        .with_metadata_key(&settings.hs_metadata_key)
                        .with_scope_key(&settings.hs_scope_key),
                    hs_key,
                ),
            )?;
        }

        if let Some(auth0) = &settings.auth0 {
            let algorithms =
                parse_algorithms(auth0.algorithms.as_slice()).map_err(invalid("AUTH0_ALGORITHMS"))?;
            let config = ParserConfig::new(&auth0.audience, &auth0.domain, algorithms)
                .with_metadata_key(&auth0.metadata_key)
                .with_scope_key(&auth0.scope_key);
            registry.register(
                AUTH0_STANDARD_DOMAIN,
                JwtParser::standard(config.clone(), &auth0.domain, Arc::clone(&jwk_cache)),
            )?;

            if let Some(login_key) = &auth0.login_hs_key {
                let login_algorithms = parse_algorithms(&[DEFAULT_AUTH0_LOGIN_ALGORITHM])
                    .map_err(invalid("AUTH0_HS_KEY"))?;
                let login_config = ParserConfig {
                    allowed_algorithms: login_algorithms,
                    ..config
                };
                registry.register(AUTH0_LOGIN_DOMAIN, JwtParser::login(login_config, login_key))?;
            }
        }

        Ok(registry)
    }

    /// Add the domains declared in a trust-domain file
    pub fn extend_from_file(
        &mut self,
        file: &TrustDomainFile,
        jwk_cache: &SharedJwkCache,
    ) -> Result<(), ConfigError> {
        for domain in &file.trust_domains {
            let algorithms = parse_algorithms(domain.effective_algorithms().as_slice())
                .map_err(invalid(&domain.name))?;
            let mut config = ParserConfig::new(&domain.audience, &domain.issuer, algorithms);
            if let Some(metadata_key) = &domain.metadata_key {
                config = config.with_metadata_key(metadata_key);
            }
            if let Some(scope_key) = &domain.scope_key {
                config = config.with_scope_key(scope_key);
            }

            let secret = domain.secret.clone().unwrap_or_default();
            let parser = match domain.kind {
                TrustDomainKind::Internal => JwtParser::internal(config, secret),
                TrustDomainKind::Login => JwtParser::login(config, secret),
                TrustDomainKind::Standard => {
                    JwtParser::standard(config, domain.jwks_base_url(), Arc::clone(jwk_cache))
                }
            };
            self.register(&domain.name, parser)?;
        }
        Ok(())
    }

    /// Register a parser under a unique name
    pub fn register(&mut self, name: &str, parser: JwtParser) -> Result<(), ConfigError> {
        if self.get(name).is_some() {
            return Err(ConfigError::Invalid {
                var: "trust_domains".to_string(),
                reason: format!("duplicate trust domain name '{}'", name),
            });
        }
        tracing::debug!(domain = %name, parser = %parser, "Registered trust domain");
        self.domains.push(TrustDomain {
            name: name.to_string(),
            parser: Arc::new(parser),
        });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&JwtParser> {
        self.domains
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.parser.as_ref())
    }

    /// The first domain whose issuer matches and which accepts `algorithm`.
    ///
    /// Matching ignores a trailing `/`, but the chosen parser still checks
    /// `iss` exactly, so configured issuers must be written the way tokens
    /// carry them. `AUTH0_DOMAIN` is normalized to the trailing-slash form.
    pub fn select(&self, issuer: &str, algorithm: Algorithm) -> Option<&TrustDomain> {
        self.domains.iter().find(|d| {
            same_issuer(&d.parser.config().required_issuer, issuer)
                && d.parser.accepts_algorithm(algorithm)
        })
    }

    /// The first domain with a matching issuer, whatever the algorithm
    pub fn select_by_issuer(&self, issuer: &str) -> Option<&TrustDomain> {
        self.domains
            .iter()
            .find(|d| same_issuer(&d.parser.config().required_issuer, issuer))
    }

    pub fn names(&self) -> Vec<&str> {
        self.domains.iter().map(|d| d.name.as_str()).collect()
    }

    pub fn domains(&self) -> &[TrustDomain] {
        &self.domains
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}

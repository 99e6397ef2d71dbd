//! Trust domain file: extra JWT issuers loaded from YAML.
//!
//! Besides the trust domains derived from environment settings, a service
//! can declare more issuers in a file:
//!
//! ```yaml
//! trust_domains:
//!   - name: partner
//!     kind: standard
//!     issuer: https://partner.example.com/
//!     audience: https://api.example.com
//!     algorithms: [ES256]
//!   - name: batch
//!     kind: internal
//!     issuer: https://batch.example.com/
//!     audience: https://api.example.com
//!     secret: ${BATCH_HS_KEY}
//! ```
//!
//! `${VAR}` references are substituted from the environment before parsing;
//! a reference to an unset variable fails the whole load.
//!
//! # Validation
//!
//! - names are unique and non-empty
//! - `internal` and `login` domains need a `secret` and HMAC algorithms
//! - `standard` domains need asymmetric algorithms

use std::collections::HashSet;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::auth::parser::parse_algorithms;
use crate::constants::{DEFAULT_AUTH0_ALGORITHMS, DEFAULT_HS_ALGORITHMS};

/// Which trust model a configured domain uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustDomainKind {
    Internal,
    Login,
    Standard,
}

impl TrustDomainKind {
    fn default_algorithms(self) -> &'static [&'static str] {
        match self {
            TrustDomainKind::Internal | TrustDomainKind::Login => DEFAULT_HS_ALGORITHMS,
            TrustDomainKind::Standard => DEFAULT_AUTH0_ALGORITHMS,
        }
    }

    fn uses_secret(self) -> bool {
        !matches!(self, TrustDomainKind::Standard)
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustDomainConfig {
    pub name: String,
    pub kind: TrustDomainKind,
    pub issuer: String,
    #[serde(default)]
    pub audience: String,
    /// Where the JWKS is published. Defaults to `issuer`.
    #[serde(default)]
    pub jwks_base_url: Option<String>,
    /// Shared secret for `internal` and `login` domains
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub algorithms: Vec<String>,
    #[serde(default)]
    pub metadata_key: Option<String>,
    #[serde(default)]
    pub scope_key: Option<String>,
}

impl std::fmt::Debug for TrustDomainConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustDomainConfig")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("jwks_base_url", &self.jwks_base_url)
            .field("algorithms", &self.algorithms)
            .finish_non_exhaustive()
    }
}

impl TrustDomainConfig {
    /// Configured algorithms, or the defaults for the domain kind
    pub fn effective_algorithms(&self) -> Vec<String> {
        if self.algorithms.is_empty() {
            self.kind
                .default_algorithms()
                .iter()
                .map(|a| a.to_string())
                .collect()
        } else {
            self.algorithms.clone()
        }
    }

    pub fn jwks_base_url(&self) -> &str {
        self.jwks_base_url.as_deref().unwrap_or(&self.issuer)
    }

    fn field(&self, field: &str) -> String {
        format!("trust_domains.{}.{}", self.name, field)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer.trim().is_empty() {
            return Err(ConfigError::Missing(self.field("issuer")));
        }

        let uses_secret = self.kind.uses_secret();
        if uses_secret && self.secret.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::Missing(self.field("secret")));
        }

        let algorithms = self.effective_algorithms();
        parse_algorithms(algorithms.as_slice()).map_err(|e| ConfigError::Invalid {
            var: self.field("algorithms"),
            reason: e.to_string(),
        })?;

        let all_hmac = algorithms.iter().all(|a| a.starts_with("HS"));
        let any_hmac = algorithms.iter().any(|a| a.starts_with("HS"));
        if uses_secret && !all_hmac {
            return Err(ConfigError::Invalid {
                var: self.field("algorithms"),
                reason: "shared-secret domains only accept HMAC algorithms".to_string(),
            });
        }
        if !uses_secret && any_hmac {
            return Err(ConfigError::Invalid {
                var: self.field("algorithms"),
                reason: "standard domains only accept asymmetric algorithms".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrustDomainFile {
    #[serde(default)]
    pub trust_domains: Vec<TrustDomainConfig>,
}

impl TrustDomainFile {
    pub fn from_yaml_with_env(yaml: &str) -> Result<Self, ConfigError> {
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        // Every referenced variable must exist before anything is substituted.
        for caps in re.captures_iter(yaml) {
            let var_name = &caps[1];
            if std::env::var(var_name).is_err() {
                return Err(ConfigError::Missing(var_name.to_string()));
            }
        }

        let substituted = re.replace_all(yaml, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_default()
        });

        let file: TrustDomainFile =
            serde_yaml::from_str(&substituted).map_err(|e| ConfigError::Load(e.to_string()))?;
        file.validate()?;
        Ok(file)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConfigError::Load(format!(
                "Failed to read trust domain file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_yaml_with_env(&yaml)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for domain in &self.trust_domains {
            if domain.name.trim().is_empty() {
                return Err(ConfigError::Missing("trust_domains.name".to_string()));
            }
            if !seen.insert(domain.name.as_str()) {
                return Err(ConfigError::Invalid {
                    var: "trust_domains".to_string(),
                    reason: format!("duplicate trust domain name '{}'", domain.name),
                });
            }
            domain.validate()?;
        }
        Ok(())
    }
}

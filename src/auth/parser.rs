//! JWT parsers: one per trust model.
//!
//! Every parser shares the same verification-option construction and claims
//! normalization ([`ParserConfig`]); they differ only in where the
//! verification key comes from and how strictly issuer and audience are
//! checked:
//!
//! - **Internal**: HMAC with a secret known to this service, strict checks.
//! - **Login**: HMAC used during the identity provider's login handshake.
//!   Issuer and audience are not checked because the token is issued before
//!   the user's real identity is attached. Signature and expiry still are.
//! - **Standard**: asymmetric, key fetched from the issuer's JWKS by the
//!   header `kid`.
//! - **Base**: configuration only; decoding is not implemented.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use super::jwk_cache::SharedJwkCache;
use super::token::TokenData;
use crate::constants::{DEFAULT_METADATA_KEY, DEFAULT_SCOPE_KEY};

/// Why a token failed cryptographic or claim verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationFailure {
    Expired,
    ImmatureSignature,
    InvalidSignature,
    InvalidAudience,
    InvalidIssuer,
    InvalidAlgorithm,
    /// A registered claim had the wrong JSON type
    InvalidClaim(&'static str),
    /// Not a structurally valid JWT
    Malformed(String),
    Other(String),
}

impl fmt::Display for VerificationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationFailure::Expired => write!(f, "signature has expired"),
            VerificationFailure::ImmatureSignature => write!(f, "token is not yet valid"),
            VerificationFailure::InvalidSignature => write!(f, "signature verification failed"),
            VerificationFailure::InvalidAudience => write!(f, "invalid audience"),
            VerificationFailure::InvalidIssuer => write!(f, "invalid issuer"),
            VerificationFailure::InvalidAlgorithm => write!(f, "algorithm not allowed"),
            VerificationFailure::InvalidClaim(claim) => write!(f, "invalid '{}' claim", claim),
            VerificationFailure::Malformed(reason) => write!(f, "malformed token: {}", reason),
            VerificationFailure::Other(reason) => write!(f, "{}", reason),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for VerificationFailure {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => VerificationFailure::Expired,
            ErrorKind::ImmatureSignature => VerificationFailure::ImmatureSignature,
            ErrorKind::InvalidSignature => VerificationFailure::InvalidSignature,
            ErrorKind::InvalidAudience => VerificationFailure::InvalidAudience,
            ErrorKind::InvalidIssuer => VerificationFailure::InvalidIssuer,
            ErrorKind::InvalidAlgorithm | ErrorKind::MissingAlgorithm => {
                VerificationFailure::InvalidAlgorithm
            }
            ErrorKind::InvalidToken
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => VerificationFailure::Malformed(err.to_string()),
            _ => VerificationFailure::Other(err.to_string()),
        }
    }
}

/// Errors raised while decoding a token with a [`JwtParser`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JwtError {
    #[error("decode_jwt is not implemented for the base parser")]
    NotImplemented,

    #[error("JWT provided with no kid field in header")]
    MissingKid,

    #[error("Could not retrieve JWT key from header: {0}")]
    KeyResolution(String),

    #[error("token verification failed: {0}")]
    Verification(VerificationFailure),

    #[error("scope claim must be a space-delimited string")]
    ScopeEncodingInvalid,

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        JwtError::Verification(err.into())
    }
}

/// Which checks to run when decoding. All on when verifying, all off
/// otherwise, leeway always zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VerificationOptions {
    pub verify_signature: bool,
    pub verify_aud: bool,
    pub verify_iat: bool,
    pub verify_exp: bool,
    pub verify_nbf: bool,
    pub verify_iss: bool,
    pub verify_sub: bool,
    pub verify_jti: bool,
    pub leeway: u64,
}

impl VerificationOptions {
    pub fn construct(verify: bool) -> Self {
        Self {
            verify_signature: verify,
            verify_aud: verify,
            verify_iat: verify,
            verify_exp: verify,
            verify_nbf: verify,
            verify_iss: verify,
            verify_sub: verify,
            verify_jti: verify,
            leeway: 0,
        }
    }

    /// Same options with issuer and audience checks switched off
    pub fn without_domain_checks(self) -> Self {
        Self {
            verify_aud: false,
            verify_iss: false,
            ..self
        }
    }

    /// Translate into a `jsonwebtoken` validation. Registered claims are
    /// checked when present but never required.
    pub fn to_validation(
        &self,
        algorithms: &[Algorithm],
        audience: Option<&str>,
        issuer: Option<&str>,
    ) -> Validation {
        let mut validation = Validation::new(algorithms.first().copied().unwrap_or_default());
        validation.algorithms = algorithms.to_vec();
        validation.leeway = self.leeway;
        validation.required_spec_claims = HashSet::new();
        validation.validate_exp = self.verify_exp;
        validation.validate_nbf = self.verify_nbf;
        validation.validate_aud = self.verify_aud;

        if self.verify_aud {
            if let Some(audience) = audience {
                validation.set_audience(&[audience]);
            }
        }
        if self.verify_iss {
            if let Some(issuer) = issuer {
                validation.set_issuer(&[issuer]);
            }
        }
        if !self.verify_signature {
            validation.insecure_disable_signature_validation();
        }

        validation
    }

    /// Type checks on registered claims that `jsonwebtoken` leaves alone
    fn check_claim_types(&self, claims: &Map<String, Value>) -> Result<(), VerificationFailure> {
        let wrong_type = |name: &str, ok: fn(&Value) -> bool| {
            claims.get(name).map(|v| !ok(v)).unwrap_or(false)
        };

        if self.verify_iat && wrong_type("iat", Value::is_number) {
            return Err(VerificationFailure::InvalidClaim("iat"));
        }
        if self.verify_sub && wrong_type("sub", Value::is_string) {
            return Err(VerificationFailure::InvalidClaim("sub"));
        }
        if self.verify_jti && wrong_type("jti", Value::is_string) {
            return Err(VerificationFailure::InvalidClaim("jti"));
        }
        Ok(())
    }
}

/// Parse algorithm names such as `"HS256"` or `"RS256"`
pub fn parse_algorithms<S: AsRef<str>>(names: &[S]) -> Result<Vec<Algorithm>, JwtError> {
    names
        .iter()
        .map(|name| {
            Algorithm::from_str(name.as_ref())
                .map_err(|_| JwtError::UnsupportedAlgorithm(name.as_ref().to_string()))
        })
        .collect()
}

/// Settings shared by every parser variant
#[derive(Debug, Clone, PartialEq)]
pub struct ParserConfig {
    pub required_audience: String,
    pub required_issuer: String,
    /// Claim holding provider metadata that gets flattened into the claims
    pub metadata_key: String,
    /// Claim holding the space-delimited scope list
    pub scope_key: String,
    pub allowed_algorithms: Vec<Algorithm>,
    pub verify: bool,
}

impl ParserConfig {
    pub fn new(
        required_audience: impl Into<String>,
        required_issuer: impl Into<String>,
        allowed_algorithms: Vec<Algorithm>,
    ) -> Self {
        Self {
            required_audience: required_audience.into(),
            required_issuer: required_issuer.into(),
            metadata_key: DEFAULT_METADATA_KEY.to_string(),
            scope_key: DEFAULT_SCOPE_KEY.to_string(),
            allowed_algorithms,
            verify: true,
        }
    }

    pub fn with_metadata_key(mut self, metadata_key: impl Into<String>) -> Self {
        self.metadata_key = metadata_key.into();
        self
    }

    pub fn with_scope_key(mut self, scope_key: impl Into<String>) -> Self {
        self.scope_key = scope_key.into();
        self
    }

    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Normalize a decoded claim set into [`TokenData`].
    ///
    /// The metadata object's keys are merged into the top level, an array of
    /// `locations` is projected into `location_ids`, and the scope claim is
    /// split on whitespace. A scope claim that is not a string is rejected
    /// rather than read as "no scopes".
    pub fn parse_access_token(&self, claims: Map<String, Value>) -> Result<TokenData, JwtError> {
        let scopes = match claims.get(&self.scope_key) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::String(scope)) => scope.split_whitespace().map(str::to_string).collect(),
            Some(_) => {
                tracing::warn!(scope_key = %self.scope_key, "Scope claim is not a string");
                return Err(JwtError::ScopeEncodingInvalid);
            }
        };

        let mut flattened = claims.clone();
        match flattened.remove(&self.metadata_key) {
            Some(Value::Object(metadata)) => flattened.extend(metadata),
            Some(Value::Null) | None => {}
            Some(_) => {
                tracing::debug!(metadata_key = %self.metadata_key, "Ignoring non-object metadata claim");
            }
        }

        if let Some(Value::Array(locations)) = flattened.get("locations") {
            let location_ids: Vec<Value> = locations
                .iter()
                .filter_map(|location| location.get("id").cloned())
                .collect();
            flattened.insert("location_ids".to_string(), Value::Array(location_ids));
        }

        flattened.insert("raw".to_string(), Value::Object(claims));
        Ok(TokenData::new(scopes, flattened))
    }
}

/// The trust model a parser implements
#[derive(Clone)]
pub enum ParserKind {
    Base,
    Internal {
        hs_key: String,
    },
    Login {
        hs_key: String,
    },
    Standard {
        issuer_base_url: String,
        jwk_cache: SharedJwkCache,
    },
}

impl fmt::Debug for ParserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Secrets stay out of debug output.
        match self {
            ParserKind::Base => write!(f, "Base"),
            ParserKind::Internal { .. } => write!(f, "Internal"),
            ParserKind::Login { .. } => write!(f, "Login"),
            ParserKind::Standard {
                issuer_base_url, ..
            } => f
                .debug_struct("Standard")
                .field("issuer_base_url", issuer_base_url)
                .finish(),
        }
    }
}

/// Decodes and verifies tokens for one trust domain. Immutable after
/// construction and safe to share between requests.
#[derive(Debug, Clone)]
pub struct JwtParser {
    config: ParserConfig,
    kind: ParserKind,
}

impl JwtParser {
    pub fn base(config: ParserConfig) -> Self {
        Self {
            config,
            kind: ParserKind::Base,
        }
    }

    pub fn internal(config: ParserConfig, hs_key: impl Into<String>) -> Self {
        Self {
            config,
            kind: ParserKind::Internal {
                hs_key: hs_key.into(),
            },
        }
    }

    pub fn login(config: ParserConfig, hs_key: impl Into<String>) -> Self {
        Self {
            config,
            kind: ParserKind::Login {
                hs_key: hs_key.into(),
            },
        }
    }

    pub fn standard(
        config: ParserConfig,
        issuer_base_url: impl Into<String>,
        jwk_cache: SharedJwkCache,
    ) -> Self {
        Self {
            config,
            kind: ParserKind::Standard {
                issuer_base_url: issuer_base_url.into(),
                jwk_cache,
            },
        }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    pub fn kind(&self) -> &ParserKind {
        &self.kind
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            ParserKind::Base => "base",
            ParserKind::Internal { .. } => "internal",
            ParserKind::Login { .. } => "login",
            ParserKind::Standard { .. } => "standard",
        }
    }

    pub fn accepts_algorithm(&self, algorithm: Algorithm) -> bool {
        self.config.allowed_algorithms.contains(&algorithm)
    }

    pub fn verification_options(&self) -> VerificationOptions {
        let options = VerificationOptions::construct(self.config.verify);
        match self.kind {
            ParserKind::Login { .. } => options.without_domain_checks(),
            _ => options,
        }
    }

    /// Decode and verify `raw_token`, then normalize its claims.
    pub async fn decode_jwt(
        &self,
        raw_token: &str,
        unverified_header: &Map<String, Value>,
    ) -> Result<TokenData, JwtError> {
        let key = match &self.kind {
            ParserKind::Base => return Err(JwtError::NotImplemented),
            ParserKind::Internal { hs_key } | ParserKind::Login { hs_key } => {
                DecodingKey::from_secret(hs_key.as_bytes())
            }
            ParserKind::Standard {
                issuer_base_url,
                jwk_cache,
            } => Self::resolve_jwk(issuer_base_url, jwk_cache, unverified_header).await?,
        };

        let claims = self.verify_claims(raw_token, &key)?;
        self.config.parse_access_token(claims)
    }

    async fn resolve_jwk(
        issuer_base_url: &str,
        jwk_cache: &SharedJwkCache,
        unverified_header: &Map<String, Value>,
    ) -> Result<DecodingKey, JwtError> {
        let Some(kid) = unverified_header.get("kid").and_then(Value::as_str) else {
            tracing::warn!("JWT provided with no kid field in header");
            return Err(JwtError::MissingKid);
        };

        let record = jwk_cache
            .get_key(issuer_base_url, kid)
            .await
            .map_err(|e| {
                tracing::warn!(kid = %kid, reason = %e, "Could not retrieve JWT key from header");
                JwtError::KeyResolution(e.to_string())
            })?;

        record.to_decoding_key().map_err(|e| {
            tracing::warn!(kid = %kid, reason = %e, "Could not retrieve JWT key from header");
            JwtError::KeyResolution(e.to_string())
        })
    }

    fn verify_claims(&self, raw_token: &str, key: &DecodingKey) -> Result<Map<String, Value>, JwtError> {
        let options = self.verification_options();
        let validation = options.to_validation(
            &self.config.allowed_algorithms,
            Some(&self.config.required_audience),
            Some(&self.config.required_issuer),
        );

        let decoded = decode::<Map<String, Value>>(raw_token, key, &validation)?;
        options
            .check_claim_types(&decoded.claims)
            .map_err(JwtError::Verification)?;
        Ok(decoded.claims)
    }
}

impl fmt::Display for JwtParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.kind {
            ParserKind::Base => "Base",
            ParserKind::Internal { .. } => "Internal",
            ParserKind::Login { .. } => "Auth0 login",
            ParserKind::Standard { .. } => "Auth0 standard",
        };
        write!(
            f,
            "{} JwtParser with domain {}",
            label, self.config.required_issuer
        )
    }
}

/// Decode an HMAC-signed token, returning `None` when verification fails.
///
/// Unlike [`JwtParser::decode_jwt`], failures are not propagated: an expired,
/// tampered or malformed token all yield `None`, with the reason logged at
/// debug level.
pub fn decode_hs_jwt(
    hs_key: &str,
    jwt_token: &str,
    algorithms: &[Algorithm],
    decode_options: &VerificationOptions,
) -> Option<Map<String, Value>> {
    let validation = decode_options.to_validation(algorithms, None, None);
    let key = DecodingKey::from_secret(hs_key.as_bytes());

    let result = decode::<Map<String, Value>>(jwt_token.trim(), &key, &validation)
        .map_err(VerificationFailure::from)
        .and_then(|decoded| {
            decode_options.check_claim_types(&decoded.claims)?;
            Ok(decoded.claims)
        });

    match result {
        Ok(claims) => Some(claims),
        Err(reason) => {
            tracing::debug!(reason = %reason, "Failed to decode HS JWT");
            None
        }
    }
}

fn decode_segment(token: &str, index: usize) -> Result<Map<String, Value>, JwtError> {
    let malformed = |reason: &str| {
        JwtError::Verification(VerificationFailure::Malformed(reason.to_string()))
    };

    let segments: Vec<&str> = token.trim().split('.').collect();
    if segments.len() != 3 {
        return Err(malformed("expected three dot-separated segments"));
    }
    let bytes = URL_SAFE_NO_PAD
        .decode(segments[index].trim_end_matches('='))
        .map_err(|_| malformed("segment is not base64url"))?;
    serde_json::from_slice(&bytes).map_err(|_| malformed("segment is not a JSON object"))
}

/// Read the token header without verifying anything
pub fn unverified_header(token: &str) -> Result<Map<String, Value>, JwtError> {
    decode_segment(token, 0)
}

/// Read the token payload without verifying anything. Only for trust-domain
/// selection and explicitly unverified development mode.
pub fn unverified_claims(token: &str) -> Result<Map<String, Value>, JwtError> {
    decode_segment(token, 1)
}

//! JWKS (JSON Web Key Set) support
//!
//! Key sets published by a remote issuer are kept as opaque JSON records so
//! that a record read back from the cache is exactly what the issuer served.
//! Typed accessors and key conversion are layered on top.

use std::str::FromStr;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Error type for JWK key conversion
#[derive(Debug)]
pub enum JwkError {
    /// Missing required parameter for the key type
    MissingParameter(String),
    /// Unsupported key type
    UnsupportedKeyType(String),
    /// Unsupported or unknown algorithm
    UnsupportedAlgorithm(String),
    /// Failed to create decoding key
    KeyCreationFailed(String),
}

impl std::fmt::Display for JwkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwkError::MissingParameter(param) => {
                write!(f, "Missing required JWK parameter: {}", param)
            }
            JwkError::UnsupportedKeyType(kty) => {
                write!(f, "Unsupported JWK key type: {}", kty)
            }
            JwkError::UnsupportedAlgorithm(alg) => {
                write!(f, "Unsupported JWK algorithm: {}", alg)
            }
            JwkError::KeyCreationFailed(reason) => {
                write!(f, "Failed to create decoding key: {}", reason)
            }
        }
    }
}

impl std::error::Error for JwkError {}

/// JSON Web Key Set as served from `/.well-known/jwks.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JwkCollection {
    /// The keys in the set, in the order the issuer published them
    pub keys: Vec<JwkRecord>,
}

impl JwkCollection {
    /// Find a key by its Key ID (kid)
    pub fn find_key_by_kid(&self, kid: &str) -> Option<&JwkRecord> {
        self.keys.iter().find(|k| k.kid() == Some(kid))
    }

    /// Get all keys of a specific type (RSA, EC, etc.)
    pub fn keys_by_type(&self, kty: &str) -> Vec<&JwkRecord> {
        self.keys.iter().filter(|k| k.kty() == Some(kty)).collect()
    }
}

/// A single JSON Web Key, kept verbatim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JwkRecord(Map<String, Value>);

impl JwkRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// All fields exactly as published
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn kid(&self) -> Option<&str> {
        self.0.get("kid").and_then(Value::as_str)
    }

    pub fn kty(&self) -> Option<&str> {
        self.0.get("kty").and_then(Value::as_str)
    }

    pub fn alg(&self) -> Option<&str> {
        self.0.get("alg").and_then(Value::as_str)
    }

    fn string_param(&self, name: &str, label: &str) -> Result<&str, JwkError> {
        self.0
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| JwkError::MissingParameter(label.to_string()))
    }

    /// Get the algorithm, defaulting based on key type if not specified
    pub fn algorithm(&self) -> Option<&str> {
        self.alg().or_else(|| self.default_algorithm())
    }

    fn default_algorithm(&self) -> Option<&'static str> {
        match self.kty()? {
            "RSA" => Some("RS256"),
            "EC" => match self.0.get("crv").and_then(Value::as_str) {
                Some("P-256") => Some("ES256"),
                Some("P-384") => Some("ES384"),
                _ => None,
            },
            "OKP" => Some("EdDSA"),
            "oct" => Some("HS256"),
            _ => None,
        }
    }

    /// Convert this JWK to a DecodingKey for JWT validation
    pub fn to_decoding_key(&self) -> Result<DecodingKey, JwkError> {
        let kty = self
            .kty()
            .ok_or_else(|| JwkError::MissingParameter("kty (key type)".to_string()))?;

        match kty {
            "RSA" => {
                let n = self.string_param("n", "n (modulus)")?;
                let e = self.string_param("e", "e (exponent)")?;
                DecodingKey::from_rsa_components(n, e)
                    .map_err(|e| JwkError::KeyCreationFailed(e.to_string()))
            }
            "EC" => {
                let x = self.string_param("x", "x (coordinate)")?;
                let y = self.string_param("y", "y (coordinate)")?;
                DecodingKey::from_ec_components(x, y)
                    .map_err(|e| JwkError::KeyCreationFailed(e.to_string()))
            }
            "OKP" => {
                let x = self.string_param("x", "x (public key)")?;
                DecodingKey::from_ed_components(x)
                    .map_err(|e| JwkError::KeyCreationFailed(e.to_string()))
            }
            "oct" => {
                let k = self.string_param("k", "k (key value)")?;
                let secret = URL_SAFE_NO_PAD
                    .decode(k.trim_end_matches('='))
                    .map_err(|e| JwkError::KeyCreationFailed(e.to_string()))?;
                Ok(DecodingKey::from_secret(&secret))
            }
            other => Err(JwkError::UnsupportedKeyType(other.to_string())),
        }
    }

    /// Get the jsonwebtoken Algorithm for this key
    pub fn jwt_algorithm(&self) -> Result<Algorithm, JwkError> {
        let alg_str = self.algorithm().ok_or_else(|| {
            JwkError::UnsupportedKeyType(self.kty().unwrap_or_default().to_string())
        })?;

        Algorithm::from_str(alg_str).map_err(|_| JwkError::UnsupportedAlgorithm(alg_str.to_string()))
    }
}

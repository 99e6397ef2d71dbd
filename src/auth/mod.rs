// Authentication module

pub mod jwk_cache;
pub mod jwks;
pub mod parser;
pub mod registry;
pub mod token;

pub use jwk_cache::{JwkCache, JwkCacheConfig, JwkCacheError, SharedJwkCache};
pub use jwks::{JwkCollection, JwkError, JwkRecord};
pub use parser::{
    decode_hs_jwt, unverified_claims, unverified_header, JwtError, JwtParser, ParserConfig,
    ParserKind, VerificationFailure, VerificationOptions,
};
pub use registry::{ParserRegistry, TrustDomain};
pub use token::TokenData;

use std::collections::HashMap;

use crate::error::AuthError;

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Verification(VerificationFailure::Expired) => AuthError::TokenExpired,
            JwtError::MissingKid | JwtError::KeyResolution(_) => {
                AuthError::KeyResolution(err.to_string())
            }
            JwtError::ScopeEncodingInvalid => AuthError::ScopeEncodingInvalid,
            other => AuthError::TokenInvalid(other.to_string()),
        }
    }
}

// Helper function to get header value with case-insensitive matching
fn get_header_case_insensitive<'a>(
    headers: &'a HashMap<String, String>,
    header_name: &str,
) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(header_name))
        .map(|(_, value)| value.as_str())
}

/// Token from `Authorization: Bearer <token>`. The scheme name is matched
/// case-insensitively; anything else is treated as no token.
pub fn extract_bearer_token(headers: &HashMap<String, String>) -> Option<String> {
    let value = get_header_case_insensitive(headers, "Authorization")?.trim();
    let (scheme, token) = value.split_once(char::is_whitespace)?;
    if !scheme.eq_ignore_ascii_case("Bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

pub fn extract_header_token(
    headers: &HashMap<String, String>,
    header_name: &str,
) -> Option<String> {
    get_header_case_insensitive(headers, header_name)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

// Static API key check for the `X-Api-Key` header
//
// Keys are hashed before comparison so the comparison itself runs in constant
// time and is independent of key length.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::auth::extract_header_token;
use crate::config::Settings;
use crate::constants::API_KEY_HEADER;
use crate::error::AuthError;
use crate::pipeline::RequestContext;

fn hash_api_key(key: &str) -> [u8; 32] {
    Sha256::digest(key.as_bytes()).into()
}

/// Compare two keys in constant time
pub fn validate_api_key(provided: &str, expected: &str) -> bool {
    hash_api_key(provided)[..]
        .ct_eq(&hash_api_key(expected)[..])
        .into()
}

/// Checks requests against one configured key
#[derive(Clone)]
pub struct ApiKeyCheck {
    expected_hash: [u8; 32],
}

impl std::fmt::Debug for ApiKeyCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyCheck").finish_non_exhaustive()
    }
}

impl ApiKeyCheck {
    pub fn new(expected_key: &str) -> Self {
        Self {
            expected_hash: hash_api_key(expected_key),
        }
    }

    /// `None` when the settings carry no `API_KEY`
    pub fn from_settings(settings: &Settings) -> Option<Self> {
        settings.api_key.as_deref().map(Self::new)
    }

    /// A missing header is a 401, a wrong key a 403
    pub fn check(&self, request: &RequestContext) -> Result<(), AuthError> {
        let result = match extract_header_token(request.headers(), API_KEY_HEADER) {
            None => Err(AuthError::ApiKeyMissing),
            Some(provided) => {
                if bool::from(hash_api_key(&provided)[..].ct_eq(&self.expected_hash[..])) {
                    Ok(())
                } else {
                    Err(AuthError::ApiKeyInvalid)
                }
            }
        };

        if let Err(e) = &result {
            tracing::debug!(reason = %e, "API key rejected");
            crate::metrics::AuthMetrics::global().record_outcome(e.kind());
        }
        result
    }
}

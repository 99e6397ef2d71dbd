// Constants module - centralized default values for configuration
//
// Environment variable names and the defaults applied when they are unset.
// Keeping them here lets settings, the CLI and the tests agree on spelling.

// =============================================================================
// Environment variable names
// =============================================================================

pub const ENV_HS_KEY: &str = "HS_KEY";
pub const ENV_HS_ISSUER: &str = "HS_ISSUER";
pub const ENV_PROXY_URL: &str = "PROXY_URL";
pub const ENV_IGNORE_JWT_VALIDATION: &str = "IGNORE_JWT_VALIDATION";
pub const ENV_ENVIRONMENT: &str = "ENVIRONMENT";
pub const ENV_VALID_USER_ID_KEYS: &str = "VALID_USER_ID_KEYS";
pub const ENV_HS_METADATA_KEY: &str = "HS_METADATA_KEY";
pub const ENV_HS_SCOPE_KEY: &str = "HS_SCOPE_KEY";
pub const ENV_AUTH0_DOMAIN: &str = "AUTH0_DOMAIN";
pub const ENV_AUTH0_AUDIENCE: &str = "AUTH0_AUDIENCE";
pub const ENV_AUTH0_METADATA: &str = "AUTH0_METADATA";
pub const ENV_AUTH0_SCOPE_KEY: &str = "AUTH0_SCOPE_KEY";
pub const ENV_AUTH0_ALGORITHMS: &str = "AUTH0_ALGORITHMS";
pub const ENV_AUTH0_HS_KEY: &str = "AUTH0_HS_KEY";
pub const ENV_API_KEY: &str = "API_KEY";
pub const ENV_JWKS_TIMEOUT_SECS: &str = "JWKS_TIMEOUT_SECS";
pub const ENV_LOG_FORMAT: &str = "LOG_FORMAT";

/// Every variable read by `Settings::from_env`
pub const SETTINGS_ENV_VARS: &[&str] = &[
    ENV_HS_KEY,
    ENV_HS_ISSUER,
    ENV_PROXY_URL,
    ENV_IGNORE_JWT_VALIDATION,
    ENV_ENVIRONMENT,
    ENV_VALID_USER_ID_KEYS,
    ENV_HS_METADATA_KEY,
    ENV_HS_SCOPE_KEY,
    ENV_AUTH0_DOMAIN,
    ENV_AUTH0_AUDIENCE,
    ENV_AUTH0_METADATA,
    ENV_AUTH0_SCOPE_KEY,
    ENV_AUTH0_ALGORITHMS,
    ENV_AUTH0_HS_KEY,
    ENV_API_KEY,
    ENV_JWKS_TIMEOUT_SECS,
];

// =============================================================================
// Trust domain defaults
// =============================================================================

/// Environment name treated as production. Also the value assumed when
/// `ENVIRONMENT` is unset.
pub const PRODUCTION_ENVIRONMENT: &str = "PRODUCTION";

/// Default claim holding provider metadata for internally issued tokens
pub const DEFAULT_METADATA_KEY: &str = "metadata";

/// Default claim holding the space-delimited scope list
pub const DEFAULT_SCOPE_KEY: &str = "scope";

/// Algorithms accepted for shared-secret tokens
pub const DEFAULT_HS_ALGORITHMS: &[&str] = &["HS256", "HS384", "HS512"];

/// Algorithms accepted from the remote identity provider
pub const DEFAULT_AUTH0_ALGORITHMS: &[&str] = &["RS256"];

/// Algorithm used by the identity provider for login-handshake tokens
pub const DEFAULT_AUTH0_LOGIN_ALGORITHM: &str = "HS256";

/// Default claim names tried, in order, to resolve the current user id
pub const DEFAULT_VALID_USER_ID_KEYS: &[&str] = &["sub"];

/// Value reported when no user id claim is present
pub const UNKNOWN_USER_ID: &str = "unknown";

// =============================================================================
// JWKS defaults
// =============================================================================

/// Path of the key set below an issuer base URL
pub const JWKS_WELL_KNOWN_PATH: &str = ".well-known/jwks.json";

/// Default JWKS HTTP request timeout in seconds
pub const DEFAULT_JWKS_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// HTTP
// =============================================================================

/// Header carrying the static API key
pub const API_KEY_HEADER: &str = "X-Api-Key";

/// Name of the bearer security scheme in generated OpenAPI documents
pub const BEARER_SCHEME_NAME: &str = "bearerAuth";

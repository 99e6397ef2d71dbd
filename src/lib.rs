// Authgate library
// JWT verification and scope-based route authorization

pub mod api_key;
pub mod auth;
pub mod authorization;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod openapi;
pub mod pipeline;
pub mod protection;

pub use auth::{JwtParser, ParserRegistry, TokenData};
pub use config::Settings;
pub use error::{AuthError, ServiceError};
pub use protection::{ProtectedRoute, ProtectionGate, ValidatedUser};

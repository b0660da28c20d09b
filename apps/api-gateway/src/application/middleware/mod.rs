pub mod auth;
pub mod rate_limit;

pub use auth::{GroupsClaim, RawClaims, TokenVerifier, require_auth};
pub use rate_limit::{ClientIp, RateLimits};

//! Authentication module
//!
//! Session tokens, the session cookie, request gating, rate limiting and the
//! login/register/logout/verify endpoints.

mod claims;
mod cookie;
mod csrf;
mod extract;
mod password;
mod rate_limit;
mod token;
mod validation;

pub mod gate;
pub mod handlers;

pub use claims::{Claims, Role, SessionClaim, UnknownRole};
pub use cookie::SessionCookies;
pub use csrf::check_origin;
pub use extract::{
    get_current_claim, require_admin_role, require_auth, CurrentClaim, RequireAdmin, RequireAuth,
};
pub use gate::{authorize, resolve_claims};
pub use password::{hash_password, verify_password};
pub use rate_limit::{
    client_key, RateDecision, RateLimitConfig, RateLimiter, RatePolicy, RateWindow,
};
pub use token::TokenCodec;
pub use validation::{parse_body, LoginRequest, RegisterRequest};

//! Authentication module for HeartBalance

pub mod jwt;
pub mod middleware;

pub use jwt::{JwtError, JwtManager, SupabaseClaims};
pub use middleware::{require_auth, require_premium, AuthState, AuthUser};

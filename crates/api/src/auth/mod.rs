//! Authentication module for BizReport

pub mod jwt;
pub mod middleware;

pub use jwt::{Claims, JwtError, JwtManager};
pub use middleware::{
    optional_auth, require_auth, AuthError, AuthState, AuthUser, PLATFORM_ADMIN_ROLE,
};

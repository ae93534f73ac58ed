//! Bearer token handling.

pub mod jwt;

pub use jwt::{HmacJwt, JwtError, TokenClaims};

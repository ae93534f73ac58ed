//! # geoproxy-auth
//!
//! Request authentication for the geoproxy gateway.
//!
//! ## Modules
//!
//! - [`config`] - Static credentials and token settings
//! - [`gate`] - The accept/reject decision applied to every request
//! - [`basic`] - HTTP Basic header parsing
//! - [`token`] - HS256 token minting and verification
//! - [`error`] - Rejection reasons and their diagnostics

pub mod basic;
pub mod config;
pub mod error;
pub mod gate;
pub mod token;

pub use config::{AuthConfig, ConfigError};
pub use error::AuthError;
pub use gate::{AuthGate, Principal};
pub use token::{HmacJwt, JwtError, TokenClaims};

//! HS256 bearer token minting and verification.
//!
//! Tokens are signed with a shared secret. Verification checks the signature
//! and, when present, the `exp` claim; the issuer is carried for logging but
//! not enforced.

use std::time::Duration;

use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during JWT operations.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// Failed to encode a token.
    #[error("Failed to encode token: {message}")]
    EncodingError { message: String },

    /// The token could not be parsed.
    #[error("Malformed token: {message}")]
    Malformed { message: String },

    /// The token has expired.
    #[error("Token expired")]
    Expired,

    /// The token signature is invalid.
    #[error("Invalid signature")]
    InvalidSignature,

    /// The token was signed with an algorithm other than HMAC.
    #[error("Unsupported algorithm: {message}")]
    UnsupportedAlgorithm { message: String },

    /// The token claims are invalid.
    #[error("Invalid claims: {message}")]
    InvalidClaims { message: String },
}

impl JwtError {
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                Self::UnsupportedAlgorithm {
                    message: err.to_string(),
                }
            }
            ErrorKind::ImmatureSignature | ErrorKind::MissingRequiredClaim(_) => {
                Self::InvalidClaims {
                    message: err.to_string(),
                }
            }
            _ => Self::malformed(err.to_string()),
        }
    }
}

// ============================================================================
// Claims
// ============================================================================

/// Claims carried by gateway tokens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenClaims {
    /// Issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Issued at (Unix timestamp).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Expiration time (Unix timestamp).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

impl TokenClaims {
    /// Claims issued now and expiring after `lifetime`.
    #[must_use]
    pub fn issued_now(issuer: impl Into<String>, lifetime: Duration) -> Self {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let lifetime = i64::try_from(lifetime.as_secs()).unwrap_or(i64::MAX);
        Self {
            iss: Some(issuer.into()),
            iat: Some(now),
            exp: Some(now.saturating_add(lifetime)),
        }
    }
}

// ============================================================================
// Service
// ============================================================================

/// Shared-secret JWT service.
#[derive(Clone)]
pub struct HmacJwt {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for HmacJwt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacJwt").finish_non_exhaustive()
    }
}

impl HmacJwt {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        validation.leeway = 0;
        validation.validate_aud = false;
        // Tokens without `exp` never expire; tokens with one are checked.
        validation.set_required_spec_claims::<&str>(&[]);

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Sign claims with HS256.
    pub fn mint(&self, claims: &TokenClaims) -> Result<String, JwtError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key).map_err(|e| {
            JwtError::EncodingError {
                message: e.to_string(),
            }
        })
    }

    /// Verify a token's signature and expiry and return its claims.
    pub fn verify(&self, token: &str) -> Result<TokenClaims, JwtError> {
        if token.is_empty() {
            return Err(JwtError::malformed("jwt must be provided"));
        }
        let data = decode::<TokenClaims>(token, &self.decoding_key, &self.validation)?;
        Ok(data.claims)
    }
}

//! The authentication gate.
//!
//! Every request passes through [`AuthGate::check`] before routing. The
//! decision depends only on the `Authorization` header:
//!
//! 1. absent → rejected
//! 2. `Bearer <token>` (any case) → token signature and expiry verified
//! 3. anything else → parsed as Basic and compared with the configured pair
//!
//! The gate holds no per-request state.

use crate::basic::parse_basic_auth;
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::token::HmacJwt;

const BEARER_PREFIX: &str = "bearer";

/// Identity of an accepted request, for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Token { issuer: Option<String> },
    Basic { user: String },
}

/// Accept/reject decision over bearer tokens and static basic credentials.
#[derive(Debug, Clone)]
pub struct AuthGate {
    basic_user: String,
    basic_pass: String,
    jwt: HmacJwt,
}

impl AuthGate {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            basic_user: config.basic_user.clone(),
            basic_pass: config.basic_pass.clone(),
            jwt: HmacJwt::new(config.jwt_key.as_bytes()),
        }
    }

    /// Decide whether a request carrying `header` may proceed.
    pub fn check(&self, header: Option<&str>) -> Result<Principal, AuthError> {
        let header = header.ok_or(AuthError::MissingCredentials)?;

        if let Some(token) = strip_bearer(header) {
            let claims = self.jwt.verify(token)?;
            return Ok(Principal::Token { issuer: claims.iss });
        }

        let (name, pass) = parse_basic_auth(header).ok_or(AuthError::MalformedCredentials)?;
        if name != self.basic_user || pass != self.basic_pass {
            return Err(AuthError::CredentialMismatch { name, pass });
        }

        Ok(Principal::Basic { user: name })
    }
}

/// Returns the token when `header` starts with `bearer`, ignoring case.
fn strip_bearer(header: &str) -> Option<&str> {
    let prefix = header.get(..BEARER_PREFIX.len())?;
    if prefix.eq_ignore_ascii_case(BEARER_PREFIX) {
        Some(header[BEARER_PREFIX.len()..].trim())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{JwtError, TokenClaims};
    use std::time::Duration;

    fn gate() -> AuthGate {
        AuthGate::new(&AuthConfig::default())
    }

    fn token(secret: &[u8]) -> String {
        HmacJwt::new(secret)
            .mint(&TokenClaims::issued_now("iss", Duration::from_secs(60)))
            .unwrap()
    }

    #[test]
    fn test_missing_header_rejected() {
        assert!(matches!(gate().check(None), Err(AuthError::MissingCredentials)));
    }

    #[test]
    fn test_valid_basic_accepted() {
        // "user:pass"
        let principal = gate().check(Some("Basic dXNlcjpwYXNz")).unwrap();
        assert_eq!(principal, Principal::Basic { user: "user".into() });
    }

    #[test]
    fn test_invalid_basic_rejected_with_attempt() {
        // "user:nope"
        let err = gate().check(Some("Basic dXNlcjpub3Bl")).unwrap_err();
        match err {
            AuthError::CredentialMismatch { name, pass } => {
                assert_eq!(name, "user");
                assert_eq!(pass, "nope");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_unparsable_header_rejected() {
        assert!(matches!(
            gate().check(Some("Token abc")),
            Err(AuthError::MalformedCredentials)
        ));
    }

    #[test]
    fn test_valid_bearer_accepted_any_case() {
        let token = token(b"key");
        for scheme in ["Bearer", "bearer", "BEARER"] {
            let principal = gate().check(Some(&format!("{scheme} {token}"))).unwrap();
            assert_eq!(
                principal,
                Principal::Token {
                    issuer: Some("iss".into())
                }
            );
        }
    }

    #[test]
    fn test_bearer_with_wrong_key_rejected() {
        let header = format!("Bearer {}", token(b"wrong"));
        assert!(matches!(
            gate().check(Some(&header)),
            Err(AuthError::InvalidToken(JwtError::InvalidSignature))
        ));
    }

    #[test]
    fn test_empty_bearer_rejected() {
        assert!(matches!(
            gate().check(Some("Bearer")),
            Err(AuthError::InvalidToken(JwtError::Malformed { .. }))
        ));
    }

    #[test]
    fn test_strip_bearer_handles_short_and_multibyte_headers() {
        assert_eq!(strip_bearer("Bear"), None);
        assert_eq!(strip_bearer("bearé"), None);
        assert_eq!(strip_bearer("Bearer  abc "), Some("abc"));
    }
}

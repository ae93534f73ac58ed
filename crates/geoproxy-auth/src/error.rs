//! Authentication rejection reasons.

use serde_json::{Map, Value};

use crate::token::JwtError;

/// Why the gate rejected a request.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No `Authorization` header was sent.
    #[error("Missing Authorization header")]
    MissingCredentials,

    /// A bearer token failed verification.
    #[error("Invalid bearer token: {0}")]
    InvalidToken(#[from] JwtError),

    /// The header is neither a bearer token nor parsable basic credentials.
    #[error("Malformed Authorization header")]
    MalformedCredentials,

    /// Basic credentials were parsed but do not match the configured pair.
    #[error("Invalid credentials for user '{name}'")]
    CredentialMismatch { name: String, pass: String },
}

impl AuthError {
    /// Diagnostic fields attached to the client-visible rejection.
    ///
    /// Token failures report `jwt_error`; credential mismatches echo the
    /// attempted `name` and `pass`.
    #[must_use]
    pub fn diagnostics(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        match self {
            Self::MissingCredentials | Self::MalformedCredentials => {}
            Self::InvalidToken(e) => {
                fields.insert("jwt_error".into(), Value::String(e.to_string()));
            }
            Self::CredentialMismatch { name, pass } => {
                fields.insert("name".into(), Value::String(name.clone()));
                fields.insert("pass".into(), Value::String(pass.clone()));
            }
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostics_per_kind() {
        assert!(AuthError::MissingCredentials.diagnostics().is_empty());
        assert!(AuthError::MalformedCredentials.diagnostics().is_empty());

        let token = AuthError::InvalidToken(JwtError::Expired).diagnostics();
        assert_eq!(token["jwt_error"], "Token expired");

        let mismatch = AuthError::CredentialMismatch {
            name: "bob".into(),
            pass: "secret".into(),
        }
        .diagnostics();
        assert_eq!(mismatch["name"], "bob");
        assert_eq!(mismatch["pass"], "secret");
    }
}

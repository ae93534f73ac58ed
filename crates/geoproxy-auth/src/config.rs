//! Authentication configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Errors produced while validating [`AuthConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Static credentials accepted by the gate, plus the token signing settings.
///
/// ```toml
/// [auth]
/// basic_user = "user"
/// basic_pass = "pass"
/// jwt_key = "key"
/// jwt_issuer = "iss"
/// token_lifetime = "3years"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_basic_user")]
    pub basic_user: String,

    #[serde(default = "default_basic_pass")]
    pub basic_pass: String,

    /// HMAC secret used to verify (and mint) bearer tokens.
    #[serde(default = "default_jwt_key")]
    pub jwt_key: String,

    /// Issuer written into minted tokens.
    #[serde(default = "default_jwt_issuer")]
    pub jwt_issuer: String,

    /// Lifetime of tokens minted by the operator CLI.
    #[serde(default = "default_token_lifetime", with = "humantime_serde")]
    pub token_lifetime: Duration,
}

fn default_basic_user() -> String {
    "user".into()
}
fn default_basic_pass() -> String {
    "pass".into()
}
fn default_jwt_key() -> String {
    "key".into()
}
fn default_jwt_issuer() -> String {
    "iss".into()
}
// Three (Julian) years, as humantime counts them.
fn default_token_lifetime() -> Duration {
    Duration::from_secs(3 * 31_557_600)
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            basic_user: default_basic_user(),
            basic_pass: default_basic_pass(),
            jwt_key: default_jwt_key(),
            jwt_issuer: default_jwt_issuer(),
            token_lifetime: default_token_lifetime(),
        }
    }
}

impl AuthConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_key.is_empty() {
            return Err(ConfigError::InvalidValue(
                "auth.jwt_key cannot be empty".to_string(),
            ));
        }
        if self.basic_user.contains(':') {
            return Err(ConfigError::InvalidValue(
                "auth.basic_user cannot contain ':'".to_string(),
            ));
        }
        if self.token_lifetime.is_zero() {
            return Err(ConfigError::InvalidValue(
                "auth.token_lifetime must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AuthConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.token_lifetime, Duration::from_secs(94_672_800));
    }

    #[test]
    fn test_rejects_empty_key() {
        let config = AuthConfig {
            jwt_key: String::new(),
            ..AuthConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_rejects_colon_in_user() {
        let config = AuthConfig {
            basic_user: "a:b".into(),
            ..AuthConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parses_humantime_expiry() {
        let config: AuthConfig = serde_json::from_str(r#"{"token_lifetime": "3days"}"#).unwrap();
        assert_eq!(config.token_lifetime, Duration::from_secs(3 * 24 * 3600));
        assert_eq!(config.basic_user, "user");
    }
}

use std::time::Duration;

use anyhow::{Context, Result};
use geoproxy_auth::{AuthConfig, HmacJwt, TokenClaims};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::cli::{TokenArgs, VerifyArgs};
use crate::output::{print_field, print_success};

/// Sign a token with the configured key.
pub fn mint(auth: &AuthConfig, issuer: Option<&str>, lifetime: Duration) -> Result<String> {
    let issuer = issuer.unwrap_or(&auth.jwt_issuer);
    let claims = TokenClaims::issued_now(issuer, lifetime);
    HmacJwt::new(auth.jwt_key.as_bytes())
        .mint(&claims)
        .context("Failed to sign token")
}

pub fn token(auth: &AuthConfig, args: &TokenArgs) -> Result<()> {
    let lifetime = args.expires.unwrap_or(auth.token_lifetime);
    let token = mint(auth, args.issuer.as_deref(), lifetime)?;
    println!("{token}");
    print_success(&format!(
        "Token valid for {}",
        humantime::format_duration(lifetime)
    ));
    Ok(())
}

pub fn verify(auth: &AuthConfig, args: &VerifyArgs) -> Result<()> {
    let raw = args.token.trim();
    let raw = match raw.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("bearer ") => raw[7..].trim(),
        _ => raw,
    };

    let claims = HmacJwt::new(auth.jwt_key.as_bytes())
        .verify(raw)
        .context("Token rejected")?;

    println!("{}", serde_json::to_string_pretty(&claims)?);
    if let Some(exp) = claims.exp {
        print_field("Expires", &format_timestamp(exp));
    }
    print_success("Token accepted");
    Ok(())
}

fn format_timestamp(ts: i64) -> String {
    OffsetDateTime::from_unix_timestamp(ts)
        .ok()
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_else(|| ts.to_string())
}

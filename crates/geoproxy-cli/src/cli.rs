use std::time::Duration;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "geoproxy")]
#[command(about = "Mint and inspect geoproxy bearer tokens")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Gateway configuration file (signing key and issuer are read from [auth])
    #[arg(short, long, global = true, env = "GEOPROXY_CONFIG", default_value = "geoproxy.toml")]
    pub config: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Mint a bearer token accepted by the gateway
    Token(TokenArgs),
    /// Verify a token against the configured key and show its claims
    Verify(VerifyArgs),
}

#[derive(clap::Args)]
pub struct TokenArgs {
    /// Token lifetime, e.g. "90d", "3years", "12h" (defaults to auth.token_lifetime)
    #[arg(short, long, value_parser = parse_lifetime)]
    pub expires: Option<Duration>,
    /// Issuer claim (defaults to auth.jwt_issuer)
    #[arg(short, long)]
    pub issuer: Option<String>,
}

#[derive(clap::Args)]
pub struct VerifyArgs {
    /// The token, with or without a "Bearer " prefix
    pub token: String,
}

fn parse_lifetime(raw: &str) -> Result<Duration, String> {
    let lifetime = humantime::parse_duration(raw).map_err(|e| e.to_string())?;
    if lifetime.is_zero() {
        return Err("lifetime must be > 0".into());
    }
    Ok(lifetime)
}

mod cli;
mod commands;
mod output;

use anyhow::{Result, anyhow};
use clap::Parser;
use geoproxy_server::config::loader::load_config;

use cli::{Cli, Commands};
use output::print_error;

fn main() {
    if let Err(e) = run() {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let cfg = load_config(Some(cli.config.as_str())).map_err(|e| anyhow!("{}: {e}", cli.config))?;

    match &cli.command {
        Commands::Token(args) => commands::token::token(&cfg.auth, args)?,
        Commands::Verify(args) => commands::token::verify(&cfg.auth, args)?,
    }
    Ok(())
}

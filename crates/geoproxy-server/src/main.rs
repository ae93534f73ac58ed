use std::env;
use std::time::Instant;

use geoproxy_server::config::loader::{DEFAULT_CONFIG_PATH, load_config};
use geoproxy_server::{ProcessLauncher, WorkerSupervisor, worker};

/// How the configuration path was determined.
#[derive(Debug, Clone, Copy)]
enum ConfigSource {
    /// From --config CLI argument
    CliArgument,
    /// From GEOPROXY_CONFIG environment variable
    EnvironmentVariable,
    /// Default path (geoproxy.toml)
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CliArgument => write!(f, "CLI argument (--config)"),
            Self::EnvironmentVariable => write!(f, "environment variable (GEOPROXY_CONFIG)"),
            Self::Default => write!(f, "default"),
        }
    }
}

#[tokio::main]
async fn main() {
    // Load .env file if present (before anything else)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist - it's optional
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound) {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    geoproxy_server::init_tracing();

    let (config_path, source) = resolve_config_path();
    let cfg = match load_config(Some(config_path.as_str())) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };
    geoproxy_server::apply_logging_level(&cfg.logging.level);

    if env::args().any(|arg| arg == "--worker") {
        if let Err(e) = worker::run_worker(cfg, shutdown_signal()).await {
            tracing::error!(error = %format!("{e:#}"), "worker failed");
            std::process::exit(1);
        }
        return;
    }

    tracing::info!(
        path = %config_path,
        source = %source,
        "Configuration loaded"
    );

    let launcher = match ProcessLauncher::current_exe(&config_path) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Cannot locate server executable: {e}");
            std::process::exit(2);
        }
    };

    let started = Instant::now();
    let workers = cfg.worker_count();
    let mut supervisor = WorkerSupervisor::new(launcher);
    if let Err(e) = supervisor.start(workers).await {
        tracing::error!(error = %e, elapsed_ms = started.elapsed().as_millis() as u64, "startup failed");
        std::process::exit(1);
    }
    tracing::info!(
        workers,
        addr = %cfg.addr(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "workers initiated"
    );

    let handle = supervisor.handle();
    tokio::spawn(async move {
        shutdown_signal().await;
        handle.shutdown();
    });

    if let Err(e) = supervisor.run().await {
        tracing::error!(error = %e, "supervisor stopped");
        std::process::exit(1);
    }
}

/// Resolve the configuration file path.
///
/// Priority order:
/// 1. CLI argument: --config <path>
/// 2. Environment variable: GEOPROXY_CONFIG
/// 3. Default: geoproxy.toml
fn resolve_config_path() -> (String, ConfigSource) {
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            if let Some(path) = args.next() {
                return (path, ConfigSource::CliArgument);
            }
        }
    }

    if let Ok(path) = env::var("GEOPROXY_CONFIG") {
        if !path.is_empty() {
            return (path, ConfigSource::EnvironmentVariable);
        }
    }

    (DEFAULT_CONFIG_PATH.to_string(), ConfigSource::Default)
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}

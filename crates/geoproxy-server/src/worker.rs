//! Worker process entry point.

use std::future::Future;
use std::io::Write;

use crate::config::AppConfig;
use crate::server::{AppState, bind_listener, build_app, upstream_routes};
use crate::supervisor::{ReadyMessage, WORKER_SLOT_ENV};

/// Run one request-handling worker until `shutdown` resolves.
///
/// Connects the cache store, binds the shared port, then announces readiness
/// on stdout. A failure before that point is announced as `{"ok": false}`.
pub async fn run_worker(
    cfg: AppConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let started = async {
        let state = AppState::from_config(&cfg).await?;
        let listener = bind_listener(cfg.addr())?;
        anyhow::Ok((state, listener))
    }
    .await;

    let (state, listener) = match started {
        Ok(parts) => parts,
        Err(e) => {
            let _ = announce(&ReadyMessage::failed(format!("{e:#}")));
            return Err(e);
        }
    };

    let app = build_app(state, &upstream_routes(&cfg));
    announce(&ReadyMessage::ready())?;
    let slot = std::env::var(WORKER_SLOT_ENV).unwrap_or_default();
    tracing::info!(pid = std::process::id(), worker.slot = %slot, addr = %cfg.addr(), "worker started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Write the handshake line to stdout.
pub fn announce(message: &ReadyMessage) -> anyhow::Result<()> {
    let mut out = std::io::stdout().lock();
    serde_json::to_writer(&mut out, message)?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}

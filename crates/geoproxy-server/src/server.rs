use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{Request, State},
    http::Uri,
    middleware,
    response::Response,
    routing::{any, get},
};
use geoproxy_auth::AuthGate;
use geoproxy_cache::CacheStore;
use serde_json::{Map, Value};
use tokio::net::{TcpListener, TcpSocket};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::gateway::{
    ErrorPipeline, GatewayError, UpstreamClient, UpstreamRoute, geotz, proxy,
};
use crate::middleware as app_middleware;
use crate::timezone::{TimezoneLookup, TzfLookup};

/// Everything a request handler needs, shared by all requests of a worker.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthGate>,
    pub cache: CacheStore,
    pub upstream: UpstreamClient,
    pub timezones: Arc<dyn TimezoneLookup>,
    pub errors: ErrorPipeline,
    pub body_limit: usize,
}

impl AppState {
    /// Build the production state: Redis-backed cache when enabled, bundled
    /// timezone polygons, and an error pipeline that exits on fatal errors.
    ///
    /// An unreachable Redis is a startup failure.
    pub async fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        let cache = if cfg.redis.enabled {
            CacheStore::connect_redis(&cfg.redis_options(), cfg.cache_ttl()).await?
        } else {
            tracing::info!(ttl_secs = cfg.cache.ttl_secs, "redis disabled, using in-process cache");
            CacheStore::new_local(cfg.cache_ttl())
        };

        let http = reqwest::Client::builder()
            .user_agent(concat!("geoproxy/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let timezones = tokio::task::spawn_blocking(TzfLookup::new).await?;

        Ok(Self {
            auth: Arc::new(AuthGate::new(&cfg.auth)),
            cache,
            upstream: UpstreamClient::new(http),
            timezones: Arc::new(timezones),
            errors: ErrorPipeline::exit_on_fatal(),
            body_limit: cfg.server.body_limit_bytes,
        })
    }
}

/// Upstream routes declared in the configuration.
pub fn upstream_routes(cfg: &AppConfig) -> Vec<UpstreamRoute> {
    cfg.upstreams
        .iter()
        .map(|(name, upstream)| UpstreamRoute::new(name, &upstream.url, upstream.timeout()))
        .collect()
}

pub fn build_app(state: AppState, routes: &[UpstreamRoute]) -> Router {
    let mut router = Router::new().route(
        "/geotz",
        get(geotz::handle_geotz).fallback(not_found),
    );

    for route in routes {
        let mount = route.mount_path();
        let route = Arc::new(route.clone());
        let handler = move |State(state): State<AppState>, req: Request| {
            let route = route.clone();
            async move { proxy::handle_proxy(state, route, req).await }
        };
        router = router
            .route(&mount, any(handler.clone()))
            .route(&format!("{mount}/"), any(handler.clone()))
            .route(&format!("{mount}/{{*rest}}"), any(handler));
    }

    let errors = state.errors.clone();
    router
        .fallback(not_found)
        // Outermost first: request id, trace, auth gate, panic guard, routes.
        .layer(CatchPanicLayer::custom(move |panic: Box<dyn Any + Send + 'static>| {
            errors.respond(GatewayError::Internal(panic_message(panic.as_ref())))
        }))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            app_middleware::auth_gate,
        ))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    let req_id = req
                        .extensions()
                        .get::<axum::http::HeaderValue>()
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = Empty,
                        request_id = %req_id
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: Duration, span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(middleware::from_fn(app_middleware::request_id))
        .with_state(state)
}

async fn not_found(State(state): State<AppState>, uri: Uri) -> Response {
    let mut context = Map::new();
    context.insert("path".into(), Value::String(uri.path().to_string()));
    state.errors.respond(GatewayError::not_found(context))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("handler panicked: {s}")
    } else {
        "handler panicked".to_string()
    }
}

/// Bind a listener that other workers can bind to as well.
///
/// On unix every worker sets `SO_REUSEPORT` on the same address and the
/// kernel spreads incoming connections across them.
pub fn bind_listener(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
    socket.set_reuseport(true)?;
    socket.bind(addr)?;
    socket.listen(1024)
}

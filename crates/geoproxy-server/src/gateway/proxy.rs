//! Cache-aside proxy handler for upstream routes.

use std::sync::Arc;

use axum::{
    Json,
    extract::Request,
    response::{IntoResponse, Response},
};
use geoproxy_cache::canonicalize;
use serde_json::Value;
use tracing::{debug, instrument};

use super::descriptor::{descriptor_from_parts, read_body};
use super::error::GatewayError;
use super::upstream::UpstreamRoute;
use crate::server::AppState;

/// Serve a request for `route` from cache, or from the upstream on a miss.
///
/// Only successful upstream payloads are cached; every failure goes to the
/// error pipeline and leaves the cache untouched.
pub async fn handle_proxy(state: AppState, route: Arc<UpstreamRoute>, request: Request) -> Response {
    match proxy_request(&state, &route, request).await {
        Ok(value) => Json(value).into_response(),
        Err(err) => state.errors.respond(err),
    }
}

#[instrument(skip_all, fields(upstream = %route.name(), path = %request.uri().path()))]
async fn proxy_request(
    state: &AppState,
    route: &UpstreamRoute,
    request: Request,
) -> Result<Value, GatewayError> {
    let (parts, body) = request.into_parts();
    let bytes = read_body(body, state.body_limit).await?;
    let descriptor = descriptor_from_parts(&parts.method, &parts.uri, &parts.headers, &bytes)?;
    let key = canonicalize(&descriptor)?;

    if let Some(hit) = state.cache.get(&key).await? {
        debug!("served from cache");
        return Ok(hit);
    }

    let value = state
        .upstream
        .fetch(route, &parts.method, &descriptor)
        .await
        .into_result()?;

    state.cache.set(&key, &value).await;
    Ok(value)
}

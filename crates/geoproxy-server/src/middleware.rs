use axum::{
    body::Body,
    extract::State,
    http::{HeaderName, HeaderValue, Request, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use serde_json::Value;
use uuid::Uuid;

use crate::gateway::GatewayError;
use crate::gateway::descriptor::{parse_body_lenient, read_body};
use crate::server::AppState;

// =============================================================================
// Authentication Middleware
// =============================================================================

/// Applies the auth gate to every request before routing.
///
/// Rejections are answered as `AccessForbidden` with the request path, the
/// parsed body and the gate's diagnostics.
pub async fn auth_gate(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let rejection = match state.auth.check(header) {
        Ok(principal) => {
            tracing::debug!(?principal, "request authenticated");
            return next.run(req).await;
        }
        Err(e) => e,
    };

    tracing::debug!(path = %req.uri().path(), reason = %rejection, "request rejected by auth gate");

    let path = req.uri().path().to_string();
    let (parts, body) = req.into_parts();
    let body = match read_body(body, state.body_limit).await {
        Ok(bytes) => parse_body_lenient(&parts.headers, &bytes),
        Err(_) => Value::Object(Default::default()),
    };

    let mut context = rejection.diagnostics();
    context.insert("path".into(), Value::String(path));
    context.insert("body".into(), body);

    state.errors.respond(GatewayError::access_forbidden(context))
}

/// Tags each request with `x-request-id`, keeping a caller-supplied one, and
/// echoes it on the response. The value is also stored as a request
/// extension for the trace span.
pub async fn request_id(mut req: Request<Body>, next: Next) -> Response {
    let name = HeaderName::from_static("x-request-id");
    let id = match req.headers().get(&name) {
        Some(id) => id.clone(),
        None => HeaderValue::try_from(Uuid::new_v4().to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("unknown")),
    };
    req.extensions_mut().insert(id.clone());

    let mut res = next.run(req).await;
    res.headers_mut().insert(name, id);
    res
}

//! Gateway error taxonomy and the terminal error pipeline.
//!
//! Every failure a request can hit is a [`GatewayError`]. Known kinds are
//! answered with `{status, message, ...context}`; internal failures are
//! fatal to the worker, which the supervisor then replaces.

use std::fmt;
use std::sync::Arc;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use geoproxy_cache::{CacheError, KeyError};
use serde_json::{Map, Value};

/// Extra fields merged into an error body.
pub type ErrorContext = Map<String, Value>;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Access forbidden")]
    AccessForbidden { context: ErrorContext },

    #[error("Bad request")]
    BadRequest { context: ErrorContext },

    #[error("Not found")]
    NotFound { context: ErrorContext },

    /// The upstream answered with a non-200 status.
    #[error("{status_text}")]
    Upstream {
        status: u16,
        status_text: String,
        context: ErrorContext,
    },

    /// The upstream could not be reached or did not answer in time.
    #[error("{message}")]
    UpstreamTransport {
        message: String,
        timed_out: bool,
        context: ErrorContext,
    },

    /// The cache store failed during a read.
    #[error("Cache unavailable")]
    CacheUnavailable(#[from] CacheError),

    #[error("failed to derive cache key: {0}")]
    Key(#[from] KeyError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn access_forbidden(context: ErrorContext) -> Self {
        Self::AccessForbidden { context }
    }

    pub fn bad_request(context: ErrorContext) -> Self {
        Self::BadRequest { context }
    }

    pub fn not_found(context: ErrorContext) -> Self {
        Self::NotFound { context }
    }

    /// Whether this error terminates the worker instead of being answered.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Key(_) | Self::Internal(_))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            // BadRequest keeps the legacy 403.
            Self::AccessForbidden { .. } | Self::BadRequest { .. } => StatusCode::FORBIDDEN,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            Self::UpstreamTransport { timed_out: true, .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::UpstreamTransport { .. } => StatusCode::BAD_GATEWAY,
            Self::CacheUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Key(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-visible body: `{status, message, ...context}`.
    pub fn body(&self) -> Value {
        let message = match self {
            Self::Upstream {
                status,
                status_text,
                ..
            } if status_text.is_empty() => StatusCode::from_u16(*status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("Upstream error")
                .to_string(),
            other => other.to_string(),
        };

        let mut body = Map::new();
        body.insert("status".into(), Value::String(message.clone()));
        body.insert("message".into(), Value::String(message));

        match self {
            Self::AccessForbidden { context }
            | Self::BadRequest { context }
            | Self::NotFound { context }
            | Self::Upstream { context, .. }
            | Self::UpstreamTransport { context, .. } => {
                for (k, v) in context {
                    body.insert(k.clone(), v.clone());
                }
            }
            Self::CacheUnavailable(e) => {
                body.insert("cache_error".into(), Value::String(e.to_string()));
            }
            Self::Key(_) | Self::Internal(_) => {}
        }

        Value::Object(body)
    }
}

type FatalHook = dyn Fn(&GatewayError) + Send + Sync;

/// Single terminal handler translating failures into responses.
#[derive(Clone)]
pub struct ErrorPipeline {
    on_fatal: Arc<FatalHook>,
}

impl fmt::Debug for ErrorPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorPipeline").finish_non_exhaustive()
    }
}

impl ErrorPipeline {
    /// Production pipeline: fatal errors exit the worker with code 1.
    pub fn exit_on_fatal() -> Self {
        Self::with_fatal_hook(|_| std::process::exit(1))
    }

    /// Pipeline with a custom reaction to fatal errors.
    pub fn with_fatal_hook(hook: impl Fn(&GatewayError) + Send + Sync + 'static) -> Self {
        Self {
            on_fatal: Arc::new(hook),
        }
    }

    pub fn respond(&self, err: GatewayError) -> Response {
        let status = err.status_code();

        if err.is_fatal() {
            tracing::error!(error = %err, "fatal error while handling request, terminating worker");
            (self.on_fatal)(&err);
            // Only reached when the hook does not terminate the process.
            return status.into_response();
        }

        if status.is_server_error() {
            tracing::warn!(http.status = status.as_u16(), error = %err, "request failed");
        } else {
            tracing::debug!(http.status = status.as_u16(), error = %err, "request rejected");
        }

        (status, Json(err.body())).into_response()
    }
}

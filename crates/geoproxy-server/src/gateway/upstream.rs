//! Upstream HTTP client.
//!
//! [`UpstreamClient::fetch`] issues exactly one request per call, with the
//! route's timeout and no retry, and classifies what came back.

use std::time::Duration;

use axum::http::Method;
use geoproxy_cache::RequestDescriptor;
use reqwest::StatusCode;
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use super::error::{ErrorContext, GatewayError};

/// A named upstream mounted at `/<name>`.
#[derive(Debug, Clone)]
pub struct UpstreamRoute {
    name: String,
    base_url: String,
    timeout: Duration,
}

impl UpstreamRoute {
    pub fn new(name: impl Into<String>, base_url: &str, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn mount_path(&self) -> String {
        format!("/{}", self.name)
    }

    /// Upstream URL for a gateway path, with the mount prefix removed.
    pub fn target_url(&self, pathname: &str) -> String {
        let rest = pathname
            .strip_prefix(&self.mount_path())
            .unwrap_or(pathname);
        if rest.is_empty() {
            format!("{}/", self.base_url)
        } else {
            format!("{}{}", self.base_url, rest)
        }
    }
}

/// Result of a single upstream call.
#[derive(Debug)]
pub enum UpstreamOutcome {
    Success(Value),
    UpstreamError {
        status: u16,
        status_text: String,
        context: ErrorContext,
    },
    MalformedResponse {
        context: ErrorContext,
    },
    TransportError {
        source: reqwest::Error,
        context: ErrorContext,
    },
}

impl UpstreamOutcome {
    pub fn into_result(self) -> Result<Value, GatewayError> {
        match self {
            Self::Success(value) => Ok(value),
            Self::UpstreamError {
                status,
                status_text,
                context,
            } => Err(GatewayError::Upstream {
                status,
                status_text,
                context,
            }),
            Self::MalformedResponse { context } => Err(GatewayError::bad_request(context)),
            Self::TransportError { source, context } => Err(GatewayError::UpstreamTransport {
                message: source.to_string(),
                timed_out: source.is_timeout(),
                context,
            }),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UpstreamClient {
    http: reqwest::Client,
}

impl UpstreamClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    #[instrument(skip(self, route, descriptor), fields(upstream = %route.name()))]
    pub async fn fetch(
        &self,
        route: &UpstreamRoute,
        method: &Method,
        descriptor: &RequestDescriptor,
    ) -> UpstreamOutcome {
        let url = route.target_url(descriptor.pathname());
        let mut context = request_context(&url, descriptor);

        let mut request = self
            .http
            .request(method.clone(), &url)
            .query(&query_pairs(descriptor.query()))
            .timeout(route.timeout());
        if !descriptor.has_empty_body() {
            request = request.json(descriptor.body());
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(source) => return UpstreamOutcome::TransportError { source, context },
        };

        let status = response.status();
        let status_text = reason_phrase(&response, status);
        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(source) => return UpstreamOutcome::TransportError { source, context },
        };
        debug!(http.status = status.as_u16(), bytes = bytes.len(), "upstream responded");

        let payload = serde_json::from_slice::<Value>(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));

        if status != StatusCode::OK {
            context.insert("response".into(), payload);
            return UpstreamOutcome::UpstreamError {
                status: status.as_u16(),
                status_text,
                context,
            };
        }

        match payload {
            Value::Object(_) | Value::Array(_) => UpstreamOutcome::Success(payload),
            other => {
                context.insert("response".into(), other);
                UpstreamOutcome::MalformedResponse { context }
            }
        }
    }
}

/// Reason phrase as sent by the upstream, else the canonical one.
fn reason_phrase(response: &reqwest::Response, status: StatusCode) -> String {
    response
        .extensions()
        .get::<hyper::ext::ReasonPhrase>()
        .and_then(|reason| std::str::from_utf8(reason.as_bytes()).ok())
        .or_else(|| status.canonical_reason())
        .unwrap_or_default()
        .to_string()
}

fn request_context(url: &str, descriptor: &RequestDescriptor) -> ErrorContext {
    let mut context = Map::new();
    context.insert("url".into(), Value::String(url.to_string()));
    context.insert("body".into(), descriptor.body().clone());
    context.insert("query".into(), Value::Object(descriptor.query().clone()));
    context.insert("method".into(), Value::String(descriptor.method().to_string()));
    context
}

/// Flatten query values into pairs; arrays become repeated keys.
fn query_pairs(query: &Map<String, Value>) -> Vec<(String, String)> {
    let mut pairs = Vec::with_capacity(query.len());
    for (key, value) in query {
        match value {
            Value::Array(values) => {
                pairs.extend(values.iter().map(|v| (key.clone(), scalar_to_string(v))));
            }
            other => pairs.push((key.clone(), scalar_to_string(other))),
        }
    }
    pairs
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn descriptor(pathname: &str, query: Value) -> RequestDescriptor {
        let Value::Object(query) = query else {
            unreachable!()
        };
        RequestDescriptor::new(pathname, "GET", query, Value::Null)
    }

    #[test]
    fn test_target_url_strips_mount() {
        let route = UpstreamRoute::new("osrm", "http://router.example/", Duration::from_secs(1));
        assert_eq!(
            route.target_url("/osrm/route/v1/driving/1,2;3,4"),
            "http://router.example/route/v1/driving/1,2;3,4"
        );
        assert_eq!(route.target_url("/osrm"), "http://router.example/");
    }

    #[test]
    fn test_query_pairs_expand_arrays() {
        let pairs = query_pairs(json!({"a": "1", "b": ["x", "y"]}).as_object().unwrap());
        assert_eq!(
            pairs,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "x".to_string()),
                ("b".to_string(), "y".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_fetch_classifies_outcomes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "paris"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"name": "Paris"}])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/fail"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "boom"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/text"))
            .respond_with(ResponseTemplate::new(200).set_body_string("\"just text\""))
            .mount(&server)
            .await;

        let route = UpstreamRoute::new("geo", &server.uri(), Duration::from_secs(1));
        let client = UpstreamClient::default();

        let ok = client
            .fetch(&route, &Method::GET, &descriptor("/geo/search", json!({"q": "paris"})))
            .await;
        assert!(matches!(ok, UpstreamOutcome::Success(Value::Array(_))));

        let failed = client
            .fetch(&route, &Method::GET, &descriptor("/geo/fail", json!({})))
            .await;
        match failed {
            UpstreamOutcome::UpstreamError {
                status, context, ..
            } => {
                assert_eq!(status, 500);
                assert_eq!(context["response"]["error"], "boom");
                assert_eq!(context["method"], "GET");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        let malformed = client
            .fetch(&route, &Method::GET, &descriptor("/geo/text", json!({})))
            .await;
        assert!(matches!(malformed, UpstreamOutcome::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn test_fetch_timeout_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let route = UpstreamRoute::new("geo", &server.uri(), Duration::from_millis(50));
        let outcome = UpstreamClient::default()
            .fetch(&route, &Method::GET, &descriptor("/geo/slow", json!({})))
            .await;

        let err = outcome.into_result().unwrap_err();
        assert_eq!(err.status_code().as_u16(), 504);
    }

    #[tokio::test]
    async fn test_upstream_reason_phrase_is_kept() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await.unwrap();
            let body = r#"{"error":"boom"}"#;
            let reply = format!(
                "HTTP/1.1 500 Kaboom\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(reply.as_bytes()).await.unwrap();
        });

        let route = UpstreamRoute::new("nominatim", &format!("http://{addr}"), Duration::from_secs(2));
        let outcome = UpstreamClient::default()
            .fetch(&route, &Method::GET, &descriptor("/nominatim/search", json!({})))
            .await;

        match outcome {
            UpstreamOutcome::UpstreamError {
                status,
                status_text,
                context,
            } => {
                assert_eq!(status, 500);
                assert_eq!(status_text, "Kaboom");
                assert_eq!(context["response"]["error"], "boom");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        server.await.unwrap();
    }
}

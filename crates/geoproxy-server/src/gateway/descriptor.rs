//! Building request descriptors from incoming HTTP requests.

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Method, Uri, header::CONTENT_TYPE};
use geoproxy_cache::RequestDescriptor;
use serde_json::{Map, Value};

use super::error::GatewayError;

/// Parse a query string into a mapping. Repeated keys collect into an array.
pub fn parse_query(raw: Option<&str>) -> Map<String, Value> {
    let mut query = Map::new();
    let Some(raw) = raw else {
        return query;
    };

    for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
        let value = Value::String(value.into_owned());
        match query.get_mut(key.as_ref()) {
            Some(Value::Array(values)) => values.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                query.insert(key.into_owned(), value);
            }
        }
    }
    query
}

fn is_json_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|mime| {
            let mime = mime.trim().to_ascii_lowercase();
            mime == "application/json" || mime.ends_with("+json")
        })
        .unwrap_or(false)
}

/// Decode a JSON request body. Non-JSON and empty bodies decode to `null`.
pub fn parse_body(headers: &HeaderMap, bytes: &Bytes) -> Result<Value, GatewayError> {
    if bytes.is_empty() || !is_json_content_type(headers) {
        return Ok(Value::Null);
    }

    serde_json::from_slice(bytes).map_err(|e| {
        let mut context = Map::new();
        context.insert("error".into(), Value::String(e.to_string()));
        GatewayError::bad_request(context)
    })
}

/// Like [`parse_body`] but never fails; used for diagnostics only.
pub fn parse_body_lenient(headers: &HeaderMap, bytes: &Bytes) -> Value {
    match parse_body(headers, bytes) {
        Ok(Value::Null) | Err(_) => Value::Object(Map::new()),
        Ok(body) => body,
    }
}

/// Buffer a request body up to `limit` bytes.
pub async fn read_body(body: Body, limit: usize) -> Result<Bytes, GatewayError> {
    axum::body::to_bytes(body, limit).await.map_err(|e| {
        let mut context = Map::new();
        context.insert("error".into(), Value::String(e.to_string()));
        GatewayError::bad_request(context)
    })
}

/// Descriptor for a proxied request, keyed by its full request path.
pub fn descriptor_from_parts(
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<RequestDescriptor, GatewayError> {
    Ok(RequestDescriptor::new(
        uri.path(),
        method.as_str(),
        parse_query(uri.query()),
        parse_body(headers, body)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::json;

    fn json_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json; charset=utf-8"));
        headers
    }

    #[test]
    fn test_parse_query_decodes_and_collects_repeats() {
        let query = parse_query(Some("q=paris+france&format=json&tag=a&tag=b&tag=c"));
        assert_eq!(query["q"], "paris france");
        assert_eq!(query["format"], "json");
        assert_eq!(query["tag"], json!(["a", "b", "c"]));
        assert!(parse_query(None).is_empty());
    }

    #[test]
    fn test_parse_body_requires_json_content_type() {
        let bytes = Bytes::from_static(br#"{"a":1}"#);
        assert_eq!(parse_body(&HeaderMap::new(), &bytes).unwrap(), Value::Null);
        assert_eq!(parse_body(&json_headers(), &bytes).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_invalid_json_is_bad_request() {
        let err = parse_body(&json_headers(), &Bytes::from_static(b"{oops")).unwrap_err();
        assert_eq!(err.status_code().as_u16(), 403);
        assert_eq!(
            parse_body_lenient(&json_headers(), &Bytes::from_static(b"{oops")),
            json!({})
        );
    }

    #[test]
    fn test_descriptor_uses_full_path() {
        let uri: Uri = "/nominatim/search?q=paris".parse().unwrap();
        let descriptor =
            descriptor_from_parts(&Method::GET, &uri, &HeaderMap::new(), &Bytes::new()).unwrap();
        assert_eq!(descriptor.pathname(), "/nominatim/search");
        assert_eq!(descriptor.method(), "GET");
        assert_eq!(descriptor.query()["q"], "paris");
        assert!(descriptor.has_empty_body());
    }
}

//! `GET /geotz`: timezone ids for a coordinate, computed locally and cached.

use axum::{
    Json,
    extract::State,
    http::Uri,
    response::{IntoResponse, Response},
};
use geoproxy_cache::{RequestDescriptor, canonicalize};
use serde_json::{Map, Value, json};
use tracing::debug;

use super::descriptor::parse_query;
use super::error::GatewayError;
use crate::server::AppState;

pub async fn handle_geotz(State(state): State<AppState>, uri: Uri) -> Response {
    match lookup(&state, &uri).await {
        Ok(value) => Json(value).into_response(),
        Err(err) => state.errors.respond(err),
    }
}

async fn lookup(state: &AppState, uri: &Uri) -> Result<Value, GatewayError> {
    let query = parse_query(uri.query());
    let lat = check_number(&query, "lat")?;
    let lon = check_number(&query, "lon")?;

    // Keyed on the parsed numbers so `lat=1.0` and `lat=1` share an entry.
    let mut canonical_query = Map::new();
    canonical_query.insert("lat".into(), json!(lat));
    canonical_query.insert("lon".into(), json!(lon));
    let descriptor = RequestDescriptor::new(uri.path(), "GET", canonical_query, Value::Null);
    let key = canonicalize(&descriptor)?;

    if let Some(hit) = state.cache.get(&key).await? {
        return Ok(hit);
    }

    let zones = state.timezones.find(lat, lon);
    debug!(lat, lon, zones = zones.len(), "timezone lookup");
    if zones.is_empty() {
        return Ok(Value::Array(Vec::new()));
    }

    let value = Value::Array(zones.into_iter().map(Value::String).collect());
    state.cache.set(&key, &value).await;
    Ok(value)
}

/// Parse a query parameter as a finite float, or fail with `BadRequest`.
pub fn check_number(query: &Map<String, Value>, key: &str) -> Result<f64, GatewayError> {
    let value = query.get(key);
    value
        .and_then(Value::as_str)
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|n| n.is_finite())
        .ok_or_else(|| {
            let mut context = Map::new();
            context.insert("key".into(), Value::String(key.to_string()));
            context.insert("value".into(), value.cloned().unwrap_or(Value::Null));
            GatewayError::bad_request(context)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(raw: &str) -> Map<String, Value> {
        parse_query(Some(raw))
    }

    #[test]
    fn test_check_number_accepts_floats() {
        assert_eq!(check_number(&query("lat=48.85"), "lat").unwrap(), 48.85);
        assert_eq!(check_number(&query("lat=-3"), "lat").unwrap(), -3.0);
    }

    #[test]
    fn test_check_number_rejects_bad_values() {
        for raw in ["lat=abc", "lat=", "lat=inf", "lat=NaN", "lon=1", "lat=1&lat=2"] {
            let err = check_number(&query(raw), "lat").unwrap_err();
            match err {
                GatewayError::BadRequest { context } => assert_eq!(context["key"], "lat"),
                other => panic!("unexpected error for {raw}: {other:?}"),
            }
        }
    }
}

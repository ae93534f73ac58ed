//! Cache key derivation.
//!
//! A [`RequestDescriptor`] captures the parts of a request that determine its
//! response: path, method, query and JSON body. [`CacheKey::derive`] turns it
//! into an opaque, printable key:
//!
//! ```text
//! descriptor ─▶ canonical JSON ─▶ gzip ─▶ base64 ─▶ key
//!                (sorted keys)              │
//!                                           └─▶ "sha256:<hex>" when longer than MAX_KEY_LEN
//! ```
//!
//! The same descriptor always yields the same key, in every process and across
//! restarts, so keys written by one worker are found by every other worker.

use std::fmt;
use std::io::Write;

use base64::{Engine, engine::general_purpose::STANDARD};
use flate2::{Compression, write::GzEncoder};
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Longest key emitted in encoded form. Longer keys are replaced by a digest.
pub const MAX_KEY_LEN: usize = 512;

const DIGEST_PREFIX: &str = "sha256:";

/// Errors that can occur while deriving a cache key.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("failed to serialize request descriptor: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to compress request descriptor: {0}")]
    Compress(#[from] std::io::Error),
}

/// Logical description of a cacheable request.
///
/// The method is normalized to uppercase and a missing body is stored as an
/// empty object, so `GET` vs `get` or "no body" vs `{}` never produce
/// different keys.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pathname: String,
    method: String,
    query: Map<String, Value>,
    body: Value,
}

impl RequestDescriptor {
    pub fn new(
        pathname: impl Into<String>,
        method: impl AsRef<str>,
        query: Map<String, Value>,
        body: Value,
    ) -> Self {
        let body = match body {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };

        Self {
            pathname: pathname.into(),
            method: method.as_ref().to_ascii_uppercase(),
            query,
            body,
        }
    }

    pub fn pathname(&self) -> &str {
        &self.pathname
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn query(&self) -> &Map<String, Value> {
        &self.query
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Returns `true` when the body carries no data worth forwarding.
    pub fn has_empty_body(&self) -> bool {
        match &self.body {
            Value::Object(map) => map.is_empty(),
            Value::Null => true,
            _ => false,
        }
    }
}

/// Field order here is the serialization order.
#[derive(Serialize)]
struct CanonicalForm<'a> {
    pathname: &'a str,
    method: &'a str,
    query: Value,
    body: Value,
}

/// Opaque cache key derived from a [`RequestDescriptor`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for a descriptor.
    pub fn derive(descriptor: &RequestDescriptor) -> Result<Self, KeyError> {
        let canonical = CanonicalForm {
            pathname: &descriptor.pathname,
            method: &descriptor.method,
            query: sorted(&Value::Object(descriptor.query.clone())),
            body: sorted(&descriptor.body),
        };
        let json = serde_json::to_vec(&canonical)?;

        let mut encoder = GzEncoder::new(Vec::with_capacity(json.len()), Compression::default());
        encoder.write_all(&json)?;
        let compressed = encoder.finish()?;

        let encoded = STANDARD.encode(&compressed);
        if encoded.len() <= MAX_KEY_LEN {
            return Ok(Self(encoded));
        }

        let digest = Sha256::digest(&compressed);
        Ok(Self(format!("{DIGEST_PREFIX}{}", hex::encode(digest))))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Shorthand for [`CacheKey::derive`].
pub fn canonicalize(descriptor: &RequestDescriptor) -> Result<CacheKey, KeyError> {
    CacheKey::derive(descriptor)
}

/// Rebuild a JSON value with every object's keys in lexicographic order.
///
/// Objects are rebuilt by inserting in sorted order, which keeps the output
/// stable whether or not serde_json's `preserve_order` feature is enabled
/// somewhere in the dependency graph.
fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut out = Map::with_capacity(entries.len());
            for (key, value) in entries {
                out.insert(key.clone(), sorted(value));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

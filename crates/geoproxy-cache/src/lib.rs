//! # geoproxy-cache
//!
//! Response caching for the geoproxy gateway.
//!
//! - [`key`] derives deterministic, printable cache keys from request descriptors
//! - [`store`] provides the get/set-with-TTL store (Redis, or in-process for
//!   single-instance runs)
//!
//! ```text
//! RequestDescriptor ─▶ CacheKey ─▶ CacheStore::get ──hit──▶ value
//!                                        │
//!                                       miss ─▶ fetch/compute ─▶ CacheStore::set
//! ```

pub mod key;
pub mod store;

pub use key::{CacheKey, KeyError, MAX_KEY_LEN, RequestDescriptor, canonicalize};
pub use store::{CacheError, CacheStore, CachedEntry, RedisOptions};

//! Request pipeline behind the auth gate.
//!
//! ```text
//! request ─▶ descriptor ─▶ cache key ─▶ cache.get ──hit──▶ respond
//!                                          │
//!                                         miss
//!                                          ▼
//!                       upstream fetch / timezone lookup ─▶ cache.set ─▶ respond
//!
//! any failure ─▶ ErrorPipeline
//! ```

pub mod descriptor;
pub mod error;
pub mod geotz;
pub mod proxy;
pub mod upstream;

pub use error::{ErrorContext, ErrorPipeline, GatewayError};
pub use upstream::{UpstreamClient, UpstreamOutcome, UpstreamRoute};

//! Time-to-live caching for polled dashboard data.
//!
//! [`TtlCache`] serves values younger than its TTL without calling the
//! refresh function, and falls back to the last good value (marked stale)
//! when a refresh fails. [`StatusPoller`] applies it to the
//! `{ success, data, message }` telemetry endpoints.

pub mod cache;
pub mod telemetry;

pub use cache::{CacheRead, TtlCache, DEFAULT_TTL};
pub use telemetry::{HttpTelemetrySource, StatusPoller, TelemetryEnvelope, TelemetrySource};

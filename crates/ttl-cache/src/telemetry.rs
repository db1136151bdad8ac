//! Device-status telemetry polling.
//!
//! Telemetry endpoints answer `GET {endpoint}` with
//! `{ "success": bool, "data": [record, ...], "message": "..." }`. A
//! `success: false` body counts as a failed refresh, so the cache's stale
//! fallback applies to it exactly as to a network error.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use overlay_common::{OverlayError, OverlayResult, RawRecord};

use crate::cache::{CacheRead, TtlCache};

/// Response body of a telemetry endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryEnvelope {
    pub success: bool,
    #[serde(default)]
    pub data: Option<Vec<RawRecord>>,
    #[serde(default)]
    pub message: Option<String>,
}

impl TelemetryEnvelope {
    /// Records of a successful envelope.
    pub fn into_records(self, endpoint: &str) -> OverlayResult<Vec<RawRecord>> {
        if !self.success {
            return Err(OverlayError::invalid_response(
                endpoint,
                self.message
                    .unwrap_or_else(|| "upstream reported success: false".to_string()),
            ));
        }
        Ok(self.data.unwrap_or_default())
    }
}

/// Trait for telemetry backends.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    async fn poll(&self, endpoint: &str) -> OverlayResult<Vec<RawRecord>>;
}

/// HTTP telemetry source.
pub struct HttpTelemetrySource {
    client: Client,
    timeout: Duration,
}

impl HttpTelemetrySource {
    pub fn new(timeout: Duration) -> OverlayResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OverlayError::Config(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client, timeout })
    }

    pub fn with_client(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl TelemetrySource for HttpTelemetrySource {
    async fn poll(&self, endpoint: &str) -> OverlayResult<Vec<RawRecord>> {
        let response = self.client.get(endpoint).send().await.map_err(|e| {
            if e.is_timeout() {
                OverlayError::Timeout {
                    target: endpoint.to_string(),
                    secs: self.timeout.as_secs(),
                }
            } else {
                OverlayError::network(endpoint, e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(OverlayError::network(endpoint, format!("HTTP {}", status)));
        }

        let envelope: TelemetryEnvelope = response
            .json()
            .await
            .map_err(|e| OverlayError::invalid_response(endpoint, e.to_string()))?;
        envelope.into_records(endpoint)
    }
}

/// Polls one telemetry endpoint through a TTL cache.
pub struct StatusPoller<S: TelemetrySource> {
    source: S,
    endpoint: String,
    cache: TtlCache<String, Vec<RawRecord>>,
}

impl<S: TelemetrySource> StatusPoller<S> {
    /// The TTL doubles as the polling period, so it must be non-zero.
    pub fn new(source: S, endpoint: impl Into<String>, ttl: Duration) -> OverlayResult<Self> {
        let endpoint = endpoint.into();
        if ttl.is_zero() {
            return Err(OverlayError::Config(format!(
                "telemetry TTL for '{}' must be greater than zero",
                endpoint
            )));
        }
        Ok(Self {
            source,
            endpoint,
            cache: TtlCache::new(ttl),
        })
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn ttl(&self) -> Duration {
        self.cache.ttl()
    }

    /// Cached records, refreshed if older than the TTL.
    pub async fn get(&self) -> OverlayResult<CacheRead<Vec<RawRecord>>> {
        self.cache
            .get(&self.endpoint, || self.source.poll(&self.endpoint))
            .await
    }

    /// Bypass the TTL: always polls, falling back to the cached value.
    pub async fn refresh_now(&self) -> OverlayResult<CacheRead<Vec<RawRecord>>> {
        self.cache.force_invalidate(&self.endpoint).await;
        self.get().await
    }

    /// Poll immediately and then once per TTL until `shutdown` resolves.
    /// Every outcome is passed to `on_update`.
    #[instrument(skip_all, fields(endpoint = %self.endpoint))]
    pub async fn run<U, Sd>(&self, mut on_update: U, shutdown: Sd)
    where
        U: FnMut(&OverlayResult<CacheRead<Vec<RawRecord>>>),
        Sd: Future<Output = ()>,
    {
        let ttl = self.cache.ttl();
        info!(ttl_secs = ttl.as_secs(), "Starting telemetry poller");

        on_update(&self.get().await);

        let mut ticks = interval_at(Instant::now() + ttl, ttl);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Telemetry poller stopped");
                    return;
                }
                _ = ticks.tick() => {
                    let outcome = self.refresh_now().await;
                    match &outcome {
                        Ok(read) if read.stale => warn!("Telemetry refresh failed, showing stale data"),
                        Ok(read) => debug!(records = read.value.len(), "Telemetry refreshed"),
                        Err(e) => warn!(error = %e, "Telemetry unavailable"),
                    }
                    on_update(&outcome);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_success() {
        let envelope: TelemetryEnvelope = serde_json::from_value(json!({
            "success": true,
            "data": [{"device": "cam-1", "online": true}]
        }))
        .unwrap();
        let records = envelope.into_records("/api/status").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].text("device").as_deref(), Some("cam-1"));
    }

    #[test]
    fn test_envelope_failure_carries_message() {
        let envelope: TelemetryEnvelope = serde_json::from_value(json!({
            "success": false,
            "message": "gateway offline"
        }))
        .unwrap();
        let err = envelope.into_records("/api/status").unwrap_err();
        assert!(matches!(err, OverlayError::InvalidResponse { .. }));
        assert!(err.to_string().contains("gateway offline"));
    }

    struct NeverSource;

    #[async_trait]
    impl TelemetrySource for NeverSource {
        async fn poll(&self, endpoint: &str) -> OverlayResult<Vec<RawRecord>> {
            Err(OverlayError::network(endpoint, "unreachable"))
        }
    }

    #[test]
    fn test_zero_ttl_is_rejected() {
        let result = StatusPoller::new(NeverSource, "/api/status", Duration::ZERO);
        assert!(matches!(result, Err(OverlayError::Config(_))));

        assert!(StatusPoller::new(NeverSource, "/api/status", Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn test_envelope_null_data_is_empty() {
        let envelope: TelemetryEnvelope =
            serde_json::from_value(json!({"success": true, "data": null})).unwrap();
        assert!(envelope.into_records("/api/status").unwrap().is_empty());
    }
}

//! Layer data fetching.
//!
//! Endpoints answer `GET {endpoint}` with `{ "<response_key>": [record, ...] }`.
//! [`LayerFetcher`] is the seam between the lifecycle controller and the
//! network; tests substitute scripted fetchers.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use overlay_common::{LayerDescriptor, OverlayError, OverlayResult, RawRecord};

/// Trait for sources of raw layer records.
#[async_trait]
pub trait LayerFetcher: Send + Sync {
    /// Fetch the raw record list for a layer.
    async fn fetch(&self, descriptor: &LayerDescriptor) -> OverlayResult<Vec<RawRecord>>;
}

/// HTTP fetcher for the overlay REST endpoints.
pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> OverlayResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| OverlayError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client, timeout })
    }

    /// Use an existing client (shared connection pool).
    pub fn with_client(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    fn map_error(&self, endpoint: &str, err: reqwest::Error) -> OverlayError {
        if err.is_timeout() {
            OverlayError::Timeout {
                target: endpoint.to_string(),
                secs: self.timeout.as_secs(),
            }
        } else {
            OverlayError::network(endpoint, err.to_string())
        }
    }
}

#[async_trait]
impl LayerFetcher for HttpFetcher {
    #[instrument(skip_all, fields(layer = %descriptor.id))]
    async fn fetch(&self, descriptor: &LayerDescriptor) -> OverlayResult<Vec<RawRecord>> {
        let endpoint = descriptor.endpoint.as_str();
        debug!(url = %endpoint, "Fetching layer data");

        let response = self
            .client
            .get(endpoint)
            .send()
            .await
            .map_err(|e| self.map_error(endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(OverlayError::network(endpoint, format!("HTTP {}", status)));
        }

        let body: Value = response.json().await.map_err(|e| {
            if e.is_decode() {
                OverlayError::invalid_response(endpoint, format!("body is not JSON: {}", e))
            } else {
                self.map_error(endpoint, e)
            }
        })?;

        extract_records(&body, descriptor)
    }
}

/// Pull the record array out of a response envelope.
///
/// A `null` array is treated as empty; a missing key or a non-array value
/// is an invalid response. Non-object array entries are skipped.
pub fn extract_records(envelope: &Value, descriptor: &LayerDescriptor) -> OverlayResult<Vec<RawRecord>> {
    let key = descriptor.response_key.as_str();
    let items = match envelope.get(key) {
        Some(Value::Array(items)) => items,
        Some(Value::Null) => return Ok(Vec::new()),
        Some(_) => {
            return Err(OverlayError::invalid_response(
                &descriptor.endpoint,
                format!("'{}' is not an array", key),
            ))
        }
        None => {
            return Err(OverlayError::invalid_response(
                &descriptor.endpoint,
                format!("missing '{}' in response", key),
            ))
        }
    };

    let mut records = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        match RawRecord::from_value(item.clone()) {
            Some(record) => records.push(record),
            None => warn!(layer = %descriptor.id, record = index, "Skipping non-object record"),
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use overlay_common::GeometryKind;
    use serde_json::json;

    fn descriptor() -> LayerDescriptor {
        LayerDescriptor::new("pumps", "https://ioc.example.org/api/pumps", "pumps", GeometryKind::Point)
    }

    #[test]
    fn test_extract_records() {
        let records = extract_records(
            &json!({"pumps": [{"id": 1}, {"id": 2}], "total": 2}),
            &descriptor(),
        )
        .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].text("id").as_deref(), Some("2"));
    }

    #[test]
    fn test_empty_and_null_arrays() {
        assert!(extract_records(&json!({"pumps": []}), &descriptor()).unwrap().is_empty());
        assert!(extract_records(&json!({"pumps": null}), &descriptor()).unwrap().is_empty());
    }

    #[test]
    fn test_missing_key_is_invalid_response() {
        let err = extract_records(&json!({"data": []}), &descriptor()).unwrap_err();
        assert!(matches!(err, OverlayError::InvalidResponse { .. }));
    }

    #[test]
    fn test_non_array_is_invalid_response() {
        let err = extract_records(&json!({"pumps": {"id": 1}}), &descriptor()).unwrap_err();
        assert!(matches!(err, OverlayError::InvalidResponse { .. }));
    }

    #[test]
    fn test_non_object_entries_skipped() {
        let records =
            extract_records(&json!({"pumps": [{"id": 1}, 5, "x", {"id": 2}]}), &descriptor())
                .unwrap();
        assert_eq!(records.len(), 2);
    }
}

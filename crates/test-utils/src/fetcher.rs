//! Scripted layer fetcher.
//!
//! Each layer gets a queue of canned responses consumed one per fetch. When
//! a layer's queue runs dry the last response is repeated; a layer with no
//! script fails with a network error.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use layer_engine::{extract_records, LayerFetcher};
use overlay_common::{LayerDescriptor, LayerId, OverlayError, OverlayResult, RawRecord};

use crate::fixtures;

/// One canned fetch outcome.
#[derive(Debug, Clone)]
pub enum Scripted {
    /// Records wrapped in the layer's envelope
    Records(Vec<RawRecord>),
    /// Response body, run through the real envelope extraction
    Body(Value),
    /// Network failure with the given message
    Fail(String),
    /// Wait, then produce the inner outcome
    Delayed(Duration, Box<Scripted>),
}

impl Scripted {
    /// `{ response_key: records }` for the layer being fetched.
    pub fn records(records: Vec<RawRecord>) -> Self {
        Scripted::Records(records)
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Scripted::Fail(message.into())
    }

    pub fn after(self, delay: Duration) -> Self {
        Scripted::Delayed(delay, Box::new(self))
    }
}

#[derive(Default)]
struct Script {
    queue: VecDeque<Scripted>,
    last: Option<Scripted>,
    calls: usize,
}

#[derive(Clone, Default)]
pub struct ScriptedFetcher {
    scripts: Arc<Mutex<HashMap<LayerId, Script>>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for a layer.
    pub fn push(&self, layer: &str, response: Scripted) -> &Self {
        self.with_scripts(|scripts| {
            scripts
                .entry(LayerId::new(layer))
                .or_default()
                .queue
                .push_back(response)
        });
        self
    }

    /// Queue point records for a layer.
    pub fn push_records(&self, layer: &str, records: Vec<RawRecord>) -> &Self {
        self.push(layer, Scripted::records(records))
    }

    pub fn push_failure(&self, layer: &str, message: &str) -> &Self {
        self.push(layer, Scripted::fail(message))
    }

    /// Number of fetches issued for a layer.
    pub fn calls(&self, layer: &str) -> usize {
        self.with_scripts(|scripts| {
            scripts
                .get(&LayerId::new(layer))
                .map(|s| s.calls)
                .unwrap_or(0)
        })
    }

    pub fn total_calls(&self) -> usize {
        self.with_scripts(|scripts| scripts.values().map(|s| s.calls).sum())
    }

    fn with_scripts<R>(&self, f: impl FnOnce(&mut HashMap<LayerId, Script>) -> R) -> R {
        let mut scripts = self
            .scripts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut scripts)
    }

    fn next_response(&self, layer: &LayerId) -> Option<Scripted> {
        self.with_scripts(|scripts| {
            let script = scripts.entry(layer.clone()).or_default();
            script.calls += 1;
            match script.queue.pop_front() {
                Some(next) => {
                    script.last = Some(next.clone());
                    Some(next)
                }
                None => script.last.clone(),
            }
        })
    }
}

#[async_trait]
impl LayerFetcher for ScriptedFetcher {
    async fn fetch(&self, descriptor: &LayerDescriptor) -> OverlayResult<Vec<RawRecord>> {
        let mut response = self.next_response(&descriptor.id).ok_or_else(|| {
            OverlayError::network(&descriptor.endpoint, "no scripted response")
        })?;

        loop {
            match response {
                Scripted::Delayed(delay, inner) => {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    response = *inner;
                }
                Scripted::Records(records) => {
                    let body = fixtures::envelope(&descriptor.response_key, &records);
                    return extract_records(&body, descriptor);
                }
                Scripted::Body(body) => return extract_records(&body, descriptor),
                Scripted::Fail(message) => {
                    return Err(OverlayError::network(&descriptor.endpoint, message))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{point_layer, point_records};

    #[tokio::test]
    async fn test_queue_then_repeat_last() {
        let fetcher = ScriptedFetcher::new();
        fetcher
            .push_records("cctv", point_records(2))
            .push_failure("cctv", "HTTP 500");
        let layer = point_layer("cctv");

        assert_eq!(fetcher.fetch(&layer).await.unwrap().len(), 2);
        assert!(fetcher.fetch(&layer).await.is_err());
        assert!(fetcher.fetch(&layer).await.is_err());
        assert_eq!(fetcher.calls("cctv"), 3);
    }

    #[tokio::test]
    async fn test_unscripted_layer_fails() {
        let fetcher = ScriptedFetcher::new();
        let err = fetcher.fetch(&point_layer("hydrants")).await.unwrap_err();
        assert!(matches!(err, OverlayError::Network { .. }));
        assert_eq!(fetcher.calls("hydrants"), 1);
    }

    #[tokio::test]
    async fn test_body_goes_through_envelope_extraction() {
        let fetcher = ScriptedFetcher::new();
        fetcher.push("cctv", Scripted::Body(serde_json::json!({"wrong": []})));
        let err = fetcher.fetch(&point_layer("cctv")).await.unwrap_err();
        assert!(matches!(err, OverlayError::InvalidResponse { .. }));
    }
}

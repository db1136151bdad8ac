//! Telemetry poller behaviour with a paused clock.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use overlay_common::{OverlayError, OverlayResult, RawRecord};
use ttl_cache::{StatusPoller, TelemetryEnvelope, TelemetrySource, DEFAULT_TTL};

const MINUTE: Duration = Duration::from_secs(60);

/// Replays envelopes in order; repeats the last one when exhausted.
struct ReplaySource {
    bodies: Mutex<VecDeque<serde_json::Value>>,
    calls: AtomicUsize,
}

impl ReplaySource {
    fn new(bodies: Vec<serde_json::Value>) -> Self {
        Self {
            bodies: Mutex::new(bodies.into()),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TelemetrySource for ReplaySource {
    async fn poll(&self, endpoint: &str) -> OverlayResult<Vec<RawRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let body = {
            let mut bodies = self.bodies.lock().unwrap();
            if bodies.len() > 1 {
                bodies.pop_front()
            } else {
                bodies.front().cloned()
            }
        };
        let Some(body) = body else {
            return Err(OverlayError::network(endpoint, "connection refused"));
        };
        let envelope: TelemetryEnvelope = serde_json::from_value(body)?;
        envelope.into_records(endpoint)
    }
}

fn ok(devices: &[&str]) -> serde_json::Value {
    let data: Vec<_> = devices
        .iter()
        .map(|d| json!({"device": d, "online": true}))
        .collect();
    json!({"success": true, "data": data})
}

fn devices(records: &[RawRecord]) -> Vec<String> {
    records.iter().filter_map(|r| r.text("device")).collect()
}

#[tokio::test(start_paused = true)]
async fn test_ttl_schedule() {
    let poller = StatusPoller::new(
        ReplaySource::new(vec![ok(&["cam-1"]), ok(&["cam-1", "cam-2"])]),
        "https://ioc.example.org/api/device-status",
        DEFAULT_TTL,
    )
    .unwrap();

    let first = poller.get().await.unwrap();
    assert_eq!(devices(&first.value), vec!["cam-1"]);

    tokio::time::advance(10 * MINUTE).await;
    let cached = poller.get().await.unwrap();
    assert_eq!(devices(&cached.value), vec!["cam-1"]);
    assert_eq!(poller_calls(&poller), 1);

    tokio::time::advance(10 * MINUTE).await;
    let refreshed = poller.get().await.unwrap();
    assert!(!refreshed.stale);
    assert_eq!(devices(&refreshed.value), vec!["cam-1", "cam-2"]);
    assert_eq!(poller_calls(&poller), 2);
}

#[tokio::test(start_paused = true)]
async fn test_success_false_falls_back_to_stale() {
    let poller = StatusPoller::new(
        ReplaySource::new(vec![
            ok(&["pump-7"]),
            json!({"success": false, "message": "gateway offline"}),
        ]),
        "https://ioc.example.org/api/pump-status",
        DEFAULT_TTL,
    )
    .unwrap();

    poller.get().await.unwrap();
    tokio::time::advance(20 * MINUTE).await;

    let read = poller.get().await.unwrap();
    assert!(read.stale);
    assert_eq!(devices(&read.value), vec!["pump-7"]);
}

#[tokio::test]
async fn test_first_failure_propagates() {
    let poller = StatusPoller::new(
        ReplaySource::new(Vec::new()),
        "https://ioc.example.org/api/device-status",
        DEFAULT_TTL,
    )
    .unwrap();
    let err = poller.get().await.unwrap_err();
    assert!(matches!(err, OverlayError::Network { .. }));
}

#[tokio::test]
async fn test_manual_refresh_bypasses_ttl() {
    let poller = StatusPoller::new(
        ReplaySource::new(vec![ok(&["cam-1"]), ok(&["cam-9"])]),
        "https://ioc.example.org/api/device-status",
        DEFAULT_TTL,
    )
    .unwrap();

    poller.get().await.unwrap();
    let read = poller.refresh_now().await.unwrap();
    assert_eq!(devices(&read.value), vec!["cam-9"]);
    assert_eq!(poller_calls(&poller), 2);
}

#[tokio::test(start_paused = true)]
async fn test_run_polls_once_per_ttl() {
    let poller = StatusPoller::new(
        ReplaySource::new(vec![ok(&["cam-1"])]),
        "https://ioc.example.org/api/device-status",
        15 * MINUTE,
    )
    .unwrap();

    let mut updates = 0;
    poller
        .run(
            |outcome| {
                assert!(outcome.is_ok());
                updates += 1;
            },
            tokio::time::sleep(31 * MINUTE),
        )
        .await;

    // t = 0, 15 and 30 minutes.
    assert_eq!(updates, 3);
    assert_eq!(poller_calls(&poller), 3);
}

fn poller_calls(poller: &StatusPoller<ReplaySource>) -> usize {
    poller.source().calls()
}

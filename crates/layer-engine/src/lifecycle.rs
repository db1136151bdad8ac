//! Per-layer load/cache/visibility state machine.
//!
//! ```text
//! Unloaded --enable--> Loading --ok--> Loaded --force_refresh--> Loading
//!                         \--err--> Error  --force_refresh--> Loading
//! ```
//!
//! `visible` is orthogonal to the lifecycle. Turning a layer on only loads
//! it when nothing has been fetched yet; afterwards it re-shows the cached
//! features without touching the network. Failures are recorded on the
//! layer and never returned to the caller.
//!
//! Every load bumps the layer's generation. A response is only written back
//! if its generation is still current, so a slow response can never
//! overwrite the result of a newer forced refresh.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use overlay_common::{LayerDescriptor, LayerId, OverlayError, OverlayResult};

use crate::feature::CanonicalFeature;
use crate::fetch::LayerFetcher;
use crate::ingest::ingest_with_report;
use crate::registry::LayerRegistry;
use crate::render::{MapBackend, RenderAdapter};
use crate::viewport::ViewportPolicy;

/// Default upper bound on a single layer fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    Unloaded,
    Loading,
    Loaded,
    Error,
}

/// Controller settings.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub fetch_timeout: Duration,
    pub viewport: ViewportPolicy,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            viewport: ViewportPolicy::default(),
        }
    }
}

/// Read-only snapshot of one layer, for status indicators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerStatus {
    pub id: LayerId,
    pub lifecycle: Lifecycle,
    pub visible: bool,
    pub in_flight: bool,
    pub feature_count: usize,
    pub last_loaded_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub generation: u64,
}

impl LayerStatus {
    /// Failed to load, possibly with older data still on the map.
    pub fn is_failed(&self) -> bool {
        self.lifecycle == Lifecycle::Error
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadMode {
    /// First load on enable; joins an in-flight load instead of starting one.
    Initial,
    /// Always fetches and supersedes anything in flight.
    Forced,
}

struct LayerState {
    descriptor: Arc<LayerDescriptor>,
    lifecycle: Lifecycle,
    features: Vec<CanonicalFeature>,
    last_loaded_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    visible: bool,
    in_flight: bool,
    generation: u64,
    /// At least one load has succeeded (features may still be empty).
    has_data: bool,
}

impl LayerState {
    fn new(descriptor: Arc<LayerDescriptor>) -> Self {
        Self {
            descriptor,
            lifecycle: Lifecycle::Unloaded,
            features: Vec::new(),
            last_loaded_at: None,
            last_error: None,
            visible: false,
            in_flight: false,
            generation: 0,
            has_data: false,
        }
    }

    fn status(&self) -> LayerStatus {
        LayerStatus {
            id: self.descriptor.id.clone(),
            lifecycle: self.lifecycle,
            visible: self.visible,
            in_flight: self.in_flight,
            feature_count: self.features.len(),
            last_loaded_at: self.last_loaded_at,
            last_error: self.last_error.clone(),
            generation: self.generation,
        }
    }

    fn fail(&mut self, error: &OverlayError) {
        self.lifecycle = Lifecycle::Error;
        self.last_error = Some(error.to_string());
    }
}

struct Inner<B: MapBackend> {
    states: HashMap<LayerId, LayerState>,
    render: RenderAdapter<B>,
}

impl<B: MapBackend> Inner<B> {
    fn state_mut(&mut self, id: &LayerId) -> OverlayResult<&mut LayerState> {
        self.states
            .get_mut(id)
            .ok_or_else(|| OverlayError::UnknownLayer(id.to_string()))
    }
}

/// Owns every layer's state and the render adapter for one map.
pub struct LayerController<F: LayerFetcher, B: MapBackend> {
    registry: Arc<LayerRegistry>,
    fetcher: F,
    config: ControllerConfig,
    inner: Mutex<Inner<B>>,
}

impl<F: LayerFetcher, B: MapBackend> LayerController<F, B> {
    pub fn new(
        registry: Arc<LayerRegistry>,
        fetcher: F,
        render: RenderAdapter<B>,
        config: ControllerConfig,
    ) -> Self {
        let states = registry
            .iter()
            .map(|d| (d.id.clone(), LayerState::new(d.clone())))
            .collect();

        Self {
            registry,
            fetcher,
            config,
            inner: Mutex::new(Inner { states, render }),
        }
    }

    pub fn registry(&self) -> &LayerRegistry {
        &self.registry
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Toggle a layer on or off.
    ///
    /// Only an unknown layer id is an error; load failures end up in the
    /// layer's status.
    #[instrument(skip(self), fields(layer = %id))]
    pub async fn set_visible(&self, id: &LayerId, visible: bool) -> OverlayResult<()> {
        let needs_load = {
            let mut inner = self.inner.lock().await;
            let Inner { states, render } = &mut *inner;
            let state = states
                .get_mut(id)
                .ok_or_else(|| OverlayError::UnknownLayer(id.to_string()))?;
            state.visible = visible;

            if !visible {
                render.hide_layer(id);
                debug!("Layer hidden");
                false
            } else if state.has_data {
                // Shown even with a refresh in flight; that refresh may fail.
                if let Err(e) = render.show_layer(&state.descriptor, &state.features) {
                    warn!(error = %e, "Failed to re-show layer");
                    state.fail(&e);
                }
                debug!(features = state.features.len(), "Layer shown from cache");
                false
            } else {
                // An in-flight first load is Loading and draws when it lands.
                matches!(state.lifecycle, Lifecycle::Unloaded | Lifecycle::Error)
            }
        };

        if needs_load {
            self.load(id, LoadMode::Initial).await;
        }
        Ok(())
    }

    /// Re-fetch a layer regardless of its lifecycle or cache.
    ///
    /// On failure the previous features stay in place.
    pub async fn force_refresh(&self, id: &LayerId) -> OverlayResult<()> {
        if !self.registry.contains(id) {
            return Err(OverlayError::UnknownLayer(id.to_string()));
        }
        self.load(id, LoadMode::Forced).await;
        Ok(())
    }

    /// Turn several layers on concurrently; each outcome is independent.
    pub async fn enable_many(&self, ids: &[LayerId]) -> Vec<(LayerId, OverlayResult<LayerStatus>)> {
        let loads = ids.iter().map(|id| async move {
            let outcome = match self.set_visible(id, true).await {
                Ok(()) => self.status(id).await,
                Err(e) => Err(e),
            };
            (id.clone(), outcome)
        });
        join_all(loads).await
    }

    /// Fit the viewport to a layer's current features.
    ///
    /// Returns `false` when there is nothing to fit to.
    pub async fn fit_to_layer(&self, id: &LayerId) -> OverlayResult<bool> {
        let mut inner = self.inner.lock().await;
        let Inner { states, render } = &mut *inner;
        let state = states
            .get(id)
            .ok_or_else(|| OverlayError::UnknownLayer(id.to_string()))?;
        Ok(fit(&self.config.viewport, render, &state.features))
    }

    pub async fn status(&self, id: &LayerId) -> OverlayResult<LayerStatus> {
        let mut inner = self.inner.lock().await;
        inner.state_mut(id).map(|s| s.status())
    }

    /// Status of every layer, in registry order.
    pub async fn statuses(&self) -> Vec<LayerStatus> {
        let inner = self.inner.lock().await;
        self.registry
            .ids()
            .iter()
            .filter_map(|id| inner.states.get(id))
            .map(LayerState::status)
            .collect()
    }

    /// Clone of a layer's cached features.
    pub async fn features(&self, id: &LayerId) -> OverlayResult<Vec<CanonicalFeature>> {
        let mut inner = self.inner.lock().await;
        inner.state_mut(id).map(|s| s.features.clone())
    }

    /// Run `f` against the render adapter.
    pub async fn with_render<R>(&self, f: impl FnOnce(&RenderAdapter<B>) -> R) -> R {
        let inner = self.inner.lock().await;
        f(&inner.render)
    }

    #[instrument(skip(self), fields(layer = %id))]
    async fn load(&self, id: &LayerId, mode: LoadMode) {
        let (descriptor, generation) = {
            let mut inner = self.inner.lock().await;
            let Ok(state) = inner.state_mut(id) else {
                return;
            };
            if state.in_flight && mode == LoadMode::Initial {
                debug!("Load already in flight");
                return;
            }
            state.generation += 1;
            state.in_flight = true;
            state.lifecycle = Lifecycle::Loading;
            (state.descriptor.clone(), state.generation)
        };
        debug!(generation, ?mode, "Loading layer");

        let fetched = match tokio::time::timeout(
            self.config.fetch_timeout,
            self.fetcher.fetch(&descriptor),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(OverlayError::Timeout {
                target: descriptor.endpoint.clone(),
                secs: self.config.fetch_timeout.as_secs(),
            }),
        };
        let outcome = fetched.map(|records| ingest_with_report(&records, &descriptor).features);

        let mut inner = self.inner.lock().await;
        let Inner { states, render } = &mut *inner;
        let Some(state) = states.get_mut(id) else {
            return;
        };
        if state.generation != generation {
            debug!(
                generation,
                current = state.generation,
                "Discarding superseded response"
            );
            return;
        }
        state.in_flight = false;

        let features = match outcome {
            Ok(features) => features,
            Err(e) => {
                warn!(
                    error = %e,
                    retained = state.features.len(),
                    "Layer load failed"
                );
                state.fail(&e);
                return;
            }
        };

        state.features = features;
        state.has_data = true;
        state.lifecycle = Lifecycle::Loaded;
        state.last_loaded_at = Some(Utc::now());
        state.last_error = None;
        info!(generation, features = state.features.len(), "Layer loaded");

        if !state.visible {
            // Toggled off mid-flight: keep the data, drop the stale drawing.
            render.clear_layer(id);
            return;
        }

        match render.draw(&descriptor, &state.features) {
            Ok(()) => {
                if descriptor.fit_on_load {
                    fit(&self.config.viewport, render, &state.features);
                }
            }
            Err(e) => {
                warn!(error = %e, "Layer render failed");
                state.fail(&e);
            }
        }
    }
}

fn fit<B: MapBackend>(
    policy: &ViewportPolicy,
    render: &mut RenderAdapter<B>,
    features: &[CanonicalFeature],
) -> bool {
    match policy.fit_bounds(features) {
        Some(bounds) => {
            render.fit(bounds);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{
        ClickCallback, FeatureHandle, GeometryItem, GroupHandle, Handle, MarkerHandle, StyleFn,
    };
    use async_trait::async_trait;
    use overlay_common::{BoundingBox, GeometryKind, IconRef, Position, RawRecord};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticFetcher {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl LayerFetcher for StaticFetcher {
        async fn fetch(&self, _descriptor: &LayerDescriptor) -> OverlayResult<Vec<RawRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(OverlayError::network("test", "HTTP 503"));
            }
            Ok(vec![RawRecord::from_value(
                json!({"id": 1, "latitude": -6.2, "longitude": 106.8}),
            )
            .unwrap()])
        }
    }

    #[derive(Default)]
    struct CountingBackend {
        next: u64,
        fits: usize,
    }

    impl MapBackend for CountingBackend {
        fn create_marker(&mut self, _: Position, _: &IconRef, _: &str) -> OverlayResult<MarkerHandle> {
            self.next += 1;
            Ok(MarkerHandle(self.next))
        }
        fn remove_marker(&mut self, _: MarkerHandle) {}
        fn create_group(&mut self) -> OverlayResult<GroupHandle> {
            self.next += 1;
            Ok(GroupHandle(self.next))
        }
        fn remove_group(&mut self, _: GroupHandle) {}
        fn add_geometry(
            &mut self,
            _: GroupHandle,
            items: &[GeometryItem<'_>],
        ) -> OverlayResult<Vec<FeatureHandle>> {
            Ok((0..items.len() as u64).map(FeatureHandle).collect())
        }
        fn set_style(&mut self, _: GroupHandle, _: StyleFn) {}
        fn on_feature_click(&mut self, _: GroupHandle, _: ClickCallback) {}
        fn show(&mut self, _: Handle) {}
        fn hide(&mut self, _: Handle) {}
        fn fit_bounds(&mut self, _: BoundingBox) {
            self.fits += 1;
        }
    }

    fn controller(fail: bool) -> LayerController<StaticFetcher, CountingBackend> {
        let registry = LayerRegistry::from_descriptors(
            vec![LayerDescriptor::new(
                "cctv",
                "https://ioc.example.org/api/cctv",
                "cctv",
                GeometryKind::Point,
            )],
            None,
        )
        .unwrap();
        LayerController::new(
            Arc::new(registry),
            StaticFetcher {
                calls: AtomicUsize::new(0),
                fail,
            },
            RenderAdapter::new(CountingBackend::default()),
            ControllerConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_first_enable_loads_and_fits() {
        let controller = controller(false);
        let id = LayerId::new("cctv");

        assert_eq!(controller.status(&id).await.unwrap().lifecycle, Lifecycle::Unloaded);
        controller.set_visible(&id, true).await.unwrap();

        let status = controller.status(&id).await.unwrap();
        assert_eq!(status.lifecycle, Lifecycle::Loaded);
        assert_eq!(status.feature_count, 1);
        assert_eq!(status.generation, 1);
        assert!(status.last_loaded_at.is_some());
        assert_eq!(controller.with_render(|r| r.backend().fits).await, 1);
    }

    #[tokio::test]
    async fn test_reenable_serves_cache() {
        let controller = controller(false);
        let id = LayerId::new("cctv");

        controller.set_visible(&id, true).await.unwrap();
        controller.set_visible(&id, false).await.unwrap();
        controller.set_visible(&id, true).await.unwrap();

        assert_eq!(controller.fetcher.calls.load(Ordering::SeqCst), 1);
        // Re-show does not refit.
        assert_eq!(controller.with_render(|r| r.backend().fits).await, 1);
        assert_eq!(controller.with_render(|r| r.drawn_counts(&id)).await, (1, 0));
    }

    #[tokio::test]
    async fn test_failure_is_recorded_not_returned() {
        let controller = controller(true);
        let id = LayerId::new("cctv");

        controller.set_visible(&id, true).await.unwrap();
        let status = controller.status(&id).await.unwrap();
        assert!(status.is_failed());
        assert!(status.last_error.unwrap().contains("503"));
        assert!(!status.in_flight);
    }

    #[tokio::test]
    async fn test_unknown_layer() {
        let controller = controller(false);
        let err = controller
            .set_visible(&LayerId::new("nope"), true)
            .await
            .unwrap_err();
        assert!(matches!(err, OverlayError::UnknownLayer(_)));
        assert!(controller.force_refresh(&LayerId::new("nope")).await.is_err());
    }
}

//! Render adapter between canonical features and a map backend.
//!
//! [`MapBackend`] is the small capability surface a concrete mapping
//! library must provide. [`RenderAdapter`] owns the per-layer handle
//! bookkeeping on top of it:
//!
//! - hiding a layer hides its handles, it never removes them
//! - redrawing creates and shows the new handles before removing the old
//! - every layer's line/polygon group gets the layer style and the shared
//!   click-to-detail handler

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use overlay_common::{
    Attributes, BoundingBox, IconRef, LayerDescriptor, LayerId, OverlayResult, Position,
    ResolvedStyle,
};

use crate::feature::{CanonicalFeature, FeatureKind};
use crate::geojson::Geometry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MarkerHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FeatureHandle(pub u64);

/// Anything that can be shown or hidden.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Handle {
    Marker(MarkerHandle),
    Group(GroupHandle),
}

/// Per-feature style function installed on a group.
pub type StyleFn = Arc<dyn Fn(&Attributes) -> ResolvedStyle + Send + Sync>;

/// Backend click callback: resolved feature attributes and click position.
pub type ClickCallback = Arc<dyn Fn(&Attributes, Position) + Send + Sync>;

/// A line/polygon handed to the backend.
#[derive(Debug, Clone, Copy)]
pub struct GeometryItem<'a> {
    pub feature_id: &'a str,
    pub geometry: &'a Geometry,
    pub attributes: &'a Attributes,
}

/// Capability surface of a concrete map library.
pub trait MapBackend: Send {
    fn create_marker(
        &mut self,
        position: Position,
        icon: &IconRef,
        title: &str,
    ) -> OverlayResult<MarkerHandle>;

    fn remove_marker(&mut self, handle: MarkerHandle);

    /// Create an empty drawable group (one per layer).
    fn create_group(&mut self) -> OverlayResult<GroupHandle>;

    fn remove_group(&mut self, group: GroupHandle);

    fn add_geometry(
        &mut self,
        group: GroupHandle,
        items: &[GeometryItem<'_>],
    ) -> OverlayResult<Vec<FeatureHandle>>;

    fn set_style(&mut self, group: GroupHandle, style: StyleFn);

    fn on_feature_click(&mut self, group: GroupHandle, callback: ClickCallback);

    /// Cheap and reversible, unlike remove.
    fn show(&mut self, handle: Handle);

    fn hide(&mut self, handle: Handle);

    fn fit_bounds(&mut self, bounds: BoundingBox);
}

/// A click on a drawn feature, dispatched to the detail view.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureClick {
    pub layer_id: LayerId,
    pub attributes: Attributes,
    pub position: Position,
}

pub type FeatureClickHandler = Arc<dyn Fn(FeatureClick) + Send + Sync>;

/// Handles currently on the map for one layer.
#[derive(Debug, Default)]
struct DrawnLayer {
    markers: Vec<MarkerHandle>,
    group: Option<GroupHandle>,
    features: Vec<FeatureHandle>,
}

impl DrawnLayer {
    fn handles(&self) -> impl Iterator<Item = Handle> + '_ {
        self.markers
            .iter()
            .copied()
            .map(Handle::Marker)
            .chain(self.group.map(Handle::Group))
    }
}

/// Render bookkeeping for every layer on one map.
pub struct RenderAdapter<B: MapBackend> {
    backend: B,
    layers: HashMap<LayerId, DrawnLayer>,
    on_click: Option<FeatureClickHandler>,
}

impl<B: MapBackend> RenderAdapter<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            layers: HashMap::new(),
            on_click: None,
        }
    }

    /// Dispatch feature clicks from every layer to `handler`.
    pub fn with_click_handler(mut self, handler: FeatureClickHandler) -> Self {
        self.on_click = Some(handler);
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Draw and show a layer's features, replacing whatever was drawn before.
    pub fn draw(
        &mut self,
        descriptor: &LayerDescriptor,
        features: &[CanonicalFeature],
    ) -> OverlayResult<()> {
        let fresh = self.build(descriptor, features)?;
        for handle in fresh.handles() {
            self.backend.show(handle);
        }
        debug!(
            layer = %descriptor.id,
            markers = fresh.markers.len(),
            geometries = fresh.features.len(),
            "Layer drawn"
        );

        if let Some(old) = self.layers.insert(descriptor.id.clone(), fresh) {
            self.remove(old);
        }
        Ok(())
    }

    /// Show a layer, drawing it first if nothing is on the map yet.
    pub fn show_layer(
        &mut self,
        descriptor: &LayerDescriptor,
        features: &[CanonicalFeature],
    ) -> OverlayResult<()> {
        match self.layers.get(&descriptor.id) {
            Some(drawn) => {
                for handle in drawn.handles() {
                    self.backend.show(handle);
                }
                Ok(())
            }
            None => self.draw(descriptor, features),
        }
    }

    /// Hide a layer's handles; they stay allocated for instant re-show.
    pub fn hide_layer(&mut self, id: &LayerId) {
        if let Some(drawn) = self.layers.get(id) {
            for handle in drawn.handles() {
                self.backend.hide(handle);
            }
        }
    }

    /// Remove a layer's handles from the map entirely.
    pub fn clear_layer(&mut self, id: &LayerId) {
        if let Some(old) = self.layers.remove(id) {
            self.remove(old);
        }
    }

    pub fn is_drawn(&self, id: &LayerId) -> bool {
        self.layers.contains_key(id)
    }

    /// `(markers, geometries)` currently drawn for a layer.
    pub fn drawn_counts(&self, id: &LayerId) -> (usize, usize) {
        self.layers
            .get(id)
            .map(|d| (d.markers.len(), d.features.len()))
            .unwrap_or((0, 0))
    }

    pub fn fit(&mut self, bounds: BoundingBox) {
        self.backend.fit_bounds(bounds);
    }

    fn build(
        &mut self,
        descriptor: &LayerDescriptor,
        features: &[CanonicalFeature],
    ) -> OverlayResult<DrawnLayer> {
        let mut drawn = DrawnLayer::default();
        match self.build_into(&mut drawn, descriptor, features) {
            Ok(()) => Ok(drawn),
            Err(e) => {
                warn!(layer = %descriptor.id, error = %e, "Render failed, rolling back");
                self.remove(drawn);
                Err(e)
            }
        }
    }

    fn build_into(
        &mut self,
        drawn: &mut DrawnLayer,
        descriptor: &LayerDescriptor,
        features: &[CanonicalFeature],
    ) -> OverlayResult<()> {
        for feature in features.iter().filter(|f| f.kind == FeatureKind::Marker) {
            let Some(position) = feature.position else {
                continue;
            };
            let handle = self
                .backend
                .create_marker(position, &descriptor.icon, &feature.title)?;
            drawn.markers.push(handle);
        }

        let items: Vec<GeometryItem<'_>> = features
            .iter()
            .filter(|f| f.kind != FeatureKind::Marker)
            .filter_map(|f| {
                f.geometry.as_ref().map(|geometry| GeometryItem {
                    feature_id: &f.feature_id,
                    geometry,
                    attributes: &f.attributes,
                })
            })
            .collect();
        if items.is_empty() {
            return Ok(());
        }

        let group = self.backend.create_group()?;
        drawn.group = Some(group);

        let style = descriptor.style.clone();
        self.backend
            .set_style(group, Arc::new(move |attributes: &Attributes| style.resolve(attributes)));

        if let Some(handler) = &self.on_click {
            let handler = handler.clone();
            let layer_id = descriptor.id.clone();
            self.backend.on_feature_click(
                group,
                Arc::new(move |attributes: &Attributes, position: Position| {
                    handler(FeatureClick {
                        layer_id: layer_id.clone(),
                        attributes: attributes.clone(),
                        position,
                    })
                }),
            );
        }

        drawn.features = self.backend.add_geometry(group, &items)?;
        Ok(())
    }

    fn remove(&mut self, drawn: DrawnLayer) {
        for marker in drawn.markers {
            self.backend.remove_marker(marker);
        }
        if let Some(group) = drawn.group {
            self.backend.remove_group(group);
        }
    }
}

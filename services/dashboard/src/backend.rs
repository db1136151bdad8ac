//! Map backend that logs drawing operations instead of rendering them.

use std::collections::HashMap;

use tracing::{debug, info};

use layer_engine::{
    ClickCallback, FeatureHandle, GeometryItem, GroupHandle, Handle, MapBackend, MarkerHandle,
    StyleFn,
};
use overlay_common::{BoundingBox, IconRef, OverlayError, OverlayResult, Position};

#[derive(Default)]
struct Group {
    features: usize,
    visible: bool,
    style: Option<StyleFn>,
}

#[derive(Default)]
pub struct TracingBackend {
    next_handle: u64,
    markers: HashMap<MarkerHandle, bool>,
    groups: HashMap<GroupHandle, Group>,
}

impl TracingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    pub fn visible_markers(&self) -> usize {
        self.markers.values().filter(|v| **v).count()
    }

    pub fn visible_geometries(&self) -> usize {
        self.groups
            .values()
            .filter(|g| g.visible)
            .map(|g| g.features)
            .sum()
    }
}

impl MapBackend for TracingBackend {
    fn create_marker(
        &mut self,
        position: Position,
        icon: &IconRef,
        title: &str,
    ) -> OverlayResult<MarkerHandle> {
        if !position.is_finite() {
            return Err(OverlayError::Render(format!(
                "marker '{}' has a non-finite position",
                title
            )));
        }
        let handle = MarkerHandle(self.next());
        self.markers.insert(handle, false);
        debug!(marker = handle.0, %position, icon = %icon.url, title, "Marker created");
        Ok(handle)
    }

    fn remove_marker(&mut self, handle: MarkerHandle) {
        self.markers.remove(&handle);
    }

    fn create_group(&mut self) -> OverlayResult<GroupHandle> {
        let handle = GroupHandle(self.next());
        self.groups.insert(handle, Group::default());
        Ok(handle)
    }

    fn remove_group(&mut self, group: GroupHandle) {
        self.groups.remove(&group);
    }

    fn add_geometry(
        &mut self,
        group: GroupHandle,
        items: &[GeometryItem<'_>],
    ) -> OverlayResult<Vec<FeatureHandle>> {
        let handles: Vec<FeatureHandle> = items.iter().map(|_| FeatureHandle(self.next())).collect();
        let entry = self
            .groups
            .get_mut(&group)
            .ok_or_else(|| OverlayError::Render(format!("unknown group {}", group.0)))?;
        entry.features += items.len();

        if let Some(style) = &entry.style {
            for item in items {
                let resolved = style(item.attributes);
                debug!(
                    feature = item.feature_id,
                    geometry = item.geometry.type_name(),
                    stroke = ?resolved.stroke,
                    "Geometry added"
                );
            }
        }
        Ok(handles)
    }

    fn set_style(&mut self, group: GroupHandle, style: StyleFn) {
        if let Some(entry) = self.groups.get_mut(&group) {
            entry.style = Some(style);
        }
    }

    fn on_feature_click(&mut self, group: GroupHandle, _callback: ClickCallback) {
        // No pointer input in a headless run.
        debug!(group = group.0, "Click handler bound");
    }

    fn show(&mut self, handle: Handle) {
        set_visible(self, handle, true);
    }

    fn hide(&mut self, handle: Handle) {
        set_visible(self, handle, false);
    }

    fn fit_bounds(&mut self, bounds: BoundingBox) {
        info!(
            min_lng = bounds.min_x,
            min_lat = bounds.min_y,
            max_lng = bounds.max_x,
            max_lat = bounds.max_y,
            "Viewport fitted"
        );
    }
}

fn set_visible(backend: &mut TracingBackend, handle: Handle, visible: bool) {
    match handle {
        Handle::Marker(m) => {
            if let Some(v) = backend.markers.get_mut(&m) {
                *v = visible;
            }
        }
        Handle::Group(g) => {
            if let Some(group) = backend.groups.get_mut(&g) {
                group.visible = visible;
            }
        }
    }
}

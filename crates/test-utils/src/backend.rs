//! In-memory map backend that records every call.
//!
//! Clones share one [`BackendLog`], so a test can hand one clone to the
//! render adapter and inspect the other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use layer_engine::{
    ClickCallback, FeatureHandle, GeometryItem, GroupHandle, Handle, MapBackend, MarkerHandle,
    StyleFn,
};
use overlay_common::{
    Attributes, BoundingBox, IconRef, OverlayError, OverlayResult, Position, ResolvedStyle,
};

#[derive(Debug, Clone)]
pub struct RecordedMarker {
    pub position: Position,
    pub icon_url: String,
    pub title: String,
    pub visible: bool,
}

#[derive(Debug, Clone)]
pub struct RecordedFeature {
    pub handle: FeatureHandle,
    pub feature_id: String,
    pub attributes: Attributes,
}

#[derive(Default)]
pub struct RecordedGroup {
    pub features: Vec<RecordedFeature>,
    pub style: Option<StyleFn>,
    pub click: Option<ClickCallback>,
    pub visible: bool,
}

/// One backend call, in the order it was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendEvent {
    MarkerCreated(MarkerHandle),
    MarkerRemoved(MarkerHandle),
    GroupCreated(GroupHandle),
    GroupRemoved(GroupHandle),
    Shown(Handle),
    Hidden(Handle),
}

/// Everything the backend has been asked to do.
#[derive(Default)]
pub struct BackendLog {
    next_handle: u64,
    pub markers: HashMap<MarkerHandle, RecordedMarker>,
    pub groups: HashMap<GroupHandle, RecordedGroup>,
    pub fits: Vec<BoundingBox>,
    pub markers_created: usize,
    pub markers_removed: usize,
    pub groups_removed: usize,
    pub events: Vec<BackendEvent>,
    /// Make `create_marker` fail
    pub fail_markers: bool,
}

impl BackendLog {
    fn next(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }
}

#[derive(Clone, Default)]
pub struct RecordingBackend {
    log: Arc<Mutex<BackendLog>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> MutexGuard<'_, BackendLog> {
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_fail_markers(&self, fail: bool) {
        self.log().fail_markers = fail;
    }

    /// Markers currently allocated (shown or hidden).
    pub fn marker_count(&self) -> usize {
        self.log().markers.len()
    }

    pub fn visible_marker_count(&self) -> usize {
        self.log().markers.values().filter(|m| m.visible).count()
    }

    pub fn group_count(&self) -> usize {
        self.log().groups.len()
    }

    /// Line/polygon features in visible groups.
    pub fn visible_feature_count(&self) -> usize {
        self.log()
            .groups
            .values()
            .filter(|g| g.visible)
            .map(|g| g.features.len())
            .sum()
    }

    pub fn fit_calls(&self) -> Vec<BoundingBox> {
        self.log().fits.clone()
    }

    pub fn markers_created(&self) -> usize {
        self.log().markers_created
    }

    pub fn events(&self) -> Vec<BackendEvent> {
        self.log().events.clone()
    }

    /// Index of the first matching event, if any.
    pub fn position_of(&self, event: BackendEvent) -> Option<usize> {
        self.log().events.iter().position(|e| *e == event)
    }

    /// Titles of visible markers, sorted.
    pub fn visible_titles(&self) -> Vec<String> {
        let mut titles: Vec<String> = self
            .log()
            .markers
            .values()
            .filter(|m| m.visible)
            .map(|m| m.title.clone())
            .collect();
        titles.sort();
        titles
    }

    /// Simulate a click on a drawn line/polygon. Returns `false` if no
    /// group holds the feature or the group has no click callback.
    pub fn click(&self, feature_id: &str, position: Position) -> bool {
        let target = {
            let log = self.log();
            log.groups.values().find_map(|g| {
                let feature = g.features.iter().find(|f| f.feature_id == feature_id)?;
                Some((g.click.clone()?, feature.attributes.clone()))
            })
        };
        // Called outside the lock so the callback may inspect the backend.
        match target {
            Some((callback, attributes)) => {
                callback(&attributes, position);
                true
            }
            None => false,
        }
    }

    /// Run the installed style function for a drawn feature.
    pub fn style_for(&self, feature_id: &str) -> Option<ResolvedStyle> {
        let log = self.log();
        log.groups.values().find_map(|g| {
            let feature = g.features.iter().find(|f| f.feature_id == feature_id)?;
            g.style.as_ref().map(|style| style(&feature.attributes))
        })
    }
}

impl MapBackend for RecordingBackend {
    fn create_marker(
        &mut self,
        position: Position,
        icon: &IconRef,
        title: &str,
    ) -> OverlayResult<MarkerHandle> {
        let mut log = self.log();
        if log.fail_markers {
            return Err(OverlayError::Render(format!("marker '{}' rejected", title)));
        }
        let handle = MarkerHandle(log.next());
        log.markers.insert(
            handle,
            RecordedMarker {
                position,
                icon_url: icon.url.clone(),
                title: title.to_string(),
                visible: false,
            },
        );
        log.markers_created += 1;
        log.events.push(BackendEvent::MarkerCreated(handle));
        Ok(handle)
    }

    fn remove_marker(&mut self, handle: MarkerHandle) {
        let mut log = self.log();
        if log.markers.remove(&handle).is_some() {
            log.markers_removed += 1;
            log.events.push(BackendEvent::MarkerRemoved(handle));
        }
    }

    fn create_group(&mut self) -> OverlayResult<GroupHandle> {
        let mut log = self.log();
        let handle = GroupHandle(log.next());
        log.groups.insert(handle, RecordedGroup::default());
        log.events.push(BackendEvent::GroupCreated(handle));
        Ok(handle)
    }

    fn remove_group(&mut self, group: GroupHandle) {
        let mut log = self.log();
        if log.groups.remove(&group).is_some() {
            log.groups_removed += 1;
            log.events.push(BackendEvent::GroupRemoved(group));
        }
    }

    fn add_geometry(
        &mut self,
        group: GroupHandle,
        items: &[GeometryItem<'_>],
    ) -> OverlayResult<Vec<FeatureHandle>> {
        let mut log = self.log();
        let handles: Vec<FeatureHandle> = items.iter().map(|_| FeatureHandle(log.next())).collect();
        let recorded = log
            .groups
            .get_mut(&group)
            .ok_or_else(|| OverlayError::Render(format!("unknown group {:?}", group)))?;
        for (item, handle) in items.iter().zip(&handles) {
            recorded.features.push(RecordedFeature {
                handle: *handle,
                feature_id: item.feature_id.to_string(),
                attributes: item.attributes.clone(),
            });
        }
        Ok(handles)
    }

    fn set_style(&mut self, group: GroupHandle, style: StyleFn) {
        if let Some(g) = self.log().groups.get_mut(&group) {
            g.style = Some(style);
        }
    }

    fn on_feature_click(&mut self, group: GroupHandle, callback: ClickCallback) {
        if let Some(g) = self.log().groups.get_mut(&group) {
            g.click = Some(callback);
        }
    }

    fn show(&mut self, handle: Handle) {
        let mut log = self.log();
        set_visible(&mut log, handle, true);
        log.events.push(BackendEvent::Shown(handle));
    }

    fn hide(&mut self, handle: Handle) {
        let mut log = self.log();
        set_visible(&mut log, handle, false);
        log.events.push(BackendEvent::Hidden(handle));
    }

    fn fit_bounds(&mut self, bounds: BoundingBox) {
        self.log().fits.push(bounds);
    }
}

fn set_visible(log: &mut BackendLog, handle: Handle, visible: bool) {
    match handle {
        Handle::Marker(m) => {
            if let Some(marker) = log.markers.get_mut(&m) {
                marker.visible = visible;
            }
        }
        Handle::Group(g) => {
            if let Some(group) = log.groups.get_mut(&g) {
                group.visible = visible;
            }
        }
    }
}

//! Canonical features: the only shape that flows past ingestion.

use serde::Serialize;

use overlay_common::{Attributes, LayerId, Position};

use crate::geojson::Geometry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    Marker,
    Line,
    Polygon,
}

/// A normalized overlay feature, decoupled from upstream field names.
///
/// `(layer_id, feature_id)` is unique; the same `feature_id` may appear
/// in different layers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalFeature {
    pub layer_id: LayerId,
    pub feature_id: String,
    pub kind: FeatureKind,
    /// Marker position, or the representative point of a line/polygon
    pub position: Option<Position>,
    /// Full geometry for lines and polygons
    pub geometry: Option<Geometry>,
    /// Preview attributes (at most five)
    pub attributes: Attributes,
    /// Marker title / tooltip text
    pub title: String,
}

impl CanonicalFeature {
    pub fn is_marker(&self) -> bool {
        self.kind == FeatureKind::Marker
    }

    /// Every coordinate this feature occupies on the map.
    pub fn extent_points(&self) -> Vec<Position> {
        match (&self.geometry, self.kind) {
            (Some(geometry), FeatureKind::Line | FeatureKind::Polygon) => geometry.vertices(),
            _ => self.position.into_iter().collect(),
        }
    }
}

//! Viewport fitting after a layer loads.

use overlay_common::BoundingBox;

use crate::feature::CanonicalFeature;

/// Default margin in degrees around a single-point layer (~500 m).
pub const DEFAULT_SINGLE_POINT_PADDING: f64 = 0.005;

/// Bounds covering every coordinate of every feature, or `None` when the
/// features occupy no finite coordinates.
pub fn layer_bounds(features: &[CanonicalFeature]) -> Option<BoundingBox> {
    BoundingBox::from_positions(features.iter().flat_map(|f| f.extent_points()))
}

/// Decides what the map should fit to after a load.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportPolicy {
    /// Margin applied when all features sit on one point
    pub single_point_padding: f64,
}

impl Default for ViewportPolicy {
    fn default() -> Self {
        Self {
            single_point_padding: DEFAULT_SINGLE_POINT_PADDING,
        }
    }
}

impl ViewportPolicy {
    /// Bounds to fit to, or `None` to leave the viewport alone.
    pub fn fit_bounds(&self, features: &[CanonicalFeature]) -> Option<BoundingBox> {
        let bounds = layer_bounds(features)?;
        if !bounds.is_finite() {
            return None;
        }
        Some(bounds.padded_if_degenerate(self.single_point_padding))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::FeatureKind;
    use crate::geojson::Geometry;
    use overlay_common::{Attributes, LayerId, Position};
    use serde_json::json;

    fn marker(id: &str, lat: f64, lng: f64) -> CanonicalFeature {
        CanonicalFeature {
            layer_id: LayerId::new("test"),
            feature_id: id.to_string(),
            kind: FeatureKind::Marker,
            position: Some(Position::new(lat, lng)),
            geometry: None,
            attributes: Attributes::new(),
            title: id.to_string(),
        }
    }

    #[test]
    fn test_empty_layer_has_no_bounds() {
        assert!(layer_bounds(&[]).is_none());
        assert!(ViewportPolicy::default().fit_bounds(&[]).is_none());
    }

    #[test]
    fn test_bounds_cover_markers() {
        let features = vec![marker("a", -6.1, 106.7), marker("b", -6.3, 106.9)];
        let bounds = layer_bounds(&features).unwrap();
        assert_eq!(bounds, BoundingBox::new(106.7, -6.3, 106.9, -6.1));
    }

    #[test]
    fn test_bounds_include_polygon_vertices() {
        let geometry = Geometry::parse_value(&json!({
            "type": "Polygon",
            "coordinates": [[[106.0, -6.0], [108.0, -6.0], [108.0, -8.0], [106.0, -8.0]]]
        }))
        .unwrap();
        let polygon = CanonicalFeature {
            kind: FeatureKind::Polygon,
            position: geometry.representative_point(),
            geometry: Some(geometry),
            ..marker("p:geom", 0.0, 0.0)
        };

        let bounds = layer_bounds(&[polygon]).unwrap();
        assert_eq!(bounds, BoundingBox::new(106.0, -8.0, 108.0, -6.0));
    }

    #[test]
    fn test_single_point_is_padded() {
        let policy = ViewportPolicy::default();
        let bounds = policy.fit_bounds(&[marker("a", -6.2, 106.8)]).unwrap();
        assert!(!bounds.is_degenerate());
        assert!(bounds.contains(Position::new(-6.2, 106.8)));
        assert!((bounds.width() - 2.0 * DEFAULT_SINGLE_POINT_PADDING).abs() < 1e-12);
    }
}

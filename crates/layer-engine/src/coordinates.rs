//! Coordinate extraction from raw records.
//!
//! Resolution order:
//! 1. each `(lat, lng)` field pair from the descriptor, numbers or numeric strings
//! 2. the embedded `geom` field: a Point directly, a (Multi)Polygon via its ring centroid
//!
//! `(0, 0)` and non-finite values are treated as "not set" at every step.

use tracing::{debug, warn};

use overlay_common::{LayerDescriptor, OverlayError, Position, RawRecord, GEOMETRY_FIELD};

use crate::geojson::Geometry;

/// Resolve a record's marker position, or `None` if nothing usable is present.
///
/// Never fails: a malformed `geom` field is logged and treated as absent.
pub fn extract(record: &RawRecord, descriptor: &LayerDescriptor) -> Option<Position> {
    if let Some(position) = from_fields(record, descriptor) {
        return Some(position);
    }

    let raw = record.get(GEOMETRY_FIELD)?;
    match Geometry::parse_value(raw) {
        Ok(geometry) => from_geometry(&geometry),
        Err(e) => {
            warn!(layer = %descriptor.id, error = %e, "Ignoring malformed geometry while extracting coordinates");
            None
        }
    }
}

/// Try every configured field pair in order.
pub fn from_fields(record: &RawRecord, descriptor: &LayerDescriptor) -> Option<Position> {
    descriptor.coordinate_fields.iter().find_map(|pair| {
        let lat = record.number(&pair.lat)?;
        let lng = record.number(&pair.lng)?;
        let position = Position::new(lat, lng);
        position.is_usable().then_some(position)
    })
}

/// Marker anchor derived from an already-parsed geometry.
///
/// Only points and polygons yield an anchor; lines are drawn without a marker.
pub fn from_geometry(geometry: &Geometry) -> Option<Position> {
    let position = match geometry {
        Geometry::Point { coordinates } => coordinates.position(),
        Geometry::Polygon { .. } | Geometry::MultiPolygon { .. } => geometry.ring_centroid()?,
        _ => return None,
    };
    position.is_usable().then_some(position)
}

/// Combine field and geometry resolution for the ingestor, which has
/// already parsed `geom` once.
pub(crate) fn resolve(
    record: &RawRecord,
    descriptor: &LayerDescriptor,
    geometry: Option<&Geometry>,
) -> Result<Position, OverlayError> {
    if let Some(position) = from_fields(record, descriptor) {
        return Ok(position);
    }
    if let Some(position) = geometry.and_then(from_geometry) {
        return Ok(position);
    }
    debug!(layer = %descriptor.id, "Record has no usable coordinates");
    Err(OverlayError::Coordinate(format!(
        "no usable position in fields {:?} or geometry",
        descriptor
            .coordinate_fields
            .iter()
            .map(|c| format!("{}/{}", c.lat, c.lng))
            .collect::<Vec<_>>()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use overlay_common::{CoordinateFields, GeometryKind};
    use serde_json::{json, Value};

    fn record(value: Value) -> RawRecord {
        RawRecord::from_value(value).unwrap()
    }

    fn descriptor() -> LayerDescriptor {
        LayerDescriptor::new("hydrants", "/api/hydrants", "data", GeometryKind::Point)
            .with_coordinate_fields(vec![
                CoordinateFields::new("latitude", "longitude"),
                CoordinateFields::new("latitude_s", "longitude_"),
            ])
    }

    #[test]
    fn test_numeric_and_string_fields_agree() {
        let d = descriptor();
        let numeric = extract(&record(json!({"latitude": -6.2146, "longitude": 106.8451})), &d);
        let text = extract(&record(json!({"latitude": "-6.2146", "longitude": "106.8451"})), &d);
        assert_eq!(numeric, Some(Position::new(-6.2146, 106.8451)));
        assert_eq!(numeric, text);
    }

    #[test]
    fn test_falls_through_to_second_pair() {
        let d = descriptor();
        let r = record(json!({
            "latitude": 0, "longitude": 0,
            "latitude_s": "-6.3", "longitude_": "106.7"
        }));
        assert_eq!(extract(&r, &d), Some(Position::new(-6.3, 106.7)));
    }

    #[test]
    fn test_zero_pair_is_unset() {
        let d = descriptor();
        assert_eq!(extract(&record(json!({"latitude": 0, "longitude": "0"})), &d), None);
    }

    #[test]
    fn test_nan_string_is_rejected() {
        let d = descriptor();
        assert_eq!(extract(&record(json!({"latitude": "NaN", "longitude": 106.8})), &d), None);
    }

    #[test]
    fn test_point_geometry_swaps_order() {
        let d = descriptor();
        let r = record(json!({"geom": {"type": "Point", "coordinates": [106.8, -6.2]}}));
        assert_eq!(extract(&r, &d), Some(Position::new(-6.2, 106.8)));
    }

    #[test]
    fn test_encoded_polygon_centroid() {
        let d = descriptor();
        let r = record(json!({
            "geom": r#"{"type":"Polygon","coordinates":[[[106.0,-6.0],[108.0,-6.0],[108.0,-8.0],[106.0,-8.0]]]}"#
        }));
        assert_eq!(extract(&r, &d), Some(Position::new(-7.0, 107.0)));
    }

    #[test]
    fn test_line_geometry_has_no_marker_position() {
        let d = descriptor();
        let r = record(json!({"geom": {"type": "LineString", "coordinates": [[106.0, -6.0], [107.0, -6.5]]}}));
        assert_eq!(extract(&r, &d), None);
    }

    #[test]
    fn test_malformed_geometry_returns_none() {
        let d = descriptor();
        assert_eq!(extract(&record(json!({"geom": "{\"type\": \"Poly"})), &d), None);
        assert_eq!(extract(&record(json!({})), &d), None);
    }

    #[test]
    fn test_resolve_reports_coordinate_error() {
        let d = descriptor();
        let err = resolve(&record(json!({"name": "x"})), &d, None).unwrap_err();
        assert!(matches!(err, OverlayError::Coordinate(_)));
    }
}

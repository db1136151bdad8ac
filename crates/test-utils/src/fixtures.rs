//! Common test fixtures for overlay tests.
//!
//! Coordinates are around central Jakarta so fixtures look like real
//! municipal asset data.

use serde_json::{json, Value};

use layer_engine::LayerRegistry;
use overlay_common::{CoordinateFields, GeometryKind, LayerDescriptor, RawRecord};

/// Base URL the fixture descriptors resolve against.
pub const BASE_URL: &str = "https://ioc.example.org/";

/// Common positions as `(lat, lng)`.
pub mod places {
    pub const CITY_HALL: (f64, f64) = (-6.1818, 106.8283);
    pub const MONAS: (f64, f64) = (-6.1754, 106.8272);
    pub const KOTA_TUA: (f64, f64) = (-6.1352, 106.8133);
}

/// Build a record from a JSON object literal.
///
/// # Panics
///
/// Panics if `value` is not an object.
pub fn record(value: Value) -> RawRecord {
    RawRecord::from_value(value).expect("fixture record must be a JSON object")
}

/// A record with `id`, `name` and numeric `latitude`/`longitude`.
pub fn point_record(id: impl Into<Value>, lat: f64, lng: f64) -> RawRecord {
    let id = id.into();
    record(json!({
        "id": id,
        "name": format!("Asset {}", id),
        "latitude": lat,
        "longitude": lng,
    }))
}

/// `n` point records spread along a short east-west line.
pub fn point_records(n: usize) -> Vec<RawRecord> {
    (0..n)
        .map(|i| point_record(i as u64 + 1, -6.2, 106.8 + i as f64 * 0.001))
        .collect()
}

/// A closed square polygon ring with its south-west corner at `(lat, lng)`.
pub fn square_polygon(lat: f64, lng: f64, size: f64) -> Value {
    json!({
        "type": "Polygon",
        "coordinates": [[
            [lng, lat],
            [lng + size, lat],
            [lng + size, lat + size],
            [lng, lat + size],
            [lng, lat]
        ]]
    })
}

/// A two-vertex `MultiLineString`.
pub fn line_geometry(from: (f64, f64), to: (f64, f64)) -> Value {
    json!({
        "type": "MultiLineString",
        "coordinates": [[[from.1, from.0], [to.1, to.0]]]
    })
}

/// Wrap records in a `{ key: [...] }` response envelope.
pub fn envelope(key: &str, records: &[RawRecord]) -> Value {
    let items: Vec<Value> = records
        .iter()
        .map(|r| Value::Object(r.clone().into_inner()))
        .collect();
    let mut body = serde_json::Map::new();
    body.insert(key.to_string(), Value::Array(items));
    Value::Object(body)
}

/// Point layer keyed `id` with `latitude`/`longitude` coordinates.
pub fn point_layer(id: &str) -> LayerDescriptor {
    LayerDescriptor::new(id, format!("/api/{}", id), id, GeometryKind::Point)
        .with_title_field("name")
}

/// Polygon layer with no coordinate fields; markers come from centroids.
pub fn polygon_layer(id: &str) -> LayerDescriptor {
    LayerDescriptor::new(id, format!("/api/{}", id), "data", GeometryKind::Polygon)
        .with_coordinate_fields(Vec::new())
}

/// Mixed line/polygon layer using the `latitude_s`/`longitude_` field pair.
pub fn mixed_layer(id: &str) -> LayerDescriptor {
    LayerDescriptor::new(id, format!("/api/{}", id), "data", GeometryKind::Mixed)
        .with_id_field("gid")
        .with_coordinate_fields(vec![CoordinateFields::new("latitude_s", "longitude_")])
}

/// Registry over the given descriptors, resolved against [`BASE_URL`].
///
/// # Panics
///
/// Panics if any descriptor is invalid.
pub fn registry(descriptors: Vec<LayerDescriptor>) -> LayerRegistry {
    LayerRegistry::from_descriptors(descriptors, Some(BASE_URL))
        .expect("fixture descriptors must be valid")
}

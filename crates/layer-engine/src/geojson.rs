//! GeoJSON geometry as delivered in the `geom` field of raw records.
//!
//! Upstream endpoints send either a native GeoJSON object or the same
//! object JSON-encoded as a string; [`Geometry::parse_value`] accepts both.
//! Coordinates are GeoJSON order (`[longitude, latitude]`); conversion to
//! [`Position`] always goes through [`Position::from_lng_lat`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use overlay_common::{OverlayError, OverlayResult, Position};

/// A `[longitude, latitude]` pair. Extra ordinates (altitude) are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "[f64; 2]")]
pub struct LngLat(pub [f64; 2]);

impl TryFrom<Vec<f64>> for LngLat {
    type Error = String;

    fn try_from(values: Vec<f64>) -> Result<Self, Self::Error> {
        match values.as_slice() {
            [lng, lat, ..] => Ok(LngLat([*lng, *lat])),
            _ => Err(format!("position needs 2 ordinates, got {}", values.len())),
        }
    }
}

impl From<LngLat> for [f64; 2] {
    fn from(p: LngLat) -> Self {
        p.0
    }
}

impl LngLat {
    pub fn position(&self) -> Position {
        Position::from_lng_lat(self.0)
    }
}

/// GeoJSON geometry types found in overlay endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    Point {
        coordinates: LngLat,
    },

    LineString {
        coordinates: Vec<LngLat>,
    },

    MultiLineString {
        coordinates: Vec<Vec<LngLat>>,
    },

    /// Linear rings; the first is the exterior.
    Polygon {
        coordinates: Vec<Vec<LngLat>>,
    },

    MultiPolygon {
        coordinates: Vec<Vec<Vec<LngLat>>>,
    },
}

impl Geometry {
    /// Parse a `geom` field value: a GeoJSON object or a JSON string holding one.
    pub fn parse_value(value: &Value) -> OverlayResult<Self> {
        let geometry: Geometry = match value {
            Value::String(encoded) => serde_json::from_str(encoded)?,
            Value::Object(_) => serde_json::from_value(value.clone())?,
            other => {
                return Err(OverlayError::Parse(format!(
                    "expected GeoJSON object or string, got {}",
                    json_type_name(other)
                )))
            }
        };
        geometry.validate()?;
        Ok(geometry)
    }

    /// Reject geometries without vertices or with non-finite ordinates.
    pub fn validate(&self) -> OverlayResult<()> {
        let vertices = self.vertices();
        if vertices.is_empty() {
            return Err(OverlayError::Parse(format!("{} has no vertices", self.type_name())));
        }
        if vertices.iter().any(|p| !p.is_finite()) {
            return Err(OverlayError::Parse(format!(
                "{} has non-finite coordinates",
                self.type_name()
            )));
        }
        Ok(())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Geometry::Point { .. } => "Point",
            Geometry::LineString { .. } => "LineString",
            Geometry::MultiLineString { .. } => "MultiLineString",
            Geometry::Polygon { .. } => "Polygon",
            Geometry::MultiPolygon { .. } => "MultiPolygon",
        }
    }

    pub fn is_line(&self) -> bool {
        matches!(self, Geometry::LineString { .. } | Geometry::MultiLineString { .. })
    }

    pub fn is_polygon(&self) -> bool {
        matches!(self, Geometry::Polygon { .. } | Geometry::MultiPolygon { .. })
    }

    /// Every vertex of every part, in (lat, lng) order.
    pub fn vertices(&self) -> Vec<Position> {
        match self {
            Geometry::Point { coordinates } => vec![coordinates.position()],
            Geometry::LineString { coordinates } => positions(coordinates),
            Geometry::MultiLineString { coordinates } | Geometry::Polygon { coordinates } => {
                coordinates.iter().flat_map(|part| positions(part)).collect()
            }
            Geometry::MultiPolygon { coordinates } => coordinates
                .iter()
                .flatten()
                .flat_map(|ring| positions(ring))
                .collect(),
        }
    }

    /// Arithmetic mean of the first ring's vertices (first polygon if multi).
    ///
    /// Not an area centroid. Vertices are averaged exactly as listed, so a
    /// closed ring counts its repeated first vertex twice.
    pub fn ring_centroid(&self) -> Option<Position> {
        let ring = match self {
            Geometry::Polygon { coordinates } => coordinates.first()?,
            Geometry::MultiPolygon { coordinates } => coordinates.first()?.first()?,
            _ => return None,
        };
        mean_position(ring)
    }

    /// Anchor point for a geometry: the point itself, the ring centroid for
    /// polygons, or the mean of the first line's vertices for lines.
    pub fn representative_point(&self) -> Option<Position> {
        match self {
            Geometry::Point { coordinates } => Some(coordinates.position()),
            Geometry::LineString { coordinates } => mean_position(coordinates),
            Geometry::MultiLineString { coordinates } => mean_position(coordinates.first()?),
            Geometry::Polygon { .. } | Geometry::MultiPolygon { .. } => self.ring_centroid(),
        }
    }
}

fn positions(coords: &[LngLat]) -> Vec<Position> {
    coords.iter().map(LngLat::position).collect()
}

fn mean_position(coords: &[LngLat]) -> Option<Position> {
    if coords.is_empty() {
        return None;
    }
    let n = coords.len() as f64;
    let (sum_lng, sum_lat) = coords
        .iter()
        .fold((0.0, 0.0), |(x, y), c| (x + c.0[0], y + c.0[1]));
    Some(Position::new(sum_lat / n, sum_lng / n))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

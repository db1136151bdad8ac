//! Layer descriptors.
//!
//! One [`LayerDescriptor`] per overlay type. Descriptors are immutable once
//! the registry is built; everything the engine knows about an upstream
//! endpoint's quirks lives here.

use serde::{Deserialize, Serialize};

use crate::{OverlayError, OverlayResult, StyleSpec};

/// Unique identifier for a layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerId(pub String);

impl LayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for LayerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Geometry an endpoint is expected to deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometryKind {
    Point,
    Line,
    Polygon,
    MultiPolygon,
    Mixed,
}

impl GeometryKind {
    pub fn accepts_lines(&self) -> bool {
        matches!(self, GeometryKind::Line | GeometryKind::Mixed)
    }

    pub fn accepts_polygons(&self) -> bool {
        matches!(
            self,
            GeometryKind::Polygon | GeometryKind::MultiPolygon | GeometryKind::Mixed
        )
    }

    /// Layers that draw markers from plain coordinate fields.
    pub fn uses_coordinate_fields(&self) -> bool {
        matches!(self, GeometryKind::Point | GeometryKind::Mixed)
    }
}

/// A latitude/longitude field-name pair to try on raw records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinateFields {
    pub lat: String,
    pub lng: String,
}

impl CoordinateFields {
    pub fn new(lat: impl Into<String>, lng: impl Into<String>) -> Self {
        Self {
            lat: lat.into(),
            lng: lng.into(),
        }
    }
}

/// Marker icon reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IconRef {
    pub url: String,
    /// Icon size in pixels [width, height]
    #[serde(default = "default_icon_size")]
    pub size: [u32; 2],
    /// Pixel offset of the anchor point from the top-left corner
    #[serde(default)]
    pub anchor: Option<[i32; 2]>,
}

fn default_icon_size() -> [u32; 2] {
    [25, 41]
}

impl Default for IconRef {
    fn default() -> Self {
        Self {
            url: "/icons/marker-default.png".to_string(),
            size: default_icon_size(),
            anchor: None,
        }
    }
}

/// Static description of one overlay type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerDescriptor {
    pub id: LayerId,

    /// Human-readable title
    #[serde(default)]
    pub title: String,

    /// Absolute URL, or a path resolved against the configured base URL
    pub endpoint: String,

    /// Key of the record array in the JSON envelope
    pub response_key: String,

    pub geometry_kind: GeometryKind,

    #[serde(default = "default_id_field")]
    pub id_field: String,

    /// Tried in order until one yields a usable position
    #[serde(default = "default_coordinate_fields")]
    pub coordinate_fields: Vec<CoordinateFields>,

    /// Attribute used as marker title
    #[serde(default)]
    pub title_field: Option<String>,

    #[serde(default)]
    pub style: StyleSpec,

    #[serde(default)]
    pub icon: IconRef,

    /// Fit the viewport after each successful load
    #[serde(default = "default_fit_on_load")]
    pub fit_on_load: bool,
}

fn default_id_field() -> String {
    "id".to_string()
}

fn default_coordinate_fields() -> Vec<CoordinateFields> {
    vec![CoordinateFields::new("latitude", "longitude")]
}

fn default_fit_on_load() -> bool {
    true
}

/// Name of the embedded GeoJSON field on raw records.
pub const GEOMETRY_FIELD: &str = "geom";

impl LayerDescriptor {
    /// Minimal descriptor with defaults for everything optional.
    pub fn new(
        id: impl Into<String>,
        endpoint: impl Into<String>,
        response_key: impl Into<String>,
        geometry_kind: GeometryKind,
    ) -> Self {
        let id = LayerId::new(id);
        Self {
            title: id.0.clone(),
            id,
            endpoint: endpoint.into(),
            response_key: response_key.into(),
            geometry_kind,
            id_field: default_id_field(),
            coordinate_fields: default_coordinate_fields(),
            title_field: None,
            style: StyleSpec::default(),
            icon: IconRef::default(),
            fit_on_load: default_fit_on_load(),
        }
    }

    pub fn with_coordinate_fields(mut self, fields: Vec<CoordinateFields>) -> Self {
        self.coordinate_fields = fields;
        self
    }

    pub fn with_id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = field.into();
        self
    }

    pub fn with_title_field(mut self, field: impl Into<String>) -> Self {
        self.title_field = Some(field.into());
        self
    }

    /// Fields that never appear in the attribute preview.
    pub fn is_reserved_field(&self, name: &str) -> bool {
        name == GEOMETRY_FIELD
            || name == self.id_field
            || self
                .coordinate_fields
                .iter()
                .any(|c| c.lat == name || c.lng == name)
    }

    /// Structural checks that do not depend on the base URL.
    pub fn validate(&self) -> OverlayResult<()> {
        let fail = |msg: &str| -> OverlayResult<()> {
            Err(OverlayError::Config(format!("layer '{}': {}", self.id, msg)))
        };

        if self.id.0.trim().is_empty() {
            return Err(OverlayError::Config("layer id must not be empty".to_string()));
        }
        if self.endpoint.trim().is_empty() {
            return fail("endpoint must not be empty");
        }
        if self.response_key.trim().is_empty() {
            return fail("response_key must not be empty");
        }
        if self.id_field.trim().is_empty() {
            return fail("id_field must not be empty");
        }
        if self.geometry_kind.uses_coordinate_fields() && self.coordinate_fields.is_empty() {
            return fail("point layers need at least one coordinate field pair");
        }
        if self
            .coordinate_fields
            .iter()
            .any(|c| c.lat.trim().is_empty() || c.lng.trim().is_empty())
        {
            return fail("coordinate field names must not be empty");
        }
        Ok(())
    }
}

//! Common types shared across the IOC overlay crates.

pub mod bbox;
pub mod error;
pub mod layer;
pub mod position;
pub mod record;
pub mod style;

pub use bbox::BoundingBox;
pub use error::{ErrorScope, OverlayError, OverlayResult};
pub use layer::{CoordinateFields, GeometryKind, IconRef, LayerDescriptor, LayerId, GEOMETRY_FIELD};
pub use position::Position;
pub use record::RawRecord;
pub use style::{Color, ResolvedStyle, StyleRule, StyleSpec};

/// Pruned attribute bag carried by canonical features, in source key order.
pub type Attributes = serde_json::Map<String, serde_json::Value>;

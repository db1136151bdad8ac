//! Overlay layer engine for the IOC map dashboard.
//!
//! Each overlay type is described once by a [`LayerDescriptor`] and driven
//! through the same pipeline:
//!
//! ```text
//! toggle -> LayerController -> LayerFetcher -> ingest -> RenderAdapter -> MapBackend
//!                                                              \-> ViewportPolicy
//! ```
//!
//! Failures are contained per record (bad geometry, missing coordinates)
//! and per layer (network, render); no layer's failure reaches another.

pub mod coordinates;
pub mod feature;
pub mod fetch;
pub mod geojson;
pub mod ingest;
pub mod lifecycle;
pub mod registry;
pub mod render;
pub mod viewport;

pub use coordinates::extract;
pub use feature::{CanonicalFeature, FeatureKind};
pub use fetch::{extract_records, HttpFetcher, LayerFetcher};
pub use geojson::Geometry;
pub use ingest::{ingest, ingest_with_report, IngestReport, ATTRIBUTE_PREVIEW_LIMIT};
pub use lifecycle::{ControllerConfig, LayerController, LayerStatus, Lifecycle};
pub use registry::LayerRegistry;
pub use render::{
    ClickCallback, FeatureClick, FeatureClickHandler, FeatureHandle, GeometryItem, GroupHandle,
    Handle, MapBackend, MarkerHandle, RenderAdapter, StyleFn,
};
pub use viewport::{layer_bounds, ViewportPolicy};

pub use overlay_common::{
    Attributes, BoundingBox, LayerDescriptor, LayerId, OverlayError, OverlayResult, Position,
    RawRecord,
};

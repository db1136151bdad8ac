//! Raw record ingestion.
//!
//! Converts one endpoint's record list into [`CanonicalFeature`]s. A record
//! yields up to two features: a marker when a position resolves, and a
//! line/polygon when its `geom` field holds one. Failures stay with the
//! record that caused them.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use overlay_common::{Attributes, LayerDescriptor, OverlayError, RawRecord, GEOMETRY_FIELD};

use crate::coordinates;
use crate::feature::{CanonicalFeature, FeatureKind};
use crate::geojson::Geometry;

/// Maximum number of attributes kept for the detail preview.
pub const ATTRIBUTE_PREVIEW_LIMIT: usize = 5;

/// Outcome of ingesting one batch.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub features: Vec<CanonicalFeature>,
    pub records: usize,
    /// Records whose `geom` could not be parsed
    pub parse_errors: usize,
    /// Records that produced no marker
    pub coordinate_misses: usize,
    /// Geometries of a kind the layer does not draw
    pub skipped_geometries: usize,
}

impl IngestReport {
    pub fn marker_count(&self) -> usize {
        self.features.iter().filter(|f| f.is_marker()).count()
    }
}

/// Ingest a batch of records for a layer.
pub fn ingest(records: &[RawRecord], descriptor: &LayerDescriptor) -> Vec<CanonicalFeature> {
    ingest_with_report(records, descriptor).features
}

/// Ingest a batch and report per-record failures.
pub fn ingest_with_report(records: &[RawRecord], descriptor: &LayerDescriptor) -> IngestReport {
    let mut report = IngestReport {
        records: records.len(),
        ..IngestReport::default()
    };
    let mut ids = FeatureIds::default();

    for (index, record) in records.iter().enumerate() {
        let geometry = match parse_geometry(record) {
            Ok(g) => g,
            Err(e) => {
                report.parse_errors += 1;
                warn!(layer = %descriptor.id, record = index, error = %e, "Skipping unparseable geometry");
                None
            }
        };

        let base_id = record_identity(record, descriptor, index);
        let attributes = preview_attributes(record, descriptor);
        let title = descriptor
            .title_field
            .as_deref()
            .and_then(|field| record.text(field))
            .unwrap_or_else(|| base_id.clone());

        match coordinates::resolve(record, descriptor, geometry.as_ref()) {
            Ok(position) => report.features.push(CanonicalFeature {
                layer_id: descriptor.id.clone(),
                feature_id: ids.claim(base_id.clone()),
                kind: FeatureKind::Marker,
                position: Some(position),
                geometry: None,
                attributes: attributes.clone(),
                title: title.clone(),
            }),
            Err(e) => {
                report.coordinate_misses += 1;
                debug!(layer = %descriptor.id, record = index, error = %e, "No marker for record");
            }
        }

        let Some(geometry) = geometry else {
            continue;
        };
        let kind = if geometry.is_line() && descriptor.geometry_kind.accepts_lines() {
            FeatureKind::Line
        } else if geometry.is_polygon() && descriptor.geometry_kind.accepts_polygons() {
            FeatureKind::Polygon
        } else {
            if !matches!(geometry, Geometry::Point { .. }) {
                report.skipped_geometries += 1;
                debug!(
                    layer = %descriptor.id,
                    record = index,
                    geometry = geometry.type_name(),
                    "Geometry type not drawn by this layer"
                );
            }
            continue;
        };

        report.features.push(CanonicalFeature {
            layer_id: descriptor.id.clone(),
            feature_id: ids.claim(format!("{}:geom", base_id)),
            kind,
            position: geometry.representative_point(),
            geometry: Some(geometry),
            attributes,
            title,
        });
    }

    info!(
        layer = %descriptor.id,
        records = report.records,
        features = report.features.len(),
        parse_errors = report.parse_errors,
        coordinate_misses = report.coordinate_misses,
        "Ingested layer records"
    );
    report
}

/// `Ok(None)` when the record carries no geometry at all.
fn parse_geometry(record: &RawRecord) -> Result<Option<Geometry>, OverlayError> {
    match record.get(GEOMETRY_FIELD) {
        None => Ok(None),
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(value) => Geometry::parse_value(value).map(Some),
    }
}

/// Stable identity from the descriptor's id field, or the record index.
fn record_identity(record: &RawRecord, descriptor: &LayerDescriptor, index: usize) -> String {
    record
        .text(&descriptor.id_field)
        .unwrap_or_else(|| format!("#{}", index))
}

/// First non-null attributes in source order, minus geometry/coordinate/id fields.
fn preview_attributes(record: &RawRecord, descriptor: &LayerDescriptor) -> Attributes {
    record
        .iter()
        .filter(|(key, value)| !value.is_null() && !descriptor.is_reserved_field(key))
        .take(ATTRIBUTE_PREVIEW_LIMIT)
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Hands out feature ids unique within one layer.
#[derive(Default)]
struct FeatureIds {
    seen: HashMap<String, usize>,
}

impl FeatureIds {
    fn claim(&mut self, id: String) -> String {
        let count = self.seen.entry(id.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            id
        } else {
            let unique = format!("{}~{}", id, *count - 1);
            // A literal "x~1" upstream id could collide with a generated one.
            if self.seen.contains_key(&unique) {
                return self.claim(unique);
            }
            self.seen.insert(unique.clone(), 1);
            unique
        }
    }
}

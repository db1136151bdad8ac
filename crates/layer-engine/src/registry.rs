//! Layer descriptor registry.
//!
//! Loads the descriptor table from YAML (`config/layers.yaml`), resolves
//! relative endpoints against the dashboard's base URL, and validates
//! everything once at start-up. After construction the registry is
//! read-only.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use reqwest::Url;
use serde::Deserialize;
use tracing::info;

use overlay_common::{LayerDescriptor, LayerId, OverlayError, OverlayResult};

#[derive(Debug, Deserialize)]
struct YamlLayerFile {
    layers: Vec<LayerDescriptor>,
}

/// Immutable table of layer descriptors, in configuration order.
#[derive(Debug, Default)]
pub struct LayerRegistry {
    order: Vec<LayerId>,
    layers: HashMap<LayerId, Arc<LayerDescriptor>>,
}

impl LayerRegistry {
    /// Validate descriptors and resolve their endpoints.
    ///
    /// Relative endpoints require `base_url`.
    pub fn from_descriptors(
        descriptors: Vec<LayerDescriptor>,
        base_url: Option<&str>,
    ) -> OverlayResult<Self> {
        let base = base_url
            .map(|b| {
                Url::parse(b)
                    .map_err(|e| OverlayError::Config(format!("invalid base url '{}': {}", b, e)))
            })
            .transpose()?;

        let mut registry = LayerRegistry::default();
        for mut descriptor in descriptors {
            descriptor.validate()?;
            descriptor.endpoint = resolve_endpoint(&descriptor, base.as_ref())?;

            if registry.layers.contains_key(&descriptor.id) {
                return Err(OverlayError::Config(format!(
                    "duplicate layer id '{}'",
                    descriptor.id
                )));
            }
            registry.order.push(descriptor.id.clone());
            registry
                .layers
                .insert(descriptor.id.clone(), Arc::new(descriptor));
        }

        info!(layers = registry.len(), "Layer registry loaded");
        Ok(registry)
    }

    /// Parse a YAML document with a top-level `layers:` list.
    pub fn from_yaml_str(yaml: &str, base_url: Option<&str>) -> OverlayResult<Self> {
        let file: YamlLayerFile = serde_yaml::from_str(yaml)
            .map_err(|e| OverlayError::Config(format!("failed to parse layer config: {}", e)))?;
        Self::from_descriptors(file.layers, base_url)
    }

    /// Load a layer configuration file.
    pub fn load_from_file(path: impl AsRef<Path>, base_url: Option<&str>) -> OverlayResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            OverlayError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&content, base_url)
    }

    pub fn lookup(&self, id: &LayerId) -> OverlayResult<Arc<LayerDescriptor>> {
        self.layers
            .get(id)
            .cloned()
            .ok_or_else(|| OverlayError::UnknownLayer(id.to_string()))
    }

    pub fn contains(&self, id: &LayerId) -> bool {
        self.layers.contains_key(id)
    }

    /// Layer ids in configuration order.
    pub fn ids(&self) -> &[LayerId] {
        &self.order
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<LayerDescriptor>> {
        self.order.iter().filter_map(|id| self.layers.get(id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

fn resolve_endpoint(descriptor: &LayerDescriptor, base: Option<&Url>) -> OverlayResult<String> {
    let endpoint = descriptor.endpoint.trim();
    if let Ok(url) = Url::parse(endpoint) {
        return match url.scheme() {
            "http" | "https" => Ok(url.to_string()),
            scheme => Err(OverlayError::Config(format!(
                "layer '{}': unsupported endpoint scheme '{}'",
                descriptor.id, scheme
            ))),
        };
    }

    let base = base.ok_or_else(|| {
        OverlayError::Config(format!(
            "layer '{}': relative endpoint '{}' needs a base url",
            descriptor.id, endpoint
        ))
    })?;
    base.join(endpoint).map(|u| u.to_string()).map_err(|e| {
        OverlayError::Config(format!(
            "layer '{}': invalid endpoint '{}': {}",
            descriptor.id, endpoint, e
        ))
    })
}

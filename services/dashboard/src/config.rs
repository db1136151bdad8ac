//! Dashboard configuration.
//!
//! Loaded from `config/dashboard.yaml`. `${VAR}` references are expanded
//! from the environment before parsing; unresolved references are left in
//! place so that a missing map credential is reported as such rather than
//! failing the whole file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Url;
use serde::Deserialize;
use tracing::debug;

use overlay_common::{LayerId, OverlayError, OverlayResult};

#[derive(Debug, Clone, Deserialize)]
pub struct DashboardConfig {
    /// Base URL for relative layer and telemetry endpoints
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub map: MapConfig,

    #[serde(default = "default_layers_file")]
    pub layers_file: PathBuf,

    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Layers enabled at start-up
    #[serde(default)]
    pub initial_layers: Vec<LayerId>,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_layers_file() -> PathBuf {
    PathBuf::from("config/layers.yaml")
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MapConfig {
    /// Map tile provider API key
    #[serde(default)]
    pub provider_key: Option<String>,
}

impl MapConfig {
    /// The provider credential, or a `Config` error that disables the map.
    pub fn require_credential(&self) -> OverlayResult<&str> {
        match self.provider_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() && !key.contains("${") => Ok(key),
            Some(key) if key.contains("${") => Err(OverlayError::Config(format!(
                "map provider key references an unset variable: {}",
                key
            ))),
            _ => Err(OverlayError::Config(
                "map provider key is not configured".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    #[serde(default)]
    pub endpoints: Vec<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            endpoints: Vec::new(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    15 * 60
}

impl DashboardConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let expanded = expand_env(raw);
        let config: DashboardConfig = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        debug!(
            layers_file = %config.layers_file.display(),
            initial_layers = config.initial_layers.len(),
            telemetry_endpoints = config.telemetry.endpoints.len(),
            "Dashboard config loaded"
        );
        Ok(config)
    }

    fn validate(&self) -> OverlayResult<()> {
        if self.telemetry.ttl_secs == 0 {
            return Err(OverlayError::Config(
                "telemetry.ttl_secs must be greater than zero".to_string(),
            ));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(OverlayError::Config(
                "fetch_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn telemetry_ttl(&self) -> Duration {
        Duration::from_secs(self.telemetry.ttl_secs)
    }

    /// Telemetry endpoints with relative paths joined onto `base_url`.
    pub fn telemetry_endpoints(&self) -> OverlayResult<Vec<String>> {
        let base = self
            .base_url
            .as_deref()
            .map(|b| {
                Url::parse(b)
                    .map_err(|e| OverlayError::Config(format!("invalid base url '{}': {}", b, e)))
            })
            .transpose()?;

        self.telemetry
            .endpoints
            .iter()
            .map(|endpoint| {
                if Url::parse(endpoint).is_ok() {
                    return Ok(endpoint.clone());
                }
                let base = base.as_ref().ok_or_else(|| {
                    OverlayError::Config(format!(
                        "relative telemetry endpoint '{}' needs a base url",
                        endpoint
                    ))
                })?;
                base.join(endpoint).map(|u| u.to_string()).map_err(|e| {
                    OverlayError::Config(format!("invalid telemetry endpoint '{}': {}", endpoint, e))
                })
            })
            .collect()
    }
}

/// Expand `${VAR}` from the environment, leaving unknown variables as-is.
fn expand_env(raw: &str) -> String {
    shellexpand::env_with_context_no_errors(raw, |name| std::env::var(name).ok()).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DashboardConfig::from_yaml_str("base_url: https://ioc.example.org/\n").unwrap();
        assert_eq!(config.layers_file, PathBuf::from("config/layers.yaml"));
        assert_eq!(config.fetch_timeout(), Duration::from_secs(30));
        assert_eq!(config.telemetry_ttl(), Duration::from_secs(900));
        assert!(config.initial_layers.is_empty());
    }

    #[test]
    fn test_env_expansion() {
        std::env::set_var("DASHBOARD_TEST_MAP_KEY", "pk.test-123");
        let config =
            DashboardConfig::from_yaml_str("map:\n  provider_key: ${DASHBOARD_TEST_MAP_KEY}\n")
                .unwrap();
        assert_eq!(config.map.require_credential().unwrap(), "pk.test-123");
    }

    #[test]
    fn test_unset_credential_is_config_error() {
        let config = DashboardConfig::from_yaml_str(
            "map:\n  provider_key: ${DASHBOARD_TEST_UNSET_VARIABLE}\n",
        )
        .unwrap();
        let err = config.map.require_credential().unwrap_err();
        assert!(matches!(err, OverlayError::Config(_)));
        assert!(err.is_user_visible());
    }

    #[test]
    fn test_missing_credential_is_config_error() {
        let config = DashboardConfig::from_yaml_str("map: {}\n").unwrap();
        assert!(config.map.require_credential().is_err());

        let blank = DashboardConfig::from_yaml_str("map:\n  provider_key: '  '\n").unwrap();
        assert!(blank.map.require_credential().is_err());
    }

    #[test]
    fn test_telemetry_endpoints_resolve() {
        let config = DashboardConfig::from_yaml_str(
            r#"
base_url: https://ioc.example.org/
telemetry:
  ttl_secs: 600
  endpoints:
    - api/device-status
    - https://scada.example.org/status
"#,
        )
        .unwrap();
        assert_eq!(
            config.telemetry_endpoints().unwrap(),
            vec![
                "https://ioc.example.org/api/device-status".to_string(),
                "https://scada.example.org/status".to_string(),
            ]
        );
        assert_eq!(config.telemetry_ttl(), Duration::from_secs(600));
    }

    #[test]
    fn test_zero_ttl_is_rejected() {
        let err = DashboardConfig::from_yaml_str("telemetry:\n  ttl_secs: 0\n").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OverlayError>(),
            Some(OverlayError::Config(_))
        ));
    }

    #[test]
    fn test_zero_fetch_timeout_is_rejected() {
        assert!(DashboardConfig::from_yaml_str("fetch_timeout_secs: 0\n").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dashboard.yaml");
        std::fs::write(&path, "fetch_timeout_secs: 10\ninitial_layers: [cctv, hydrants]\n")
            .unwrap();

        let config = DashboardConfig::load(&path).unwrap();
        assert_eq!(config.fetch_timeout(), Duration::from_secs(10));
        assert_eq!(
            config.initial_layers,
            vec![LayerId::new("cctv"), LayerId::new("hydrants")]
        );
    }
}

//! IOC map dashboard driver.
//!
//! Loads the layer table and dashboard configuration, enables the start-up
//! layers against a logging map backend, reports per-layer status, and
//! polls device telemetry:
//! - A missing map credential disables the map surface, not telemetry
//! - Each layer loads independently; one failing endpoint affects nothing else
//! - `--once` polls telemetry a single time and exits

mod backend;
mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use futures::future::join_all;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use layer_engine::{
    ControllerConfig, FeatureClick, HttpFetcher, LayerController, LayerId, LayerRegistry,
    RenderAdapter,
};
use ttl_cache::{HttpTelemetrySource, StatusPoller};

use backend::TracingBackend;
use config::DashboardConfig;

#[derive(Parser, Debug)]
#[command(name = "dashboard")]
#[command(about = "Headless IOC map dashboard: overlay layers and device telemetry")]
struct Args {
    /// Dashboard configuration file
    #[arg(long, env = "DASHBOARD_CONFIG", default_value = "config/dashboard.yaml")]
    config: PathBuf,

    /// Layer table (overrides `layers_file` from the config)
    #[arg(long, env = "DASHBOARD_LAYERS")]
    layers: Option<PathBuf>,

    /// Layer to enable at start-up; repeatable (overrides `initial_layers`)
    #[arg(long = "layer")]
    layer: Vec<String>,

    /// Poll telemetry once and exit (vs polling until Ctrl-C)
    #[arg(long)]
    once: bool,

    /// Log level
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .json()
        .init();

    info!("Starting IOC dashboard");

    let config = DashboardConfig::load(&args.config)?;

    match config.map.require_credential() {
        Ok(_) => run_map(&args, &config).await?,
        Err(e) => error!(error = %e, "Map surface disabled"),
    }

    run_telemetry(&config, args.once).await
}

async fn run_map(args: &Args, config: &DashboardConfig) -> Result<()> {
    let layers_file = args.layers.as_ref().unwrap_or(&config.layers_file);
    let registry = LayerRegistry::load_from_file(layers_file, config.base_url.as_deref())
        .with_context(|| format!("Failed to load layers from {}", layers_file.display()))?;

    let fetcher = HttpFetcher::new(config.fetch_timeout())?;
    let render = RenderAdapter::new(TracingBackend::new()).with_click_handler(Arc::new(
        |click: FeatureClick| {
            info!(
                layer = %click.layer_id,
                lat = click.position.lat,
                lng = click.position.lng,
                attributes = %serde_json::Value::Object(click.attributes),
                "Feature clicked"
            );
        },
    ));
    let controller = LayerController::new(
        Arc::new(registry),
        fetcher,
        render,
        ControllerConfig {
            fetch_timeout: config.fetch_timeout(),
            ..ControllerConfig::default()
        },
    );

    let initial: Vec<LayerId> = if args.layer.is_empty() {
        config.initial_layers.clone()
    } else {
        args.layer.iter().map(LayerId::new).collect()
    };
    info!(layers = initial.len(), "Enabling start-up layers");

    for (id, outcome) in controller.enable_many(&initial).await {
        match outcome {
            Ok(status) if status.is_failed() => warn!(
                layer = %id,
                error = status.last_error.as_deref().unwrap_or("unknown"),
                "Layer failed to load"
            ),
            Ok(status) => info!(layer = %id, features = status.feature_count, "Layer ready"),
            Err(e) => warn!(layer = %id, error = %e, "Layer not enabled"),
        }
    }

    for status in controller.statuses().await {
        info!(
            layer = %status.id,
            lifecycle = ?status.lifecycle,
            visible = status.visible,
            features = status.feature_count,
            "Layer status"
        );
    }

    let (markers, geometries) = controller
        .with_render(|r| {
            (
                r.backend().visible_markers(),
                r.backend().visible_geometries(),
            )
        })
        .await;
    info!(markers, geometries, "Map drawn");
    Ok(())
}

async fn run_telemetry(config: &DashboardConfig, once: bool) -> Result<()> {
    let endpoints = config.telemetry_endpoints()?;
    if endpoints.is_empty() {
        info!("No telemetry endpoints configured");
        return Ok(());
    }

    let client = reqwest::Client::builder()
        .timeout(config.fetch_timeout())
        .build()
        .context("Failed to create HTTP client")?;
    let pollers = endpoints
        .into_iter()
        .map(|endpoint| {
            StatusPoller::new(
                HttpTelemetrySource::with_client(client.clone(), config.fetch_timeout()),
                endpoint,
                config.telemetry_ttl(),
            )
        })
        .collect::<Result<Vec<_>, _>>()?;

    if once {
        for (poller, outcome) in pollers.iter().zip(join_all(pollers.iter().map(|p| p.get())).await) {
            match outcome {
                Ok(read) => info!(
                    endpoint = poller.endpoint(),
                    records = read.value.len(),
                    stale = read.stale,
                    "Telemetry"
                ),
                Err(e) => warn!(endpoint = poller.endpoint(), error = %e, "Telemetry unavailable"),
            }
        }
        return Ok(());
    }

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let runs = pollers.iter().map(|poller| {
        let mut shutdown = shutdown_tx.subscribe();
        poller.run(
            move |outcome| {
                if let Ok(read) = outcome {
                    info!(records = read.value.len(), stale = read.stale, "Telemetry update");
                }
            },
            async move {
                let _ = shutdown.recv().await;
            },
        )
    });

    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
        }
        info!("Shutting down");
        let _ = shutdown_tx.send(());
    };
    tokio::join!(join_all(runs), ctrl_c);
    Ok(())
}

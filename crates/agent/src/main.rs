//! CareCast agent
//!
//! Loads or trains the forecast models, then serves forecasting, allocation
//! and training over HTTP alongside health and Prometheus endpoints.

use anyhow::Result;
use carecast_agent::{
    api,
    config::AgentConfig,
    startup::{prepare_models, StartupModels},
};
use carecast_lib::{
    health::{components, HealthRegistry},
    observability::{CoreMetrics, StructuredLogger},
    JsonModelStore, ModelRegistry,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting carecast-agent");

    let config = AgentConfig::load()?;
    info!(
        service = %config.service_name,
        model_dir = %config.model_dir.display(),
        horizons = ?config.horizons,
        "Agent configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    let metrics = CoreMetrics::new();
    let logger = StructuredLogger::new(&config.service_name);

    let registry = Arc::new(ModelRegistry::default());
    let store = JsonModelStore::new(&config.model_dir);

    // training and file I/O stay off the async workers
    let startup = {
        let (config, registry, store) = (config.clone(), Arc::clone(&registry), store.clone());
        tokio::task::spawn_blocking(move || prepare_models(&config, &registry, &store)).await?
    };
    match startup {
        Ok(StartupModels::Loaded(count)) => {
            metrics.record_loaded(&registry.snapshot().version, count);
        }
        Ok(StartupModels::Trained(report)) => {
            metrics.record_training(&report);
            logger.log_training(&report);
        }
        Ok(StartupModels::Empty) => {}
        Err(e) => {
            error!(error = %format!("{:#}", e), "Model preparation failed");
            health_registry
                .set_unhealthy(components::FORECASTER, format!("{:#}", e))
                .await;
        }
    }

    let snapshot = registry.snapshot();
    health_registry
        .report_models(&snapshot.version, snapshot.len())
        .await;
    logger.log_startup(AGENT_VERSION, &snapshot.version, snapshot.len());

    let app_state = Arc::new(
        api::AppState::new(
            health_registry.clone(),
            metrics.clone(),
            logger.clone(),
            Arc::clone(&registry),
        )
        .with_store(store)
        .with_horizons(config.horizons.clone())
        .with_request_timeout(config.request_timeout()),
    );

    // Mark agent as ready after initialization
    health_registry.set_ready(true).await;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    };
    api::serve(config.api_port, app_state, shutdown).await?;

    logger.log_shutdown("SIGINT received");
    info!("Shutting down");

    Ok(())
}

//! Offline forecasting against a persisted model directory

use anyhow::{Context, Result};
use carecast_lib::forecast::{ForecastKey, PredictionOutcome, PredictionSource};
use carecast_lib::{
    load_series_csv, DemandForecaster, JsonModelStore, ModelRegistry, Resource, TimeSeriesRecord,
};
use std::path::Path;
use std::sync::Arc;
use tabled::Tabled;
use tracing::{info, warn};

use super::read_json_arg;
use crate::output::{self, color_status, format_value, OutputFormat};

#[derive(Tabled)]
struct ForecastRow {
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Horizon")]
    horizon: String,
    #[tabled(rename = "Forecast")]
    value: String,
    #[tabled(rename = "Source")]
    source: String,
}

pub fn run(
    model_dir: &Path,
    state: &str,
    history: Option<&Path>,
    horizons: &[u32],
    format: OutputFormat,
) -> Result<()> {
    let current: TimeSeriesRecord = read_json_arg(state).context("Invalid current state")?;
    let history = match history {
        Some(path) => load_series_csv(path)
            .with_context(|| format!("Failed to load history {}", path.display()))?,
        None => Vec::new(),
    };

    let registry = ModelRegistry::default();
    let store = JsonModelStore::new(model_dir);
    if store.exists() {
        let models = registry
            .load_from(&store)
            .with_context(|| format!("Failed to load models from {}", model_dir.display()))?;
        info!(models, dir = %model_dir.display(), "Models loaded");
    } else {
        warn!(dir = %model_dir.display(), "No persisted models; values will be carried forward");
    }

    let forecaster = DemandForecaster::new(Arc::new(registry));
    let outcome = forecaster.predict(&current, &history, horizons)?;

    match format {
        OutputFormat::Json => output::print_json(&outcome)?,
        OutputFormat::Table => print_outcome(&outcome, horizons),
    }
    Ok(())
}

fn print_outcome(outcome: &PredictionOutcome, horizons: &[u32]) {
    output::print_section("Demand Forecast");
    println!("Model version:          {}", outcome.model_version);
    println!();

    let mut rows = Vec::new();
    for resource in Resource::ALL {
        for &horizon in horizons {
            let Some(value) = outcome.forecast.get(resource, horizon) else {
                continue;
            };
            let key = ForecastKey::new(resource, horizon);
            let source = match outcome.sources.get(&key.name()) {
                Some(PredictionSource::Model) => "model",
                Some(PredictionSource::CarryForward) | None => "carry_forward",
            };
            rows.push(ForecastRow {
                resource: resource.to_string(),
                horizon: format!("+{}h", horizon),
                value: format_value(value),
                source: color_status(source),
            });
        }
    }
    output::print_table(rows);

    let fallbacks = outcome.fallback_count();
    if fallbacks > 0 {
        println!();
        output::print_warning(&format!(
            "{} values carried forward from the current state (no trained model)",
            fallbacks
        ));
    }
}

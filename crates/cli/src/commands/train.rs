//! Offline training from a CSV series

use anyhow::{Context, Result};
use carecast_lib::forecast::TrainingReport;
use carecast_lib::{load_series_csv, JsonModelStore, ModelRegistry};
use std::path::Path;
use tabled::Tabled;
use tracing::info;

use crate::output::{self, OutputFormat};

#[derive(Tabled)]
struct ModelRow {
    #[tabled(rename = "Model")]
    name: String,
    #[tabled(rename = "MAE")]
    mae: String,
    #[tabled(rename = "RMSE")]
    rmse: String,
    #[tabled(rename = "Train rows")]
    train_rows: usize,
    #[tabled(rename = "Test rows")]
    test_rows: usize,
}

/// Train every (resource, horizon) model and persist the snapshot
pub fn run(data: &Path, model_dir: &Path, horizons: &[u32], format: OutputFormat) -> Result<()> {
    let series = load_series_csv(data)
        .with_context(|| format!("Failed to load training data {}", data.display()))?;
    info!(rows = series.len(), path = %data.display(), "Series loaded");

    let registry = ModelRegistry::default();
    let report = registry.train(&series, horizons).context("Training failed")?;

    let store = JsonModelStore::new(model_dir);
    registry
        .save_to(&store)
        .with_context(|| format!("Failed to save models to {}", model_dir.display()))?;

    match format {
        OutputFormat::Json => output::print_json(&report)?,
        OutputFormat::Table => print_report(&report, model_dir),
    }
    Ok(())
}

fn print_report(report: &TrainingReport, model_dir: &Path) {
    output::print_section("Training Report");
    println!("Version:                {}", report.version);
    println!("Rows:                   {}", report.rows);
    println!("Duration:               {}ms", report.duration_ms);
    println!();

    let rows = report
        .trained
        .iter()
        .map(|(key, accuracy)| ModelRow {
            name: key.name(),
            mae: format!("{:.3}", accuracy.mae),
            rmse: format!("{:.3}", accuracy.rmse),
            train_rows: accuracy.train_rows,
            test_rows: accuracy.test_rows,
        })
        .collect();
    output::print_table(rows);

    for skipped in &report.skipped {
        output::print_warning(&format!("Skipped {}: {}", skipped.key.name(), skipped.reason));
    }

    println!();
    output::print_success(&format!(
        "Saved {} models to {}",
        report.trained.len(),
        model_dir.display()
    ));
}

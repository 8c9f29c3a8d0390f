//! Agent status

use anyhow::Result;
use carecast_lib::{ComponentStatus, HealthResponse};
use serde_json::json;
use tabled::Tabled;
use tracing::warn;

use crate::client::{ApiClient, ModelsResponse};
use crate::output::{self, color_status, OutputFormat};

#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
}

#[derive(Tabled)]
struct ModelRow {
    #[tabled(rename = "Model")]
    name: String,
    #[tabled(rename = "Backend")]
    backend: String,
    #[tabled(rename = "MAE")]
    mae: String,
    #[tabled(rename = "Train rows")]
    train_rows: usize,
    #[tabled(rename = "Top features")]
    top_features: String,
}

/// Feature names shown per model in the table
const TOP_FEATURES_SHOWN: usize = 3;

/// Show agent health and served models; fails when the agent is unhealthy
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health = client.health().await?;
    let models = match client.get::<ModelsResponse>("v1/models").await {
        Ok(models) => Some(models),
        Err(e) => {
            warn!(error = %e, "Model listing unavailable");
            None
        }
    };

    match format {
        OutputFormat::Json => output::print_json(&json!({ "health": health, "models": models }))?,
        OutputFormat::Table => print_status(&health, models.as_ref()),
    }

    if health.status == ComponentStatus::Unhealthy {
        anyhow::bail!("agent is unhealthy");
    }
    Ok(())
}

fn status_str(status: ComponentStatus) -> &'static str {
    match status {
        ComponentStatus::Healthy => "healthy",
        ComponentStatus::Degraded => "degraded",
        ComponentStatus::Unhealthy => "unhealthy",
    }
}

fn print_status(health: &HealthResponse, models: Option<&ModelsResponse>) {
    output::print_section("Agent Status");
    println!("Status:                 {}", color_status(status_str(health.status)));
    if let Some(version) = &health.model_version {
        println!("Model version:          {}", version);
    }
    println!();

    let rows = health
        .components
        .iter()
        .map(|(name, component)| ComponentRow {
            name: name.clone(),
            status: color_status(status_str(component.status)),
            message: component.message.clone().unwrap_or_default(),
        })
        .collect();
    output::print_table(rows);

    if let Some(models) = models {
        println!();
        println!("Models ({} features):", models.feature_count);
        let rows = models
            .models
            .iter()
            .map(|m| ModelRow {
                name: m.name.clone(),
                backend: m.backend.clone(),
                mae: format!("{:.3}", m.mae),
                train_rows: m.train_rows,
                top_features: m
                    .top_features
                    .iter()
                    .take(TOP_FEATURES_SHOWN)
                    .map(|f| f.feature.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
            .collect();
        output::print_table(rows);
    }
}

//! Model preparation at service start
//!
//! Load persisted models when present; otherwise train from the configured
//! CSV and persist the result. An agent with neither keeps an empty registry
//! and serves carry-forward forecasts.

use crate::config::AgentConfig;
use anyhow::{Context, Result};
use carecast_lib::forecast::{ModelStore, TrainingReport};
use carecast_lib::{load_series_csv, JsonModelStore, ModelRegistry};
use tracing::{info, warn};

#[derive(Debug)]
pub enum StartupModels {
    Loaded(usize),
    Trained(TrainingReport),
    Empty,
}

pub fn prepare_models(
    config: &AgentConfig,
    registry: &ModelRegistry,
    store: &JsonModelStore,
) -> Result<StartupModels> {
    if store.exists() {
        match registry.load_from(store) {
            Ok(count) => return Ok(StartupModels::Loaded(count)),
            Err(e) => warn!(
                dir = %store.dir().display(),
                error = %e,
                "Persisted models unusable"
            ),
        }
    }

    let Some(data_path) = &config.data_path else {
        info!("No persisted models and no training data configured");
        return Ok(StartupModels::Empty);
    };

    let series = load_series_csv(data_path)
        .with_context(|| format!("Failed to load training data {}", data_path.display()))?;
    let (snapshot, report) = registry
        .fit_snapshot(&series, &config.horizons)
        .context("Startup training failed")?;
    store
        .save(&snapshot)
        .context("Failed to persist startup models")?;
    registry.install(snapshot);
    Ok(StartupModels::Trained(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use carecast_lib::forecast::DEFAULT_HORIZONS;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_series(dir: &TempDir, hours: usize) -> std::path::PathBuf {
        let path = dir.path().join("series.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "timestamp,admissions,discharges,bed_occupancy,oxygen_level,occupancy_rate"
        )
        .unwrap();
        for i in 0..hours {
            let day = 4 + i / 24;
            let hour = i % 24;
            let admissions = 6 + (i * 7) % 9;
            let beds = 140 + (i * 3) % 40;
            writeln!(
                file,
                "2024-03-{:02} {:02}:00:00,{},{},{},{:.1},{:.1}",
                day,
                hour,
                admissions,
                5 + (i * 5) % 8,
                beds,
                2000.0 - (i % 50) as f64 * 20.0,
                beds as f64 / 2.5
            )
            .unwrap();
        }
        path
    }

    #[test]
    fn test_empty_without_models_or_data() {
        let dir = TempDir::new().unwrap();
        let store = JsonModelStore::new(dir.path().join("models"));
        let registry = ModelRegistry::default();
        let outcome = prepare_models(&AgentConfig::default(), &registry, &store).unwrap();
        assert!(matches!(outcome, StartupModels::Empty));
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn test_trains_then_loads_on_next_start() {
        let dir = TempDir::new().unwrap();
        let config = AgentConfig {
            data_path: Some(write_series(&dir, 120)),
            horizons: DEFAULT_HORIZONS.to_vec(),
            ..AgentConfig::default()
        };
        let store = JsonModelStore::new(dir.path().join("models"));

        let first = ModelRegistry::default();
        match prepare_models(&config, &first, &store).unwrap() {
            StartupModels::Trained(report) => assert_eq!(report.trained.len(), 9),
            other => panic!("expected training, got {:?}", other),
        }
        assert!(store.exists());

        let second = ModelRegistry::default();
        let outcome = prepare_models(&config, &second, &store).unwrap();
        assert!(matches!(outcome, StartupModels::Loaded(9)));
        assert_eq!(second.snapshot().version, first.snapshot().version);
    }

    #[test]
    fn test_missing_training_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let config = AgentConfig {
            data_path: Some(dir.path().join("absent.csv")),
            ..AgentConfig::default()
        };
        let store = JsonModelStore::new(dir.path().join("models"));
        assert!(prepare_models(&config, &ModelRegistry::default(), &store).is_err());
    }
}

//! Forecast model registry
//!
//! Holds the current [`RegistrySnapshot`] behind a single reference. Training
//! and loading build a complete replacement off-lock and swap it in with one
//! write, so readers holding an older snapshot keep a consistent view.

use super::features::{FeatureBuilder, FeatureSchema};
use super::store::ModelStore;
use super::{ForecastKey, Regressor, RidgeRegressor};
use crate::error::{Error, Result};
use crate::models::{validate_series, Resource, TimeSeriesRecord, DEFAULT_TOTAL_BEDS};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Minimum labeled rows required to train a (resource, horizon) pair
pub const MIN_TRAINING_ROWS: usize = 50;

/// Trailing fraction of labeled rows held out for diagnostics
pub const TEST_FRACTION: f64 = 0.2;

/// Hold-out accuracy of a trained model; diagnostic only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelAccuracy {
    pub mae: f64,
    pub rmse: f64,
    pub train_rows: usize,
    pub test_rows: usize,
}

/// A trained regressor for one (resource, horizon) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastModel<M> {
    pub key: ForecastKey,
    pub backend: String,
    pub schema: FeatureSchema,
    pub accuracy: ModelAccuracy,
    pub model: M,
}

impl<M> ForecastModel<M> {
    /// The `top_n` features with the highest importance under `regressor`,
    /// most important first
    pub fn feature_importance<R>(&self, regressor: &R, top_n: usize) -> Vec<(String, f64)>
    where
        R: Regressor<Model = M>,
    {
        let mut ranked: Vec<(String, f64)> = self
            .schema
            .columns()
            .iter()
            .cloned()
            .zip(regressor.importances(&self.model))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(top_n);
        ranked
    }
}

/// Immutable set of trained models
#[derive(Debug, Clone)]
pub struct RegistrySnapshot<M> {
    pub version: String,
    pub trained_at: Option<DateTime<Utc>>,
    pub schema: FeatureSchema,
    pub targets: Vec<Resource>,
    pub models: BTreeMap<ForecastKey, ForecastModel<M>>,
}

impl<M> RegistrySnapshot<M> {
    pub fn empty() -> Self {
        Self {
            version: "untrained".to_string(),
            trained_at: None,
            schema: FeatureSchema::new(Vec::new()),
            targets: Resource::ALL.to_vec(),
            models: BTreeMap::new(),
        }
    }

    pub fn get(&self, key: &ForecastKey) -> Option<&ForecastModel<M>> {
        self.models.get(key)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// A pair that was not trained
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedPair {
    pub key: ForecastKey,
    pub reason: String,
}

/// Summary of one training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub version: String,
    pub rows: usize,
    pub trained: Vec<(ForecastKey, ModelAccuracy)>,
    pub skipped: Vec<SkippedPair>,
    pub duration_ms: u64,
}

/// Owns the current model snapshot and the regressor used to train it
pub struct ModelRegistry<R: Regressor = RidgeRegressor> {
    regressor: R,
    features: FeatureBuilder,
    total_beds: u32,
    current: RwLock<Arc<RegistrySnapshot<R::Model>>>,
}

impl Default for ModelRegistry<RidgeRegressor> {
    fn default() -> Self {
        Self::new(RidgeRegressor::default())
    }
}

impl<R: Regressor> ModelRegistry<R> {
    pub fn new(regressor: R) -> Self {
        Self {
            regressor,
            features: FeatureBuilder::default(),
            total_beds: DEFAULT_TOTAL_BEDS,
            current: RwLock::new(Arc::new(RegistrySnapshot::empty())),
        }
    }

    pub fn with_total_beds(mut self, total_beds: u32) -> Self {
        self.total_beds = total_beds;
        self
    }

    pub fn regressor(&self) -> &R {
        &self.regressor
    }

    pub fn feature_builder(&self) -> &FeatureBuilder {
        &self.features
    }

    pub fn total_beds(&self) -> u32 {
        self.total_beds
    }

    /// Read view of the current models; held for the duration of a call
    pub fn snapshot(&self) -> Arc<RegistrySnapshot<R::Model>> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Replace the whole snapshot
    pub fn install(&self, snapshot: RegistrySnapshot<R::Model>) {
        let snapshot = Arc::new(snapshot);
        match self.current.write() {
            Ok(mut guard) => *guard = snapshot,
            Err(poisoned) => *poisoned.into_inner() = snapshot,
        }
    }

    /// Train every (resource, horizon) pair and swap in the new snapshot
    pub fn train(&self, series: &[TimeSeriesRecord], horizons: &[u32]) -> Result<TrainingReport> {
        let (snapshot, report) = self.fit_snapshot(series, horizons)?;
        self.install(snapshot);
        info!(
            version = %report.version,
            rows = report.rows,
            trained = report.trained.len(),
            skipped = report.skipped.len(),
            duration_ms = report.duration_ms,
            "Forecast models trained"
        );
        Ok(report)
    }

    /// Train a complete snapshot without installing it
    pub fn fit_snapshot(
        &self,
        series: &[TimeSeriesRecord],
        horizons: &[u32],
    ) -> Result<(RegistrySnapshot<R::Model>, TrainingReport)> {
        let start = Instant::now();
        validate_horizons(horizons)?;
        if series.is_empty() {
            return Err(Error::Validation("training series is empty".into()));
        }
        validate_series(series, self.total_beds)?;

        let table = self.features.build_training(series);
        let schema = table.schema();
        let matrix = table.to_matrix(&schema);
        let version = format!("v{}", Utc::now().timestamp());

        let mut models = BTreeMap::new();
        let mut trained = Vec::new();
        let mut skipped = Vec::new();

        for resource in Resource::ALL {
            let values: Vec<f64> = series.iter().map(|r| r.value_of(resource)).collect();
            for &horizon in horizons {
                let key = ForecastKey::new(resource, horizon);
                match self.train_pair(key, &matrix, &values, &schema) {
                    Ok(model) => {
                        debug!(
                            model = %key,
                            mae = model.accuracy.mae,
                            rmse = model.accuracy.rmse,
                            train_rows = model.accuracy.train_rows,
                            test_rows = model.accuracy.test_rows,
                            "Trained forecast model"
                        );
                        trained.push((key, model.accuracy.clone()));
                        models.insert(key, model);
                    }
                    Err(e) => {
                        warn!(model = %key, error = %e, "Skipping forecast model");
                        skipped.push(SkippedPair {
                            key,
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }

        let snapshot = RegistrySnapshot {
            version: version.clone(),
            trained_at: Some(Utc::now()),
            schema,
            targets: Resource::ALL.to_vec(),
            models,
        };
        let report = TrainingReport {
            version,
            rows: series.len(),
            trained,
            skipped,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        Ok((snapshot, report))
    }

    fn train_pair(
        &self,
        key: ForecastKey,
        matrix: &[Vec<f64>],
        values: &[f64],
        schema: &FeatureSchema,
    ) -> Result<ForecastModel<R::Model>> {
        let horizon = key.horizon as usize;
        let labeled = values.len().saturating_sub(horizon);
        if labeled < MIN_TRAINING_ROWS {
            return Err(Error::InsufficientData {
                key: key.name(),
                rows: labeled,
                required: MIN_TRAINING_ROWS,
            });
        }

        let features = &matrix[..labeled];
        let labels = &values[horizon..];

        let test_rows = ((labeled as f64) * TEST_FRACTION - 1e-9).ceil() as usize;
        let train_rows = labeled - test_rows;

        let model = self
            .regressor
            .fit(&features[..train_rows], &labels[..train_rows])?;

        let (mut abs_sum, mut sq_sum) = (0.0, 0.0);
        for (row, actual) in features[train_rows..].iter().zip(&labels[train_rows..]) {
            let err = self.regressor.predict(&model, row) - actual;
            abs_sum += err.abs();
            sq_sum += err * err;
        }
        let denom = test_rows.max(1) as f64;

        Ok(ForecastModel {
            key,
            backend: self.regressor.name().to_string(),
            schema: schema.clone(),
            accuracy: ModelAccuracy {
                mae: abs_sum / denom,
                rmse: (sq_sum / denom).sqrt(),
                train_rows,
                test_rows,
            },
            model,
        })
    }

    /// Replace the current snapshot with one read from `store`.
    /// On error the current snapshot is left untouched.
    pub fn load_from<S: ModelStore<R::Model>>(&self, store: &S) -> Result<usize> {
        let snapshot = store.load()?;
        self.check_loaded(&snapshot)?;
        let count = snapshot.len();
        let version = snapshot.version.clone();
        self.install(snapshot);
        info!(version = %version, models = count, "Loaded forecast models");
        Ok(count)
    }

    /// Every loaded model must agree with the snapshot schema in width
    fn check_loaded(&self, snapshot: &RegistrySnapshot<R::Model>) -> Result<()> {
        for (key, model) in &snapshot.models {
            if model.schema != snapshot.schema {
                return Err(Error::Persistence(format!(
                    "Model {} was trained on a different feature schema",
                    key
                )));
            }
            match self.regressor.input_width(&model.model) {
                Some(width) if width == model.schema.len() => {}
                Some(width) => {
                    return Err(Error::Persistence(format!(
                        "Model {} takes {} features but the schema lists {}",
                        key,
                        width,
                        model.schema.len()
                    )))
                }
                None => {
                    return Err(Error::Persistence(format!(
                        "Model {} has inconsistent parameters",
                        key
                    )))
                }
            }
        }
        Ok(())
    }

    /// Persist the current snapshot
    pub fn save_to<S: ModelStore<R::Model>>(&self, store: &S) -> Result<()> {
        let snapshot = self.snapshot();
        store.save(&snapshot)
    }
}

pub(crate) fn validate_horizons(horizons: &[u32]) -> Result<()> {
    if horizons.is_empty() {
        return Err(Error::Validation("at least one horizon is required".into()));
    }
    if horizons.contains(&0) {
        return Err(Error::Validation("horizons must be at least 1 hour".into()));
    }
    Ok(())
}

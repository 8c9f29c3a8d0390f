//! Multi-horizon demand forecasting
//!
//! One regressor is trained per (target resource, horizon) pair. Trained
//! models live in an immutable snapshot that the registry swaps as a whole.

mod features;
mod forecaster;
mod registry;
mod regressor;
mod store;

#[cfg(test)]
pub(crate) mod fixtures;


pub use features::{
    lagged, rolling_mean, rolling_std, FeatureBuilder, FeatureSchema, FeatureTable, LAGS,
    LONG_WINDOW, SHORT_WINDOW,
};
pub use forecaster::{DemandForecast, DemandForecaster, PredictionOutcome, PredictionSource};
pub use registry::{
    ForecastModel, ModelAccuracy, ModelRegistry, RegistrySnapshot, SkippedPair, TrainingReport,
    MIN_TRAINING_ROWS, TEST_FRACTION,
};
pub use regressor::{RidgeModel, RidgeRegressor, DEFAULT_RIDGE_PENALTY};
pub use store::{JsonModelStore, ModelStore, StoreMetadata, METADATA_FILE, SNAPSHOT_DIR_PREFIX};

use crate::error::Result;
use crate::models::Resource;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;

/// Default forecast horizons in hours
pub const DEFAULT_HORIZONS: [u32; 3] = [1, 6, 24];

/// Trainable regression capability
///
/// The trained model is a plain serializable value so that any backend can
/// be persisted by the model store.
pub trait Regressor: Send + Sync {
    type Model: Clone + Send + Sync + Serialize + DeserializeOwned;

    /// Backend name recorded in artifacts
    fn name(&self) -> &'static str;

    /// Fit a model to row-major features and their labels
    fn fit(&self, features: &[Vec<f64>], labels: &[f64]) -> Result<Self::Model>;

    /// Predict a single row
    fn predict(&self, model: &Self::Model, features: &[f64]) -> f64;

    /// Number of features `model` takes, or `None` if its parameters disagree
    fn input_width(&self, model: &Self::Model) -> Option<usize>;

    /// Non-negative importance per input feature, in column order
    fn importances(&self, model: &Self::Model) -> Vec<f64>;
}

/// Identifies a forecast model: target resource and horizon in hours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ForecastKey {
    pub resource: Resource,
    pub horizon: u32,
}

impl ForecastKey {
    pub fn new(resource: Resource, horizon: u32) -> Self {
        Self { resource, horizon }
    }

    /// Artifact name, e.g. `bed_occupancy_next_6h`
    pub fn name(&self) -> String {
        format!("{}_next_{}h", self.resource, self.horizon)
    }
}

impl fmt::Display for ForecastKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_next_{}h", self.resource, self.horizon)
    }
}

/// Label used in prediction output, e.g. `24h`
pub fn horizon_label(horizon: u32) -> String {
    format!("{}h", horizon)
}

//! Demand forecaster
//!
//! Answers "predict these resources at these horizons given this state"
//! against one registry snapshot for the whole call.

use super::registry::{validate_horizons, ModelRegistry};
use super::{horizon_label, ForecastKey, Regressor, RidgeRegressor};
use crate::error::{Error, Result};
use crate::models::{validate_series, PredictedDemand, Resource, TimeSeriesRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// resource → horizon label (`"6h"`) → predicted value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DemandForecast(BTreeMap<Resource, BTreeMap<String, f64>>);

impl DemandForecast {
    pub fn insert(&mut self, resource: Resource, horizon: u32, value: f64) {
        self.0
            .entry(resource)
            .or_default()
            .insert(horizon_label(horizon), value);
    }

    pub fn get(&self, resource: Resource, horizon: u32) -> Option<f64> {
        self.0
            .get(&resource)
            .and_then(|h| h.get(&horizon_label(horizon)))
            .copied()
    }

    pub fn resources(&self) -> impl Iterator<Item = (&Resource, &BTreeMap<String, f64>)> {
        self.0.iter()
    }

    /// Demand at one horizon, in the shape the allocation builder consumes
    pub fn demand_at(&self, horizon: u32) -> PredictedDemand {
        PredictedDemand {
            admissions: self.get(Resource::Admissions, horizon),
            bed_occupancy: self.get(Resource::BedOccupancy, horizon),
            oxygen_level: self.get(Resource::OxygenLevel, horizon),
        }
    }
}

/// Where a predicted value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionSource {
    Model,
    CarryForward,
}

/// Forecast plus the provenance of each value
#[derive(Debug, Clone, Serialize)]
pub struct PredictionOutcome {
    pub forecast: DemandForecast,
    pub sources: BTreeMap<String, PredictionSource>,
    pub model_version: String,
}

impl PredictionOutcome {
    /// Number of values that fell back to carry-forward
    pub fn fallback_count(&self) -> usize {
        self.sources
            .values()
            .filter(|s| **s == PredictionSource::CarryForward)
            .count()
    }
}

pub struct DemandForecaster<R: Regressor = RidgeRegressor> {
    registry: Arc<ModelRegistry<R>>,
}

impl<R: Regressor> Clone for DemandForecaster<R> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<R: Regressor> DemandForecaster<R> {
    pub fn new(registry: Arc<ModelRegistry<R>>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry<R>> {
        &self.registry
    }

    /// Predict every resource at every horizon.
    ///
    /// `history` supplies trailing rows for lag and rolling context and must
    /// end strictly before `current`. Only the feature row of `current` is
    /// used; its missing cells are 0.
    pub fn predict(
        &self,
        current: &TimeSeriesRecord,
        history: &[TimeSeriesRecord],
        horizons: &[u32],
    ) -> Result<PredictionOutcome> {
        validate_horizons(horizons)?;
        let mut series = Vec::with_capacity(history.len() + 1);
        series.extend_from_slice(history);
        series.push(current.clone());
        validate_series(&series, self.registry.total_beds())?;

        let snapshot = self.registry.snapshot();
        let table = self.registry.feature_builder().build(&series);
        let last = table.rows() - 1;

        let mut forecast = DemandForecast::default();
        let mut sources = BTreeMap::new();
        let regressor = self.registry.regressor();

        for resource in Resource::ALL {
            for &horizon in horizons {
                let key = ForecastKey::new(resource, horizon);
                let (value, source) = match snapshot.get(&key) {
                    Some(model) => {
                        let row = table.row_in_schema(last, &model.schema);
                        let raw = regressor.predict(&model.model, &row);
                        let value = if raw.is_finite() { raw.max(0.0) } else { 0.0 };
                        debug!(model = %key, raw, value, "Model prediction");
                        (value, PredictionSource::Model)
                    }
                    None => {
                        let e = Error::ModelUnavailable(key.name());
                        warn!(error = %e, "Carrying forward latest observed value");
                        (current.value_of(resource), PredictionSource::CarryForward)
                    }
                };
                forecast.insert(resource, horizon, value);
                sources.insert(key.name(), source);
            }
        }

        Ok(PredictionOutcome {
            forecast,
            sources,
            model_version: snapshot.version.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::fixtures::synthetic_series;

    #[test]
    fn test_untrained_forecaster_carries_forward() {
        let forecaster = DemandForecaster::new(Arc::new(ModelRegistry::default()));
        let series = synthetic_series(10);
        let (current, history) = series.split_last().unwrap();

        let outcome = forecaster.predict(current, history, &[1, 6]).unwrap();

        assert_eq!(outcome.fallback_count(), 6);
        assert_eq!(outcome.model_version, "untrained");
        assert_eq!(
            outcome.forecast.get(Resource::BedOccupancy, 6),
            Some(current.bed_occupancy as f64)
        );
        assert_eq!(
            outcome.forecast.get(Resource::OxygenLevel, 1),
            Some(current.oxygen_level)
        );
    }

    #[test]
    fn test_history_must_precede_current() {
        let forecaster = DemandForecaster::new(Arc::new(ModelRegistry::default()));
        let series = synthetic_series(5);
        let result = forecaster.predict(&series[0], &series[1..], &[1]);
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_rejects_empty_horizons() {
        let forecaster = DemandForecaster::new(Arc::new(ModelRegistry::default()));
        let series = synthetic_series(1);
        assert!(matches!(
            forecaster.predict(&series[0], &[], &[]),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_demand_at_horizon() {
        let mut forecast = DemandForecast::default();
        forecast.insert(Resource::Admissions, 6, 14.0);
        forecast.insert(Resource::BedOccupancy, 6, 180.0);

        let demand = forecast.demand_at(6);
        assert_eq!(demand.admissions, Some(14.0));
        assert_eq!(demand.bed_occupancy, Some(180.0));
        assert_eq!(demand.oxygen_level, None);
        assert_eq!(forecast.demand_at(1).admissions, None);
    }

    #[test]
    fn test_forecast_serializes_by_label() {
        let mut forecast = DemandForecast::default();
        forecast.insert(Resource::Admissions, 24, 9.5);
        let json = serde_json::to_value(&forecast).unwrap();
        assert_eq!(json["admissions"]["24h"], 9.5);
    }
}

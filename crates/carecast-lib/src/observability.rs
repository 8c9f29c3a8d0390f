//! Observability for the forecasting and allocation services
//!
//! Provides:
//! - Prometheus metrics: training duration, prediction and optimization
//!   counts, solve latency and the served model version
//! - Structured event logging with tracing

use crate::forecast::{PredictionOutcome, TrainingReport};
use crate::models::AllocationResult;
use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_gauge, GaugeVec,
    Histogram, IntCounter, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Latency buckets in seconds
const LATENCY_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

static GLOBAL_METRICS: OnceLock<CoreMetricsInner> = OnceLock::new();

struct CoreMetricsInner {
    training_duration_seconds: Histogram,
    models_trained: IntGauge,
    predictions: IntCounter,
    prediction_fallbacks: IntCounter,
    optimizations: IntCounter,
    optimization_fallbacks: IntCounter,
    solve_latency_seconds: Histogram,
    model_version_info: GaugeVec,
}

impl CoreMetricsInner {
    fn new() -> Self {
        Self {
            training_duration_seconds: register_histogram!(
                "carecast_training_duration_seconds",
                "Time spent training the full forecast model set",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register training_duration_seconds"),

            models_trained: register_int_gauge!(
                "carecast_models_trained",
                "Number of forecast models in the current registry snapshot"
            )
            .expect("Failed to register models_trained"),

            predictions: register_int_counter!(
                "carecast_predictions_total",
                "Total number of forecast requests served"
            )
            .expect("Failed to register predictions"),

            prediction_fallbacks: register_int_counter!(
                "carecast_prediction_fallbacks_total",
                "Forecast values carried forward because no model was trained"
            )
            .expect("Failed to register prediction_fallbacks"),

            optimizations: register_int_counter!(
                "carecast_optimizations_total",
                "Total number of allocation requests served"
            )
            .expect("Failed to register optimizations"),

            optimization_fallbacks: register_int_counter!(
                "carecast_optimization_fallbacks_total",
                "Allocation requests answered by the heuristic"
            )
            .expect("Failed to register optimization_fallbacks"),

            solve_latency_seconds: register_histogram!(
                "carecast_solve_latency_seconds",
                "Time spent building and solving an allocation problem",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register solve_latency_seconds"),

            model_version_info: register_gauge_vec!(
                "carecast_model_version_info",
                "Version of the forecast model snapshot currently served",
                &["version"]
            )
            .expect("Failed to register model_version_info"),
        }
    }
}

/// Handle to the process-wide metrics; clones share the same metrics
#[derive(Clone)]
pub struct CoreMetrics {
    _private: (),
}

impl Default for CoreMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl CoreMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(CoreMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &CoreMetricsInner {
        GLOBAL_METRICS.get_or_init(CoreMetricsInner::new)
    }

    /// Record a finished training run
    pub fn record_training(&self, report: &TrainingReport) {
        let inner = self.inner();
        inner
            .training_duration_seconds
            .observe(report.duration_ms as f64 / 1000.0);
        inner.models_trained.set(report.trained.len() as i64);
        self.set_model_version(&report.version);
    }

    /// Record models installed from the store
    pub fn record_loaded(&self, version: &str, models: usize) {
        self.inner().models_trained.set(models as i64);
        self.set_model_version(version);
    }

    pub fn record_prediction(&self, outcome: &PredictionOutcome) {
        let inner = self.inner();
        inner.predictions.inc();
        inner
            .prediction_fallbacks
            .inc_by(outcome.fallback_count() as u64);
    }

    pub fn record_optimization(&self, result: &AllocationResult, elapsed_secs: f64) {
        let inner = self.inner();
        inner.optimizations.inc();
        inner.solve_latency_seconds.observe(elapsed_secs);
        if result.fallback_reason.is_some() {
            inner.optimization_fallbacks.inc();
        }
    }

    pub fn set_model_version(&self, version: &str) {
        let inner = self.inner();
        inner.model_version_info.reset();
        inner
            .model_version_info
            .with_label_values(&[version])
            .set(1.0);
    }

    pub fn predictions_total(&self) -> u64 {
        self.inner().predictions.get()
    }

    pub fn optimizations_total(&self) -> u64 {
        self.inner().optimizations.get()
    }
}

/// Named service events with consistent fields
#[derive(Clone)]
pub struct StructuredLogger {
    service: String,
}

impl StructuredLogger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn log_startup(&self, version: &str, model_version: &str, models: usize) {
        info!(
            event = "service_started",
            service = %self.service,
            service_version = %version,
            model_version = %model_version,
            models = models,
            "CareCast service started"
        );
    }

    pub fn log_training(&self, report: &TrainingReport) {
        info!(
            event = "models_trained",
            service = %self.service,
            model_version = %report.version,
            rows = report.rows,
            trained = report.trained.len(),
            skipped = report.skipped.len(),
            duration_ms = report.duration_ms,
            "Forecast models trained"
        );
    }

    pub fn log_prediction(&self, outcome: &PredictionOutcome) {
        let fallbacks = outcome.fallback_count();
        if fallbacks > 0 {
            warn!(
                event = "prediction_served",
                service = %self.service,
                model_version = %outcome.model_version,
                values = outcome.sources.len(),
                carried_forward = fallbacks,
                "Forecast served with carried-forward values"
            );
        } else {
            info!(
                event = "prediction_served",
                service = %self.service,
                model_version = %outcome.model_version,
                values = outcome.sources.len(),
                "Forecast served"
            );
        }
    }

    pub fn log_allocation(&self, result: &AllocationResult) {
        match &result.fallback_reason {
            None => info!(
                event = "allocation_optimized",
                service = %self.service,
                total_cost = result.total_cost,
                total_staff = result.efficiency_metrics.total_staff,
                "Staff allocation optimized"
            ),
            Some(reason) => warn!(
                event = "allocation_fallback",
                service = %self.service,
                total_cost = result.total_cost,
                total_staff = result.efficiency_metrics.total_staff,
                reason = %reason,
                "Staff allocation produced by heuristic"
            ),
        }
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            service = %self.service,
            reason = %reason,
            "CareCast service shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::StaffOptimizer;
    use crate::models::{PredictedDemand, StaffAllocation};

    #[test]
    fn test_metrics_record_optimizations() {
        let metrics = CoreMetrics::new();
        let result = StaffOptimizer::default()
            .optimize(&StaffAllocation::new(), &PredictedDemand::default(), None)
            .unwrap();

        let before = metrics.optimizations_total();
        metrics.record_optimization(&result, 0.002);
        // other tests share the global registry, so only a lower bound holds
        assert!(metrics.optimizations_total() > before);
        metrics.set_model_version("v1");
    }

    #[test]
    fn test_structured_logger_service_name() {
        let logger = StructuredLogger::new("carecast-test");
        assert_eq!(logger.service(), "carecast-test");
        logger.log_shutdown("test");
    }
}

//! Core library for hospital demand forecasting and staff allocation
//!
//! This crate provides:
//! - Feature construction and multi-horizon demand forecasting
//! - A versioned, persistable forecast model registry
//! - Cost-minimal staff allocation with a deterministic fallback
//! - Health tracking and observability shared by the binaries

pub mod allocation;
pub mod data;
pub mod error;
pub mod forecast;
pub mod health;
pub mod models;
pub mod observability;

pub use allocation::{AllocationPolicy, CostTable, StaffOptimizer};
pub use data::load_series_csv;
pub use error::{Error, Result};
pub use forecast::{DemandForecaster, JsonModelStore, ModelRegistry, DEFAULT_HORIZONS};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{CoreMetrics, StructuredLogger};

//! CareCast agent: HTTP service around the forecasting and allocation library

pub mod api;
pub mod config;
pub mod startup;

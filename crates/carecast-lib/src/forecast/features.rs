//! Feature construction for demand forecasting
//!
//! Turns an ordered hourly series into a column table: calendar context,
//! lagged targets, trailing rolling statistics and a few derived ratios.
//! Every value depends only on the current and earlier rows.

use crate::models::{Resource, TimeSeriesRecord};
use chrono::{Datelike, Timelike};
use serde::{Deserialize, Serialize};

/// Lag offsets (in steps) used for every target resource
pub const LAGS: [usize; 6] = [1, 2, 3, 6, 12, 24];

/// Short rolling window (6 steps)
pub const SHORT_WINDOW: usize = 6;

/// Long rolling window (24 steps)
pub const LONG_WINDOW: usize = 24;

/// Ordered feature column names fixed at training time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureSchema(Vec<String>);

impl FeatureSchema {
    pub fn new(columns: Vec<String>) -> Self {
        Self(columns)
    }

    pub fn columns(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Column-oriented feature table; `None` marks a missing cell
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    names: Vec<String>,
    columns: Vec<Vec<Option<f64>>>,
    rows: usize,
}

impl FeatureTable {
    fn with_rows(rows: usize) -> Self {
        Self {
            names: Vec::new(),
            columns: Vec::new(),
            rows,
        }
    }

    fn push(&mut self, name: impl Into<String>, values: Vec<Option<f64>>) {
        debug_assert_eq!(values.len(), self.rows);
        self.names.push(name.into());
        self.columns.push(values);
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn schema(&self) -> FeatureSchema {
        FeatureSchema::new(self.names.clone())
    }

    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.columns[i].as_slice())
    }

    /// Forward-fill then backward-fill every column over the whole table.
    /// A column with no observed value at all stays missing.
    pub fn fill_forward_backward(&mut self) {
        for column in &mut self.columns {
            let mut last = None;
            for cell in column.iter_mut() {
                match cell {
                    Some(v) => last = Some(*v),
                    None => *cell = last,
                }
            }
            let mut next = None;
            for cell in column.iter_mut().rev() {
                match cell {
                    Some(v) => next = Some(*v),
                    None => *cell = next,
                }
            }
        }
    }

    /// Project one row onto `schema`; absent columns and missing cells become 0
    pub fn row_in_schema(&self, row: usize, schema: &FeatureSchema) -> Vec<f64> {
        schema
            .columns()
            .iter()
            .map(|name| {
                self.column(name)
                    .and_then(|col| col.get(row).copied().flatten())
                    .unwrap_or(0.0)
            })
            .collect()
    }

    /// Project every row onto `schema`
    pub fn to_matrix(&self, schema: &FeatureSchema) -> Vec<Vec<f64>> {
        let indices: Vec<Option<usize>> = schema
            .columns()
            .iter()
            .map(|name| self.names.iter().position(|n| n == name))
            .collect();
        (0..self.rows)
            .map(|row| {
                indices
                    .iter()
                    .map(|idx| {
                        idx.and_then(|i| self.columns[i][row]).unwrap_or(0.0)
                    })
                    .collect()
            })
            .collect()
    }
}

/// Builds feature tables from ordered series
#[derive(Debug, Clone)]
pub struct FeatureBuilder {
    lags: Vec<usize>,
    short_window: usize,
    long_window: usize,
}

impl Default for FeatureBuilder {
    fn default() -> Self {
        Self {
            lags: LAGS.to_vec(),
            short_window: SHORT_WINDOW,
            long_window: LONG_WINDOW,
        }
    }
}

impl FeatureBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Largest lag; rows before it lack at least one lag feature
    pub fn max_lag(&self) -> usize {
        self.lags.iter().copied().max().unwrap_or(0)
    }

    /// Raw features with missing cells left as `None`
    pub fn build(&self, series: &[TimeSeriesRecord]) -> FeatureTable {
        let mut table = FeatureTable::with_rows(series.len());

        let hours: Vec<u32> = series.iter().map(|r| r.timestamp.hour()).collect();
        let weekdays: Vec<u32> = series
            .iter()
            .map(|r| r.timestamp.weekday().num_days_from_monday())
            .collect();

        table.push("hour", hours.iter().map(|h| Some(*h as f64)).collect());
        table.push("day_of_week", weekdays.iter().map(|d| Some(*d as f64)).collect());
        table.push(
            "month",
            series.iter().map(|r| Some(r.timestamp.month() as f64)).collect(),
        );
        table.push("is_weekend", weekdays.iter().map(|d| flag(*d >= 5)).collect());
        table.push(
            "is_business_hours",
            hours.iter().map(|h| flag((9..=17).contains(h))).collect(),
        );
        table.push("is_night", hours.iter().map(|h| flag(*h <= 6 || *h >= 22)).collect());

        let discharges: Vec<f64> = series.iter().map(|r| r.discharges as f64).collect();
        table.push("discharges", discharges.iter().map(|v| Some(*v)).collect());
        table.push(
            "occupancy_rate",
            series.iter().map(|r| Some(r.occupancy_rate)).collect(),
        );

        for resource in Resource::ALL {
            let values: Vec<f64> = series.iter().map(|r| r.value_of(resource)).collect();
            for &lag in &self.lags {
                table.push(format!("{}_lag_{}", resource, lag), lagged(&values, lag));
            }
            table.push(
                format!("{}_roll_mean_{}", resource, self.short_window),
                rolling_mean(&values, self.short_window),
            );
            table.push(
                format!("{}_roll_std_{}", resource, self.short_window),
                rolling_std(&values, self.short_window),
            );
            table.push(
                format!("{}_roll_mean_{}", resource, self.long_window),
                rolling_mean(&values, self.long_window),
            );
        }

        table.push(
            "occupancy_oxygen_ratio",
            series
                .iter()
                .map(|r| Some(r.bed_occupancy as f64 / (r.oxygen_level + 1.0)))
                .collect(),
        );
        let admissions: Vec<f64> = series.iter().map(|r| r.admissions as f64).collect();
        table.push(
            "admission_rate_trend",
            rolling_mean(&admissions, self.short_window),
        );
        table.push(
            "discharge_rate_trend",
            rolling_mean(&discharges, self.short_window),
        );

        table
    }

    /// Features for training: whole-series forward then backward fill
    pub fn build_training(&self, series: &[TimeSeriesRecord]) -> FeatureTable {
        let mut table = self.build(series);
        table.fill_forward_backward();
        table
    }
}

fn flag(value: bool) -> Option<f64> {
    Some(if value { 1.0 } else { 0.0 })
}

/// `values[t - lag]`, missing for `t < lag`
pub fn lagged(values: &[f64], lag: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|t| t.checked_sub(lag).map(|i| values[i]))
        .collect()
}

/// Trailing mean over `min(window, t + 1)` values
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|t| {
            let slice = trailing(values, t, window);
            Some(slice.iter().sum::<f64>() / slice.len() as f64)
        })
        .collect()
}

/// Trailing sample standard deviation; missing while the window holds one value
pub fn rolling_std(values: &[f64], window: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|t| {
            let slice = trailing(values, t, window);
            if slice.len() < 2 {
                return None;
            }
            let mean = slice.iter().sum::<f64>() / slice.len() as f64;
            let sum_sq: f64 = slice.iter().map(|v| (v - mean).powi(2)).sum();
            Some((sum_sq / (slice.len() - 1) as f64).sqrt())
        })
        .collect()
}

fn trailing(values: &[f64], t: usize, window: usize) -> &[f64] {
    let start = (t + 1).saturating_sub(window.max(1));
    &values[start..=t]
}

//! Core data models for hospital demand forecasting and staff allocation

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Bed capacity used to bound occupancy when a record does not say otherwise
pub const DEFAULT_TOTAL_BEDS: u32 = 250;

/// Staff count assumed for a (category, shift) cell missing from the current allocation
pub const DEFAULT_CURRENT_COUNT: u32 = 5;

/// One hourly observation of hospital activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesRecord {
    pub timestamp: DateTime<Utc>,
    pub admissions: u32,
    pub discharges: u32,
    pub bed_occupancy: u32,
    pub oxygen_level: f64,
    pub occupancy_rate: f64,
}

impl TimeSeriesRecord {
    /// Value of a forecast target in this record
    pub fn value_of(&self, resource: Resource) -> f64 {
        match resource {
            Resource::Admissions => self.admissions as f64,
            Resource::BedOccupancy => self.bed_occupancy as f64,
            Resource::OxygenLevel => self.oxygen_level,
        }
    }

    /// Check field ranges; `index` is only used to locate the error
    pub fn validate(&self, index: usize, total_beds: u32) -> Result<()> {
        if self.bed_occupancy > total_beds {
            return Err(Error::Validation(format!(
                "row {}: bed_occupancy {} exceeds total beds {}",
                index, self.bed_occupancy, total_beds
            )));
        }
        if !self.oxygen_level.is_finite() || self.oxygen_level < 0.0 {
            return Err(Error::Validation(format!(
                "row {}: oxygen_level must be a non-negative number, got {}",
                index, self.oxygen_level
            )));
        }
        if !self.occupancy_rate.is_finite() || !(0.0..=100.0).contains(&self.occupancy_rate) {
            return Err(Error::Validation(format!(
                "row {}: occupancy_rate must be within [0, 100], got {}",
                index, self.occupancy_rate
            )));
        }
        Ok(())
    }
}

/// Validate a series: every row in range and timestamps strictly increasing
pub fn validate_series(series: &[TimeSeriesRecord], total_beds: u32) -> Result<()> {
    for (i, record) in series.iter().enumerate() {
        record.validate(i, total_beds)?;
        if i > 0 && record.timestamp <= series[i - 1].timestamp {
            return Err(Error::Validation(format!(
                "row {}: timestamp {} is not after the previous row ({})",
                i,
                record.timestamp.to_rfc3339(),
                series[i - 1].timestamp.to_rfc3339()
            )));
        }
    }
    Ok(())
}

/// Forecast target resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Admissions,
    BedOccupancy,
    OxygenLevel,
}

impl Resource {
    pub const ALL: [Resource; 3] = [
        Resource::Admissions,
        Resource::BedOccupancy,
        Resource::OxygenLevel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Admissions => "admissions",
            Resource::BedOccupancy => "bed_occupancy",
            Resource::OxygenLevel => "oxygen_level",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Staff categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StaffCategory {
    Nurses,
    Doctors,
    #[serde(rename = "Support_Staff")]
    SupportStaff,
}

impl StaffCategory {
    pub const ALL: [StaffCategory; 3] = [
        StaffCategory::Nurses,
        StaffCategory::Doctors,
        StaffCategory::SupportStaff,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StaffCategory::Nurses => "Nurses",
            StaffCategory::Doctors => "Doctors",
            StaffCategory::SupportStaff => "Support_Staff",
        }
    }
}

impl fmt::Display for StaffCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shifts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Shift {
    Morning,
    Evening,
    Night,
}

impl Shift {
    pub const ALL: [Shift; 3] = [Shift::Morning, Shift::Evening, Shift::Night];

    pub fn as_str(&self) -> &'static str {
        match self {
            Shift::Morning => "Morning",
            Shift::Evening => "Evening",
            Shift::Night => "Night",
        }
    }
}

impl fmt::Display for Shift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Staff counts by category and shift
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaffAllocation(BTreeMap<StaffCategory, BTreeMap<Shift, u32>>);

impl StaffAllocation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, category: StaffCategory, shift: Shift) -> Option<u32> {
        self.0.get(&category).and_then(|shifts| shifts.get(&shift)).copied()
    }

    pub fn set(&mut self, category: StaffCategory, shift: Shift, count: u32) {
        self.0.entry(category).or_default().insert(shift, count);
    }

    /// Builder-style `set`
    pub fn with(mut self, category: StaffCategory, shift: Shift, count: u32) -> Self {
        self.set(category, shift, count);
        self
    }

    /// Iterate over every populated cell in category, shift order
    pub fn cells(&self) -> impl Iterator<Item = (StaffCategory, Shift, u32)> + '_ {
        self.0.iter().flat_map(|(category, shifts)| {
            shifts
                .iter()
                .map(move |(shift, count)| (*category, *shift, *count))
        })
    }

    pub fn total(&self) -> u32 {
        self.cells().map(|(_, _, count)| count).sum()
    }

    pub fn category_total(&self, category: StaffCategory) -> u32 {
        self.0
            .get(&category)
            .map(|shifts| shifts.values().sum())
            .unwrap_or(0)
    }

    pub fn shift_total(&self, shift: Shift) -> u32 {
        self.0
            .values()
            .filter_map(|shifts| shifts.get(&shift))
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(|shifts| shifts.is_empty())
    }
}

/// Demand predicted for the planning period; absent values disable the rules keyed on them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictedDemand {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admissions: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bed_occupancy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oxygen_level: Option<f64>,
}

/// Optional user constraints on an allocation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllocationConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_budget: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_total_staff: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_total_staff: Option<u32>,
}

/// Which path produced an allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverStatus {
    Optimal,
    HeuristicFallback,
}

impl SolverStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SolverStatus::Optimal => "optimal",
            SolverStatus::HeuristicFallback => "heuristic_fallback",
        }
    }
}

/// Cost of one (category, shift) cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShiftCost {
    pub count: u32,
    pub rate: f64,
    pub cost: f64,
}

/// Cost of one staff category across shifts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryCost {
    pub shifts: BTreeMap<Shift, ShiftCost>,
    pub total: f64,
}

pub type CostBreakdown = BTreeMap<StaffCategory, CategoryCost>;

/// Staffing shape of an allocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EfficiencyMetrics {
    pub total_staff: u32,
    pub average_cost_per_staff: f64,
    pub staff_distribution: BTreeMap<StaffCategory, u32>,
    pub shift_coverage: BTreeMap<Shift, u32>,
}

/// Outcome of an allocation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationResult {
    pub allocation: StaffAllocation,
    pub total_cost: f64,
    pub objective_value: f64,
    pub solver_status: SolverStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    pub cost_breakdown: CostBreakdown,
    pub efficiency_metrics: EfficiencyMetrics,
    pub recommendations: Vec<String>,
    pub optimized_at: DateTime<Utc>,
}

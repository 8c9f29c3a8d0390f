//! Hourly staff rates and the cost views derived from them

use crate::models::{
    CategoryCost, CostBreakdown, EfficiencyMetrics, Shift, ShiftCost, StaffAllocation,
    StaffCategory,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Hourly rate per (category, shift)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CostTable(BTreeMap<StaffCategory, BTreeMap<Shift, f64>>);

impl Default for CostTable {
    fn default() -> Self {
        use Shift::*;
        use StaffCategory::*;

        let table = [
            (Nurses, [25.0, 28.0, 32.0]),
            (Doctors, [80.0, 85.0, 95.0]),
            (SupportStaff, [18.0, 20.0, 25.0]),
        ];
        let mut rates = BTreeMap::new();
        for (category, [morning, evening, night]) in table {
            rates.insert(
                category,
                BTreeMap::from([(Morning, morning), (Evening, evening), (Night, night)]),
            );
        }
        Self(rates)
    }
}

impl CostTable {
    pub fn with_rate(mut self, category: StaffCategory, shift: Shift, rate: f64) -> Self {
        self.0.entry(category).or_default().insert(shift, rate);
        self
    }

    /// Rate for a cell; cells without a rate cost nothing
    pub fn rate(&self, category: StaffCategory, shift: Shift) -> f64 {
        self.0
            .get(&category)
            .and_then(|shifts| shifts.get(&shift))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn total_cost(&self, allocation: &StaffAllocation) -> f64 {
        allocation
            .cells()
            .map(|(category, shift, count)| count as f64 * self.rate(category, shift))
            .sum()
    }

    pub fn breakdown(&self, allocation: &StaffAllocation) -> CostBreakdown {
        let mut breakdown = CostBreakdown::new();
        for (category, shift, count) in allocation.cells() {
            let rate = self.rate(category, shift);
            let entry = breakdown.entry(category).or_insert_with(|| CategoryCost {
                shifts: BTreeMap::new(),
                total: 0.0,
            });
            let cost = count as f64 * rate;
            entry.shifts.insert(shift, ShiftCost { count, rate, cost });
            entry.total += cost;
        }
        breakdown
    }

    pub fn efficiency_metrics(&self, allocation: &StaffAllocation) -> EfficiencyMetrics {
        let total_staff = allocation.total();
        let average = self.total_cost(allocation) / total_staff.max(1) as f64;

        let mut staff_distribution = BTreeMap::new();
        for (category, _, _) in allocation.cells() {
            staff_distribution
                .entry(category)
                .or_insert_with(|| allocation.category_total(category));
        }

        EfficiencyMetrics {
            total_staff,
            average_cost_per_staff: (average * 100.0).round() / 100.0,
            staff_distribution,
            shift_coverage: Shift::ALL
                .into_iter()
                .map(|shift| (shift, allocation.shift_total(shift)))
                .collect(),
        }
    }
}

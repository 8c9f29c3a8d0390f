//! Deterministic heuristic allocation and change recommendations

use crate::models::{
    PredictedDemand, Shift, StaffAllocation, StaffCategory, DEFAULT_CURRENT_COUNT,
};

/// Admissions above this add staff in the heuristic
pub const HEURISTIC_HIGH_ADMISSIONS: f64 = 10.0;

/// Admissions below this remove one staff member per cell
pub const HEURISTIC_LOW_ADMISSIONS: f64 = 5.0;

/// Bed occupancy above this adds one staff member per cell
pub const HEURISTIC_HIGH_OCCUPANCY: f64 = 200.0;

/// Heuristic counts are clamped to this range
pub const HEURISTIC_MIN_COUNT: i64 = 1;
pub const HEURISTIC_MAX_COUNT: i64 = 50;

/// Adjust every (category, shift) cell of `current` by a bounded amount
/// derived from predicted demand. Absent cells start at
/// [`DEFAULT_CURRENT_COUNT`]; results stay within 1..=50.
pub fn heuristic_allocation(
    current: &StaffAllocation,
    demand: &PredictedDemand,
) -> StaffAllocation {
    let mut allocation = StaffAllocation::new();
    for category in StaffCategory::ALL {
        for shift in Shift::ALL {
            let start = current.get(category, shift).unwrap_or(DEFAULT_CURRENT_COUNT) as i64;
            let mut adjustment = match demand.admissions {
                Some(a) if a > HEURISTIC_HIGH_ADMISSIONS => match shift {
                    Shift::Morning | Shift::Evening => 2,
                    Shift::Night => 1,
                },
                Some(a) if a < HEURISTIC_LOW_ADMISSIONS => -1,
                _ => 0,
            };
            if demand.bed_occupancy.is_some_and(|b| b > HEURISTIC_HIGH_OCCUPANCY) {
                adjustment += 1;
            }
            let count = (start + adjustment).clamp(HEURISTIC_MIN_COUNT, HEURISTIC_MAX_COUNT);
            allocation.set(category, shift, count as u32);
        }
    }
    allocation
}

/// One line per changed cell, in category then shift order.
/// Cells absent from `current` compare against 0.
pub fn recommendations(current: &StaffAllocation, proposed: &StaffAllocation) -> Vec<String> {
    let mut lines = Vec::new();
    for category in StaffCategory::ALL {
        for shift in Shift::ALL {
            let before = current.get(category, shift).unwrap_or(0) as i64;
            let Some(after) = proposed.get(category, shift).map(i64::from) else {
                continue;
            };
            if after > before {
                lines.push(format!(
                    "Increase {} for {} shift: {} → {} (+{})",
                    category,
                    shift,
                    before,
                    after,
                    after - before
                ));
            } else if after < before {
                lines.push(format!(
                    "Decrease {} for {} shift: {} → {} ({})",
                    category,
                    shift,
                    before,
                    after,
                    after - before
                ));
            }
        }
    }
    if lines.is_empty() {
        lines.push("Current staff allocation is optimal".to_string());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demand(admissions: Option<f64>, beds: Option<f64>) -> PredictedDemand {
        PredictedDemand {
            admissions,
            bed_occupancy: beds,
            oxygen_level: None,
        }
    }

    #[test]
    fn test_high_admissions_adds_more_by_day() {
        let current = StaffAllocation::new().with(StaffCategory::Nurses, Shift::Morning, 20);
        let result = heuristic_allocation(&current, &demand(Some(14.0), Some(180.0)));

        assert_eq!(result.get(StaffCategory::Nurses, Shift::Morning), Some(22));
        // absent cells start from the default of 5
        assert_eq!(result.get(StaffCategory::Doctors, Shift::Evening), Some(7));
        assert_eq!(result.get(StaffCategory::Doctors, Shift::Night), Some(6));
    }

    #[test]
    fn test_occupancy_bonus_stacks() {
        let current = StaffAllocation::new().with(StaffCategory::SupportStaff, Shift::Night, 4);
        let result = heuristic_allocation(&current, &demand(Some(11.0), Some(210.0)));
        assert_eq!(result.get(StaffCategory::SupportStaff, Shift::Night), Some(6));

        let result = heuristic_allocation(&current, &demand(None, Some(210.0)));
        assert_eq!(result.get(StaffCategory::SupportStaff, Shift::Night), Some(5));
    }

    #[test]
    fn test_low_admissions_clamps_at_one() {
        let current = StaffAllocation::new()
            .with(StaffCategory::Doctors, Shift::Night, 1)
            .with(StaffCategory::Nurses, Shift::Evening, 9);
        let result = heuristic_allocation(&current, &demand(Some(3.0), None));
        assert_eq!(result.get(StaffCategory::Doctors, Shift::Night), Some(1));
        assert_eq!(result.get(StaffCategory::Nurses, Shift::Evening), Some(8));
    }

    #[test]
    fn test_high_demand_caps_at_fifty() {
        let current = StaffAllocation::new()
            .with(StaffCategory::Nurses, Shift::Morning, 50)
            .with(StaffCategory::Nurses, Shift::Night, 49)
            .with(StaffCategory::Doctors, Shift::Evening, 60);
        let result = heuristic_allocation(&current, &demand(Some(25.0), Some(230.0)));

        assert_eq!(result.get(StaffCategory::Nurses, Shift::Morning), Some(50));
        assert_eq!(result.get(StaffCategory::Nurses, Shift::Night), Some(50));
        assert_eq!(result.get(StaffCategory::Doctors, Shift::Evening), Some(50));
        assert!(result.cells().all(|(_, _, count)| (1..=50).contains(&count)));
    }

    #[test]
    fn test_mid_range_leaves_counts() {
        let current = StaffAllocation::new().with(StaffCategory::Nurses, Shift::Morning, 20);
        let result = heuristic_allocation(&current, &demand(Some(7.0), Some(150.0)));
        assert_eq!(result.get(StaffCategory::Nurses, Shift::Morning), Some(20));
        assert_eq!(result.total(), 20 + 8 * 5);
    }

    #[test]
    fn test_recommendation_lines() {
        let current = StaffAllocation::new()
            .with(StaffCategory::Nurses, Shift::Morning, 20)
            .with(StaffCategory::Doctors, Shift::Night, 6);
        let proposed = StaffAllocation::new()
            .with(StaffCategory::Nurses, Shift::Morning, 22)
            .with(StaffCategory::Doctors, Shift::Night, 5)
            .with(StaffCategory::SupportStaff, Shift::Evening, 3);

        let lines = recommendations(&current, &proposed);
        assert_eq!(
            lines,
            vec![
                "Increase Nurses for Morning shift: 20 → 22 (+2)",
                "Decrease Doctors for Night shift: 6 → 5 (-1)",
                "Increase Support_Staff for Evening shift: 0 → 3 (+3)",
            ]
        );
    }

    #[test]
    fn test_unchanged_allocation_is_optimal() {
        let current = StaffAllocation::new().with(StaffCategory::Nurses, Shift::Night, 12);
        assert_eq!(
            recommendations(&current, &current.clone()),
            vec!["Current staff allocation is optimal"]
        );
    }
}

use super::*;
use crate::error::Error;
use crate::models::{
    AllocationConstraints, AllocationResult, PredictedDemand, Shift, SolverStatus,
    StaffAllocation, StaffCategory,
};

use Shift::*;
use StaffCategory::*;

fn sample_current() -> StaffAllocation {
    StaffAllocation::new()
        .with(Nurses, Morning, 20)
        .with(Nurses, Evening, 15)
        .with(Nurses, Night, 12)
        .with(Doctors, Morning, 12)
        .with(Doctors, Evening, 10)
        .with(Doctors, Night, 6)
        .with(SupportStaff, Morning, 8)
        .with(SupportStaff, Evening, 6)
        .with(SupportStaff, Night, 4)
}

fn demand(admissions: f64, beds: f64) -> PredictedDemand {
    PredictedDemand {
        admissions: Some(admissions),
        bed_occupancy: Some(beds),
        oxygen_level: Some(1200.0),
    }
}

fn sample_constraints() -> AllocationConstraints {
    AllocationConstraints {
        max_budget: Some(15000.0),
        min_total_staff: Some(60),
        max_total_staff: None,
    }
}

fn assert_costs_consistent(result: &AllocationResult) {
    let costs = CostTable::default();
    assert_eq!(result.total_cost, costs.total_cost(&result.allocation));
    let breakdown_sum: f64 = result.cost_breakdown.values().map(|c| c.total).sum();
    assert!((breakdown_sum - result.total_cost).abs() < 1e-9);
    assert_eq!(result.efficiency_metrics.total_staff, result.allocation.total());
    if result.solver_status == SolverStatus::Optimal {
        assert!((result.objective_value - result.total_cost).abs() < 1e-6);
    }
}

#[test]
fn test_sample_request_falls_back_on_nurse_band_conflict() {
    let optimizer = StaffOptimizer::default();
    let result = optimizer
        .optimize(&sample_current(), &demand(14.0, 180.0), Some(&sample_constraints()))
        .unwrap();

    // morning nurses need 30 but may move at most 6 from 20
    assert_eq!(result.solver_status, SolverStatus::HeuristicFallback);
    assert!(result.fallback_reason.as_deref().unwrap().contains("Nurses_Morning"));

    let allocation = &result.allocation;
    assert!(allocation.get(Nurses, Night).unwrap() >= 10);
    assert!(allocation.get(Doctors, Night).unwrap() >= 5);
    assert_eq!(allocation.get(Nurses, Morning), Some(22));
    assert_eq!(allocation.get(Nurses, Night), Some(13));
    assert_eq!(allocation.get(Doctors, Night), Some(7));
    assert_eq!(allocation.get(SupportStaff, Evening), Some(8));
    assert_eq!(result.total_cost, 4712.0);
    assert_eq!(result.objective_value, result.total_cost);
    assert_costs_consistent(&result);
}

#[test]
fn test_feasible_request_reaches_known_optimum() {
    let optimizer = StaffOptimizer::default();
    let current = sample_current();
    let result = optimizer
        .optimize(&current, &demand(8.0, 100.0), Some(&sample_constraints()))
        .unwrap();

    assert_eq!(result.solver_status, SolverStatus::Optimal);
    assert!(result.fallback_reason.is_none());

    // cells sit at their lower limits; the weekend rule lifts the
    // cheaper morning shift for nurses and doctors
    let expected = StaffAllocation::new()
        .with(Nurses, Morning, 19)
        .with(Nurses, Evening, 12)
        .with(Nurses, Night, 10)
        .with(Doctors, Morning, 12)
        .with(Doctors, Evening, 7)
        .with(Doctors, Night, 5)
        .with(SupportStaff, Morning, 6)
        .with(SupportStaff, Evening, 4)
        .with(SupportStaff, Night, 2);
    assert_eq!(result.allocation, expected);
    assert_eq!(result.total_cost, 3399.0);
    assert!(result.total_cost <= 15000.0);
    assert_costs_consistent(&result);

    for (category, shift, count) in result.allocation.cells() {
        assert!((1..=50).contains(&count));
        let before = current.get(category, shift).unwrap() as f64;
        let band = 2f64.max((before * 0.3).floor());
        assert!((count as f64 - before).abs() <= band, "{} {}", category, shift);
    }
}

#[test]
fn test_empty_current_allocation_uses_minimums() {
    let optimizer = StaffOptimizer::default();
    let result = optimizer
        .optimize(&StaffAllocation::new(), &PredictedDemand::default(), None)
        .unwrap();

    assert_eq!(result.solver_status, SolverStatus::Optimal);
    assert_eq!(result.allocation.get(Nurses, Night), Some(10));
    assert_eq!(result.allocation.get(Doctors, Night), Some(5));
    assert_eq!(result.allocation.get(SupportStaff, Morning), Some(1));
    assert_eq!(result.total_cost, 1076.0);
    assert_eq!(result.recommendations.len(), 9);
    assert!(result.recommendations[0].starts_with("Increase Nurses for Morning shift: 0 → 1"));
}

#[test]
fn test_low_admission_heuristic_decrements_every_cell() {
    let current = sample_current().with(SupportStaff, Night, 1);
    let constraints = AllocationConstraints {
        max_total_staff: Some(10),
        ..Default::default()
    };
    let result = StaffOptimizer::default()
        .optimize(
            &current,
            &PredictedDemand {
                admissions: Some(3.0),
                ..Default::default()
            },
            Some(&constraints),
        )
        .unwrap();

    // night minimums alone exceed the total cap
    assert_eq!(result.solver_status, SolverStatus::HeuristicFallback);
    for (category, shift, count) in current.cells() {
        let expected = count.saturating_sub(1).max(1);
        assert_eq!(result.allocation.get(category, shift), Some(expected));
    }
    assert_costs_consistent(&result);
}

#[test]
fn test_unchanged_allocation_is_reported_optimal() {
    let current = StaffAllocation::new()
        .with(Nurses, Morning, 1)
        .with(Nurses, Evening, 1)
        .with(Nurses, Night, 10)
        .with(Doctors, Morning, 1)
        .with(Doctors, Evening, 1)
        .with(Doctors, Night, 5)
        .with(SupportStaff, Morning, 1)
        .with(SupportStaff, Evening, 1)
        .with(SupportStaff, Night, 1);
    let result = StaffOptimizer::default()
        .optimize(&current, &PredictedDemand::default(), None)
        .unwrap();
    assert_eq!(result.allocation, current);
    assert_eq!(result.recommendations, vec!["Current staff allocation is optimal"]);
}

#[test]
fn test_invalid_request_is_rejected() {
    let result = StaffOptimizer::default().optimize(
        &sample_current(),
        &demand(f64::INFINITY, 100.0),
        None,
    );
    assert!(matches!(result, Err(Error::Validation(_))));
}

struct MisreportingSolver;

impl Solver for MisreportingSolver {
    fn name(&self) -> &'static str {
        "misreporting"
    }

    fn solve(&self, problem: &AllocationProblem) -> Result<Solution, SolverError> {
        let values: Vec<i64> = problem.variables.iter().map(|v| v.upper).collect();
        Ok(Solution {
            status: SolveStatus::Optimal,
            values,
            objective: 1.0,
            nodes: 1,
        })
    }
}

struct BrokenSolver;

impl Solver for BrokenSolver {
    fn name(&self) -> &'static str {
        "broken"
    }

    fn solve(&self, _problem: &AllocationProblem) -> Result<Solution, SolverError> {
        Err(SolverError::EmptyProblem)
    }
}

#[test]
fn test_objective_mismatch_triggers_fallback() {
    let result = StaffOptimizer::new(MisreportingSolver)
        .optimize(&sample_current(), &demand(8.0, 100.0), None)
        .unwrap();
    assert_eq!(result.solver_status, SolverStatus::HeuristicFallback);
    assert!(result.fallback_reason.unwrap().contains("disagrees"));
}

#[test]
fn test_solver_error_triggers_fallback() {
    let result = StaffOptimizer::new(BrokenSolver)
        .optimize(&sample_current(), &demand(8.0, 100.0), None)
        .unwrap();
    assert_eq!(result.solver_status, SolverStatus::HeuristicFallback);
    assert!(result.fallback_reason.as_ref().unwrap().contains("broken failed"));
    assert_costs_consistent(&result);
}

#[test]
fn test_node_limit_triggers_fallback() {
    let result = StaffOptimizer::new(BranchAndBoundSolver::new(1))
        .optimize(&sample_current(), &demand(8.0, 100.0), Some(&sample_constraints()))
        .unwrap();
    assert_eq!(result.solver_status, SolverStatus::HeuristicFallback);
    assert!(result.fallback_reason.unwrap().contains("node_limit"));
}

#[test]
fn test_custom_costs_change_the_optimum() {
    // evening nurses cheaper than morning: weekend top-up moves to evening
    let costs = CostTable::default().with_rate(Nurses, Evening, 20.0);
    let result = StaffOptimizer::default()
        .with_costs(costs)
        .optimize(&sample_current(), &demand(8.0, 100.0), None)
        .unwrap();
    assert_eq!(result.solver_status, SolverStatus::Optimal);
    assert_eq!(result.allocation.get(Nurses, Morning), Some(16));
    assert_eq!(result.allocation.get(Nurses, Evening), Some(15));
}

#[test]
fn test_policy_without_weekend_rule() {
    let policy = AllocationPolicy {
        weekend_rule: None,
        ..AllocationPolicy::default()
    };
    let result = StaffOptimizer::default()
        .with_policy(policy)
        .optimize(&sample_current(), &demand(8.0, 100.0), None)
        .unwrap();
    assert_eq!(result.solver_status, SolverStatus::Optimal);
    assert_eq!(result.allocation.get(Nurses, Morning), Some(16));
    assert_eq!(result.allocation.get(Doctors, Morning), Some(9));
}

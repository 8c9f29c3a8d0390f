//! Staff allocation optimizer
//!
//! Builds the allocation problem, hands it to the solver and, on anything
//! short of a verified optimum, answers with the heuristic allocation.

use super::costs::CostTable;
use super::fallback::{heuristic_allocation, recommendations};
use super::problem::{AllocationModelBuilder, AllocationPolicy};
use super::solver::{BranchAndBoundSolver, SolveStatus, Solver};
use crate::error::{Error, Result};
use crate::models::{
    AllocationConstraints, AllocationResult, PredictedDemand, SolverStatus, StaffAllocation,
};
use chrono::Utc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Allowed gap between the solver objective and the recomputed cost
const OBJECTIVE_TOLERANCE: f64 = 1e-6;

pub struct StaffOptimizer<S: Solver = BranchAndBoundSolver> {
    builder: AllocationModelBuilder,
    solver: S,
}

impl Default for StaffOptimizer<BranchAndBoundSolver> {
    fn default() -> Self {
        Self::new(BranchAndBoundSolver::default())
    }
}

impl<S: Solver> StaffOptimizer<S> {
    pub fn new(solver: S) -> Self {
        Self {
            builder: AllocationModelBuilder::default(),
            solver,
        }
    }

    pub fn with_policy(mut self, policy: AllocationPolicy) -> Self {
        self.builder = AllocationModelBuilder::new(policy, self.builder.costs().clone());
        self
    }

    pub fn with_costs(mut self, costs: CostTable) -> Self {
        self.builder = AllocationModelBuilder::new(self.builder.policy().clone(), costs);
        self
    }

    pub fn builder(&self) -> &AllocationModelBuilder {
        &self.builder
    }

    pub fn costs(&self) -> &CostTable {
        self.builder.costs()
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    /// Optimize the allocation for predicted demand.
    ///
    /// Only malformed input is an error. Infeasible problems, solver errors
    /// and node limits produce a `heuristic_fallback` result carrying the
    /// reason.
    pub fn optimize(
        &self,
        current: &StaffAllocation,
        demand: &PredictedDemand,
        constraints: Option<&AllocationConstraints>,
    ) -> Result<AllocationResult> {
        let start = Instant::now();
        let problem = self.builder.build(current, demand, constraints)?;
        debug!(
            variables = problem.variables.len(),
            constraints = problem.constraints.len(),
            "Allocation problem built"
        );

        let outcome = if let Some(variable) = problem.empty_variable_range() {
            Err(Error::OptimizationInfeasible(format!(
                "no admissible value for {}",
                variable.name()
            )))
        } else {
            match self.solver.solve(&problem) {
                Ok(solution) if solution.status == SolveStatus::Optimal => {
                    let allocation = problem.to_allocation(&solution.values);
                    let cost = self.costs().total_cost(&allocation);
                    if (cost - solution.objective).abs() <= OBJECTIVE_TOLERANCE {
                        Ok((allocation, solution.objective, solution.nodes))
                    } else {
                        Err(Error::OptimizationInfeasible(format!(
                            "solver objective {} disagrees with recomputed cost {}",
                            solution.objective, cost
                        )))
                    }
                }
                Ok(solution) => Err(Error::OptimizationInfeasible(format!(
                    "{} reported {} after {} nodes",
                    self.solver.name(),
                    solution.status.as_str(),
                    solution.nodes
                ))),
                Err(e) => Err(Error::OptimizationInfeasible(format!(
                    "{} failed: {}",
                    self.solver.name(),
                    e
                ))),
            }
        };

        let (allocation, objective, status, reason) = match outcome {
            Ok((allocation, objective, nodes)) => {
                info!(
                    solver = self.solver.name(),
                    nodes,
                    objective,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Optimal staff allocation found"
                );
                (allocation, objective, SolverStatus::Optimal, None)
            }
            Err(e) => {
                warn!(error = %e, "Using heuristic staff allocation");
                let allocation = heuristic_allocation(current, demand);
                let cost = self.costs().total_cost(&allocation);
                (allocation, cost, SolverStatus::HeuristicFallback, Some(e.to_string()))
            }
        };

        Ok(self.result(current, allocation, objective, status, reason))
    }

    fn result(
        &self,
        current: &StaffAllocation,
        allocation: StaffAllocation,
        objective_value: f64,
        solver_status: SolverStatus,
        fallback_reason: Option<String>,
    ) -> AllocationResult {
        let costs = self.costs();
        AllocationResult {
            total_cost: costs.total_cost(&allocation),
            objective_value,
            solver_status,
            fallback_reason,
            cost_breakdown: costs.breakdown(&allocation),
            efficiency_metrics: costs.efficiency_metrics(&allocation),
            recommendations: recommendations(current, &allocation),
            allocation,
            optimized_at: Utc::now(),
        }
    }
}

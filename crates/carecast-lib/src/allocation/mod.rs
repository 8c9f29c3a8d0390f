//! Staff allocation
//!
//! Converts predicted demand into a cost-minimal staffing plan per
//! (category, shift), with a deterministic heuristic when no verified
//! optimum is available.

mod costs;
mod fallback;
mod optimizer;
mod problem;
mod solver;

#[cfg(test)]
mod tests;

pub use costs::CostTable;
pub use fallback::{
    heuristic_allocation, recommendations, HEURISTIC_HIGH_ADMISSIONS, HEURISTIC_HIGH_OCCUPANCY,
    HEURISTIC_LOW_ADMISSIONS, HEURISTIC_MAX_COUNT, HEURISTIC_MIN_COUNT,
};
pub use optimizer::StaffOptimizer;
pub use problem::{
    validate_request, AllocationModelBuilder, AllocationPolicy, AllocationProblem, Constraint,
    LinearExpr, Relation, Variable, WeekendRule, MAX_CURRENT_COUNT,
};
pub use solver::{
    BranchAndBoundSolver, Solution, SolveStatus, Solver, SolverError, DEFAULT_NODE_LIMIT,
};

//! Integer programming solver capability
//!
//! [`BranchAndBoundSolver`] is an exact depth-first branch and bound over
//! bounded integer variables. Each node tightens variable intervals by
//! propagating every linear constraint, then prunes on a cost lower bound.

use super::problem::{AllocationProblem, Relation};
use std::time::Instant;
use tracing::debug;

/// Default maximum number of search nodes
pub const DEFAULT_NODE_LIMIT: u64 = 2_000_000;

const EPSILON: f64 = 1e-9;
const MAX_PROPAGATION_PASSES: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum SolverError {
    #[error("problem has no variables")]
    EmptyProblem,

    #[error("constraint {constraint} references unknown variable {index}")]
    UnknownVariable { constraint: String, index: usize },

    #[error("non-finite coefficient in {0}")]
    NonFinite(String),

    #[error("variable {0} has inverted bounds")]
    InvalidBounds(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    Optimal,
    Infeasible,
    NodeLimit,
}

impl SolveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SolveStatus::Optimal => "optimal",
            SolveStatus::Infeasible => "infeasible",
            SolveStatus::NodeLimit => "node_limit",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub status: SolveStatus,
    /// One value per variable; empty unless a feasible point was found
    pub values: Vec<i64>,
    pub objective: f64,
    pub nodes: u64,
}

/// Mathematical programming capability
pub trait Solver: Send + Sync {
    fn name(&self) -> &'static str;

    fn solve(&self, problem: &AllocationProblem) -> Result<Solution, SolverError>;
}

#[derive(Debug, Clone)]
pub struct BranchAndBoundSolver {
    node_limit: u64,
}

impl Default for BranchAndBoundSolver {
    fn default() -> Self {
        Self {
            node_limit: DEFAULT_NODE_LIMIT,
        }
    }
}

impl BranchAndBoundSolver {
    pub fn new(node_limit: u64) -> Self {
        Self {
            node_limit: node_limit.max(1),
        }
    }

    pub fn node_limit(&self) -> u64 {
        self.node_limit
    }
}

impl Solver for BranchAndBoundSolver {
    fn name(&self) -> &'static str {
        "branch_and_bound"
    }

    fn solve(&self, problem: &AllocationProblem) -> Result<Solution, SolverError> {
        check_problem(problem)?;
        let start = Instant::now();

        // expensive variables first so the bound bites early
        let mut order: Vec<usize> = (0..problem.variables.len()).collect();
        order.sort_by(|&a, &b| {
            let (ca, cb) = (problem.variables[a].cost.abs(), problem.variables[b].cost.abs());
            cb.partial_cmp(&ca).unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut search = Search {
            problem,
            order,
            node_limit: self.node_limit,
            nodes: 0,
            limit_hit: false,
            best: None,
            best_objective: f64::INFINITY,
        };
        let lower = problem.variables.iter().map(|v| v.lower).collect();
        let upper = problem.variables.iter().map(|v| v.upper).collect();
        search.explore(lower, upper);

        let status = match (&search.best, search.limit_hit) {
            (_, true) => SolveStatus::NodeLimit,
            (Some(_), false) => SolveStatus::Optimal,
            (None, false) => SolveStatus::Infeasible,
        };
        debug!(
            status = status.as_str(),
            nodes = search.nodes,
            elapsed_us = start.elapsed().as_micros() as u64,
            "Branch and bound finished"
        );

        let objective = search.best_objective;
        Ok(Solution {
            status,
            values: search.best.unwrap_or_default(),
            objective: if objective.is_finite() { objective } else { 0.0 },
            nodes: search.nodes,
        })
    }
}

fn check_problem(problem: &AllocationProblem) -> Result<(), SolverError> {
    if problem.variables.is_empty() {
        return Err(SolverError::EmptyProblem);
    }
    for variable in &problem.variables {
        if !variable.cost.is_finite() {
            return Err(SolverError::NonFinite(format!("cost of {}", variable.name())));
        }
        if variable.lower > variable.upper {
            return Err(SolverError::InvalidBounds(variable.name()));
        }
    }
    for constraint in &problem.constraints {
        if !constraint.rhs.is_finite() {
            return Err(SolverError::NonFinite(constraint.label.clone()));
        }
        for (index, a) in &constraint.expr.terms {
            if *index >= problem.variables.len() {
                return Err(SolverError::UnknownVariable {
                    constraint: constraint.label.clone(),
                    index: *index,
                });
            }
            if !a.is_finite() {
                return Err(SolverError::NonFinite(constraint.label.clone()));
            }
        }
    }
    Ok(())
}

struct Search<'a> {
    problem: &'a AllocationProblem,
    order: Vec<usize>,
    node_limit: u64,
    nodes: u64,
    limit_hit: bool,
    best: Option<Vec<i64>>,
    best_objective: f64,
}

impl Search<'_> {
    fn explore(&mut self, mut lower: Vec<i64>, mut upper: Vec<i64>) {
        self.nodes += 1;
        if self.nodes > self.node_limit {
            self.limit_hit = true;
            return;
        }
        if !self.propagate(&mut lower, &mut upper) {
            return;
        }
        if self.lower_bound(&lower, &upper) >= self.best_objective - EPSILON {
            return;
        }

        let Some(&branch) = self.order.iter().find(|&&i| lower[i] < upper[i]) else {
            // every variable fixed; propagation has checked all constraints
            let objective = self.problem.objective(&lower);
            if objective < self.best_objective - EPSILON && self.problem.is_feasible(&lower) {
                self.best_objective = objective;
                self.best = Some(lower);
            }
            return;
        };

        let cost = self.problem.variables[branch].cost;
        let base = self.separable_bound(&lower, &upper);
        let values: Vec<i64> = if cost >= 0.0 {
            (lower[branch]..=upper[branch]).collect()
        } else {
            (lower[branch]..=upper[branch]).rev().collect()
        };

        for value in values {
            // cheapest remaining values come first, so later ones cannot win either
            let shift = if cost >= 0.0 {
                cost * (value - lower[branch]) as f64
            } else {
                cost * (value - upper[branch]) as f64
            };
            if base + shift >= self.best_objective - EPSILON {
                break;
            }
            let (mut lo, mut hi) = (lower.clone(), upper.clone());
            lo[branch] = value;
            hi[branch] = value;
            self.explore(lo, hi);
            if self.limit_hit {
                return;
            }
        }
    }

    /// Tighten intervals until stable; false when some interval empties
    fn propagate(&self, lower: &mut [i64], upper: &mut [i64]) -> bool {
        for _ in 0..MAX_PROPAGATION_PASSES {
            let mut changed = false;
            for constraint in &self.problem.constraints {
                let terms = &constraint.expr.terms;
                let rhs = constraint.rhs;

                if matches!(constraint.relation, Relation::LessEq | Relation::Equal) {
                    let min_activity: f64 = terms
                        .iter()
                        .map(|&(j, a)| {
                            if a > 0.0 {
                                a * lower[j] as f64
                            } else {
                                a * upper[j] as f64
                            }
                        })
                        .sum();
                    if min_activity > rhs + EPSILON {
                        return false;
                    }
                    for &(j, a) in terms {
                        if a > 0.0 {
                            let slack = rhs - min_activity + a * lower[j] as f64;
                            let bound = to_int((slack / a + EPSILON).floor());
                            if bound < upper[j] {
                                upper[j] = bound;
                                changed = true;
                            }
                        } else if a < 0.0 {
                            let slack = rhs - min_activity + a * upper[j] as f64;
                            let bound = to_int((slack / a - EPSILON).ceil());
                            if bound > lower[j] {
                                lower[j] = bound;
                                changed = true;
                            }
                        }
                        if lower[j] > upper[j] {
                            return false;
                        }
                    }
                }

                if matches!(constraint.relation, Relation::GreaterEq | Relation::Equal) {
                    let max_activity: f64 = terms
                        .iter()
                        .map(|&(j, a)| {
                            if a > 0.0 {
                                a * upper[j] as f64
                            } else {
                                a * lower[j] as f64
                            }
                        })
                        .sum();
                    if max_activity < rhs - EPSILON {
                        return false;
                    }
                    for &(j, a) in terms {
                        if a > 0.0 {
                            let need = rhs - max_activity + a * upper[j] as f64;
                            let bound = to_int((need / a - EPSILON).ceil());
                            if bound > lower[j] {
                                lower[j] = bound;
                                changed = true;
                            }
                        } else if a < 0.0 {
                            let need = rhs - max_activity + a * lower[j] as f64;
                            let bound = to_int((need / a + EPSILON).floor());
                            if bound < upper[j] {
                                upper[j] = bound;
                                changed = true;
                            }
                        }
                        if lower[j] > upper[j] {
                            return false;
                        }
                    }
                }
            }
            if !changed {
                break;
            }
        }
        true
    }

    /// Σ min(c·l, c·u) over the current intervals
    fn separable_bound(&self, lower: &[i64], upper: &[i64]) -> f64 {
        self.problem
            .variables
            .iter()
            .enumerate()
            .map(|(j, v)| (v.cost * lower[j] as f64).min(v.cost * upper[j] as f64))
            .sum()
    }

    /// Separable bound plus the cheapest way to cover the largest deficit
    /// among `>=` constraints with positive coefficients over
    /// non-negative-cost variables
    fn lower_bound(&self, lower: &[i64], upper: &[i64]) -> f64 {
        let base = self.separable_bound(lower, upper);
        let mut extra = 0.0f64;

        for constraint in &self.problem.constraints {
            if constraint.relation == Relation::LessEq {
                continue;
            }
            let terms = &constraint.expr.terms;
            let coverable = terms
                .iter()
                .all(|&(j, a)| a > 0.0 && self.problem.variables[j].cost >= 0.0);
            if !coverable {
                continue;
            }
            let activity: f64 = terms.iter().map(|&(j, a)| a * lower[j] as f64).sum();
            let deficit = constraint.rhs - activity;
            if deficit <= EPSILON {
                continue;
            }
            let cheapest = terms
                .iter()
                .filter(|&&(j, _)| lower[j] < upper[j])
                .map(|&(j, a)| self.problem.variables[j].cost / a)
                .fold(f64::INFINITY, f64::min);
            if cheapest.is_finite() {
                extra = extra.max(deficit * cheapest);
            }
        }
        base + extra
    }
}

fn to_int(value: f64) -> i64 {
    value.clamp(i64::MIN as f64, i64::MAX as f64) as i64
}

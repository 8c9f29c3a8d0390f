//! Allocation problem model and its builder
//!
//! The builder turns a current allocation, predicted demand and optional
//! user constraints into a bounded integer program: one variable per
//! (category, shift), a linear cost objective and a list of labeled linear
//! constraints. Every constraint is required; none is relaxed.

use super::costs::CostTable;
use crate::error::{Error, Result};
use crate::models::{
    AllocationConstraints, PredictedDemand, Shift, StaffAllocation, StaffCategory,
    DEFAULT_CURRENT_COUNT,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Upper limit accepted for any current cell count
pub const MAX_CURRENT_COUNT: u32 = 10_000;

const EPSILON: f64 = 1e-9;

/// Integer decision variable for one (category, shift) cell
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub category: StaffCategory,
    pub shift: Shift,
    pub lower: i64,
    pub upper: i64,
    pub cost: f64,
}

impl Variable {
    pub fn name(&self) -> String {
        format!("{}_{}", self.category, self.shift)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    LessEq,
    GreaterEq,
    Equal,
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Relation::LessEq => "<=",
            Relation::GreaterEq => ">=",
            Relation::Equal => "==",
        })
    }
}

/// Sparse linear expression over variable indices
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinearExpr {
    pub terms: Vec<(usize, f64)>,
}

impl LinearExpr {
    pub fn term(index: usize, coefficient: f64) -> Self {
        Self {
            terms: vec![(index, coefficient)],
        }
    }

    pub fn sum(indices: impl IntoIterator<Item = usize>) -> Self {
        Self {
            terms: indices.into_iter().map(|i| (i, 1.0)).collect(),
        }
    }

    pub fn evaluate(&self, values: &[i64]) -> f64 {
        self.terms
            .iter()
            .map(|(i, a)| a * values[*i] as f64)
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub label: String,
    pub expr: LinearExpr,
    pub relation: Relation,
    pub rhs: f64,
}

impl Constraint {
    pub fn new(label: impl Into<String>, expr: LinearExpr, relation: Relation, rhs: f64) -> Self {
        Self {
            label: label.into(),
            expr,
            relation,
            rhs,
        }
    }

    pub fn is_satisfied(&self, values: &[i64]) -> bool {
        let lhs = self.expr.evaluate(values);
        match self.relation {
            Relation::LessEq => lhs <= self.rhs + EPSILON,
            Relation::GreaterEq => lhs >= self.rhs - EPSILON,
            Relation::Equal => (lhs - self.rhs).abs() <= EPSILON,
        }
    }
}

/// Minimize Σ cost·x subject to bounds and constraints, x integer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AllocationProblem {
    pub variables: Vec<Variable>,
    pub constraints: Vec<Constraint>,
}

impl AllocationProblem {
    pub fn index_of(&self, category: StaffCategory, shift: Shift) -> Option<usize> {
        self.variables
            .iter()
            .position(|v| v.category == category && v.shift == shift)
    }

    pub fn constraint(&self, label: &str) -> Option<&Constraint> {
        self.constraints.iter().find(|c| c.label == label)
    }

    pub fn objective(&self, values: &[i64]) -> f64 {
        self.variables
            .iter()
            .zip(values)
            .map(|(v, x)| v.cost * *x as f64)
            .sum()
    }

    /// Bounds and every constraint hold for `values`
    pub fn is_feasible(&self, values: &[i64]) -> bool {
        values.len() == self.variables.len()
            && self
                .variables
                .iter()
                .zip(values)
                .all(|(v, x)| (v.lower..=v.upper).contains(x))
            && self.constraints.iter().all(|c| c.is_satisfied(values))
    }

    /// First variable whose bounds, narrowed by its single-variable
    /// constraints, leave no integer value
    pub fn empty_variable_range(&self) -> Option<&Variable> {
        let mut lower: Vec<f64> = self.variables.iter().map(|v| v.lower as f64).collect();
        let mut upper: Vec<f64> = self.variables.iter().map(|v| v.upper as f64).collect();

        for constraint in &self.constraints {
            let [(index, a)] = constraint.expr.terms.as_slice() else {
                continue;
            };
            if *index >= self.variables.len() || a.abs() < EPSILON {
                continue;
            }
            let bound = constraint.rhs / a;
            let (at_least, at_most) = match (constraint.relation, *a > 0.0) {
                (Relation::GreaterEq, true) | (Relation::LessEq, false) => (Some(bound), None),
                (Relation::LessEq, true) | (Relation::GreaterEq, false) => (None, Some(bound)),
                (Relation::Equal, _) => (Some(bound), Some(bound)),
            };
            if let Some(b) = at_least {
                lower[*index] = lower[*index].max((b - EPSILON).ceil());
            }
            if let Some(b) = at_most {
                upper[*index] = upper[*index].min((b + EPSILON).floor());
            }
        }

        self.variables
            .iter()
            .zip(lower.iter().zip(&upper))
            .find(|(_, (lo, hi))| lo > hi)
            .map(|(v, _)| v)
    }

    pub fn is_trivially_infeasible(&self) -> bool {
        self.empty_variable_range().is_some()
    }

    /// Map solver values back onto categories and shifts
    pub fn to_allocation(&self, values: &[i64]) -> StaffAllocation {
        let mut allocation = StaffAllocation::new();
        for (variable, value) in self.variables.iter().zip(values) {
            allocation.set(variable.category, variable.shift, (*value).max(0) as u32);
        }
        allocation
    }
}

/// Weekend coverage heuristic: when current total staffing exceeds
/// `trigger_total`, Morning+Evening for nurses and doctors must stay at or
/// above `coverage_fraction` of the current combined count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekendRule {
    pub trigger_total: u32,
    pub coverage_fraction: f64,
}

impl Default for WeekendRule {
    fn default() -> Self {
        Self {
            trigger_total: 80,
            coverage_fraction: 0.9,
        }
    }
}

/// Staffing policy numbers used when building a problem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationPolicy {
    pub min_per_cell: u32,
    pub max_per_cell: u32,
    /// Patients per nurse by shift
    pub nurse_ratios: BTreeMap<Shift, u32>,
    pub min_nurses_per_shift: u32,
    pub high_admissions_threshold: f64,
    pub high_admission_doctors: BTreeMap<Shift, u32>,
    pub low_admissions_threshold: f64,
    pub low_admission_doctors: BTreeMap<Shift, u32>,
    pub high_activity_threshold: f64,
    pub high_activity_support: BTreeMap<Shift, u32>,
    pub stability_fraction: f64,
    pub min_stability_change: u32,
    pub min_night_doctors: u32,
    pub min_night_nurses: u32,
    pub weekend_rule: Option<WeekendRule>,
}

impl Default for AllocationPolicy {
    fn default() -> Self {
        use Shift::*;
        Self {
            min_per_cell: 1,
            max_per_cell: 50,
            nurse_ratios: BTreeMap::from([(Morning, 6), (Evening, 8), (Night, 12)]),
            min_nurses_per_shift: 3,
            high_admissions_threshold: 12.0,
            high_admission_doctors: BTreeMap::from([(Morning, 12), (Evening, 10)]),
            low_admissions_threshold: 5.0,
            low_admission_doctors: BTreeMap::from([(Morning, 8), (Evening, 6)]),
            high_activity_threshold: 200.0,
            high_activity_support: BTreeMap::from([(Morning, 8), (Evening, 8)]),
            stability_fraction: 0.3,
            min_stability_change: 2,
            min_night_doctors: 5,
            min_night_nurses: 10,
            weekend_rule: Some(WeekendRule::default()),
        }
    }
}

/// Builds an [`AllocationProblem`] from request inputs
#[derive(Debug, Clone, Default)]
pub struct AllocationModelBuilder {
    policy: AllocationPolicy,
    costs: CostTable,
}

impl AllocationModelBuilder {
    pub fn new(policy: AllocationPolicy, costs: CostTable) -> Self {
        Self { policy, costs }
    }

    pub fn policy(&self) -> &AllocationPolicy {
        &self.policy
    }

    pub fn costs(&self) -> &CostTable {
        &self.costs
    }

    pub fn build(
        &self,
        current: &StaffAllocation,
        demand: &PredictedDemand,
        constraints: Option<&AllocationConstraints>,
    ) -> Result<AllocationProblem> {
        validate_request(current, demand, constraints)?;

        let mut problem = AllocationProblem::default();
        for category in StaffCategory::ALL {
            for shift in Shift::ALL {
                problem.variables.push(Variable {
                    category,
                    shift,
                    lower: self.policy.min_per_cell as i64,
                    upper: self.policy.max_per_cell as i64,
                    cost: self.costs.rate(category, shift),
                });
            }
        }

        self.add_demand_constraints(&mut problem, demand);
        self.add_operational_constraints(&mut problem, current);
        if let Some(constraints) = constraints {
            self.add_custom_constraints(&mut problem, constraints);
        }
        Ok(problem)
    }

    fn add_demand_constraints(&self, problem: &mut AllocationProblem, demand: &PredictedDemand) {
        let policy = &self.policy;

        if let Some(beds) = demand.bed_occupancy {
            for (shift, ratio) in &policy.nurse_ratios {
                let needed = (beds / (*ratio).max(1) as f64).floor() as u32;
                let minimum = policy.min_nurses_per_shift.max(needed);
                push_min(
                    problem,
                    StaffCategory::Nurses,
                    *shift,
                    minimum,
                    format!("Min_Nurses_{}", shift),
                );
            }
        }

        if let Some(admissions) = demand.admissions {
            let (prefix, minimums) = if admissions > policy.high_admissions_threshold {
                ("High_Admission_Doctors", Some(&policy.high_admission_doctors))
            } else if admissions < policy.low_admissions_threshold {
                ("Low_Admission_Doctors", Some(&policy.low_admission_doctors))
            } else {
                ("", None)
            };
            for (shift, minimum) in minimums.into_iter().flatten() {
                push_min(
                    problem,
                    StaffCategory::Doctors,
                    *shift,
                    *minimum,
                    format!("{}_{}", prefix, shift),
                );
            }
        }

        let activity =
            demand.admissions.unwrap_or(0.0) + demand.bed_occupancy.unwrap_or(0.0);
        if activity > policy.high_activity_threshold {
            for (shift, minimum) in &policy.high_activity_support {
                push_min(
                    problem,
                    StaffCategory::SupportStaff,
                    *shift,
                    *minimum,
                    format!("High_Activity_Support_{}", shift),
                );
            }
        }
    }

    fn add_operational_constraints(
        &self,
        problem: &mut AllocationProblem,
        current: &StaffAllocation,
    ) {
        let policy = &self.policy;

        for (category, shift, count) in current.cells() {
            let Some(index) = problem.index_of(category, shift) else {
                continue;
            };
            let max_change = policy
                .min_stability_change
                .max((count as f64 * policy.stability_fraction).floor() as u32)
                as f64;
            let count = count as f64;
            problem.constraints.push(Constraint::new(
                format!("Min_Change_{}_{}", category, shift),
                LinearExpr::term(index, 1.0),
                Relation::GreaterEq,
                count - max_change,
            ));
            problem.constraints.push(Constraint::new(
                format!("Max_Change_{}_{}", category, shift),
                LinearExpr::term(index, 1.0),
                Relation::LessEq,
                count + max_change,
            ));
        }

        push_min(
            problem,
            StaffCategory::Doctors,
            Shift::Night,
            policy.min_night_doctors,
            "Min_Night_Doctors".into(),
        );
        push_min(
            problem,
            StaffCategory::Nurses,
            Shift::Night,
            policy.min_night_nurses,
            "Min_Night_Nurses".into(),
        );

        if let Some(rule) = &policy.weekend_rule {
            if current.total() > rule.trigger_total {
                for category in [StaffCategory::Nurses, StaffCategory::Doctors] {
                    let shifts = [Shift::Morning, Shift::Evening];
                    let combined: u32 = shifts
                        .iter()
                        .map(|s| current.get(category, *s).unwrap_or(DEFAULT_CURRENT_COUNT))
                        .sum();
                    let indices = shifts.iter().filter_map(|s| problem.index_of(category, *s));
                    let expr = LinearExpr::sum(indices.collect::<Vec<_>>());
                    problem.constraints.push(Constraint::new(
                        format!("Weekend_{}", category),
                        expr,
                        Relation::GreaterEq,
                        (combined as f64 * rule.coverage_fraction).floor(),
                    ));
                }
            }
        }
    }

    fn add_custom_constraints(
        &self,
        problem: &mut AllocationProblem,
        constraints: &AllocationConstraints,
    ) {
        if let Some(budget) = constraints.max_budget {
            let expr = LinearExpr {
                terms: problem
                    .variables
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (i, v.cost))
                    .collect(),
            };
            problem
                .constraints
                .push(Constraint::new("Budget_Constraint", expr, Relation::LessEq, budget));
        }

        let all = 0..problem.variables.len();
        if let Some(minimum) = constraints.min_total_staff {
            problem.constraints.push(Constraint::new(
                "Min_Total_Staff",
                LinearExpr::sum(all.clone()),
                Relation::GreaterEq,
                minimum as f64,
            ));
        }
        if let Some(maximum) = constraints.max_total_staff {
            problem.constraints.push(Constraint::new(
                "Max_Total_Staff",
                LinearExpr::sum(all),
                Relation::LessEq,
                maximum as f64,
            ));
        }
    }
}

fn push_min(
    problem: &mut AllocationProblem,
    category: StaffCategory,
    shift: Shift,
    minimum: u32,
    label: String,
) {
    if let Some(index) = problem.index_of(category, shift) {
        problem.constraints.push(Constraint::new(
            label,
            LinearExpr::term(index, 1.0),
            Relation::GreaterEq,
            minimum as f64,
        ));
    }
}

/// Reject malformed requests before any problem is built
pub fn validate_request(
    current: &StaffAllocation,
    demand: &PredictedDemand,
    constraints: Option<&AllocationConstraints>,
) -> Result<()> {
    for (category, shift, count) in current.cells() {
        if count > MAX_CURRENT_COUNT {
            return Err(Error::Validation(format!(
                "current staff {} {} is {}, limit is {}",
                category, shift, count, MAX_CURRENT_COUNT
            )));
        }
    }

    let fields = [
        ("admissions", demand.admissions),
        ("bed_occupancy", demand.bed_occupancy),
        ("oxygen_level", demand.oxygen_level),
    ];
    for (name, value) in fields {
        if let Some(v) = value {
            if !v.is_finite() || v < 0.0 {
                return Err(Error::Validation(format!(
                    "predicted {} must be a non-negative number, got {}",
                    name, v
                )));
            }
        }
    }

    if let Some(constraints) = constraints {
        if let Some(budget) = constraints.max_budget {
            if !budget.is_finite() || budget <= 0.0 {
                return Err(Error::Validation(format!(
                    "max_budget must be positive, got {}",
                    budget
                )));
            }
        }
        if let (Some(min), Some(max)) = (constraints.min_total_staff, constraints.max_total_staff) {
            if min > max {
                return Err(Error::Validation(format!(
                    "min_total_staff {} exceeds max_total_staff {}",
                    min, max
                )));
            }
        }
    }
    Ok(())
}

//! Offline staff allocation

use anyhow::Result;
use carecast_lib::{
    AllocationConstraints, AllocationResult, PredictedDemand, Shift, SolverStatus,
    StaffAllocation, StaffCategory, StaffOptimizer,
};
use colored::Colorize;
use serde::Deserialize;
use tabled::Tabled;

use super::read_json_arg;
use crate::output::{self, color_status, format_change, format_currency, OutputFormat};

/// Same body as the agent's `POST /v1/optimize`
#[derive(Debug, Deserialize)]
pub struct OptimizeInput {
    pub current_staff: StaffAllocation,
    #[serde(default)]
    pub predicted_demand: PredictedDemand,
    #[serde(default)]
    pub constraints: Option<AllocationConstraints>,
}

#[derive(Tabled)]
struct AllocationRow {
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Shift")]
    shift: String,
    #[tabled(rename = "Current")]
    current: u32,
    #[tabled(rename = "Proposed")]
    proposed: u32,
    #[tabled(rename = "Change")]
    change: String,
    #[tabled(rename = "Cost")]
    cost: String,
}

pub fn run(input: &str, format: OutputFormat) -> Result<()> {
    let input: OptimizeInput = read_json_arg(input)?;
    let result = StaffOptimizer::default().optimize(
        &input.current_staff,
        &input.predicted_demand,
        input.constraints.as_ref(),
    )?;

    match format {
        OutputFormat::Json => output::print_json(&result)?,
        OutputFormat::Table => print_result(&input.current_staff, &result),
    }
    Ok(())
}

fn print_result(current: &StaffAllocation, result: &AllocationResult) {
    output::print_section("Staff Allocation");
    println!(
        "Status:                 {}",
        color_status(result.solver_status.as_str())
    );
    if let Some(reason) = &result.fallback_reason {
        output::print_warning(&format!("Heuristic used: {}", reason));
    }
    println!();

    let mut rows = Vec::new();
    for category in StaffCategory::ALL {
        for shift in Shift::ALL {
            let before = current.get(category, shift).unwrap_or(0);
            let after = result.allocation.get(category, shift).unwrap_or(0);
            let cost = result
                .cost_breakdown
                .get(&category)
                .and_then(|c| c.shifts.get(&shift))
                .map(|s| s.cost)
                .unwrap_or(0.0);
            rows.push(AllocationRow {
                category: category.to_string(),
                shift: shift.to_string(),
                current: before,
                proposed: after,
                change: format_change(before, after),
                cost: format_currency(cost),
            });
        }
    }
    output::print_table(rows);
    println!();

    let metrics = &result.efficiency_metrics;
    println!("Total staff:            {}", metrics.total_staff);
    println!(
        "Average cost per staff: {}",
        format_currency(metrics.average_cost_per_staff)
    );
    let total = format_currency(result.total_cost);
    match result.solver_status {
        SolverStatus::Optimal => println!("{} {}", "Total cost:".bold(), total.green().bold()),
        SolverStatus::HeuristicFallback => {
            println!("{} {}", "Total cost:".bold(), total.yellow().bold())
        }
    }
    println!();

    println!("{}", "Recommendations".bold());
    println!("{}", "-".repeat(50));
    for line in &result.recommendations {
        output::print_info(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_defaults() {
        let input: OptimizeInput =
            serde_json::from_str(r#"{"current_staff": {"Nurses": {"Morning": 20}}}"#).unwrap();
        assert!(input.constraints.is_none());
        assert_eq!(input.predicted_demand, PredictedDemand::default());
    }
}

use std::io::IsTerminal;

use super::metrics::{FEASIBILITY_TOL, FeasibilityReport};
use super::model::Relation;
use super::problem::AllocationProblem;
use super::strategies::{OutcomeDetail, StrategyOutcome};

const PROBLEM_PREVIEW_ROWS: usize = 12;
const FRONTIER_PREVIEW_ROWS: usize = 10;
const NAME_MAX_CHARS: usize = 32;
const ANSI_RESET: &str = "\x1b[0m";
const ANSI_RED: &str = "\x1b[31m";
const ANSI_GREEN: &str = "\x1b[32m";
const ANSI_CYAN: &str = "\x1b[36m";
const ANSI_GRAY: &str = "\x1b[90m";

#[derive(Debug, Clone, Copy)]
pub struct TraceConfig {
    pub ansi_enabled: bool,
    /// Print every problem row and frontier sample instead of a preview.
    pub full_detail: bool,
}

impl TraceConfig {
    pub fn from_env() -> Self {
        Self {
            ansi_enabled: ansi_enabled(),
            full_detail: env_flag_enabled("ALLOC_TRACE_FULL"),
        }
    }
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

fn ansi_enabled() -> bool {
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    if std::env::var("TERM").ok().as_deref() == Some("dumb") {
        return false;
    }
    std::io::stdout().is_terminal()
}

fn env_flag_enabled(name: &str) -> bool {
    std::env::var(name)
        .ok()
        .map(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(false)
}

fn colorize(ansi: bool, color: &str, text: &str) -> String {
    if ansi {
        format!("{color}{text}{ANSI_RESET}")
    } else {
        text.to_string()
    }
}

fn display_name(names: &[String], idx: usize, fallback: &str) -> String {
    let name = names
        .get(idx)
        .cloned()
        .unwrap_or_else(|| format!("{fallback} {idx}"));
    if name.chars().count() <= NAME_MAX_CHARS {
        return name;
    }
    let mut short: String = name.chars().take(NAME_MAX_CHARS - 3).collect();
    short.push_str("...");
    short
}

fn optional(value: Option<f64>, precision: usize) -> String {
    value
        .map(|v| format!("{v:.precision$}"))
        .unwrap_or_else(|| "n/a".to_string())
}

/// Budget relation the strategy solved under.
pub fn budget_relation(strategy: &str) -> Relation {
    match strategy {
        "biobjective" | "scaled_target" | "lexicographic" | "max_effect" => Relation::AtMost,
        _ => Relation::Equal,
    }
}

pub fn feasibility_of(problem: &AllocationProblem, outcome: &StrategyOutcome) -> FeasibilityReport {
    FeasibilityReport::check(
        &outcome.allocation,
        problem.budget(),
        budget_relation(outcome.strategy),
        problem.floors(),
        problem.caps(),
        FEASIBILITY_TOL,
    )
}

pub fn print_allocation_summary(
    problem: &AllocationProblem,
    outcome: &StrategyOutcome,
    category_names: &[String],
    problem_names: &[String],
    config: TraceConfig,
) {
    let ansi = config.ansi_enabled;
    let label = outcome.strategy;
    let feasibility = feasibility_of(problem, outcome);
    let verdict = if feasibility.is_satisfied() {
        colorize(ansi, ANSI_GREEN, "feasible")
    } else {
        colorize(ansi, ANSI_RED, "VIOLATED")
    };

    println!(
        "[alloc][{}] status={} used={:.2}/{:.2} ({})",
        label,
        outcome.status,
        feasibility.used_budget,
        problem.budget(),
        verdict
    );
    if !feasibility.floors_ok || !feasibility.caps_ok {
        println!(
            "[alloc][{}] max floor violation={:.3e} max cap violation={:.3e}",
            label, feasibility.max_floor_violation, feasibility.max_cap_violation
        );
    }

    println!("[alloc][{}] categories:", label);
    let floors = problem.floors();
    let caps = problem.upper_bounds();
    for (j, amount) in outcome.allocation.iter().enumerate() {
        let cap = if caps[j].is_finite() {
            format!("{:.2}", caps[j])
        } else {
            "-".to_string()
        };
        let at_floor = (amount - floors[j]).abs() <= FEASIBILITY_TOL * (1.0 + floors[j]);
        let marker = if at_floor {
            colorize(ansi, ANSI_GRAY, "floor")
        } else {
            String::new()
        };
        println!(
            "  {:<width$} {:>12.2}  floor={:>10.2} cap={:>10} {}",
            display_name(category_names, j, "category"),
            amount,
            floors[j],
            cap,
            marker,
            width = NAME_MAX_CHARS
        );
    }

    let metrics = &outcome.metrics;
    println!(
        "[alloc][{}] mae={:.4} rmse={:.4} max={:.4} sae={:.4} mae_p={:.4} rmse_p={:.4} r2={}",
        label,
        metrics.mae,
        metrics.rmse,
        metrics.max_error,
        metrics.sae,
        metrics.mae_p,
        metrics.rmse_p,
        optional(metrics.r2, 4)
    );

    let rows = metrics.residuals.len();
    let shown = if config.full_detail {
        rows
    } else {
        rows.min(PROBLEM_PREVIEW_ROWS)
    };
    println!("[alloc][{}] problems (target -> covered):", label);
    let target = problem.target();
    for i in 0..shown {
        let residual = metrics.residuals[i];
        let color = if residual >= 0.0 { ANSI_CYAN } else { ANSI_RED };
        println!(
            "  {:<width$} {:>10.2} -> {:>10.2} ({}%)",
            display_name(problem_names, i, "problem"),
            target[i],
            target[i] + residual,
            colorize(
                ansi,
                color,
                &optional(metrics.percent_errors[i].map(|p| p.abs()), 2)
            ),
            width = NAME_MAX_CHARS
        );
    }
    if shown < rows {
        println!(
            "  ... {} more (set ALLOC_TRACE_FULL=1 to show all)",
            rows - shown
        );
    }

    print_detail(label, &outcome.detail, config);
}

fn print_detail(label: &str, detail: &OutcomeDetail, config: TraceConfig) {
    match detail {
        OutcomeDetail::L1 { errors } => {
            let total: f64 = errors.iter().sum();
            println!("[alloc][{}] epigraph total={:.4}", label, total);
        }
        OutcomeDetail::L2 { objective } => {
            println!("[alloc][{}] objective={:.6}", label, objective);
        }
        OutcomeDetail::Biobjective {
            lambda,
            coverage_error,
            used,
        } => {
            println!(
                "[alloc][{}] lambda={} coverage_error={:.4} used={:.2}",
                label, lambda, coverage_error, used
            );
        }
        OutcomeDetail::Lexicographic(summary) => {
            println!(
                "[alloc][{}] phase 1: cov={:.4} used={:.2}",
                label, summary.cov1, summary.used1
            );
            println!(
                "[alloc][{}] phase 2: cov={:.4} used={:.2}",
                label, summary.cov2, summary.used2
            );
        }
        OutcomeDetail::Pareto(frontier) => {
            let knee_alpha = frontier.knee().map(|p| p.alpha);
            let shown = if config.full_detail {
                frontier.len()
            } else {
                frontier.len().min(FRONTIER_PREVIEW_ROWS)
            };
            println!("[alloc][{}] frontier ({} samples):", label, frontier.len());
            for point in frontier.points.iter().take(shown) {
                let knee = if Some(point.alpha) == knee_alpha {
                    colorize(config.ansi_enabled, ANSI_GREEN, "knee")
                } else {
                    String::new()
                };
                println!(
                    "  alpha={:.3} f1={:>14.4} f2={:>14.4} rmse={:>10.4} {}",
                    point.alpha, point.f1, point.f2, point.metrics.rmse, knee
                );
            }
        }
        OutcomeDetail::ScaledTarget {
            lambda,
            scale,
            min_scale,
            scaled_error,
            used,
        } => {
            println!(
                "[alloc][{}] lambda={} k={:.6} (min {:.6}) scaled_error={:.4} used={:.2}",
                label, lambda, scale, min_scale, scaled_error, used
            );
        }
        OutcomeDetail::MaxEffect(summary) => {
            println!(
                "[alloc][{}] total effect={:.4} efficiency={:.4} vs floors={}% vs even split={}",
                label,
                summary.total_effect,
                summary.efficiency,
                optional(summary.improvement_vs_baseline.map(|r| 100.0 * r), 2),
                optional(summary.uniform_comparison, 4)
            );
            println!(
                "[alloc][{}] min effect={:.4} min relative={} covered problems={:.1}%",
                label,
                summary.min_effect,
                optional(summary.min_effect_relative, 4),
                100.0 * summary.problem_coverage
            );
        }
        OutcomeDetail::Discrete {
            grains,
            grain_size,
            counts,
            objective,
        } => {
            println!(
                "[alloc][{}] grains={} grain size={:.4} objective={:.4} counts={:?}",
                label, grains, grain_size, objective, counts
            );
        }
    }
}

use serde::Serialize;

use super::error::{AllocError, LexPhase};
use super::formulation::{FractionUsage, FractionalFormulation, solve_formulation};
use super::model::{SolveStatus, SolverBackend};
use super::problem::AllocationProblem;
use super::strategies::{OutcomeDetail, StrategyOutcome};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LexicographicParams {
    /// Allowed worsening of the phase-1 coverage error, in squared target units.
    pub epsilon: f64,
    pub bisection_iters: usize,
}

impl Default for LexicographicParams {
    fn default() -> Self {
        Self {
            epsilon: 1e-3,
            bisection_iters: 48,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LexicographicSummary {
    pub cov1: f64,
    pub used1: f64,
    pub cov2: f64,
    pub used2: f64,
    pub phase_one_allocation: Vec<f64>,
}

fn coverage_error(problem: &AllocationProblem, allocation: &[f64]) -> f64 {
    problem
        .coverage()
        .residuals(allocation, problem.target())
        .iter()
        .map(|e| e * e)
        .sum()
}

fn phase_failure(phase: LexPhase, err: AllocError) -> AllocError {
    match err.status() {
        Some(status) => AllocError::LexicographicPhase { phase, status },
        None => err,
    }
}

/// Coverage first, then utilization: spend as much of the budget as possible
/// without worsening the best coverage error by more than `epsilon`.
///
/// The best coverage error at a fixed fractional spend `s` is convex in `s` and
/// nondecreasing past the phase-1 spend, so phase 2 bisects on `s` with the
/// phase-1 point as the feasible lower end.
pub fn allocate_lexicographic(
    problem: &AllocationProblem,
    params: LexicographicParams,
    backend: &dyn SolverBackend,
) -> Result<StrategyOutcome, AllocError> {
    if params.epsilon.is_nan() {
        return Err(AllocError::input("epsilon must be a number"));
    }

    let phase_one = FractionalFormulation {
        lambda: 0.0,
        usage: FractionUsage::UpTo,
    };
    let (first, first_solution) = solve_formulation(problem, &phase_one, backend)
        .map_err(|err| phase_failure(LexPhase::One, err))?;
    let cov1 = coverage_error(problem, &first);
    let used1: f64 = first.iter().sum();

    if params.epsilon < 0.0 {
        return Err(AllocError::LexicographicPhase {
            phase: LexPhase::Two,
            status: SolveStatus::Infeasible,
        });
    }
    let threshold = cov1 + params.epsilon;

    let budget = problem.budget();
    let (_, upper) = FractionalFormulation::fraction_bounds(problem);
    let ceiling = upper.iter().sum::<f64>().min(1.0);
    let mut low = (used1 / budget).min(ceiling);
    let mut high = ceiling;

    let mut best = first.clone();
    let mut best_cov = cov1;
    let mut status = first_solution.status;

    let sample_share = |share: f64| -> Result<(Vec<f64>, f64, SolveStatus), AllocError> {
        let formulation = FractionalFormulation {
            lambda: 0.0,
            usage: FractionUsage::Exactly(share),
        };
        let (allocation, solution) = solve_formulation(problem, &formulation, backend)
            .map_err(|err| phase_failure(LexPhase::Two, err))?;
        let cov = coverage_error(problem, &allocation);
        Ok((allocation, cov, solution.status))
    };

    if high > low {
        let (allocation, cov, sample_status) = sample_share(high)?;
        if cov <= threshold {
            best = allocation;
            best_cov = cov;
            status = sample_status;
            low = high;
        }
    }

    let mut iterations = 0;
    while high - low > f64::EPSILON * (1.0 + high) && iterations < params.bisection_iters {
        let mid = 0.5 * (low + high);
        let (allocation, cov, sample_status) = sample_share(mid)?;
        if cov <= threshold {
            low = mid;
            best = allocation;
            best_cov = cov;
            status = sample_status;
        } else {
            high = mid;
        }
        iterations += 1;
    }

    let used2: f64 = best.iter().sum();
    tracing::debug!(cov1, used1, cov2 = best_cov, used2, iterations, "lexicographic phases done");

    let summary = LexicographicSummary {
        cov1,
        used1,
        cov2: best_cov,
        used2,
        phase_one_allocation: first,
    };
    Ok(StrategyOutcome::scored(
        "lexicographic",
        problem,
        best,
        status,
        OutcomeDetail::Lexicographic(summary),
    ))
}

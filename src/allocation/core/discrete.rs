use serde::Serialize;

use super::error::AllocError;
use super::metrics::MetricsReport;
use super::model::SolveStatus;
use super::problem::{AllocationProblem, CoverageMatrix, TargetSource};
use super::strategies::{OutcomeDetail, StrategyOutcome};

/// Grain counts within this relative distance of an integer snap to it,
/// so `200 / 10` stays 20 grains.
const GRAIN_SNAP_TOL: f64 = 1e-9;
const NO_PARENT: usize = usize::MAX;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiscreteParams {
    pub grains: usize,
}

impl Default for DiscreteParams {
    fn default() -> Self {
        Self { grains: 100 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscreteOutcome {
    pub allocation: Vec<f64>,
    pub counts: Vec<usize>,
    pub grain_size: f64,
    /// `sum_j (k_j * grain - (A' y)_j)^2` at the chosen counts.
    pub objective: f64,
    pub metrics: MetricsReport,
}

fn snapped(ratio: f64) -> Option<f64> {
    let nearest = ratio.round();
    ((ratio - nearest).abs() <= GRAIN_SNAP_TOL * nearest.abs().max(1.0)).then_some(nearest)
}

fn min_grains(floor: f64, grain: f64) -> usize {
    let ratio = floor / grain;
    snapped(ratio).unwrap_or_else(|| ratio.ceil()).max(0.0) as usize
}

fn max_grains(cap: f64, grain: f64, grains: usize) -> usize {
    if !cap.is_finite() {
        return grains;
    }
    let ratio = cap / grain;
    let whole = snapped(ratio).unwrap_or_else(|| ratio.floor()).max(0.0);
    if whole >= grains as f64 {
        grains
    } else {
        whole as usize
    }
}

/// Exact DP over grain counts: `dp[j][k]` is the cheapest way to hand `k`
/// grains to the first `j` categories.
fn grain_table(
    ideal: &[f64],
    kmin: &[usize],
    kmax: &[usize],
    grains: usize,
    grain: f64,
) -> Option<(Vec<usize>, f64)> {
    let m = ideal.len();
    let width = grains + 1;
    let mut cost = vec![f64::INFINITY; (m + 1) * width];
    let mut parent = vec![NO_PARENT; (m + 1) * width];
    cost[0] = 0.0;

    for j in 1..=m {
        let (prev_row, row) = cost.split_at_mut(j * width);
        let prev_row = &prev_row[(j - 1) * width..];
        let row = &mut row[..width];
        let parents = &mut parent[j * width..(j + 1) * width];
        for k in 0..=grains {
            let upper = k.min(kmax[j - 1]);
            if kmin[j - 1] > upper {
                continue;
            }
            for q in kmin[j - 1]..=upper {
                let prev = prev_row[k - q];
                if !prev.is_finite() {
                    continue;
                }
                let miss = q as f64 * grain - ideal[j - 1];
                let candidate = prev + miss * miss;
                if candidate < row[k] {
                    row[k] = candidate;
                    parents[k] = q;
                }
            }
        }
    }

    let total = cost[m * width + grains];
    if !total.is_finite() {
        return None;
    }

    let mut counts = vec![0_usize; m];
    let mut k = grains;
    for j in (1..=m).rev() {
        let q = parent[j * width + k];
        counts[j - 1] = q;
        k -= q;
    }
    Some((counts, total))
}

/// Approximate the coverage allocation on a grid of `grains` equal budget
/// units, tracking `A' y` per category. Caps, when set, bound the grain counts.
pub fn discretize(problem: &AllocationProblem, grains: usize) -> Result<DiscreteOutcome, AllocError> {
    if grains == 0 {
        return Err(AllocError::input("grain count must be at least 1"));
    }
    let budget = problem.budget();
    let grain = budget / grains as f64;
    let ideal = problem.coverage().transpose_apply(problem.target());

    let kmin: Vec<usize> = problem
        .floors()
        .iter()
        .map(|floor| min_grains(*floor, grain))
        .collect();
    let kmax: Vec<usize> = problem
        .upper_bounds()
        .iter()
        .map(|cap| max_grains(*cap, grain, grains))
        .collect();

    let required: usize = kmin.iter().sum();
    let Some((counts, objective)) = grain_table(&ideal, &kmin, &kmax, grains, grain) else {
        return Err(AllocError::InfeasibleDiscretization { grains, required });
    };

    let allocation: Vec<f64> = counts.iter().map(|&k| k as f64 * grain).collect();
    let metrics = MetricsReport::compute(
        problem.coverage(),
        &allocation,
        problem.target(),
        problem.weights(),
    );
    tracing::debug!(grains, grain, objective, rmse = metrics.rmse, "grain table solved");

    Ok(DiscreteOutcome {
        allocation,
        counts,
        grain_size: grain,
        objective,
        metrics,
    })
}

/// Free-standing form: coverage, importance counts, budget, floors and grain count.
pub fn dp_allocate(
    coverage: &CoverageMatrix,
    importance: &[f64],
    budget: f64,
    floors: &[f64],
    grains: usize,
) -> Result<DiscreteOutcome, AllocError> {
    let problem = AllocationProblem::new(
        coverage.clone(),
        TargetSource::Counts(importance.to_vec()),
        budget,
        Some(floors.to_vec()),
    )?;
    discretize(&problem, grains)
}

pub fn allocate_discrete(
    problem: &AllocationProblem,
    params: DiscreteParams,
) -> Result<StrategyOutcome, AllocError> {
    let outcome = discretize(problem, params.grains)?;
    Ok(StrategyOutcome {
        strategy: "discrete",
        allocation: outcome.allocation,
        metrics: outcome.metrics,
        status: SolveStatus::Optimal,
        detail: OutcomeDetail::Discrete {
            grains: params.grains,
            grain_size: outcome.grain_size,
            counts: outcome.counts,
            objective: outcome.objective,
        },
    })
}

use serde::Serialize;

use super::discrete::{DiscreteParams, allocate_discrete};
use super::error::AllocError;
use super::formulation::{
    EffectFormulation, Formulation, FractionUsage, FractionalFormulation, L1Formulation,
    L2Formulation, Regularization, ScaledTargetFormulation, solve_formulation,
};
use super::lexicographic::{LexicographicParams, LexicographicSummary, allocate_lexicographic};
use super::metrics::MetricsReport;
use super::model::{SolveStatus, SolverBackend};
use super::pareto::{ParetoFrontier, ParetoParams, pareto_scan};
use super::problem::AllocationProblem;

/// Strategy-specific diagnostics carried next to the allocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutcomeDetail {
    L1 {
        /// Optimal epigraph values, one per problem.
        errors: Vec<f64>,
    },
    L2 {
        objective: f64,
    },
    Biobjective {
        lambda: f64,
        coverage_error: f64,
        used: f64,
    },
    ScaledTarget {
        lambda: f64,
        /// Fitted `k` in `A x ~ k c`.
        scale: f64,
        min_scale: f64,
        /// `||A x - k c||^2` at the solution.
        scaled_error: f64,
        used: f64,
    },
    Lexicographic(LexicographicSummary),
    Pareto(ParetoFrontier),
    MaxEffect(EffectSummary),
    Discrete {
        grains: usize,
        grain_size: f64,
        counts: Vec<usize>,
        objective: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyOutcome {
    pub strategy: &'static str,
    pub allocation: Vec<f64>,
    pub metrics: MetricsReport,
    pub status: SolveStatus,
    pub detail: OutcomeDetail,
}

impl StrategyOutcome {
    pub(crate) fn scored(
        strategy: &'static str,
        problem: &AllocationProblem,
        allocation: Vec<f64>,
        status: SolveStatus,
        detail: OutcomeDetail,
    ) -> Self {
        let metrics = MetricsReport::compute(
            problem.coverage(),
            &allocation,
            problem.target(),
            problem.weights(),
        );
        Self {
            strategy,
            allocation,
            metrics,
            status,
            detail,
        }
    }
}

/// Minimize `sum(p_i |(A x - y)_i|)` with `sum(x) == B`, `L <= x <= U`, as a linear program.
pub fn allocate_l1(
    problem: &AllocationProblem,
    backend: &dyn SolverBackend,
) -> Result<StrategyOutcome, AllocError> {
    let formulation = L1Formulation;
    let (allocation, solution) = solve_formulation(problem, &formulation, backend)?;
    let errors = solution.values[problem.categories()..].to_vec();
    Ok(StrategyOutcome::scored(
        formulation.label(),
        problem,
        allocation,
        solution.status,
        OutcomeDetail::L1 { errors },
    ))
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct L2Params {
    pub regularization: Regularization,
}

/// Minimize `sum(p_i (A x - y)_i^2)` plus regularization with `sum(x) == B`, `L <= x <= U`.
pub fn allocate_l2(
    problem: &AllocationProblem,
    params: &L2Params,
    backend: &dyn SolverBackend,
) -> Result<StrategyOutcome, AllocError> {
    match &params.regularization {
        Regularization::Ridge { mu } | Regularization::Prior { mu, .. }
            if !mu.is_finite() || *mu < 0.0 =>
        {
            return Err(AllocError::input(format!(
                "regularization weight must be finite and nonnegative, got {mu}"
            )));
        }
        Regularization::Prior {
            prior: Some(prior), ..
        } if prior.len() != problem.categories() => {
            return Err(AllocError::input(format!(
                "prior has {} entries, expected {}",
                prior.len(),
                problem.categories()
            )));
        }
        _ => {}
    }

    let formulation = L2Formulation {
        regularization: params.regularization.clone(),
    };
    let (allocation, solution) = solve_formulation(problem, &formulation, backend)?;
    Ok(StrategyOutcome::scored(
        formulation.label(),
        problem,
        allocation,
        solution.status,
        OutcomeDetail::L2 {
            objective: solution.objective,
        },
    ))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiobjectiveParams {
    pub lambda: f64,
}

impl Default for BiobjectiveParams {
    fn default() -> Self {
        Self { lambda: 1.0 }
    }
}

/// Weighted sum of coverage error and budget utilization in fractional space,
/// `sum(x_f) <= 1`. Larger `lambda` spends more of the budget.
pub fn allocate_biobjective(
    problem: &AllocationProblem,
    params: BiobjectiveParams,
    backend: &dyn SolverBackend,
) -> Result<StrategyOutcome, AllocError> {
    if !params.lambda.is_finite() || params.lambda < 0.0 {
        return Err(AllocError::input(format!(
            "lambda must be finite and nonnegative, got {}",
            params.lambda
        )));
    }
    let formulation = FractionalFormulation {
        lambda: params.lambda,
        usage: FractionUsage::UpTo,
    };
    let (allocation, solution) = solve_formulation(problem, &formulation, backend)?;
    let coverage_error = problem
        .coverage()
        .residuals(&allocation, problem.target())
        .iter()
        .map(|e| e * e)
        .sum();
    let used = allocation.iter().sum();
    Ok(StrategyOutcome::scored(
        "biobjective",
        problem,
        allocation,
        solution.status,
        OutcomeDetail::Biobjective {
            lambda: params.lambda,
            coverage_error,
            used,
        },
    ))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaledTargetParams {
    pub lambda: f64,
}

impl Default for ScaledTargetParams {
    fn default() -> Self {
        Self { lambda: 0.1 }
    }
}

/// Fit coverage to a multiple `k * c` of the raw importance with `k >= B / sum(c)`,
/// ridge-penalized, spending at most `B`.
pub fn allocate_scaled_target(
    problem: &AllocationProblem,
    params: ScaledTargetParams,
    backend: &dyn SolverBackend,
) -> Result<StrategyOutcome, AllocError> {
    if !params.lambda.is_finite() || params.lambda < 0.0 {
        return Err(AllocError::input(format!(
            "lambda must be finite and nonnegative, got {}",
            params.lambda
        )));
    }
    let formulation = ScaledTargetFormulation {
        lambda: params.lambda,
    };
    let (allocation, solution) = solve_formulation(problem, &formulation, backend)?;
    let scale = ScaledTargetFormulation::scale(problem, &solution.values);
    let desired: Vec<f64> = problem.importance().iter().map(|c| scale * c).collect();
    let scaled_error = problem
        .coverage()
        .residuals(&allocation, &desired)
        .iter()
        .map(|e| e * e)
        .sum();
    let used = allocation.iter().sum();
    Ok(StrategyOutcome::scored(
        formulation.label(),
        problem,
        allocation,
        solution.status,
        OutcomeDetail::ScaledTarget {
            lambda: params.lambda,
            scale,
            min_scale: ScaledTargetFormulation::min_scale(problem),
            scaled_error,
            used,
        },
    ))
}

/// Effect accounting for an allocation scored by the category weights `A' c`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectSummary {
    pub total_effect: f64,
    /// Effect per unit spent.
    pub efficiency: f64,
    /// Relative gain over spending only the floors; `None` when the floors have no effect.
    pub improvement_vs_baseline: Option<f64>,
    /// Smallest per-problem effect `(A x)_i`.
    pub min_effect: f64,
    /// Smallest `(A x)_i / c_i` over problems with positive importance.
    pub min_effect_relative: Option<f64>,
    /// Effect relative to an even `B / m` split; `None` when that split has no effect.
    pub uniform_comparison: Option<f64>,
    /// Share of problems with positive importance whose relative effect exceeds one half.
    pub problem_coverage: f64,
}

const COVERED_RELATIVE_EFFECT: f64 = 0.5;

impl EffectSummary {
    pub fn compute(problem: &AllocationProblem, allocation: &[f64]) -> Self {
        let weights = EffectFormulation::category_weights(problem);
        let effect_of = |x: &[f64]| -> f64 { weights.iter().zip(x).map(|(w, v)| w * v).sum() };

        let total_effect = effect_of(allocation);
        let used: f64 = allocation.iter().sum();
        let efficiency = if used > 0.0 { total_effect / used } else { 0.0 };

        let baseline = effect_of(problem.floors());
        let improvement_vs_baseline =
            (baseline > 0.0).then(|| (total_effect - baseline) / baseline);

        let m = problem.categories();
        let even = vec![problem.budget() / m as f64; m];
        let uniform_effect = effect_of(&even);
        let uniform_comparison = (uniform_effect > 0.0).then(|| total_effect / uniform_effect);

        let per_problem = problem.coverage().apply(allocation);
        let min_effect = per_problem.iter().copied().fold(f64::INFINITY, f64::min);
        let relative: Vec<f64> = per_problem
            .iter()
            .zip(problem.importance())
            .filter(|(_, c)| **c > 0.0)
            .map(|(e, c)| e / c)
            .collect();
        let min_effect_relative = relative.iter().copied().reduce(f64::min);
        let problem_coverage = if relative.is_empty() {
            0.0
        } else {
            relative
                .iter()
                .filter(|r| **r > COVERED_RELATIVE_EFFECT)
                .count() as f64
                / relative.len() as f64
        };

        Self {
            total_effect,
            efficiency,
            improvement_vs_baseline,
            min_effect,
            min_effect_relative,
            uniform_comparison,
            problem_coverage,
        }
    }
}

/// Maximize `(A' c) . x` under `sum(x) <= B`, `L <= x <= U`.
pub fn allocate_max_effect(
    problem: &AllocationProblem,
    backend: &dyn SolverBackend,
) -> Result<StrategyOutcome, AllocError> {
    let (allocation, solution) = solve_formulation(problem, &EffectFormulation, backend)?;
    let summary = EffectSummary::compute(problem, &allocation);
    Ok(StrategyOutcome::scored(
        "max_effect",
        problem,
        allocation,
        solution.status,
        OutcomeDetail::MaxEffect(summary),
    ))
}

/// Every allocation method behind one dispatch point.
#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    L1,
    L2(L2Params),
    Biobjective(BiobjectiveParams),
    ScaledTarget(ScaledTargetParams),
    Lexicographic(LexicographicParams),
    /// Reports the frontier's knee point as the allocation.
    ParetoScan(ParetoParams),
    MaxEffect,
    Discrete(DiscreteParams),
}

impl Strategy {
    pub fn label(&self) -> &'static str {
        match self {
            Self::L1 => "l1",
            Self::L2(_) => "l2",
            Self::Biobjective(_) => "biobjective",
            Self::ScaledTarget(_) => "scaled_target",
            Self::Lexicographic(_) => "lexicographic",
            Self::ParetoScan(_) => "pareto",
            Self::MaxEffect => "max_effect",
            Self::Discrete(_) => "discrete",
        }
    }

    pub fn run(
        &self,
        problem: &AllocationProblem,
        backend: &dyn SolverBackend,
    ) -> Result<StrategyOutcome, AllocError> {
        match self {
            Self::L1 => allocate_l1(problem, backend),
            Self::L2(params) => allocate_l2(problem, params, backend),
            Self::Biobjective(params) => allocate_biobjective(problem, *params, backend),
            Self::ScaledTarget(params) => allocate_scaled_target(problem, *params, backend),
            Self::Lexicographic(params) => allocate_lexicographic(problem, *params, backend),
            Self::ParetoScan(params) => {
                let frontier = pareto_scan(problem, *params, backend)?;
                let knee = frontier.knee().ok_or(AllocError::EmptyFrontier {
                    samples: params.points,
                })?;
                let allocation = knee.allocation.clone();
                Ok(StrategyOutcome::scored(
                    "pareto",
                    problem,
                    allocation,
                    SolveStatus::Optimal,
                    OutcomeDetail::Pareto(frontier),
                ))
            }
            Self::MaxEffect => allocate_max_effect(problem, backend),
            Self::Discrete(params) => allocate_discrete(problem, *params),
        }
    }
}

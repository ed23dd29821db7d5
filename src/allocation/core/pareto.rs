use serde::Serialize;

use super::error::AllocError;
use super::formulation::{ScalarizedFormulation, solve_formulation};
use super::metrics::MetricsReport;
use super::model::SolverBackend;
use super::problem::AllocationProblem;

const RANGE_FLOOR: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParetoParams {
    pub points: usize,
}

impl Default for ParetoParams {
    fn default() -> Self {
        Self { points: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrontierPoint {
    pub alpha: f64,
    /// `||A x - y||^2`
    pub f1: f64,
    /// `||x - w B||^2`
    pub f2: f64,
    pub allocation: Vec<f64>,
    pub metrics: MetricsReport,
}

/// Successful samples in alpha order. No dominance filtering is applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParetoFrontier {
    pub points: Vec<FrontierPoint>,
}

impl ParetoFrontier {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Sample closest to the utopia corner after scaling both objectives to
    /// `[0, 1]` over the frontier. A flat objective contributes nothing.
    pub fn knee(&self) -> Option<&FrontierPoint> {
        let (f1_min, f1_max) = bounds(self.points.iter().map(|p| p.f1))?;
        let (f2_min, f2_max) = bounds(self.points.iter().map(|p| p.f2))?;
        let scale = |value: f64, min: f64, max: f64| {
            let range = max - min;
            if range < RANGE_FLOOR {
                0.0
            } else {
                (value - min) / range
            }
        };

        self.points
            .iter()
            .map(|p| {
                let a = scale(p.f1, f1_min, f1_max);
                let b = scale(p.f2, f2_min, f2_max);
                (p, a * a + b * b)
            })
            .min_by(|(_, l), (_, r)| l.partial_cmp(r).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(p, _)| p)
    }
}

fn bounds(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    values.fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

/// Evenly spaced alphas over `[0, 1]`; a single sample sits at zero.
pub fn alpha_grid(count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![0.0],
        _ => (0..count)
            .map(|k| k as f64 / (count - 1) as f64)
            .collect(),
    }
}

/// Sample the coverage-error versus reference-distance trade-off with one
/// scalarized QP per alpha. Failed samples are logged and dropped.
pub fn pareto_scan(
    problem: &AllocationProblem,
    params: ParetoParams,
    backend: &dyn SolverBackend,
) -> Result<ParetoFrontier, AllocError> {
    if params.points == 0 {
        return Err(AllocError::input("pareto scan needs at least one sample"));
    }
    let reference = problem.reference_allocation();

    let mut points = Vec::with_capacity(params.points);
    for alpha in alpha_grid(params.points) {
        let formulation = ScalarizedFormulation { alpha };
        let allocation = match solve_formulation(problem, &formulation, backend) {
            Ok((allocation, _)) => allocation,
            Err(err) => {
                tracing::warn!(alpha, error = %err, "dropping pareto sample");
                continue;
            }
        };

        let metrics = MetricsReport::compute(
            problem.coverage(),
            &allocation,
            problem.target(),
            problem.weights(),
        );
        let f1 = metrics.coverage_error();
        let f2 = allocation
            .iter()
            .zip(reference.iter())
            .map(|(x, r)| (x - r) * (x - r))
            .sum();
        points.push(FrontierPoint {
            alpha,
            f1,
            f2,
            allocation,
            metrics,
        });
    }

    if points.is_empty() {
        return Err(AllocError::EmptyFrontier {
            samples: params.points,
        });
    }
    tracing::debug!(kept = points.len(), requested = params.points, "pareto scan done");
    Ok(ParetoFrontier { points })
}

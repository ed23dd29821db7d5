use serde::Serialize;

use super::model::Relation;
use super::problem::CoverageMatrix;

const ZERO_TOL: f64 = 1e-12;
pub(crate) const FEASIBILITY_TOL: f64 = 1e-5;

/// Error and fit statistics for one allocation. Undefined entries are `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsReport {
    pub mae: f64,
    pub mse: f64,
    pub rmse: f64,
    pub max_error: f64,
    /// Sum of absolute errors.
    pub sae: f64,
    pub mae_p: f64,
    pub rmse_p: f64,
    pub r2: Option<f64>,
    pub percent_errors: Vec<Option<f64>>,
    pub residuals: Vec<f64>,
    pub used_budget: f64,
}

impl MetricsReport {
    pub fn compute(
        coverage: &CoverageMatrix,
        allocation: &[f64],
        target: &[f64],
        weights: &[f64],
    ) -> Self {
        let residuals = coverage.residuals(allocation, target);
        Self::from_residuals(residuals, target, weights, allocation.iter().sum())
    }

    pub fn from_residuals(
        residuals: Vec<f64>,
        target: &[f64],
        weights: &[f64],
        used_budget: f64,
    ) -> Self {
        let n = residuals.len().max(1) as f64;
        let sae: f64 = residuals.iter().map(|e| e.abs()).sum();
        let sse: f64 = residuals.iter().map(|e| e * e).sum();
        let mse = sse / n;
        let max_error = residuals.iter().map(|e| e.abs()).fold(0.0, f64::max);
        let mae_p: f64 = residuals
            .iter()
            .zip(weights.iter())
            .map(|(e, p)| p * e.abs())
            .sum();
        let rmse_p = residuals
            .iter()
            .zip(weights.iter())
            .map(|(e, p)| p * e * e)
            .sum::<f64>()
            .sqrt();

        let mean = target.iter().sum::<f64>() / target.len().max(1) as f64;
        let ss_tot: f64 = target.iter().map(|y| (y - mean) * (y - mean)).sum();
        let r2 = (ss_tot > ZERO_TOL * (1.0 + mean * mean)).then(|| 1.0 - sse / ss_tot);

        let percent_errors = residuals
            .iter()
            .zip(target.iter())
            .map(|(e, y)| (y.abs() > ZERO_TOL).then(|| e / y * 100.0))
            .collect();

        Self {
            mae: sae / n,
            mse,
            rmse: mse.sqrt(),
            max_error,
            sae,
            mae_p,
            rmse_p,
            r2,
            percent_errors,
            residuals,
            used_budget,
        }
    }

    /// `||A x - y||^2`, the unweighted coverage error used by the fractional strategies.
    pub fn coverage_error(&self) -> f64 {
        self.residuals.iter().map(|e| e * e).sum()
    }
}

/// Constraint check of an allocation against its budget, floors and caps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeasibilityReport {
    pub used_budget: f64,
    pub budget_ok: bool,
    pub floors_ok: bool,
    pub caps_ok: bool,
    pub max_floor_violation: f64,
    pub max_cap_violation: f64,
}

impl FeasibilityReport {
    pub fn check(
        allocation: &[f64],
        budget: f64,
        relation: Relation,
        floors: &[f64],
        caps: Option<&[f64]>,
        tol: f64,
    ) -> Self {
        let used_budget: f64 = allocation.iter().sum();
        let budget_ok = match relation {
            Relation::Equal => (used_budget - budget).abs() <= tol * (1.0 + budget.abs()),
            Relation::AtMost => used_budget <= budget + tol * (1.0 + budget.abs()),
        };
        let max_floor_violation = allocation
            .iter()
            .zip(floors.iter())
            .map(|(x, lo)| (lo - x).max(0.0))
            .fold(0.0, f64::max);
        let max_cap_violation = caps
            .map(|caps| {
                allocation
                    .iter()
                    .zip(caps.iter())
                    .map(|(x, hi)| (x - hi).max(0.0))
                    .fold(0.0, f64::max)
            })
            .unwrap_or(0.0);

        Self {
            used_budget,
            budget_ok,
            floors_ok: max_floor_violation <= tol,
            caps_ok: max_cap_violation <= tol,
            max_floor_violation,
            max_cap_violation,
        }
    }

    pub fn is_satisfied(&self) -> bool {
        self.budget_ok && self.floors_ok && self.caps_ok
    }
}

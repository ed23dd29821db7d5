use std::fmt;

use serde::Serialize;

/// Terminal state reported by a solver backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveStatus {
    Optimal,
    OptimalInaccurate,
    Infeasible,
    Unbounded,
    SolverError,
    Cancelled,
}

impl SolveStatus {
    /// Whether the returned point may be used as an allocation.
    pub fn is_usable(self) -> bool {
        matches!(self, Self::Optimal | Self::OptimalInaccurate)
    }
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Optimal => "optimal",
            Self::OptimalInaccurate => "optimal_inaccurate",
            Self::Infeasible => "infeasible",
            Self::Unbounded => "unbounded",
            Self::SolverError => "solver_error",
            Self::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Equal,
    AtMost,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinearConstraint {
    pub coefficients: Vec<f64>,
    pub relation: Relation,
    pub rhs: f64,
}

impl LinearConstraint {
    /// `sum(x[range]) (== | <=) rhs` over a model with `width` columns.
    pub fn sum_over(
        width: usize,
        range: std::ops::Range<usize>,
        relation: Relation,
        rhs: f64,
    ) -> Self {
        let mut coefficients = vec![0.0_f64; width];
        for c in &mut coefficients[range] {
            *c = 1.0;
        }
        Self {
            coefficients,
            relation,
            rhs,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Objective {
    /// Minimize `c'x`.
    Linear { c: Vec<f64> },
    /// Minimize `0.5 x'Px + q'x + constant`. `p` is dense row-major, symmetric PSD.
    Quadratic {
        p: Vec<f64>,
        q: Vec<f64>,
        constant: f64,
    },
}

/// A solver-ready optimization model: objective, linear rows and per-column bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pub objective: Objective,
    pub constraints: Vec<LinearConstraint>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl Model {
    pub fn width(&self) -> usize {
        self.lower.len()
    }

    pub fn is_linear(&self) -> bool {
        matches!(self.objective, Objective::Linear { .. })
    }

    pub fn evaluate(&self, x: &[f64]) -> f64 {
        match &self.objective {
            Objective::Linear { c } => dot(c, x),
            Objective::Quadratic { p, q, constant } => {
                let k = x.len();
                let mut quad = 0.0_f64;
                for i in 0..k {
                    let row = &p[i * k..(i + 1) * k];
                    quad += x[i] * dot(row, x);
                }
                0.5 * quad + dot(q, x) + constant
            }
        }
    }

    /// Returns a shape complaint, or `None` when every vector agrees on the column count.
    pub(super) fn shape_error(&self) -> Option<String> {
        let k = self.width();
        if self.upper.len() != k {
            return Some(format!("upper has {} entries, expected {k}", self.upper.len()));
        }
        match &self.objective {
            Objective::Linear { c } if c.len() != k => {
                return Some(format!("linear cost has {} entries, expected {k}", c.len()));
            }
            Objective::Quadratic { p, q, .. } if p.len() != k * k || q.len() != k => {
                return Some(format!(
                    "quadratic objective is {}x{}, expected {k}x{k}",
                    q.len(),
                    p.len() / q.len().max(1)
                ));
            }
            _ => {}
        }
        for (idx, row) in self.constraints.iter().enumerate() {
            if row.coefficients.len() != k {
                return Some(format!(
                    "constraint {idx} has {} coefficients, expected {k}",
                    row.coefficients.len()
                ));
            }
            if !row.rhs.is_finite() {
                return Some(format!("constraint {idx} has a non-finite rhs"));
            }
        }
        if self.lower.iter().any(|lo| !lo.is_finite()) {
            return Some("lower bounds must be finite".to_string());
        }
        if self
            .lower
            .iter()
            .zip(self.upper.iter())
            .any(|(lo, hi)| hi.is_nan() || hi < lo)
        {
            return Some("upper bound below lower bound".to_string());
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub values: Vec<f64>,
    pub status: SolveStatus,
    pub objective: f64,
    pub iterations: usize,
}

impl Solution {
    pub(super) fn failed(status: SolveStatus, width: usize, iterations: usize) -> Self {
        Self {
            values: vec![f64::NAN; width],
            status,
            objective: f64::NAN,
            iterations,
        }
    }
}

/// Anything that can solve a [`Model`] synchronously.
pub trait SolverBackend {
    fn solve(&self, model: &Model) -> Solution;
}

pub(super) fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

use super::error::AllocError;
use super::model::{
    LinearConstraint, Model, Objective, Relation, Solution, SolveStatus, SolverBackend,
};
use super::problem::AllocationProblem;

/// One objective formulation of the allocation problem: it builds a solver
/// model and maps the solver's columns back to a category allocation.
pub trait Formulation {
    fn label(&self) -> &'static str;

    fn build_model(&self, problem: &AllocationProblem) -> Model;

    fn recover(&self, problem: &AllocationProblem, values: &[f64]) -> Vec<f64> {
        values[..problem.categories()].to_vec()
    }
}

/// Single solver call site. Any status other than optimal or optimal_inaccurate
/// becomes `OptimizationFailed` tagged with `context`.
pub fn solve_model(
    backend: &dyn SolverBackend,
    model: &Model,
    context: &'static str,
) -> Result<Solution, AllocError> {
    let solution = backend.solve(model);
    tracing::debug!(
        context,
        status = %solution.status,
        iterations = solution.iterations,
        objective = solution.objective,
        "model solved"
    );
    if !solution.status.is_usable() {
        return Err(AllocError::OptimizationFailed {
            status: solution.status,
            context,
        });
    }
    if solution.values.len() != model.width() || solution.values.iter().any(|v| !v.is_finite()) {
        tracing::warn!(
            context,
            returned = solution.values.len(),
            expected = model.width(),
            "backend reported a usable status with an unusable point"
        );
        return Err(AllocError::OptimizationFailed {
            status: SolveStatus::SolverError,
            context,
        });
    }
    Ok(solution)
}

/// Builds, solves and unpacks one formulation.
pub fn solve_formulation(
    problem: &AllocationProblem,
    formulation: &dyn Formulation,
    backend: &dyn SolverBackend,
) -> Result<(Vec<f64>, Solution), AllocError> {
    let model = formulation.build_model(problem);
    let solution = solve_model(backend, &model, formulation.label())?;
    let allocation = formulation.recover(problem, &solution.values);
    Ok((allocation, solution))
}

/// Quadratic pieces `0.5 x'Px + q'x + constant` accumulated term by term.
struct QuadraticTerms {
    width: usize,
    p: Vec<f64>,
    q: Vec<f64>,
    constant: f64,
}

impl QuadraticTerms {
    fn new(width: usize) -> Self {
        Self {
            width,
            p: vec![0.0; width * width],
            q: vec![0.0; width],
            constant: 0.0,
        }
    }

    /// Adds `weight * sum_i p_i (scale * A x - y)_i^2`.
    fn add_coverage(&mut self, problem: &AllocationProblem, weights: &[f64], scale: f64, weight: f64) {
        let m = self.width;
        let coverage = problem.coverage();
        let gram = coverage.weighted_gram(weights);
        for (dst, g) in self.p.iter_mut().zip(gram.iter()) {
            *dst += 2.0 * weight * scale * scale * g;
        }
        let weighted_target: Vec<f64> = problem
            .target()
            .iter()
            .zip(weights.iter())
            .map(|(y, p)| y * p)
            .collect();
        let folded = coverage.transpose_apply(&weighted_target);
        for j in 0..m {
            self.q[j] -= 2.0 * weight * scale * folded[j];
        }
        self.constant += weight
            * problem
                .target()
                .iter()
                .zip(weights.iter())
                .map(|(y, p)| p * y * y)
                .sum::<f64>();
    }

    /// Adds `weight * ||x - center||^2`.
    fn add_proximity(&mut self, center: &[f64], weight: f64) {
        let m = self.width;
        for j in 0..m {
            self.p[j * m + j] += 2.0 * weight;
            self.q[j] -= 2.0 * weight * center[j];
        }
        self.constant += weight * center.iter().map(|c| c * c).sum::<f64>();
    }

    fn add_linear(&mut self, coefficient: f64) {
        for q in &mut self.q {
            *q += coefficient;
        }
    }

    fn into_objective(self) -> Objective {
        Objective::Quadratic {
            p: self.p,
            q: self.q,
            constant: self.constant,
        }
    }
}

fn uniform(len: usize) -> Vec<f64> {
    vec![1.0; len]
}

/// Weighted least absolute deviations, linearized with one epigraph column per problem.
#[derive(Debug, Clone, Copy, Default)]
pub struct L1Formulation;

impl Formulation for L1Formulation {
    fn label(&self) -> &'static str {
        "l1"
    }

    fn build_model(&self, problem: &AllocationProblem) -> Model {
        let n = problem.problems();
        let m = problem.categories();
        let width = m + n;
        let coverage = problem.coverage();

        let mut c = vec![0.0_f64; width];
        c[m..].copy_from_slice(problem.weights());

        let mut constraints = Vec::with_capacity(2 * n + 1);
        constraints.push(LinearConstraint::sum_over(
            width,
            0..m,
            Relation::Equal,
            problem.budget(),
        ));
        for (i, &y) in problem.target().iter().enumerate() {
            // (A x)_i - eps_i <= y_i
            let mut over = vec![0.0_f64; width];
            over[..m].copy_from_slice(coverage.row(i));
            over[m + i] = -1.0;
            constraints.push(LinearConstraint {
                coefficients: over,
                relation: Relation::AtMost,
                rhs: y,
            });
            // -(A x)_i - eps_i <= -y_i
            let mut under: Vec<f64> = coverage.row(i).iter().map(|a| -a).collect();
            under.resize(width, 0.0);
            under[m + i] = -1.0;
            constraints.push(LinearConstraint {
                coefficients: under,
                relation: Relation::AtMost,
                rhs: -y,
            });
        }

        let mut lower = problem.floors().to_vec();
        lower.resize(width, 0.0);
        let mut upper = problem.upper_bounds();
        upper.resize(width, f64::INFINITY);

        Model {
            objective: Objective::Linear { c },
            constraints,
            lower,
            upper,
        }
    }
}

/// Ridge-style pull added to the L2 objective.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Regularization {
    #[default]
    None,
    /// `mu * ||x||^2`
    Ridge { mu: f64 },
    /// `mu * ||x - prior||^2`; `None` uses the reference shares times the budget.
    Prior { mu: f64, prior: Option<Vec<f64>> },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct L2Formulation {
    pub regularization: Regularization,
}

impl Formulation for L2Formulation {
    fn label(&self) -> &'static str {
        "l2"
    }

    fn build_model(&self, problem: &AllocationProblem) -> Model {
        let m = problem.categories();
        let mut terms = QuadraticTerms::new(m);
        terms.add_coverage(problem, problem.weights(), 1.0, 1.0);
        match &self.regularization {
            Regularization::None => {}
            Regularization::Ridge { mu } => terms.add_proximity(&vec![0.0; m], *mu),
            Regularization::Prior { mu, prior } => {
                let center = prior
                    .clone()
                    .unwrap_or_else(|| problem.reference_allocation());
                terms.add_proximity(&center, *mu);
            }
        }

        Model {
            objective: terms.into_objective(),
            constraints: vec![LinearConstraint::sum_over(
                m,
                0..m,
                Relation::Equal,
                problem.budget(),
            )],
            lower: problem.floors().to_vec(),
            upper: problem.upper_bounds(),
        }
    }
}

/// How the fractional budget row is closed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum FractionUsage {
    /// `sum(x_f) <= 1`
    UpTo,
    /// `sum(x_f) == share`
    Exactly(f64),
}

/// Coverage error in fractional space, minus `lambda * B * sum(x_f)`.
/// `lambda == 0` is the pure coverage objective.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct FractionalFormulation {
    pub(crate) lambda: f64,
    pub(crate) usage: FractionUsage,
}

impl FractionalFormulation {
    pub(crate) fn fraction_bounds(problem: &AllocationProblem) -> (Vec<f64>, Vec<f64>) {
        let b = problem.budget();
        let lower = problem.floors().iter().map(|l| l / b).collect();
        let upper = problem
            .upper_bounds()
            .iter()
            .map(|u| (u / b).min(1.0))
            .collect();
        (lower, upper)
    }
}

impl Formulation for FractionalFormulation {
    fn label(&self) -> &'static str {
        match self.usage {
            FractionUsage::UpTo if self.lambda == 0.0 => "coverage",
            FractionUsage::UpTo => "biobjective",
            FractionUsage::Exactly(_) => "coverage_at_usage",
        }
    }

    fn build_model(&self, problem: &AllocationProblem) -> Model {
        let m = problem.categories();
        let b = problem.budget();
        let mut terms = QuadraticTerms::new(m);
        terms.add_coverage(problem, &uniform(problem.problems()), b, 1.0);
        if self.lambda != 0.0 {
            terms.add_linear(-self.lambda * b);
        }
        let (lower, upper) = Self::fraction_bounds(problem);
        let row = match self.usage {
            FractionUsage::UpTo => LinearConstraint::sum_over(m, 0..m, Relation::AtMost, 1.0),
            FractionUsage::Exactly(share) => {
                LinearConstraint::sum_over(m, 0..m, Relation::Equal, share)
            }
        };

        Model {
            objective: terms.into_objective(),
            constraints: vec![row],
            lower,
            upper,
        }
    }

    fn recover(&self, problem: &AllocationProblem, values: &[f64]) -> Vec<f64> {
        values[..problem.categories()]
            .iter()
            .map(|x| x * problem.budget())
            .collect()
    }
}

/// `alpha * ||A x - y||^2 + (1 - alpha) * ||x - w B||^2` on the equality budget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ScalarizedFormulation {
    pub(crate) alpha: f64,
}

impl Formulation for ScalarizedFormulation {
    fn label(&self) -> &'static str {
        "pareto_sample"
    }

    fn build_model(&self, problem: &AllocationProblem) -> Model {
        let m = problem.categories();
        let mut terms = QuadraticTerms::new(m);
        if self.alpha > 0.0 {
            terms.add_coverage(problem, &uniform(problem.problems()), 1.0, self.alpha);
        }
        if self.alpha < 1.0 {
            terms.add_proximity(&problem.reference_allocation(), 1.0 - self.alpha);
        }

        Model {
            objective: terms.into_objective(),
            constraints: vec![LinearConstraint::sum_over(
                m,
                0..m,
                Relation::Equal,
                problem.budget(),
            )],
            lower: problem.floors().to_vec(),
            upper: problem.upper_bounds(),
        }
    }
}

/// Maximize `(A' c) . x` under `sum(x) <= B`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EffectFormulation;

impl EffectFormulation {
    pub fn category_weights(problem: &AllocationProblem) -> Vec<f64> {
        problem.coverage().transpose_apply(problem.importance())
    }
}

impl Formulation for EffectFormulation {
    fn label(&self) -> &'static str {
        "max_effect"
    }

    fn build_model(&self, problem: &AllocationProblem) -> Model {
        let m = problem.categories();
        let c = Self::category_weights(problem).iter().map(|w| -w).collect();
        Model {
            objective: Objective::Linear { c },
            constraints: vec![LinearConstraint::sum_over(
                m,
                0..m,
                Relation::AtMost,
                problem.budget(),
            )],
            lower: problem.floors().to_vec(),
            upper: problem.upper_bounds(),
        }
    }
}

/// `||A x - k c||^2 + lambda * ||x||^2` under `sum(x) <= B`, `L <= x <= U`,
/// `k >= B / sum(c)`. The target scale `k` is a free column, stored as
/// `t = k * ||c||` so its curvature matches the allocation columns.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaledTargetFormulation {
    pub lambda: f64,
}

impl ScaledTargetFormulation {
    fn importance_norm(problem: &AllocationProblem) -> f64 {
        problem.importance().iter().map(|c| c * c).sum::<f64>().sqrt()
    }

    /// Smallest admissible scale: the one that turns importance into exactly the budget.
    pub fn min_scale(problem: &AllocationProblem) -> f64 {
        problem.budget() / problem.importance().iter().sum::<f64>()
    }

    /// Scale `k` encoded in a solved column vector.
    pub fn scale(problem: &AllocationProblem, values: &[f64]) -> f64 {
        values[problem.categories()] / Self::importance_norm(problem)
    }
}

impl Formulation for ScaledTargetFormulation {
    fn label(&self) -> &'static str {
        "scaled_target"
    }

    fn build_model(&self, problem: &AllocationProblem) -> Model {
        let m = problem.categories();
        let width = m + 1;
        let norm = Self::importance_norm(problem);
        let unit: Vec<f64> = problem.importance().iter().map(|c| c / norm).collect();
        let gram = problem.coverage().weighted_gram(&uniform(problem.problems()));
        let cross = problem.coverage().transpose_apply(&unit);

        let mut p = vec![0.0_f64; width * width];
        for j in 0..m {
            for l in 0..m {
                p[j * width + l] = 2.0 * gram[j * m + l];
            }
            p[j * width + j] += 2.0 * self.lambda;
            p[j * width + m] = -2.0 * cross[j];
            p[m * width + j] = -2.0 * cross[j];
        }
        p[m * width + m] = 2.0;

        let mut lower = problem.floors().to_vec();
        lower.push(Self::min_scale(problem) * norm);
        let mut upper = problem.upper_bounds();
        upper.push(f64::INFINITY);

        Model {
            objective: Objective::Quadratic {
                p,
                q: vec![0.0; width],
                constant: 0.0,
            },
            constraints: vec![LinearConstraint::sum_over(
                width,
                0..m,
                Relation::AtMost,
                problem.budget(),
            )],
            lower,
            upper,
        }
    }
}

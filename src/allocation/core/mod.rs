pub mod diagnostics;
mod discrete;
mod error;
mod formulation;
mod lexicographic;
mod lp;
mod metrics;
mod model;
mod pareto;
mod problem;
mod qp;
mod solver;
mod strategies;

pub use discrete::{DiscreteOutcome, DiscreteParams, allocate_discrete, discretize, dp_allocate};
pub use error::{AllocError, LexPhase};
pub use formulation::{
    EffectFormulation, Formulation, L1Formulation, L2Formulation, Regularization,
    ScaledTargetFormulation, solve_formulation, solve_model,
};
pub use lexicographic::{LexicographicParams, LexicographicSummary, allocate_lexicographic};
pub use metrics::{FeasibilityReport, MetricsReport};
pub use model::{
    LinearConstraint, Model, Objective, Relation, Solution, SolveStatus, SolverBackend,
};
pub use pareto::{FrontierPoint, ParetoFrontier, ParetoParams, alpha_grid, pareto_scan};
pub use problem::{AllocationProblem, CoverageMatrix, TargetSource, derive_target};
pub use solver::{NativeSolver, SolverConfig};
pub use strategies::{
    BiobjectiveParams, EffectSummary, L2Params, OutcomeDetail, ScaledTargetParams, Strategy,
    StrategyOutcome, allocate_biobjective, allocate_l1, allocate_l2, allocate_max_effect,
    allocate_scaled_target,
};

#[cfg(test)]
#[path = "../tests.rs"]
mod tests;

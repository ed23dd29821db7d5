mod core;

pub use core::diagnostics::{
    TraceConfig, budget_relation, feasibility_of, print_allocation_summary,
};
pub use core::{
    AllocError, AllocationProblem, BiobjectiveParams, CoverageMatrix, DiscreteOutcome,
    DiscreteParams, EffectFormulation, EffectSummary, FeasibilityReport, Formulation,
    FrontierPoint, L1Formulation, L2Formulation, L2Params, LexPhase, LexicographicParams,
    LexicographicSummary, LinearConstraint, MetricsReport, Model, NativeSolver, Objective,
    OutcomeDetail, ParetoFrontier, ParetoParams, Regularization, Relation,
    ScaledTargetFormulation, ScaledTargetParams, Solution, SolveStatus, SolverBackend,
    SolverConfig, Strategy, StrategyOutcome, TargetSource, allocate_biobjective,
    allocate_discrete, allocate_l1, allocate_l2, allocate_lexicographic, allocate_max_effect,
    allocate_scaled_target, alpha_grid, derive_target, discretize, dp_allocate, pareto_scan,
    solve_formulation, solve_model,
};

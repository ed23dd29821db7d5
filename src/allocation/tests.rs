use super::formulation::{FractionUsage, FractionalFormulation, ScalarizedFormulation};
use super::{
    AllocError, AllocationProblem, BiobjectiveParams, CoverageMatrix, DiscreteParams,
    EffectFormulation, EffectSummary, FeasibilityReport, Formulation, L2Params, LexPhase,
    LexicographicParams, LinearConstraint, MetricsReport, Model, Objective, OutcomeDetail,
    ParetoParams, Regularization, Relation, ScaledTargetParams, SolveStatus, SolverBackend,
    Strategy, TargetSource, allocate_biobjective, allocate_discrete, allocate_l1, allocate_l2,
    allocate_lexicographic, allocate_max_effect, allocate_scaled_target, alpha_grid,
    derive_target, discretize, dp_allocate, pareto_scan,
};

use fixtures::*;

#[test]
fn test_target_follows_importance_counts() {
    let problem = scenario_problem();
    assert_close(
        problem.target(),
        &[460.251046, 121.338912, 167.364017, 251.046025],
        1e-5,
    );
    let total: f64 = problem.target().iter().sum();
    assert!((total - SCENARIO_BUDGET).abs() < 1e-9);
}

#[test]
fn test_target_shares_must_sum_to_one() {
    let shares = TargetSource::Shares(vec![0.5, 0.25, 0.25]);
    assert_eq!(derive_target(&shares, 200.0).unwrap(), vec![100.0, 50.0, 50.0]);

    let loose = TargetSource::Shares(vec![0.5, 0.6]);
    assert!(matches!(
        derive_target(&loose, 200.0),
        Err(AllocError::InfeasibleInput { .. })
    ));
    assert!(derive_target(&TargetSource::Counts(vec![0.0, 0.0]), 10.0).is_err());
    assert!(derive_target(&TargetSource::Counts(vec![1.0, -1.0]), 10.0).is_err());
}

#[test]
fn test_floors_exceeding_budget_are_rejected() {
    let err = AllocationProblem::new(
        scenario_coverage(),
        TargetSource::Counts(scenario_importance()),
        SCENARIO_BUDGET,
        Some(vec![400.0, 400.0, 400.0]),
    )
    .unwrap_err();
    assert!(matches!(err, AllocError::InfeasibleInput { .. }), "{err}");
}

#[test]
fn test_problem_rejects_shape_mismatches() {
    let wrong_importance = AllocationProblem::new(
        scenario_coverage(),
        TargetSource::Counts(vec![1.0, 2.0]),
        SCENARIO_BUDGET,
        None,
    );
    assert!(wrong_importance.is_err());

    assert!(scenario_problem().with_caps(vec![50.0, 500.0, 500.0]).is_err());
    assert!(scenario_problem().with_problem_weights(vec![1.0; 3]).is_err());
    assert!(scenario_problem().with_reference_shares(vec![0.5, 0.5]).is_err());
    assert!(AllocationProblem::new(
        scenario_coverage(),
        TargetSource::Counts(scenario_importance()),
        0.0,
        None,
    )
    .is_err());
}

#[test]
fn test_l1_scenario_minimizes_absolute_error() {
    let problem = scenario_problem();
    let outcome = allocate_l1(&problem, &native()).unwrap();

    assert_eq!(outcome.status, SolveStatus::Optimal);
    assert_respects_constraints(&problem, &outcome.allocation, Relation::Equal);
    assert_close(&outcome.allocation, &[571.787209, 200.0, 228.212791], 1e-4);
    assert!(outcome.metrics.sae <= 377.43 + 1e-3, "sae {}", outcome.metrics.sae);
    // The target is not reachable with these floors; the best RMSE is near 134.
    assert!(outcome.metrics.rmse < 150.0);

    let OutcomeDetail::L1 { errors } = &outcome.detail else {
        panic!("unexpected detail {:?}", outcome.detail);
    };
    assert_eq!(errors.len(), problem.problems());
    let epigraph: f64 = errors.iter().sum();
    assert!((epigraph - outcome.metrics.sae).abs() < 1e-4);
}

#[test]
fn test_l2_scenario_minimizes_squared_error() {
    let problem = scenario_problem();
    let outcome = allocate_l2(&problem, &L2Params::default(), &native()).unwrap();

    assert!(outcome.status.is_usable());
    assert_respects_constraints(&problem, &outcome.allocation, Relation::Equal);
    assert_close(&outcome.allocation, &[455.565, 200.0, 344.435], 1e-2);
    assert!(outcome.metrics.rmse < 120.0, "rmse {}", outcome.metrics.rmse);

    let l1 = allocate_l1(&problem, &native()).unwrap();
    assert!(
        coverage_error(&problem, &outcome.allocation)
            <= coverage_error(&problem, &l1.allocation) + 1e-6
    );
    assert!(
        absolute_error(&problem, &l1.allocation)
            <= absolute_error(&problem, &outcome.allocation) + 1e-6
    );
}

#[test]
fn test_every_strategy_is_idempotent() {
    let problem = scenario_problem();
    let strategies = [
        Strategy::L1,
        Strategy::L2(L2Params::default()),
        Strategy::Biobjective(BiobjectiveParams::default()),
        Strategy::ScaledTarget(ScaledTargetParams::default()),
        Strategy::Lexicographic(LexicographicParams::default()),
        Strategy::ParetoScan(ParetoParams { points: 5 }),
        Strategy::MaxEffect,
        Strategy::Discrete(DiscreteParams { grains: 100 }),
    ];
    for strategy in &strategies {
        let first = strategy.run(&problem, &native()).unwrap();
        let second = strategy.run(&problem, &native()).unwrap();
        assert_eq!(first.allocation, second.allocation, "{}", strategy.label());
        assert_eq!(first.metrics, second.metrics, "{}", strategy.label());
        assert_eq!(first.detail, second.detail, "{}", strategy.label());
    }

    let frontier = pareto_scan(&problem, ParetoParams { points: 4 }, &native()).unwrap();
    let again = pareto_scan(&problem, ParetoParams { points: 4 }, &native()).unwrap();
    assert_eq!(frontier, again);
    assert_eq!(
        discretize(&problem, 100).unwrap(),
        discretize(&problem, 100).unwrap()
    );
}

#[test]
fn test_l2_ridge_pulls_toward_zero_and_prior_pulls_toward_reference() {
    let problem = scenario_problem();
    let plain = allocate_l2(&problem, &L2Params::default(), &native()).unwrap();

    let prior = allocate_l2(
        &problem,
        &L2Params {
            regularization: Regularization::Prior {
                mu: 100.0,
                prior: None,
            },
        },
        &native(),
    )
    .unwrap();
    assert_respects_constraints(&problem, &prior.allocation, Relation::Equal);
    let reference = problem.reference_allocation();
    let distance = |x: &[f64]| -> f64 {
        x.iter()
            .zip(reference.iter())
            .map(|(a, r)| (a - r) * (a - r))
            .sum()
    };
    assert!(distance(&prior.allocation) < distance(&plain.allocation));

    let ridge = allocate_l2(
        &problem,
        &L2Params {
            regularization: Regularization::Ridge { mu: 1e6 },
        },
        &native(),
    )
    .unwrap();
    // A dominant ridge spreads the equality budget as evenly as the floors allow.
    assert_close(&ridge.allocation, &[333.333, 333.333, 333.333], 1.0);

    let bad = allocate_l2(
        &problem,
        &L2Params {
            regularization: Regularization::Ridge { mu: -1.0 },
        },
        &native(),
    );
    assert!(matches!(bad, Err(AllocError::InfeasibleInput { .. })));
}

#[test]
fn test_caps_are_respected_by_l1_and_l2() {
    let problem = scenario_problem()
        .with_caps(vec![300.0, 1000.0, 1000.0])
        .unwrap();

    let l1 = allocate_l1(&problem, &native()).unwrap();
    assert_respects_constraints(&problem, &l1.allocation, Relation::Equal);
    assert!(l1.allocation[0] <= 300.0 + TOL);

    let l2 = allocate_l2(&problem, &L2Params::default(), &native()).unwrap();
    assert_respects_constraints(&problem, &l2.allocation, Relation::Equal);
    assert!((l2.allocation[0] - 300.0).abs() < 1e-3);
}

#[test]
fn test_problem_weights_shift_the_l2_fit() {
    let problem = scenario_problem()
        .with_problem_weights(vec![0.0, 10.0, 0.0, 0.0])
        .unwrap();
    let outcome = allocate_l2(&problem, &L2Params::default(), &native()).unwrap();
    assert_respects_constraints(&problem, &outcome.allocation, Relation::Equal);
    // Only problem 1 counts, and it is covered by category 1 alone; the floor
    // already overshoots its target, so category 1 stays at its floor.
    assert!((outcome.allocation[1] - 200.0).abs() < 1e-3);
}

#[test]
fn test_biobjective_spends_more_as_lambda_grows() {
    let problem = scenario_problem();
    let mut previous_used = f64::NEG_INFINITY;
    for lambda in [0.0, 1.0, 10.0, 100.0, 1000.0, 1e5] {
        let outcome =
            allocate_biobjective(&problem, BiobjectiveParams { lambda }, &native()).unwrap();
        assert_respects_constraints(&problem, &outcome.allocation, Relation::AtMost);
        let OutcomeDetail::Biobjective { used, .. } = outcome.detail else {
            panic!("unexpected detail {:?}", outcome.detail);
        };
        assert!(
            used + 1e-4 >= previous_used,
            "lambda {} used {} after {}",
            lambda,
            used,
            previous_used
        );
        previous_used = used;
    }
    assert!((previous_used - SCENARIO_BUDGET).abs() < 1e-3);

    let negative = allocate_biobjective(&problem, BiobjectiveParams { lambda: -1.0 }, &native());
    assert!(matches!(negative, Err(AllocError::InfeasibleInput { .. })));
}

#[test]
fn test_lexicographic_keeps_coverage_and_spends_more() {
    let problem = scenario_problem();
    let params = LexicographicParams {
        epsilon: 50.0,
        ..LexicographicParams::default()
    };
    let outcome = allocate_lexicographic(&problem, params, &native()).unwrap();
    assert_respects_constraints(&problem, &outcome.allocation, Relation::AtMost);

    let OutcomeDetail::Lexicographic(summary) = &outcome.detail else {
        panic!("unexpected detail {:?}", outcome.detail);
    };
    assert!(summary.cov2 <= summary.cov1 + params.epsilon);
    assert!(summary.used2 + 1e-6 >= summary.used1);
    assert_eq!(summary.phase_one_allocation.len(), problem.categories());
    let phase_one_used: f64 = summary.phase_one_allocation.iter().sum();
    assert!((phase_one_used - summary.used1).abs() < 1e-9);
    assert!((coverage_error(&problem, &outcome.allocation) - summary.cov2).abs() < 1e-6);
}

#[test]
fn test_lexicographic_generous_epsilon_spends_everything() {
    let problem = scenario_problem();
    let params = LexicographicParams {
        epsilon: 1e12,
        ..LexicographicParams::default()
    };
    let outcome = allocate_lexicographic(&problem, params, &native()).unwrap();
    assert!((outcome.metrics.used_budget - SCENARIO_BUDGET).abs() < 1e-3);
}

#[test]
fn test_lexicographic_phase_failures_are_tagged() {
    let problem = scenario_problem();
    let negative = LexicographicParams {
        epsilon: -1.0,
        ..LexicographicParams::default()
    };
    assert_eq!(
        allocate_lexicographic(&problem, negative, &native()).unwrap_err(),
        AllocError::LexicographicPhase {
            phase: LexPhase::Two,
            status: SolveStatus::Infeasible,
        }
    );
    assert_eq!(
        allocate_lexicographic(&problem, LexicographicParams::default(), &expired()).unwrap_err(),
        AllocError::LexicographicPhase {
            phase: LexPhase::One,
            status: SolveStatus::Cancelled,
        }
    );
}

#[test]
fn test_pareto_scan_samples_in_alpha_order() {
    let problem = scenario_problem();
    let frontier = pareto_scan(&problem, ParetoParams { points: 5 }, &native()).unwrap();
    assert_eq!(frontier.len(), 5);
    let alphas: Vec<f64> = frontier.points.iter().map(|p| p.alpha).collect();
    assert_eq!(alphas, vec![0.0, 0.25, 0.5, 0.75, 1.0]);

    for pair in frontier.points.windows(2) {
        let slack = |v: f64| 1e-6 * (1.0 + v.abs());
        assert!(
            pair[1].f1 <= pair[0].f1 + slack(pair[0].f1),
            "f1 should not grow with alpha"
        );
        assert!(
            pair[1].f2 + slack(pair[0].f2) >= pair[0].f2,
            "f2 should not shrink with alpha"
        );
    }
    for point in &frontier.points {
        assert_respects_constraints(&problem, &point.allocation, Relation::Equal);
    }

    // alpha = 0 is the reference allocation, which already clears every floor.
    assert_close(
        &frontier.points[0].allocation,
        &problem.reference_allocation(),
        1e-3,
    );
    // alpha = 1 is the unweighted coverage fit.
    assert_close(
        &frontier.points[4].allocation,
        &[455.565, 200.0, 344.435],
        1e-2,
    );

    let knee = frontier.knee().unwrap();
    assert!(frontier.points.iter().any(|p| p.alpha == knee.alpha));
}

#[test]
fn test_pareto_single_sample_uses_alpha_zero() {
    assert_eq!(alpha_grid(1), vec![0.0]);
    assert!(alpha_grid(0).is_empty());
    let frontier = pareto_scan(&scenario_problem(), ParetoParams { points: 1 }, &native()).unwrap();
    assert_eq!(frontier.points.len(), 1);
    assert_eq!(frontier.points[0].alpha, 0.0);
}

#[test]
fn test_pareto_drops_failed_samples_and_reports_empty_frontier() {
    let problem = scenario_problem();
    let err = pareto_scan(&problem, ParetoParams { points: 4 }, &expired()).unwrap_err();
    assert_eq!(err, AllocError::EmptyFrontier { samples: 4 });

    let strategy = Strategy::ParetoScan(ParetoParams { points: 3 });
    assert_eq!(
        strategy.run(&problem, &expired()).unwrap_err(),
        AllocError::EmptyFrontier { samples: 3 }
    );
}

#[test]
fn test_max_effect_fills_the_heaviest_category() {
    let problem = scenario_problem();
    assert_close(
        &EffectFormulation::category_weights(&problem),
        &[625.0, 410.0, 160.0],
        1e-9,
    );

    let outcome = allocate_max_effect(&problem, &native()).unwrap();
    assert_respects_constraints(&problem, &outcome.allocation, Relation::AtMost);
    assert_close(&outcome.allocation, &[600.0, 200.0, 200.0], 1e-6);
    let OutcomeDetail::MaxEffect(summary) = &outcome.detail else {
        panic!("unexpected detail {:?}", outcome.detail);
    };
    assert!((summary.total_effect - 489_000.0).abs() < 1e-3);
    assert!((summary.efficiency - 489.0).abs() < 1e-6);
    // Floors alone: 625*100 + 410*200 + 160*200 = 176500.
    let improvement = summary.improvement_vs_baseline.unwrap();
    assert!((improvement - 312_500.0 / 176_500.0).abs() < 1e-8);
    // Per-problem effects are [480, 200, 200, 520].
    assert!((summary.min_effect - 200.0).abs() < 1e-6);
    let relative = summary.min_effect_relative.unwrap();
    assert!((relative - 480.0 / 550.0).abs() < 1e-8);
    let uniform = summary.uniform_comparison.unwrap();
    assert!((uniform - 489_000.0 * 3.0 / 1_195_000.0).abs() < 1e-8);
    assert_eq!(summary.problem_coverage, 1.0);
}

#[test]
fn test_effect_summary_handles_idle_floors_and_weak_coverage() {
    let problem = AllocationProblem::new(
        scenario_coverage(),
        TargetSource::Counts(vec![550.0, 145.0, 200.0, 0.0]),
        SCENARIO_BUDGET,
        None,
    )
    .unwrap();
    let summary = EffectSummary::compute(&problem, &[0.0, 0.0, 100.0]);
    assert_eq!(summary.improvement_vs_baseline, None);
    assert_eq!(summary.min_effect, 0.0);
    // The zero-importance problem is left out of the relative figures.
    assert_eq!(summary.min_effect_relative, Some(0.0));
    // Only the third problem is reached, at 50 / 200 = 0.25, below the one-half mark.
    assert_eq!(summary.problem_coverage, 0.0);
    // Category 3 weighs 0.5 * 200 = 100 per unit.
    assert!((summary.efficiency - 100.0).abs() < 1e-9);
}

#[test]
fn test_scaled_target_keeps_minimum_scale_when_ridge_dominates() {
    let problem = scenario_problem();
    let outcome =
        allocate_scaled_target(&problem, ScaledTargetParams::default(), &native()).unwrap();
    assert!(outcome.status.is_usable());
    assert_respects_constraints(&problem, &outcome.allocation, Relation::AtMost);
    // x2 and x3 stay on their floors; x1 = (1.4 (y1 - 60) + 1.6 (y4 - 40)) / 2.46.
    assert_close(&outcome.allocation, &[365.050856, 200.0, 200.0], 1e-4);

    let OutcomeDetail::ScaledTarget {
        scale,
        min_scale,
        used,
        ..
    } = outcome.detail
    else {
        panic!("unexpected detail {:?}", outcome.detail);
    };
    assert!((min_scale - 1000.0 / 1195.0).abs() < 1e-12);
    assert!((scale - min_scale).abs() < 1e-6);
    assert!(used < SCENARIO_BUDGET - 1.0);
}

#[test]
fn test_scaled_target_raises_scale_above_heavy_floors() {
    let problem = AllocationProblem::new(
        scenario_coverage(),
        TargetSource::Counts(scenario_importance()),
        SCENARIO_BUDGET,
        Some(vec![400.0, 400.0, 150.0]),
    )
    .unwrap();
    let outcome =
        allocate_scaled_target(&problem, ScaledTargetParams { lambda: 0.0 }, &native()).unwrap();
    assert_respects_constraints(&problem, &outcome.allocation, Relation::AtMost);
    assert_close(&outcome.allocation, &[450.0, 400.0, 150.0], 1e-4);

    let OutcomeDetail::ScaledTarget {
        scale,
        min_scale,
        scaled_error,
        ..
    } = outcome.detail
    else {
        panic!("unexpected detail {:?}", outcome.detail);
    };
    // With x fixed, the best k is c.(A x) / c.c = 469250 / 453525.
    assert!((scale - 469_250.0 / 453_525.0).abs() < 1e-6);
    assert!(scale > min_scale);
    assert!(scaled_error > 0.0);

    assert!(
        allocate_scaled_target(&problem, ScaledTargetParams { lambda: -1.0 }, &native())
            .is_err()
    );
    assert_eq!(
        Strategy::ScaledTarget(ScaledTargetParams { lambda: 0.0 }).label(),
        "scaled_target"
    );
}

#[test]
fn test_dp_scenario_matches_hand_solution() {
    let problem = scenario_problem();
    let outcome = allocate_discrete(&problem, DiscreteParams { grains: 100 }).unwrap();
    assert_eq!(outcome.status, SolveStatus::Optimal);
    assert_close(&outcome.allocation, &[490.0, 310.0, 200.0], 1e-9);
    assert_respects_constraints(&problem, &outcome.allocation, Relation::Equal);
    assert!(outcome.metrics.rmse < 150.0);

    let OutcomeDetail::Discrete {
        grains,
        grain_size,
        counts,
        ..
    } = &outcome.detail
    else {
        panic!("unexpected detail {:?}", outcome.detail);
    };
    assert_eq!(*grains, 100);
    assert_eq!(*grain_size, 10.0);
    assert_eq!(counts, &vec![49, 31, 20]);
}

#[test]
fn test_dp_free_function_matches_problem_form() {
    let direct = dp_allocate(
        &scenario_coverage(),
        &scenario_importance(),
        SCENARIO_BUDGET,
        &scenario_floors(),
        100,
    )
    .unwrap();
    let via_problem = discretize(&scenario_problem(), 100).unwrap();
    assert_eq!(direct, via_problem);
}

#[test]
fn test_dp_reports_infeasible_discretization() {
    let problem = scenario_problem();
    assert_eq!(
        discretize(&problem, 2).unwrap_err(),
        AllocError::InfeasibleDiscretization {
            grains: 2,
            required: 3,
        }
    );
    assert!(matches!(
        discretize(&problem, 0),
        Err(AllocError::InfeasibleInput { .. })
    ));
}

#[test]
fn test_dp_floor_grains_absorb_division_noise() {
    // 0.2 / (1 / 35) and 0.8 / (1 / 35) both land just above an integer.
    let problem = AllocationProblem::new(
        CoverageMatrix::from_rows(vec![vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap(),
        TargetSource::Counts(vec![1.0, 1.0]),
        1.0,
        Some(vec![0.2, 0.8]),
    )
    .unwrap();
    let outcome = discretize(&problem, 35).unwrap();
    assert_eq!(outcome.counts, vec![7, 28]);
}

#[test]
fn test_dp_respects_caps_in_grains() {
    let problem = scenario_problem()
        .with_caps(vec![400.0, 1000.0, 1000.0])
        .unwrap();
    let outcome = discretize(&problem, 100).unwrap();
    assert!(outcome.allocation[0] <= 400.0 + 1e-9);
    let used: f64 = outcome.allocation.iter().sum();
    assert!((used - SCENARIO_BUDGET).abs() < 1e-9);
}

#[test]
fn test_dp_converges_to_continuous_grain_objective() {
    let problem = scenario_problem();
    let ideal = problem.coverage().transpose_apply(problem.target());
    let m = problem.categories();
    let mut p = vec![0.0; m * m];
    for j in 0..m {
        p[j * m + j] = 2.0;
    }
    let model = Model {
        objective: Objective::Quadratic {
            p,
            q: ideal.iter().map(|v| -2.0 * v).collect(),
            constant: ideal.iter().map(|v| v * v).sum(),
        },
        constraints: vec![LinearConstraint::sum_over(
            m,
            0..m,
            Relation::Equal,
            problem.budget(),
        )],
        lower: problem.floors().to_vec(),
        upper: problem.upper_bounds(),
    };
    let continuous = native().solve(&model);
    assert!(continuous.status.is_usable());
    assert_close(&continuous.values, &[489.958159, 310.041841, 200.0], 1e-3);

    let mut previous_gap = f64::INFINITY;
    for grains in [10, 100, 1000] {
        let outcome = discretize(&problem, grains).unwrap();
        let gap = outcome
            .allocation
            .iter()
            .zip(continuous.values.iter())
            .map(|(d, c)| (d - c).abs())
            .fold(0.0, f64::max);
        assert!(gap <= outcome.grain_size + 1e-6, "grains {} gap {}", grains, gap);
        assert!(gap <= previous_gap + 1e-9);
        previous_gap = gap;
    }
}

#[test]
fn test_solver_failures_surface_as_typed_errors() {
    let problem = scenario_problem();
    assert_eq!(
        allocate_l2(&problem, &L2Params::default(), &expired()).unwrap_err(),
        AllocError::OptimizationFailed {
            status: SolveStatus::Cancelled,
            context: "l2",
        }
    );
    assert_eq!(
        allocate_l1(&problem, &expired()).unwrap_err().status(),
        Some(SolveStatus::Cancelled)
    );
}

#[test]
fn test_strategy_dispatch_labels_outcomes() {
    let problem = scenario_problem();
    let strategies = [
        Strategy::L1,
        Strategy::L2(L2Params::default()),
        Strategy::Biobjective(BiobjectiveParams::default()),
        Strategy::ScaledTarget(ScaledTargetParams::default()),
        Strategy::Lexicographic(LexicographicParams::default()),
        Strategy::ParetoScan(ParetoParams { points: 3 }),
        Strategy::MaxEffect,
        Strategy::Discrete(DiscreteParams { grains: 50 }),
    ];
    for strategy in &strategies {
        let outcome = strategy.run(&problem, &native()).unwrap();
        assert_eq!(outcome.strategy, strategy.label());
        assert_eq!(outcome.allocation.len(), problem.categories());
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["strategy"], strategy.label());
        assert!(json["detail"]["kind"].is_string());
    }
}

#[test]
fn test_fractional_formulations_share_bounds() {
    let problem = scenario_problem()
        .with_caps(vec![2000.0, 500.0, 500.0])
        .unwrap();
    let (lower, upper) = FractionalFormulation::fraction_bounds(&problem);
    assert_close(&lower, &[0.1, 0.2, 0.2], 1e-12);
    assert_close(&upper, &[1.0, 0.5, 0.5], 1e-12);

    let at_usage = FractionalFormulation {
        lambda: 0.0,
        usage: FractionUsage::Exactly(0.8),
    };
    let model = at_usage.build_model(&problem);
    assert_eq!(model.constraints.len(), 1);
    assert_eq!(model.constraints[0].relation, Relation::Equal);
    assert_eq!(model.constraints[0].rhs, 0.8);
    assert_eq!(at_usage.label(), "coverage_at_usage");
    assert_eq!(
        at_usage.recover(&problem, &[0.5, 0.25, 0.25]),
        vec![500.0, 250.0, 250.0]
    );

    let sample = ScalarizedFormulation { alpha: 0.5 };
    assert!(!sample.build_model(&problem).is_linear());
}

#[test]
fn test_metrics_handle_degenerate_targets() {
    let flat = MetricsReport::from_residuals(vec![1.0, -1.0], &[5.0, 5.0], &[0.5, 0.5], 10.0);
    assert_eq!(flat.r2, None);
    assert_eq!(flat.mae, 1.0);
    assert_eq!(flat.rmse, 1.0);
    assert_eq!(flat.max_error, 1.0);
    assert_eq!(flat.sae, 2.0);
    assert_eq!(flat.mae_p, 1.0);
    assert_eq!(flat.percent_errors, vec![Some(20.0), Some(-20.0)]);

    let zero_target =
        MetricsReport::from_residuals(vec![1.0, 2.0], &[0.0, 4.0], &[1.0, 1.0], 4.0);
    assert_eq!(zero_target.percent_errors, vec![None, Some(50.0)]);
    let r2 = zero_target.r2.unwrap();
    assert!((r2 - 0.375).abs() < 1e-12);
    assert_eq!(zero_target.coverage_error(), 5.0);
}

#[test]
fn test_feasibility_report_flags_violations() {
    let ok = FeasibilityReport::check(
        &[100.0, 200.0],
        300.0,
        Relation::Equal,
        &[50.0, 50.0],
        None,
        1e-5,
    );
    assert!(ok.is_satisfied());

    let bad = FeasibilityReport::check(
        &[40.0, 300.0],
        300.0,
        Relation::AtMost,
        &[50.0, 50.0],
        Some(&[100.0, 250.0]),
        1e-5,
    );
    assert!(!bad.budget_ok);
    assert!(!bad.floors_ok);
    assert!(!bad.caps_ok);
    assert_eq!(bad.max_floor_violation, 10.0);
    assert_eq!(bad.max_cap_violation, 50.0);
    assert_eq!(bad.used_budget, 340.0);
}

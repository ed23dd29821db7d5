use std::error::Error;
use std::fs::File;
use std::io::BufWriter;
use std::time::Duration;

use coverage_allocator::allocation::{
    self, BiobjectiveParams, DiscreteParams, L2Params, LexicographicParams, NativeSolver,
    ParetoParams, Regularization, ScaledTargetParams, SolverConfig, Strategy, TraceConfig,
};
use coverage_allocator::sources::{AllocationSource, CsvSource};

fn parse_positive_f64(name: &str, default: f64) -> f64 {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite() && *value > 0.0)
        .unwrap_or(default)
}

fn parse_nonnegative_f64(name: &str) -> Option<f64> {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite() && *value >= 0.0)
}

fn parse_count(name: &str) -> Option<usize> {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.trim().parse::<usize>().ok())
        .filter(|value| *value > 0)
}

fn parse_strategy() -> Strategy {
    let choice = std::env::var("ALLOC_STRATEGY")
        .ok()
        .map(|raw| raw.trim().to_ascii_lowercase());
    match choice.as_deref() {
        Some("l1") => Strategy::L1,
        Some("biobj") | Some("biobjective") => Strategy::Biobjective(BiobjectiveParams {
            lambda: parse_nonnegative_f64("ALLOC_LAMBDA")
                .unwrap_or(BiobjectiveParams::default().lambda),
        }),
        Some("scaled") | Some("scaled_target") => Strategy::ScaledTarget(ScaledTargetParams {
            lambda: parse_nonnegative_f64("ALLOC_LAMBDA")
                .unwrap_or(ScaledTargetParams::default().lambda),
        }),
        Some("lexico") | Some("lexicographic") => {
            let defaults = LexicographicParams::default();
            Strategy::Lexicographic(LexicographicParams {
                epsilon: parse_nonnegative_f64("ALLOC_EPSILON").unwrap_or(defaults.epsilon),
                ..defaults
            })
        }
        Some("pareto") => Strategy::ParetoScan(ParetoParams {
            points: parse_count("ALLOC_PARETO_POINTS").unwrap_or(ParetoParams::default().points),
        }),
        Some("dp") | Some("discrete") => Strategy::Discrete(DiscreteParams {
            grains: parse_count("ALLOC_GRAINS").unwrap_or(DiscreteParams::default().grains),
        }),
        Some("effect") | Some("max_effect") => Strategy::MaxEffect,
        _ => Strategy::L2(L2Params {
            regularization: match parse_nonnegative_f64("ALLOC_MU") {
                Some(mu) if mu > 0.0 => Regularization::Ridge { mu },
                _ => Regularization::None,
            },
        }),
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let data_dir = std::env::var("ALLOC_DATA_DIR").unwrap_or_else(|_| "data".to_string());
    let source = CsvSource::new(data_dir.trim())?;

    let report = match std::env::var("ALLOC_REPORT") {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().to_string(),
        _ => match source.reports()?.into_iter().next() {
            Some(first) => first,
            None => {
                tracing::warn!(dir = %data_dir, "no reports found; nothing to allocate");
                return Ok(());
            }
        },
    };
    let budget = parse_positive_f64("ALLOC_BUDGET", 1000.0);
    let loaded = source.load_problem(&report, budget)?;

    let mut config = SolverConfig::default();
    if let Some(ms) = std::env::var("ALLOC_SOLVER_TIMEOUT_MS")
        .ok()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
    {
        config = config.with_time_limit(Duration::from_millis(ms));
    }
    let backend = NativeSolver::new(config);
    let strategy = parse_strategy();

    tracing::info!(
        report = %report,
        strategy = strategy.label(),
        budget,
        problems = loaded.problem.problems(),
        categories = loaded.problem.categories(),
        duplicate_pairs = loaded.duplicate_pairs,
        "running allocation"
    );

    let outcome = strategy.run(&loaded.problem, &backend)?;

    tracing::info!(
        status = %outcome.status,
        rmse = outcome.metrics.rmse,
        used = outcome.metrics.used_budget,
        "completed allocation"
    );

    let trace_config = TraceConfig::from_env();
    allocation::print_allocation_summary(
        &loaded.problem,
        &outcome,
        &loaded.category_names,
        &loaded.problem_names,
        trace_config,
    );

    if let Ok(path) = std::env::var("ALLOC_REPORT_JSON") {
        let path = path.trim();
        if !path.is_empty() {
            let writer = BufWriter::new(File::create(path)?);
            serde_json::to_writer_pretty(writer, &outcome)?;
            println!("Saved outcome to {}", path);
        }
    }

    Ok(())
}

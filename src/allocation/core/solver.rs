use std::time::{Duration, Instant};

use super::model::{Model, Solution, SolveStatus, SolverBackend};
use super::qp::solve_quadratic;
use super::lp::solve_linear;

#[derive(Debug, Clone, Copy)]
pub struct SolverConfig {
    pub qp_max_iters: usize,
    pub qp_tol: f64,
    pub qp_inaccurate_factor: f64,
    pub qp_check_every: usize,
    pub hess_floor: f64,
    pub active_set_eps: f64,
    pub projection_iters: usize,
    pub divergence_limit: f64,
    pub time_limit: Option<Duration>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            qp_max_iters: 20_000,
            qp_tol: 1e-10,
            qp_inaccurate_factor: 1e4,
            qp_check_every: 25,
            hess_floor: 1e-8,
            active_set_eps: 1e-9,
            projection_iters: 100,
            divergence_limit: 1e15,
            time_limit: None,
        }
    }
}

impl SolverConfig {
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }
}

/// Wall-clock budget for a single backend call.
#[derive(Debug, Clone, Copy)]
pub(super) struct Deadline {
    started: Instant,
    limit: Option<Duration>,
}

impl Deadline {
    pub(super) fn start(limit: Option<Duration>) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    pub(super) fn expired(&self) -> bool {
        self.limit
            .is_some_and(|limit| self.started.elapsed() >= limit)
    }
}

/// Built-in backend: `good_lp` (microlp) for linear objectives, accelerated projected
/// gradient with active-set polishing for quadratic ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeSolver {
    pub config: SolverConfig,
}

impl NativeSolver {
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }
}

impl SolverBackend for NativeSolver {
    fn solve(&self, model: &Model) -> Solution {
        let width = model.width();
        if let Some(problem) = model.shape_error() {
            tracing::debug!(%problem, "rejecting malformed model");
            return Solution::failed(SolveStatus::SolverError, width, 0);
        }

        let deadline = Deadline::start(self.config.time_limit);
        if deadline.expired() {
            return Solution::failed(SolveStatus::Cancelled, width, 0);
        }

        let solution = if model.is_linear() {
            solve_linear(model)
        } else {
            solve_quadratic(model, &self.config, &deadline)
        };
        tracing::debug!(
            linear = model.is_linear(),
            columns = width,
            rows = model.constraints.len(),
            status = %solution.status,
            iterations = solution.iterations,
            "native solve finished"
        );
        solution
    }
}

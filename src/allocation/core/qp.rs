use super::model::{Model, Objective, Relation, Solution, SolveStatus, dot};
use super::solver::{Deadline, SolverConfig};

const BRACKET_DOUBLINGS: usize = 400;
const PIVOT_FLOOR: f64 = 1e-14;

#[derive(Debug, Clone)]
pub(super) struct BoxBounds {
    pub(super) lower: Vec<f64>,
    pub(super) upper: Vec<f64>,
}

/// The single general row a quadratic model may carry next to its box.
#[derive(Debug, Clone, Copy)]
struct Coupling<'a> {
    a: &'a [f64],
    relation: Relation,
    rhs: f64,
}

fn max_abs(v: &[f64]) -> f64 {
    v.iter().map(|x| x.abs()).fold(0.0, f64::max)
}

fn clamp_box(v: &[f64], bounds: &BoxBounds) -> Vec<f64> {
    v.iter()
        .zip(bounds.lower.iter().zip(bounds.upper.iter()))
        .map(|(&vi, (&lo, &hi))| vi.clamp(lo, hi))
        .collect()
}

fn clamp_shifted(v: &[f64], bounds: &BoxBounds, a: &[f64], tau: f64) -> Vec<f64> {
    v.iter()
        .zip(a.iter())
        .zip(bounds.lower.iter().zip(bounds.upper.iter()))
        .map(|((&vi, &ai), (&lo, &hi))| (vi - tau * ai).clamp(lo, hi))
        .collect()
}

/// Smallest and largest value `a'x` can take over the box.
fn activity_range(coupling: &Coupling<'_>, bounds: &BoxBounds) -> (f64, f64) {
    let mut lo_sum = 0.0_f64;
    let mut hi_sum = 0.0_f64;
    for ((&a, &lo), &hi) in coupling
        .a
        .iter()
        .zip(bounds.lower.iter())
        .zip(bounds.upper.iter())
    {
        if a == 0.0 {
            continue;
        }
        if a > 0.0 {
            lo_sum += a * lo;
            hi_sum += a * hi;
        } else {
            lo_sum += a * hi;
            hi_sum += a * lo;
        }
    }
    (lo_sum, hi_sum)
}

fn coupling_feasible(coupling: &Coupling<'_>, bounds: &BoxBounds) -> bool {
    let (lo_sum, hi_sum) = activity_range(coupling, bounds);
    let tol = 1e-9 * (1.0 + coupling.rhs.abs());
    match coupling.relation {
        Relation::Equal => lo_sum <= coupling.rhs + tol && hi_sum >= coupling.rhs - tol,
        Relation::AtMost => lo_sum <= coupling.rhs + tol,
    }
}

/// Exact multiplier once the clamping pattern around the bracket is known.
fn refine_multiplier(
    v: &[f64],
    bounds: &BoxBounds,
    coupling: &Coupling<'_>,
    lo: f64,
    hi: f64,
) -> f64 {
    let mid = 0.5 * (lo + hi);
    let mut fixed_activity = 0.0_f64;
    let mut free_activity = 0.0_f64;
    let mut free_weight = 0.0_f64;
    for (i, &a) in coupling.a.iter().enumerate() {
        if a == 0.0 {
            continue;
        }
        let shifted = v[i] - mid * a;
        if shifted > bounds.lower[i] && shifted < bounds.upper[i] {
            free_activity += a * v[i];
            free_weight += a * a;
        } else {
            fixed_activity += a * shifted.clamp(bounds.lower[i], bounds.upper[i]);
        }
    }
    if free_weight <= 0.0 {
        return mid;
    }
    let tau = (free_activity + fixed_activity - coupling.rhs) / free_weight;
    if tau.is_finite() && tau >= lo && tau <= hi {
        tau
    } else {
        mid
    }
}

/// Euclidean projection onto the box intersected with the coupling row.
fn project(
    v: &[f64],
    bounds: &BoxBounds,
    coupling: Option<&Coupling<'_>>,
    iters: usize,
) -> Vec<f64> {
    let boxed = clamp_box(v, bounds);
    let Some(c) = coupling else {
        return boxed;
    };

    let activity = dot(c.a, &boxed);
    let tol = 1e-13 * (1.0 + c.rhs.abs());
    match c.relation {
        Relation::AtMost if activity <= c.rhs + tol => return boxed,
        Relation::Equal if (activity - c.rhs).abs() <= tol => return boxed,
        _ => {}
    }

    // a'clamp(v - tau a) is nonincreasing in tau.
    let phi = |tau: f64| dot(c.a, &clamp_shifted(v, bounds, c.a, tau)) - c.rhs;
    let (mut lo, mut hi) = if activity > c.rhs {
        let mut hi = 1.0_f64;
        for _ in 0..BRACKET_DOUBLINGS {
            if phi(hi) <= 0.0 {
                break;
            }
            hi *= 2.0;
        }
        (0.0, hi)
    } else {
        let mut lo = -1.0_f64;
        for _ in 0..BRACKET_DOUBLINGS {
            if phi(lo) >= 0.0 {
                break;
            }
            lo *= 2.0;
        }
        (lo, 0.0)
    };

    for _ in 0..iters {
        let mid = 0.5 * (lo + hi);
        if mid <= lo || mid >= hi {
            break;
        }
        if phi(mid) > 0.0 {
            lo = mid;
        } else {
            hi = mid;
        }
        if hi - lo <= 1e-15 * (1.0 + lo.abs().max(hi.abs())) {
            break;
        }
    }

    let tau = refine_multiplier(v, bounds, c, lo, hi);
    clamp_shifted(v, bounds, c.a, tau)
}

fn gradient(p: &[f64], q: &[f64], x: &[f64]) -> Vec<f64> {
    let k = x.len();
    (0..k)
        .map(|i| dot(&p[i * k..(i + 1) * k], x) + q[i])
        .collect()
}

fn quadratic_value(p: &[f64], q: &[f64], x: &[f64]) -> f64 {
    let g_half: f64 = (0..x.len())
        .map(|i| x[i] * dot(&p[i * x.len()..(i + 1) * x.len()], x))
        .sum();
    0.5 * g_half + dot(q, x)
}

/// Gershgorin upper bound on the largest eigenvalue of `p`.
fn gershgorin_bound(p: &[f64], k: usize) -> f64 {
    (0..k)
        .map(|i| p[i * k..(i + 1) * k].iter().map(|v| v.abs()).sum::<f64>())
        .fold(0.0, f64::max)
}

/// Sup-norm of the gradient-mapping step; zero exactly at a KKT point.
fn stationarity_residual(
    p: &[f64],
    q: &[f64],
    x: &[f64],
    step: f64,
    bounds: &BoxBounds,
    coupling: Option<&Coupling<'_>>,
    cfg: &SolverConfig,
) -> f64 {
    let g = gradient(p, q, x);
    let trial: Vec<f64> = x.iter().zip(g.iter()).map(|(&xi, &gi)| xi - step * gi).collect();
    let projected = project(&trial, bounds, coupling, cfg.projection_iters);
    x.iter()
        .zip(projected.iter())
        .map(|(&xi, &pi)| (xi - pi).abs())
        .fold(0.0, f64::max)
}

fn at_bound(x: f64, lo: f64, hi: f64, eps: f64) -> bool {
    x <= lo + eps * (1.0 + lo.abs()) || (hi.is_finite() && x >= hi - eps * (1.0 + hi.abs()))
}

/// Gaussian elimination with partial pivoting. `mat` is `dim x dim` row-major.
fn solve_dense(mut mat: Vec<f64>, mut rhs: Vec<f64>, dim: usize) -> Option<Vec<f64>> {
    let scale = max_abs(&mat).max(1.0);
    for col in 0..dim {
        let pivot_row = (col..dim)
            .max_by(|&a, &b| mat[a * dim + col].abs().total_cmp(&mat[b * dim + col].abs()))?;
        if mat[pivot_row * dim + col].abs() <= PIVOT_FLOOR * scale {
            return None;
        }
        if pivot_row != col {
            for j in 0..dim {
                mat.swap(col * dim + j, pivot_row * dim + j);
            }
            rhs.swap(col, pivot_row);
        }
        let pivot = mat[col * dim + col];
        for row in col + 1..dim {
            let factor = mat[row * dim + col] / pivot;
            if factor == 0.0 {
                continue;
            }
            for j in col..dim {
                let upper = mat[col * dim + j];
                mat[row * dim + j] -= factor * upper;
            }
            let upper_rhs = rhs[col];
            rhs[row] -= factor * upper_rhs;
        }
    }

    let mut out = vec![0.0_f64; dim];
    for row in (0..dim).rev() {
        let mut acc = rhs[row];
        for j in row + 1..dim {
            acc -= mat[row * dim + j] * out[j];
        }
        out[row] = acc / mat[row * dim + row];
    }
    out.iter().all(|v| v.is_finite()).then_some(out)
}

/// Solves the KKT system on the variables that are off their bounds, keeping
/// the rest fixed. Returns the refined point only if it is feasible and no worse.
fn polish(
    p: &[f64],
    q: &[f64],
    x: &[f64],
    bounds: &BoxBounds,
    coupling: Option<&Coupling<'_>>,
    cfg: &SolverConfig,
) -> Option<Vec<f64>> {
    let k = x.len();
    let eps = cfg.active_set_eps;
    let free_mask: Vec<bool> = (0..k)
        .map(|i| !at_bound(x[i], bounds.lower[i], bounds.upper[i], eps))
        .collect();
    let free: Vec<usize> = (0..k).filter(|&i| free_mask[i]).collect();
    if free.is_empty() {
        return None;
    }

    let active_row = coupling.filter(|c| match c.relation {
        Relation::Equal => true,
        Relation::AtMost => dot(c.a, x) >= c.rhs - eps * (1.0 + c.rhs.abs()),
    });
    let active_row = active_row.filter(|c| free.iter().any(|&i| c.a[i] != 0.0));

    let nf = free.len();
    let dim = nf + usize::from(active_row.is_some());
    let diag_scale = (0..k).map(|i| p[i * k + i].abs()).fold(0.0, f64::max);
    let ridge = 1e-12 * (1.0 + diag_scale);
    let mut mat = vec![0.0_f64; dim * dim];
    let mut rhs = vec![0.0_f64; dim];

    for (r, &i) in free.iter().enumerate() {
        let mut b = -q[i];
        for j in 0..k {
            if !free_mask[j] {
                b -= p[i * k + j] * x[j];
            }
        }
        rhs[r] = b;
        for (c, &j) in free.iter().enumerate() {
            mat[r * dim + c] = p[i * k + j];
        }
        mat[r * dim + r] += ridge;
        if let Some(row) = active_row {
            mat[r * dim + nf] = row.a[i];
            mat[nf * dim + r] = row.a[i];
        }
    }
    if let Some(row) = active_row {
        let fixed_activity: f64 = (0..k)
            .filter(|&j| !free_mask[j])
            .map(|j| row.a[j] * x[j])
            .sum();
        rhs[nf] = row.rhs - fixed_activity;
    }

    let solved = solve_dense(mat, rhs, dim)?;
    let mut candidate = x.to_vec();
    for (r, &i) in free.iter().enumerate() {
        let value = solved[r];
        let lo = bounds.lower[i];
        let hi = bounds.upper[i];
        if value < lo - eps * (1.0 + lo.abs()) || value > hi + eps * (1.0 + hi.abs()) {
            return None;
        }
        candidate[i] = value;
    }
    if let Some(c) = coupling {
        if c.relation == Relation::AtMost && dot(c.a, &candidate) > c.rhs + eps * (1.0 + c.rhs.abs())
        {
            return None;
        }
    }

    let candidate = project(&candidate, bounds, coupling, cfg.projection_iters);
    let before = quadratic_value(p, q, x);
    let after = quadratic_value(p, q, &candidate);
    (after <= before + 1e-12 * (1.0 + before.abs())).then_some(candidate)
}

/// Convex QP over a box and at most one linear row: FISTA with adaptive restart,
/// periodically polished by an active-set KKT solve.
pub(super) fn solve_quadratic(model: &Model, cfg: &SolverConfig, deadline: &Deadline) -> Solution {
    let k = model.width();
    let Objective::Quadratic { p, q, constant } = &model.objective else {
        return Solution::failed(SolveStatus::SolverError, k, 0);
    };
    if model.constraints.len() > 1 {
        tracing::debug!(
            rows = model.constraints.len(),
            "quadratic path supports at most one linear row"
        );
        return Solution::failed(SolveStatus::SolverError, k, 0);
    }

    let bounds = BoxBounds {
        lower: model.lower.clone(),
        upper: model.upper.clone(),
    };
    let coupling = model.constraints.first().map(|row| Coupling {
        a: &row.coefficients,
        relation: row.relation,
        rhs: row.rhs,
    });
    if let Some(c) = coupling.as_ref() {
        if !coupling_feasible(c, &bounds) {
            return Solution::failed(SolveStatus::Infeasible, k, 0);
        }
    }

    let lipschitz = gershgorin_bound(p, k).max(cfg.hess_floor * (1.0 + max_abs(q)));
    let step = 1.0 / lipschitz;

    let mut x = project(&bounds.lower, &bounds, coupling.as_ref(), cfg.projection_iters);
    let mut y = x.clone();
    let mut t = 1.0_f64;
    let mut iterations = 0usize;
    let mut converged = false;
    let mut residual = f64::INFINITY;
    let check_every = cfg.qp_check_every.max(1);

    while iterations < cfg.qp_max_iters {
        if deadline.expired() {
            return Solution::failed(SolveStatus::Cancelled, k, iterations);
        }
        iterations += 1;

        let g = gradient(p, q, &y);
        let trial: Vec<f64> = y.iter().zip(g.iter()).map(|(&yi, &gi)| yi - step * gi).collect();
        let x_next = project(&trial, &bounds, coupling.as_ref(), cfg.projection_iters);
        if x_next.iter().any(|v| !v.is_finite()) {
            return Solution::failed(SolveStatus::SolverError, k, iterations);
        }
        if max_abs(&x_next) > cfg.divergence_limit {
            return Solution::failed(SolveStatus::Unbounded, k, iterations);
        }

        let restart = y
            .iter()
            .zip(x_next.iter())
            .zip(x.iter())
            .map(|((&yi, &xn), &xi)| (yi - xn) * (xn - xi))
            .sum::<f64>()
            > 0.0;
        let t_next = 0.5 * (1.0 + (1.0 + 4.0 * t * t).sqrt());
        if restart {
            y = x_next.clone();
            t = 1.0;
        } else {
            let momentum = (t - 1.0) / t_next;
            y = x_next
                .iter()
                .zip(x.iter())
                .map(|(&xn, &xi)| xn + momentum * (xn - xi))
                .collect();
            t = t_next;
        }
        x = x_next;

        if iterations % check_every == 0 || iterations == cfg.qp_max_iters {
            if let Some(polished) = polish(p, q, &x, &bounds, coupling.as_ref(), cfg) {
                x = polished;
                y = x.clone();
                t = 1.0;
            }
            residual =
                stationarity_residual(p, q, &x, step, &bounds, coupling.as_ref(), cfg);
            if residual <= cfg.qp_tol * (1.0 + max_abs(&x)) {
                converged = true;
                break;
            }
        }
    }

    let scale = 1.0 + max_abs(&x);
    let status = if converged {
        SolveStatus::Optimal
    } else if residual <= cfg.qp_tol * cfg.qp_inaccurate_factor * scale {
        tracing::warn!(residual, iterations, "quadratic solve stopped short of tolerance");
        SolveStatus::OptimalInaccurate
    } else {
        SolveStatus::SolverError
    };

    Solution {
        objective: quadratic_value(p, q, &x) + constant,
        values: x,
        status,
        iterations,
    }
}

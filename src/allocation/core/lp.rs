use good_lp::{
    Expression, ProblemVariables, ResolutionError, Solution as _, SolverModel, Variable, microlp,
    variable,
};

use super::model::{Model, Objective, Relation, Solution, SolveStatus, dot};

/// Linear objectives go through `good_lp` with the pure-Rust microlp backend.
pub(super) fn solve_linear(model: &Model) -> Solution {
    let k = model.width();
    let Objective::Linear { c } = &model.objective else {
        return Solution::failed(SolveStatus::SolverError, k, 0);
    };

    let mut vars = ProblemVariables::new();
    let columns: Vec<Variable> = model
        .lower
        .iter()
        .zip(model.upper.iter())
        .map(|(&lo, &hi)| {
            let def = variable().min(lo);
            if hi.is_finite() {
                vars.add(def.max(hi))
            } else {
                vars.add(def)
            }
        })
        .collect();

    let mut objective = Expression::with_capacity(k);
    for (&cost, &col) in c.iter().zip(columns.iter()) {
        if cost != 0.0 {
            objective.add_mul(cost, col);
        }
    }

    let mut problem = vars.minimise(objective).using(microlp);
    for row in &model.constraints {
        let mut lhs = Expression::with_capacity(k);
        for (&coef, &col) in row.coefficients.iter().zip(columns.iter()) {
            if coef != 0.0 {
                lhs.add_mul(coef, col);
            }
        }
        problem = match row.relation {
            Relation::Equal => problem.with(lhs.eq(row.rhs)),
            Relation::AtMost => problem.with(lhs.leq(row.rhs)),
        };
    }

    match problem.solve() {
        Ok(solution) => {
            let values: Vec<f64> = columns.iter().map(|&col| solution.value(col)).collect();
            Solution {
                objective: dot(c, &values),
                values,
                status: SolveStatus::Optimal,
                iterations: 0,
            }
        }
        Err(ResolutionError::Infeasible) => Solution::failed(SolveStatus::Infeasible, k, 0),
        Err(ResolutionError::Unbounded) => Solution::failed(SolveStatus::Unbounded, k, 0),
        Err(err) => {
            tracing::debug!(%err, "linear backend failed");
            Solution::failed(SolveStatus::SolverError, k, 0)
        }
    }
}

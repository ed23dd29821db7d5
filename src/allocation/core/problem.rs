use super::error::AllocError;
use super::model::dot;

const SHARE_SUM_TOL: f64 = 1e-6;

/// Row-major `problems x categories` matrix of coverage coefficients.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl CoverageMatrix {
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self, AllocError> {
        let n = rows.len();
        let m = rows.first().map(Vec::len).unwrap_or(0);
        if let Some(bad) = rows.iter().position(|row| row.len() != m) {
            return Err(AllocError::input(format!(
                "coverage row {bad} has {} entries, expected {m}",
                rows[bad].len()
            )));
        }
        Self::from_row_major(n, m, rows.into_iter().flatten().collect())
    }

    pub fn from_row_major(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self, AllocError> {
        if rows == 0 || cols == 0 {
            return Err(AllocError::input(
                "coverage matrix needs at least one problem and one category",
            ));
        }
        if data.len() != rows * cols {
            return Err(AllocError::input(format!(
                "coverage data has {} entries, expected {rows}x{cols}",
                data.len()
            )));
        }
        if data.iter().any(|v| !v.is_finite()) {
            return Err(AllocError::input("coverage coefficients must be finite"));
        }
        Ok(Self { rows, cols, data })
    }

    /// Number of problems (rows).
    pub fn problems(&self) -> usize {
        self.rows
    }

    /// Number of budget categories (columns).
    pub fn categories(&self) -> usize {
        self.cols
    }

    pub fn get(&self, problem: usize, category: usize) -> f64 {
        self.data[problem * self.cols + category]
    }

    pub fn row(&self, problem: usize) -> &[f64] {
        &self.data[problem * self.cols..(problem + 1) * self.cols]
    }

    /// `A x`: per-problem exposure produced by a category allocation.
    pub fn apply(&self, allocation: &[f64]) -> Vec<f64> {
        (0..self.rows).map(|i| dot(self.row(i), allocation)).collect()
    }

    /// `A' y`: problem-space vector folded back onto categories.
    pub fn transpose_apply(&self, per_problem: &[f64]) -> Vec<f64> {
        let mut out = vec![0.0_f64; self.cols];
        for (i, &yi) in per_problem.iter().enumerate().take(self.rows) {
            for (o, &a) in out.iter_mut().zip(self.row(i)) {
                *o += a * yi;
            }
        }
        out
    }

    /// `A' diag(w) A`, dense `categories x categories`.
    pub(crate) fn weighted_gram(&self, weights: &[f64]) -> Vec<f64> {
        let m = self.cols;
        let mut gram = vec![0.0_f64; m * m];
        for (i, &w) in weights.iter().enumerate().take(self.rows) {
            let row = self.row(i);
            for a in 0..m {
                let scaled = w * row[a];
                if scaled == 0.0 {
                    continue;
                }
                for b in 0..m {
                    gram[a * m + b] += scaled * row[b];
                }
            }
        }
        gram
    }

    /// `A r` minus `target`.
    pub fn residuals(&self, allocation: &[f64], target: &[f64]) -> Vec<f64> {
        self.apply(allocation)
            .into_iter()
            .zip(target.iter())
            .map(|(cover, y)| cover - y)
            .collect()
    }
}

/// Where per-problem targets come from.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetSource {
    /// Raw importance or mention counts; normalized by their sum.
    Counts(Vec<f64>),
    /// Already-normalized shares that sum to one.
    Shares(Vec<f64>),
}

impl TargetSource {
    pub fn values(&self) -> &[f64] {
        match self {
            Self::Counts(values) | Self::Shares(values) => values,
        }
    }
}

/// `y = (c / sum(c)) * budget`, or `shares * budget`.
pub fn derive_target(source: &TargetSource, budget: f64) -> Result<Vec<f64>, AllocError> {
    let values = source.values();
    if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
        return Err(AllocError::input(
            "importance values must be finite and nonnegative",
        ));
    }
    let total: f64 = values.iter().sum();
    if total <= 0.0 {
        return Err(AllocError::input("importance vector sums to zero"));
    }
    match source {
        TargetSource::Counts(counts) => Ok(counts.iter().map(|c| c / total * budget).collect()),
        TargetSource::Shares(shares) => {
            if (total - 1.0).abs() > SHARE_SUM_TOL {
                return Err(AllocError::input(format!(
                    "target shares sum to {total}, expected 1"
                )));
            }
            Ok(shares.iter().map(|s| s * budget).collect())
        }
    }
}

fn check_vector(label: &str, values: &[f64], expected: usize) -> Result<(), AllocError> {
    if values.len() != expected {
        return Err(AllocError::input(format!(
            "{label} has {} entries, expected {expected}",
            values.len()
        )));
    }
    if values.iter().any(|v| v.is_nan() || *v < 0.0) {
        return Err(AllocError::input(format!(
            "{label} entries must be nonnegative numbers"
        )));
    }
    Ok(())
}

/// A validated allocation instance. The target vector is derived once here and
/// shared by every strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationProblem {
    coverage: CoverageMatrix,
    importance: Vec<f64>,
    budget: f64,
    floors: Vec<f64>,
    caps: Option<Vec<f64>>,
    weights: Vec<f64>,
    reference_shares: Vec<f64>,
    target: Vec<f64>,
}

impl AllocationProblem {
    pub fn new(
        coverage: CoverageMatrix,
        source: TargetSource,
        budget: f64,
        floors: Option<Vec<f64>>,
    ) -> Result<Self, AllocError> {
        let n = coverage.problems();
        let m = coverage.categories();
        if !budget.is_finite() || budget <= 0.0 {
            return Err(AllocError::input(format!(
                "budget must be positive and finite, got {budget}"
            )));
        }
        if source.values().len() != n {
            return Err(AllocError::input(format!(
                "importance has {} entries, coverage has {n} problems",
                source.values().len()
            )));
        }
        let target = derive_target(&source, budget)?;

        let floors = floors.unwrap_or_else(|| vec![0.0; m]);
        check_vector("floors", &floors, m)?;
        if floors.iter().any(|f| !f.is_finite()) {
            return Err(AllocError::input("floors must be finite"));
        }
        let floor_sum: f64 = floors.iter().sum();
        if floor_sum > budget {
            return Err(AllocError::input(format!(
                "floors sum to {floor_sum}, exceeding the budget {budget}"
            )));
        }

        let importance = match source {
            TargetSource::Counts(values) | TargetSource::Shares(values) => values,
        };

        Ok(Self {
            coverage,
            importance,
            budget,
            floors,
            caps: None,
            weights: vec![1.0 / n as f64; n],
            reference_shares: vec![1.0 / m as f64; m],
            target,
        })
    }

    /// Per-category spending caps. Infinite entries leave a category uncapped.
    pub fn with_caps(mut self, caps: Vec<f64>) -> Result<Self, AllocError> {
        check_vector("caps", &caps, self.categories())?;
        if let Some(j) = (0..caps.len()).find(|&j| caps[j] < self.floors[j]) {
            return Err(AllocError::input(format!(
                "cap {} of category {j} is below its floor {}",
                caps[j], self.floors[j]
            )));
        }
        self.caps = Some(caps);
        Ok(self)
    }

    pub fn with_problem_weights(mut self, weights: Vec<f64>) -> Result<Self, AllocError> {
        check_vector("problem weights", &weights, self.problems())?;
        if weights.iter().any(|w| !w.is_finite()) {
            return Err(AllocError::input("problem weights must be finite"));
        }
        self.weights = weights;
        Ok(self)
    }

    /// Priority distribution over categories used as the Pareto reference and
    /// the default L2 prior.
    pub fn with_reference_shares(mut self, shares: Vec<f64>) -> Result<Self, AllocError> {
        check_vector("reference shares", &shares, self.categories())?;
        if shares.iter().any(|w| !w.is_finite()) {
            return Err(AllocError::input("reference shares must be finite"));
        }
        self.reference_shares = shares;
        Ok(self)
    }

    pub fn coverage(&self) -> &CoverageMatrix {
        &self.coverage
    }

    pub fn problems(&self) -> usize {
        self.coverage.problems()
    }

    pub fn categories(&self) -> usize {
        self.coverage.categories()
    }

    pub fn importance(&self) -> &[f64] {
        &self.importance
    }

    pub fn budget(&self) -> f64 {
        self.budget
    }

    pub fn floors(&self) -> &[f64] {
        &self.floors
    }

    pub fn caps(&self) -> Option<&[f64]> {
        self.caps.as_deref()
    }

    /// Upper bound per category, `+inf` where uncapped.
    pub fn upper_bounds(&self) -> Vec<f64> {
        self.caps
            .clone()
            .unwrap_or_else(|| vec![f64::INFINITY; self.categories()])
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn reference_shares(&self) -> &[f64] {
        &self.reference_shares
    }

    pub fn target(&self) -> &[f64] {
        &self.target
    }

    /// Reference allocation `w * budget`.
    pub fn reference_allocation(&self) -> Vec<f64> {
        self.reference_shares
            .iter()
            .map(|w| w * self.budget)
            .collect()
    }
}

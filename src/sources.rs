use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::allocation::{AllocError, AllocationProblem, CoverageMatrix, TargetSource};

pub const PROBLEMS_FILE: &str = "problems.csv";
pub const CATEGORIES_FILE: &str = "categories.csv";
pub const COVERAGE_FILE: &str = "coverage.csv";

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("data directory {path} is unreadable: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{file} row {row}: {source}")]
    Csv {
        file: String,
        row: usize,
        #[source]
        source: csv::Error,
    },

    #[error("report '{0}' has no problems")]
    EmptyReport(String),

    #[error("no budget categories are defined")]
    NoCategories,

    #[error("duplicate {kind} '{name}'")]
    Duplicate { kind: &'static str, name: String },

    #[error("report '{report}' references unknown category '{name}'")]
    UnknownCategory { report: String, name: String },

    #[error("report '{report}' references unknown problem '{name}'")]
    UnknownProblem { report: String, name: String },

    #[error(transparent)]
    Problem(#[from] AllocError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProblemRecord {
    pub name: String,
    pub importance: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CategoryRecord {
    pub name: String,
    pub floor: f64,
    #[serde(default)]
    pub cap: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoverageRecord {
    pub category: String,
    pub problem: String,
    pub coefficient: f64,
}

/// A problem instance together with the row and column labels it was built from.
#[derive(Debug, Clone)]
pub struct LoadedProblem {
    pub report: String,
    pub problem_names: Vec<String>,
    pub category_names: Vec<String>,
    pub problem: AllocationProblem,
    /// Coverage pairs listed more than once; the last listing wins.
    pub duplicate_pairs: usize,
}

fn index_names<'a>(
    kind: &'static str,
    names: impl Iterator<Item = &'a str>,
) -> Result<HashMap<String, usize>, SourceError> {
    let mut index = HashMap::new();
    for (i, name) in names.enumerate() {
        if index.insert(name.to_string(), i).is_some() {
            return Err(SourceError::Duplicate {
                kind,
                name: name.to_string(),
            });
        }
    }
    Ok(index)
}

pub trait AllocationSource {
    /// Report ids in first-seen order.
    fn reports(&self) -> Result<Vec<String>, SourceError>;

    fn problems(&self, report: &str) -> Result<Vec<ProblemRecord>, SourceError>;

    fn categories(&self) -> Result<Vec<CategoryRecord>, SourceError>;

    fn coverage(&self, report: &str) -> Result<Vec<CoverageRecord>, SourceError>;

    /// Assemble the coverage matrix in problem x category order. Pairs without a
    /// coverage row stay at zero.
    fn load_problem(&self, report: &str, budget: f64) -> Result<LoadedProblem, SourceError> {
        let problems = self.problems(report)?;
        if problems.is_empty() {
            return Err(SourceError::EmptyReport(report.to_string()));
        }
        let categories = self.categories()?;
        if categories.is_empty() {
            return Err(SourceError::NoCategories);
        }

        let problem_index = index_names("problem", problems.iter().map(|p| p.name.as_str()))?;
        let category_index =
            index_names("category", categories.iter().map(|c| c.name.as_str()))?;

        let n = problems.len();
        let m = categories.len();
        let mut data = vec![0.0_f64; n * m];
        let mut seen = HashSet::new();
        let mut duplicate_pairs = 0;
        for record in self.coverage(report)? {
            let Some(&i) = problem_index.get(&record.problem) else {
                return Err(SourceError::UnknownProblem {
                    report: report.to_string(),
                    name: record.problem,
                });
            };
            let Some(&j) = category_index.get(&record.category) else {
                return Err(SourceError::UnknownCategory {
                    report: report.to_string(),
                    name: record.category,
                });
            };
            if !seen.insert((i, j)) {
                duplicate_pairs += 1;
                tracing::warn!(
                    report,
                    problem = %record.problem,
                    category = %record.category,
                    "coverage pair listed twice; keeping the last value"
                );
            }
            data[i * m + j] = record.coefficient;
        }

        let coverage = CoverageMatrix::from_row_major(n, m, data)?;
        let importance = problems.iter().map(|p| p.importance).collect();
        let floors = categories.iter().map(|c| c.floor).collect();
        let mut problem = AllocationProblem::new(
            coverage,
            TargetSource::Counts(importance),
            budget,
            Some(floors),
        )?;
        if categories.iter().any(|c| c.cap.is_some()) {
            let caps = categories
                .iter()
                .map(|c| c.cap.unwrap_or(f64::INFINITY))
                .collect();
            problem = problem.with_caps(caps)?;
        }

        Ok(LoadedProblem {
            report: report.to_string(),
            problem_names: problems.into_iter().map(|p| p.name).collect(),
            category_names: categories.into_iter().map(|c| c.name).collect(),
            problem,
            duplicate_pairs,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ProblemRow {
    report_id: String,
    name: String,
    importance: f64,
}

#[derive(Debug, Deserialize)]
struct CoverageRow {
    report_id: String,
    category: String,
    problem: String,
    coefficient: f64,
}

/// Reads `problems.csv`, `categories.csv` and `coverage.csv` from one directory.
/// Files are re-read on every call.
#[derive(Debug, Clone)]
pub struct CsvSource {
    dir: PathBuf,
}

impl CsvSource {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, SourceError> {
        let dir = dir.into();
        std::fs::metadata(&dir).map_err(|source| SourceError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read_rows<T: DeserializeOwned>(&self, file: &str) -> Result<Vec<T>, SourceError> {
        let csv_error = |row: usize, source: csv::Error| SourceError::Csv {
            file: file.to_string(),
            row,
            source,
        };
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(self.dir.join(file))
            .map_err(|source| csv_error(0, source))?;
        let mut rows = Vec::new();
        for (i, result) in reader.deserialize().enumerate() {
            // 1-indexed, after the header
            rows.push(result.map_err(|source| csv_error(i + 2, source))?);
        }
        Ok(rows)
    }
}

impl AllocationSource for CsvSource {
    fn reports(&self) -> Result<Vec<String>, SourceError> {
        let rows: Vec<ProblemRow> = self.read_rows(PROBLEMS_FILE)?;
        let mut reports: Vec<String> = Vec::new();
        for row in rows {
            if !reports.contains(&row.report_id) {
                reports.push(row.report_id);
            }
        }
        Ok(reports)
    }

    fn problems(&self, report: &str) -> Result<Vec<ProblemRecord>, SourceError> {
        let rows: Vec<ProblemRow> = self.read_rows(PROBLEMS_FILE)?;
        Ok(rows
            .into_iter()
            .filter(|row| row.report_id == report)
            .map(|row| ProblemRecord {
                name: row.name,
                importance: row.importance,
            })
            .collect())
    }

    fn categories(&self) -> Result<Vec<CategoryRecord>, SourceError> {
        self.read_rows(CATEGORIES_FILE)
    }

    fn coverage(&self, report: &str) -> Result<Vec<CoverageRecord>, SourceError> {
        let rows: Vec<CoverageRow> = self.read_rows(COVERAGE_FILE)?;
        Ok(rows
            .into_iter()
            .filter(|row| row.report_id == report)
            .map(|row| CoverageRecord {
                category: row.category,
                problem: row.problem,
                coefficient: row.coefficient,
            })
            .collect())
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    problems: Vec<(String, ProblemRecord)>,
    categories: Vec<CategoryRecord>,
    coverage: Vec<(String, CoverageRecord)>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_category(mut self, name: &str, floor: f64, cap: Option<f64>) -> Self {
        self.categories.push(CategoryRecord {
            name: name.to_string(),
            floor,
            cap,
        });
        self
    }

    pub fn with_problem(mut self, report: &str, name: &str, importance: f64) -> Self {
        self.problems.push((
            report.to_string(),
            ProblemRecord {
                name: name.to_string(),
                importance,
            },
        ));
        self
    }

    pub fn with_coverage(
        mut self,
        report: &str,
        category: &str,
        problem: &str,
        coefficient: f64,
    ) -> Self {
        self.coverage.push((
            report.to_string(),
            CoverageRecord {
                category: category.to_string(),
                problem: problem.to_string(),
                coefficient,
            },
        ));
        self
    }
}

impl AllocationSource for InMemorySource {
    fn reports(&self) -> Result<Vec<String>, SourceError> {
        let mut reports: Vec<String> = Vec::new();
        for (report, _) in &self.problems {
            if !reports.contains(report) {
                reports.push(report.clone());
            }
        }
        Ok(reports)
    }

    fn problems(&self, report: &str) -> Result<Vec<ProblemRecord>, SourceError> {
        Ok(self
            .problems
            .iter()
            .filter(|(id, _)| id == report)
            .map(|(_, record)| record.clone())
            .collect())
    }

    fn categories(&self) -> Result<Vec<CategoryRecord>, SourceError> {
        Ok(self.categories.clone())
    }

    fn coverage(&self, report: &str) -> Result<Vec<CoverageRecord>, SourceError> {
        Ok(self
            .coverage
            .iter()
            .filter(|(id, _)| id == report)
            .map(|(_, record)| record.clone())
            .collect())
    }
}

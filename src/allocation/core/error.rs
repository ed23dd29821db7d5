use std::fmt;

use serde::Serialize;

use super::model::SolveStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LexPhase {
    One,
    Two,
}

impl fmt::Display for LexPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::One => f.write_str("1 (coverage)"),
            Self::Two => f.write_str("2 (utilization)"),
        }
    }
}

/// Typed failures surfaced by every allocation entry point. None are retried.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AllocError {
    #[error("infeasible input: {reason}")]
    InfeasibleInput { reason: String },

    #[error("{context} optimization failed with solver status '{status}'")]
    OptimizationFailed {
        status: SolveStatus,
        context: &'static str,
    },

    #[error("lexicographic phase {phase} failed with solver status '{status}'")]
    LexicographicPhase { phase: LexPhase, status: SolveStatus },

    #[error("a grid of {grains} grains cannot cover category floors needing {required} grains")]
    InfeasibleDiscretization { grains: usize, required: usize },

    #[error("pareto scan produced no successful samples out of {samples}")]
    EmptyFrontier { samples: usize },
}

impl AllocError {
    pub(crate) fn input(reason: impl Into<String>) -> Self {
        Self::InfeasibleInput {
            reason: reason.into(),
        }
    }

    /// Solver status attached to the failure, when there is one.
    pub fn status(&self) -> Option<SolveStatus> {
        match self {
            Self::OptimizationFailed { status, .. } | Self::LexicographicPhase { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }
}

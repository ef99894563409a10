//! Error types for progression testing

use thiserror::Error;

/// Failures raised by the weighted statistics and the permutation engine.
///
/// Driver methods on [`crate::testing::inference::TrajectoryStatTests`] wrap these in
/// `anyhow` context naming the lineage, so callers can still `downcast_ref` to this type.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProgressionError {
    #[error("Dimension mismatch for {what}: expected {expected}, got {got}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("Negative or non-finite weight {weight} for cell {cell} on lineage {lineage}")]
    NegativeWeight {
        cell: usize,
        lineage: usize,
        weight: f64,
    },

    #[error("Cell {cell} has positive weight on lineage {lineage} but no finite pseudotime")]
    MissingPseudotime { cell: usize, lineage: usize },

    #[error("Exactly two condition levels are required, found {found}")]
    LevelCount { found: usize },

    #[error("Lineage {lineage} out of range for a trajectory with {n_lineages} lineages")]
    LineageOutOfRange { lineage: usize, n_lineages: usize },

    #[error("Undefined weighted mean: condition {label} has zero total weight")]
    UndefinedWeightedMean { label: usize },

    #[error("Weighted mean for condition {label} is not finite")]
    NonFiniteMean { label: usize },

    #[error("Insufficient permutations: requested {requested}, completed {completed}")]
    InsufficientPermutations { requested: usize, completed: usize },
}

/// Result type alias for the numerical core
pub type Result<T> = std::result::Result<T, ProgressionError>;

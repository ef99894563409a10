//! # single-progression
//!
//! Condition-wise progression tests along single-cell trajectory lineages, part of the single-rust ecosystem.
//!
//! Given the pseudotime and curve-weight matrices of a fitted trajectory (cells × lineages) and a
//! two-level condition label per cell, this crate tests, lineage by lineage, whether cells of the two
//! conditions progress differently along that lineage.
//!
//! ## Core Features
//!
//! - **Weighted permutation test**: difference of weighted mean pseudotime between conditions, with an
//!   empirical null distribution from shuffled condition labels
//! - **Weighted Kolmogorov-Smirnov test**: distance between weighted pseudotime distributions
//! - **Reproducible parallel sampling**: permutations are split across seeded ChaCha streams and run on rayon
//! - **Dense and sparse input**: `ndarray` matrices or `CsrMatrix` from nalgebra-sparse
//!
//! Cells with zero weight on a lineage are excluded from every computation on that lineage; their
//! pseudotime may be NaN.
//!
//! ## Quick Start
//!
//! Build a [`trajectory::Trajectory`] from the pseudotime and weight matrices, then use the
//! [`testing::inference::TrajectoryStatTests`] trait to test one lineage or all of them.
//!
//! ## Module Organization
//!
//! - **[`trajectory`]**: Validated pseudotime/weight matrices and per-lineage views
//! - **[`testing`]**: Weighted statistics, the permutation engine, KS test and result types
//! - **[`error`]**: Typed errors raised by the numerical core

pub mod error;
pub mod testing;
pub mod trajectory;

pub use error::ProgressionError;
pub use testing::inference::{PermutationTest, TrajectoryStatTests};
pub use testing::{LineageTestResults, PartialPolicy, PermutationConfig, TestMethod, TestResult};
pub use trajectory::{LineageView, Trajectory};

//! Per-cell, per-lineage pseudotime and curve weights produced by a trajectory-inference method.
//!
//! The matrices are cells × lineages. A weight of zero means the cell is not assigned to the
//! lineage, and its pseudotime for that lineage is treated as missing: it is never read by any
//! statistic in this crate, so it may hold NaN or any other placeholder.

use crate::error::{ProgressionError, Result};
use nalgebra_sparse::CsrMatrix;
use ndarray::{Array2, ArrayView1, ArrayView2};
use single_utilities::traits::FloatOpsTS;

/// Pseudotime and weight matrices for a fitted trajectory.
#[derive(Debug, Clone)]
pub struct Trajectory {
    pseudotime: Array2<f64>,
    weights: Array2<f64>,
}

impl Trajectory {
    /// Build a trajectory from dense cells × lineages matrices.
    ///
    /// Weights must be finite and non-negative. Any cell with a positive weight on a lineage must
    /// carry a finite pseudotime for that lineage; entries with zero weight are left unchecked.
    pub fn new<T>(pseudotime: ArrayView2<T>, weights: ArrayView2<T>) -> Result<Self>
    where
        T: FloatOpsTS,
    {
        if pseudotime.nrows() != weights.nrows() {
            return Err(ProgressionError::DimensionMismatch {
                what: "weight matrix rows",
                expected: pseudotime.nrows(),
                got: weights.nrows(),
            });
        }
        if pseudotime.ncols() != weights.ncols() {
            return Err(ProgressionError::DimensionMismatch {
                what: "weight matrix lineages",
                expected: pseudotime.ncols(),
                got: weights.ncols(),
            });
        }

        let pseudotime = pseudotime.mapv(to_f64);
        let weights = weights.mapv(to_f64);

        let trajectory = Trajectory {
            pseudotime,
            weights,
        };
        trajectory.validate()?;
        Ok(trajectory)
    }

    /// Build a trajectory from sparse cells × lineages matrices.
    ///
    /// Entries absent from `weights` are zero weights; entries absent from `pseudotime` are
    /// undefined and only allowed where the weight is zero.
    pub fn from_csr<T>(pseudotime: &CsrMatrix<T>, weights: &CsrMatrix<T>) -> Result<Self>
    where
        T: FloatOpsTS,
    {
        if pseudotime.nrows() != weights.nrows() {
            return Err(ProgressionError::DimensionMismatch {
                what: "weight matrix rows",
                expected: pseudotime.nrows(),
                got: weights.nrows(),
            });
        }
        if pseudotime.ncols() != weights.ncols() {
            return Err(ProgressionError::DimensionMismatch {
                what: "weight matrix lineages",
                expected: pseudotime.ncols(),
                got: weights.ncols(),
            });
        }

        let shape = (weights.nrows(), weights.ncols());
        let mut dense_pt = Array2::from_elem(shape, f64::NAN);
        let mut dense_w = Array2::zeros(shape);

        for (row, col, value) in pseudotime.triplet_iter() {
            dense_pt[[row, col]] = to_f64(*value);
        }
        for (row, col, value) in weights.triplet_iter() {
            dense_w[[row, col]] = to_f64(*value);
        }

        let trajectory = Trajectory {
            pseudotime: dense_pt,
            weights: dense_w,
        };
        trajectory.validate()?;
        Ok(trajectory)
    }

    fn validate(&self) -> Result<()> {
        for ((cell, lineage), &w) in self.weights.indexed_iter() {
            check_entry(cell, lineage, w, || self.pseudotime[[cell, lineage]])?;
        }
        Ok(())
    }

    pub fn n_cells(&self) -> usize {
        self.weights.nrows()
    }

    pub fn n_lineages(&self) -> usize {
        self.weights.ncols()
    }

    pub fn pseudotime(&self) -> ArrayView2<'_, f64> {
        self.pseudotime.view()
    }

    pub fn weights(&self) -> ArrayView2<'_, f64> {
        self.weights.view()
    }

    /// Borrow a single lineage.
    pub fn lineage(&self, lineage: usize) -> Result<LineageView<'_>> {
        if lineage >= self.n_lineages() {
            return Err(ProgressionError::LineageOutOfRange {
                lineage,
                n_lineages: self.n_lineages(),
            });
        }
        Ok(LineageView {
            lineage,
            pseudotime: self.pseudotime.column(lineage),
            weights: self.weights.column(lineage),
        })
    }
}

/// Values that cannot be represented as f64 become NaN and are rejected where the weight is positive.
fn to_f64<T: FloatOpsTS>(value: T) -> f64 {
    num_traits::cast(value).unwrap_or(f64::NAN)
}

/// Shared entry rule: weights finite and >= 0, positive weight implies finite pseudotime.
/// The pseudotime is only looked up once the weight is known to be positive.
fn check_entry<F>(cell: usize, lineage: usize, weight: f64, pseudotime: F) -> Result<()>
where
    F: FnOnce() -> f64,
{
    if !weight.is_finite() || weight < 0.0 {
        return Err(ProgressionError::NegativeWeight {
            cell,
            lineage,
            weight,
        });
    }
    if weight > 0.0 && !pseudotime().is_finite() {
        return Err(ProgressionError::MissingPseudotime { cell, lineage });
    }
    Ok(())
}

/// Validated pseudotime and weights of one lineage.
#[derive(Debug, Clone, Copy)]
pub struct LineageView<'a> {
    lineage: usize,
    pseudotime: ArrayView1<'a, f64>,
    weights: ArrayView1<'a, f64>,
}

impl<'a> LineageView<'a> {
    /// Wrap plain vectors as a standalone lineage (reported as lineage 0).
    pub fn from_slices(pseudotime: &'a [f64], weights: &'a [f64]) -> Result<Self> {
        if pseudotime.len() != weights.len() {
            return Err(ProgressionError::DimensionMismatch {
                what: "weight vector",
                expected: pseudotime.len(),
                got: weights.len(),
            });
        }
        for (cell, &w) in weights.iter().enumerate() {
            check_entry(cell, 0, w, || pseudotime[cell])?;
        }
        Ok(LineageView {
            lineage: 0,
            pseudotime: ArrayView1::from(pseudotime),
            weights: ArrayView1::from(weights),
        })
    }

    pub fn lineage(&self) -> usize {
        self.lineage
    }

    pub fn n_cells(&self) -> usize {
        self.weights.len()
    }

    pub fn pseudotime(&self) -> ArrayView1<'a, f64> {
        self.pseudotime
    }

    pub fn weights(&self) -> ArrayView1<'a, f64> {
        self.weights
    }

    /// Cells with positive weight, as `(cell, pseudotime, weight)`.
    ///
    /// Zero-weight cells are filtered on the weight alone; their pseudotime is never touched.
    pub fn active_cells(&self) -> impl Iterator<Item = (usize, f64, f64)> + '_ {
        self.weights
            .iter()
            .enumerate()
            .filter(|&(_, &w)| w > 0.0)
            .map(move |(cell, &w)| (cell, self.pseudotime[cell], w))
    }

    /// Largest weight on the lineage, 0 when no cell is assigned.
    pub fn max_weight(&self) -> f64 {
        self.weights.iter().fold(0.0, |acc: f64, &w| acc.max(w))
    }

    /// Like [`active_cells`](Self::active_cells), with weights divided by the lineage's largest
    /// weight. Weighted means are unchanged and every weight sum stays at or below `n_cells`.
    pub fn scaled_active_cells(&self) -> impl Iterator<Item = (usize, f64, f64)> + '_ {
        let max_weight = self.max_weight();
        self.active_cells()
            .map(move |(cell, pt, w)| (cell, pt, w / max_weight))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra_sparse::CooMatrix;
    use ndarray::array;

    #[test]
    fn test_new_accepts_nan_on_zero_weight() {
        let pt = array![[0.1, f64::NAN], [0.5, 0.7]];
        let w = array![[1.0, 0.0], [0.5, 0.5]];
        let traj = Trajectory::new(pt.view(), w.view()).unwrap();
        assert_eq!(traj.n_cells(), 2);
        assert_eq!(traj.n_lineages(), 2);
    }

    #[test]
    fn test_new_rejects_bad_weights() {
        let pt = array![[0.1], [0.5]];
        let w = array![[1.0], [-0.5]];
        let err = Trajectory::new(pt.view(), w.view()).unwrap_err();
        assert!(matches!(
            err,
            ProgressionError::NegativeWeight { cell: 1, lineage: 0, .. }
        ));
    }

    #[test]
    fn test_new_rejects_missing_pseudotime_on_positive_weight() {
        let pt = array![[0.1], [f64::NAN]];
        let w = array![[1.0], [0.2]];
        let err = Trajectory::new(pt.view(), w.view()).unwrap_err();
        assert_eq!(err, ProgressionError::MissingPseudotime { cell: 1, lineage: 0 });
    }

    #[test]
    fn test_new_rejects_shape_mismatch() {
        let pt = array![[0.1, 0.2], [0.5, 0.6]];
        let w = array![[1.0], [1.0]];
        assert!(matches!(
            Trajectory::new(pt.view(), w.view()),
            Err(ProgressionError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_from_csr_missing_entries() {
        let mut pt = CooMatrix::new(3, 2);
        pt.push(0, 0, 0.2);
        pt.push(1, 0, 0.4);
        pt.push(2, 1, 0.9);
        let mut w = CooMatrix::new(3, 2);
        w.push(0, 0, 1.0);
        w.push(1, 0, 1.0);
        w.push(2, 1, 1.0);

        let traj = Trajectory::from_csr(&CsrMatrix::from(&pt), &CsrMatrix::from(&w)).unwrap();
        assert_eq!(traj.weights()[[2, 0]], 0.0);
        assert!(traj.pseudotime()[[2, 0]].is_nan());

        let lineage = traj.lineage(1).unwrap();
        let active: Vec<_> = lineage.active_cells().collect();
        assert_eq!(active, vec![(2, 0.9, 1.0)]);
    }

    #[test]
    fn test_from_csr_rejects_weight_without_pseudotime() {
        let pt: CooMatrix<f64> = CooMatrix::new(2, 1);
        let mut w = CooMatrix::new(2, 1);
        w.push(0, 0, 1.0);
        let err = Trajectory::from_csr(&CsrMatrix::from(&pt), &CsrMatrix::from(&w)).unwrap_err();
        assert_eq!(err, ProgressionError::MissingPseudotime { cell: 0, lineage: 0 });
    }

    #[test]
    fn test_lineage_out_of_range() {
        let pt = array![[0.1], [0.5]];
        let w = array![[1.0], [1.0]];
        let traj = Trajectory::new(pt.view(), w.view()).unwrap();
        assert_eq!(
            traj.lineage(3).unwrap_err(),
            ProgressionError::LineageOutOfRange {
                lineage: 3,
                n_lineages: 1
            }
        );
    }

    #[test]
    fn test_scaled_active_cells() {
        let pt = [0.1, f64::NAN, 0.5, 0.9];
        let w = [2.0, 0.0, 8.0, 4.0];
        let lineage = LineageView::from_slices(&pt, &w).unwrap();

        assert_eq!(lineage.max_weight(), 8.0);
        let scaled: Vec<(usize, f64, f64)> = lineage.scaled_active_cells().collect();
        assert_eq!(scaled, vec![(0, 0.1, 0.25), (2, 0.5, 1.0), (3, 0.9, 0.5)]);
    }
}

//! Weighted mean pseudotime per condition and the two-group difference statistic.
//!
//! Only cells with positive weight on the lineage enter the sums. The weight is checked first and
//! the pseudotime is read afterwards, so NaN placeholders on unassigned cells never reach the
//! arithmetic. Weights are divided by the lineage's largest weight before summing, which keeps the
//! weight sums bounded by the number of cells; a mean that still comes out non-finite is an error.

use crate::error::{ProgressionError, Result};
use crate::testing::utils::{check_label_length, two_levels};
use crate::trajectory::LineageView;

/// Weighted mean pseudotime of the cells labelled `group` on one lineage.
///
/// Fails with [`ProgressionError::UndefinedWeightedMean`] when the group has no weight on the
/// lineage, and with [`ProgressionError::NonFiniteMean`] when the sums overflow.
pub fn weighted_mean(lineage: &LineageView<'_>, group_ids: &[usize], group: usize) -> Result<f64> {
    check_label_length(group_ids, lineage.n_cells())?;

    let mut weighted_sum = 0.0;
    let mut weight_sum = 0.0;
    for (cell, pt, w) in lineage.scaled_active_cells() {
        if group_ids[cell] == group {
            weighted_sum += pt * w;
            weight_sum += w;
        }
    }

    finite_mean(weighted_sum, weight_sum, group)
}

fn finite_mean(weighted_sum: f64, weight_sum: f64, label: usize) -> Result<f64> {
    if weight_sum <= 0.0 {
        return Err(ProgressionError::UndefinedWeightedMean { label });
    }
    let mean = weighted_sum / weight_sum;
    if !mean.is_finite() {
        return Err(ProgressionError::NonFiniteMean { label });
    }
    Ok(mean)
}

/// Difference of weighted mean pseudotime between the first and second condition level.
///
/// `group_ids` must contain exactly two distinct ids; the lower id is the first level.
pub fn weighted_mean_difference(lineage: &LineageView<'_>, group_ids: &[usize]) -> Result<f64> {
    check_label_length(group_ids, lineage.n_cells())?;
    let levels = two_levels(group_ids)?;
    ActiveCells::new(lineage).mean_difference(group_ids, levels)
}

/// Compact copy of the positive-weight cells of a lineage.
///
/// The permutation engine evaluates the statistic thousands of times against the same lineage,
/// so products `pt * w` are formed once here, using the scaled weights.
#[derive(Debug, Clone)]
pub(crate) struct ActiveCells {
    cells: Vec<usize>,
    weighted_pseudotime: Vec<f64>,
    weights: Vec<f64>,
}

impl ActiveCells {
    pub(crate) fn new(lineage: &LineageView<'_>) -> Self {
        let mut cells = Vec::new();
        let mut weighted_pseudotime = Vec::new();
        let mut weights = Vec::new();
        for (cell, pt, w) in lineage.scaled_active_cells() {
            cells.push(cell);
            weighted_pseudotime.push(pt * w);
            weights.push(w);
        }
        ActiveCells {
            cells,
            weighted_pseudotime,
            weights,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.cells.len()
    }

    /// Statistic for one label assignment. `group_ids` is indexed by cell over the whole lineage.
    pub(crate) fn mean_difference(&self, group_ids: &[usize], levels: (usize, usize)) -> Result<f64> {
        let (mean_first, mean_second) = self.group_means(group_ids, levels)?;
        Ok(mean_first - mean_second)
    }

    pub(crate) fn group_means(
        &self,
        group_ids: &[usize],
        levels: (usize, usize),
    ) -> Result<(f64, f64)> {
        let (first, second) = levels;
        let mut sum_first = 0.0;
        let mut weight_first = 0.0;
        let mut sum_second = 0.0;
        let mut weight_second = 0.0;

        for ((&cell, &wpt), &w) in self
            .cells
            .iter()
            .zip(self.weighted_pseudotime.iter())
            .zip(self.weights.iter())
        {
            let label = group_ids[cell];
            if label == first {
                sum_first += wpt;
                weight_first += w;
            } else if label == second {
                sum_second += wpt;
                weight_second += w;
            }
        }

        let mean_first = finite_mean(sum_first, weight_first, first)?;
        let mean_second = finite_mean(sum_second, weight_second, second)?;
        Ok((mean_first, mean_second))
    }
}

//! Permutation test for a shift in weighted mean pseudotime between two conditions.
//!
//! The condition labels of all cells are shuffled, the pseudotime and weights stay fixed, and the
//! weighted mean difference is recomputed for every draw. Draws are split over a fixed number of
//! shards with independent ChaCha streams, so the null distribution depends only on the seed and
//! the shard count.

use crate::error::{ProgressionError, Result};
use crate::testing::config::{PartialPolicy, PermutationConfig};
use crate::testing::inference::weighted::ActiveCells;
use crate::testing::utils::{check_label_length, two_levels};
use crate::testing::TestResult;
use crate::trajectory::LineageView;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::iter::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator};
use statrs::distribution::{Beta, ContinuousCDF};
use std::time::Instant;
use tracing::{debug, warn};

/// Outcome of a permutation test on one lineage.
#[derive(Debug, Clone)]
pub struct PermutationTest {
    pub lineage: usize,
    /// Observed statistic, p-value, Clopper-Pearson interval and run metadata
    pub result: TestResult<f64>,
    /// Number of permutations the p-value is based on
    pub n_permutations: usize,
    pub requested_permutations: usize,
    pub null_distribution: Option<Vec<f64>>,
}

impl PermutationTest {
    /// False when a timeout cut the run short under [`PartialPolicy::Annotate`].
    pub fn is_complete(&self) -> bool {
        self.n_permutations == self.requested_permutations
    }
}

/// Build a null distribution of `n_permutations` draws from a caller-owned generator.
///
/// Each draw is a full shuffle of `group_ids`, so group sizes are the same in every draw. A draw
/// that leaves a condition without weight on the lineage aborts the run with
/// [`ProgressionError::UndefinedWeightedMean`].
pub fn permutation_null_distribution<R>(
    lineage: &LineageView<'_>,
    group_ids: &[usize],
    n_permutations: usize,
    rng: &mut R,
) -> Result<Vec<f64>>
where
    R: Rng + ?Sized,
{
    if n_permutations == 0 {
        return Err(ProgressionError::InsufficientPermutations {
            requested: 0,
            completed: 0,
        });
    }
    check_label_length(group_ids, lineage.n_cells())?;
    let levels = two_levels(group_ids)?;
    let active = ActiveCells::new(lineage);
    run_draws(group_ids, n_permutations, rng, None, |labels| {
        active.mean_difference(labels, levels)
    })
}

/// Build the null distribution across the shards described by `config`.
///
/// Shard `s` uses a `ChaCha8Rng` seeded with `config.seed` on stream `s`, and the shard outputs
/// are concatenated in shard order. With a timeout set the returned vector may be shorter than
/// `config.n_permutations`; [`permutation_test`] applies the partial policy to that case.
pub fn sharded_null_distribution(
    lineage: &LineageView<'_>,
    group_ids: &[usize],
    config: &PermutationConfig,
) -> Result<Vec<f64>> {
    config.validate()?;
    check_label_length(group_ids, lineage.n_cells())?;
    let levels = two_levels(group_ids)?;
    let active = ActiveCells::new(lineage);
    sharded_draws(&active, group_ids, levels, config)
}

fn sharded_draws(
    active: &ActiveCells,
    group_ids: &[usize],
    levels: (usize, usize),
    config: &PermutationConfig,
) -> Result<Vec<f64>> {
    let sizes = config.shard_sizes();
    let deadline = config.timeout.map(|t| Instant::now() + t);

    debug!(
        n_permutations = config.n_permutations,
        n_shards = sizes.len(),
        active_cells = active.len(),
        "Running permutation shards"
    );

    let shards: Vec<Result<Vec<f64>>> = sizes
        .into_par_iter()
        .enumerate()
        .map(|(shard, n_draws)| {
            let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
            rng.set_stream(shard as u64);
            run_draws(group_ids, n_draws, &mut rng, deadline, |labels| {
                active.mean_difference(labels, levels)
            })
        })
        .collect();

    let mut null_distribution = Vec::with_capacity(config.n_permutations);
    for shard in shards {
        null_distribution.extend(shard?);
    }
    Ok(null_distribution)
}

/// Run up to `n_draws` permutations, stopping early once `deadline` has passed.
///
/// Every draw shuffles the same label buffer in place, so each assignment handed to `statistic`
/// is a permutation of `group_ids`.
fn run_draws<R, F>(
    group_ids: &[usize],
    n_draws: usize,
    rng: &mut R,
    deadline: Option<Instant>,
    mut statistic: F,
) -> Result<Vec<f64>>
where
    R: Rng + ?Sized,
    F: FnMut(&[usize]) -> Result<f64>,
{
    let mut labels = group_ids.to_vec();
    let mut draws = Vec::with_capacity(n_draws);

    for _ in 0..n_draws {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
        labels.shuffle(rng);
        draws.push(statistic(&labels)?);
    }

    Ok(draws)
}

/// Number of null draws whose magnitude strictly exceeds the observed magnitude.
pub fn count_exceedances(observed: f64, null_distribution: &[f64]) -> usize {
    let threshold = observed.abs();
    null_distribution
        .iter()
        .filter(|&&v| v.abs() > threshold)
        .count()
}

/// Two-sided empirical p-value `#{|null_i| > |observed|} / R`.
///
/// A value of 0 means no draw exceeded the observed magnitude and should be read as `< 1/R`.
pub fn empirical_p_value(observed: f64, null_distribution: &[f64]) -> Result<f64> {
    if null_distribution.is_empty() {
        return Err(ProgressionError::InsufficientPermutations {
            requested: 0,
            completed: 0,
        });
    }
    let exceed = count_exceedances(observed, null_distribution);
    Ok(exceed as f64 / null_distribution.len() as f64)
}

/// Clopper-Pearson interval for the exceedance probability after `exceed` hits in `total` draws.
pub fn exceedance_interval(exceed: usize, total: usize, confidence: f64) -> (f64, f64) {
    if total == 0 {
        return (0.0, 1.0);
    }
    let alpha = 1.0 - confidence;
    let k = exceed as f64;
    let n = total as f64;

    let lower = if exceed == 0 {
        0.0
    } else {
        Beta::new(k, n - k + 1.0)
            .map(|beta| beta.inverse_cdf(alpha / 2.0))
            .unwrap_or(0.0)
    };
    let upper = if exceed >= total {
        1.0
    } else {
        Beta::new(k + 1.0, n - k)
            .map(|beta| beta.inverse_cdf(1.0 - alpha / 2.0))
            .unwrap_or(1.0)
    };

    (lower.clamp(0.0, 1.0), upper.clamp(0.0, 1.0))
}

/// Full test on one lineage: observed statistic, sharded null distribution and p-value.
pub fn permutation_test(
    lineage: &LineageView<'_>,
    group_ids: &[usize],
    config: &PermutationConfig,
) -> Result<PermutationTest> {
    config.validate()?;
    check_label_length(group_ids, lineage.n_cells())?;
    let levels = two_levels(group_ids)?;
    let active = ActiveCells::new(lineage);

    let group_means = active.group_means(group_ids, levels)?;
    let null_distribution = sharded_draws(&active, group_ids, levels, config)?;
    summarize(lineage.lineage(), group_means, null_distribution, config)
}

/// Apply the partial policy to a finished (or cut short) run and assemble the result.
fn summarize(
    lineage: usize,
    group_means: (f64, f64),
    null_distribution: Vec<f64>,
    config: &PermutationConfig,
) -> Result<PermutationTest> {
    let (mean_first, mean_second) = group_means;
    let observed = mean_first - mean_second;
    let completed = null_distribution.len();
    let requested = config.n_permutations;

    if completed < requested {
        match config.partial_policy {
            PartialPolicy::Fail => {
                return Err(ProgressionError::InsufficientPermutations {
                    requested,
                    completed,
                });
            }
            PartialPolicy::Annotate if completed == 0 => {
                return Err(ProgressionError::InsufficientPermutations {
                    requested,
                    completed,
                });
            }
            PartialPolicy::Annotate => {
                warn!(lineage, requested, completed, "Permutation loop stopped at timeout");
            }
        }
    }

    let exceed = count_exceedances(observed, &null_distribution);
    let p_value = empirical_p_value(observed, &null_distribution)?;
    let (lower, upper) = exceedance_interval(exceed, completed, 0.95);
    let standard_error = (p_value * (1.0 - p_value) / completed as f64).sqrt();

    debug!(lineage, observed, p_value, completed, "Permutation test finished");

    let result = TestResult::new(observed, p_value)
        .with_confidence_interval(lower, upper)
        .with_standard_error(standard_error)
        .with_metadata("weighted_mean_first", mean_first)
        .with_metadata("weighted_mean_second", mean_second)
        .with_metadata("exceedances", exceed as f64)
        .with_metadata("n_permutations", completed as f64);

    Ok(PermutationTest {
        lineage,
        result,
        n_permutations: completed,
        requested_permutations: requested,
        null_distribution: config.keep_null_distribution.then_some(null_distribution),
    })
}

use crate::error::ProgressionError;
use crate::testing::config::PermutationConfig;
use crate::testing::utils::{ConditionLabels, check_label_length, two_levels};
use crate::testing::{LineageTestResults, TestMethod, TestResult};
use crate::trajectory::Trajectory;
use anyhow::Context;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::info;

pub mod nonparametric;

pub mod permutation;

pub mod weighted;

pub use permutation::PermutationTest;

/// Condition tests along the lineages of a fitted trajectory.
///
/// Errors carry the failing lineage as context; the underlying
/// [`ProgressionError`](crate::error::ProgressionError) can be recovered with `downcast_ref`.
pub trait TrajectoryStatTests {
    fn permutation_test(
        &self,
        lineage: usize,
        group_ids: &[usize],
        config: &PermutationConfig,
    ) -> anyhow::Result<PermutationTest>;

    fn ks_test(&self, lineage: usize, group_ids: &[usize]) -> anyhow::Result<TestResult<f64>>;

    /// Run `test_method` on every lineage independently.
    ///
    /// Lineages run in parallel; the first failing lineage (in lineage order) aborts the call.
    fn progression_test(
        &self,
        group_ids: &[usize],
        test_method: TestMethod,
        config: &PermutationConfig,
    ) -> anyhow::Result<LineageTestResults<f64>>;

    /// [`progression_test`](Self::progression_test) with named conditions.
    ///
    /// Errors about one condition additionally name it, e.g. `condition 'TGFB' has zero total
    /// weight`, on top of the lineage context.
    fn progression_test_by_name(
        &self,
        labels: &ConditionLabels,
        test_method: TestMethod,
        config: &PermutationConfig,
    ) -> anyhow::Result<LineageTestResults<f64>> {
        self.progression_test(labels.group_ids(), test_method, config)
            .map_err(|err| {
                let named = err
                    .downcast_ref::<ProgressionError>()
                    .and_then(|e| labels.describe(e));
                match named {
                    Some(message) => err.context(message),
                    None => err,
                }
            })
    }
}

impl TrajectoryStatTests for Trajectory {
    fn permutation_test(
        &self,
        lineage: usize,
        group_ids: &[usize],
        config: &PermutationConfig,
    ) -> anyhow::Result<PermutationTest> {
        let view = self.lineage(lineage)?;
        permutation::permutation_test(&view, group_ids, config)
            .with_context(|| format!("Permutation test failed on lineage {}", lineage))
    }

    fn ks_test(&self, lineage: usize, group_ids: &[usize]) -> anyhow::Result<TestResult<f64>> {
        let view = self.lineage(lineage)?;
        nonparametric::weighted_ks_test(&view, group_ids)
            .with_context(|| format!("KS test failed on lineage {}", lineage))
    }

    fn progression_test(
        &self,
        group_ids: &[usize],
        test_method: TestMethod,
        config: &PermutationConfig,
    ) -> anyhow::Result<LineageTestResults<f64>> {
        check_label_length(group_ids, self.n_cells())?;
        two_levels(group_ids)?;

        let lineages: Vec<usize> = (0..self.n_lineages()).collect();

        let result = match test_method {
            TestMethod::WeightedPermutation => {
                config.validate()?;

                let tests = lineages
                    .clone()
                    .into_par_iter()
                    .map(|l| self.permutation_test(l, group_ids, config))
                    .collect::<Vec<_>>()
                    .into_iter()
                    .collect::<anyhow::Result<Vec<_>>>()?;

                let statistics = tests.iter().map(|t| t.result.statistic).collect();
                let p_values = tests.iter().map(|t| t.result.p_value).collect();
                let n_permutations = tests.iter().map(|t| t.n_permutations).collect();

                let mut result = LineageTestResults::new(lineages, statistics, p_values)
                    .with_n_permutations(n_permutations)
                    .with_global_metadata("seed", &config.seed.to_string());

                if config.keep_null_distribution {
                    let nulls = tests
                        .into_iter()
                        .map(|t| t.null_distribution.unwrap_or_default())
                        .collect();
                    result = result.with_null_distributions(nulls);
                }
                result
            }

            TestMethod::WeightedKolmogorovSmirnov => {
                let tests = lineages
                    .clone()
                    .into_par_iter()
                    .map(|l| self.ks_test(l, group_ids))
                    .collect::<Vec<_>>()
                    .into_iter()
                    .collect::<anyhow::Result<Vec<_>>>()?;

                let statistics = tests.iter().map(|t| t.statistic).collect();
                let p_values = tests.iter().map(|t| t.p_value).collect();
                LineageTestResults::new(lineages, statistics, p_values)
            }
        };

        info!(
            method = test_method.name(),
            n_lineages = result.len(),
            significant = result.num_significant(0.05),
            "Progression test finished"
        );

        Ok(result.with_global_metadata("test_type", test_method.name()))
    }
}

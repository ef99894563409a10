use single_utilities::traits::FloatOps;
use std::collections::HashMap;

pub mod config;
pub mod inference;

pub mod utils;

pub use config::{PartialPolicy, PermutationConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestMethod {
    /// Difference of weighted mean pseudotime, calibrated by permuting condition labels
    WeightedPermutation,
    /// Weighted two-sample Kolmogorov-Smirnov test on pseudotime
    WeightedKolmogorovSmirnov,
}

impl TestMethod {
    pub fn name(&self) -> &'static str {
        match self {
            TestMethod::WeightedPermutation => "weighted_permutation",
            TestMethod::WeightedKolmogorovSmirnov => "weighted_ks",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TestResult<T> {
    /// The test statistic value (weighted mean difference, KS distance)
    pub statistic: T,
    /// The p-value of the test
    pub p_value: T,
    /// Confidence interval for the p-value itself (permutation tests)
    pub confidence_interval: Option<(T, T)>,
    /// Monte Carlo standard error of the p-value
    pub standard_error: Option<T>,
    /// Additional test-specific information
    pub metadata: HashMap<String, T>,
}

impl<T> TestResult<T>
where
    T: FloatOps,
{
    /// Create a new test result with minimal information
    pub fn new(statistic: T, p_value: T) -> Self {
        TestResult {
            statistic,
            p_value,
            confidence_interval: None,
            standard_error: None,
            metadata: HashMap::new(),
        }
    }

    /// Add confidence interval to the result
    pub fn with_confidence_interval(mut self, lower: T, upper: T) -> Self {
        self.confidence_interval = Some((lower, upper));
        self
    }

    /// Add standard error to the result
    pub fn with_standard_error(mut self, se: T) -> Self {
        self.standard_error = Some(se);
        self
    }

    /// Add additional metadata
    pub fn with_metadata(mut self, key: &str, value: T) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    /// Check if the result is statistically significant at the given threshold
    pub fn is_significant(&self, alpha: T) -> bool {
        self.p_value < alpha
    }
}

/// Per-lineage results of one progression test, in lineage order.
#[derive(Debug, Clone)]
pub struct LineageTestResults<T> {
    /// Lineage index of each entry
    pub lineages: Vec<usize>,
    /// Test statistic for each lineage
    pub statistics: Vec<T>,
    /// Unadjusted p-value for each lineage
    pub p_values: Vec<T>,
    /// Number of permutations behind each p-value (permutation tests only)
    pub n_permutations: Option<Vec<usize>>,
    /// Null distributions, when the config asked to keep them
    pub null_distributions: Option<Vec<Vec<T>>>,
    /// Global metadata about the test
    pub global_metadata: HashMap<String, String>,
}

impl<T> LineageTestResults<T>
where
    T: FloatOps,
{
    pub fn new(lineages: Vec<usize>, statistics: Vec<T>, p_values: Vec<T>) -> Self {
        LineageTestResults {
            lineages,
            statistics,
            p_values,
            n_permutations: None,
            null_distributions: None,
            global_metadata: HashMap::new(),
        }
    }

    pub fn with_n_permutations(mut self, n_permutations: Vec<usize>) -> Self {
        self.n_permutations = Some(n_permutations);
        self
    }

    pub fn with_null_distributions(mut self, null_distributions: Vec<Vec<T>>) -> Self {
        self.null_distributions = Some(null_distributions);
        self
    }

    /// Add global metadata about the test
    pub fn with_global_metadata(mut self, key: &str, value: &str) -> Self {
        self.global_metadata
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn len(&self) -> usize {
        self.lineages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lineages.is_empty()
    }

    /// Lineages whose unadjusted p-value is below `alpha`
    pub fn significant_lineages(&self, alpha: T) -> Vec<usize> {
        self.lineages
            .iter()
            .zip(self.p_values.iter())
            .filter_map(|(&l, &p)| if p < alpha { Some(l) } else { None })
            .collect()
    }

    pub fn num_significant(&self, alpha: T) -> usize {
        self.significant_lineages(alpha).len()
    }

    /// Top n lineages by p-value
    pub fn top_lineages(&self, n: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.p_values.len()).collect();
        order.sort_by(|&a, &b| {
            self.p_values[a]
                .partial_cmp(&self.p_values[b])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        order.truncate(n);
        order.into_iter().map(|i| self.lineages[i]).collect()
    }
}

use crate::error::{ProgressionError, Result};
use std::time::Duration;

/// What to do when a timeout stops the permutation loop before all draws are done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PartialPolicy {
    /// Fail with [`ProgressionError::InsufficientPermutations`]
    #[default]
    Fail,
    /// Report the p-value from the completed draws, with the achieved count on the result
    Annotate,
}

/// Settings for the permutation engine.
#[derive(Debug, Clone)]
pub struct PermutationConfig {
    /// Number of permutations R
    pub n_permutations: usize,
    /// Seed for the per-shard ChaCha streams
    pub seed: u64,
    /// Fixed number of independent shards R is split across. The null distribution depends on
    /// this value, never on the size of the thread pool.
    pub n_shards: usize,
    /// Wall-clock budget for the whole permutation loop
    pub timeout: Option<Duration>,
    pub partial_policy: PartialPolicy,
    /// Keep the null distribution on the returned result
    pub keep_null_distribution: bool,
}

impl Default for PermutationConfig {
    fn default() -> Self {
        PermutationConfig {
            n_permutations: 10_000,
            seed: 42,
            n_shards: 8,
            timeout: None,
            partial_policy: PartialPolicy::Fail,
            keep_null_distribution: false,
        }
    }
}

impl PermutationConfig {
    pub fn new(n_permutations: usize, seed: u64) -> Self {
        PermutationConfig {
            n_permutations,
            seed,
            ..Default::default()
        }
    }

    pub fn with_shards(mut self, n_shards: usize) -> Self {
        self.n_shards = n_shards;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_partial_policy(mut self, policy: PartialPolicy) -> Self {
        self.partial_policy = policy;
        self
    }

    pub fn with_null_distribution(mut self, keep: bool) -> Self {
        self.keep_null_distribution = keep;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_permutations == 0 {
            return Err(ProgressionError::InsufficientPermutations {
                requested: 0,
                completed: 0,
            });
        }
        if self.n_shards == 0 {
            return Err(ProgressionError::InvalidInput {
                reason: "n_shards must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Number of draws assigned to each shard; the first `R % n_shards` shards take one extra.
    pub(crate) fn shard_sizes(&self) -> Vec<usize> {
        let shards = self.n_shards.min(self.n_permutations).max(1);
        let base = self.n_permutations / shards;
        let extra = self.n_permutations % shards;
        (0..shards)
            .map(|s| if s < extra { base + 1 } else { base })
            .collect()
    }
}

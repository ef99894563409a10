use approx::assert_relative_eq;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use single_progression::testing::inference::permutation::{empirical_p_value, permutation_test};
use single_progression::testing::inference::weighted::{weighted_mean, weighted_mean_difference};
use single_progression::{LineageView, PartialPolicy, PermutationConfig, ProgressionError};

#[cfg(test)]
mod scenarios {
    use super::*;

    fn balanced_groups(n: usize) -> Vec<usize> {
        (0..n).map(|i| if i < n / 2 { 0 } else { 1 }).collect()
    }

    #[test]
    fn null_case_rejection_rate_near_alpha() {
        // Pseudotime uniform regardless of condition, all weights 1
        let n = 100;
        let trials = 300;
        let groups = balanced_groups(n);
        let w = vec![1.0; n];
        let mut data_rng = ChaCha8Rng::seed_from_u64(2024);

        let mut rejections = 0;
        for trial in 0..trials {
            let pt: Vec<f64> = (0..n).map(|_| data_rng.gen_range(0.0..1.0)).collect();
            let lineage = LineageView::from_slices(&pt, &w).unwrap();
            let config = PermutationConfig::new(199, trial as u64).with_shards(1);
            let test = permutation_test(&lineage, &groups, &config).unwrap();
            assert!((0.0..=1.0).contains(&test.result.p_value));
            if test.result.p_value < 0.05 {
                rejections += 1;
            }
        }

        let rate = rejections as f64 / trials as f64;
        println!("Null rejection rate at alpha=0.05: {}", rate);
        assert!(rate > 0.01 && rate < 0.10, "rejection rate {} too far from 0.05", rate);
    }

    #[test]
    fn clear_effect_has_zero_p_value() {
        // Condition A near 0, condition B near 1
        let n = 100;
        let groups = balanced_groups(n);
        let w = vec![1.0; n];
        let mut rng = ChaCha8Rng::seed_from_u64(99);
        let pt: Vec<f64> = groups
            .iter()
            .map(|&g| {
                let centre = if g == 0 { 0.0 } else { 1.0 };
                centre + rng.gen_range(-0.05..0.05)
            })
            .collect();
        let lineage = LineageView::from_slices(&pt, &w).unwrap();

        let config = PermutationConfig::new(10_000, 42);
        let test = permutation_test(&lineage, &groups, &config).unwrap();

        println!("Observed statistic: {}", test.result.statistic);
        assert!(test.result.statistic < -0.9);
        assert_eq!(test.result.p_value, 0.0);
        assert_eq!(test.n_permutations, 10_000);

        let (lower, upper) = test.result.confidence_interval.unwrap();
        assert_eq!(lower, 0.0);
        assert!(upper < 1e-3);
    }

    #[test]
    fn degenerate_condition_fails_instead_of_nan() {
        let pt = vec![0.1, 0.4, 0.2, 0.8, 0.3, 0.6];
        let groups = vec![0, 1, 0, 1, 0, 1];
        // Every cell of condition 1 has weight 0
        let w = vec![1.0, 0.0, 0.5, 0.0, 0.7, 0.0];
        let lineage = LineageView::from_slices(&pt, &w).unwrap();

        assert_eq!(
            weighted_mean_difference(&lineage, &groups).unwrap_err(),
            ProgressionError::UndefinedWeightedMean { label: 1 }
        );
        assert!(matches!(
            permutation_test(&lineage, &groups, &PermutationConfig::new(100, 1)),
            Err(ProgressionError::UndefinedWeightedMean { label: 1 })
        ));
        assert!(weighted_mean(&lineage, &groups, 0).is_ok());
    }

    #[test]
    fn weights_shift_the_mean() {
        let pt = vec![0.0, 1.0, 0.0, 1.0];
        let groups = vec![0, 0, 1, 1];
        let w = vec![1.0, 3.0, 3.0, 1.0];
        let lineage = LineageView::from_slices(&pt, &w).unwrap();

        assert_relative_eq!(weighted_mean(&lineage, &groups, 0).unwrap(), 0.75);
        assert_relative_eq!(weighted_mean(&lineage, &groups, 1).unwrap(), 0.25);
        assert_relative_eq!(weighted_mean_difference(&lineage, &groups).unwrap(), 0.5);
    }

    #[test]
    fn invalid_inputs_fail_immediately() {
        let pt = vec![0.1, 0.2, 0.3];
        assert!(matches!(
            LineageView::from_slices(&pt, &[1.0, 1.0]),
            Err(ProgressionError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            LineageView::from_slices(&pt, &[1.0, -1.0, 1.0]),
            Err(ProgressionError::NegativeWeight { cell: 1, .. })
        ));

        let w = vec![1.0, 1.0, 1.0];
        let lineage = LineageView::from_slices(&pt, &w).unwrap();
        assert_eq!(
            permutation_test(&lineage, &[0, 1, 0], &PermutationConfig::new(0, 1)).unwrap_err(),
            ProgressionError::InsufficientPermutations {
                requested: 0,
                completed: 0
            }
        );
        assert!(matches!(
            empirical_p_value(0.3, &[]),
            Err(ProgressionError::InsufficientPermutations { .. })
        ));
    }

    #[test]
    fn annotated_timeout_with_no_draws_still_fails() {
        let pt = vec![0.1, 0.2, 0.3, 0.4];
        let w = vec![1.0; 4];
        let lineage = LineageView::from_slices(&pt, &w).unwrap();
        let config = PermutationConfig::new(1_000, 1)
            .with_timeout(std::time::Duration::ZERO)
            .with_partial_policy(PartialPolicy::Annotate);

        assert!(matches!(
            permutation_test(&lineage, &[0, 0, 1, 1], &config),
            Err(ProgressionError::InsufficientPermutations { completed: 0, .. })
        ));
    }
}

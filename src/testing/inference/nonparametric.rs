use crate::error::{ProgressionError, Result};
use crate::testing::TestResult;
use crate::testing::utils::{check_label_length, two_levels};
use crate::trajectory::LineageView;
use std::cmp::Ordering;
use std::f64::consts::PI;

/// Weighted two-sample Kolmogorov-Smirnov test of pseudotime between two conditions.
///
/// The statistic is the largest gap between the weight-normalized empirical CDFs of the two
/// conditions. The p-value uses the asymptotic Kolmogorov distribution with effective sample
/// sizes `(Σw)² / Σw²` in place of the raw group sizes.
pub fn weighted_ks_test(lineage: &LineageView<'_>, group_ids: &[usize]) -> Result<TestResult<f64>> {
    check_label_length(group_ids, lineage.n_cells())?;
    let (first, second) = two_levels(group_ids)?;

    // (pseudotime, weight, is_first)
    let mut combined: Vec<(f64, f64, bool)> = Vec::new();
    let mut weight_first = 0.0;
    let mut weight_sq_first = 0.0;
    let mut weight_second = 0.0;
    let mut weight_sq_second = 0.0;

    // Scaled weights keep Σw² finite; the CDFs and effective sizes are scale-free
    for (cell, pt, w) in lineage.scaled_active_cells() {
        let label = group_ids[cell];
        if label == first {
            weight_first += w;
            weight_sq_first += w * w;
            combined.push((pt, w, true));
        } else if label == second {
            weight_second += w;
            weight_sq_second += w * w;
            combined.push((pt, w, false));
        }
    }

    if weight_first <= 0.0 {
        return Err(ProgressionError::UndefinedWeightedMean { label: first });
    }
    if weight_second <= 0.0 {
        return Err(ProgressionError::UndefinedWeightedMean { label: second });
    }

    combined.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

    // Walk the sorted values, evaluating the CDF gap only after a full run of ties
    let mut cdf_first = 0.0;
    let mut cdf_second = 0.0;
    let mut d_stat: f64 = 0.0;
    let mut i = 0;
    while i < combined.len() {
        let val = combined[i].0;
        let mut j = i;
        while j < combined.len() && combined[j].0 == val {
            let (_, w, is_first) = combined[j];
            if is_first {
                cdf_first += w / weight_first;
            } else {
                cdf_second += w / weight_second;
            }
            j += 1;
        }
        d_stat = d_stat.max((cdf_first - cdf_second).abs());
        i = j;
    }

    let n_first = weight_first * weight_first / weight_sq_first;
    let n_second = weight_second * weight_second / weight_sq_second;
    let scale = (n_first * n_second / (n_first + n_second)).sqrt();
    let p_value = kolmogorov_tail(scale * d_stat);

    Ok(TestResult::new(d_stat, p_value)
        .with_metadata("effective_n_first", n_first)
        .with_metadata("effective_n_second", n_second))
}

/// Upper tail `P(K > lambda)` of the Kolmogorov distribution.
pub fn kolmogorov_tail(lambda: f64) -> f64 {
    if !lambda.is_finite() {
        return if lambda > 0.0 { 0.0 } else { 1.0 };
    }
    if lambda <= 0.0 {
        return 1.0;
    }

    let tail = if lambda < 1.18 {
        // Jacobi theta form, converges quickly for small lambda
        let factor = -PI * PI / (8.0 * lambda * lambda);
        let mut cdf = 0.0;
        for j in 1..=20 {
            let k = (2 * j - 1) as f64;
            cdf += (factor * k * k).exp();
        }
        1.0 - (2.0 * PI).sqrt() / lambda * cdf
    } else {
        let mut sum = 0.0;
        for k in 1..=100 {
            let kf = k as f64;
            let term = (-2.0 * kf * kf * lambda * lambda).exp();
            if k % 2 == 1 {
                sum += term;
            } else {
                sum -= term;
            }
            if term < 1e-16 {
                break;
            }
        }
        2.0 * sum
    };

    tail.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_kolmogorov_tail_reference_values() {
        // Standard critical values of the Kolmogorov distribution
        assert_relative_eq!(kolmogorov_tail(1.3581), 0.05, epsilon = 1e-3);
        assert_relative_eq!(kolmogorov_tail(1.2238), 0.10, epsilon = 1e-3);
        assert_relative_eq!(kolmogorov_tail(1.6276), 0.01, epsilon = 1e-3);
        assert_relative_eq!(kolmogorov_tail(0.0), 1.0);
        assert!(kolmogorov_tail(0.3) > 0.99);
    }

    #[test]
    fn test_kolmogorov_tail_is_continuous_at_switch() {
        let below = kolmogorov_tail(1.18 - 1e-9);
        let above = kolmogorov_tail(1.18);
        assert_relative_eq!(below, above, epsilon = 1e-6);
    }

    #[test]
    fn test_identical_distributions() {
        let pt: Vec<f64> = (0..40).map(|i| (i / 2) as f64 / 20.0).collect();
        let w = vec![1.0; 40];
        let groups: Vec<usize> = (0..40).map(|i| i % 2).collect();
        let lineage = LineageView::from_slices(&pt, &w).unwrap();

        let result = weighted_ks_test(&lineage, &groups).unwrap();
        assert_relative_eq!(result.statistic, 0.0);
        assert_relative_eq!(result.p_value, 1.0);
    }

    #[test]
    fn test_separated_distributions() {
        let pt: Vec<f64> = (0..60)
            .map(|i| if i < 30 { i as f64 / 100.0 } else { 1.0 + i as f64 / 100.0 })
            .collect();
        let w = vec![1.0; 60];
        let groups: Vec<usize> = (0..60).map(|i| if i < 30 { 0 } else { 1 }).collect();
        let lineage = LineageView::from_slices(&pt, &w).unwrap();

        let result = weighted_ks_test(&lineage, &groups).unwrap();
        assert_relative_eq!(result.statistic, 1.0);
        assert!(result.p_value < 1e-6);
        assert_relative_eq!(result.metadata["effective_n_first"], 30.0);
    }

    #[test]
    fn test_ks_skips_zero_weight_cells() {
        let pt = [0.1, 0.2, f64::NAN, 0.3, 0.4];
        let w = [1.0, 1.0, 0.0, 1.0, 1.0];
        let groups = [0, 1, 1, 0, 1];
        let lineage = LineageView::from_slices(&pt, &w).unwrap();
        let result = weighted_ks_test(&lineage, &groups).unwrap();
        assert!(result.statistic.is_finite());
        assert!((0.0..=1.0).contains(&result.p_value));
    }

    #[test]
    fn test_ks_huge_weights() {
        let pt = [0.1, 0.2, 0.3, 0.4, 0.5, 0.6];
        let w = [1e200; 6];
        let groups = [0, 0, 0, 1, 1, 1];
        let lineage = LineageView::from_slices(&pt, &w).unwrap();

        let result = weighted_ks_test(&lineage, &groups).unwrap();
        assert_relative_eq!(result.statistic, 1.0, epsilon = 1e-12);
        assert_relative_eq!(result.metadata["effective_n_first"], 3.0, epsilon = 1e-12);
        assert!(result.p_value < 0.15);
    }

    #[test]
    fn test_ks_degenerate_group() {
        let pt = [0.1, 0.2, 0.3];
        let w = [1.0, 0.0, 0.0];
        let groups = [0, 1, 1];
        let lineage = LineageView::from_slices(&pt, &w).unwrap();
        assert_eq!(
            weighted_ks_test(&lineage, &groups).unwrap_err(),
            ProgressionError::UndefinedWeightedMean { label: 1 }
        );
    }
}

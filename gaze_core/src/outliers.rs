//! Residual-based inlier selection for the robust refit.

use crate::config::OutlierPolicy;
use crate::util::{median, quantile};

/// Consistency constant relating the MAD to a normal standard deviation.
const MAD_Z: f64 = 0.6745;
const MAD_EPS: f64 = 1e-9;
const PERCENTILE_RELAX_STEP: f64 = 0.05;
const PERCENTILE_RELAX_CAP: f64 = 0.98;
const MAD_RELAX_FACTOR: f64 = 1.5;

/// Minimum number of samples a robust refit must keep.
pub fn min_keep(n: usize, frac: f64, count: usize) -> usize {
    let by_frac = (frac.clamp(0.0, 1.0) * n as f64).floor() as usize;
    by_frac.max(count)
}

/// Select inliers from per-sample residuals.
///
/// Returns a mask with one entry per residual. If neither the configured rule
/// nor its single relaxation retains `keep_at_least` samples, every sample is
/// kept.
pub fn inlier_mask(residuals: &[f64], policy: OutlierPolicy, keep_at_least: usize) -> Vec<bool> {
    let all = vec![true; residuals.len()];
    let attempt = |relaxed: bool| -> Option<Vec<bool>> {
        match policy {
            OutlierPolicy::Disabled => None,
            OutlierPolicy::Percentile { drop_percent } => {
                let mut q = 1.0 - drop_percent.clamp(0.0, 49.0) / 100.0;
                if relaxed {
                    q = (q + PERCENTILE_RELAX_STEP).min(PERCENTILE_RELAX_CAP);
                }
                let cut = quantile(residuals, q)?;
                Some(residuals.iter().map(|&e| e <= cut).collect())
            }
            OutlierPolicy::Mad { threshold } => {
                let t = if relaxed { threshold * MAD_RELAX_FACTOR } else { threshold };
                let med = median(residuals)?;
                let dev: Vec<f64> = residuals.iter().map(|e| (e - med).abs()).collect();
                let mad = median(&dev)?;
                Some(
                    residuals
                        .iter()
                        .map(|&e| (MAD_Z * (e - med) / (mad + MAD_EPS)).abs() <= t)
                        .collect(),
                )
            }
        }
    };

    for relaxed in [false, true] {
        match attempt(relaxed) {
            None => return all,
            Some(mask) => {
                let kept = mask.iter().filter(|&&k| k).count();
                if kept >= keep_at_least {
                    return mask;
                }
                tracing::debug!(kept, keep_at_least, relaxed, "outlier rule kept too few samples");
            }
        }
    }
    all
}

#[cfg(test)]
mod tests {
    use super::*;

    fn residuals_with_tail(n: usize, tail: usize) -> Vec<f64> {
        (0..n)
            .map(|i| if i < n - tail { 1.0 + (i % 5) as f64 * 0.1 } else { 200.0 })
            .collect()
    }

    #[test]
    fn percentile_drops_the_tail() {
        let r = residuals_with_tail(50, 5);
        let mask = inlier_mask(&r, OutlierPolicy::Percentile { drop_percent: 15.0 }, 30);
        assert!(mask[..45].iter().all(|&k| k));
        assert!(mask[45..].iter().all(|&k| !k));
    }

    #[test]
    fn mad_drops_far_residuals() {
        let r = residuals_with_tail(50, 3);
        let mask = inlier_mask(&r, OutlierPolicy::Mad { threshold: 3.5 }, 30);
        assert_eq!(mask.iter().filter(|&&k| !k).count(), 3);
    }

    #[test]
    fn percentile_relaxes_once_before_giving_up() {
        let r: Vec<f64> = (1..=45).map(f64::from).chain([1_000.0; 5]).collect();
        // 85th percentile keeps 42; the relaxed 90th keeps 45.
        let mask = inlier_mask(&r, OutlierPolicy::Percentile { drop_percent: 15.0 }, 45);
        assert!(mask[..45].iter().all(|&k| k));
        assert!(mask[45..].iter().all(|&k| !k));
    }

    #[test]
    fn mad_relaxed_threshold_admits_the_shoulder() {
        // median 25.5, MAD 12.5: the 70s sit at z ~ 2.4, the 500s far beyond.
        let r: Vec<f64> = (1..=40)
            .map(f64::from)
            .chain([70.0; 6])
            .chain([500.0; 4])
            .collect();
        let strict = inlier_mask(&r, OutlierPolicy::Mad { threshold: 2.0 }, 40);
        assert_eq!(strict.iter().filter(|&&k| k).count(), 40);

        let mask = inlier_mask(&r, OutlierPolicy::Mad { threshold: 2.0 }, 44);
        assert_eq!(mask.iter().filter(|&&k| k).count(), 46);
        assert!(mask[40..46].iter().all(|&k| k));
        assert!(mask[46..].iter().all(|&k| !k));
    }

    #[test]
    fn safeguard_keeps_everything_when_violated_twice() {
        let r = residuals_with_tail(50, 5);
        // Percentile at most keeps 45 even when relaxed.
        let mask = inlier_mask(&r, OutlierPolicy::Percentile { drop_percent: 15.0 }, 48);
        assert!(mask.iter().all(|&k| k));
    }

    #[test]
    fn disabled_keeps_all() {
        let r = residuals_with_tail(50, 5);
        assert!(inlier_mask(&r, OutlierPolicy::Disabled, 0).iter().all(|&k| k));
    }

    #[test]
    fn min_keep_takes_the_larger_bound() {
        assert_eq!(min_keep(100, 0.7, 30), 70);
        assert_eq!(min_keep(40, 0.7, 30), 30);
    }
}

//! `From` implementations bridging `gaze_config` types to `gaze_core` types.

use crate::config::{
    CalibrationCfg, CalibrationMethod, DriftCfg, FailsafeCfg, FilterCfg, MlpCfg, OutlierPolicy,
    UntrainedFallback,
};
use gaze_traits::ScreenSize;
use std::time::Duration;

// ── FilterCfg ────────────────────────────────────────────────────────────────

impl From<&gaze_config::FilterCfg> for FilterCfg {
    fn from(c: &gaze_config::FilterCfg) -> Self {
        Self {
            sample_rate_hz: c.sample_rate_hz,
            cutoff_hz: c.cutoff_hz,
            trend_window: c.trend_window,
            trend_lookahead_s: c.trend_lookahead_s,
            trend_jitter_px: c.trend_jitter_px,
            deadzone_px: c.deadzone_px,
        }
    }
}

// ── CalibrationCfg ───────────────────────────────────────────────────────────

impl From<gaze_config::Method> for CalibrationMethod {
    fn from(m: gaze_config::Method) -> Self {
        match m {
            gaze_config::Method::Poly2 => CalibrationMethod::Poly2,
            gaze_config::Method::Mlp => CalibrationMethod::Mlp,
            gaze_config::Method::Auto => CalibrationMethod::Auto,
        }
    }
}

impl From<&gaze_config::CalibrationCfg> for OutlierPolicy {
    fn from(c: &gaze_config::CalibrationCfg) -> Self {
        match c.outlier {
            gaze_config::OutlierKind::None => OutlierPolicy::Disabled,
            gaze_config::OutlierKind::Percentile => OutlierPolicy::Percentile {
                drop_percent: c.drop_percent,
            },
            gaze_config::OutlierKind::Mad => OutlierPolicy::Mad {
                threshold: c.mad_threshold,
            },
        }
    }
}

impl From<&gaze_config::CalibrationCfg> for CalibrationCfg {
    fn from(c: &gaze_config::CalibrationCfg) -> Self {
        Self {
            method: c.method.into(),
            min_samples: c.min_samples,
            ridge_alpha: c.ridge_alpha,
            mlp: MlpCfg {
                hidden: c.mlp_hidden,
                max_iter: c.mlp_max_iter,
                learning_rate: c.mlp_learning_rate,
                seed: c.mlp_seed,
            },
            outlier: c.into(),
            robust_min_samples: c.robust_min_samples,
            min_keep_frac: c.min_keep_frac,
            min_keep_count: c.min_keep_count,
        }
    }
}

impl From<gaze_config::UntrainedFallback> for UntrainedFallback {
    fn from(f: gaze_config::UntrainedFallback) -> Self {
        match f {
            gaze_config::UntrainedFallback::Proportional => UntrainedFallback::Proportional,
            gaze_config::UntrainedFallback::Origin => UntrainedFallback::Origin,
        }
    }
}

// ── DriftCfg ─────────────────────────────────────────────────────────────────

impl From<&gaze_config::DriftCfg> for DriftCfg {
    fn from(c: &gaze_config::DriftCfg) -> Self {
        Self {
            enabled: c.enabled,
            window: c.window,
            threshold_ratio: c.threshold_ratio,
            learn_rate: c.learn_rate,
        }
    }
}

// ── FailsafeCfg ──────────────────────────────────────────────────────────────

impl From<&gaze_config::FailsafeCfg> for FailsafeCfg {
    fn from(c: &gaze_config::FailsafeCfg) -> Self {
        Self {
            max_jump_ratio: c.max_jump_ratio,
            max_frame_gap: Duration::from_millis(c.max_frame_gap_ms),
            max_drift_px: c.max_drift_px,
            autosleep_idle: (c.autosleep_s > 0).then(|| Duration::from_secs(c.autosleep_s)),
            spike_release_ticks: (c.spike_release_ticks > 0).then_some(c.spike_release_ticks),
        }
    }
}

// ── ScreenSize ───────────────────────────────────────────────────────────────

// Both types are foreign here, so this cannot be a `From` impl.
pub fn screen_size(c: &gaze_config::ScreenCfg) -> ScreenSize {
    ScreenSize::new(c.width, c.height)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_autosleep_disables_it() {
        let c = gaze_config::FailsafeCfg {
            autosleep_s: 0,
            ..gaze_config::FailsafeCfg::default()
        };
        let f: FailsafeCfg = (&c).into();
        assert_eq!(f.autosleep_idle, None);
        assert_eq!(f.max_frame_gap, Duration::from_millis(250));
    }

    #[test]
    fn outlier_kind_maps_to_policy() {
        let c = gaze_config::CalibrationCfg {
            outlier: gaze_config::OutlierKind::Mad,
            mad_threshold: 3.0,
            ..gaze_config::CalibrationCfg::default()
        };
        let p: OutlierPolicy = (&c).into();
        assert_eq!(p, OutlierPolicy::Mad { threshold: 3.0 });
        let cal: CalibrationCfg = (&c).into();
        assert_eq!(cal.mlp.hidden, 16);
        assert_eq!(cal.min_samples, 12);
    }

    #[test]
    fn screen_section_maps_to_size() {
        let c = gaze_config::ScreenCfg {
            width: 2560,
            height: 1440,
        };
        assert_eq!(screen_size(&c), ScreenSize::new(2560, 1440));
    }

    #[test]
    fn spike_release_is_off_by_default() {
        let f: FailsafeCfg = (&gaze_config::FailsafeCfg::default()).into();
        assert_eq!(f.spike_release_ticks, None);
        let c = gaze_config::FailsafeCfg {
            spike_release_ticks: 4,
            ..gaze_config::FailsafeCfg::default()
        };
        let f: FailsafeCfg = (&c).into();
        assert_eq!(f.spike_release_ticks, Some(4));
    }
}

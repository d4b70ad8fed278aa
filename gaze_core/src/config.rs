//! Runtime configuration types for the gaze pipeline.
//!
//! These are the structs the core components are constructed from.
//! They are separate from the TOML-deserialized config in `gaze_config`;
//! see `conversions` for the bridge.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Signal conditioning: low-pass, trend projection, deadzone.
#[derive(Debug, Clone)]
pub struct FilterCfg {
    /// Tick rate in Hz; drives biquad coefficients and the runner period.
    pub sample_rate_hz: u32,
    /// Low-pass cutoff in Hz. Clamped to `[0.5, 0.45 * fs]` when coefficients are derived.
    pub cutoff_hz: f64,
    /// Trend projector history length (raised to 4 if smaller).
    pub trend_window: usize,
    /// Seconds of motion projected ahead.
    pub trend_lookahead_s: f64,
    /// Mean successive difference (px) below which projection is skipped.
    pub trend_jitter_px: f64,
    /// Output moves smaller than this (px) reuse the previous output.
    pub deadzone_px: f64,
}

impl Default for FilterCfg {
    fn default() -> Self {
        Self {
            sample_rate_hz: 30,
            cutoff_hz: 6.0,
            trend_window: 8,
            trend_lookahead_s: 0.15,
            trend_jitter_px: 1.5,
            deadzone_px: 1.5,
        }
    }
}

/// Which regressor `train` fits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CalibrationMethod {
    #[default]
    Poly2,
    Mlp,
    /// Fit both and keep the one with strictly lower in-sample RMSE (ties go to `Poly2`).
    Auto,
}

/// The regressor a trained model actually uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Poly2,
    Mlp,
}

impl ModelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelKind::Poly2 => "poly2",
            ModelKind::Mlp => "mlp",
        }
    }
}

/// Residual-based sample rejection for the robust refit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutlierPolicy {
    Disabled,
    /// Drop residuals above the `(100 - drop_percent)` percentile.
    Percentile { drop_percent: f64 },
    /// Drop samples whose robust z-score exceeds `threshold`.
    Mad { threshold: f64 },
}

impl Default for OutlierPolicy {
    fn default() -> Self {
        OutlierPolicy::Percentile { drop_percent: 15.0 }
    }
}

/// Hyperparameters of the single-hidden-layer tanh network.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MlpCfg {
    pub hidden: usize,
    pub max_iter: usize,
    pub learning_rate: f64,
    pub seed: u64,
}

impl Default for MlpCfg {
    fn default() -> Self {
        Self {
            hidden: 16,
            max_iter: 800,
            learning_rate: 0.01,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CalibrationCfg {
    pub method: CalibrationMethod,
    /// `train` is a no-op below this many accepted samples.
    pub min_samples: usize,
    /// Ridge penalty on the polynomial coefficients (intercept unpenalized).
    pub ridge_alpha: f64,
    pub mlp: MlpCfg,
    pub outlier: OutlierPolicy,
    /// The robust refit only engages at or above this many samples.
    pub robust_min_samples: usize,
    pub min_keep_frac: f64,
    pub min_keep_count: usize,
}

impl Default for CalibrationCfg {
    fn default() -> Self {
        Self {
            method: CalibrationMethod::Poly2,
            min_samples: 12,
            ridge_alpha: 1.0,
            mlp: MlpCfg::default(),
            outlier: OutlierPolicy::default(),
            robust_min_samples: 40,
            min_keep_frac: 0.7,
            min_keep_count: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DriftCfg {
    pub enabled: bool,
    /// Number of recent error vectors averaged.
    pub window: usize,
    /// The mean error must exceed `max(1.0, threshold_ratio * screen_width)` px.
    pub threshold_ratio: f64,
    /// Fraction of the mean error folded into the offset per update.
    pub learn_rate: f64,
}

impl Default for DriftCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            window: 60,
            threshold_ratio: 0.08,
            learn_rate: 0.01,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FailsafeCfg {
    /// Moves larger than this fraction of the screen width are spikes.
    pub max_jump_ratio: f64,
    pub max_frame_gap: Duration,
    pub max_drift_px: f64,
    /// `None` disables autosleep.
    pub autosleep_idle: Option<Duration>,
    /// Opt-in: a jump still out of range after this many consecutive ticks is
    /// accepted as real movement. `None` (default) substitutes indefinitely.
    pub spike_release_ticks: Option<u32>,
}

impl Default for FailsafeCfg {
    fn default() -> Self {
        Self {
            max_jump_ratio: 0.15,
            max_frame_gap: Duration::from_millis(250),
            max_drift_px: 120.0,
            autosleep_idle: Some(Duration::from_secs(120)),
            spike_release_ticks: None,
        }
    }
}

/// Mapping used while the calibrator has no trained model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UntrainedFallback {
    /// `(nx * width, ny * height)`, clamped.
    #[default]
    Proportional,
    /// Always `(0, 0)`.
    Origin,
}

//! Type-state builder for `Pipeline`.
//!
//! The builder enforces at compile time that a feature source and a screen size
//! are provided before `build()` is available. `try_build()` is always
//! available for dynamic checks.

use std::marker::PhantomData;
use std::sync::Arc;

use gaze_traits::clock::{Clock, MonotonicClock};
use gaze_traits::{FeatureSource, ScreenSize};

use crate::calibration::{Calibrator, MIN_SAMPLES_FLOOR};
use crate::config::*;
use crate::drift::DriftCorrector;
use crate::error::{BuildError, Result};
use crate::failsafe::FailsafeManager;
use crate::filter::FilterStage;
use crate::pipeline::Pipeline;
use crate::status::Mode;

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

impl Pipeline {
    /// Start building a Pipeline.
    pub fn builder() -> PipelineBuilder<Missing, Missing> {
        PipelineBuilder::default()
    }
}

/// Builder for `Pipeline`. All fields are validated on `build()`.
pub struct PipelineBuilder<S, Z> {
    source: Option<Box<dyn FeatureSource>>,
    screen: Option<ScreenSize>,
    filter: Option<FilterCfg>,
    calibration: Option<CalibrationCfg>,
    drift: Option<DriftCfg>,
    failsafe: Option<FailsafeCfg>,
    fallback: Option<UntrainedFallback>,
    clock: Option<Box<dyn Clock + Send + Sync>>,
    _s: PhantomData<S>,
    _z: PhantomData<Z>,
}

impl Default for PipelineBuilder<Missing, Missing> {
    fn default() -> Self {
        Self {
            source: None,
            screen: None,
            filter: None,
            calibration: None,
            drift: None,
            failsafe: None,
            fallback: None,
            clock: None,
            _s: PhantomData,
            _z: PhantomData,
        }
    }
}

fn invalid(msg: &'static str) -> eyre::Report {
    eyre::Report::new(BuildError::InvalidConfig(msg))
}

/// Validate configuration and construct a `Pipeline`.
#[allow(clippy::too_many_arguments)]
fn validate_and_build(
    source: Box<dyn FeatureSource>,
    screen: ScreenSize,
    filter: FilterCfg,
    calibration: CalibrationCfg,
    drift: DriftCfg,
    failsafe: FailsafeCfg,
    fallback: UntrainedFallback,
    clock: Option<Box<dyn Clock + Send + Sync>>,
) -> Result<Pipeline> {
    // ── Validation ───────────────────────────────────────────────────────────
    if screen.width == 0 || screen.height == 0 {
        return Err(invalid("screen dimensions must be > 0"));
    }
    if filter.sample_rate_hz == 0 {
        return Err(invalid("sample_rate_hz must be > 0"));
    }
    if !(filter.cutoff_hz.is_finite() && filter.cutoff_hz > 0.0) {
        return Err(invalid("cutoff_hz must be finite and > 0"));
    }
    if !(filter.trend_lookahead_s.is_finite() && filter.trend_lookahead_s >= 0.0) {
        return Err(invalid("trend_lookahead_s must be finite and >= 0"));
    }
    if !(filter.trend_jitter_px.is_finite() && filter.trend_jitter_px >= 0.0) {
        return Err(invalid("trend_jitter_px must be finite and >= 0"));
    }
    if !(filter.deadzone_px.is_finite() && filter.deadzone_px >= 0.0) {
        return Err(invalid("deadzone_px must be finite and >= 0"));
    }
    if calibration.min_samples < MIN_SAMPLES_FLOOR {
        return Err(invalid("min_samples must be >= 6"));
    }
    if !(calibration.ridge_alpha.is_finite() && calibration.ridge_alpha >= 0.0) {
        return Err(invalid("ridge_alpha must be finite and >= 0"));
    }
    if calibration.mlp.hidden == 0 || calibration.mlp.max_iter == 0 {
        return Err(invalid("mlp hidden and max_iter must be > 0"));
    }
    if !(calibration.mlp.learning_rate.is_finite() && calibration.mlp.learning_rate > 0.0) {
        return Err(invalid("mlp learning_rate must be finite and > 0"));
    }
    match calibration.outlier {
        OutlierPolicy::Percentile { drop_percent } if !(0.0..50.0).contains(&drop_percent) => {
            return Err(invalid("drop_percent must be in [0, 50)"));
        }
        OutlierPolicy::Mad { threshold } if !(threshold.is_finite() && threshold > 0.0) => {
            return Err(invalid("mad threshold must be finite and > 0"));
        }
        _ => {}
    }
    if !(0.0..=1.0).contains(&calibration.min_keep_frac) {
        return Err(invalid("min_keep_frac must be in [0, 1]"));
    }
    if drift.window == 0 {
        return Err(invalid("drift window must be >= 1"));
    }
    if !(drift.threshold_ratio.is_finite() && drift.threshold_ratio >= 0.0) {
        return Err(invalid("drift threshold_ratio must be finite and >= 0"));
    }
    if !(drift.learn_rate > 0.0 && drift.learn_rate <= 1.0) {
        return Err(invalid("drift learn_rate must be in (0, 1]"));
    }
    if !(failsafe.max_jump_ratio > 0.0 && failsafe.max_jump_ratio <= 1.0) {
        return Err(invalid("max_jump_ratio must be in (0, 1]"));
    }
    if failsafe.max_frame_gap.is_zero() {
        return Err(invalid("max_frame_gap must be > 0"));
    }
    if !(failsafe.max_drift_px.is_finite() && failsafe.max_drift_px > 0.0) {
        return Err(invalid("max_drift_px must be finite and > 0"));
    }

    // ── Construct ────────────────────────────────────────────────────────────
    let clock: Arc<dyn Clock + Send + Sync> = match clock {
        Some(b) => Arc::from(b),
        None => Arc::new(MonotonicClock::new()),
    };

    Ok(Pipeline {
        source,
        screen,
        filter: FilterStage::new(&filter),
        filter_cfg: filter,
        fallback,
        calibrator: Calibrator::new(calibration, screen),
        drift: DriftCorrector::new(drift),
        failsafe: FailsafeManager::with_clock(failsafe, Arc::clone(&clock)),
        clock,
        mode: Mode::Idle,
        last_output: None,
        last_corrected: None,
    })
}

impl<S, Z> PipelineBuilder<S, Z> {
    /// Fallible build available in any type-state; returns detailed error for missing pieces.
    pub fn try_build(self) -> Result<Pipeline> {
        let source = self
            .source
            .ok_or_else(|| eyre::Report::new(BuildError::MissingSource))?;
        let screen = self
            .screen
            .ok_or_else(|| eyre::Report::new(BuildError::MissingScreen))?;

        validate_and_build(
            source,
            screen,
            self.filter.unwrap_or_default(),
            self.calibration.unwrap_or_default(),
            self.drift.unwrap_or_default(),
            self.failsafe.unwrap_or_default(),
            self.fallback.unwrap_or_default(),
            self.clock,
        )
    }
}

/// Chainable setters that do not affect type-state.
impl<S, Z> PipelineBuilder<S, Z> {
    pub fn with_filter(mut self, filter: FilterCfg) -> Self {
        self.filter = Some(filter);
        self
    }
    pub fn with_calibration(mut self, calibration: CalibrationCfg) -> Self {
        self.calibration = Some(calibration);
        self
    }
    pub fn with_drift(mut self, drift: DriftCfg) -> Self {
        self.drift = Some(drift);
        self
    }
    pub fn with_failsafe(mut self, failsafe: FailsafeCfg) -> Self {
        self.failsafe = Some(failsafe);
        self
    }
    /// Mapping used until a model is trained or loaded.
    pub fn with_untrained_fallback(mut self, fallback: UntrainedFallback) -> Self {
        self.fallback = Some(fallback);
        self
    }
    /// Provide a custom clock implementation; defaults to `MonotonicClock` when not provided.
    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }
}

// Setters that advance type-state
impl<Z> PipelineBuilder<Missing, Z> {
    pub fn with_source(self, source: impl FeatureSource + 'static) -> PipelineBuilder<Set, Z> {
        PipelineBuilder {
            source: Some(Box::new(source)),
            screen: self.screen,
            filter: self.filter,
            calibration: self.calibration,
            drift: self.drift,
            failsafe: self.failsafe,
            fallback: self.fallback,
            clock: self.clock,
            _s: PhantomData,
            _z: PhantomData,
        }
    }
}

impl<S> PipelineBuilder<S, Missing> {
    pub fn with_screen(self, screen: ScreenSize) -> PipelineBuilder<S, Set> {
        PipelineBuilder {
            source: self.source,
            screen: Some(screen),
            filter: self.filter,
            calibration: self.calibration,
            drift: self.drift,
            failsafe: self.failsafe,
            fallback: self.fallback,
            clock: self.clock,
            _s: PhantomData,
            _z: PhantomData,
        }
    }
}

impl PipelineBuilder<Set, Set> {
    /// Validate and build the Pipeline. Only available when source and screen are set.
    pub fn build(self) -> Result<Pipeline> {
        self.try_build()
    }
}

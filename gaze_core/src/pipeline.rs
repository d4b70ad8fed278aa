//! Per-tick orchestration of mapping, drift correction, filtering and gating.
//!
//! Order inside a tracking tick is fixed:
//! feature → `Calibrator::predict` → `DriftCorrector::correct` → trend
//! projection → low-pass → deadzone snap → clamp → `FailsafeManager::process`.

use std::path::Path;
use std::sync::Arc;

use gaze_traits::clock::Clock;
use gaze_traits::{FeatureSource, GazeFeature, ScreenPoint, ScreenSize};

use crate::calibration::{Calibrator, TrainOutcome};
use crate::config::{FilterCfg, UntrainedFallback};
use crate::drift::DriftCorrector;
use crate::error::{CalibrationError, FreezeReason, GazeError};
use crate::failsafe::FailsafeManager;
use crate::filter::FilterStage;
use crate::metrics::AccuracyReport;
use crate::status::{Mode, TickResult};

/// Result of `finish_calibration`.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationSummary {
    pub outcome: TrainOutcome,
    /// In-sample accuracy of the active model over the collected samples.
    pub accuracy: Option<AccuracyReport>,
}

pub struct Pipeline {
    pub(crate) source: Box<dyn FeatureSource>,
    pub(crate) screen: ScreenSize,
    pub(crate) filter_cfg: FilterCfg,
    pub(crate) fallback: UntrainedFallback,
    pub(crate) calibrator: Calibrator,
    pub(crate) drift: DriftCorrector,
    pub(crate) filter: FilterStage,
    pub(crate) failsafe: FailsafeManager,
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
    pub(crate) mode: Mode,
    // Deadzone reference: the previous smoothed output.
    pub(crate) last_output: Option<(f64, f64)>,
    // Drift-corrected point from the last tracking tick, for `report_target`.
    pub(crate) last_corrected: Option<ScreenPoint>,
}

impl core::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Pipeline")
            .field("mode", &self.mode)
            .field("screen", &self.screen)
            .field("calibrator", &self.calibrator)
            .field("drift_offset", &self.drift.offset())
            .field("frozen", &self.failsafe.reason())
            .finish()
    }
}

impl Pipeline {
    /// Read one frame from the owned source and process it.
    pub fn tick(&mut self) -> TickResult {
        let feature = self.read_source();
        self.process_feature(feature)
    }

    /// Process a pre-sampled feature (for callers that own acquisition).
    pub fn process_feature(&mut self, feature: Option<GazeFeature>) -> TickResult {
        let Some(f) = feature.filter(GazeFeature::is_finite) else {
            if self.mode == Mode::Tracking {
                let _ = self
                    .failsafe
                    .process(None, false, self.screen, self.drift.offset());
            }
            return TickResult {
                face_ok: false,
                eye_ok: false,
                frozen: self.frozen(),
                ..TickResult::default()
            };
        };

        let mapped = self.map(f);
        let mut out = TickResult {
            face_ok: true,
            eye_ok: true,
            raw_xy: Some(mapped),
            ..TickResult::default()
        };

        match self.mode {
            Mode::Idle => {}
            Mode::Calibrating => out.predicted_xy = Some(mapped),
            Mode::Tracking => {
                let corrected = self.drift.correct(mapped);
                self.last_corrected = Some(corrected);
                let smoothed = self
                    .filter
                    .apply(f64::from(corrected.x), f64::from(corrected.y));
                let candidate = match smoothed {
                    Some((x, y)) => {
                        let (sx, sy) = self.deadzone(x, y);
                        self.last_output = Some((sx, sy));
                        Some(self.screen.clamp_f64(sx, sy))
                    }
                    None => None,
                };
                tracing::trace!(
                    mapped_x = mapped.x,
                    mapped_y = mapped.y,
                    corrected_x = corrected.x,
                    corrected_y = corrected.y,
                    "tick"
                );
                out.predicted_xy = self.failsafe.process(
                    candidate,
                    candidate.is_some(),
                    self.screen,
                    self.drift.offset(),
                );
                out.frozen = self.frozen();
            }
        }
        out
    }

    fn read_source(&mut self) -> Option<GazeFeature> {
        match self.source.read() {
            Ok(f) => f,
            Err(e) => {
                let e = GazeError::Source(e.to_string());
                tracing::warn!(error = %e, "feature read failed; treating as absent");
                None
            }
        }
    }

    fn map(&self, f: GazeFeature) -> ScreenPoint {
        if self.calibrator.is_trained() {
            return self.calibrator.predict(f);
        }
        match self.fallback {
            UntrainedFallback::Proportional => self.screen.clamp_f64(
                f.nx * f64::from(self.screen.width),
                f.ny * f64::from(self.screen.height),
            ),
            UntrainedFallback::Origin => ScreenPoint::new(0, 0),
        }
    }

    fn deadzone(&self, x: f64, y: f64) -> (f64, f64) {
        match self.last_output {
            Some((px, py)) if (x - px).hypot(y - py) < self.filter_cfg.deadzone_px => (px, py),
            _ => (x, y),
        }
    }

    fn frozen(&self) -> Option<FreezeReason> {
        if self.mode == Mode::Tracking {
            self.failsafe.reason()
        } else {
            None
        }
    }

    // Latched freezes survive this; only `resume` (or a tracking restart) clears them.
    fn reset_motion(&mut self) {
        self.filter.reset();
        self.failsafe.clear_motion();
        self.last_output = None;
        self.last_corrected = None;
    }

    // ── Commands ─────────────────────────────────────────────────────────────

    pub fn start_tracking(&mut self) {
        self.reset_motion();
        self.failsafe.reset();
        self.mode = Mode::Tracking;
        tracing::info!(trained = self.calibrator.is_trained(), "tracking started");
    }

    pub fn stop_tracking(&mut self) {
        self.reset_motion();
        self.failsafe.reset();
        self.drift.reset();
        self.mode = Mode::Idle;
        tracing::info!("tracking stopped");
    }

    /// Freeze the cursor until `resume`.
    pub fn panic(&mut self) {
        self.failsafe.panic();
    }

    pub fn resume(&mut self) {
        self.failsafe.resume();
        self.last_output = None;
    }

    /// Enter calibration mode with an empty sample set. The current model
    /// stays active until a new one is trained.
    pub fn start_calibration(&mut self) {
        self.calibrator.clear_samples();
        self.drift.reset();
        self.reset_motion();
        self.mode = Mode::Calibrating;
        tracing::info!("calibration started");
    }

    /// Tick and, if a usable feature arrived, record it against `target`.
    pub fn calibration_tick(&mut self, target: ScreenPoint) -> crate::error::Result<TickResult> {
        if self.mode != Mode::Calibrating {
            return Err(eyre::Report::new(GazeError::State(format!(
                "calibration_tick while {}",
                self.mode.as_str()
            ))));
        }
        let feature = self.read_source();
        let out = self.process_feature(feature);
        if let Some(f) = feature.filter(|_| out.eye_ok) {
            self.calibrator.add_sample(f, self.screen.clamp(target));
        }
        Ok(out)
    }

    pub fn add_calibration_sample(&mut self, feature: GazeFeature, target: ScreenPoint) -> bool {
        self.calibrator.add_sample(feature, self.screen.clamp(target))
    }

    /// Train on the collected samples and return to `Idle`.
    pub fn finish_calibration(&mut self) -> Result<CalibrationSummary, CalibrationError> {
        self.mode = Mode::Idle;
        let outcome = self.calibrator.train()?;
        let accuracy = if self.calibrator.is_trained() {
            let pairs: Vec<(ScreenPoint, ScreenPoint)> = self
                .calibrator
                .samples()
                .iter()
                .map(|s| (self.calibrator.predict(s.feature), s.target))
                .collect();
            AccuracyReport::from_pairs(&pairs)
        } else {
            None
        };
        Ok(CalibrationSummary { outcome, accuracy })
    }

    /// Feed the drift corrector with the known true target of the last tick.
    pub fn report_target(&mut self, target: ScreenPoint) {
        if let Some(observed) = self.last_corrected {
            self.drift.update(observed, target, self.screen.width);
        }
    }

    pub fn set_screen_size(&mut self, screen: ScreenSize) {
        tracing::info!(width = screen.width, height = screen.height, "screen size changed");
        self.screen = screen;
        self.calibrator.set_screen_size(screen);
        self.reset_motion();
    }

    /// Load a saved model. On failure the current model is kept.
    pub fn load_model(&mut self, path: &Path) -> Result<(), CalibrationError> {
        self.calibrator.load(path).inspect_err(|e| {
            tracing::warn!(
                error = %e,
                path = %path.display(),
                "model load failed; keeping current model"
            );
        })
    }

    pub fn save_model(&self, path: &Path) -> Result<(), CalibrationError> {
        self.calibrator.save(path)
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn screen(&self) -> ScreenSize {
        self.screen
    }

    pub fn filter_cfg(&self) -> &FilterCfg {
        &self.filter_cfg
    }

    pub fn calibrator(&self) -> &Calibrator {
        &self.calibrator
    }

    pub fn drift(&self) -> &DriftCorrector {
        &self.drift
    }

    pub fn set_drift_enabled(&mut self, enabled: bool) {
        self.drift.set_enabled(enabled);
    }

    pub fn failsafe(&self) -> &FailsafeManager {
        &self.failsafe
    }

    pub fn clock(&self) -> Arc<dyn Clock + Send + Sync> {
        Arc::clone(&self.clock)
    }
}

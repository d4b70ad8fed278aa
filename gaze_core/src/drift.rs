//! Slow global bias compensation.
//!
//! The corrector keeps a bounded window of `target - observed` error vectors.
//! Once the window mean exceeds `max(1.0, threshold_ratio * screen_width)`
//! pixels, a small fraction of that mean is folded into the offset on every
//! update. Once the window is full, a single noisy sample shifts the mean by
//! at most `1 / window` of its own magnitude.

use crate::config::DriftCfg;
use gaze_traits::ScreenPoint;
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct DriftCorrector {
    cfg: DriftCfg,
    errs: VecDeque<(f64, f64)>,
    offset: (f64, f64),
}

impl DriftCorrector {
    pub fn new(cfg: DriftCfg) -> Self {
        let window = cfg.window.max(1);
        Self {
            cfg: DriftCfg { window, ..cfg },
            errs: VecDeque::with_capacity(window),
            offset: (0.0, 0.0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.cfg.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.cfg.enabled = enabled;
    }

    /// Apply the current offset. Identity when disabled.
    pub fn correct(&self, p: ScreenPoint) -> ScreenPoint {
        if !self.cfg.enabled {
            return p;
        }
        let x = (f64::from(p.x) + self.offset.0).round();
        let y = (f64::from(p.y) + self.offset.1).round();
        ScreenPoint::new(sat_i32(x), sat_i32(y))
    }

    /// Feed one observation with its known true target.
    pub fn update(&mut self, observed: ScreenPoint, target: ScreenPoint, screen_width: u32) {
        if !self.cfg.enabled {
            return;
        }
        let ex = f64::from(target.x) - f64::from(observed.x);
        let ey = f64::from(target.y) - f64::from(observed.y);
        if self.errs.len() == self.cfg.window {
            self.errs.pop_front();
        }
        self.errs.push_back((ex, ey));

        let Some((mx, my)) = self.mean_error() else {
            return;
        };
        let threshold = (f64::from(screen_width) * self.cfg.threshold_ratio).max(1.0);
        let mag = mx.hypot(my);
        if mag > threshold {
            self.offset.0 += mx * self.cfg.learn_rate;
            self.offset.1 += my * self.cfg.learn_rate;
            tracing::trace!(
                mean_x = mx,
                mean_y = my,
                offset_x = self.offset.0,
                offset_y = self.offset.1,
                "drift offset nudged"
            );
        }
    }

    /// Mean of the error window; `None` when empty.
    pub fn mean_error(&self) -> Option<(f64, f64)> {
        if self.errs.is_empty() {
            return None;
        }
        let n = self.errs.len() as f64;
        let (sx, sy) = self
            .errs
            .iter()
            .fold((0.0, 0.0), |(ax, ay), (ex, ey)| (ax + ex, ay + ey));
        Some((sx / n, sy / n))
    }

    pub fn offset(&self) -> (f64, f64) {
        self.offset
    }

    /// Offset magnitude in pixels.
    pub fn offset_magnitude(&self) -> f64 {
        self.offset.0.hypot(self.offset.1)
    }

    pub fn reset(&mut self) {
        self.errs.clear();
        self.offset = (0.0, 0.0);
    }
}

#[inline]
fn sat_i32(v: f64) -> i32 {
    if !v.is_finite() {
        return 0;
    }
    v.clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32
}

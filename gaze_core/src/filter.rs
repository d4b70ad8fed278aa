//! Signal conditioning: second-order Butterworth low-pass and trend projection.
//!
//! Both stages work on real-valued pixel coordinates and hold their last good
//! output when fed a non-finite input.

use crate::config::FilterCfg;
use std::collections::VecDeque;

/// Lowest cutoff the low-pass accepts, in Hz.
pub const MIN_CUTOFF_HZ: f64 = 0.5;
/// Highest cutoff as a fraction of the sample rate. Closer to Nyquist the
/// poles approach -1 and the output rings for many ticks after a step.
pub const MAX_CUTOFF_RATIO: f64 = 0.45;
/// Histories shorter than this never project.
pub const MIN_TREND_WINDOW: usize = 4;

/// Normalized biquad coefficients (a0 = 1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl BiquadCoeffs {
    /// Butterworth low-pass (Q = 1/sqrt(2)) via the bilinear transform.
    ///
    /// `cutoff_hz` is clamped to `[0.5, 0.45 * fs]` (the upper bound wins when
    /// they cross); `sample_rate_hz` is raised to 1.
    pub fn butterworth_lowpass(cutoff_hz: f64, sample_rate_hz: f64) -> Self {
        let sr = if sample_rate_hz.is_finite() {
            sample_rate_hz.max(1.0)
        } else {
            1.0
        };
        let cap = sr * MAX_CUTOFF_RATIO;
        let fc = if cutoff_hz.is_finite() { cutoff_hz } else { cap };
        let fc = fc.max(MIN_CUTOFF_HZ).min(cap);
        let q = std::f64::consts::FRAC_1_SQRT_2;
        let k = (std::f64::consts::PI * fc / sr).tan();
        let norm = 1.0 / (1.0 + k / q + k * k);
        let b0 = k * k * norm;
        Self {
            b0,
            b1: 2.0 * b0,
            b2: b0,
            a1: 2.0 * (k * k - 1.0) * norm,
            a2: (1.0 - k / q + k * k) * norm,
        }
    }

    /// Gain at DC; 1.0 for a correctly normalized low-pass.
    pub fn dc_gain(&self) -> f64 {
        (self.b0 + self.b1 + self.b2) / (1.0 + self.a1 + self.a2)
    }
}

/// One axis of biquad memory.
#[derive(Debug, Clone, Copy, Default)]
struct AxisState {
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl AxisState {
    fn primed(v: f64) -> Self {
        Self {
            x1: v,
            x2: v,
            y1: v,
            y2: v,
        }
    }

    #[inline]
    fn step(&mut self, c: &BiquadCoeffs, x0: f64) -> f64 {
        let y0 = c.b0 * x0 + c.b1 * self.x1 + c.b2 * self.x2 - c.a1 * self.y1 - c.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = x0;
        self.y2 = self.y1;
        self.y1 = y0;
        y0
    }
}

/// Per-axis second-order low-pass over 2D points.
#[derive(Debug, Clone)]
pub struct LowPass2D {
    coeffs: BiquadCoeffs,
    state: Option<(AxisState, AxisState)>,
}

impl LowPass2D {
    pub fn new(cutoff_hz: f64, sample_rate_hz: u32) -> Self {
        Self {
            coeffs: BiquadCoeffs::butterworth_lowpass(cutoff_hz, f64::from(sample_rate_hz)),
            state: None,
        }
    }

    pub fn coeffs(&self) -> BiquadCoeffs {
        self.coeffs
    }

    pub fn is_primed(&self) -> bool {
        self.state.is_some()
    }

    /// Filter one point. The first point after construction or `reset` primes
    /// the memory and passes through unchanged. A non-finite point leaves the
    /// memory untouched and returns the last output (`None` before any output).
    pub fn apply(&mut self, x: f64, y: f64) -> Option<(f64, f64)> {
        if !(x.is_finite() && y.is_finite()) {
            return self.state.map(|(sx, sy)| (sx.y1, sy.y1));
        }
        match &mut self.state {
            None => {
                self.state = Some((AxisState::primed(x), AxisState::primed(y)));
                Some((x, y))
            }
            Some((sx, sy)) => Some((sx.step(&self.coeffs, x), sy.step(&self.coeffs, y))),
        }
    }

    pub fn reset(&mut self) {
        self.state = None;
    }
}

/// Short-horizon forward projection along the recent motion of the signal.
#[derive(Debug, Clone)]
pub struct TrendProjector {
    hist: VecDeque<(f64, f64)>,
    window: usize,
    lookahead_s: f64,
    jitter_px: f64,
    sample_rate_hz: f64,
}

impl TrendProjector {
    pub fn new(window: usize, lookahead_s: f64, jitter_px: f64, sample_rate_hz: u32) -> Self {
        let window = window.max(MIN_TREND_WINDOW);
        Self {
            hist: VecDeque::with_capacity(window),
            window,
            lookahead_s,
            jitter_px,
            sample_rate_hz: f64::from(sample_rate_hz.max(1)),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Mean absolute successive difference averaged over both axes.
    /// `None` until two points are held.
    pub fn jitter(&self) -> Option<f64> {
        if self.hist.len() < 2 {
            return None;
        }
        let (mut sx, mut sy) = (0.0, 0.0);
        for (a, b) in self.hist.iter().zip(self.hist.iter().skip(1)) {
            sx += (b.0 - a.0).abs();
            sy += (b.1 - a.1).abs();
        }
        let n = (self.hist.len() - 1) as f64;
        Some(0.5 * (sx / n + sy / n))
    }

    /// Velocity in px/s from the last two points.
    pub fn velocity(&self) -> Option<(f64, f64)> {
        let n = self.hist.len();
        if n < 2 {
            return None;
        }
        let (a, b) = (self.hist[n - 2], self.hist[n - 1]);
        Some((
            (b.0 - a.0) * self.sample_rate_hz,
            (b.1 - a.1) * self.sample_rate_hz,
        ))
    }

    /// Record the point and return it, projected forward by
    /// `velocity * lookahead_s` when the recent motion is above the jitter threshold.
    pub fn project(&mut self, x: f64, y: f64) -> Option<(f64, f64)> {
        if !(x.is_finite() && y.is_finite()) {
            return self.hist.back().copied();
        }
        if self.hist.len() == self.window {
            self.hist.pop_front();
        }
        self.hist.push_back((x, y));
        if self.hist.len() < MIN_TREND_WINDOW {
            return Some((x, y));
        }
        let (Some(jitter), Some((vx, vy))) = (self.jitter(), self.velocity()) else {
            return Some((x, y));
        };
        if jitter < self.jitter_px {
            return Some((x, y));
        }
        Some((x + vx * self.lookahead_s, y + vy * self.lookahead_s))
    }

    pub fn reset(&mut self) {
        self.hist.clear();
    }
}

/// Trend projector followed by the low-pass, in that order.
#[derive(Debug, Clone)]
pub struct FilterStage {
    pub trend: TrendProjector,
    pub lowpass: LowPass2D,
}

impl FilterStage {
    pub fn new(cfg: &FilterCfg) -> Self {
        Self {
            trend: TrendProjector::new(
                cfg.trend_window,
                cfg.trend_lookahead_s,
                cfg.trend_jitter_px,
                cfg.sample_rate_hz,
            ),
            lowpass: LowPass2D::new(cfg.cutoff_hz, cfg.sample_rate_hz),
        }
    }

    pub fn apply(&mut self, x: f64, y: f64) -> Option<(f64, f64)> {
        let (px, py) = self.trend.project(x, y)?;
        self.lowpass.apply(px, py)
    }

    pub fn reset(&mut self) {
        self.trend.reset();
        self.lowpass.reset();
    }
}

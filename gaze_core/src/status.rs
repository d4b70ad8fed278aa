//! Pipeline mode and the per-tick result.

use crate::error::FreezeReason;
use gaze_traits::ScreenPoint;

/// What the pipeline does with a mapped point. Tracking and calibration are
/// mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Map only; nothing is emitted.
    #[default]
    Idle,
    /// Full chain through the failsafe.
    Tracking,
    /// Raw mapped point only, for sample collection.
    Calibrating,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Idle => "idle",
            Mode::Tracking => "tracking",
            Mode::Calibrating => "calibrating",
        }
    }
}

/// Outcome of one pipeline tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TickResult {
    /// A feature was available this tick.
    pub face_ok: bool,
    /// The feature was finite and usable.
    pub eye_ok: bool,
    /// Point to hand to the actuator, if any.
    pub predicted_xy: Option<ScreenPoint>,
    /// Mapped point before drift, filtering and gating.
    pub raw_xy: Option<ScreenPoint>,
    pub frozen: Option<FreezeReason>,
}

use thiserror::Error;

/// Why the failsafe is holding the cursor still.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FreezeReason {
    /// Frame gap exceeded the configured maximum.
    LowFps,
    /// No face/eye (or a non-finite feature) this tick.
    NoFeatures,
    /// Drift offset magnitude beyond the configured limit.
    DriftLimit,
    /// Cursor idle for longer than the autosleep timeout. Latches.
    Autosleep,
    /// Operator panic. Latches.
    Panic,
}

impl FreezeReason {
    /// Stable short tag used in logs and JSON output.
    pub fn as_str(self) -> &'static str {
        match self {
            FreezeReason::LowFps => "low-fps",
            FreezeReason::NoFeatures => "no-features",
            FreezeReason::DriftLimit => "drift-limit",
            FreezeReason::Autosleep => "autosleep",
            FreezeReason::Panic => "panic",
        }
    }

    /// Latched reasons survive clean ticks and need an explicit resume.
    pub fn is_latched(self) -> bool {
        matches!(self, FreezeReason::Autosleep | FreezeReason::Panic)
    }
}

impl std::fmt::Display for FreezeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone)]
pub enum GazeError {
    #[error("feature source error: {0}")]
    Source(String),
    #[error("cursor actuator error: {0}")]
    Actuator(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid state: {0}")]
    State(String),
    #[error("io error: {0}")]
    Io(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("calibration model is not trained")]
    NotTrained,
    #[error("calibration io error: {0}")]
    Io(String),
    #[error("calibration record is malformed: {0}")]
    Parse(String),
    #[error("calibration record version {found} is not supported (expected {expected})")]
    VersionMismatch { found: u32, expected: u32 },
    #[error("calibration record is invalid: {0}")]
    InvalidModel(String),
    #[error("calibration fit is degenerate: {0}")]
    Degenerate(&'static str),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing feature source")]
    MissingSource,
    #[error("missing screen size")]
    MissingScreen,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;

#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Gaze-to-cursor mapping and safety pipeline (device-agnostic).
//!
//! Feature acquisition and pointer movement go through
//! `gaze_traits::FeatureSource` and `gaze_traits::CursorActuator`; everything
//! in between lives here.
//!
//! ## Architecture
//!
//! - **Calibration**: per-axis regression from gaze feature to screen pixels,
//!   robust refit and versioned persistence (`calibration`, `regression`, `outliers`)
//! - **Drift**: slow global offset driven by reported targets (`drift`)
//! - **Filtering**: trend projection and Butterworth low-pass (`filter`)
//! - **Safety**: freeze/spike/autosleep gate (`failsafe`)
//! - **Orchestration**: one owned `Pipeline` per session (`pipeline`, `builder`),
//!   ticked by `runner::run`
//!
//! A tracking tick runs map → drift-correct → trend-project → low-pass →
//! deadzone → clamp → failsafe, always in that order.

pub mod atomic;
pub mod builder;
pub mod calibration;
pub mod config;
pub mod conversions;
pub mod drift;
pub mod error;
pub mod failsafe;
pub mod filter;
pub mod metrics;
pub mod mocks;
pub mod outliers;
pub mod pipeline;
pub mod regression;
pub mod runner;
pub mod status;
pub mod util;

pub use builder::{Missing, PipelineBuilder, Set};
pub use calibration::{
    CalibrationModel, CalibrationSample, Calibrator, FORMAT_VERSION, TrainOutcome, TrainReport,
};
pub use config::{
    CalibrationCfg, CalibrationMethod, DriftCfg, FailsafeCfg, FilterCfg, MlpCfg, ModelKind,
    OutlierPolicy, UntrainedFallback,
};
pub use drift::DriftCorrector;
pub use error::{BuildError, CalibrationError, FreezeReason, GazeError, Report, Result};
pub use failsafe::FailsafeManager;
pub use filter::{FilterStage, LowPass2D, TrendProjector};
pub use metrics::AccuracyReport;
pub use pipeline::{CalibrationSummary, Pipeline};
pub use runner::{RunOptions, RunSummary};
pub use status::{Mode, TickResult};

pub use gaze_traits::{GazeFeature, ScreenPoint, ScreenSize};

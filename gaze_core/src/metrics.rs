//! Calibration accuracy summaries in screen pixels.

use crate::util::{mean, quantile};
use gaze_traits::ScreenPoint;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AccuracyReport {
    pub count: usize,
    pub mean_px: f64,
    pub rms_px: f64,
    pub max_px: f64,
    pub median_px: f64,
    pub p90_px: f64,
}

impl AccuracyReport {
    /// Summarize Euclidean errors between predictions and targets.
    /// `None` when there are no pairs.
    pub fn from_pairs(pairs: &[(ScreenPoint, ScreenPoint)]) -> Option<Self> {
        let errs: Vec<f64> = pairs.iter().map(|(p, t)| p.distance(*t)).collect();
        Self::from_errors(&errs)
    }

    pub fn from_errors(errs: &[f64]) -> Option<Self> {
        let mean_px = mean(errs)?;
        let sq: Vec<f64> = errs.iter().map(|e| e * e).collect();
        Some(Self {
            count: errs.len(),
            mean_px,
            rms_px: mean(&sq)?.sqrt(),
            max_px: errs.iter().copied().fold(0.0, f64::max),
            median_px: quantile(errs, 0.5)?,
            p90_px: quantile(errs, 0.9)?,
        })
    }
}

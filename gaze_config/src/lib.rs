#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema and sample/trace file parsing for the gaze pointer.
//!
//! - `Config` and its sections are deserialized from TOML and validated.
//!   Every section is optional; an empty file yields the defaults.
//! - CSV loaders enforce exact headers for calibration samples (`nx,ny,x,y`)
//!   and recorded feature traces (`nx,ny`, blank cells = no feature).
use serde::Deserialize;
use std::path::Path;

/// Calibration sample CSV schema.
///
/// Expected headers:
/// nx,ny,x,y
///
/// Example:
/// nx,ny,x,y
/// 0.31,0.42,960,540
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct SampleRow {
    pub nx: f64,
    pub ny: f64,
    pub x: f64,
    pub y: f64,
}

/// One frame of a recorded feature trace. Both cells blank = no feature.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct TraceRow {
    pub nx: Option<f64>,
    pub ny: Option<f64>,
}

impl TraceRow {
    /// `Some((nx, ny))` only when both coordinates are present.
    pub fn feature(&self) -> Option<(f64, f64)> {
        match (self.nx, self.ny) {
            (Some(nx), Some(ny)) => Some((nx, ny)),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScreenCfg {
    pub width: u32,
    pub height: u32,
}

impl Default for ScreenCfg {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FilterCfg {
    /// Tick rate; drives the biquad coefficients and the runner period.
    pub sample_rate_hz: u32,
    /// Low-pass cutoff. Clamped to [0.5, 0.45 * sample_rate_hz] at runtime.
    pub cutoff_hz: f64,
    /// Trend projector history length (minimum 4).
    pub trend_window: usize,
    /// Seconds of motion to project forward.
    pub trend_lookahead_s: f64,
    /// Mean successive difference (px) below which projection is skipped.
    pub trend_jitter_px: f64,
    /// Output changes smaller than this (px) reuse the previous output.
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

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    #[default]
    Poly2,
    Mlp,
    Auto,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutlierKind {
    None,
    #[default]
    Percentile,
    Mad,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UntrainedFallback {
    #[default]
    Proportional,
    Origin,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CalibrationCfg {
    pub method: Method,
    /// Fewer accepted samples than this makes `train` a no-op.
    pub min_samples: usize,
    pub ridge_alpha: f64,
    pub mlp_hidden: usize,
    pub mlp_max_iter: usize,
    pub mlp_learning_rate: f64,
    pub mlp_seed: u64,
    pub outlier: OutlierKind,
    /// Percentile policy: percent of worst residuals to drop.
    pub drop_percent: f64,
    /// MAD policy: robust z-score cutoff.
    pub mad_threshold: f64,
    /// Robust refit only runs at or above this many samples.
    pub robust_min_samples: usize,
    pub min_keep_frac: f64,
    pub min_keep_count: usize,
    /// Mapping used while no model is trained.
    pub untrained_fallback: UntrainedFallback,
    /// Where `train` saves and tracking loads the model record.
    pub model_path: Option<String>,
}

impl Default for CalibrationCfg {
    fn default() -> Self {
        Self {
            method: Method::Poly2,
            min_samples: 12,
            ridge_alpha: 1.0,
            mlp_hidden: 16,
            mlp_max_iter: 800,
            mlp_learning_rate: 0.01,
            mlp_seed: 42,
            outlier: OutlierKind::Percentile,
            drop_percent: 15.0,
            mad_threshold: 3.5,
            robust_min_samples: 40,
            min_keep_frac: 0.7,
            min_keep_count: 30,
            untrained_fallback: UntrainedFallback::Proportional,
            model_path: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DriftCfg {
    pub enabled: bool,
    pub window: usize,
    /// Bias must exceed this fraction of the screen width before correcting.
    pub threshold_ratio: f64,
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

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FailsafeCfg {
    /// Jumps larger than this fraction of screen width are spikes.
    pub max_jump_ratio: f64,
    pub max_frame_gap_ms: u64,
    pub max_drift_px: f64,
    /// 0 disables autosleep.
    pub autosleep_s: u64,
    /// Consecutive suppressed ticks before a sustained jump is accepted; 0 (default) = never.
    pub spike_release_ticks: u32,
}

impl Default for FailsafeCfg {
    fn default() -> Self {
        Self {
            max_jump_ratio: 0.15,
            max_frame_gap_ms: 250,
            max_drift_px: 120.0,
            autosleep_s: 120,
            spike_release_ticks: 0,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct RunnerCfg {
    /// Stop after this many ticks; 0 runs until the source is exhausted or shutdown.
    pub max_ticks: u64,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Config {
    pub screen: ScreenCfg,
    pub filter: FilterCfg,
    pub calibration: CalibrationCfg,
    pub drift: DriftCfg,
    pub failsafe: FailsafeCfg,
    pub logging: Logging,
    pub runner: RunnerCfg,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read, parse, and validate a config file.
pub fn load_path(path: &Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {:?}: {}", path, e))?;
    let cfg =
        load_toml(&text).map_err(|e| eyre::eyre!("invalid configuration {:?}: {}", path, e))?;
    cfg.validate()?;
    Ok(cfg)
}

fn open_csv(
    path: &Path,
    expected: &[&str],
    what: &str,
) -> eyre::Result<csv::Reader<std::fs::File>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open {} CSV {:?}: {}", what, path, e))?;

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let actual: Vec<String> = headers.iter().map(ToString::to_string).collect();
    if actual != expected {
        eyre::bail!(
            "{} CSV must have headers '{}', got: {}",
            what,
            expected.join(","),
            actual.join(",")
        );
    }
    Ok(rdr)
}

/// Load calibration samples. Every value must be a finite number.
pub fn load_samples_csv(path: &Path) -> eyre::Result<Vec<SampleRow>> {
    let mut rdr = open_csv(path, &["nx", "ny", "x", "y"], "calibration")?;
    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<SampleRow>().enumerate() {
        match rec {
            Ok(row) => {
                if ![row.nx, row.ny, row.x, row.y].iter().all(|v| v.is_finite()) {
                    eyre::bail!("invalid CSV row {}: non-finite value", idx + 2);
                }
                rows.push(row);
            }
            Err(e) => {
                eyre::bail!("invalid CSV row {}: {}", idx + 2, e);
            }
        }
    }
    Ok(rows)
}

/// Load a recorded feature trace, one frame per row.
pub fn load_trace_csv(path: &Path) -> eyre::Result<Vec<TraceRow>> {
    let mut rdr = open_csv(path, &["nx", "ny"], "trace")?;
    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<TraceRow>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => {
                eyre::bail!("invalid CSV row {}: {}", idx + 2, e);
            }
        }
    }
    Ok(rows)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Screen
        if self.screen.width == 0 || self.screen.height == 0 {
            eyre::bail!("screen.width and screen.height must be > 0");
        }

        // Filter
        if self.filter.sample_rate_hz == 0 {
            eyre::bail!("filter.sample_rate_hz must be > 0");
        }
        if self.filter.sample_rate_hz > 1000 {
            eyre::bail!("filter.sample_rate_hz is unreasonably large (>1000)");
        }
        if !(self.filter.cutoff_hz.is_finite() && self.filter.cutoff_hz > 0.0) {
            eyre::bail!("filter.cutoff_hz must be > 0");
        }
        if self.filter.trend_window < 4 {
            eyre::bail!("filter.trend_window must be >= 4");
        }
        if !(self.filter.trend_lookahead_s.is_finite() && self.filter.trend_lookahead_s >= 0.0) {
            eyre::bail!("filter.trend_lookahead_s must be >= 0");
        }
        if !(self.filter.trend_jitter_px.is_finite() && self.filter.trend_jitter_px >= 0.0) {
            eyre::bail!("filter.trend_jitter_px must be >= 0");
        }
        if !(self.filter.deadzone_px.is_finite() && self.filter.deadzone_px >= 0.0) {
            eyre::bail!("filter.deadzone_px must be >= 0");
        }

        // Calibration
        let c = &self.calibration;
        if c.min_samples < 6 {
            eyre::bail!("calibration.min_samples must be >= 6");
        }
        if !(c.ridge_alpha.is_finite() && c.ridge_alpha >= 0.0) {
            eyre::bail!("calibration.ridge_alpha must be >= 0");
        }
        if c.mlp_hidden == 0 {
            eyre::bail!("calibration.mlp_hidden must be >= 1");
        }
        if c.mlp_max_iter == 0 {
            eyre::bail!("calibration.mlp_max_iter must be >= 1");
        }
        if !(c.mlp_learning_rate.is_finite() && c.mlp_learning_rate > 0.0) {
            eyre::bail!("calibration.mlp_learning_rate must be > 0");
        }
        if !(0.0..50.0).contains(&c.drop_percent) {
            eyre::bail!("calibration.drop_percent must be in [0, 50)");
        }
        if !(c.mad_threshold.is_finite() && c.mad_threshold > 0.0) {
            eyre::bail!("calibration.mad_threshold must be > 0");
        }
        if !(c.min_keep_frac > 0.0 && c.min_keep_frac <= 1.0) {
            eyre::bail!("calibration.min_keep_frac must be in (0, 1]");
        }

        // Drift
        if self.drift.window == 0 {
            eyre::bail!("drift.window must be >= 1");
        }
        if !(self.drift.threshold_ratio.is_finite() && self.drift.threshold_ratio >= 0.0) {
            eyre::bail!("drift.threshold_ratio must be >= 0");
        }
        if !(self.drift.learn_rate > 0.0 && self.drift.learn_rate <= 1.0) {
            eyre::bail!("drift.learn_rate must be in (0, 1]");
        }

        // Failsafe
        if !(self.failsafe.max_jump_ratio > 0.0 && self.failsafe.max_jump_ratio <= 1.0) {
            eyre::bail!("failsafe.max_jump_ratio must be in (0, 1]");
        }
        if self.failsafe.max_frame_gap_ms == 0 {
            eyre::bail!("failsafe.max_frame_gap_ms must be >= 1");
        }
        if !(self.failsafe.max_drift_px.is_finite() && self.failsafe.max_drift_px > 0.0) {
            eyre::bail!("failsafe.max_drift_px must be > 0");
        }
        if self.failsafe.autosleep_s > 24 * 60 * 60 {
            eyre::bail!("failsafe.autosleep_s is unreasonably large (>24h)");
        }

        // Logging
        if let Some(r) = self.logging.rotation.as_deref()
            && !matches!(r, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_valid_defaults() {
        let cfg = load_toml("").expect("parse");
        cfg.validate().expect("defaults validate");
        assert_eq!(cfg.filter.sample_rate_hz, 30);
        assert_eq!(cfg.calibration.min_samples, 12);
        assert_eq!(cfg.calibration.method, Method::Poly2);
        assert!(cfg.drift.enabled);
    }

    #[test]
    fn trace_row_requires_both_axes() {
        let r = TraceRow {
            nx: Some(0.1),
            ny: None,
        };
        assert_eq!(r.feature(), None);
        let r = TraceRow {
            nx: Some(0.1),
            ny: Some(0.2),
        };
        assert_eq!(r.feature(), Some((0.1, 0.2)));
    }
}

//! Per-user feature→screen mapping.
//!
//! The `Calibrator` owns the sample set collected during a calibration
//! session and the trained `CalibrationModel`. Training is atomic: the new
//! model replaces the old one only after both axes fit cleanly, and a failed
//! or skipped `train` leaves the previous model untouched.
//!
//! ## Persisted record
//!
//! Models are saved as a versioned JSON record (`format_version = 1`). Loading
//! validates version, method tag, layer sizes and finiteness before anything
//! is applied.

use std::path::Path;

use gaze_traits::{GazeFeature, ScreenPoint, ScreenSize};
use serde::{Deserialize, Serialize};

use crate::config::{CalibrationCfg, CalibrationMethod, MlpCfg, ModelKind, OutlierPolicy};
use crate::error::CalibrationError;
use crate::outliers::{inlier_mask, min_keep};
use crate::regression::{AxisModel, MlpAxis, Poly2Axis};

pub const FORMAT_VERSION: u32 = 1;

/// Absolute floor for `min_samples`; below this the quadratic fit is underdetermined.
pub const MIN_SAMPLES_FLOOR: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationSample {
    pub feature: GazeFeature,
    pub target: ScreenPoint,
}

/// Training-time hyperparameters stored alongside a model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hyper {
    pub ridge_alpha: f64,
    #[serde(flatten)]
    pub mlp: MlpCfg,
}

/// A trained per-axis mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationModel {
    method: ModelKind,
    hyper: Hyper,
    rmse_px: f64,
    x: AxisModel,
    y: AxisModel,
}

impl CalibrationModel {
    pub fn method(&self) -> ModelKind {
        self.method
    }

    pub fn hyper(&self) -> Hyper {
        self.hyper
    }

    /// In-sample RMSE (px) over the samples the model was fitted on.
    pub fn rmse_px(&self) -> f64 {
        self.rmse_px
    }

    pub fn predict_raw(&self, f: GazeFeature) -> (f64, f64) {
        let x = [f.nx, f.ny];
        (self.x.predict(x), self.y.predict(x))
    }

    /// Serialize as the versioned JSON record.
    pub fn to_json(&self) -> Result<String, CalibrationError> {
        let rec = ModelRecord {
            format_version: FORMAT_VERSION,
            method: self.method,
            hyper: self.hyper,
            rmse_px: self.rmse_px,
            x: self.x.clone(),
            y: self.y.clone(),
        };
        serde_json::to_string_pretty(&rec).map_err(|e| CalibrationError::Parse(e.to_string()))
    }

    /// Parse and validate a versioned JSON record.
    pub fn from_json(bytes: &[u8]) -> Result<Self, CalibrationError> {
        let probe: VersionProbe =
            serde_json::from_slice(bytes).map_err(|e| CalibrationError::Parse(e.to_string()))?;
        if probe.format_version != FORMAT_VERSION {
            return Err(CalibrationError::VersionMismatch {
                found: probe.format_version,
                expected: FORMAT_VERSION,
            });
        }
        let rec: ModelRecord =
            serde_json::from_slice(bytes).map_err(|e| CalibrationError::Parse(e.to_string()))?;

        for (axis, m) in [("x", &rec.x), ("y", &rec.y)] {
            if m.kind() != rec.method {
                return Err(CalibrationError::InvalidModel(format!(
                    "{axis} axis is {} but the record method is {}",
                    m.kind().as_str(),
                    rec.method.as_str()
                )));
            }
            m.validate()
                .map_err(|e| CalibrationError::InvalidModel(format!("{axis} axis: {e}")))?;
        }
        if !rec.rmse_px.is_finite() {
            return Err(CalibrationError::InvalidModel("rmse_px must be finite".into()));
        }
        Ok(Self {
            method: rec.method,
            hyper: rec.hyper,
            rmse_px: rec.rmse_px,
            x: rec.x,
            y: rec.y,
        })
    }
}

#[derive(Deserialize)]
struct VersionProbe {
    format_version: u32,
}

#[derive(Serialize, Deserialize)]
struct ModelRecord {
    format_version: u32,
    method: ModelKind,
    hyper: Hyper,
    rmse_px: f64,
    x: AxisModel,
    y: AxisModel,
}

/// Result of a `train` call that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum TrainOutcome {
    Trained(TrainReport),
    /// Not enough samples; any existing model is unchanged.
    InsufficientSamples { have: usize, need: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainReport {
    pub method: ModelKind,
    pub rmse_px: f64,
    pub inliers: usize,
    pub total: usize,
}

pub struct Calibrator {
    cfg: CalibrationCfg,
    screen: ScreenSize,
    samples: Vec<CalibrationSample>,
    model: Option<CalibrationModel>,
    inliers: Vec<bool>,
}

impl core::fmt::Debug for Calibrator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Calibrator")
            .field("samples", &self.samples.len())
            .field("method", &self.method())
            .field("screen", &self.screen)
            .finish()
    }
}

impl Calibrator {
    pub fn new(cfg: CalibrationCfg, screen: ScreenSize) -> Self {
        Self {
            cfg,
            screen,
            samples: Vec::new(),
            model: None,
            inliers: Vec::new(),
        }
    }

    pub fn config(&self) -> &CalibrationCfg {
        &self.cfg
    }

    pub fn set_screen_size(&mut self, screen: ScreenSize) {
        self.screen = screen;
    }

    pub fn screen_size(&self) -> ScreenSize {
        self.screen
    }

    /// Record one sample. Non-finite features are ignored and return `false`.
    pub fn add_sample(&mut self, feature: GazeFeature, target: ScreenPoint) -> bool {
        if !feature.is_finite() {
            tracing::debug!("non-finite calibration feature ignored");
            return false;
        }
        self.samples.push(CalibrationSample { feature, target });
        true
    }

    pub fn samples(&self) -> &[CalibrationSample] {
        &self.samples
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn is_trained(&self) -> bool {
        self.model.is_some()
    }

    pub fn method(&self) -> Option<ModelKind> {
        self.model.as_ref().map(CalibrationModel::method)
    }

    pub fn model(&self) -> Option<&CalibrationModel> {
        self.model.as_ref()
    }

    /// Inlier mask from the last successful `train`, one entry per sample.
    pub fn last_inlier_mask(&self) -> &[bool] {
        &self.inliers
    }

    /// Drop samples, model and inlier mask.
    pub fn reset(&mut self) {
        self.samples.clear();
        self.model = None;
        self.inliers.clear();
    }

    /// Drop collected samples but keep the current model.
    pub fn clear_samples(&mut self) {
        self.samples.clear();
    }

    pub fn train(&mut self) -> Result<TrainOutcome, CalibrationError> {
        let need = self.cfg.min_samples.max(MIN_SAMPLES_FLOOR);
        let have = self.samples.len();
        if have < need {
            tracing::info!(have, need, "not enough calibration samples; model unchanged");
            return Ok(TrainOutcome::InsufficientSamples { have, need });
        }

        let xs: Vec<[f64; 2]> = self
            .samples
            .iter()
            .map(|s| [s.feature.nx, s.feature.ny])
            .collect();
        let tx: Vec<f64> = self.samples.iter().map(|s| f64::from(s.target.x)).collect();
        let ty: Vec<f64> = self.samples.iter().map(|s| f64::from(s.target.y)).collect();

        let first = fit(&self.cfg, &xs, &tx, &ty)?;
        let residuals = first.residuals(&xs, &tx, &ty);

        let robust = have >= self.cfg.robust_min_samples
            && !matches!(self.cfg.outlier, OutlierPolicy::Disabled);
        let mask = if robust {
            let keep = min_keep(have, self.cfg.min_keep_frac, self.cfg.min_keep_count);
            inlier_mask(&residuals, self.cfg.outlier, keep)
        } else {
            vec![true; have]
        };
        let inliers = mask.iter().filter(|&&k| k).count();

        let fitted = if inliers < have {
            let pick = |v: &[f64]| -> Vec<f64> {
                v.iter().zip(&mask).filter(|(_, k)| **k).map(|(e, _)| *e).collect()
            };
            let xs_in: Vec<[f64; 2]> = xs
                .iter()
                .zip(&mask)
                .filter(|(_, k)| **k)
                .map(|(x, _)| *x)
                .collect();
            let tx_in = pick(&tx);
            let ty_in = pick(&ty);
            fit(&self.cfg, &xs_in, &tx_in, &ty_in)?
        } else {
            first
        };

        let report = TrainReport {
            method: fitted.method,
            rmse_px: fitted.rmse_px,
            inliers,
            total: have,
        };
        self.model = Some(CalibrationModel {
            method: fitted.method,
            hyper: Hyper {
                ridge_alpha: self.cfg.ridge_alpha,
                mlp: self.cfg.mlp,
            },
            rmse_px: fitted.rmse_px,
            x: fitted.x,
            y: fitted.y,
        });
        self.inliers = mask;
        tracing::info!(
            method = report.method.as_str(),
            rmse_px = report.rmse_px,
            inliers = report.inliers,
            total = report.total,
            "calibration trained"
        );
        Ok(TrainOutcome::Trained(report))
    }

    /// Unclamped prediction; `None` when untrained or the feature is non-finite.
    pub fn predict_raw(&self, feature: GazeFeature) -> Option<(f64, f64)> {
        if !feature.is_finite() {
            return None;
        }
        let (x, y) = self.model.as_ref()?.predict_raw(feature);
        (x.is_finite() && y.is_finite()).then_some((x, y))
    }

    /// Screen point for `feature`, always inside the screen. `(0, 0)` when untrained.
    pub fn predict(&self, feature: GazeFeature) -> ScreenPoint {
        match self.predict_raw(feature) {
            Some((x, y)) => self.screen.clamp_f64(x, y),
            None => ScreenPoint::new(0, 0),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), CalibrationError> {
        let model = self.model.as_ref().ok_or(CalibrationError::NotTrained)?;
        let json = model.to_json()?;
        crate::atomic::write_atomic(path, json.as_bytes())
            .map_err(|e| CalibrationError::Io(format!("{}: {e}", path.display())))?;
        tracing::info!(
            path = %path.display(),
            method = model.method().as_str(),
            "calibration saved"
        );
        Ok(())
    }

    /// Replace the model with the one stored at `path`. On any error the
    /// current model is kept.
    pub fn load(&mut self, path: &Path) -> Result<(), CalibrationError> {
        let bytes = std::fs::read(path)
            .map_err(|e| CalibrationError::Io(format!("{}: {e}", path.display())))?;
        let model = CalibrationModel::from_json(&bytes)?;
        tracing::info!(
            path = %path.display(),
            method = model.method().as_str(),
            "calibration loaded"
        );
        self.model = Some(model);
        self.inliers.clear();
        Ok(())
    }
}

struct Fitted {
    method: ModelKind,
    x: AxisModel,
    y: AxisModel,
    rmse_px: f64,
}

impl Fitted {
    fn new(
        method: ModelKind,
        x: AxisModel,
        y: AxisModel,
        xs: &[[f64; 2]],
        tx: &[f64],
        ty: &[f64],
    ) -> Self {
        let mut f = Self {
            method,
            x,
            y,
            rmse_px: 0.0,
        };
        let r = f.residuals(xs, tx, ty);
        f.rmse_px = (r.iter().map(|e| e * e).sum::<f64>() / r.len().max(1) as f64).sqrt();
        f
    }

    /// Euclidean residual per sample.
    fn residuals(&self, xs: &[[f64; 2]], tx: &[f64], ty: &[f64]) -> Vec<f64> {
        xs.iter()
            .zip(tx.iter().zip(ty))
            .map(|(&x, (&ex, &ey))| (self.x.predict(x) - ex).hypot(self.y.predict(x) - ey))
            .collect()
    }
}

fn fit_poly2(
    cfg: &CalibrationCfg,
    xs: &[[f64; 2]],
    tx: &[f64],
    ty: &[f64],
) -> Result<Fitted, CalibrationError> {
    let x = Poly2Axis::fit(xs, tx, cfg.ridge_alpha)?;
    let y = Poly2Axis::fit(xs, ty, cfg.ridge_alpha)?;
    Ok(Fitted::new(
        ModelKind::Poly2,
        AxisModel::Poly2(x),
        AxisModel::Poly2(y),
        xs,
        tx,
        ty,
    ))
}

fn fit_mlp(
    cfg: &CalibrationCfg,
    xs: &[[f64; 2]],
    tx: &[f64],
    ty: &[f64],
) -> Result<Fitted, CalibrationError> {
    let x = MlpAxis::fit(xs, tx, &cfg.mlp)?;
    let y_cfg = MlpCfg {
        seed: cfg.mlp.seed.wrapping_add(1),
        ..cfg.mlp
    };
    let y = MlpAxis::fit(xs, ty, &y_cfg)?;
    Ok(Fitted::new(
        ModelKind::Mlp,
        AxisModel::Mlp(x),
        AxisModel::Mlp(y),
        xs,
        tx,
        ty,
    ))
}

fn fit(
    cfg: &CalibrationCfg,
    xs: &[[f64; 2]],
    tx: &[f64],
    ty: &[f64],
) -> Result<Fitted, CalibrationError> {
    match cfg.method {
        CalibrationMethod::Poly2 => fit_poly2(cfg, xs, tx, ty),
        CalibrationMethod::Mlp => fit_mlp(cfg, xs, tx, ty),
        CalibrationMethod::Auto => {
            let poly = fit_poly2(cfg, xs, tx, ty);
            let mlp = fit_mlp(cfg, xs, tx, ty);
            match (poly, mlp) {
                (Ok(p), Ok(m)) => {
                    tracing::debug!(
                        poly2_rmse = p.rmse_px,
                        mlp_rmse = m.rmse_px,
                        "auto method candidates"
                    );
                    Ok(if m.rmse_px < p.rmse_px { m } else { p })
                }
                (Ok(p), Err(e)) => {
                    tracing::warn!(error = %e, "mlp candidate failed; using poly2");
                    Ok(p)
                }
                (Err(e), Ok(m)) => {
                    tracing::warn!(error = %e, "poly2 candidate failed; using mlp");
                    Ok(m)
                }
                (Err(e), Err(_)) => Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn affine_samples(n_side: usize) -> Calibrator {
        let mut c = Calibrator::new(CalibrationCfg::default(), ScreenSize::new(1920, 1080));
        for i in 0..n_side {
            for j in 0..n_side {
                let nx = i as f64 / (n_side - 1) as f64;
                let ny = j as f64 / (n_side - 1) as f64;
                let t = ScreenPoint::new(
                    (nx * 1919.0).round() as i32,
                    (ny * 1079.0).round() as i32,
                );
                c.add_sample(GazeFeature::new(nx, ny), t);
            }
        }
        c
    }

    #[test]
    fn untrained_predicts_origin() {
        let c = Calibrator::new(CalibrationCfg::default(), ScreenSize::default());
        assert_eq!(c.predict(GazeFeature::new(0.5, 0.5)), ScreenPoint::new(0, 0));
        assert_eq!(c.predict_raw(GazeFeature::new(0.5, 0.5)), None);
    }

    #[test]
    fn non_finite_samples_are_ignored() {
        let mut c = Calibrator::new(CalibrationCfg::default(), ScreenSize::default());
        assert!(!c.add_sample(GazeFeature::new(f64::NAN, 0.1), ScreenPoint::new(0, 0)));
        assert!(c.add_sample(GazeFeature::new(0.2, 0.1), ScreenPoint::new(0, 0)));
        assert_eq!(c.sample_count(), 1);
    }

    #[test]
    fn trains_on_grid_and_reports_every_sample_as_inlier() {
        let mut c = affine_samples(5);
        let out = c.train().unwrap();
        let TrainOutcome::Trained(r) = out else {
            panic!("expected trained outcome, got {out:?}");
        };
        assert_eq!(r.total, 25);
        assert_eq!(r.inliers, 25);
        assert_eq!(c.last_inlier_mask().len(), 25);
        let p = c.predict(GazeFeature::new(0.5, 0.5));
        assert!((f64::from(p.x) - 960.0).abs() < 30.0, "{p:?}");
        assert!((f64::from(p.y) - 540.0).abs() < 30.0, "{p:?}");
    }

    #[test]
    fn save_untrained_is_an_error() {
        let c = Calibrator::new(CalibrationCfg::default(), ScreenSize::default());
        let dir = std::env::temp_dir().join("gaze_core_cal_untrained.json");
        assert_eq!(c.save(&dir), Err(CalibrationError::NotTrained));
    }

    #[test]
    fn record_with_wrong_version_is_rejected() {
        let mut c = affine_samples(4);
        c.train().unwrap();
        let json = c.model().unwrap().to_json().unwrap();
        let bumped = json.replacen("\"format_version\": 1", "\"format_version\": 2", 1);
        assert_eq!(
            CalibrationModel::from_json(bumped.as_bytes()),
            Err(CalibrationError::VersionMismatch {
                found: 2,
                expected: 1
            })
        );
    }
}

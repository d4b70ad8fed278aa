//! Per-axis regressors mapping a 2D gaze feature to one screen coordinate.
//!
//! Both estimators standardize their inputs (z-score) first:
//! - `Poly2Axis`: degree-2 polynomial expansion `[z1, z2, z1^2, z1*z2, z2^2]`
//!   fitted by ridge regression with an unpenalized intercept, solved in
//!   closed form on the centered normal equations.
//! - `MlpAxis`: one tanh hidden layer with a linear output, trained on
//!   standardized targets by full-batch Adam from a seeded initialisation.
//!   Identical inputs and seed give bit-identical weights.

use crate::config::MlpCfg;
use crate::error::CalibrationError;
use serde::{Deserialize, Serialize};

pub const POLY2_TERMS: usize = 5;

/// Z-score normalization of the 2D input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Standardizer {
    pub mean: [f64; 2],
    pub scale: [f64; 2],
}

impl Standardizer {
    /// Population mean and standard deviation per column; a zero deviation
    /// is replaced by 1 so constant columns map to 0.
    pub fn fit(xs: &[[f64; 2]]) -> Self {
        let n = xs.len().max(1) as f64;
        let mut mean = [0.0; 2];
        for x in xs {
            mean[0] += x[0];
            mean[1] += x[1];
        }
        mean[0] /= n;
        mean[1] /= n;
        let mut var = [0.0; 2];
        for x in xs {
            var[0] += (x[0] - mean[0]).powi(2);
            var[1] += (x[1] - mean[1]).powi(2);
        }
        let scale = var.map(|v| {
            let s = (v / n).sqrt();
            if s > 1e-12 && s.is_finite() { s } else { 1.0 }
        });
        Self { mean, scale }
    }

    #[inline]
    pub fn apply(&self, x: [f64; 2]) -> [f64; 2] {
        [
            (x[0] - self.mean[0]) / self.scale[0],
            (x[1] - self.mean[1]) / self.scale[1],
        ]
    }

    fn is_valid(&self) -> bool {
        self.mean.iter().all(|v| v.is_finite())
            && self.scale.iter().all(|v| v.is_finite() && *v > 0.0)
    }
}

#[inline]
fn poly2_terms(z: [f64; 2]) -> [f64; POLY2_TERMS] {
    [z[0], z[1], z[0] * z[0], z[0] * z[1], z[1] * z[1]]
}

/// Solve `a * w = b` in place by Gaussian elimination with partial pivoting.
fn solve<const N: usize>(
    mut a: [[f64; N]; N],
    mut b: [f64; N],
) -> Result<[f64; N], CalibrationError> {
    for col in 0..N {
        let pivot = (col..N)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        if !(a[pivot][col].abs() > 1e-12) {
            return Err(CalibrationError::Degenerate("singular normal equations"));
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in (col + 1)..N {
            let f = a[row][col] / a[col][col];
            if f == 0.0 {
                continue;
            }
            for k in col..N {
                a[row][k] -= f * a[col][k];
            }
            b[row] -= f * b[col];
        }
    }
    let mut w = [0.0; N];
    for row in (0..N).rev() {
        let mut acc = b[row];
        for k in (row + 1)..N {
            acc -= a[row][k] * w[k];
        }
        w[row] = acc / a[row][row];
    }
    if w.iter().all(|v| v.is_finite()) {
        Ok(w)
    } else {
        Err(CalibrationError::Degenerate("non-finite coefficients"))
    }
}

/// Ridge regression over degree-2 polynomial terms of the standardized input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poly2Axis {
    pub input: Standardizer,
    pub coef: [f64; POLY2_TERMS],
    pub intercept: f64,
}

impl Poly2Axis {
    pub fn fit(xs: &[[f64; 2]], ys: &[f64], alpha: f64) -> Result<Self, CalibrationError> {
        if xs.is_empty() || xs.len() != ys.len() {
            return Err(CalibrationError::Degenerate("empty or mismatched training set"));
        }
        let input = Standardizer::fit(xs);
        let n = xs.len() as f64;
        let feats: Vec<[f64; POLY2_TERMS]> =
            xs.iter().map(|&x| poly2_terms(input.apply(x))).collect();

        let mut f_mean = [0.0; POLY2_TERMS];
        for f in &feats {
            for (m, v) in f_mean.iter_mut().zip(f) {
                *m += v;
            }
        }
        f_mean.iter_mut().for_each(|m| *m /= n);
        let y_mean = ys.iter().sum::<f64>() / n;

        // Centering the design absorbs the intercept, so only the coefficients are penalized.
        let mut ata = [[0.0; POLY2_TERMS]; POLY2_TERMS];
        let mut aty = [0.0; POLY2_TERMS];
        for (f, y) in feats.iter().zip(ys) {
            let mut c = [0.0; POLY2_TERMS];
            for k in 0..POLY2_TERMS {
                c[k] = f[k] - f_mean[k];
            }
            let yc = y - y_mean;
            for i in 0..POLY2_TERMS {
                aty[i] += c[i] * yc;
                for j in 0..POLY2_TERMS {
                    ata[i][j] += c[i] * c[j];
                }
            }
        }
        for (i, row) in ata.iter_mut().enumerate() {
            row[i] += alpha.max(0.0);
        }

        let coef = solve(ata, aty)?;
        let intercept = y_mean - coef.iter().zip(&f_mean).map(|(w, m)| w * m).sum::<f64>();
        if !intercept.is_finite() {
            return Err(CalibrationError::Degenerate("non-finite intercept"));
        }
        Ok(Self {
            input,
            coef,
            intercept,
        })
    }

    pub fn predict(&self, x: [f64; 2]) -> f64 {
        let f = poly2_terms(self.input.apply(x));
        self.intercept + self.coef.iter().zip(&f).map(|(w, v)| w * v).sum::<f64>()
    }

    fn validate(&self) -> Result<(), String> {
        if !self.input.is_valid() {
            return Err("poly2 input normalization must be finite with positive scale".into());
        }
        if !(self.coef.iter().all(|v| v.is_finite()) && self.intercept.is_finite()) {
            return Err("poly2 coefficients must be finite".into());
        }
        Ok(())
    }
}

/// xorshift64*; deterministic weight initialisation without an RNG dependency.
struct XorShift(u64);

impl XorShift {
    fn new(seed: u64) -> Self {
        // Zero is a fixed point of xorshift.
        Self(seed ^ 0x9E37_79B9_7F4A_7C15)
    }

    fn next_f64(&mut self) -> f64 {
        let mut x = self.0;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.0 = x;
        let r = x.wrapping_mul(0x2545_F491_4F6C_DD1D);
        (r >> 11) as f64 / (1u64 << 53) as f64
    }

    fn uniform(&mut self, bound: f64) -> f64 {
        (self.next_f64() * 2.0 - 1.0) * bound
    }
}

/// Single hidden layer tanh network with a linear output unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlpAxis {
    pub input: Standardizer,
    pub w1: Vec<[f64; 2]>,
    pub b1: Vec<f64>,
    pub w2: Vec<f64>,
    pub b2: f64,
    pub target_mean: f64,
    pub target_scale: f64,
}

/// Adam moment estimates for one parameter vector.
struct Moments {
    m: Vec<f64>,
    v: Vec<f64>,
}

impl Moments {
    fn new(n: usize) -> Self {
        Self {
            m: vec![0.0; n],
            v: vec![0.0; n],
        }
    }
}

const ADAM_BETA1: f64 = 0.9;
const ADAM_BETA2: f64 = 0.999;
const ADAM_EPS: f64 = 1e-8;

impl MlpAxis {
    pub fn fit(xs: &[[f64; 2]], ys: &[f64], cfg: &MlpCfg) -> Result<Self, CalibrationError> {
        if xs.is_empty() || xs.len() != ys.len() {
            return Err(CalibrationError::Degenerate("empty or mismatched training set"));
        }
        let hidden = cfg.hidden.max(1);
        let input = Standardizer::fit(xs);
        let n = xs.len() as f64;
        let target_mean = ys.iter().sum::<f64>() / n;
        let target_scale = {
            let var = ys.iter().map(|y| (y - target_mean).powi(2)).sum::<f64>() / n;
            let s = var.sqrt();
            if s > 1e-12 && s.is_finite() { s } else { 1.0 }
        };
        let zs: Vec<[f64; 2]> = xs.iter().map(|&x| input.apply(x)).collect();
        let ts: Vec<f64> = ys.iter().map(|y| (y - target_mean) / target_scale).collect();

        // Glorot-uniform init
        let mut rng = XorShift::new(cfg.seed);
        let b_in = (6.0 / (2.0 + hidden as f64)).sqrt();
        let b_out = (6.0 / (hidden as f64 + 1.0)).sqrt();
        let mut w1: Vec<[f64; 2]> = (0..hidden)
            .map(|_| [rng.uniform(b_in), rng.uniform(b_in)])
            .collect();
        let mut b1: Vec<f64> = (0..hidden).map(|_| rng.uniform(b_in)).collect();
        let mut w2: Vec<f64> = (0..hidden).map(|_| rng.uniform(b_out)).collect();
        let mut b2 = 0.0;

        // Flattened parameter layout: w1 (2h), b1 (h), w2 (h), b2 (1)
        let n_params = 4 * hidden + 1;
        let mut mom = Moments::new(n_params);
        let mut grad = vec![0.0; n_params];
        let mut h = vec![0.0; hidden];
        let lr = cfg.learning_rate;

        for step in 1..=cfg.max_iter.max(1) {
            grad.iter_mut().for_each(|g| *g = 0.0);
            for (z, t) in zs.iter().zip(&ts) {
                let mut out = b2;
                for j in 0..hidden {
                    h[j] = (w1[j][0] * z[0] + w1[j][1] * z[1] + b1[j]).tanh();
                    out += w2[j] * h[j];
                }
                // d(0.5 * mean sq err)/d out
                let d_out = (out - t) / n;
                for j in 0..hidden {
                    let d_h = d_out * w2[j] * (1.0 - h[j] * h[j]);
                    grad[2 * j] += d_h * z[0];
                    grad[2 * j + 1] += d_h * z[1];
                    grad[2 * hidden + j] += d_h;
                    grad[3 * hidden + j] += d_out * h[j];
                }
                grad[4 * hidden] += d_out;
            }

            let bc1 = 1.0 - ADAM_BETA1.powi(step as i32);
            let bc2 = 1.0 - ADAM_BETA2.powi(step as i32);
            let mut update = |idx: usize, p: &mut f64| {
                let g = grad[idx];
                mom.m[idx] = ADAM_BETA1 * mom.m[idx] + (1.0 - ADAM_BETA1) * g;
                mom.v[idx] = ADAM_BETA2 * mom.v[idx] + (1.0 - ADAM_BETA2) * g * g;
                let m_hat = mom.m[idx] / bc1;
                let v_hat = mom.v[idx] / bc2;
                *p -= lr * m_hat / (v_hat.sqrt() + ADAM_EPS);
            };
            for j in 0..hidden {
                update(2 * j, &mut w1[j][0]);
                update(2 * j + 1, &mut w1[j][1]);
                update(2 * hidden + j, &mut b1[j]);
                update(3 * hidden + j, &mut w2[j]);
            }
            update(4 * hidden, &mut b2);
        }

        let model = Self {
            input,
            w1,
            b1,
            w2,
            b2,
            target_mean,
            target_scale,
        };
        model.validate().map_err(|_| CalibrationError::Degenerate("mlp weights diverged"))?;
        Ok(model)
    }

    pub fn predict(&self, x: [f64; 2]) -> f64 {
        let z = self.input.apply(x);
        let mut out = self.b2;
        for ((w, b), v) in self.w1.iter().zip(&self.b1).zip(&self.w2) {
            out += v * (w[0] * z[0] + w[1] * z[1] + b).tanh();
        }
        out * self.target_scale + self.target_mean
    }

    pub fn hidden(&self) -> usize {
        self.w1.len()
    }

    fn validate(&self) -> Result<(), String> {
        let h = self.w1.len();
        if h == 0 || self.b1.len() != h || self.w2.len() != h {
            return Err(format!(
                "mlp layer sizes disagree (w1={}, b1={}, w2={})",
                h,
                self.b1.len(),
                self.w2.len()
            ));
        }
        if !self.input.is_valid() {
            return Err("mlp input normalization must be finite with positive scale".into());
        }
        let finite = self.w1.iter().all(|w| w[0].is_finite() && w[1].is_finite())
            && self.b1.iter().all(|v| v.is_finite())
            && self.w2.iter().all(|v| v.is_finite())
            && self.b2.is_finite()
            && self.target_mean.is_finite()
            && self.target_scale.is_finite()
            && self.target_scale > 0.0;
        if !finite {
            return Err("mlp weights must be finite".into());
        }
        Ok(())
    }
}

/// A fitted estimator for one screen axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AxisModel {
    Poly2(Poly2Axis),
    Mlp(MlpAxis),
}

impl AxisModel {
    pub fn predict(&self, x: [f64; 2]) -> f64 {
        match self {
            AxisModel::Poly2(m) => m.predict(x),
            AxisModel::Mlp(m) => m.predict(x),
        }
    }

    pub fn kind(&self) -> crate::config::ModelKind {
        match self {
            AxisModel::Poly2(_) => crate::config::ModelKind::Poly2,
            AxisModel::Mlp(_) => crate::config::ModelKind::Mlp,
        }
    }

    /// Structural and numeric sanity check for records read from disk.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            AxisModel::Poly2(m) => m.validate(),
            AxisModel::Mlp(m) => m.validate(),
        }
    }
}

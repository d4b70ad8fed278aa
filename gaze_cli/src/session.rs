//! Subcommand bodies: pipeline assembly from config, train, eval, replay and self-check.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use eyre::WrapErr;
use gaze_config::Config;
use gaze_core::conversions::screen_size;
use gaze_core::mocks::{NoFeatures, ScriptedSource};
use gaze_core::{
    AccuracyReport, Calibrator, Pipeline, RunOptions, TickResult, TrainOutcome, runner,
};
use gaze_traits::clock::{Clock, ManualClock};
use gaze_traits::{CursorActuator, FeatureSource, GazeFeature, ScreenPoint};
use serde_json::json;

use crate::cli::MethodArg;
use crate::error_fmt::CliError;

/// Assemble a pipeline from the typed config via `gaze_core::conversions`.
pub fn build_pipeline(
    cfg: &Config,
    source: impl FeatureSource + 'static,
    clock: Option<Box<dyn Clock + Send + Sync>>,
) -> eyre::Result<Pipeline> {
    let screen = screen_size(&cfg.screen);
    let mut builder = Pipeline::builder()
        .with_source(source)
        .with_screen(screen)
        .with_filter((&cfg.filter).into())
        .with_calibration((&cfg.calibration).into())
        .with_drift((&cfg.drift).into())
        .with_failsafe((&cfg.failsafe).into())
        .with_untrained_fallback(cfg.calibration.untrained_fallback.into());
    if let Some(c) = clock {
        builder = builder.with_clock(c);
    }
    builder.build()
}

fn to_point(x: f64, y: f64) -> ScreenPoint {
    ScreenPoint::new(x.round() as i32, y.round() as i32)
}

fn load_samples(path: &Path) -> eyre::Result<Vec<(GazeFeature, ScreenPoint)>> {
    let rows = gaze_config::load_samples_csv(path)?;
    Ok(rows
        .into_iter()
        .map(|r| (GazeFeature::new(r.nx, r.ny), to_point(r.x, r.y)))
        .collect())
}

fn print_line(line: &str) -> eyre::Result<()> {
    let mut out = std::io::stdout().lock();
    writeln!(out, "{line}").wrap_err("write stdout")
}

fn print_accuracy_human(acc: Option<&AccuracyReport>) -> eyre::Result<()> {
    match acc {
        Some(a) => print_line(&format!(
            "Accuracy over {} samples: mean {:.1}px, rms {:.1}px, median {:.1}px, p90 {:.1}px, max {:.1}px",
            a.count, a.mean_px, a.rms_px, a.median_px, a.p90_px, a.max_px
        )),
        None => print_line("Accuracy: no samples"),
    }
}

pub fn run_train(
    cfg: &Config,
    samples: &Path,
    out: Option<&Path>,
    method: Option<MethodArg>,
    json_mode: bool,
) -> eyre::Result<()> {
    let mut cfg = cfg.clone();
    if let Some(m) = method {
        cfg.calibration.method = m.into();
    }
    let out: PathBuf = match out {
        Some(p) => p.to_path_buf(),
        None => cfg
            .calibration
            .model_path
            .as_deref()
            .map(PathBuf::from)
            .ok_or(CliError::NoModelPath)?,
    };

    let rows = load_samples(samples)?;
    let mut pipeline = build_pipeline(&cfg, NoFeatures, None)?;
    pipeline.start_calibration();
    let mut accepted = 0usize;
    for &(feature, target) in &rows {
        if pipeline.add_calibration_sample(feature, target) {
            accepted += 1;
        }
    }
    tracing::info!(
        rows = rows.len(),
        accepted,
        method = ?cfg.calibration.method,
        "training"
    );

    let summary = pipeline.finish_calibration()?;
    let report = match summary.outcome {
        TrainOutcome::Trained(r) => r,
        TrainOutcome::InsufficientSamples { have, need } => {
            return Err(eyre::Report::new(CliError::InsufficientSamples { have, need }));
        }
    };
    pipeline
        .save_model(&out)
        .wrap_err_with(|| format!("save model to {}", out.display()))?;
    tracing::info!(path = %out.display(), method = report.method.as_str(), "model saved");

    if json_mode {
        let line = json!({
            "method": report.method.as_str(),
            "rmse_px": report.rmse_px,
            "inliers": report.inliers,
            "total": report.total,
            "model": out.display().to_string(),
            "accuracy": summary.accuracy,
        });
        print_line(&line.to_string())
    } else {
        print_line(&format!(
            "Trained {} model on {}/{} samples (rmse {:.2}px), saved to {}",
            report.method.as_str(),
            report.inliers,
            report.total,
            report.rmse_px,
            out.display()
        ))?;
        print_accuracy_human(summary.accuracy.as_ref())
    }
}

pub fn run_eval(cfg: &Config, model: &Path, samples: &Path, json_mode: bool) -> eyre::Result<()> {
    let screen = screen_size(&cfg.screen);
    let mut calibrator = Calibrator::new((&cfg.calibration).into(), screen);
    calibrator
        .load(model)
        .wrap_err_with(|| format!("load model {}", model.display()))?;

    let pairs: Vec<(ScreenPoint, ScreenPoint)> = load_samples(samples)?
        .into_iter()
        .filter(|(f, _)| f.is_finite())
        .map(|(f, t)| (calibrator.predict(f), screen.clamp(t)))
        .collect();
    let acc = AccuracyReport::from_pairs(&pairs);

    if json_mode {
        let line = json!({
            "method": calibrator.method().map(|m| m.as_str()),
            "accuracy": acc,
        });
        print_line(&line.to_string())
    } else {
        print_accuracy_human(acc.as_ref())
    }
}

/// One JSONL record per tick.
pub fn tick_json(tick: u64, res: &TickResult) -> serde_json::Value {
    json!({
        "tick": tick,
        "face_ok": res.face_ok,
        "eye_ok": res.eye_ok,
        "x": res.predicted_xy.map(|p| p.x),
        "y": res.predicted_xy.map(|p| p.y),
        "raw_x": res.raw_xy.map(|p| p.x),
        "raw_y": res.raw_xy.map(|p| p.y),
        "frozen": res.frozen.map(|r| r.as_str()),
    })
}

/// Prints each emitted cursor position on its own line.
struct StdoutActuator {
    json: bool,
}

impl CursorActuator for StdoutActuator {
    fn move_to(&mut self, p: ScreenPoint) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut out = std::io::stdout().lock();
        if self.json {
            writeln!(out, "{}", json!({ "x": p.x, "y": p.y }))?;
        } else {
            writeln!(out, "{} {}", p.x, p.y)?;
        }
        Ok(())
    }
}

fn load_replay_model(cfg: &Config, model: Option<&Path>, pipeline: &mut Pipeline) -> eyre::Result<()> {
    match model {
        Some(p) => pipeline
            .load_model(p)
            .wrap_err_with(|| format!("load model {}", p.display())),
        None => {
            if let Some(p) = cfg.calibration.model_path.as_deref().map(Path::new)
                && p.exists()
            {
                // Already logged by the pipeline; replay continues on the fallback mapping.
                let _ = pipeline.load_model(p);
            }
            Ok(())
        }
    }
}

pub fn run_replay(
    cfg: &Config,
    trace: &Path,
    model: Option<&Path>,
    realtime: bool,
    json_mode: bool,
    shutdown: Arc<AtomicBool>,
) -> eyre::Result<()> {
    let frames: Vec<Option<GazeFeature>> = gaze_config::load_trace_csv(trace)?
        .iter()
        .map(|r| r.feature().map(|(nx, ny)| GazeFeature::new(nx, ny)))
        .collect();
    let total = frames.len() as u64;

    if realtime {
        let mut pipeline = build_pipeline(cfg, ScriptedSource::new(frames), None)?;
        load_replay_model(cfg, model, &mut pipeline)?;
        pipeline.start_tracking();
        let opts = RunOptions {
            max_ticks: Some(total),
            shutdown: Some(shutdown),
            stop_after_idle_ticks: None,
        };
        let mut actuator = StdoutActuator { json: json_mode };
        let summary = runner::run(&mut pipeline, &mut actuator, &opts);
        tracing::info!(
            ticks = summary.ticks,
            emitted = summary.emitted,
            frozen_ticks = summary.frozen_ticks,
            interrupted = summary.interrupted,
            "replay finished"
        );
        return Ok(());
    }

    let clock = ManualClock::new();
    let mut pipeline = build_pipeline(
        cfg,
        ScriptedSource::new(frames),
        Some(Box::new(clock.clone())),
    )?;
    load_replay_model(cfg, model, &mut pipeline)?;
    pipeline.start_tracking();
    let period = Duration::from_micros(gaze_core::util::period_us(cfg.filter.sample_rate_hz));

    for tick in 0..total {
        if shutdown.load(Ordering::Relaxed) {
            pipeline.panic();
            tracing::info!(tick, "replay interrupted");
            break;
        }
        clock.advance(period);
        let res = pipeline.tick();
        if json_mode {
            print_line(&tick_json(tick, &res).to_string())?;
        } else {
            let shown = match (res.predicted_xy, res.frozen) {
                (Some(p), _) => format!("{} {}", p.x, p.y),
                (None, Some(reason)) => format!("frozen ({reason})"),
                (None, None) => "-".to_string(),
            };
            print_line(&format!("{tick:>6} {shown}"))?;
        }
    }
    Ok(())
}

pub fn run_self_check(cfg: &Config, json_mode: bool) -> eyre::Result<()> {
    let mut pipeline = build_pipeline(cfg, NoFeatures, None)?;
    if let Some(p) = cfg.calibration.model_path.as_deref().map(Path::new)
        && p.exists()
    {
        pipeline
            .load_model(p)
            .wrap_err_with(|| format!("load model {}", p.display()))?;
    }
    let res = pipeline.tick();
    if res.face_ok {
        eyre::bail!("self-check: idle source produced a feature");
    }
    let method = pipeline.calibrator().method().map(|m| m.as_str());
    let screen = pipeline.screen();
    if json_mode {
        let line = json!({
            "status": "ok",
            "screen": { "width": screen.width, "height": screen.height },
            "trained": method.is_some(),
            "method": method,
        });
        print_line(&line.to_string())
    } else {
        print_line(&format!(
            "OK: screen {}x{}, model {}",
            screen.width,
            screen.height,
            method.unwrap_or("none (fallback mapping)")
        ))
    }
}

//! Cooperative tick loop driving a `Pipeline` and a `CursorActuator`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use gaze_traits::CursorActuator;

use crate::error::{FreezeReason, GazeError};
use crate::pipeline::Pipeline;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Stop after this many ticks; `None` runs until shutdown.
    pub max_ticks: Option<u64>,
    /// Checked before every tick.
    pub shutdown: Option<Arc<AtomicBool>>,
    /// Stop once the source has produced this many consecutive empty ticks.
    pub stop_after_idle_ticks: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub ticks: u64,
    pub emitted: u64,
    pub frozen_ticks: u64,
    pub no_feature_ticks: u64,
    pub actuator_errors: u64,
    pub last_freeze: Option<FreezeReason>,
    pub interrupted: bool,
}

/// Time left in the current period, given how long the tick took.
#[inline]
fn remaining_in_period(period_us: u64, spent: Duration) -> Duration {
    Duration::from_micros(period_us).saturating_sub(spent)
}

#[inline]
fn shutdown_requested(flag: Option<&Arc<AtomicBool>>) -> bool {
    flag.is_some_and(|f| f.load(Ordering::Relaxed))
}

/// Tick the pipeline at `filter.sample_rate_hz` until a stop condition holds.
///
/// Actuator failures are logged and counted; they never end the loop. On
/// shutdown the pipeline is panicked so a restarted loop stays frozen until an
/// explicit resume.
pub fn run(
    pipeline: &mut Pipeline,
    actuator: &mut dyn CursorActuator,
    opts: &RunOptions,
) -> RunSummary {
    let clock = pipeline.clock();
    let period_us = crate::util::period_us(pipeline.filter_cfg().sample_rate_hz);
    let mut summary = RunSummary::default();
    let mut idle_run = 0u64;

    tracing::info!(
        mode = pipeline.mode().as_str(),
        period_us,
        max_ticks = opts.max_ticks,
        "runner start"
    );

    loop {
        if shutdown_requested(opts.shutdown.as_ref()) {
            pipeline.panic();
            summary.interrupted = true;
            tracing::info!(ticks = summary.ticks, "shutdown requested");
            break;
        }
        if opts.max_ticks.is_some_and(|m| summary.ticks >= m) {
            break;
        }

        let started = clock.now();
        let res = pipeline.tick();
        summary.ticks += 1;

        if res.face_ok {
            idle_run = 0;
        } else {
            summary.no_feature_ticks += 1;
            idle_run += 1;
        }
        if let Some(reason) = res.frozen {
            summary.frozen_ticks += 1;
            summary.last_freeze = Some(reason);
        }
        if let Some(p) = res.predicted_xy {
            match actuator.move_to(p) {
                Ok(()) => summary.emitted += 1,
                Err(e) => {
                    summary.actuator_errors += 1;
                    let e = GazeError::Actuator(e.to_string());
                    tracing::warn!(error = %e, x = p.x, y = p.y, "cursor move failed");
                }
            }
        }

        if opts.stop_after_idle_ticks.is_some_and(|n| idle_run >= n) {
            tracing::debug!(idle_run, "source exhausted");
            break;
        }

        let spent = clock.now().saturating_duration_since(started);
        clock.sleep(remaining_in_period(period_us, spent));
    }

    tracing::info!(
        ticks = summary.ticks,
        emitted = summary.emitted,
        frozen_ticks = summary.frozen_ticks,
        actuator_errors = summary.actuator_errors,
        "runner stop"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_saturates_at_zero() {
        assert_eq!(
            remaining_in_period(33_333, Duration::from_millis(5)),
            Duration::from_micros(28_333)
        );
        assert_eq!(
            remaining_in_period(1_000, Duration::from_millis(5)),
            Duration::ZERO
        );
    }

    #[test]
    fn shutdown_flag_is_optional() {
        assert!(!shutdown_requested(None));
        let f = Arc::new(AtomicBool::new(true));
        assert!(shutdown_requested(Some(&f)));
    }
}

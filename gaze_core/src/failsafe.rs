//! Safety gate applied to every candidate cursor position.
//!
//! Checks run in a fixed order each tick:
//! 1. latched freeze (autosleep / panic) holds until `resume`
//! 2. frame gap above `max_frame_gap` freezes with `LowFps`
//! 3. missing features freeze with `NoFeatures`
//! 4. drift offset above `max_drift_px` freezes with `DriftLimit`
//! 5. a jump above `max_jump_ratio * width` is replaced by the last accepted point
//! 6. a cursor parked longer than `autosleep_idle` freezes with `Autosleep`
//! 7. otherwise the point is accepted
//!
//! Non-latched freezes clear on the next clean tick.

use crate::config::FailsafeCfg;
use crate::error::FreezeReason;
use gaze_traits::clock::{Clock, MonotonicClock};
use gaze_traits::{ScreenPoint, ScreenSize};
use std::sync::Arc;
use std::time::Instant;

pub struct FailsafeManager {
    cfg: FailsafeCfg,
    clock: Arc<dyn Clock + Send + Sync>,
    last_accepted: Option<ScreenPoint>,
    last_tick: Option<Instant>,
    last_move: Option<Instant>,
    frozen: Option<FreezeReason>,
    // Consecutive ticks a jump has been suppressed
    spike_run: u32,
}

impl core::fmt::Debug for FailsafeManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FailsafeManager")
            .field("frozen", &self.frozen)
            .field("last_accepted", &self.last_accepted)
            .finish()
    }
}

impl FailsafeManager {
    pub fn new(cfg: FailsafeCfg) -> Self {
        Self::with_clock(cfg, Arc::new(MonotonicClock::new()))
    }

    pub fn with_clock(cfg: FailsafeCfg, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self {
            cfg,
            clock,
            last_accepted: None,
            last_tick: None,
            last_move: None,
            frozen: None,
            spike_run: 0,
        }
    }

    /// Gate one candidate. Returns the point to emit, or `None` while frozen.
    pub fn process(
        &mut self,
        candidate: Option<ScreenPoint>,
        features_present: bool,
        screen: ScreenSize,
        drift_offset: (f64, f64),
    ) -> Option<ScreenPoint> {
        let now = self.clock.now();
        let prev_tick = self.last_tick.replace(now);

        if let Some(reason) = self.frozen
            && reason.is_latched()
        {
            return None;
        }

        if let Some(prev) = prev_tick {
            let gap = now.saturating_duration_since(prev);
            if gap > self.cfg.max_frame_gap {
                tracing::debug!(gap_ms = gap.as_millis() as u64, "frame gap too large");
                self.freeze(FreezeReason::LowFps);
                return None;
            }
        }

        let Some(candidate) = candidate.filter(|_| features_present) else {
            self.freeze(FreezeReason::NoFeatures);
            return None;
        };

        let drift_mag = drift_offset.0.hypot(drift_offset.1);
        if !drift_mag.is_finite() || drift_mag > self.cfg.max_drift_px {
            self.freeze(FreezeReason::DriftLimit);
            return None;
        }

        let mut out = candidate;
        if let Some(last) = self.last_accepted {
            let limit = self.cfg.max_jump_ratio * f64::from(screen.width);
            if candidate.distance(last) > limit {
                self.spike_run = self.spike_run.saturating_add(1);
                let released = self
                    .cfg
                    .spike_release_ticks
                    .is_some_and(|n| self.spike_run > n);
                if released {
                    tracing::debug!(ticks = self.spike_run, "sustained jump accepted");
                    self.spike_run = 0;
                } else {
                    tracing::trace!(
                        cand_x = candidate.x,
                        cand_y = candidate.y,
                        "spike suppressed"
                    );
                    out = last;
                }
            } else {
                self.spike_run = 0;
            }
        }

        if Some(out) == self.last_accepted {
            if let (Some(idle), Some(since)) = (self.cfg.autosleep_idle, self.last_move)
                && now.saturating_duration_since(since) > idle
            {
                self.freeze(FreezeReason::Autosleep);
                return None;
            }
        } else {
            self.last_move = Some(now);
        }

        self.last_accepted = Some(out);
        self.unfreeze();
        Some(out)
    }

    /// Latch a panic freeze; only `resume` clears it.
    pub fn panic(&mut self) {
        tracing::warn!("panic requested; cursor frozen");
        self.frozen = Some(FreezeReason::Panic);
    }

    /// Clear any freeze (latched or not) and the timing state.
    pub fn resume(&mut self) {
        if let Some(prev) = self.frozen.take() {
            tracing::info!(previous = %prev, "failsafe resumed");
        }
        self.last_tick = None;
        self.last_move = None;
        self.last_accepted = None;
        self.spike_run = 0;
    }

    /// Forget motion and timing history but keep a latched freeze.
    pub fn clear_motion(&mut self) {
        if !self.frozen.is_some_and(FreezeReason::is_latched) {
            self.frozen = None;
        }
        self.last_tick = None;
        self.last_move = None;
        self.last_accepted = None;
        self.spike_run = 0;
    }

    /// Back to the initial state.
    pub fn reset(&mut self) {
        self.frozen = None;
        self.last_tick = None;
        self.last_move = None;
        self.last_accepted = None;
        self.spike_run = 0;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.is_some()
    }

    pub fn reason(&self) -> Option<FreezeReason> {
        self.frozen
    }

    pub fn last_accepted(&self) -> Option<ScreenPoint> {
        self.last_accepted
    }

    fn freeze(&mut self, reason: FreezeReason) {
        if self.frozen != Some(reason) {
            tracing::info!(reason = %reason, "failsafe frozen");
        }
        self.frozen = Some(reason);
    }

    fn unfreeze(&mut self) {
        if let Some(prev) = self.frozen.take() {
            tracing::info!(previous = %prev, "failsafe active");
        }
    }
}

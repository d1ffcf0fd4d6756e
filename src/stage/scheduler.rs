//! Frame throttling.
//!
//! The host calls [`FrameScheduler::on_callback`] at whatever rate its
//! display loop runs. Work is accepted at most at the target rate; the delta
//! handed to animation comes from a monotonic clock, not from the callback
//! timestamps, so playback speed does not depend on the host cadence.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::config::FrameConfig;

/// Source of monotonic time in seconds.
pub trait Clock: Send {
    fn now(&self) -> f64;
}

/// Wall clock backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Hand-driven clock. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    micros: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance_secs(&self, secs: f64) {
        let micros = (secs.max(0.0) * 1_000_000.0).round() as u64;
        self.micros.fetch_add(micros, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.micros.load(Ordering::SeqCst) as f64 / 1_000_000.0
    }
}

/// Outcome of one host callback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tick {
    /// Do a frame's work, advancing animation by `dt` seconds
    Frame { dt: f32 },
    /// Too early; re-arm and wait
    Skipped,
    /// The owner has stopped; do not re-arm
    Stopped,
}

pub struct FrameScheduler {
    interval_ms: f64,
    tolerance_ms: f64,
    last_accepted: Option<f64>,
    last_clock: Option<f64>,
    clock: Box<dyn Clock>,
    running: bool,
    frames_accepted: u64,
    callbacks: u64,
}

impl FrameScheduler {
    pub fn new(config: &FrameConfig, clock: Box<dyn Clock>) -> Self {
        let fps = if config.target_fps > 0.0 { config.target_fps } else { 60.0 };
        Self {
            interval_ms: 1000.0 / fps,
            tolerance_ms: config.jitter_tolerance_ms.max(0.0),
            last_accepted: None,
            last_clock: None,
            clock,
            running: true,
            frames_accepted: 0,
            callbacks: 0,
        }
    }

    /// Handle a host callback carrying its timestamp in milliseconds.
    pub fn on_callback(&mut self, timestamp_ms: f64) -> Tick {
        if !self.running {
            return Tick::Stopped;
        }
        self.callbacks += 1;

        if let Some(last) = self.last_accepted {
            // Timestamps that go backwards re-anchor the throttle
            if timestamp_ms >= last && timestamp_ms - last < self.interval_ms - self.tolerance_ms {
                return Tick::Skipped;
            }
        }
        self.last_accepted = Some(timestamp_ms);

        let now = self.clock.now();
        let dt = match self.last_clock {
            Some(prev) => (now - prev).max(0.0),
            None => 0.0,
        };
        self.last_clock = Some(now);
        self.frames_accepted += 1;

        Tick::Frame { dt: dt as f32 }
    }

    /// Stop accepting work. Later callbacks return [`Tick::Stopped`].
    pub fn stop(&mut self) {
        if self.running {
            tracing::debug!(
                "Scheduler stopped after {} frames ({} callbacks)",
                self.frames_accepted,
                self.callbacks
            );
        }
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn frames_accepted(&self) -> u64 {
        self.frames_accepted
    }

    pub fn interval_ms(&self) -> f64 {
        self.interval_ms
    }
}

impl std::fmt::Debug for FrameScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameScheduler")
            .field("interval_ms", &self.interval_ms)
            .field("running", &self.running)
            .field("frames_accepted", &self.frames_accepted)
            .finish()
    }
}

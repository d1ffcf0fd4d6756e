//! Blink and voice-driven mouth blending.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::avatar::{ExpressionSlots, SlotId};
use crate::config::{AvatarConfig, BlinkConfig, LipSyncConfig};

/// VRM mouth presets, probed after the configured candidates.
pub const MOUTH_PRESETS: [&str; 5] = ["aa", "ih", "ou", "ee", "oh"];

/// Pick the slot lip sync writes to: configured candidates first, then any
/// mouth preset the avatar has, then the fallback. `None` disables lip sync.
pub fn resolve_mouth_slot(
    slots: &ExpressionSlots,
    candidates: &[String],
    fallback: &str,
) -> Option<SlotId> {
    candidates
        .iter()
        .map(String::as_str)
        .chain(MOUTH_PRESETS)
        .find_map(|name| slots.find(name))
        .or_else(|| slots.find(fallback))
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BlinkPhase {
    Open { remaining: f32 },
    Closing { elapsed: f32 },
    Closed { elapsed: f32 },
    Opening { elapsed: f32 },
}

/// Open → closing → closed → opening cycle with a random open interval.
#[derive(Debug)]
pub struct BlinkTimer {
    config: BlinkConfig,
    phase: BlinkPhase,
    rng: StdRng,
}

impl BlinkTimer {
    pub fn new(config: &BlinkConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let mut timer = Self {
            config: config.clone(),
            phase: BlinkPhase::Open { remaining: 0.0 },
            rng,
        };
        timer.restart();
        timer
    }

    fn next_interval(&mut self) -> f32 {
        let (min, max) = (self.config.interval_min_secs, self.config.interval_max_secs);
        if max > min {
            self.rng.random_range(min..max)
        } else {
            min
        }
    }

    /// Start a fresh open interval with the eyes open.
    pub fn restart(&mut self) {
        let remaining = self.next_interval();
        self.phase = BlinkPhase::Open { remaining };
    }

    /// Advance by `dt` seconds and return eyelid closure in [0, 1].
    pub fn update(&mut self, dt: f32) -> f32 {
        let mut dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        // A long frame may cross several phase boundaries
        loop {
            match self.phase {
                BlinkPhase::Open { remaining } => {
                    if dt < remaining {
                        self.phase = BlinkPhase::Open {
                            remaining: remaining - dt,
                        };
                        break;
                    }
                    dt -= remaining;
                    self.phase = BlinkPhase::Closing { elapsed: 0.0 };
                }
                BlinkPhase::Closing { elapsed } => {
                    let left = self.config.close_secs - elapsed;
                    if dt < left {
                        self.phase = BlinkPhase::Closing {
                            elapsed: elapsed + dt,
                        };
                        break;
                    }
                    dt -= left.max(0.0);
                    self.phase = BlinkPhase::Closed { elapsed: 0.0 };
                }
                BlinkPhase::Closed { elapsed } => {
                    let left = self.config.hold_secs - elapsed;
                    if dt < left {
                        self.phase = BlinkPhase::Closed {
                            elapsed: elapsed + dt,
                        };
                        break;
                    }
                    dt -= left.max(0.0);
                    self.phase = BlinkPhase::Opening { elapsed: 0.0 };
                }
                BlinkPhase::Opening { elapsed } => {
                    let left = self.config.open_secs - elapsed;
                    if dt < left {
                        self.phase = BlinkPhase::Opening {
                            elapsed: elapsed + dt,
                        };
                        break;
                    }
                    dt -= left.max(0.0);
                    let remaining = self.next_interval();
                    self.phase = BlinkPhase::Open { remaining };
                }
            }
        }
        self.value()
    }

    pub fn value(&self) -> f32 {
        let ratio = |elapsed: f32, total: f32| {
            if total > 0.0 {
                (elapsed / total).clamp(0.0, 1.0)
            } else {
                1.0
            }
        };
        match self.phase {
            BlinkPhase::Open { .. } => 0.0,
            BlinkPhase::Closing { elapsed } => ratio(elapsed, self.config.close_secs),
            BlinkPhase::Closed { .. } => 1.0,
            BlinkPhase::Opening { elapsed } => 1.0 - ratio(elapsed, self.config.open_secs),
        }
    }
}

/// Writes blink and mouth weights into an avatar's expression slots.
#[derive(Debug)]
pub struct ExpressionController {
    lip_sync: LipSyncConfig,
    blink_enabled: bool,
    mouth_candidates: Vec<String>,
    fallback_mouth: String,
    blink_slot_name: String,
    mouth: Option<SlotId>,
    blink: Option<SlotId>,
    prev_mouth: f32,
    blink_timer: BlinkTimer,
}

impl ExpressionController {
    pub fn new(avatar: &AvatarConfig, lip_sync: &LipSyncConfig, blink: &BlinkConfig) -> Self {
        Self {
            lip_sync: lip_sync.clone(),
            blink_enabled: blink.enabled,
            mouth_candidates: avatar.mouth_candidates.clone(),
            fallback_mouth: avatar.fallback_mouth.clone(),
            blink_slot_name: avatar.blink_slot.clone(),
            mouth: None,
            blink: None,
            prev_mouth: 0.0,
            blink_timer: BlinkTimer::new(blink),
        }
    }

    /// Resolve slots for a newly loaded avatar and start from a clean state.
    pub fn bind(&mut self, slots: &ExpressionSlots) {
        self.reset();

        self.mouth = resolve_mouth_slot(slots, &self.mouth_candidates, &self.fallback_mouth);
        match self.mouth.and_then(|id| slots.name(id)) {
            Some(name) => tracing::info!("Lip sync bound to expression '{}'", name),
            None => tracing::debug!("No mouth expression found, lip sync disabled"),
        }

        self.blink = if self.blink_enabled {
            slots.find(&self.blink_slot_name)
        } else {
            None
        };
        // Blink and mouth must never share a slot
        if self.blink.is_some() && self.blink == self.mouth {
            tracing::warn!(
                "Blink slot '{}' is also the mouth slot, blink disabled",
                self.blink_slot_name
            );
            self.blink = None;
        }
        if self.blink.is_none() {
            tracing::debug!("No blink expression bound");
        }
    }

    /// Drop bound slots and smoothing state.
    pub fn reset(&mut self) {
        self.mouth = None;
        self.blink = None;
        self.prev_mouth = 0.0;
        self.blink_timer.restart();
    }

    pub fn restart_blink(&mut self) {
        self.blink_timer.restart();
    }

    /// Advance one frame: blink by `dt`, mouth toward `volume`.
    pub fn update(&mut self, dt: f32, volume: f32, slots: &mut ExpressionSlots) {
        if let Some(blink) = self.blink {
            let closure = self.blink_timer.update(dt);
            slots.set(blink, closure);
        }

        if let Some(mouth) = self.mouth {
            let volume = if volume.is_finite() { volume } else { 0.0 };
            let target = (volume * self.lip_sync.volume_multiplier).clamp(0.0, 1.0);
            let smoothed =
                self.prev_mouth + (target - self.prev_mouth) * self.lip_sync.smoothing_factor;
            self.prev_mouth = smoothed.clamp(0.0, 1.0);
            slots.set(mouth, self.prev_mouth);
        }
    }

    pub fn mouth_value(&self) -> f32 {
        self.prev_mouth
    }

    pub fn mouth_slot(&self) -> Option<SlotId> {
        self.mouth
    }

    pub fn blink_slot(&self) -> Option<SlotId> {
        self.blink
    }
}

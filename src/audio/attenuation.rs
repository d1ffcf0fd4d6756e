//! Distance attenuation and stereo pan.
//!
//! Gain curves follow the Web Audio `PannerNode` distance models. All three
//! are non-increasing in distance for a non-negative rolloff.

use glam::{Quat, Vec3};

use crate::config::{DistanceModel, SpatialConfig};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttenuationPolicy {
    pub model: DistanceModel,
    pub ref_distance: f32,
    pub max_distance: f32,
    pub rolloff: f32,
}

impl AttenuationPolicy {
    pub fn from_config(config: &SpatialConfig) -> Self {
        Self {
            model: config.distance_model,
            ref_distance: config.ref_distance.max(f32::EPSILON),
            max_distance: config.max_distance.max(config.ref_distance),
            rolloff: config.rolloff.max(0.0),
        }
    }

    /// Gain in [0, 1] for an emitter `distance` metres away.
    pub fn gain(&self, distance: f32) -> f32 {
        let d = if distance.is_finite() { distance.max(0.0) } else { f32::MAX };
        let r = self.ref_distance;

        let gain = match self.model {
            DistanceModel::Linear => {
                let span = self.max_distance - r;
                if span <= 0.0 {
                    if d <= r {
                        1.0
                    } else {
                        (1.0 - self.rolloff).max(0.0)
                    }
                } else {
                    let clamped = d.clamp(r, self.max_distance);
                    1.0 - self.rolloff.min(1.0) * (clamped - r) / span
                }
            }
            DistanceModel::Inverse => r / (r + self.rolloff * (d.max(r) - r)),
            DistanceModel::Exponential => (d.max(r) / r).powf(-self.rolloff),
        };

        gain.clamp(0.0, 1.0)
    }

    /// Stereo pan in [-1, 1] of `emitter` as heard by a listener at
    /// `listener` with orientation `orientation` (-1 = full left).
    pub fn pan_for(listener: Vec3, orientation: Quat, emitter: Vec3) -> f32 {
        let local = orientation.inverse() * (emitter - listener);
        let len = local.length();
        if len <= f32::EPSILON {
            return 0.0;
        }
        (local.x / len).clamp(-1.0, 1.0)
    }
}

/// Constant-power left/right gains for a pan value.
pub fn constant_power(pan: f32) -> (f32, f32) {
    let pan = pan.clamp(-1.0, 1.0);
    let angle = (pan + 1.0) * std::f32::consts::FRAC_PI_4;
    (angle.cos(), angle.sin())
}

//! Distance-driven voice volume and pan.
//!
//! The listener is the microphone prop: the camera position plus a fixed
//! offset rotated into the camera's orientation. The emitter is the avatar
//! root. Sampling runs every `sample_every` accepted frames while playing.

use glam::{Quat, Vec3};

use super::attenuation::AttenuationPolicy;
use super::SpatialAudioOutput;
use crate::config::SpatialConfig;
use crate::stage::camera::CameraState;

/// Last values pushed to the audio output.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpatialState {
    pub distance: Option<f32>,
    pub volume: Option<f32>,
    pub pan: Option<f32>,
}

/// What one sample wrote. `None` fields were left untouched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialUpdate {
    pub distance: f32,
    pub volume: Option<f32>,
    pub pan: Option<f32>,
}

#[derive(Debug)]
pub struct SpatialAudioSync {
    policy: AttenuationPolicy,
    microphone_offset: Vec3,
    sample_every: u32,
    distance_epsilon: f32,
    pan_epsilon: f32,
    frames: u32,
    state: SpatialState,
}

impl SpatialAudioSync {
    pub fn new(config: &SpatialConfig) -> Self {
        Self {
            policy: AttenuationPolicy::from_config(config),
            microphone_offset: Vec3::from(config.microphone_offset),
            sample_every: config.sample_every.max(1),
            distance_epsilon: config.distance_epsilon,
            pan_epsilon: config.pan_epsilon,
            frames: 0,
            state: SpatialState::default(),
        }
    }

    pub fn listener_position(&self, camera_position: Vec3, camera_rotation: Quat) -> Vec3 {
        camera_position + camera_rotation * self.microphone_offset
    }

    pub fn state(&self) -> SpatialState {
        self.state
    }

    /// Forget the last applied values and restart the cadence.
    pub fn reset(&mut self) {
        self.frames = 0;
        self.state = SpatialState::default();
    }

    /// Called once per accepted frame.
    pub fn on_frame(
        &mut self,
        camera: Option<&CameraState>,
        avatar_root: Option<Vec3>,
        output: &mut dyn SpatialAudioOutput,
    ) -> Option<SpatialUpdate> {
        if !output.is_playing() {
            return None;
        }
        let (camera, emitter) = (camera?, avatar_root?);

        self.frames = self.frames.wrapping_add(1);
        if self.frames % self.sample_every != 0 {
            return None;
        }

        let listener = self.listener_position(camera.position, camera.rotation);
        let distance = listener.distance(emitter);
        let pan = AttenuationPolicy::pan_for(listener, camera.rotation, emitter);

        let distance_changed = match self.state.distance {
            Some(last) => (distance - last).abs() > self.distance_epsilon,
            None => true,
        };
        let pan_changed = match self.state.pan {
            Some(last) => (pan - last).abs() > self.pan_epsilon,
            None => true,
        };

        if !distance_changed && !pan_changed {
            return None;
        }

        let mut update = SpatialUpdate {
            distance,
            volume: None,
            pan: None,
        };

        if distance_changed {
            let volume = self.policy.gain(distance);
            output.set_volume(volume);
            self.state.distance = Some(distance);
            self.state.volume = Some(volume);
            update.volume = Some(volume);
        }
        if pan_changed {
            output.set_pan(pan);
            self.state.pan = Some(pan);
            update.pan = Some(pan);
        }

        tracing::trace!(
            "Spatial sample: distance={:.3} volume={:?} pan={:?}",
            distance,
            update.volume,
            update.pan
        );
        Some(update)
    }
}

//! Audio output collaborator and spatial voice sync
//!
//! The stage only pushes volume and pan. Decoding, transport and device
//! output belong to whoever implements [`SpatialAudioOutput`].

pub mod attenuation;
pub mod spatial;

use std::sync::{Arc, Mutex, MutexGuard};

pub use attenuation::{constant_power, AttenuationPolicy};
pub use spatial::{SpatialAudioSync, SpatialState, SpatialUpdate};

pub trait SpatialAudioOutput: Send {
    /// Whether a voice track is currently playing
    fn is_playing(&self) -> bool;

    fn set_volume(&mut self, volume: f32);

    /// -1 = full left, 1 = full right
    fn set_pan(&mut self, pan: f32);
}

#[derive(Debug, Default)]
struct VoiceState {
    playing: bool,
    volume: f32,
    pan: f32,
    volume_writes: usize,
    pan_writes: usize,
}

/// Stereo voice with constant-power panning.
///
/// Clones share state, so the host can keep a handle to toggle playback
/// while the stage owns another.
#[derive(Debug, Clone, Default)]
pub struct StereoVoice {
    state: Arc<Mutex<VoiceState>>,
}

impl StereoVoice {
    pub fn new() -> Self {
        let voice = Self::default();
        voice.lock().volume = 1.0;
        voice
    }

    fn lock(&self) -> MutexGuard<'_, VoiceState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_playing(&self, playing: bool) {
        self.lock().playing = playing;
    }

    pub fn volume(&self) -> f32 {
        self.lock().volume
    }

    pub fn pan(&self) -> f32 {
        self.lock().pan
    }

    /// Left/right channel gains after volume and pan.
    pub fn gains(&self) -> (f32, f32) {
        let state = self.lock();
        let (l, r) = constant_power(state.pan);
        (l * state.volume, r * state.volume)
    }

    pub fn volume_writes(&self) -> usize {
        self.lock().volume_writes
    }

    pub fn pan_writes(&self) -> usize {
        self.lock().pan_writes
    }
}

impl SpatialAudioOutput for StereoVoice {
    fn is_playing(&self) -> bool {
        self.lock().playing
    }

    fn set_volume(&mut self, volume: f32) {
        let mut state = self.lock();
        state.volume = volume.clamp(0.0, 1.0);
        state.volume_writes += 1;
    }

    fn set_pan(&mut self, pan: f32) {
        let mut state = self.lock();
        state.pan = pan.clamp(-1.0, 1.0);
        state.pan_writes += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stereo_voice_gains() {
        let mut voice = StereoVoice::new();
        voice.set_volume(0.5);
        voice.set_pan(1.0);

        let (l, r) = voice.gains();
        assert!(l.abs() < 1e-6);
        assert!((r - 0.5).abs() < 1e-6);
        assert_eq!(voice.volume_writes(), 1);
        assert_eq!(voice.pan_writes(), 1);
    }

    #[test]
    fn test_clone_shares_playback() {
        let voice = StereoVoice::new();
        let host = voice.clone();
        host.set_playing(true);
        assert!(voice.is_playing());
    }
}

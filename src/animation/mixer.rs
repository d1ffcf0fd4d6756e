//! Single-action looping animation mixer.

use super::clip::BoundClip;
use crate::avatar::skeleton::Skeleton;

/// Play head of the active action.
#[derive(Debug, Clone, PartialEq)]
pub struct MixerState {
    pub clip: String,
    pub time: f32,
    pub playing: bool,
}

#[derive(Debug, Default)]
pub struct AnimationMixer {
    action: Option<(BoundClip, MixerState)>,
}

impl AnimationMixer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loop a clip from time zero, replacing any current action.
    pub fn play(&mut self, clip: BoundClip) {
        tracing::debug!("Playing clip '{}' ({:.2}s)", clip.name, clip.duration);
        let state = MixerState {
            clip: clip.name.clone(),
            time: 0.0,
            playing: true,
        };
        self.action = Some((clip, state));
    }

    /// Advance the play head by `dt` seconds and pose the skeleton.
    pub fn update(&mut self, dt: f32, skeleton: &mut Skeleton) {
        let Some((clip, state)) = self.action.as_mut() else {
            return;
        };
        if !state.playing {
            return;
        }

        if dt.is_finite() {
            state.time += dt.max(0.0);
        }
        if clip.duration > 0.0 {
            state.time = state.time.rem_euclid(clip.duration);
        } else {
            state.time = 0.0;
        }

        clip.apply(state.time, skeleton);
    }

    /// Drop the current action. The skeleton keeps its last pose.
    pub fn stop_all(&mut self) {
        if let Some((clip, _)) = self.action.take() {
            tracing::debug!("Stopped clip '{}'", clip.name);
        }
    }

    pub fn state(&self) -> Option<&MixerState> {
        self.action.as_ref().map(|(_, state)| state)
    }

    pub fn is_playing(&self) -> bool {
        self.state().map(|s| s.playing).unwrap_or(false)
    }
}

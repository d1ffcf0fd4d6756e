//! Binary container reading, clip decoding and playback.

pub mod clip;
pub mod glb;
pub mod mixer;

pub use clip::{AnimationClip, BoundClip};
pub use mixer::{AnimationMixer, MixerState};

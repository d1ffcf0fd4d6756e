//! VRM ASMR Stage - Avatar frame synchronization core
//!
//! Drives a loaded VRM avatar at a bounded frame rate:
//! - Idle skeletal animation from a VRMA clip
//! - Automatic blink and voice-driven lip sync
//! - Render-scoped head tilt and eye gaze toward the camera
//! - Camera follow and distance-based spatial voice
//!
//! Rendering and audio output are collaborators behind traits, so the core
//! runs headless.

pub mod animation;
pub mod audio;
pub mod avatar;
pub mod config;
pub mod error;
pub mod render;
pub mod stage;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use error::{Result, StageError};
pub use stage::{LifecycleManager, StageEvent};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");

//! Configuration parsing and management for the VRM stage

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, StageError};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub frame: FrameConfig,
    pub avatar: AvatarConfig,
    pub lip_sync: LipSyncConfig,
    pub blink: BlinkConfig,
    pub pose: PoseConfig,
    pub camera: CameraConfig,
    pub follow: FollowConfig,
    pub spatial: SpatialConfig,
    pub look_at: LookAtConfig,
    pub microphone: MicrophoneConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, StageError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConfigError::ReadFile(format!("{}: {}", path.as_ref().display(), e))
        })?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, StageError> {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()).into())
    }

    /// Load configuration from default paths
    pub fn load() -> Result<Self, StageError> {
        let paths = [
            PathBuf::from("config.toml"),
            PathBuf::from("config/default.toml"),
            dirs_path().join("config.toml"),
        ];

        for path in &paths {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::from_file(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), StageError> {
        if self.frame.target_fps <= 0.0 {
            return Err(invalid("frame.target_fps", "Target rate must be greater than 0"));
        }

        if !(0.0..=1.0).contains(&self.lip_sync.smoothing_factor) {
            return Err(invalid(
                "lip_sync.smoothing_factor",
                "Smoothing factor must be between 0.0 and 1.0",
            ));
        }

        if self.lip_sync.volume_multiplier < 0.0 {
            return Err(invalid(
                "lip_sync.volume_multiplier",
                "Multiplier must not be negative",
            ));
        }

        if self.blink.interval_min_secs <= 0.0
            || self.blink.interval_min_secs > self.blink.interval_max_secs
        {
            return Err(invalid(
                "blink.interval_min_secs",
                "Blink interval must be positive and not exceed interval_max_secs",
            ));
        }

        if !(0.0..=1.0).contains(&self.follow.smoothing) {
            return Err(invalid(
                "follow.smoothing",
                "Follow smoothing must be between 0.0 and 1.0",
            ));
        }

        if self.spatial.sample_every == 0 {
            return Err(invalid("spatial.sample_every", "Cadence must be at least 1"));
        }

        if self.spatial.ref_distance <= 0.0 {
            return Err(invalid(
                "spatial.ref_distance",
                "Reference distance must be greater than 0",
            ));
        }

        if self.spatial.max_distance < self.spatial.ref_distance {
            return Err(invalid(
                "spatial.max_distance",
                "Max distance must not be below ref_distance",
            ));
        }

        if self.camera.near <= 0.0 || self.camera.near >= self.camera.far {
            return Err(invalid(
                "camera.near",
                "Near plane must be positive and closer than the far plane",
            ));
        }

        if self.avatar.fallback_mouth.is_empty() {
            tracing::warn!("avatar.fallback_mouth is empty, lip sync depends on candidates only");
        }

        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> StageError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
    .into()
}

/// Frame scheduling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// Target update/render rate in Hz
    pub target_fps: f64,
    /// Slack subtracted from the frame interval to absorb host timer jitter
    pub jitter_tolerance_ms: f64,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            target_fps: 60.0,
            jitter_tolerance_ms: 0.5,
        }
    }
}

/// Avatar asset configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AvatarConfig {
    /// Avatar loaded when no user file is supplied
    pub default_model_path: PathBuf,
    /// Optional looping idle clip
    pub idle_clip_path: Option<PathBuf>,
    /// Mouth expression names probed in order
    pub mouth_candidates: Vec<String>,
    /// Mouth expression used when no candidate matches
    pub fallback_mouth: String,
    /// Expression driven by auto blink
    pub blink_slot: String,
}

impl Default for AvatarConfig {
    fn default() -> Self {
        Self {
            default_model_path: PathBuf::from("assets/avatar.vrm"),
            idle_clip_path: Some(PathBuf::from("assets/idle_loop.vrma")),
            mouth_candidates: vec!["aa".to_string(), "oh".to_string(), "ou".to_string()],
            fallback_mouth: "aa".to_string(),
            blink_slot: "blink".to_string(),
        }
    }
}

/// Voice-driven mouth movement
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LipSyncConfig {
    /// Gain applied to the raw volume sample before clamping
    pub volume_multiplier: f32,
    /// Fraction of the remaining distance covered each frame
    pub smoothing_factor: f32,
}

impl Default for LipSyncConfig {
    fn default() -> Self {
        Self {
            volume_multiplier: 3.0,
            smoothing_factor: 0.3,
        }
    }
}

/// Automatic blink timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlinkConfig {
    pub enabled: bool,
    /// Shortest time the eyes stay open between blinks
    pub interval_min_secs: f32,
    /// Longest time the eyes stay open between blinks
    pub interval_max_secs: f32,
    pub close_secs: f32,
    /// Time the eyes stay fully closed
    pub hold_secs: f32,
    pub open_secs: f32,
    /// Fixed RNG seed for reproducible blink timing
    pub seed: Option<u64>,
}

impl Default for BlinkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_min_secs: 2.0,
            interval_max_secs: 6.0,
            close_secs: 0.06,
            hold_secs: 0.04,
            open_secs: 0.12,
            seed: None,
        }
    }
}

/// Head/neck tilt applied around the render call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseConfig {
    /// Head pitch offset in radians
    pub head_tilt: f32,
    /// Neck pitch offset in radians
    pub neck_tilt: f32,
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            head_tilt: 0.15,
            neck_tilt: 0.05,
        }
    }
}

/// Camera defaults. `position` and `target_height` define the canonical view.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub fov_deg: f32,
    pub near: f32,
    pub far: f32,
    pub position: [f32; 3],
    /// Height of the orbit target above the origin
    pub target_height: f32,
    /// Closest the orbit rig may bring the camera to its target
    pub min_distance: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_deg: 30.0,
            near: 0.1,
            far: 20.0,
            position: [0.0, 1.3, 1.5],
            target_height: 1.3,
            min_distance: 0.5,
        }
    }
}

/// Camera follow policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FollowConfig {
    /// Camera position relative to the avatar root
    pub offset: [f32; 3],
    /// Look target relative to the avatar root
    pub target_offset: [f32; 3],
    /// Per-frame approach factor toward the follow pose (1.0 = lock on)
    pub smoothing: f32,
}

impl Default for FollowConfig {
    fn default() -> Self {
        Self {
            offset: [0.0, 1.3, 1.5],
            target_offset: [0.0, 1.3, 0.0],
            smoothing: 0.1,
        }
    }
}

/// Distance attenuation model
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceModel {
    Linear,
    #[default]
    Inverse,
    Exponential,
}

/// Spatial voice configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpatialConfig {
    /// Microphone position in camera space
    pub microphone_offset: [f32; 3],
    /// Sample distance every N accepted frames
    pub sample_every: u32,
    /// Minimum distance change that triggers a volume write
    pub distance_epsilon: f32,
    /// Minimum pan change that triggers a pan write
    pub pan_epsilon: f32,
    pub distance_model: DistanceModel,
    pub ref_distance: f32,
    pub max_distance: f32,
    pub rolloff: f32,
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self {
            microphone_offset: [0.0, -0.1, -0.35],
            sample_every: 3,
            distance_epsilon: 0.01,
            pan_epsilon: 0.01,
            distance_model: DistanceModel::Inverse,
            ref_distance: 0.5,
            max_distance: 10.0,
            rolloff: 1.0,
        }
    }
}

/// Eye gaze toward the camera
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LookAtConfig {
    pub enabled: bool,
    /// Input angle mapped to the full output range
    pub input_max_deg: f32,
    pub horizontal_output_deg: f32,
    pub vertical_output_deg: f32,
}

impl Default for LookAtConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            input_max_deg: 90.0,
            horizontal_output_deg: 10.0,
            vertical_output_deg: 10.0,
        }
    }
}

/// Microphone prop
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MicrophoneConfig {
    pub visible: bool,
}

impl Default for MicrophoneConfig {
    fn default() -> Self {
        Self { visible: true }
    }
}

/// Get the platform-specific configuration directory
fn dirs_path() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        if let Some(config_dir) = std::env::var_os("XDG_CONFIG_HOME") {
            return PathBuf::from(config_dir).join("vrm-asmr");
        }
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(".config/vrm-asmr");
        }
    }

    #[cfg(target_os = "macos")]
    {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join("Library/Application Support/vrm-asmr");
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata).join("vrm-asmr");
        }
    }

    PathBuf::from(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.frame.target_fps, 60.0);
        assert_eq!(config.spatial.sample_every, 3);
        assert_eq!(config.avatar.fallback_mouth, "aa");
        assert!(config.microphone.visible);
    }

    #[test]
    fn test_config_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_smoothing_rejected() {
        let mut config = Config::default();
        config.lip_sync.smoothing_factor = 1.5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("lip_sync.smoothing_factor"));
    }

    #[test]
    fn test_invalid_blink_interval_rejected() {
        let mut config = Config::default();
        config.blink.interval_min_secs = 8.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
            [frame]
            target_fps = 30.0

            [avatar]
            mouth_candidates = ["A", "B"]
            idle_clip_path = "clips/idle.vrma"

            [spatial]
            distance_model = "linear"
            sample_every = 2
        "#;

        let config = Config::from_str(toml).unwrap();
        assert_eq!(config.frame.target_fps, 30.0);
        assert_eq!(config.avatar.mouth_candidates, vec!["A", "B"]);
        assert_eq!(
            config.avatar.idle_clip_path,
            Some(PathBuf::from("clips/idle.vrma"))
        );
        assert_eq!(config.spatial.distance_model, DistanceModel::Linear);
        assert_eq!(config.spatial.sample_every, 2);
        // Untouched sections keep their defaults
        assert_eq!(config.pose.head_tilt, 0.15);
    }
}

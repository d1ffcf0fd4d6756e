//! Eye gaze toward a bound target (the camera).
//!
//! Yaw and pitch from the head to the target, measured in the avatar's root
//! frame, go through a linear range map onto both eye bones. There is no
//! saccade or smoothing.

use glam::{EulerRot, Quat, Vec3};

use crate::avatar::AvatarInstance;
use crate::config::LookAtConfig;

/// Clamp `input` to ±`input_max` and scale it onto ±`output_max`.
pub fn range_map(input: f32, input_max: f32, output_max: f32) -> f32 {
    if input_max <= 0.0 {
        return 0.0;
    }
    input.clamp(-input_max, input_max) / input_max * output_max
}

#[derive(Debug, Clone)]
pub struct AutoLookAt {
    config: LookAtConfig,
    target: Option<Vec3>,
}

impl AutoLookAt {
    pub fn new(config: &LookAtConfig) -> Self {
        Self {
            config: config.clone(),
            target: None,
        }
    }

    /// Bind the gaze target for subsequent frames.
    pub fn set_target(&mut self, target: Vec3) {
        self.target = Some(target);
    }

    pub fn clear_target(&mut self) {
        self.target = None;
    }

    pub fn target(&self) -> Option<Vec3> {
        self.target
    }

    /// Point both eyes at the target. Returns the applied (yaw, pitch) in
    /// degrees, or `None` when disabled, unbound or the avatar has no eyes.
    pub fn apply(&self, avatar: &mut AvatarInstance) -> Option<(f32, f32)> {
        if !self.config.enabled {
            return None;
        }
        let target = self.target?;
        let head = avatar.bone("head")?;
        let eyes: Vec<_> = ["leftEye", "rightEye"]
            .iter()
            .filter_map(|n| avatar.bone(n))
            .collect();
        if eyes.is_empty() {
            return None;
        }

        let origin = avatar.bone_world_position(head)?;
        let dir = avatar.root_rotation().inverse() * (target - origin);
        if dir.length_squared() <= f32::EPSILON {
            return None;
        }

        // Avatar faces +Z in its root frame
        let yaw = dir.x.atan2(dir.z).to_degrees();
        let pitch = dir.y.atan2(dir.x.hypot(dir.z)).to_degrees();

        let yaw_out = range_map(yaw, self.config.input_max_deg, self.config.horizontal_output_deg);
        let pitch_out = range_map(pitch, self.config.input_max_deg, self.config.vertical_output_deg);

        let gaze = Quat::from_euler(
            EulerRot::YXZ,
            yaw_out.to_radians(),
            -pitch_out.to_radians(),
            0.0,
        );
        for eye in eyes {
            let rest = avatar.rest_rotation(eye);
            avatar.set_rotation(eye, rest * gaze);
        }

        Some((yaw_out, pitch_out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avatar::VrmDocument;
    use crate::test_support::{avatar_glb, avatar_glb_with};

    fn avatar() -> AvatarInstance {
        AvatarInstance::from_document("test", VrmDocument::from_glb(&avatar_glb(&[])).unwrap())
    }

    #[test]
    fn test_range_map() {
        assert_eq!(range_map(45.0, 90.0, 10.0), 5.0);
        assert_eq!(range_map(180.0, 90.0, 10.0), 10.0);
        assert_eq!(range_map(-180.0, 90.0, 10.0), -10.0);
        assert_eq!(range_map(10.0, 0.0, 10.0), 0.0);
    }

    #[test]
    fn test_target_straight_ahead_keeps_rest() {
        let mut avatar = avatar();
        let mut look = AutoLookAt::new(&LookAtConfig::default());
        let head = avatar.bone_world_position(avatar.bone("head").unwrap()).unwrap();
        look.set_target(head + Vec3::Z * 2.0);

        let (yaw, pitch) = look.apply(&mut avatar).unwrap();
        assert!(yaw.abs() < 1e-4 && pitch.abs() < 1e-4);
        let eye = avatar.bone("leftEye").unwrap();
        assert!(avatar.rotation(eye).angle_between(Quat::IDENTITY) < 1e-5);
    }

    #[test]
    fn test_target_to_the_side_turns_eyes() {
        let mut avatar = avatar();
        let mut look = AutoLookAt::new(&LookAtConfig::default());
        let head = avatar.bone_world_position(avatar.bone("head").unwrap()).unwrap();
        // 45 degrees to the avatar's left (+X) and level
        look.set_target(head + Vec3::new(1.0, 0.0, 1.0));

        let (yaw, pitch) = look.apply(&mut avatar).unwrap();
        assert!((yaw - 5.0).abs() < 1e-3, "{yaw}");
        assert!(pitch.abs() < 1e-3);

        let eye = avatar.bone("rightEye").unwrap();
        let forward = avatar.rotation(eye) * Vec3::Z;
        assert!(forward.x > 0.0);
    }

    #[test]
    fn test_unbound_or_disabled_is_noop() {
        let mut avatar = avatar();
        let look = AutoLookAt::new(&LookAtConfig::default());
        assert!(look.apply(&mut avatar).is_none());

        let mut disabled = AutoLookAt::new(&LookAtConfig {
            enabled: false,
            ..LookAtConfig::default()
        });
        disabled.set_target(Vec3::ONE);
        assert!(disabled.apply(&mut avatar).is_none());
    }

    #[test]
    fn test_avatar_without_eyes() {
        let doc = VrmDocument::from_glb(&avatar_glb_with(&[], false)).unwrap();
        let mut avatar = AvatarInstance::from_document("test", doc);
        let mut look = AutoLookAt::new(&LookAtConfig::default());
        look.set_target(Vec3::new(0.0, 1.5, 2.0));
        assert!(look.apply(&mut avatar).is_none());
    }
}

//! Render-scoped head/neck tilt with eye counter-rotation.
//!
//! The tilt exists only for the duration of one draw call. The snapshot
//! holds the exact rotations it replaced and restores them afterwards, so
//! the mixer never sees the override.

use glam::Quat;

use crate::avatar::{AvatarInstance, BoneId};
use crate::config::PoseConfig;

const TILTED_BONES: [&str; 4] = ["head", "neck", "leftEye", "rightEye"];

/// Original rotations of the bones an override touched.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "a snapshot that is never restored leaves the tilt baked into the pose"]
pub struct PoseSnapshot {
    saved: Vec<(BoneId, Quat)>,
}

impl PoseSnapshot {
    pub fn restore(self, avatar: &mut AvatarInstance) {
        for (bone, rotation) in self.saved {
            avatar.set_rotation(bone, rotation);
        }
    }

    pub fn len(&self) -> usize {
        self.saved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.saved.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct PoseOverrideStage {
    head_tilt: f32,
    neck_tilt: f32,
}

impl PoseOverrideStage {
    pub fn new(config: &PoseConfig) -> Self {
        Self {
            head_tilt: config.head_tilt,
            neck_tilt: config.neck_tilt,
        }
    }

    fn offset_for(&self, bone: &str) -> f32 {
        match bone {
            "head" => self.head_tilt,
            "neck" => self.neck_tilt,
            // Eyes cancel the combined pitch so the gaze stays put
            _ => -(self.head_tilt + self.neck_tilt),
        }
    }

    /// Snapshot the tilted bones, then add the pitch offsets. Missing bones
    /// are skipped.
    pub fn apply(&self, avatar: &mut AvatarInstance) -> PoseSnapshot {
        let targets: Vec<(&str, BoneId)> = TILTED_BONES
            .iter()
            .filter_map(|&name| avatar.bone(name).map(|bone| (name, bone)))
            .collect();

        let saved: Vec<(BoneId, Quat)> = targets
            .iter()
            .map(|&(_, bone)| (bone, avatar.rotation(bone)))
            .collect();

        for (&(name, bone), &(_, original)) in targets.iter().zip(&saved) {
            let tilt = Quat::from_rotation_x(self.offset_for(name));
            avatar.set_rotation(bone, tilt * original);
        }

        PoseSnapshot { saved }
    }

    /// Apply the tilt, run `draw`, restore. Returns whatever `draw` returns.
    pub fn render_scoped<R>(
        &self,
        avatar: &mut AvatarInstance,
        draw: impl FnOnce(&AvatarInstance) -> R,
    ) -> R {
        let snapshot = self.apply(avatar);
        let out = draw(avatar);
        snapshot.restore(avatar);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avatar::VrmDocument;
    use crate::test_support::{avatar_glb, avatar_glb_with};

    fn avatar(with_eyes: bool) -> AvatarInstance {
        let doc = VrmDocument::from_glb(&avatar_glb_with(&["aa"], with_eyes)).unwrap();
        AvatarInstance::from_document("test", doc)
    }

    fn rotations(avatar: &AvatarInstance) -> Vec<Option<Quat>> {
        TILTED_BONES
            .iter()
            .map(|n| avatar.bone(n).map(|b| avatar.rotation(b)))
            .collect()
    }

    #[test]
    fn test_render_scoped_round_trip() {
        let stage = PoseOverrideStage::new(&PoseConfig::default());
        let mut avatar = avatar(true);
        let head = avatar.bone("head").unwrap();
        avatar.set_rotation(head, Quat::from_rotation_y(0.3));
        let before = rotations(&avatar);

        let seen = stage.render_scoped(&mut avatar, |a| a.rotation(head));

        assert_eq!(rotations(&avatar), before, "override leaked out of render");
        let expected = Quat::from_rotation_x(0.15) * Quat::from_rotation_y(0.3);
        assert!(seen.angle_between(expected) < 1e-5);
    }

    #[test]
    fn test_eyes_counter_rotate() {
        let stage = PoseOverrideStage::new(&PoseConfig::default());
        let mut avatar = avatar(true);
        let left = avatar.bone("leftEye").unwrap();
        let right = avatar.bone("rightEye").unwrap();

        let snapshot = stage.apply(&mut avatar);
        assert_eq!(snapshot.len(), 4);
        let expected = Quat::from_rotation_x(-0.2);
        assert!(avatar.rotation(left).angle_between(expected) < 1e-5);
        assert!(avatar.rotation(right).angle_between(expected) < 1e-5);

        snapshot.restore(&mut avatar);
        assert_eq!(avatar.rotation(left), Quat::IDENTITY);
    }

    #[test]
    fn test_missing_bones_skipped() {
        let stage = PoseOverrideStage::new(&PoseConfig::default());
        let mut avatar = avatar(false);
        let before = rotations(&avatar);

        let snapshot = stage.apply(&mut avatar);
        assert_eq!(snapshot.len(), 2);
        let neck = avatar.bone("neck").unwrap();
        assert!(avatar.rotation(neck).angle_between(Quat::from_rotation_x(0.05)) < 1e-5);

        snapshot.restore(&mut avatar);
        assert_eq!(rotations(&avatar), before);
    }

    #[test]
    fn test_restore_is_exact_after_many_frames() {
        let stage = PoseOverrideStage::new(&PoseConfig::default());
        let doc = VrmDocument::from_glb(&avatar_glb(&[])).unwrap();
        let mut avatar = AvatarInstance::from_document("test", doc);
        let head = avatar.bone("head").unwrap();
        let original = Quat::from_euler(glam::EulerRot::YXZ, 0.4, -0.1, 0.05);
        avatar.set_rotation(head, original);

        for _ in 0..1000 {
            stage.render_scoped(&mut avatar, |_| ());
        }
        // Bitwise equal: no drift from repeated apply/restore
        assert_eq!(avatar.rotation(head), original);
    }
}

//! A loaded, drivable avatar.

use glam::{Mat4, Quat, Vec3};
use std::collections::HashMap;

use super::expression::ExpressionSlots;
use super::skeleton::Skeleton;
use super::vrm::{VrmDocument, VrmVersion};
use crate::animation::{AnimationClip, AnimationMixer, MixerState};
use crate::render::{FrameRenderer, ResourceId, ResourceKind};

/// Stable reference to a humanoid bone for the lifetime of its instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoneId(usize);

impl BoneId {
    /// Skeleton node index
    pub fn node(self) -> usize {
        self.0
    }
}

#[derive(Debug)]
pub struct AvatarInstance {
    name: String,
    version: VrmVersion,
    skeleton: Skeleton,
    bones: HashMap<String, usize>,
    slots: ExpressionSlots,
    root_position: Vec3,
    root_rotation: Quat,
    mixer: AnimationMixer,
    mesh_count: usize,
    material_count: usize,
    resources: Vec<ResourceId>,
    disposed: bool,
}

impl AvatarInstance {
    pub fn from_document(name: &str, doc: VrmDocument) -> Self {
        // VRM 0.x models face -Z; turn them to face the default camera
        let root_rotation = match doc.version {
            VrmVersion::V0 => Quat::from_rotation_y(std::f32::consts::PI),
            VrmVersion::V1 => Quat::IDENTITY,
        };

        Self {
            name: name.to_string(),
            version: doc.version,
            skeleton: doc.skeleton,
            bones: doc.human_bones,
            slots: ExpressionSlots::from_defs(doc.expressions),
            root_position: Vec3::ZERO,
            root_rotation,
            mixer: AnimationMixer::new(),
            mesh_count: doc.mesh_count,
            material_count: doc.material_count,
            resources: Vec::new(),
            disposed: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> VrmVersion {
        self.version
    }

    /// Look up a humanoid bone. Unknown names are `None`, never a fallback node.
    pub fn bone(&self, name: &str) -> Option<BoneId> {
        self.bones.get(name).copied().map(BoneId)
    }

    pub fn human_bones(&self) -> &HashMap<String, usize> {
        &self.bones
    }

    pub fn rotation(&self, bone: BoneId) -> Quat {
        self.skeleton
            .joint(bone.0)
            .map(|j| j.rotation)
            .unwrap_or(Quat::IDENTITY)
    }

    pub fn set_rotation(&mut self, bone: BoneId, rotation: Quat) {
        if let Some(joint) = self.skeleton.joint_mut(bone.0) {
            joint.rotation = rotation;
        }
    }

    pub fn rest_rotation(&self, bone: BoneId) -> Quat {
        self.skeleton
            .joint(bone.0)
            .map(|j| j.rest_rotation)
            .unwrap_or(Quat::IDENTITY)
    }

    pub fn root_position(&self) -> Vec3 {
        self.root_position
    }

    pub fn root_rotation(&self) -> Quat {
        self.root_rotation
    }

    pub fn root_transform(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.root_rotation, self.root_position)
    }

    /// World-space position of a bone.
    pub fn bone_world_position(&self, bone: BoneId) -> Option<Vec3> {
        let local = self.skeleton.world_position(bone.0)?;
        Some(self.root_transform().transform_point3(local))
    }

    /// World transforms for every node, root transform applied.
    pub fn world_transforms(&self) -> Vec<Mat4> {
        let root = self.root_transform();
        self.skeleton
            .world_transforms()
            .into_iter()
            .map(|m| root * m)
            .collect()
    }

    pub fn skeleton(&self) -> &Skeleton {
        &self.skeleton
    }

    pub fn slots(&self) -> &ExpressionSlots {
        &self.slots
    }

    pub fn slots_mut(&mut self) -> &mut ExpressionSlots {
        &mut self.slots
    }

    /// Bind a clip to this avatar and loop it.
    pub fn play_idle(&mut self, clip: &AnimationClip) {
        let bound = clip.bind(&self.bones, &self.skeleton, self.version);
        tracing::info!(
            "Idle clip '{}' bound: {}/{} tracks",
            bound.name,
            bound.tracks.len(),
            clip.tracks.len()
        );
        self.mixer.play(bound);
    }

    /// Advance the mixer and write its pose into the skeleton.
    pub fn advance(&mut self, dt: f32) {
        self.mixer.update(dt, &mut self.skeleton);
    }

    pub fn mixer_state(&self) -> Option<&MixerState> {
        self.mixer.state()
    }

    pub fn stop_animation(&mut self) {
        self.mixer.stop_all();
    }

    /// Renderer resources this avatar needs: one per mesh and per material.
    pub fn resource_requests(&self) -> Vec<(ResourceKind, String)> {
        let meshes = (0..self.mesh_count)
            .map(|i| (ResourceKind::Geometry, format!("{}.mesh{}", self.name, i)));
        let materials = (0..self.material_count)
            .map(|i| (ResourceKind::Material, format!("{}.material{}", self.name, i)));
        meshes.chain(materials).collect()
    }

    pub fn attach_resources(&mut self, ids: Vec<ResourceId>) {
        self.resources.extend(ids);
    }

    pub fn resources(&self) -> &[ResourceId] {
        &self.resources
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Stop animation and release renderer resources. Safe to call twice.
    pub fn dispose(&mut self, renderer: &mut dyn FrameRenderer) {
        if self.disposed {
            return;
        }
        self.mixer.stop_all();
        for id in self.resources.drain(..) {
            renderer.release(id);
        }
        self.slots.clear();
        self.disposed = true;
        tracing::debug!("Disposed avatar '{}'", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{allocate_all, HeadlessRenderer};
    use crate::test_support::{avatar_glb, idle_clip_glb, vrm0_avatar_glb};

    fn avatar() -> AvatarInstance {
        let doc = VrmDocument::from_glb(&avatar_glb(&["aa", "blink"])).unwrap();
        AvatarInstance::from_document("test", doc)
    }

    #[test]
    fn test_bone_lookup_is_stable() {
        let avatar = avatar();
        let head = avatar.bone("head").unwrap();
        assert_eq!(avatar.bone("head"), Some(head));
        assert_eq!(head.node(), 5);
        assert!(avatar.bone("tail").is_none());
    }

    #[test]
    fn test_bone_world_position() {
        let avatar = avatar();
        let head = avatar.bone("head").unwrap();
        let p = avatar.bone_world_position(head).unwrap();
        assert!((p - Vec3::new(0.0, 1.55, 0.0)).length() < 1e-5, "{p:?}");
        assert_eq!(avatar.world_transforms().len(), 8);
    }

    #[test]
    fn test_vrm0_root_faces_camera() {
        let doc = VrmDocument::from_glb(&vrm0_avatar_glb()).unwrap();
        let avatar = AvatarInstance::from_document("old", doc);
        let forward = avatar.root_rotation() * Vec3::NEG_Z;
        assert!((forward - Vec3::Z).length() < 1e-5);
    }

    #[test]
    fn test_idle_clip_drives_head() {
        let mut avatar = avatar();
        let clip = AnimationClip::from_glb(&idle_clip_glb()).unwrap();
        avatar.play_idle(&clip);

        avatar.advance(0.5);
        let head = avatar.bone("head").unwrap();
        assert!(avatar.rotation(head).angle_between(Quat::IDENTITY) > 0.1);
        assert!(avatar.mixer_state().unwrap().playing);
    }

    #[test]
    fn test_dispose_releases_once() {
        let mut renderer = HeadlessRenderer::new();
        let mut avatar = avatar();
        let ids = allocate_all(&mut renderer, &avatar.resource_requests()).unwrap();
        assert_eq!(ids.len(), 2);
        avatar.attach_resources(ids);

        avatar.dispose(&mut renderer);
        avatar.dispose(&mut renderer);
        assert!(avatar.is_disposed());
        assert_eq!(renderer.released_count(), 2);
        assert_eq!(renderer.unknown_releases(), 0);
        assert!(avatar.mixer_state().is_none());
    }
}

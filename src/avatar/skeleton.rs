//! Node arena for an avatar's scene subtree with forward kinematics.
//!
//! Nodes are stored by their glTF index. Parents are resolved once at load
//! time so world transforms never need a tree search.

use glam::{Mat4, Quat, Vec3};

/// A single node: name, parent link, current local TRS and the rest pose it
/// was loaded with.
#[derive(Debug, Clone)]
pub struct Joint {
    pub name: String,
    pub parent: Option<usize>,
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    pub rest_rotation: Quat,
}

impl Joint {
    pub fn new(name: &str, translation: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self {
            name: name.to_string(),
            parent: None,
            translation,
            rotation,
            scale,
            rest_rotation: rotation,
        }
    }

    fn local_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Skeleton {
    joints: Vec<Joint>,
}

impl Skeleton {
    /// Build the arena from a glTF document, keeping node order.
    pub fn from_document(document: &gltf::Document) -> Self {
        let mut joints: Vec<Joint> = document
            .nodes()
            .map(|node| {
                let (t, r, s) = node.transform().decomposed();
                Joint::new(
                    node.name().unwrap_or_default(),
                    Vec3::from(t),
                    Quat::from_array(r),
                    Vec3::from(s),
                )
            })
            .collect();

        for node in document.nodes() {
            for child in node.children() {
                joints[child.index()].parent = Some(node.index());
            }
        }

        Self { joints }
    }

    pub fn from_joints(joints: Vec<Joint>) -> Self {
        Self { joints }
    }

    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    pub fn joint(&self, idx: usize) -> Option<&Joint> {
        self.joints.get(idx)
    }

    pub fn joint_mut(&mut self, idx: usize) -> Option<&mut Joint> {
        self.joints.get_mut(idx)
    }

    /// First node carrying `name`.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.joints.iter().position(|j| j.name == name)
    }

    /// Compute world transforms for all nodes using forward kinematics.
    pub fn world_transforms(&self) -> Vec<Mat4> {
        let mut world = vec![Mat4::IDENTITY; self.joints.len()];
        let mut computed = vec![false; self.joints.len()];

        for i in 0..self.joints.len() {
            self.compute_node(&mut world, &mut computed, i);
        }

        world
    }

    fn compute_node(&self, world: &mut [Mat4], computed: &mut [bool], idx: usize) {
        if computed[idx] {
            return;
        }

        // Marked before recursing so a malformed parent cycle terminates
        computed[idx] = true;
        let local = self.joints[idx].local_matrix();
        world[idx] = local;

        if let Some(parent) = self.joints[idx].parent.filter(|&p| p < self.joints.len()) {
            self.compute_node(world, computed, parent);
            world[idx] = world[parent] * local;
        }
    }

    /// World-space position of one node.
    pub fn world_position(&self, idx: usize) -> Option<Vec3> {
        let mut joint = self.joints.get(idx)?;
        let mut m = joint.local_matrix();
        while let Some(parent) = joint.parent {
            joint = self.joints.get(parent)?;
            m = joint.local_matrix() * m;
        }
        Some(m.w_axis.truncate())
    }
}

//! Studio microphone prop carried by the camera.
//!
//! Eleven meshes share eight geometries and four materials (the four
//! shock-mount connectors reuse one geometry). Each resource is released once.

use glam::Vec3;

use super::{allocate_all, FrameRenderer, ResourceId, ResourceKind};
use crate::error::RenderError;

const GEOMETRIES: [&str; 8] = [
    "mic.body", "mic.head", "mic.inner", "mic.ring", "mic.mount", "mic.connector", "mic.pole",
    "mic.base",
];
const MATERIALS: [&str; 4] = ["mic.body", "mic.grille", "mic.inner", "mic.stand"];

/// (geometry, material) index pair per mesh
const PARTS: [(usize, usize); 11] = [
    (0, 0),
    (1, 1),
    (2, 2),
    (3, 0),
    (4, 3),
    (5, 3),
    (5, 3),
    (5, 3),
    (5, 3),
    (6, 3),
    (7, 3),
];

#[derive(Debug)]
pub struct Microphone {
    /// Position in camera space
    offset: Vec3,
    visible: bool,
    geometries: Vec<ResourceId>,
    materials: Vec<ResourceId>,
    meshes: Vec<(ResourceId, ResourceId)>,
}

impl Microphone {
    /// Allocate the prop's resources. Nothing stays allocated on failure.
    pub fn build(
        renderer: &mut dyn FrameRenderer,
        offset: Vec3,
        visible: bool,
    ) -> Result<Self, RenderError> {
        let requests = |kind: ResourceKind, labels: &[&str]| -> Vec<(ResourceKind, String)> {
            labels.iter().map(|l| (kind, l.to_string())).collect()
        };

        let geometries =
            allocate_all(renderer, &requests(ResourceKind::Geometry, &GEOMETRIES[..]))?;
        let material_requests = requests(ResourceKind::Material, &MATERIALS[..]);
        let materials = match allocate_all(renderer, &material_requests) {
            Ok(ids) => ids,
            Err(e) => {
                for id in geometries {
                    renderer.release(id);
                }
                return Err(e);
            }
        };

        let meshes = PARTS
            .iter()
            .map(|&(g, m)| (geometries[g], materials[m]))
            .collect();

        Ok(Self {
            offset,
            visible,
            geometries,
            materials,
            meshes,
        })
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn is_visible(&self) -> bool {
        self.visible && !self.is_released()
    }

    pub fn offset(&self) -> Vec3 {
        self.offset
    }

    /// Geometry and material handles of each mesh, empty once released.
    pub fn meshes(&self) -> &[(ResourceId, ResourceId)] {
        &self.meshes
    }

    pub fn resource_count(&self) -> usize {
        self.geometries.len() + self.materials.len()
    }

    pub fn is_released(&self) -> bool {
        self.geometries.is_empty() && self.materials.is_empty()
    }

    /// Release geometries then materials. Returns how many were released;
    /// a second call releases nothing.
    pub fn release(&mut self, renderer: &mut dyn FrameRenderer) -> usize {
        self.meshes.clear();
        let ids: Vec<ResourceId> = self
            .geometries
            .drain(..)
            .chain(self.materials.drain(..))
            .collect();
        for id in &ids {
            renderer.release(*id);
        }
        ids.len()
    }
}

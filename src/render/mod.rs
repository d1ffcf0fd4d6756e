//! Renderer collaborator interface, scene bookkeeping and auxiliary props.
//!
//! The stage never talks to a GPU API directly. It asks a [`FrameRenderer`]
//! for opaque resource handles and hands it a [`FrameView`] once per accepted
//! frame.

pub mod headless;
pub mod microphone;
pub mod scene;

use glam::Vec3;

use crate::avatar::AvatarInstance;
use crate::error::RenderError;
use crate::stage::camera::CameraState;

pub use headless::HeadlessRenderer;
pub use microphone::Microphone;
pub use scene::{Scene, SceneObject};

/// Opaque handle to a renderer-owned resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Geometry,
    Material,
}

/// Everything the renderer needs to draw one frame.
pub struct FrameView<'a> {
    pub frame: u64,
    pub camera: &'a CameraState,
    pub avatar: Option<&'a AvatarInstance>,
    /// Microphone meshes to draw, empty when the prop is hidden
    pub microphone: &'a [(ResourceId, ResourceId)],
    /// Camera-space position of the microphone meshes
    pub microphone_offset: Vec3,
}

pub trait FrameRenderer: Send {
    fn allocate(&mut self, kind: ResourceKind, label: &str) -> Result<ResourceId, RenderError>;

    /// Release a resource. Releasing an unknown handle is ignored.
    fn release(&mut self, id: ResourceId);

    fn render(&mut self, view: &FrameView<'_>);

    /// Tear down the renderer itself. Called once, last.
    fn dispose(&mut self);
}

/// Allocate a batch of resources, releasing the ones already allocated if
/// any allocation fails.
pub fn allocate_all(
    renderer: &mut dyn FrameRenderer,
    requests: &[(ResourceKind, String)],
) -> Result<Vec<ResourceId>, RenderError> {
    let mut ids = Vec::with_capacity(requests.len());
    for (kind, label) in requests {
        match renderer.allocate(*kind, label) {
            Ok(id) => ids.push(id),
            Err(e) => {
                for id in ids {
                    renderer.release(id);
                }
                return Err(e);
            }
        }
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_all_rolls_back() {
        let mut renderer = HeadlessRenderer::new().fail_after(2);
        let requests = vec![
            (ResourceKind::Geometry, "a".to_string()),
            (ResourceKind::Geometry, "b".to_string()),
            (ResourceKind::Material, "c".to_string()),
        ];

        let err = allocate_all(&mut renderer, &requests).unwrap_err();
        assert!(matches!(err, RenderError::Allocation(_)));
        assert_eq!(renderer.live_count(), 0);
        assert_eq!(renderer.released_count(), 2);
    }

    #[test]
    fn test_allocate_all_ok() {
        let mut renderer = HeadlessRenderer::new();
        let requests = vec![(ResourceKind::Material, "body".to_string())];
        let ids = allocate_all(&mut renderer, &requests).unwrap();
        assert_eq!(ids.len(), 1);
        assert_eq!(renderer.live_count(), 1);
    }
}

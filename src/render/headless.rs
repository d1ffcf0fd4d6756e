//! Renderer that draws nothing and records what it was asked to do.

use glam::{Quat, Vec3};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{FrameRenderer, FrameView, ResourceId, ResourceKind};
use crate::error::RenderError;

/// Summary of one rendered frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameRecord {
    pub frame: u64,
    pub camera_position: Vec3,
    pub avatar_present: bool,
    pub head_rotation: Option<Quat>,
    pub microphone_visible: bool,
    pub microphone_meshes: usize,
}

#[derive(Debug, Default)]
struct RenderLog {
    next_id: u64,
    live: BTreeSet<ResourceId>,
    released: usize,
    unknown_releases: usize,
    frames: u64,
    last_frame: Option<FrameRecord>,
    disposals: usize,
    fail_after: Option<usize>,
    allocations: usize,
}

/// Cloning shares the underlying log, so a test can keep a handle after the
/// renderer has been moved into the stage.
#[derive(Debug, Clone, Default)]
pub struct HeadlessRenderer {
    log: Arc<Mutex<RenderLog>>,
}

impl HeadlessRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every allocation after the first `n`.
    pub fn fail_after(self, n: usize) -> Self {
        self.lock().fail_after = Some(n);
        self
    }

    fn lock(&self) -> MutexGuard<'_, RenderLog> {
        self.log.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn live_count(&self) -> usize {
        self.lock().live.len()
    }

    pub fn released_count(&self) -> usize {
        self.lock().released
    }

    /// Releases of handles that were not live (double release or foreign id).
    pub fn unknown_releases(&self) -> usize {
        self.lock().unknown_releases
    }

    pub fn frames_rendered(&self) -> u64 {
        self.lock().frames
    }

    pub fn last_frame(&self) -> Option<FrameRecord> {
        self.lock().last_frame.clone()
    }

    pub fn disposals(&self) -> usize {
        self.lock().disposals
    }
}

impl FrameRenderer for HeadlessRenderer {
    fn allocate(&mut self, kind: ResourceKind, label: &str) -> Result<ResourceId, RenderError> {
        let mut log = self.lock();
        if log.fail_after.is_some_and(|n| log.allocations >= n) {
            return Err(RenderError::Allocation(format!("{:?} '{}'", kind, label)));
        }
        log.allocations += 1;
        log.next_id += 1;
        let id = ResourceId(log.next_id);
        log.live.insert(id);
        tracing::trace!("Allocated {:?} {} ({:?})", kind, label, id);
        Ok(id)
    }

    fn release(&mut self, id: ResourceId) {
        let mut log = self.lock();
        if log.live.remove(&id) {
            log.released += 1;
        } else {
            log.unknown_releases += 1;
        }
    }

    fn render(&mut self, view: &FrameView<'_>) {
        let head_rotation = view
            .avatar
            .and_then(|a| a.bone("head").map(|b| a.rotation(b)));
        let mut log = self.lock();
        log.frames += 1;
        log.last_frame = Some(FrameRecord {
            frame: view.frame,
            camera_position: view.camera.position,
            avatar_present: view.avatar.is_some(),
            head_rotation,
            microphone_visible: !view.microphone.is_empty(),
            microphone_meshes: view.microphone.len(),
        });
    }

    fn dispose(&mut self) {
        self.lock().disposals += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_tracks_unknown_handles() {
        let mut renderer = HeadlessRenderer::new();
        let id = renderer.allocate(ResourceKind::Geometry, "cube").unwrap();

        renderer.release(id);
        renderer.release(id);
        assert_eq!(renderer.released_count(), 1);
        assert_eq!(renderer.unknown_releases(), 1);
    }

    #[test]
    fn test_clone_shares_log() {
        let renderer = HeadlessRenderer::new();
        let mut moved = renderer.clone();
        moved.allocate(ResourceKind::Material, "skin").unwrap();
        assert_eq!(renderer.live_count(), 1);
    }
}

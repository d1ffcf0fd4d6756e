//! Camera state, orbit controls and the follow controller.

use glam::{Mat4, Quat, Vec3};

use crate::config::{CameraConfig, FollowConfig};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    pub fov_deg: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Projection {
    pub fn matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_deg.to_radians(), self.aspect, self.near, self.far)
    }
}

/// Camera pose published to external listeners every frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    pub position: Vec3,
    pub rotation: Quat,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CameraState {
    pub position: Vec3,
    pub rotation: Quat,
    pub projection: Projection,
    pub follow_enabled: bool,
}

impl CameraState {
    /// Camera at the configured position looking at the orbit target.
    pub fn from_config(config: &CameraConfig) -> Self {
        let mut camera = Self {
            position: Vec3::from(config.position),
            rotation: Quat::IDENTITY,
            projection: Projection {
                fov_deg: config.fov_deg,
                aspect: 1.0,
                near: config.near,
                far: config.far,
            },
            follow_enabled: false,
        };
        camera.look_at(Vec3::new(0.0, config.target_height, 0.0));
        camera
    }

    /// Orient the camera so -Z points at `target`.
    pub fn look_at(&mut self, target: Vec3) {
        let dir = target - self.position;
        if dir.length_squared() <= f32::EPSILON {
            return;
        }
        // Straight up or down has no well-defined yaw; pick a different up
        let up = if dir.normalize().abs().y > 0.999 {
            Vec3::Z
        } else {
            Vec3::Y
        };
        let (_, rotation, _) = Mat4::look_at_rh(self.position, target, up)
            .inverse()
            .to_scale_rotation_translation();
        self.rotation = rotation.normalize();
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    pub fn pose(&self) -> CameraPose {
        CameraPose {
            position: self.position,
            rotation: self.rotation,
        }
    }

    /// Update the aspect ratio. Zero-sized viewports are ignored.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.projection.aspect = width as f32 / height as f32;
    }
}

/// Orbit-style user camera control.
pub trait OrbitControls: Send {
    fn set_rotate_enabled(&mut self, enabled: bool);

    fn rotate_enabled(&self) -> bool;

    fn set_target(&mut self, target: Vec3);

    fn target(&self) -> Vec3;

    /// Queue user rotation in radians. Ignored while rotation is disabled.
    fn orbit(&mut self, yaw: f32, pitch: f32);

    /// Apply pending input to the camera.
    fn update(&mut self, camera: &mut CameraState);

    fn dispose(&mut self);

    fn is_disposed(&self) -> bool;
}

/// Default orbit controller: yaw/pitch around a target point.
#[derive(Debug)]
pub struct OrbitRig {
    target: Vec3,
    rotate_enabled: bool,
    min_distance: f32,
    pending_yaw: f32,
    pending_pitch: f32,
    disposed: bool,
}

impl OrbitRig {
    pub fn new(config: &CameraConfig) -> Self {
        Self {
            target: Vec3::new(0.0, config.target_height, 0.0),
            rotate_enabled: true,
            min_distance: config.min_distance,
            pending_yaw: 0.0,
            pending_pitch: 0.0,
            disposed: false,
        }
    }
}

impl OrbitControls for OrbitRig {
    fn set_rotate_enabled(&mut self, enabled: bool) {
        self.rotate_enabled = enabled;
        if !enabled {
            self.pending_yaw = 0.0;
            self.pending_pitch = 0.0;
        }
    }

    fn rotate_enabled(&self) -> bool {
        self.rotate_enabled
    }

    fn set_target(&mut self, target: Vec3) {
        self.target = target;
    }

    fn target(&self) -> Vec3 {
        self.target
    }

    fn orbit(&mut self, yaw: f32, pitch: f32) {
        if !self.rotate_enabled || self.disposed {
            return;
        }
        self.pending_yaw += yaw;
        self.pending_pitch += pitch;
    }

    fn update(&mut self, camera: &mut CameraState) {
        if self.disposed {
            return;
        }

        let mut offset = camera.position - self.target;
        if self.pending_yaw != 0.0 || self.pending_pitch != 0.0 {
            let right = camera.rotation * Vec3::X;
            let turn = Quat::from_rotation_y(self.pending_yaw)
                * Quat::from_axis_angle(right, self.pending_pitch);
            let rotated = turn * offset;
            // Stay off the poles
            if rotated.normalize_or_zero().y.abs() < 0.99 {
                offset = rotated;
            }
            self.pending_yaw = 0.0;
            self.pending_pitch = 0.0;
        }

        let distance = offset.length();
        if distance < self.min_distance {
            offset = if distance > f32::EPSILON {
                offset / distance * self.min_distance
            } else {
                Vec3::Z * self.min_distance
            };
        }

        camera.position = self.target + offset;
        camera.look_at(self.target);
    }

    fn dispose(&mut self) {
        if !self.disposed {
            tracing::debug!("Orbit controls disposed");
        }
        self.disposed = true;
    }

    fn is_disposed(&self) -> bool {
        self.disposed
    }
}

/// Result of one follow step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FollowUpdate {
    /// Camera snapped to the canonical pose this frame
    pub reset: bool,
    /// Camera moved toward the avatar this frame
    pub moved: bool,
}

#[derive(Debug)]
pub struct CameraFollowController {
    enabled: bool,
    pending_reset: bool,
    offset: Vec3,
    target_offset: Vec3,
    smoothing: f32,
    canonical_position: Vec3,
    canonical_target: Vec3,
}

impl CameraFollowController {
    pub fn new(follow: &FollowConfig, camera: &CameraConfig) -> Self {
        Self {
            enabled: false,
            pending_reset: false,
            offset: Vec3::from(follow.offset),
            target_offset: Vec3::from(follow.target_offset),
            smoothing: follow.smoothing.clamp(0.0, 1.0),
            canonical_position: Vec3::from(camera.position),
            canonical_target: Vec3::new(0.0, camera.target_height, 0.0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Toggle follow. Orbit rotation is switched off while following.
    pub fn set_enabled(
        &mut self,
        enabled: bool,
        camera: &mut CameraState,
        controls: &mut dyn OrbitControls,
    ) {
        if enabled && !self.enabled {
            self.pending_reset = true;
        }
        if !enabled {
            self.pending_reset = false;
        }
        if enabled != self.enabled {
            tracing::debug!("Camera follow {}", if enabled { "enabled" } else { "disabled" });
        }
        self.enabled = enabled;
        camera.follow_enabled = enabled;
        controls.set_rotate_enabled(!enabled);
    }

    /// Reposition the camera for this frame. Does nothing while disabled.
    pub fn update(
        &mut self,
        camera: &mut CameraState,
        controls: &mut dyn OrbitControls,
        avatar_root: Option<Vec3>,
    ) -> FollowUpdate {
        let mut result = FollowUpdate::default();
        if !self.enabled {
            return result;
        }

        if self.pending_reset {
            camera.position = self.canonical_position;
            camera.look_at(self.canonical_target);
            controls.set_target(self.canonical_target);
            self.pending_reset = false;
            result.reset = true;
        }

        if let Some(root) = avatar_root {
            let desired = root + self.offset;
            let target = root + self.target_offset;
            camera.position = camera.position.lerp(desired, self.smoothing);
            camera.look_at(target);
            controls.set_target(target);
            result.moved = true;
        }

        result
    }
}

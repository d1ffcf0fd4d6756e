//! Stage lifecycle: mount, per-frame orchestration and teardown.
//!
//! [`LifecycleManager`] is the explicit per-view context. It owns every
//! collaborator and drives one frame per accepted scheduler callback:
//!
//! 1. finish a pending load, if one completed
//! 2. orbit controls
//! 3. mixer advance
//! 4. blink and mouth weights
//! 5. eye gaze toward the camera
//! 6. tilt, render, restore
//! 7. camera follow
//! 8. spatial voice volume and pan
//!
//! Teardown runs on every exit path (explicit call, failed mount, drop) and
//! tolerates being called more than once.

use glam::Vec3;
use tokio::sync::broadcast;

use crate::audio::{SpatialAudioOutput, SpatialAudioSync, SpatialState};
use crate::avatar::AvatarInstance;
use crate::config::Config;
use crate::error::{LoadError, RenderError, StageError};
use crate::render::{allocate_all, FrameRenderer, FrameView, Microphone, Scene, SceneObject};
use crate::stage::camera::{CameraFollowController, CameraPose, CameraState, OrbitControls};
use crate::stage::face::ExpressionController;
use crate::stage::loader::{
    AssetSource, AvatarLoader, Completed, LoadOptions, LoadTicket, LoadedAvatar,
};
use crate::stage::look_at::AutoLookAt;
use crate::stage::pose::PoseOverrideStage;
use crate::stage::scheduler::{Clock, FrameScheduler, Tick};

/// Notifications for whoever hosts the stage.
#[derive(Debug, Clone, PartialEq)]
pub enum StageEvent {
    /// Published every accepted frame
    CameraUpdated(CameraPose),
    /// Avatar root position, once per successful load
    AvatarPlaced(Vec3),
    LoadingChanged(bool),
    /// User-facing load failure text
    LoadFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameOutcome {
    Rendered { frame: u64, dt: f32 },
    /// Throttled; the host should keep calling
    Skipped,
    /// Torn down; the host should stop calling
    Stopped,
}

/// External collaborators handed to the stage.
pub struct Collaborators {
    pub renderer: Box<dyn FrameRenderer>,
    pub controls: Box<dyn OrbitControls>,
    pub audio: Box<dyn SpatialAudioOutput>,
    pub clock: Box<dyn Clock>,
}

pub struct LifecycleManager {
    config: Config,
    mounted: bool,
    torn_down: bool,
    frame: u64,
    voice_volume: f32,

    scheduler: FrameScheduler,
    loader: AvatarLoader,
    renderer: Box<dyn FrameRenderer>,
    controls: Box<dyn OrbitControls>,
    audio: Box<dyn SpatialAudioOutput>,

    scene: Scene,
    camera: CameraState,
    microphone: Option<Microphone>,
    avatar: Option<AvatarInstance>,

    expressions: ExpressionController,
    pose: PoseOverrideStage,
    look_at: AutoLookAt,
    follow: CameraFollowController,
    spatial: SpatialAudioSync,

    events: broadcast::Sender<StageEvent>,
}

impl LifecycleManager {
    pub fn new(config: Config, collaborators: Collaborators) -> Self {
        let Collaborators {
            renderer,
            controls,
            audio,
            clock,
        } = collaborators;
        let (events, _) = broadcast::channel(64);

        let options = LoadOptions {
            idle_clip: config.avatar.idle_clip_path.clone().map(AssetSource::Path),
        };

        Self {
            mounted: false,
            torn_down: false,
            frame: 0,
            voice_volume: 0.0,
            scheduler: FrameScheduler::new(&config.frame, clock),
            loader: AvatarLoader::new(options),
            renderer,
            controls,
            audio,
            scene: Scene::new(),
            camera: CameraState::from_config(&config.camera),
            microphone: None,
            avatar: None,
            expressions: ExpressionController::new(&config.avatar, &config.lip_sync, &config.blink),
            pose: PoseOverrideStage::new(&config.pose),
            look_at: AutoLookAt::new(&config.look_at),
            follow: CameraFollowController::new(&config.follow, &config.camera),
            spatial: SpatialAudioSync::new(&config.spatial),
            events,
            config,
        }
    }

    /// Build the scene: camera, lights and the microphone prop. Any failure
    /// tears the stage down before returning.
    pub fn mount(&mut self) -> Result<(), StageError> {
        if self.mounted {
            return Ok(());
        }
        if self.torn_down {
            return Err(RenderError::Disposed.into());
        }
        if let Err(e) = self.config.validate() {
            self.teardown();
            return Err(e);
        }

        self.scene.add(SceneObject::Camera);
        self.scene.add(SceneObject::KeyLight);
        self.scene.add(SceneObject::AmbientLight);

        let offset = Vec3::from(self.config.spatial.microphone_offset);
        match Microphone::build(self.renderer.as_mut(), offset, self.config.microphone.visible) {
            Ok(mic) => {
                tracing::debug!("Microphone prop built ({} resources)", mic.resource_count());
                self.microphone = Some(mic);
                self.scene.add(SceneObject::Microphone);
            }
            Err(e) => {
                tracing::error!("Failed to build microphone prop: {}", e);
                self.teardown();
                return Err(e.into());
            }
        }

        self.controls
            .set_target(Vec3::new(0.0, self.config.camera.target_height, 0.0));
        self.controls.update(&mut self.camera);

        self.mounted = true;
        self.emit(StageEvent::CameraUpdated(self.camera.pose()));
        tracing::info!("Stage mounted");
        Ok(())
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Replace the idle clip used by subsequent loads.
    pub fn set_idle_clip(&mut self, source: Option<AssetSource>) {
        self.loader.set_options(LoadOptions { idle_clip: source });
    }

    /// Start loading an avatar. Ignored while another load is in flight.
    pub fn request_avatar(&mut self, source: AssetSource) -> LoadTicket {
        if !self.mounted {
            tracing::warn!("Avatar requested before mount, ignoring");
            return LoadTicket::Rejected;
        }
        let ticket = self.loader.request(source);
        if matches!(ticket, LoadTicket::Accepted { .. }) {
            self.emit(StageEvent::LoadingChanged(true));
        }
        ticket
    }

    pub fn request_default_avatar(&mut self) -> LoadTicket {
        let path = self.config.avatar.default_model_path.clone();
        self.request_avatar(AssetSource::Path(path))
    }

    pub fn is_loading(&self) -> bool {
        self.loader.is_loading()
    }

    /// Wait for the in-flight load and attach its result.
    pub async fn settle_load(&mut self) {
        if let Some(completed) = self.loader.settle().await {
            self.finish_load(completed);
        }
    }

    fn finish_load(&mut self, completed: Completed) {
        self.emit(StageEvent::LoadingChanged(false));

        if !self.mounted || !self.loader.is_current(completed.generation) {
            tracing::debug!("Discarding stale avatar load");
            return;
        }

        match completed.result {
            Ok(loaded) => {
                if let Err(e) = self.attach(loaded) {
                    tracing::error!("Failed to attach avatar: {}", e);
                    self.emit(StageEvent::LoadFailed(e.user_message()));
                }
            }
            Err(LoadError::Cancelled) => tracing::debug!("Avatar load cancelled"),
            Err(e) => {
                tracing::error!("Failed to load avatar: {}", e);
                self.emit(StageEvent::LoadFailed(e.user_message()));
            }
        }
    }

    /// Swap in a freshly loaded avatar. The previous one is fully disposed
    /// first; on failure the scene holds no avatar at all.
    fn attach(&mut self, loaded: LoadedAvatar) -> Result<(), LoadError> {
        let LoadedAvatar {
            mut avatar,
            idle_clip,
        } = loaded;

        if let Some(mut previous) = self.avatar.take() {
            self.scene.remove(SceneObject::Avatar);
            previous.dispose(self.renderer.as_mut());
            self.expressions.reset();
            tracing::info!("Replaced avatar '{}'", previous.name());
        }

        let ids = allocate_all(self.renderer.as_mut(), &avatar.resource_requests())
            .map_err(|e| LoadError::Resources(e.to_string()))?;
        avatar.attach_resources(ids);

        if let Some(clip) = &idle_clip {
            avatar.play_idle(clip);
        }

        self.expressions.bind(avatar.slots());
        self.spatial.reset();
        self.look_at.set_target(self.camera.position);

        let root = avatar.root_position();
        tracing::info!("Avatar '{}' attached", avatar.name());
        self.avatar = Some(avatar);
        self.scene.add(SceneObject::Avatar);
        self.emit(StageEvent::AvatarPlaced(root));
        Ok(())
    }

    /// Host display callback.
    pub fn on_frame(&mut self, timestamp_ms: f64) -> FrameOutcome {
        if !self.mounted {
            return FrameOutcome::Stopped;
        }
        let dt = match self.scheduler.on_callback(timestamp_ms) {
            Tick::Frame { dt } => dt,
            Tick::Skipped => return FrameOutcome::Skipped,
            Tick::Stopped => return FrameOutcome::Stopped,
        };

        if let Some(completed) = self.loader.poll() {
            self.finish_load(completed);
        }

        if !self.follow.is_enabled() {
            self.controls.update(&mut self.camera);
        }

        if let Some(avatar) = self.avatar.as_mut() {
            avatar.advance(dt);
            self.expressions
                .update(dt, self.voice_volume, avatar.slots_mut());
            self.look_at.set_target(self.camera.position);
            self.look_at.apply(avatar);
        }

        if let Some(mic) = self.microphone.as_mut() {
            mic.set_visible(self.config.microphone.visible);
        }
        let (microphone, microphone_offset) = match self.microphone.as_ref() {
            Some(mic) if mic.is_visible() => (mic.meshes(), mic.offset()),
            _ => (&[][..], Vec3::ZERO),
        };

        self.frame += 1;
        let frame = self.frame;
        let camera = &self.camera;
        let renderer = &mut self.renderer;
        match self.avatar.as_mut() {
            Some(avatar) => self.pose.render_scoped(avatar, |avatar| {
                renderer.render(&FrameView {
                    frame,
                    camera,
                    avatar: Some(avatar),
                    microphone,
                    microphone_offset,
                })
            }),
            None => renderer.render(&FrameView {
                frame,
                camera,
                avatar: None,
                microphone,
                microphone_offset,
            }),
        }

        let avatar_root = self.avatar.as_ref().map(|a| a.root_position());
        self.follow
            .update(&mut self.camera, self.controls.as_mut(), avatar_root);
        self.emit(StageEvent::CameraUpdated(self.camera.pose()));

        if let Some(update) =
            self.spatial
                .on_frame(Some(&self.camera), avatar_root, self.audio.as_mut())
        {
            tracing::trace!(
                "Spatial voice: distance {:.3}, volume {:?}, pan {:?}",
                update.distance,
                update.volume,
                update.pan
            );
        }

        FrameOutcome::Rendered { frame, dt }
    }

    /// Latest voice level, pre-multiplier.
    pub fn set_voice_volume(&mut self, volume: f32) {
        self.voice_volume = if volume.is_finite() { volume.max(0.0) } else { 0.0 };
    }

    pub fn set_follow_camera(&mut self, enabled: bool) {
        self.follow
            .set_enabled(enabled, &mut self.camera, self.controls.as_mut());
    }

    pub fn set_show_microphone(&mut self, visible: bool) {
        self.config.microphone.visible = visible;
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.camera.resize(width, height);
    }

    /// Queue orbit input for the next frame.
    pub fn orbit(&mut self, yaw: f32, pitch: f32) {
        self.controls.orbit(yaw, pitch);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StageEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: StageEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn camera(&self) -> &CameraState {
        &self.camera
    }

    pub fn controls(&self) -> &dyn OrbitControls {
        self.controls.as_ref()
    }

    pub fn avatar(&self) -> Option<&AvatarInstance> {
        self.avatar.as_ref()
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn microphone(&self) -> Option<&Microphone> {
        self.microphone.as_ref()
    }

    pub fn expressions(&self) -> &ExpressionController {
        &self.expressions
    }

    pub fn spatial_state(&self) -> SpatialState {
        self.spatial.state()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frame
    }

    /// Release everything the stage owns. Safe to call repeatedly.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.mounted = false;

        self.scheduler.stop();
        let was_loading = self.loader.is_loading();
        self.loader.cancel();

        if let Some(avatar) = self.avatar.as_mut() {
            avatar.stop_animation();
        }
        self.controls.dispose();

        if let Some(mut mic) = self.microphone.take() {
            let released = mic.release(self.renderer.as_mut());
            tracing::debug!("Released {} microphone resources", released);
        }
        self.scene.remove(SceneObject::Microphone);

        if let Some(mut avatar) = self.avatar.take() {
            self.scene.remove(SceneObject::Avatar);
            avatar.dispose(self.renderer.as_mut());
        }
        self.expressions.reset();
        self.look_at.clear_target();
        self.spatial.reset();

        self.scene.clear();
        self.renderer.dispose();

        if was_loading {
            self.emit(StageEvent::LoadingChanged(false));
        }
        tracing::info!("Stage torn down after {} frames", self.frame);
    }
}

impl Drop for LifecycleManager {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("mounted", &self.mounted)
            .field("frame", &self.frame)
            .field("scene", &self.scene)
            .field("avatar", &self.avatar.as_ref().map(|a| a.name()))
            .field("loading", &self.loader.is_loading())
            .finish()
    }
}

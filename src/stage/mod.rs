//! Per-frame stage orchestration
//!
//! Everything that runs inside one accepted frame lives here, together with
//! the asynchronous avatar loader and the lifecycle that owns them all.

pub mod camera;
pub mod face;
pub mod lifecycle;
pub mod loader;
pub mod look_at;
pub mod pose;
pub mod scheduler;

pub use camera::{
    CameraFollowController, CameraPose, CameraState, FollowUpdate, OrbitControls, OrbitRig,
    Projection,
};
pub use face::{resolve_mouth_slot, BlinkTimer, ExpressionController};
pub use lifecycle::{Collaborators, FrameOutcome, LifecycleManager, StageEvent};
pub use loader::{
    load_avatar, AssetSource, AvatarLoader, Completed, LoadOptions, LoadTicket, LoadedAvatar,
};
pub use look_at::AutoLookAt;
pub use pose::{PoseOverrideStage, PoseSnapshot};
pub use scheduler::{Clock, FrameScheduler, ManualClock, MonotonicClock, Tick};

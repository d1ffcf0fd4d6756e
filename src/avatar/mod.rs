//! Avatar data: skeleton arena, VRM parsing, expression slots

pub mod expression;
pub mod instance;
pub mod skeleton;
pub mod vrm;

pub use expression::{ExpressionDef, ExpressionSlots, SlotId};
pub use instance::{AvatarInstance, BoneId};
pub use skeleton::Skeleton;
pub use vrm::{VrmDocument, VrmVersion};

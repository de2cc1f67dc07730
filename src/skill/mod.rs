mod builtin;
mod device;
mod registry;
mod results;
mod runtime;

pub use builtin::{
    BackgroundBlurSkill, BackgroundReplacementSkill, FaceDetectionSkill, IntruderDetectionSkill,
};
pub use device::{DeviceKind, ExecutionDevice, ParseDeviceKindError};
pub use registry::SkillRegistry;
pub use results::{
    points_from_tensor, rects_from_tensor, SkillResult, FACE_LANDMARKS, FACE_RECTANGLES,
    INTRUDER_DETECTED, LANDMARK_STRIDE, NUMBER_OF_FACES, RECT_STRIDE,
};
pub use runtime::{Skill, SkillBinding, SkillDescriptor, SkillInstance, SKILL_API_REVISION};

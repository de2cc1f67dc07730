//! Skillhost
//!
//! This crate hosts camera-effect skills over a live capture session.
//!
//! # Architecture
//!
//! The session enforces six rules by construction:
//!
//! 1. **Single Admission**: At most one frame holds the evaluation permit at a time.
//! 2. **Drop, Never Queue**: A frame that cannot acquire the permit is dropped, not buffered.
//! 3. **Scoped Release**: The permit is released exactly once, when its guard goes out of scope.
//! 4. **Sequential Evaluation**: Skill evaluations never overlap, even across reconfiguration.
//! 5. **Unconditional Disposal**: Every admitted frame is disposed whether evaluation
//!    succeeds or fails.
//! 6. **Drain Before Teardown**: Teardown waits for the in-flight evaluation to finish.
//!
//! # Module Structure
//!
//! - `gate`: Evaluation permit (AdmissionGate, Permit)
//! - `frame`: Pixel buffers (PendingFrame, PixelFormat)
//! - `skill`: Skill runtime, registry, and built-in skills
//! - `capture`: Frame sources (synthetic scenes, local image files)
//! - `session`: Session lifecycle, frame pump, and sinks
//! - `overlay`: Normalized annotation geometry for skill results

pub mod capture;
pub mod config;
pub mod error;
pub mod frame;
pub mod gate;
pub mod overlay;
pub mod session;
pub mod skill;

pub use capture::{
    source_from_url, CaptureFormat, CaptureSource, FileSource, FileSourceConfig, SourceStats,
    SyntheticConfig, SyntheticSource,
};
pub use config::SkillhostConfig;
pub use error::{CaptureError, FrameError, SessionError, SkillError};
pub use frame::{PendingFrame, PixelFormat};
pub use gate::{AdmissionGate, Permit};
pub use overlay::{Annotation, NormPoint, NormRect, OverlayColor, OverlayShape, Viewport};
pub use session::{
    Evaluation, FrameOutcome, FrameSink, LogSink, NullSink, SessionState, SkillSession,
    StatsSnapshot,
};
pub use skill::{
    DeviceKind, ExecutionDevice, Skill, SkillBinding, SkillDescriptor, SkillInstance,
    SkillRegistry, SkillResult, SKILL_API_REVISION,
};

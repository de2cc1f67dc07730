//! Error taxonomy for the skill host.
//!
//! Failures fall into four classes with different blast radius:
//! - unsupported host revision and missing execution devices end the
//!   session (reported once, no retry),
//! - evaluation failures are per-frame diagnostics; the session keeps
//!   running on the next admitted frame,
//! - capture failures drop the session back to idle,
//! - frame geometry errors are caught at construction.
//!
//! Every error that crosses the admission boundary is surfaced only after
//! the permit has been released, so a failure never starves future frames.

use std::path::PathBuf;

use thiserror::Error;

use crate::frame::PixelFormat;

/// Errors raised at the skill runtime seam.
#[derive(Debug, Error)]
pub enum SkillError {
    /// The skill's binding contract is newer than this build hosts.
    /// Fatal to the session.
    #[error("skill '{skill}' requires host API revision {required}, this build provides {provided}")]
    UnsupportedPlatform {
        skill: String,
        required: u32,
        provided: u32,
    },

    /// The skill enumerates no execution device on this host.
    /// Fatal to the session.
    #[error("no execution device available for skill '{skill}'")]
    NoExecutionDevice { skill: String },

    /// An explicitly requested device is not in the skill's supported set.
    /// Fatal to the session.
    #[error("device kind '{device}' is not supported by skill '{skill}'")]
    DeviceNotSupported { skill: String, device: String },

    /// One evaluation failed. Non-fatal: the permit is released and the
    /// session continues with the next admitted frame.
    #[error("evaluation failed: {0}")]
    Evaluation(String),

    /// The binding does not accept an auxiliary image.
    #[error("skill binding does not accept an auxiliary image")]
    AuxiliaryUnsupported,

    /// Evaluate was called with no input image bound.
    #[error("no input image bound")]
    MissingInput,

    /// The registry has no skill under the requested name.
    #[error("unknown skill '{0}'")]
    UnknownSkill(String),
}

/// Errors raised by capture sources.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture source already started")]
    AlreadyStarted,

    #[error("capture source is not running")]
    NotRunning,

    #[error("capture source has been torn down")]
    TornDown,

    #[error("format {width}x{height}@{frame_rate} is not supported by this source")]
    UnsupportedFormat {
        width: u32,
        height: u32,
        frame_rate: u32,
    },

    #[error("unrecognized capture url '{0}'")]
    UnknownUrl(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Errors raised when constructing frames.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("pixel buffer holds {actual} bytes, {width}x{height} {format} needs {expected}")]
    GeometryMismatch {
        width: u32,
        height: u32,
        format: PixelFormat,
        expected: usize,
        actual: usize,
    },

    #[error("frame dimensions {width}x{height} are not valid")]
    EmptyDimensions { width: u32, height: u32 },
}

/// Session-level errors, folding the seams into one taxonomy.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Skill(#[from] SkillError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// An operation needed a configured instance and binding.
    #[error("session has no configured skill instance")]
    NotConfigured,
}

impl SessionError {
    /// Fatal errors end the session: unsupported host revision and missing
    /// or unsupported execution devices. Evaluation failures are per-frame;
    /// capture failures leave the session idle but reconfigurable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SessionError::Skill(SkillError::UnsupportedPlatform { .. })
                | SessionError::Skill(SkillError::NoExecutionDevice { .. })
                | SessionError::Skill(SkillError::DeviceNotSupported { .. })
        )
    }
}

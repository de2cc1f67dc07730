//! Skill runtime contract.
//!
//! A skill is an opaque inference unit behind three seams:
//!
//! - [`Skill`]: identity, requirements, device enumeration, instantiation.
//! - [`SkillInstance`]: the skill loaded onto one execution device.
//!   Instances are recreated only when the selected device changes.
//! - [`SkillBinding`]: the input/output buffer set for evaluations against
//!   one instance. The binding owns the bound input frame and gives it up
//!   exactly once, so a frame cannot be evaluated twice.
//!
//! Evaluations against one instance are strictly sequential; the session's
//! admission gate serializes callers, instances never see overlap.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::SkillError;
use crate::frame::PendingFrame;
use crate::skill::device::ExecutionDevice;
use crate::skill::results::SkillResult;

/// Revision of the binding and evaluation contract this build hosts.
/// Descriptors declaring a higher `minimum_api_revision` cannot run here
/// and are rejected before any device is touched.
pub const SKILL_API_REVISION: u32 = 2;

/// Identity and requirements of a skill, prior to instantiation.
#[derive(Clone, Debug, Serialize)]
pub struct SkillDescriptor {
    /// Registry key. Stable across versions.
    pub name: &'static str,
    pub description: &'static str,
    pub version: &'static str,
    /// Lowest host API revision this skill runs on.
    pub minimum_api_revision: u32,
    /// Whether bindings accept an auxiliary (background) image.
    pub uses_auxiliary_image: bool,
}

/// An available skill.
#[async_trait]
pub trait Skill: Send + Sync {
    fn descriptor(&self) -> &SkillDescriptor;

    /// Devices this skill can execute on, best first. Empty means the
    /// skill cannot run on this host at all.
    fn supported_devices(&self) -> Vec<ExecutionDevice>;

    /// Load the skill onto one device.
    async fn create_instance(
        &self,
        device: &ExecutionDevice,
    ) -> Result<Box<dyn SkillInstance>, SkillError>;
}

/// A skill loaded onto one execution device.
#[async_trait]
pub trait SkillInstance: Send {
    fn device(&self) -> &ExecutionDevice;

    /// A fresh buffer set for this instance.
    fn create_binding(&self) -> SkillBinding;

    /// Run one evaluation over the binding's input image. Implementations
    /// start with [`SkillBinding::begin_evaluation`], which consumes the
    /// input; the frame is gone when this returns, success or failure.
    async fn evaluate(&mut self, binding: &mut SkillBinding) -> Result<(), SkillError>;
}

/// Input/output buffer set for evaluations against one instance.
///
/// The auxiliary image persists across evaluations (a replacement
/// background is bound once and reused); the input image and the outputs
/// are per-evaluation.
pub struct SkillBinding {
    accepts_auxiliary: bool,
    input: Option<PendingFrame>,
    auxiliary: Option<PendingFrame>,
    output: Option<PendingFrame>,
    results: BTreeMap<String, SkillResult>,
}

impl SkillBinding {
    pub fn new(accepts_auxiliary: bool) -> Self {
        Self {
            accepts_auxiliary,
            input: None,
            auxiliary: None,
            output: None,
            results: BTreeMap::new(),
        }
    }

    /// Bind the frame the next evaluation consumes. Ownership moves into
    /// the binding; a previously bound, never-evaluated input is dropped.
    pub fn set_input_image(&mut self, frame: PendingFrame) {
        self.input = Some(frame);
    }

    /// Bind the auxiliary image, if this binding takes one.
    pub fn set_auxiliary_image(&mut self, frame: PendingFrame) -> Result<(), SkillError> {
        if !self.accepts_auxiliary {
            return Err(SkillError::AuxiliaryUnsupported);
        }
        self.auxiliary = Some(frame);
        Ok(())
    }

    pub fn auxiliary_image(&self) -> Option<&PendingFrame> {
        self.auxiliary.as_ref()
    }

    /// Start an evaluation: clear the previous outputs and take the input
    /// image. Errors when no input is bound.
    pub fn begin_evaluation(&mut self) -> Result<PendingFrame, SkillError> {
        self.output = None;
        self.results.clear();
        self.input.take().ok_or(SkillError::MissingInput)
    }

    /// Drop whatever input is still bound. The session calls this after
    /// every evaluate so a failed evaluation cannot strand a frame.
    pub fn discard_input(&mut self) {
        self.input = None;
    }

    pub fn set_output_image(&mut self, frame: PendingFrame) {
        self.output = Some(frame);
    }

    pub fn insert_result(&mut self, name: &str, value: SkillResult) {
        self.results.insert(name.to_string(), value);
    }

    /// Take the output image produced by the last evaluation, if any.
    pub fn take_output_image(&mut self) -> Option<PendingFrame> {
        self.output.take()
    }

    pub fn named_result(&self, name: &str) -> Option<&SkillResult> {
        self.results.get(name)
    }

    pub fn results(&self) -> &BTreeMap<String, SkillResult> {
        &self.results
    }
}

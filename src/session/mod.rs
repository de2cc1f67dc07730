//! Skill session lifecycle.
//!
//! A session owns one skill and drives frames from a capture source
//! through it, one evaluation at a time:
//!
//! - The frame path polls the admission gate; a busy permit means the
//!   frame is dropped and counted, never queued.
//! - Control paths (source or device swaps, file evaluations, teardown)
//!   suspend on the gate, so an in-flight evaluation always drains before
//!   anything it uses is replaced.
//! - All mutable evaluation state (instance, binding, source, sink) lives
//!   inside the gate's context; touching it without a permit does not
//!   compile.

mod sink;
mod stats;

pub use sink::{EvalTiming, Evaluation, FrameSink, LogSink, NullSink};
pub use stats::{SessionStats, StatsSnapshot};

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, watch};

use crate::capture::{decode_image_file, preferred_format, CaptureSource, SourceStats};
use crate::error::{SessionError, SkillError};
use crate::frame::PendingFrame;
use crate::gate::{AdmissionGate, Permit};
use crate::overlay::{self, Annotation};
use crate::skill::{
    points_from_tensor, rects_from_tensor, DeviceKind, ExecutionDevice, Skill, SkillBinding,
    SkillDescriptor, SkillInstance, FACE_LANDMARKS, FACE_RECTANGLES, INTRUDER_DETECTED,
    SKILL_API_REVISION,
};

// ----------------------------------------------------------------------------
// States and outcomes
// ----------------------------------------------------------------------------

/// Capture session state.
///
/// idle -> configuring on capture start, configuring -> streaming once the
/// source delivers, streaming -> configuring on a source or device change,
/// anything -> idle on teardown or source failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Configuring,
    Streaming,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionState::Idle => "idle",
            SessionState::Configuring => "configuring",
            SessionState::Streaming => "streaming",
        })
    }
}

/// What happened to one delivered frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Admitted and evaluated.
    Evaluated,
    /// Lost admission; the frame was dropped, not queued.
    DroppedBusy,
    /// The skill wants a background image and none is published yet.
    AwaitingBackground,
    /// Admitted, but the evaluation failed. The session keeps running.
    Failed,
}

// ----------------------------------------------------------------------------
// Shared state
// ----------------------------------------------------------------------------

/// Mutable evaluation state. Only reachable through a held permit.
struct EvalContext {
    device: Option<ExecutionDevice>,
    instance: Option<Box<dyn SkillInstance>>,
    binding: Option<SkillBinding>,
    source: Option<Box<dyn CaptureSource>>,
    sink: Box<dyn FrameSink>,
    /// Epoch of the background image currently bound to the binding.
    background_epoch: u64,
}

/// Published background image plus its epoch. Epochs only grow, so a
/// binding can tell a fresh background from the one it already holds.
#[derive(Clone, Default)]
struct BackgroundSlot {
    image: Option<Arc<PendingFrame>>,
    epoch: u64,
}

struct SessionShared {
    skill: Arc<dyn Skill>,
    gate: AdmissionGate<EvalContext>,
    state_tx: watch::Sender<SessionState>,
    background_tx: watch::Sender<BackgroundSlot>,
    stats: SessionStats,
    /// Bumped on every configure and teardown; a frame pump whose
    /// generation is stale winds down silently.
    generation: AtomicU64,
}

/// A camera-or-file evaluation session for one skill. Cheap to clone.
#[derive(Clone)]
pub struct SkillSession {
    shared: Arc<SessionShared>,
}

impl SkillSession {
    pub fn new(skill: Arc<dyn Skill>, sink: Box<dyn FrameSink>) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        let (background_tx, _) = watch::channel(BackgroundSlot::default());
        Self {
            shared: Arc::new(SessionShared {
                skill,
                gate: AdmissionGate::new(EvalContext {
                    device: None,
                    instance: None,
                    binding: None,
                    source: None,
                    sink,
                    background_epoch: 0,
                }),
                state_tx,
                background_tx,
                stats: SessionStats::default(),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn descriptor(&self) -> &SkillDescriptor {
        self.shared.skill.descriptor()
    }

    pub fn state(&self) -> SessionState {
        *self.shared.state_tx.borrow()
    }

    /// Observe state transitions.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state_tx.subscribe()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Producer-side counters of the attached source. Waits for the
    /// in-flight evaluation like any other control-path caller.
    pub async fn source_stats(&self) -> Option<SourceStats> {
        let permit = self.shared.gate.admit().await;
        permit.source.as_ref().map(|s| s.stats())
    }

    // ------------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------------

    /// Point the session at a capture source and start streaming. The
    /// in-flight evaluation drains first; the previous source is stopped
    /// and torn down before the new one starts.
    pub async fn configure(
        &self,
        source: Box<dyn CaptureSource>,
        device: Option<DeviceKind>,
    ) -> Result<(), SessionError> {
        self.set_state(SessionState::Configuring);
        match self.configure_inner(source, device).await {
            Ok((rx, generation)) => {
                self.set_state(SessionState::Streaming);
                tokio::spawn(run_pump(self.clone(), rx, generation));
                log::info!(
                    "session streaming skill '{}', generation {}",
                    self.descriptor().name,
                    generation
                );
                Ok(())
            }
            Err(err) => {
                self.set_state(SessionState::Idle);
                Err(err)
            }
        }
    }

    async fn configure_inner(
        &self,
        mut source: Box<dyn CaptureSource>,
        device: Option<DeviceKind>,
    ) -> Result<(mpsc::Receiver<PendingFrame>, u64), SessionError> {
        self.check_platform()?;

        let mut permit = self.shared.gate.admit().await;
        retire_source(&mut permit).await;
        // The old pump is stale from here on, whether or not the rest of
        // the configuration succeeds.
        let generation = self.bump_generation();
        self.ensure_instance(&mut permit, device).await?;

        if let Some(format) = preferred_format(&source.supported_formats()) {
            source.set_format(format).await?;
        }
        let rx = source.start().await?;
        permit.source = Some(source);

        Ok((rx, generation))
    }

    /// Create the skill instance and binding without a capture source, for
    /// one-shot file evaluations.
    pub async fn prepare(&self, device: Option<DeviceKind>) -> Result<(), SessionError> {
        self.check_platform()?;
        let mut permit = self.shared.gate.admit().await;
        self.ensure_instance(&mut permit, device).await
    }

    /// Move the skill to another execution device. Suspends until the
    /// active evaluation finishes; the capture source keeps running and is
    /// not touched while the swap happens.
    pub async fn switch_device(&self, kind: DeviceKind) -> Result<(), SessionError> {
        let mut permit = self.shared.gate.admit().await;
        self.ensure_instance(&mut permit, Some(kind)).await
    }

    /// Publish the background image replacement skills sample from. Takes
    /// effect from the next evaluation; file evaluations waiting for a
    /// first background wake up.
    pub fn set_background(&self, frame: PendingFrame) {
        self.shared.background_tx.send_modify(|slot| {
            slot.epoch += 1;
            slot.image = Some(Arc::new(frame));
        });
        log::info!("background image published");
    }

    /// Stop streaming and release the source, instance and binding.
    /// Suspends until the in-flight evaluation finishes, so the source
    /// outlives the last evaluation that reads from it.
    pub async fn teardown(&self) {
        self.bump_generation();
        let mut permit = self.shared.gate.admit().await;
        retire_source(&mut permit).await;
        permit.instance = None;
        permit.binding = None;
        permit.device = None;
        drop(permit);
        self.set_state(SessionState::Idle);
    }

    // ------------------------------------------------------------------------
    // Frame path
    // ------------------------------------------------------------------------

    /// Offer one frame for evaluation. Never fails: losing admission drops
    /// the frame, an evaluation error is counted and logged, and both
    /// leave the session running.
    pub async fn process_frame(&self, frame: PendingFrame) -> FrameOutcome {
        self.shared.stats.record_seen();
        let sequence = frame.sequence;

        if self.descriptor().uses_auxiliary_image
            && self.shared.background_tx.borrow().image.is_none()
        {
            self.shared.stats.record_dropped();
            log::debug!("frame {} dropped, no background published yet", sequence);
            return FrameOutcome::AwaitingBackground;
        }

        let Some(mut permit) = self.shared.gate.try_admit() else {
            self.shared.stats.record_dropped();
            log::debug!("frame {} dropped, evaluation in flight", sequence);
            return FrameOutcome::DroppedBusy;
        };

        match self.evaluate_under_permit(&mut permit, frame).await {
            Ok(_) => FrameOutcome::Evaluated,
            Err(err) => {
                self.shared.stats.record_failure();
                log::warn!("evaluation of frame {} failed: {}", sequence, err);
                FrameOutcome::Failed
            }
        }
    }

    /// Evaluate a single image file through the same binding the stream
    /// uses. Suspends on the gate rather than polling it, and waits for a
    /// background to be published when the skill needs one.
    pub async fn evaluate_file(&self, path: &Path) -> Result<Evaluation, SessionError> {
        let frame = decode_image_file(path)?;

        if self.descriptor().uses_auxiliary_image {
            let mut rx = self.shared.background_tx.subscribe();
            rx.wait_for(|slot| slot.image.is_some())
                .await
                .map_err(|_| SkillError::Evaluation("background publisher gone".to_string()))?;
        }

        let mut permit = self.shared.gate.admit().await;
        self.evaluate_under_permit(&mut permit, frame).await
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn check_platform(&self) -> Result<(), SessionError> {
        let descriptor = self.descriptor();
        if descriptor.minimum_api_revision > SKILL_API_REVISION {
            return Err(SkillError::UnsupportedPlatform {
                skill: descriptor.name.to_string(),
                required: descriptor.minimum_api_revision,
                provided: SKILL_API_REVISION,
            }
            .into());
        }
        Ok(())
    }

    /// Select the execution device and (re)create the instance and binding
    /// when the selection differs from what the context holds. A matching
    /// instance is reused untouched.
    async fn ensure_instance(
        &self,
        permit: &mut Permit<EvalContext>,
        requested: Option<DeviceKind>,
    ) -> Result<(), SessionError> {
        let descriptor = self.descriptor();
        let devices = self.shared.skill.supported_devices();
        if devices.is_empty() {
            return Err(SkillError::NoExecutionDevice {
                skill: descriptor.name.to_string(),
            }
            .into());
        }
        let selected = match requested {
            Some(kind) => devices
                .iter()
                .find(|d| d.kind == kind)
                .cloned()
                .ok_or_else(|| SkillError::DeviceNotSupported {
                    skill: descriptor.name.to_string(),
                    device: kind.to_string(),
                })?,
            None => devices[0].clone(),
        };

        if permit.instance.is_some() && permit.device.as_ref() == Some(&selected) {
            return Ok(());
        }

        let instance = self.shared.skill.create_instance(&selected).await?;
        let binding = instance.create_binding();
        log::info!("skill '{}' instantiated on {}", descriptor.name, selected);
        permit.instance = Some(instance);
        permit.binding = Some(binding);
        permit.device = Some(selected);
        permit.background_epoch = 0;
        Ok(())
    }

    async fn evaluate_under_permit(
        &self,
        permit: &mut Permit<EvalContext>,
        frame: PendingFrame,
    ) -> Result<Evaluation, SessionError> {
        let context: &mut EvalContext = &mut *permit;

        if self.shared.skill.descriptor().uses_auxiliary_image {
            refresh_background(&self.shared.background_tx, context)?;
        }

        let instance = context.instance.as_mut().ok_or(SessionError::NotConfigured)?;
        let binding = context.binding.as_mut().ok_or(SessionError::NotConfigured)?;

        let sequence = frame.sequence;
        let bind_start = Instant::now();
        binding.set_input_image(frame);
        let bind_us = bind_start.elapsed().as_micros() as u64;

        let eval_start = Instant::now();
        let result = instance.evaluate(binding).await;
        let eval_us = eval_start.elapsed().as_micros() as u64;

        // The frame is gone from here on, whatever evaluate said.
        binding.discard_input();
        result?;

        self.shared.stats.record_evaluation(bind_us, eval_us);
        let evaluation = Evaluation {
            sequence,
            output: binding.take_output_image(),
            annotations: annotations_from(binding),
            results: binding.results().clone(),
            timing: EvalTiming { bind_us, eval_us },
        };
        if let Err(err) = context.sink.present(&evaluation) {
            log::warn!("sink failed on frame {}: {}", sequence, err);
        }
        Ok(evaluation)
    }

    fn set_state(&self, next: SessionState) {
        self.shared.state_tx.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            log::info!("session state {} -> {}", state, next);
            *state = next;
            true
        });
    }

    fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::SeqCst)
    }

    fn bump_generation(&self) -> u64 {
        self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1
    }
}

// ----------------------------------------------------------------------------
// Free helpers
// ----------------------------------------------------------------------------

/// Stop and tear down the context's source. Failures are logged, not
/// propagated: retirement must always complete.
async fn retire_source(permit: &mut Permit<EvalContext>) {
    if let Some(mut source) = permit.source.take() {
        if let Err(err) = source.stop().await {
            log::warn!("source '{}' stop failed: {}", source.name(), err);
        }
        if let Err(err) = source.teardown().await {
            log::warn!("source '{}' teardown failed: {}", source.name(), err);
        }
    }
}

/// Bind the newest published background when the binding holds an older
/// one. No background published yet is fine; the caller gated on that.
fn refresh_background(
    background_tx: &watch::Sender<BackgroundSlot>,
    context: &mut EvalContext,
) -> Result<(), SessionError> {
    let (epoch, image) = {
        let slot = background_tx.borrow();
        (slot.epoch, slot.image.clone())
    };
    let Some(image) = image else {
        return Ok(());
    };
    if epoch <= context.background_epoch {
        return Ok(());
    }

    let copy = PendingFrame::new(image.pixels().to_vec(), image.width, image.height);
    let binding = context.binding.as_mut().ok_or(SessionError::NotConfigured)?;
    binding.set_auxiliary_image(copy)?;
    context.background_epoch = epoch;
    Ok(())
}

/// Map named results onto overlay annotations. Output-image skills draw
/// nothing; detection skills draw boxes, landmarks or the intruder frame.
fn annotations_from(binding: &SkillBinding) -> Vec<Annotation> {
    if let Some(intruder) = binding
        .named_result(INTRUDER_DETECTED)
        .and_then(|r| r.as_bool())
    {
        return overlay::annotate_intruder(intruder);
    }
    let rects = binding
        .named_result(FACE_RECTANGLES)
        .and_then(|r| r.as_tensor())
        .map(rects_from_tensor)
        .unwrap_or_default();
    let points = binding
        .named_result(FACE_LANDMARKS)
        .and_then(|r| r.as_tensor())
        .map(points_from_tensor)
        .unwrap_or_default();
    if rects.is_empty() && points.is_empty() {
        return Vec::new();
    }
    overlay::annotate_faces(&rects, &points)
}

/// Drives frames from a capture source into the session until the channel
/// closes or a newer configuration supersedes this pump. The newest frame
/// wins: any backlog is collapsed before admission is attempted.
async fn run_pump(session: SkillSession, mut rx: mpsc::Receiver<PendingFrame>, generation: u64) {
    while let Some(mut frame) = rx.recv().await {
        while let Ok(newer) = rx.try_recv() {
            session.shared.stats.record_seen();
            session.shared.stats.record_dropped();
            log::debug!("frame {} superseded before admission", frame.sequence);
            frame = newer;
        }
        if session.generation() != generation {
            return;
        }
        session.process_frame(frame).await;
    }
    if session.generation() == generation {
        // The source ended on its own rather than being reconfigured away.
        log::warn!("capture source ended unexpectedly, session idle");
        session.set_state(SessionState::Idle);
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skill::{BackgroundBlurSkill, SkillResult};
    use async_trait::async_trait;

    struct PickySkill {
        descriptor: SkillDescriptor,
    }

    impl PickySkill {
        fn requiring(minimum_api_revision: u32) -> Self {
            Self {
                descriptor: SkillDescriptor {
                    name: "picky",
                    description: "test-only skill with steep requirements",
                    version: "0.0.1",
                    minimum_api_revision,
                    uses_auxiliary_image: false,
                },
            }
        }
    }

    #[async_trait]
    impl Skill for PickySkill {
        fn descriptor(&self) -> &SkillDescriptor {
            &self.descriptor
        }

        fn supported_devices(&self) -> Vec<ExecutionDevice> {
            Vec::new()
        }

        async fn create_instance(
            &self,
            _device: &ExecutionDevice,
        ) -> Result<Box<dyn SkillInstance>, SkillError> {
            Err(SkillError::NoExecutionDevice {
                skill: self.descriptor.name.to_string(),
            })
        }
    }

    #[tokio::test]
    async fn sessions_start_idle_with_clean_counters() {
        let session = SkillSession::new(
            Arc::new(BackgroundBlurSkill::new()),
            Box::new(NullSink),
        );
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.stats(), StatsSnapshot::default());
        assert!(session.source_stats().await.is_none());
    }

    #[tokio::test]
    async fn future_revision_skills_are_rejected_up_front() {
        let session = SkillSession::new(
            Arc::new(PickySkill::requiring(SKILL_API_REVISION + 1)),
            Box::new(NullSink),
        );
        let err = session.prepare(None).await.unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(
            err,
            SessionError::Skill(SkillError::UnsupportedPlatform { required, .. })
                if required == SKILL_API_REVISION + 1
        ));
    }

    #[tokio::test]
    async fn deviceless_skills_are_fatal() {
        let session =
            SkillSession::new(Arc::new(PickySkill::requiring(1)), Box::new(NullSink));
        let err = session.prepare(None).await.unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(
            err,
            SessionError::Skill(SkillError::NoExecutionDevice { .. })
        ));
    }

    #[test]
    fn intruder_results_trump_face_annotations() {
        let mut binding = SkillBinding::new(false);
        binding.insert_result(INTRUDER_DETECTED, SkillResult::Bool(true));
        binding.insert_result(
            FACE_RECTANGLES,
            SkillResult::Tensor(vec![0.1, 0.1, 0.2, 0.2]),
        );
        let annotations = annotations_from(&binding);
        assert_eq!(annotations.len(), 1);
    }

    #[test]
    fn no_results_means_no_annotations() {
        let binding = SkillBinding::new(false);
        assert!(annotations_from(&binding).is_empty());
    }

    #[test]
    fn state_displays_lowercase() {
        assert_eq!(SessionState::Idle.to_string(), "idle");
        assert_eq!(SessionState::Configuring.to_string(), "configuring");
        assert_eq!(SessionState::Streaming.to_string(), "streaming");
    }
}

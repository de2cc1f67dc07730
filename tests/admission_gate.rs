//! Admission behavior under concurrency: one evaluation at a time, losers
//! drop their frame, and control paths drain the in-flight evaluation.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Barrier, Notify};
use tokio::time::timeout;

use skillhost::session::NullSink;
use skillhost::skill::{
    ExecutionDevice, Skill, SkillBinding, SkillDescriptor, SkillInstance,
};
use skillhost::{AdmissionGate, DeviceKind, FrameOutcome, PendingFrame, SkillError, SkillSession};

fn frame(sequence: u64) -> PendingFrame {
    PendingFrame::from_bgra8(vec![0u8; 16], 2, 2)
        .expect("valid frame")
        .with_sequence(sequence)
}

async fn wait_until(what: &str, check: impl Fn() -> bool) {
    let outcome = timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(outcome.is_ok(), "timed out waiting until {}", what);
}

// ----------------------------------------------------------------------------
// Test skills
// ----------------------------------------------------------------------------

/// Counters the gated skill exposes to the test body.
#[derive(Default)]
struct Probe {
    active: AtomicUsize,
    max_active: AtomicUsize,
    evaluations: AtomicUsize,
    instances: AtomicUsize,
}

/// A skill whose evaluations stay open until the test releases them.
struct GatedSkill {
    descriptor: SkillDescriptor,
    devices: Vec<ExecutionDevice>,
    release: Arc<Notify>,
    probe: Arc<Probe>,
}

impl GatedSkill {
    fn with_devices(devices: Vec<ExecutionDevice>) -> (Arc<Self>, Arc<Notify>, Arc<Probe>) {
        let release = Arc::new(Notify::new());
        let probe = Arc::new(Probe::default());
        let skill = Arc::new(Self {
            descriptor: SkillDescriptor {
                name: "gated",
                description: "test-only skill that holds evaluations open",
                version: "0.0.1",
                minimum_api_revision: 1,
                uses_auxiliary_image: false,
            },
            devices,
            release: Arc::clone(&release),
            probe: Arc::clone(&probe),
        });
        (skill, release, probe)
    }

    fn cpu_only() -> (Arc<Self>, Arc<Notify>, Arc<Probe>) {
        Self::with_devices(vec![ExecutionDevice::cpu()])
    }
}

#[async_trait]
impl Skill for GatedSkill {
    fn descriptor(&self) -> &SkillDescriptor {
        &self.descriptor
    }

    fn supported_devices(&self) -> Vec<ExecutionDevice> {
        self.devices.clone()
    }

    async fn create_instance(
        &self,
        device: &ExecutionDevice,
    ) -> Result<Box<dyn SkillInstance>, SkillError> {
        self.probe.instances.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(GatedInstance {
            device: device.clone(),
            release: Arc::clone(&self.release),
            probe: Arc::clone(&self.probe),
        }))
    }
}

struct GatedInstance {
    device: ExecutionDevice,
    release: Arc<Notify>,
    probe: Arc<Probe>,
}

#[async_trait]
impl SkillInstance for GatedInstance {
    fn device(&self) -> &ExecutionDevice {
        &self.device
    }

    fn create_binding(&self) -> SkillBinding {
        SkillBinding::new(false)
    }

    async fn evaluate(&mut self, binding: &mut SkillBinding) -> Result<(), SkillError> {
        binding.begin_evaluation()?;
        let live = self.probe.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.probe.max_active.fetch_max(live, Ordering::SeqCst);
        self.release.notified().await;
        self.probe.active.fetch_sub(1, Ordering::SeqCst);
        self.probe.evaluations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A cpu skill that fails exactly the evaluations the test asks it to.
struct FlakySkill {
    descriptor: SkillDescriptor,
    fail_next: Arc<AtomicBool>,
}

impl FlakySkill {
    fn new() -> (Arc<Self>, Arc<AtomicBool>) {
        let fail_next = Arc::new(AtomicBool::new(false));
        let skill = Arc::new(Self {
            descriptor: SkillDescriptor {
                name: "flaky",
                description: "test-only skill that fails on demand",
                version: "0.0.1",
                minimum_api_revision: 1,
                uses_auxiliary_image: false,
            },
            fail_next: Arc::clone(&fail_next),
        });
        (skill, fail_next)
    }
}

#[async_trait]
impl Skill for FlakySkill {
    fn descriptor(&self) -> &SkillDescriptor {
        &self.descriptor
    }

    fn supported_devices(&self) -> Vec<ExecutionDevice> {
        vec![ExecutionDevice::cpu()]
    }

    async fn create_instance(
        &self,
        device: &ExecutionDevice,
    ) -> Result<Box<dyn SkillInstance>, SkillError> {
        Ok(Box::new(FlakyInstance {
            device: device.clone(),
            fail_next: Arc::clone(&self.fail_next),
        }))
    }
}

struct FlakyInstance {
    device: ExecutionDevice,
    fail_next: Arc<AtomicBool>,
}

#[async_trait]
impl SkillInstance for FlakyInstance {
    fn device(&self) -> &ExecutionDevice {
        &self.device
    }

    fn create_binding(&self) -> SkillBinding {
        SkillBinding::new(false)
    }

    async fn evaluate(&mut self, binding: &mut SkillBinding) -> Result<(), SkillError> {
        binding.begin_evaluation()?;
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(SkillError::Evaluation("synthetic failure".to_string()));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Gate-level properties
// ----------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn a_stampede_admits_exactly_one_caller() {
    const CALLERS: usize = 16;

    let gate = Arc::new(AdmissionGate::new(()));
    let start = Arc::new(Barrier::new(CALLERS));
    let tried = Arc::new(Barrier::new(CALLERS));
    let winners = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::with_capacity(CALLERS);
    for _ in 0..CALLERS {
        let gate = Arc::clone(&gate);
        let start = Arc::clone(&start);
        let tried = Arc::clone(&tried);
        let winners = Arc::clone(&winners);
        handles.push(tokio::spawn(async move {
            start.wait().await;
            let permit = gate.try_admit();
            if permit.is_some() {
                winners.fetch_add(1, Ordering::SeqCst);
            }
            // Hold (or not) until every caller has tried, so the winner's
            // release cannot let a second caller in.
            tried.wait().await;
            drop(permit);
        }));
    }
    for handle in handles {
        handle.await.expect("caller task");
    }

    assert_eq!(winners.load(Ordering::SeqCst), 1);
}

// ----------------------------------------------------------------------------
// Session-level properties
// ----------------------------------------------------------------------------

#[tokio::test]
async fn a_busy_session_drops_the_late_frame() {
    let (skill, release, probe) = GatedSkill::cpu_only();
    let session = SkillSession::new(skill, Box::new(NullSink));
    session.prepare(None).await.expect("prepare");

    let holder = tokio::spawn({
        let session = session.clone();
        async move { session.process_frame(frame(1)).await }
    });
    wait_until("frame 1 holds the permit", || {
        probe.active.load(Ordering::SeqCst) == 1
    })
    .await;

    // Frame 2 arrives while frame 1 evaluates: dropped, not queued.
    assert_eq!(session.process_frame(frame(2)).await, FrameOutcome::DroppedBusy);

    release.notify_one();
    assert_eq!(holder.await.expect("holder task"), FrameOutcome::Evaluated);

    // The permit is free again; frame 3 is admitted.
    release.notify_one();
    assert_eq!(session.process_frame(frame(3)).await, FrameOutcome::Evaluated);

    assert_eq!(probe.max_active.load(Ordering::SeqCst), 1);
    assert_eq!(probe.evaluations.load(Ordering::SeqCst), 2);
    let stats = session.stats();
    assert_eq!(stats.frames_seen, 3);
    assert_eq!(stats.frames_dropped, 1);
    assert_eq!(stats.evaluations, 2);
}

#[tokio::test]
async fn a_failed_evaluation_frees_the_permit_immediately() {
    let (skill, fail_next) = FlakySkill::new();
    let session = SkillSession::new(skill, Box::new(NullSink));
    session.prepare(None).await.expect("prepare");

    fail_next.store(true, Ordering::SeqCst);
    assert_eq!(session.process_frame(frame(1)).await, FrameOutcome::Failed);

    // No waiting in between: the gate must already be free.
    assert_eq!(session.process_frame(frame(2)).await, FrameOutcome::Evaluated);

    let stats = session.stats();
    assert_eq!(stats.eval_failures, 1);
    assert_eq!(stats.evaluations, 1);
    assert_eq!(stats.frames_dropped, 0);
}

#[tokio::test]
async fn a_device_switch_waits_for_the_active_evaluation() {
    let (skill, release, probe) = GatedSkill::with_devices(vec![
        ExecutionDevice::cpu(),
        ExecutionDevice {
            kind: DeviceKind::Gpu,
            name: "gpu0".to_string(),
        },
    ]);
    let session = SkillSession::new(skill, Box::new(NullSink));
    session.prepare(Some(DeviceKind::Cpu)).await.expect("prepare");
    assert_eq!(probe.instances.load(Ordering::SeqCst), 1);

    let holder = tokio::spawn({
        let session = session.clone();
        async move { session.process_frame(frame(1)).await }
    });
    wait_until("frame 1 holds the permit", || {
        probe.active.load(Ordering::SeqCst) == 1
    })
    .await;

    let mut switch = tokio::spawn({
        let session = session.clone();
        async move { session.switch_device(DeviceKind::Gpu).await }
    });
    let early = timeout(Duration::from_millis(50), &mut switch).await;
    assert!(early.is_err(), "switch must suspend while an evaluation is active");

    release.notify_one();
    assert_eq!(holder.await.expect("holder task"), FrameOutcome::Evaluated);
    timeout(Duration::from_secs(5), switch)
        .await
        .expect("switch completes once the permit drops")
        .expect("switch task")
        .expect("switch succeeds");

    // The swap happened after, not during, the evaluation.
    assert_eq!(probe.active.load(Ordering::SeqCst), 0);
    assert_eq!(probe.instances.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn teardown_drains_the_in_flight_evaluation() {
    let (skill, release, probe) = GatedSkill::cpu_only();
    let session = SkillSession::new(skill, Box::new(NullSink));
    session.prepare(None).await.expect("prepare");

    let holder = tokio::spawn({
        let session = session.clone();
        async move { session.process_frame(frame(1)).await }
    });
    wait_until("frame 1 holds the permit", || {
        probe.active.load(Ordering::SeqCst) == 1
    })
    .await;

    let mut teardown = tokio::spawn({
        let session = session.clone();
        async move { session.teardown().await }
    });
    let early = timeout(Duration::from_millis(50), &mut teardown).await;
    assert!(early.is_err(), "teardown must suspend while an evaluation is active");

    release.notify_one();
    assert_eq!(holder.await.expect("holder task"), FrameOutcome::Evaluated);
    timeout(Duration::from_secs(5), teardown)
        .await
        .expect("teardown completes once the permit drops")
        .expect("teardown task");

    assert_eq!(probe.evaluations.load(Ordering::SeqCst), 1);
    assert_eq!(session.state(), skillhost::SessionState::Idle);
}

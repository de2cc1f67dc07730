//! Presentation seam.
//!
//! The session hands each finished evaluation to a [`FrameSink`]. A sink
//! failure is logged and swallowed; presentation never takes the frame
//! path down.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use anyhow::Result;
use serde::Serialize;

use crate::frame::PendingFrame;
use crate::overlay::Annotation;
use crate::skill::{SkillResult, INTRUDER_DETECTED, NUMBER_OF_FACES};

/// Everything one evaluation produced.
#[derive(Debug)]
pub struct Evaluation {
    /// Sequence of the evaluated frame.
    pub sequence: u64,
    /// Output image, for skills that produce one.
    pub output: Option<PendingFrame>,
    /// Overlay elements derived from the named results.
    pub annotations: Vec<Annotation>,
    pub results: BTreeMap<String, SkillResult>,
    pub timing: EvalTiming,
}

impl Evaluation {
    pub fn face_count(&self) -> Option<u32> {
        self.results
            .get(NUMBER_OF_FACES)?
            .as_scalar()
            .map(|v| v as u32)
    }

    pub fn intruder_detected(&self) -> Option<bool> {
        self.results.get(INTRUDER_DETECTED)?.as_bool()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct EvalTiming {
    pub bind_us: u64,
    pub eval_us: u64,
}

/// Consumer of finished evaluations.
pub trait FrameSink: Send {
    fn present(&mut self, evaluation: &Evaluation) -> Result<()>;
}

/// Discards evaluations. For headless sessions and tests.
pub struct NullSink;

impl FrameSink for NullSink {
    fn present(&mut self, _evaluation: &Evaluation) -> Result<()> {
        Ok(())
    }
}

/// Logs one line per evaluation.
pub struct LogSink;

impl FrameSink for LogSink {
    fn present(&mut self, evaluation: &Evaluation) -> Result<()> {
        let mut extras = String::new();
        if let Some(faces) = evaluation.face_count() {
            let _ = write!(extras, " faces={faces}");
        }
        if let Some(intruder) = evaluation.intruder_detected() {
            let _ = write!(extras, " intruder={intruder}");
        }
        if let Some(output) = &evaluation.output {
            let _ = write!(extras, " output={}x{}", output.width, output.height);
        }
        log::info!(
            "frame {} evaluated in {}us, {} annotation(s){}",
            evaluation.sequence,
            evaluation.timing.eval_us,
            evaluation.annotations.len(),
            extras
        );
        Ok(())
    }
}

//! Synthetic capture source.
//!
//! Renders a deterministic scene: a flat dark background with one bright
//! block sliding right, wrapping at the edge. Only the tiles along the
//! block's path change between frames, which gives the built-in skills
//! something real to find without any camera hardware.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Duration, MissedTickBehavior};

use super::{
    deliver, CaptureError, CaptureFormat, CaptureSource, PendingFrame, SourceCounters,
    SourceStats, SourceWorker, DELIVERY_CAPACITY,
};

const BACKGROUND_VALUE: u8 = 32;
const BLOCK_VALUE: u8 = 230;
const BLOCK_STEP_PX: u32 = 8;

#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    pub name: String,
    pub format: CaptureFormat,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            name: "demo".to_string(),
            format: CaptureFormat {
                width: 640,
                height: 480,
                frame_rate: 10,
            },
        }
    }
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    counters: Arc<SourceCounters>,
    worker: Option<SourceWorker>,
    torn_down: bool,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            counters: Arc::new(SourceCounters::default()),
            worker: None,
            torn_down: false,
        }
    }
}

#[async_trait]
impl CaptureSource for SyntheticSource {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn supported_formats(&self) -> Vec<CaptureFormat> {
        let fps = self.config.format.frame_rate;
        vec![
            CaptureFormat {
                width: 640,
                height: 480,
                frame_rate: fps,
            },
            CaptureFormat {
                width: 320,
                height: 240,
                frame_rate: fps,
            },
            CaptureFormat {
                width: 1280,
                height: 720,
                frame_rate: fps,
            },
        ]
    }

    async fn set_format(&mut self, format: CaptureFormat) -> Result<(), CaptureError> {
        if self.worker.is_some() {
            return Err(CaptureError::AlreadyStarted);
        }
        if format.width == 0 || format.height == 0 || format.frame_rate == 0 {
            return Err(CaptureError::UnsupportedFormat {
                width: format.width,
                height: format.height,
                frame_rate: format.frame_rate,
            });
        }
        self.config.format = format;
        Ok(())
    }

    async fn start(&mut self) -> Result<mpsc::Receiver<PendingFrame>, CaptureError> {
        if self.torn_down {
            return Err(CaptureError::TornDown);
        }
        if self.worker.is_some() {
            return Err(CaptureError::AlreadyStarted);
        }

        let (tx, rx) = mpsc::channel(DELIVERY_CAPACITY);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let format = self.config.format;
        let counters = Arc::clone(&self.counters);
        let name = self.config.name.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs_f64(1.0 / f64::from(format.frame_rate)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut sequence: u64 = 0;
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {
                        let frame = render_scene(format, sequence);
                        if !deliver(&tx, frame, &counters) {
                            break;
                        }
                        sequence += 1;
                    }
                }
            }
            log::debug!("synthetic source '{}' stopped after {} frames", name, sequence);
        });

        self.worker = Some(SourceWorker::new(shutdown_tx, handle));
        log::info!(
            "synthetic source '{}' started at {}",
            self.config.name,
            self.config.format
        );
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        if let Some(worker) = self.worker.take() {
            worker.stop().await;
        }
        Ok(())
    }

    async fn teardown(&mut self) -> Result<(), CaptureError> {
        self.stop().await?;
        self.torn_down = true;
        Ok(())
    }

    fn stats(&self) -> SourceStats {
        self.counters.snapshot()
    }
}

/// One frame of the sliding-block scene.
fn render_scene(format: CaptureFormat, sequence: u64) -> PendingFrame {
    let (width, height) = (format.width, format.height);
    let block_w = (width / 5).max(1);
    let block_h = (height / 3).max(1);
    let travel = width.saturating_sub(block_w).max(1);
    let block_x = (sequence * u64::from(BLOCK_STEP_PX) % u64::from(travel)) as u32;
    let block_y = height / 3;

    let mut data = vec![0u8; (width as usize) * (height as usize) * 4];
    for chunk in data.chunks_exact_mut(4) {
        chunk.copy_from_slice(&[BACKGROUND_VALUE, BACKGROUND_VALUE, BACKGROUND_VALUE, 255]);
    }
    for y in block_y..(block_y + block_h).min(height) {
        for x in block_x..(block_x + block_w).min(width) {
            let off = ((y * width + x) * 4) as usize;
            data[off..off + 4].copy_from_slice(&[BLOCK_VALUE, BLOCK_VALUE, BLOCK_VALUE, 255]);
        }
    }

    PendingFrame::new(data, width, height).with_sequence(sequence)
}

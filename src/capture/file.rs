//! Still-image file source.
//!
//! Decodes one image at open time and replays it at the target frame rate.
//! Useful for driving a session from disk and as the decode path behind
//! one-shot file evaluations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Duration, MissedTickBehavior};

use super::{
    deliver, CaptureError, CaptureFormat, CaptureSource, PendingFrame, SourceCounters,
    SourceStats, SourceWorker, DELIVERY_CAPACITY,
};

/// Decode an image file into a BGRA8 frame.
pub fn decode_image_file(path: &Path) -> Result<PendingFrame, CaptureError> {
    let decoded = image::open(path).map_err(|e| match e {
        image::ImageError::IoError(source) => CaptureError::Io {
            path: path.to_path_buf(),
            source,
        },
        other => CaptureError::Decode {
            path: path.to_path_buf(),
            source: other,
        },
    })?;
    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut data = rgba.into_raw();
    for px in data.chunks_exact_mut(4) {
        px.swap(0, 2);
    }
    Ok(PendingFrame::from_bgra8(data, width, height)?)
}

#[derive(Clone, Debug)]
pub struct FileSourceConfig {
    pub path: PathBuf,
    pub target_fps: u32,
}

impl FileSourceConfig {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            target_fps: 10,
        }
    }

    pub fn with_target_fps(mut self, target_fps: u32) -> Self {
        self.target_fps = target_fps.max(1);
        self
    }
}

pub struct FileSource {
    config: FileSourceConfig,
    template: Arc<PendingFrame>,
    counters: Arc<SourceCounters>,
    worker: Option<SourceWorker>,
    torn_down: bool,
}

impl FileSource {
    /// Open and decode the image. The decode happens once, here.
    pub fn open(config: FileSourceConfig) -> Result<Self, CaptureError> {
        let template = decode_image_file(&config.path)?;
        log::info!(
            "file source opened {} ({}x{})",
            config.path.display(),
            template.width,
            template.height
        );
        Ok(Self {
            config,
            template: Arc::new(template),
            counters: Arc::new(SourceCounters::default()),
            worker: None,
            torn_down: false,
        })
    }

    fn natural_format(&self) -> CaptureFormat {
        CaptureFormat {
            width: self.template.width,
            height: self.template.height,
            frame_rate: self.config.target_fps,
        }
    }
}

#[async_trait]
impl CaptureSource for FileSource {
    fn name(&self) -> &str {
        self.config.path.to_str().unwrap_or("file")
    }

    fn supported_formats(&self) -> Vec<CaptureFormat> {
        vec![self.natural_format()]
    }

    /// The image dictates the geometry; only the frame rate is adjustable.
    async fn set_format(&mut self, format: CaptureFormat) -> Result<(), CaptureError> {
        if self.worker.is_some() {
            return Err(CaptureError::AlreadyStarted);
        }
        if format.width != self.template.width
            || format.height != self.template.height
            || format.frame_rate == 0
        {
            return Err(CaptureError::UnsupportedFormat {
                width: format.width,
                height: format.height,
                frame_rate: format.frame_rate,
            });
        }
        self.config.target_fps = format.frame_rate;
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
        let template = Arc::clone(&self.template);
        let counters = Arc::clone(&self.counters);
        let fps = self.config.target_fps.max(1);

        let handle = tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs_f64(1.0 / f64::from(fps)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut sequence: u64 = 0;
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {
                        if !deliver(&tx, replay_frame(&template, sequence), &counters) {
                            break;
                        }
                        sequence += 1;
                    }
                }
            }
        });

        self.worker = Some(SourceWorker::new(shutdown_tx, handle));
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

fn replay_frame(template: &PendingFrame, sequence: u64) -> PendingFrame {
    PendingFrame::new(template.pixels().to_vec(), template.width, template.height)
        .with_sequence(sequence)
}

//! Capture sources.
//!
//! Frame producers for skill sessions:
//! - Synthetic scene generator (demos, tests)
//! - Still-image file replay
//!
//! All sources deliver frames through a bounded channel of capacity 1.
//! A consumer still busy with the previous frame forces the producer to
//! drop at the source; frames are never queued up behind the permit.
//!
//! Sources MUST NOT:
//! - Block a runtime thread while producing
//! - Keep producing after `stop` resolves

mod file;
mod synthetic;

pub use file::{decode_image_file, FileSource, FileSourceConfig};
pub use synthetic::{SyntheticConfig, SyntheticSource};

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::error::CaptureError;
use crate::frame::PendingFrame;

/// Delivery channel capacity. One slot: the frame the consumer has not
/// picked up yet. Anything beyond that is dropped, not queued.
pub(crate) const DELIVERY_CAPACITY: usize = 1;

// ----------------------------------------------------------------------------
// Formats
// ----------------------------------------------------------------------------

/// One delivery format a source can produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CaptureFormat {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
}

impl fmt::Display for CaptureFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}@{}", self.width, self.height, self.frame_rate)
    }
}

/// The geometry the session asks for when a source offers it.
pub const PREFERRED_WIDTH: u32 = 640;
pub const PREFERRED_HEIGHT: u32 = 480;

/// Pick the 640x480 variant when offered, otherwise the first offered
/// format. Frame rate is taken as offered.
pub fn preferred_format(supported: &[CaptureFormat]) -> Option<CaptureFormat> {
    supported
        .iter()
        .copied()
        .find(|f| f.width == PREFERRED_WIDTH && f.height == PREFERRED_HEIGHT)
        .or_else(|| supported.first().copied())
}

// ----------------------------------------------------------------------------
// Source contract
// ----------------------------------------------------------------------------

/// A frame producer.
#[async_trait]
pub trait CaptureSource: Send {
    fn name(&self) -> &str;

    fn supported_formats(&self) -> Vec<CaptureFormat>;

    /// Select the delivery format. Valid only while stopped.
    async fn set_format(&mut self, format: CaptureFormat) -> Result<(), CaptureError>;

    /// Begin delivery. Frames arrive on the returned channel until `stop`
    /// or `teardown`; the channel closing means the source ended.
    async fn start(&mut self) -> Result<mpsc::Receiver<PendingFrame>, CaptureError>;

    /// Stop delivery and join the producer. Idempotent.
    async fn stop(&mut self) -> Result<(), CaptureError>;

    /// Release the source for good. A torn down source cannot restart.
    async fn teardown(&mut self) -> Result<(), CaptureError>;

    /// Producer-side delivery counters.
    fn stats(&self) -> SourceStats;
}

/// Producer-side delivery counters.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct SourceStats {
    pub produced: u64,
    pub dropped: u64,
}

// ----------------------------------------------------------------------------
// Shared producer plumbing
// ----------------------------------------------------------------------------

#[derive(Default)]
pub(crate) struct SourceCounters {
    produced: AtomicU64,
    dropped: AtomicU64,
}

impl SourceCounters {
    pub(crate) fn snapshot(&self) -> SourceStats {
        SourceStats {
            produced: self.produced.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// A running producer task plus its shutdown signal.
pub(crate) struct SourceWorker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl SourceWorker {
    pub(crate) fn new(shutdown: watch::Sender<bool>, handle: JoinHandle<()>) -> Self {
        Self { shutdown, handle }
    }

    pub(crate) async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

/// Offer a frame to the consumer. A full channel drops the frame and
/// counts it; a closed channel tells the producer to wind down.
pub(crate) fn deliver(
    tx: &mpsc::Sender<PendingFrame>,
    frame: PendingFrame,
    counters: &SourceCounters,
) -> bool {
    counters.produced.fetch_add(1, Ordering::Relaxed);
    match tx.try_send(frame) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(frame)) => {
            counters.dropped.fetch_add(1, Ordering::Relaxed);
            log::debug!(
                "frame {} dropped at source, consumer not keeping up",
                frame.sequence
            );
            true
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

// ----------------------------------------------------------------------------
// URL dispatch
// ----------------------------------------------------------------------------

/// Build a capture source from a url-ish spec:
/// `synthetic://<name>`, `file://<path>`, or a bare local path.
pub fn source_from_url(
    url: &str,
    format: CaptureFormat,
) -> Result<Box<dyn CaptureSource>, CaptureError> {
    if let Some(name) = url.strip_prefix("synthetic://") {
        let config = SyntheticConfig {
            name: if name.is_empty() {
                "demo".to_string()
            } else {
                name.to_string()
            },
            format,
        };
        return Ok(Box::new(SyntheticSource::new(config)));
    }
    if let Some(path) = url.strip_prefix("file://") {
        let config = FileSourceConfig::new(PathBuf::from(path)).with_target_fps(format.frame_rate);
        return Ok(Box::new(FileSource::open(config)?));
    }
    if is_local_file_path(url) {
        let config = FileSourceConfig::new(PathBuf::from(url)).with_target_fps(format.frame_rate);
        return Ok(Box::new(FileSource::open(config)?));
    }
    Err(CaptureError::UnknownUrl(url.to_string()))
}

fn is_local_file_path(path: &str) -> bool {
    !path.trim().is_empty() && !path.contains("://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preferred_format_picks_vga_when_offered() {
        let formats = [
            CaptureFormat {
                width: 1280,
                height: 720,
                frame_rate: 30,
            },
            CaptureFormat {
                width: 640,
                height: 480,
                frame_rate: 10,
            },
        ];
        let picked = preferred_format(&formats).expect("non-empty offer");
        assert_eq!(picked.width, 640);
        assert_eq!(picked.height, 480);
        assert_eq!(picked.frame_rate, 10);
    }

    #[test]
    fn preferred_format_falls_back_to_first_offer() {
        let formats = [CaptureFormat {
            width: 320,
            height: 240,
            frame_rate: 15,
        }];
        assert_eq!(preferred_format(&formats), Some(formats[0]));
        assert_eq!(preferred_format(&[]), None);
    }

    #[test]
    fn local_path_detection_rejects_schemes() {
        assert!(is_local_file_path("/tmp/background.png"));
        assert!(is_local_file_path("relative/frame.jpg"));
        assert!(!is_local_file_path("rtsp://camera/stream"));
        assert!(!is_local_file_path("  "));
    }

    #[tokio::test]
    async fn deliver_drops_when_the_slot_is_taken() {
        let (tx, mut rx) = mpsc::channel(DELIVERY_CAPACITY);
        let counters = SourceCounters::default();
        let frame = |seq| {
            PendingFrame::from_bgra8(vec![0u8; 16], 2, 2)
                .expect("valid frame")
                .with_sequence(seq)
        };

        assert!(deliver(&tx, frame(1), &counters));
        assert!(deliver(&tx, frame(2), &counters), "full slot is not an error");
        let stats = counters.snapshot();
        assert_eq!(stats.produced, 2);
        assert_eq!(stats.dropped, 1);

        let delivered = rx.recv().await.expect("one frame queued");
        assert_eq!(delivered.sequence, 1, "the occupying frame survives, not the new one");
    }

    #[tokio::test]
    async fn deliver_reports_a_closed_consumer() {
        let (tx, rx) = mpsc::channel(DELIVERY_CAPACITY);
        drop(rx);
        let counters = SourceCounters::default();
        let frame = PendingFrame::from_bgra8(vec![0u8; 16], 2, 2).expect("valid frame");
        assert!(!deliver(&tx, frame, &counters));
    }

    #[test]
    fn unknown_schemes_are_rejected() {
        let format = CaptureFormat {
            width: 640,
            height: 480,
            frame_rate: 10,
        };
        let err = source_from_url("rtsp://cam/live", format).unwrap_err();
        assert!(matches!(err, CaptureError::UnknownUrl(_)));
    }
}

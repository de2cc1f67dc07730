//! Built-in reference skills.
//!
//! Four CPU-only skills exercise the runtime contract end to end:
//!
//! - `background_blur`: blurs everything outside the subject region.
//! - `background_replacement`: swaps the region outside the subject for an
//!   auxiliary background image.
//! - `face_detection`: clusters bright tiles into face boxes + landmarks.
//! - `intruder_detection`: frame differencing against the previous frame.
//!
//! They are deliberately simple image routines, not models; what matters
//! is that they produce real outputs, named results and failures through
//! the same seams a production skill would.

mod blur;
mod face;
mod intruder;
mod replace;

pub use blur::BackgroundBlurSkill;
pub use face::FaceDetectionSkill;
pub use intruder::IntruderDetectionSkill;
pub use replace::BackgroundReplacementSkill;

use crate::error::SkillError;
use crate::skill::device::ExecutionDevice;

// Central subject prior shared by blur and replacement: an ellipse around
// where a person sits in a head-and-shoulders framing.
const SUBJECT_CENTER_Y: f32 = 0.55;
const SUBJECT_RADIUS_X: f32 = 0.30;
const SUBJECT_RADIUS_Y: f32 = 0.42;

/// Whether pixel (x, y) falls inside the subject region.
fn in_subject_region(width: u32, height: u32, x: u32, y: u32) -> bool {
    let cx = width as f32 / 2.0;
    let cy = height as f32 * SUBJECT_CENTER_Y;
    let rx = width as f32 * SUBJECT_RADIUS_X;
    let ry = height as f32 * SUBJECT_RADIUS_Y;
    let dx = (x as f32 - cx) / rx;
    let dy = (y as f32 - cy) / ry;
    dx * dx + dy * dy <= 1.0
}

/// Pixel bounds of tile (tx, ty) on a grid x grid tiling. The last row and
/// column absorb the remainder.
fn tile_bounds(width: u32, height: u32, grid: u32, tx: u32, ty: u32) -> (u32, u32, u32, u32) {
    let x0 = tx * width / grid;
    let y0 = ty * height / grid;
    let x1 = if tx + 1 == grid {
        width
    } else {
        (tx + 1) * width / grid
    };
    let y1 = if ty + 1 == grid {
        height
    } else {
        (ty + 1) * height / grid
    };
    (x0, y0, x1, y1)
}

/// Mean luma of a BGRA pixel rectangle, Rec. 601 weights.
fn mean_luma(pixels: &[u8], width: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> f32 {
    let mut sum = 0.0f32;
    let mut count = 0u32;
    for y in y0..y1 {
        let row = (y as usize * width as usize + x0 as usize) * 4;
        for x in 0..(x1 - x0) as usize {
            let off = row + x * 4;
            let b = pixels[off] as f32;
            let g = pixels[off + 1] as f32;
            let r = pixels[off + 2] as f32;
            sum += 0.114 * b + 0.587 * g + 0.299 * r;
            count += 1;
        }
    }
    if count == 0 {
        0.0
    } else {
        sum / count as f32
    }
}

/// Shared device check for the CPU-only built-ins.
fn require_supported(
    skill: &'static str,
    supported: &[ExecutionDevice],
    device: &ExecutionDevice,
) -> Result<(), SkillError> {
    if supported.contains(device) {
        Ok(())
    } else {
        Err(SkillError::DeviceNotSupported {
            skill: skill.to_string(),
            device: device.kind.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_region_covers_center_not_corners() {
        assert!(in_subject_region(640, 480, 320, 264));
        assert!(!in_subject_region(640, 480, 0, 0));
        assert!(!in_subject_region(640, 480, 639, 0));
        assert!(!in_subject_region(640, 480, 639, 479));
    }

    #[test]
    fn tiles_cover_the_frame_exactly() {
        let (width, height, grid) = (101, 77, 8);
        let mut covered = 0u64;
        for ty in 0..grid {
            for tx in 0..grid {
                let (x0, y0, x1, y1) = tile_bounds(width, height, grid, tx, ty);
                assert!(x1 > x0 && y1 > y0, "tile ({tx},{ty}) is empty");
                covered += u64::from(x1 - x0) * u64::from(y1 - y0);
            }
        }
        assert_eq!(covered, u64::from(width) * u64::from(height));
    }

    #[test]
    fn mean_luma_weights_channels() {
        // One white and one black pixel: mean luma 127.5.
        let pixels = vec![255, 255, 255, 255, 0, 0, 0, 255];
        let luma = mean_luma(&pixels, 2, 0, 0, 2, 1);
        assert!((luma - 127.5).abs() < 0.5);
    }
}

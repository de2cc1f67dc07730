use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::SkillError;
use crate::skill::builtin::{require_supported, tile_bounds};
use crate::skill::device::ExecutionDevice;
use crate::skill::results::{SkillResult, INTRUDER_DETECTED};
use crate::skill::runtime::{Skill, SkillBinding, SkillDescriptor, SkillInstance};

const GRID: u32 = 8;

/// Tiles that must change before the frame counts as motion. One tile
/// absorbs sensor flicker; an intruder-sized change crosses several.
const MOTION_MIN_TILES: usize = 2;

/// Intruder detection: SHA-256 per grid tile, differenced against the
/// previous frame. The first frame of a stream never flags; the comparison
/// state lives in the instance and resets when the instance is recreated.
pub struct IntruderDetectionSkill {
    descriptor: SkillDescriptor,
}

impl IntruderDetectionSkill {
    pub fn new() -> Self {
        Self {
            descriptor: SkillDescriptor {
                name: "intruder_detection",
                description: "flags frames whose tiles differ from the previous frame",
                version: "1.1.0",
                minimum_api_revision: 1,
                uses_auxiliary_image: false,
            },
        }
    }
}

impl Default for IntruderDetectionSkill {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Skill for IntruderDetectionSkill {
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
        require_supported(self.descriptor.name, &self.supported_devices(), device)?;
        Ok(Box::new(IntruderInstance {
            device: device.clone(),
            last: None,
        }))
    }
}

/// Tile hashes of one frame, tagged with the geometry they were computed
/// under. Hashes from different geometries are incomparable.
struct TileHashes {
    width: u32,
    height: u32,
    hashes: Vec<[u8; 32]>,
}

struct IntruderInstance {
    device: ExecutionDevice,
    last: Option<TileHashes>,
}

#[async_trait]
impl SkillInstance for IntruderInstance {
    fn device(&self) -> &ExecutionDevice {
        &self.device
    }

    fn create_binding(&self) -> SkillBinding {
        SkillBinding::new(false)
    }

    async fn evaluate(&mut self, binding: &mut SkillBinding) -> Result<(), SkillError> {
        let frame = binding.begin_evaluation()?;
        let current = TileHashes {
            width: frame.width,
            height: frame.height,
            hashes: hash_tiles(frame.pixels(), frame.width, frame.height),
        };

        let changed = match &self.last {
            Some(prev) if prev.width == current.width && prev.height == current.height => prev
                .hashes
                .iter()
                .zip(&current.hashes)
                .filter(|(a, b)| a != b)
                .count(),
            // First frame, or the geometry changed: re-baseline.
            _ => 0,
        };
        self.last = Some(current);

        let intruder = changed >= MOTION_MIN_TILES;
        binding.insert_result(INTRUDER_DETECTED, SkillResult::Bool(intruder));
        Ok(())
    }
}

fn hash_tiles(pixels: &[u8], width: u32, height: u32) -> Vec<[u8; 32]> {
    let grid = GRID.min(width).min(height).max(1);
    let mut hashes = Vec::with_capacity((grid * grid) as usize);
    for ty in 0..grid {
        for tx in 0..grid {
            let (x0, y0, x1, y1) = tile_bounds(width, height, grid, tx, ty);
            let mut hasher = Sha256::new();
            for y in y0..y1 {
                let start = (y as usize * width as usize + x0 as usize) * 4;
                let end = start + (x1 - x0) as usize * 4;
                hasher.update(&pixels[start..end]);
            }
            hashes.push(hasher.finalize().into());
        }
    }
    hashes
}

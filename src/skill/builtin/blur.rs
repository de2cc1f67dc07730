use async_trait::async_trait;

use crate::error::SkillError;
use crate::frame::PendingFrame;
use crate::skill::builtin::{in_subject_region, require_supported};
use crate::skill::device::ExecutionDevice;
use crate::skill::runtime::{Skill, SkillBinding, SkillDescriptor, SkillInstance};

const BLUR_RADIUS: i64 = 4;

/// Background blur: the subject region stays sharp, everything outside it
/// gets a box blur.
pub struct BackgroundBlurSkill {
    descriptor: SkillDescriptor,
}

impl BackgroundBlurSkill {
    pub fn new() -> Self {
        Self {
            descriptor: SkillDescriptor {
                name: "background_blur",
                description: "keeps the central subject sharp and blurs the rest",
                version: "1.1.0",
                minimum_api_revision: 1,
                uses_auxiliary_image: false,
            },
        }
    }
}

impl Default for BackgroundBlurSkill {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Skill for BackgroundBlurSkill {
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
        Ok(Box::new(BlurInstance {
            device: device.clone(),
        }))
    }
}

struct BlurInstance {
    device: ExecutionDevice,
}

#[async_trait]
impl SkillInstance for BlurInstance {
    fn device(&self) -> &ExecutionDevice {
        &self.device
    }

    fn create_binding(&self) -> SkillBinding {
        SkillBinding::new(false)
    }

    async fn evaluate(&mut self, binding: &mut SkillBinding) -> Result<(), SkillError> {
        let frame = binding.begin_evaluation()?;
        let (width, height) = (frame.width, frame.height);

        let blurred = box_blur_bgra(frame.pixels(), width, height, BLUR_RADIUS);

        let mut out = blurred;
        for y in 0..height {
            for x in 0..width {
                if in_subject_region(width, height, x, y) {
                    let off = frame.pixel_offset(x, y);
                    out[off..off + 4].copy_from_slice(&frame.pixels()[off..off + 4]);
                }
            }
        }

        let output = PendingFrame::from_bgra8(out, width, height)
            .map_err(|e| SkillError::Evaluation(e.to_string()))?
            .with_sequence(frame.sequence);
        binding.set_output_image(output);
        Ok(())
    }
}

/// Two-pass separable box blur over BGRA, window clamped at the edges.
fn box_blur_bgra(src: &[u8], width: u32, height: u32, radius: i64) -> Vec<u8> {
    let mut tmp = vec![0u8; src.len()];
    let mut out = vec![0u8; src.len()];
    blur_axis(src, &mut tmp, width, height, radius, true);
    blur_axis(&tmp, &mut out, width, height, radius, false);
    out
}

fn blur_axis(src: &[u8], dst: &mut [u8], width: u32, height: u32, radius: i64, horizontal: bool) {
    let w = width as i64;
    let h = height as i64;
    for y in 0..h {
        for x in 0..w {
            let mut sum = [0u32; 4];
            let mut count = 0u32;
            for d in -radius..=radius {
                let (sx, sy) = if horizontal { (x + d, y) } else { (x, y + d) };
                if sx < 0 || sy < 0 || sx >= w || sy >= h {
                    continue;
                }
                let off = ((sy * w + sx) * 4) as usize;
                for (c, acc) in sum.iter_mut().enumerate() {
                    *acc += u32::from(src[off + c]);
                }
                count += 1;
            }
            let off = ((y * w + x) * 4) as usize;
            for (c, acc) in sum.iter().enumerate() {
                dst[off + c] = (acc / count) as u8;
            }
        }
    }
}

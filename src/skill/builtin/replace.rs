use async_trait::async_trait;

use crate::error::SkillError;
use crate::frame::PendingFrame;
use crate::skill::builtin::{in_subject_region, require_supported};
use crate::skill::device::ExecutionDevice;
use crate::skill::runtime::{Skill, SkillBinding, SkillDescriptor, SkillInstance};

/// Background replacement: pixels outside the subject region come from an
/// auxiliary background image, nearest-neighbor sampled to the frame size.
pub struct BackgroundReplacementSkill {
    descriptor: SkillDescriptor,
}

impl BackgroundReplacementSkill {
    pub fn new() -> Self {
        Self {
            descriptor: SkillDescriptor {
                name: "background_replacement",
                description: "swaps the region outside the subject for a bound background",
                version: "1.1.0",
                minimum_api_revision: 1,
                uses_auxiliary_image: true,
            },
        }
    }
}

impl Default for BackgroundReplacementSkill {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Skill for BackgroundReplacementSkill {
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
        Ok(Box::new(ReplacementInstance {
            device: device.clone(),
        }))
    }
}

struct ReplacementInstance {
    device: ExecutionDevice,
}

#[async_trait]
impl SkillInstance for ReplacementInstance {
    fn device(&self) -> &ExecutionDevice {
        &self.device
    }

    fn create_binding(&self) -> SkillBinding {
        SkillBinding::new(true)
    }

    async fn evaluate(&mut self, binding: &mut SkillBinding) -> Result<(), SkillError> {
        let frame = binding.begin_evaluation()?;
        let (width, height) = (frame.width, frame.height);

        let composed = {
            let background = binding
                .auxiliary_image()
                .ok_or_else(|| SkillError::Evaluation("no background image bound".to_string()))?;

            let mut out = frame.pixels().to_vec();
            for y in 0..height {
                for x in 0..width {
                    if in_subject_region(width, height, x, y) {
                        continue;
                    }
                    // Nearest-neighbor sample from the background.
                    let bx = (u64::from(x) * u64::from(background.width) / u64::from(width)) as u32;
                    let by =
                        (u64::from(y) * u64::from(background.height) / u64::from(height)) as u32;
                    let src = background.pixel_offset(bx, by);
                    let dst = frame.pixel_offset(x, y);
                    out[dst..dst + 4].copy_from_slice(&background.pixels()[src..src + 4]);
                }
            }
            out
        };

        let output = PendingFrame::from_bgra8(composed, width, height)
            .map_err(|e| SkillError::Evaluation(e.to_string()))?
            .with_sequence(frame.sequence);
        binding.set_output_image(output);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, bgra: [u8; 4]) -> PendingFrame {
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for _ in 0..width * height {
            data.extend_from_slice(&bgra);
        }
        PendingFrame::from_bgra8(data, width, height).expect("valid frame")
    }

    async fn cpu_instance() -> Box<dyn SkillInstance> {
        BackgroundReplacementSkill::new()
            .create_instance(&ExecutionDevice::cpu())
            .await
            .expect("cpu instance")
    }

    #[tokio::test]
    async fn outside_pixels_come_from_the_background() {
        let mut instance = cpu_instance().await;
        let mut binding = instance.create_binding();

        // Red subject frame over a blue background of a different size, so
        // the nearest-neighbor path is exercised.
        binding
            .set_auxiliary_image(solid(32, 32, [255, 0, 0, 255]))
            .expect("auxiliary accepted");
        binding.set_input_image(solid(64, 48, [0, 0, 255, 255]));
        instance.evaluate(&mut binding).await.expect("evaluation");

        let output = binding.take_output_image().expect("output frame");
        let corner = output.pixel_offset(1, 1);
        assert_eq!(
            &output.pixels()[corner..corner + 4],
            &[255, 0, 0, 255],
            "corner must sample the blue background"
        );
        let center = output.pixel_offset(32, 26);
        assert_eq!(
            &output.pixels()[center..center + 4],
            &[0, 0, 255, 255],
            "subject center must keep the input pixel"
        );
    }

    #[tokio::test]
    async fn evaluation_fails_without_a_background() {
        let mut instance = cpu_instance().await;
        let mut binding = instance.create_binding();

        binding.set_input_image(solid(16, 16, [0, 0, 0, 255]));
        let err = instance.evaluate(&mut binding).await.unwrap_err();
        assert!(matches!(err, SkillError::Evaluation(_)));
        assert!(
            binding.take_output_image().is_none(),
            "failed evaluation must not leave an output"
        );
    }

    #[tokio::test]
    async fn failed_evaluation_still_consumes_the_input() {
        let mut instance = cpu_instance().await;
        let mut binding = instance.create_binding();

        binding.set_input_image(solid(16, 16, [0, 0, 0, 255]));
        let _ = instance.evaluate(&mut binding).await;
        assert!(
            matches!(binding.begin_evaluation(), Err(SkillError::MissingInput)),
            "input frame must be gone after a failed evaluation"
        );
    }
}

use async_trait::async_trait;

use crate::error::SkillError;
use crate::overlay::NormRect;
use crate::skill::builtin::{mean_luma, require_supported, tile_bounds};
use crate::skill::device::ExecutionDevice;
use crate::skill::results::{SkillResult, FACE_LANDMARKS, FACE_RECTANGLES, NUMBER_OF_FACES};
use crate::skill::runtime::{Skill, SkillBinding, SkillDescriptor, SkillInstance};

const GRID: u32 = 16;
const BRIGHT_TILE_LUMA: f32 = 160.0;

// Landmark positions relative to a face box, in publication order:
// left eye, right eye, nose, mouth left, mouth right.
const LANDMARK_OFFSETS: [(f32, f32); 5] = [
    (0.30, 0.38),
    (0.70, 0.38),
    (0.50, 0.55),
    (0.35, 0.75),
    (0.65, 0.75),
];

/// Face detection: clusters bright tiles on a coarse luma grid and reports
/// one box per cluster, with landmarks at fixed offsets inside each box.
/// Publishes no output image; faces are consumed through named results.
pub struct FaceDetectionSkill {
    descriptor: SkillDescriptor,
}

impl FaceDetectionSkill {
    pub fn new() -> Self {
        Self {
            descriptor: SkillDescriptor {
                name: "face_detection",
                description: "reports face boxes and five landmarks per face",
                version: "1.1.0",
                minimum_api_revision: 1,
                uses_auxiliary_image: false,
            },
        }
    }
}

impl Default for FaceDetectionSkill {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Skill for FaceDetectionSkill {
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
        Ok(Box::new(FaceInstance {
            device: device.clone(),
        }))
    }
}

struct FaceInstance {
    device: ExecutionDevice,
}

#[async_trait]
impl SkillInstance for FaceInstance {
    fn device(&self) -> &ExecutionDevice {
        &self.device
    }

    fn create_binding(&self) -> SkillBinding {
        SkillBinding::new(false)
    }

    async fn evaluate(&mut self, binding: &mut SkillBinding) -> Result<(), SkillError> {
        let frame = binding.begin_evaluation()?;
        let faces = detect_faces(frame.pixels(), frame.width, frame.height);

        let mut rects = Vec::with_capacity(faces.len() * 4);
        let mut landmarks = Vec::with_capacity(faces.len() * 10);
        for face in &faces {
            rects.extend_from_slice(&[face.x, face.y, face.w, face.h]);
            for (ox, oy) in LANDMARK_OFFSETS {
                landmarks.push(face.x + ox * face.w);
                landmarks.push(face.y + oy * face.h);
            }
        }

        binding.insert_result(NUMBER_OF_FACES, SkillResult::Scalar(faces.len() as f32));
        binding.insert_result(FACE_RECTANGLES, SkillResult::Tensor(rects));
        binding.insert_result(FACE_LANDMARKS, SkillResult::Tensor(landmarks));
        Ok(())
    }
}

/// Bright-tile clustering. Tiles whose mean luma crosses the threshold are
/// grouped 4-connected; each group becomes one normalized face box.
fn detect_faces(pixels: &[u8], width: u32, height: u32) -> Vec<NormRect> {
    let grid = GRID.min(width).min(height);
    if grid == 0 {
        return Vec::new();
    }

    let tiles = (grid * grid) as usize;
    let mut bright = vec![false; tiles];
    for ty in 0..grid {
        for tx in 0..grid {
            let (x0, y0, x1, y1) = tile_bounds(width, height, grid, tx, ty);
            bright[(ty * grid + tx) as usize] =
                mean_luma(pixels, width, x0, y0, x1, y1) > BRIGHT_TILE_LUMA;
        }
    }

    let mut visited = vec![false; tiles];
    let mut faces = Vec::new();
    for start in 0..tiles {
        if !bright[start] || visited[start] {
            continue;
        }

        // Flood the cluster, tracking its tile-space bounding box.
        let mut stack = vec![start];
        visited[start] = true;
        let (mut min_tx, mut min_ty) = (grid, grid);
        let (mut max_tx, mut max_ty) = (0, 0);
        while let Some(tile) = stack.pop() {
            let tx = tile as u32 % grid;
            let ty = tile as u32 / grid;
            min_tx = min_tx.min(tx);
            min_ty = min_ty.min(ty);
            max_tx = max_tx.max(tx);
            max_ty = max_ty.max(ty);

            let mut push = |nx: u32, ny: u32| {
                let next = (ny * grid + nx) as usize;
                if bright[next] && !visited[next] {
                    visited[next] = true;
                    stack.push(next);
                }
            };
            if tx > 0 {
                push(tx - 1, ty);
            }
            if tx + 1 < grid {
                push(tx + 1, ty);
            }
            if ty > 0 {
                push(tx, ty - 1);
            }
            if ty + 1 < grid {
                push(tx, ty + 1);
            }
        }

        let (x0, y0, _, _) = tile_bounds(width, height, grid, min_tx, min_ty);
        let (_, _, x1, y1) = tile_bounds(width, height, grid, max_tx, max_ty);
        faces.push(NormRect {
            x: x0 as f32 / width as f32,
            y: y0 as f32 / height as f32,
            w: (x1 - x0) as f32 / width as f32,
            h: (y1 - y0) as f32 / height as f32,
        });
    }
    faces
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PendingFrame;
    use crate::skill::results::{points_from_tensor, rects_from_tensor};

    fn frame_with_squares(squares: &[(u32, u32, u32, u32)]) -> PendingFrame {
        let (width, height) = (160u32, 160u32);
        let mut data = vec![0u8; (width * height * 4) as usize];
        for &(x0, y0, x1, y1) in squares {
            for y in y0..y1 {
                for x in x0..x1 {
                    let off = ((y * width + x) * 4) as usize;
                    data[off..off + 4].copy_from_slice(&[255, 255, 255, 255]);
                }
            }
        }
        PendingFrame::from_bgra8(data, width, height).expect("valid frame")
    }

    async fn evaluate(frame: PendingFrame) -> SkillBinding {
        let skill = FaceDetectionSkill::new();
        let mut instance = skill
            .create_instance(&ExecutionDevice::cpu())
            .await
            .expect("cpu instance");
        let mut binding = instance.create_binding();
        binding.set_input_image(frame);
        instance.evaluate(&mut binding).await.expect("evaluation");
        binding
    }

    #[tokio::test]
    async fn one_bright_square_is_one_face() {
        let binding = evaluate(frame_with_squares(&[(40, 40, 120, 120)])).await;

        let count = binding
            .named_result(NUMBER_OF_FACES)
            .and_then(|r| r.as_scalar())
            .expect("face count");
        assert_eq!(count, 1.0);

        let rects = rects_from_tensor(
            binding
                .named_result(FACE_RECTANGLES)
                .and_then(|r| r.as_tensor())
                .expect("rect tensor"),
        );
        assert_eq!(rects.len(), 1);
        let face = rects[0];
        assert!((face.x - 0.25).abs() < 0.07, "face.x = {}", face.x);
        assert!((face.y - 0.25).abs() < 0.07, "face.y = {}", face.y);
        assert!((face.w - 0.5).abs() < 0.13, "face.w = {}", face.w);
        assert!((face.h - 0.5).abs() < 0.13, "face.h = {}", face.h);
    }

    #[tokio::test]
    async fn landmarks_sit_inside_their_face_box() {
        let binding = evaluate(frame_with_squares(&[(40, 40, 120, 120)])).await;

        let rects = rects_from_tensor(
            binding
                .named_result(FACE_RECTANGLES)
                .and_then(|r| r.as_tensor())
                .expect("rect tensor"),
        );
        let points = points_from_tensor(
            binding
                .named_result(FACE_LANDMARKS)
                .and_then(|r| r.as_tensor())
                .expect("landmark tensor"),
        );
        assert_eq!(points.len(), 5, "five landmarks per face");

        let face = rects[0];
        for point in points {
            assert!(point.x >= face.x && point.x <= face.x + face.w);
            assert!(point.y >= face.y && point.y <= face.y + face.h);
        }
        // Eyes share a row above the nose.
        let eyes_y = {
            let p = points_from_tensor(
                binding
                    .named_result(FACE_LANDMARKS)
                    .and_then(|r| r.as_tensor())
                    .unwrap(),
            );
            assert_eq!(p[0].y, p[1].y);
            p[0].y
        };
        assert!(eyes_y < face.y + 0.55 * face.h);
    }

    #[tokio::test]
    async fn disjoint_squares_are_separate_faces() {
        let binding =
            evaluate(frame_with_squares(&[(10, 10, 50, 50), (100, 100, 150, 150)])).await;

        let count = binding
            .named_result(NUMBER_OF_FACES)
            .and_then(|r| r.as_scalar())
            .expect("face count");
        assert_eq!(count, 2.0);
    }

    #[tokio::test]
    async fn dark_frames_report_zero_faces() {
        let binding = evaluate(frame_with_squares(&[])).await;

        let count = binding
            .named_result(NUMBER_OF_FACES)
            .and_then(|r| r.as_scalar())
            .expect("face count");
        assert_eq!(count, 0.0);
        assert!(
            binding.take_output_image().is_none(),
            "face detection publishes no output image"
        );
    }
}

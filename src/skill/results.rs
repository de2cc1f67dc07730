//! Named evaluation results.
//!
//! Besides an optional output image, an evaluation can publish named
//! values: scalars, booleans and flat tensors. The names the built-in
//! skills publish are fixed constants so consumers never match on loose
//! strings.

use serde::Serialize;

use crate::overlay::{NormPoint, NormRect};

/// Number of faces found, published as a scalar.
pub const NUMBER_OF_FACES: &str = "NumberOfFaces";

/// Face bounding boxes, published as a flat tensor of 4 values per face:
/// x, y, w, h in normalized coordinates.
pub const FACE_RECTANGLES: &str = "FaceRectangles";

/// Face landmarks, published as a flat tensor of 10 values per face, five
/// normalized (x, y) points in order: left eye, right eye, nose, mouth
/// left, mouth right.
pub const FACE_LANDMARKS: &str = "FaceLandmarks";

/// Whether the frame differs enough from the previous one to count as an
/// intruder, published as a boolean.
pub const INTRUDER_DETECTED: &str = "IntruderDetected";

/// Values per face in [`FACE_RECTANGLES`].
pub const RECT_STRIDE: usize = 4;

/// Values per face in [`FACE_LANDMARKS`].
pub const LANDMARK_STRIDE: usize = 10;

/// Value of one named result.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum SkillResult {
    Bool(bool),
    Scalar(f32),
    Tensor(Vec<f32>),
}

impl SkillResult {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SkillResult::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<f32> {
        match self {
            SkillResult::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_tensor(&self) -> Option<&[f32]> {
        match self {
            SkillResult::Tensor(v) => Some(v),
            _ => None,
        }
    }
}

/// Decode a [`FACE_RECTANGLES`] tensor. Trailing values short of a full
/// stride are ignored.
pub fn rects_from_tensor(values: &[f32]) -> Vec<NormRect> {
    values
        .chunks_exact(RECT_STRIDE)
        .map(|c| NormRect {
            x: c[0],
            y: c[1],
            w: c[2],
            h: c[3],
        })
        .collect()
}

/// Decode a [`FACE_LANDMARKS`] tensor into individual points.
pub fn points_from_tensor(values: &[f32]) -> Vec<NormPoint> {
    values
        .chunks_exact(2)
        .map(|c| NormPoint { x: c[0], y: c[1] })
        .collect()
}

//! Overlay geometry for evaluation annotations.
//!
//! Skills report detections in normalized [0, 1] image coordinates; the
//! presentation side draws in pixel space. This module holds the mapping
//! plus the aspect-preserving viewport fit renderers use, and the rules
//! turning named results into drawable annotations.

use serde::Serialize;

/// Normalized radius of a landmark ellipse, relative to frame width.
const LANDMARK_RADIUS: f32 = 0.01;

// ----------------------------------------------------------------------------
// Viewport fitting
// ----------------------------------------------------------------------------

/// Pixel-space viewport annotations are mapped onto.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

/// Fit a frame of the given aspect ratio inside a container, preserving
/// aspect. Wide frames pin the container width, tall frames the height.
pub fn fit_viewport(container_width: f32, container_height: f32, aspect_ratio: f32) -> Viewport {
    if aspect_ratio >= 1.0 {
        Viewport {
            width: container_width,
            height: container_width / aspect_ratio,
        }
    } else {
        Viewport {
            width: container_height * aspect_ratio,
            height: container_height,
        }
    }
}

// ----------------------------------------------------------------------------
// Normalized geometry
// ----------------------------------------------------------------------------

/// Axis-aligned box in normalized image coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct NormRect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl NormRect {
    pub fn full_frame() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            w: 1.0,
            h: 1.0,
        }
    }

    /// Clamp the box into [0, 1] on both axes, shrinking width and height
    /// so the far edge stays inside the frame.
    pub fn clamped(&self) -> Self {
        let x = self.x.clamp(0.0, 1.0);
        let y = self.y.clamp(0.0, 1.0);
        Self {
            x,
            y,
            w: self.w.clamp(0.0, 1.0 - x),
            h: self.h.clamp(0.0, 1.0 - y),
        }
    }

    pub fn to_pixels(&self, viewport: Viewport) -> PixelRect {
        PixelRect {
            x: self.x * viewport.width,
            y: self.y * viewport.height,
            w: self.w * viewport.width,
            h: self.h * viewport.height,
        }
    }
}

/// Point in normalized image coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct NormPoint {
    pub x: f32,
    pub y: f32,
}

impl NormPoint {
    pub fn to_pixels(&self, viewport: Viewport) -> (f32, f32) {
        (self.x * viewport.width, self.y * viewport.height)
    }
}

/// Axis-aligned box in viewport pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PixelRect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

// ----------------------------------------------------------------------------
// Annotations
// ----------------------------------------------------------------------------

/// Stroke color a renderer should use for an annotation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum OverlayColor {
    Lime,
    OrangeRed,
    Yellow,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub enum OverlayShape {
    Rect(NormRect),
    Ellipse {
        center: NormPoint,
        radius_x: f32,
        radius_y: f32,
    },
}

/// One drawable overlay element.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Annotation {
    pub shape: OverlayShape,
    pub color: OverlayColor,
}

/// Face annotations: a lime box per face plus a yellow ellipse per
/// landmark point.
pub fn annotate_faces(rects: &[NormRect], landmarks: &[NormPoint]) -> Vec<Annotation> {
    let mut out = Vec::with_capacity(rects.len() + landmarks.len());
    for rect in rects {
        out.push(Annotation {
            shape: OverlayShape::Rect(rect.clamped()),
            color: OverlayColor::Lime,
        });
    }
    for point in landmarks {
        out.push(Annotation {
            shape: OverlayShape::Ellipse {
                center: *point,
                radius_x: LANDMARK_RADIUS,
                radius_y: LANDMARK_RADIUS,
            },
            color: OverlayColor::Yellow,
        });
    }
    out
}

/// Intruder annotation: one full-frame box, orange-red while an intruder
/// is present, lime otherwise.
pub fn annotate_intruder(detected: bool) -> Vec<Annotation> {
    let color = if detected {
        OverlayColor::OrangeRed
    } else {
        OverlayColor::Lime
    };
    vec![Annotation {
        shape: OverlayShape::Rect(NormRect::full_frame()),
        color,
    }]
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wide_frames_pin_container_width() {
        let vp = fit_viewport(800.0, 600.0, 4.0 / 3.0);
        assert_eq!(vp.width, 800.0);
        assert!((vp.height - 600.0).abs() < 0.01);

        let vp = fit_viewport(800.0, 800.0, 2.0);
        assert_eq!(vp.width, 800.0);
        assert_eq!(vp.height, 400.0);
    }

    #[test]
    fn tall_frames_pin_container_height() {
        let vp = fit_viewport(800.0, 600.0, 0.5);
        assert_eq!(vp.height, 600.0);
        assert_eq!(vp.width, 300.0);
    }

    #[test]
    fn square_frames_count_as_wide() {
        let vp = fit_viewport(500.0, 300.0, 1.0);
        assert_eq!(vp.width, 500.0);
        assert_eq!(vp.height, 500.0);
    }

    #[test]
    fn rect_maps_into_viewport_pixels() {
        let vp = Viewport {
            width: 640.0,
            height: 480.0,
        };
        let rect = NormRect {
            x: 0.25,
            y: 0.5,
            w: 0.5,
            h: 0.25,
        };
        let px = rect.to_pixels(vp);
        assert_eq!(px.x, 160.0);
        assert_eq!(px.y, 240.0);
        assert_eq!(px.w, 320.0);
        assert_eq!(px.h, 120.0);
    }

    #[test]
    fn clamp_shrinks_overhanging_boxes() {
        let rect = NormRect {
            x: 0.8,
            y: -0.1,
            w: 0.5,
            h: 0.3,
        };
        let clamped = rect.clamped();
        assert_eq!(clamped.x, 0.8);
        assert_eq!(clamped.y, 0.0);
        assert!((clamped.w - 0.2).abs() < 1e-6);
        assert!((clamped.h - 0.3).abs() < 1e-6);
    }

    #[test]
    fn intruder_presence_switches_the_frame_color() {
        let quiet = annotate_intruder(false);
        assert_eq!(quiet.len(), 1);
        assert_eq!(quiet[0].color, OverlayColor::Lime);

        let alarmed = annotate_intruder(true);
        assert_eq!(alarmed[0].color, OverlayColor::OrangeRed);
        assert!(matches!(alarmed[0].shape, OverlayShape::Rect(r) if r == NormRect::full_frame()));
    }

    #[test]
    fn face_annotations_pair_boxes_and_landmarks() {
        let rects = [NormRect {
            x: 0.1,
            y: 0.1,
            w: 0.2,
            h: 0.2,
        }];
        let points = [
            NormPoint { x: 0.15, y: 0.15 },
            NormPoint { x: 0.25, y: 0.15 },
        ];
        let out = annotate_faces(&rects, &points);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].color, OverlayColor::Lime);
        assert_eq!(out[1].color, OverlayColor::Yellow);
        assert!(matches!(out[1].shape, OverlayShape::Ellipse { .. }));
    }
}

//! Axis-aligned box geometry.
//!
//! Every box inside the kernel is in canonical corner form `(x1, y1, x2, y2)`
//! in image pixel space. Center+size inputs are converted at the detector
//! boundary via [`BoundingBox::from_center_size`].

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    /// Build a box from corner coordinates. Corners are stored as given so that
    /// inverted boxes stay detectable through [`BoundingBox::is_degenerate`].
    pub fn from_corners(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Build a box from a center point and full width/height.
    pub fn from_center_size(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        let half_w = width / 2.0;
        let half_h = height / 2.0;
        Self {
            x1: cx - half_w,
            y1: cy - half_h,
            x2: cx + half_w,
            y2: cy + half_h,
        }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// Area, clamped to zero for inverted boxes.
    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// Zero-area, inverted, or non-finite boxes.
    pub fn is_degenerate(&self) -> bool {
        let finite = [self.x1, self.y1, self.x2, self.y2]
            .iter()
            .all(|v| v.is_finite());
        !finite || self.width() <= 0.0 || self.height() <= 0.0
    }

    /// Area of the overlap rectangle (zero when the boxes do not touch).
    pub fn intersection(&self, other: &BoundingBox) -> f32 {
        let x_overlap = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let y_overlap = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        x_overlap * y_overlap
    }

    /// Intersection over union in `[0, 1]`.
    ///
    /// Degenerate boxes yield 0 against everything, including themselves.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        if self.is_degenerate() || other.is_degenerate() {
            return 0.0;
        }
        let intersection = self.intersection(other);
        let union = self.area() + other.area() - intersection;
        if union > 0.0 {
            (intersection / union).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn iou_of_identical_box_is_one() {
        let b = BoundingBox::from_corners(10.0, 10.0, 50.0, 30.0);
        assert!(approx(b.iou(&b), 1.0));
    }

    #[test]
    fn iou_is_symmetric_and_bounded() {
        let boxes = [
            BoundingBox::from_corners(0.0, 0.0, 10.0, 10.0),
            BoundingBox::from_corners(5.0, 5.0, 15.0, 15.0),
            BoundingBox::from_corners(20.0, 20.0, 30.0, 25.0),
            BoundingBox::from_corners(2.0, 2.0, 2.0, 8.0),
            BoundingBox::from_corners(9.0, 9.0, 1.0, 1.0),
        ];
        for a in &boxes {
            for b in &boxes {
                let ab = a.iou(b);
                assert!(approx(ab, b.iou(a)));
                assert!((0.0..=1.0).contains(&ab));
            }
        }
    }

    #[test]
    fn disjoint_boxes_have_zero_iou() {
        let a = BoundingBox::from_corners(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::from_corners(10.0, 0.0, 20.0, 10.0);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn partial_overlap_matches_hand_computation() {
        let a = BoundingBox::from_corners(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::from_corners(5.0, 0.0, 15.0, 10.0);
        // 50 / (100 + 100 - 50)
        assert!(approx(a.iou(&b), 1.0 / 3.0));
    }

    #[test]
    fn degenerate_boxes_never_overlap() {
        let zero = BoundingBox::from_corners(5.0, 5.0, 5.0, 5.0);
        let inverted = BoundingBox::from_corners(10.0, 10.0, 0.0, 0.0);
        let nan = BoundingBox::from_corners(f32::NAN, 0.0, 1.0, 1.0);
        let normal = BoundingBox::from_corners(0.0, 0.0, 10.0, 10.0);
        assert!(zero.is_degenerate());
        assert!(inverted.is_degenerate());
        assert!(nan.is_degenerate());
        assert_eq!(zero.iou(&zero), 0.0);
        assert_eq!(inverted.iou(&normal), 0.0);
        assert_eq!(nan.iou(&normal), 0.0);
    }

    #[test]
    fn center_size_converts_to_corners() {
        let b = BoundingBox::from_center_size(100.0, 50.0, 40.0, 20.0);
        assert_eq!(b, BoundingBox::from_corners(80.0, 40.0, 120.0, 60.0));
        assert_eq!(b.center(), (100.0, 50.0));
    }
}

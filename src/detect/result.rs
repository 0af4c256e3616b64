use serde::Serialize;

use crate::geometry::BoundingBox;

/// One observed product instance in one frame.
///
/// Boxes are always in canonical corner form, in source image pixels.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    /// Product identifier (grouping and pricing key).
    pub class: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(class: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            class: class.into(),
            confidence,
            bbox,
        }
    }
}

//! Axis-aligned boxes and overlap.

use serde::{Deserialize, Serialize};

/// An axis-aligned box given by its top-left and bottom-right corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge.
    pub x1: f64,
    /// Top edge.
    pub y1: f64,
    /// Right edge.
    pub x2: f64,
    /// Bottom edge.
    pub y2: f64,
}

impl BoundingBox {
    /// Create a box from corner coordinates.
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// The tightest box around a quadrilateral (or any point set).
    ///
    /// Returns `None` for an empty slice.
    pub fn from_points(points: &[[f64; 2]]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        Some(rest.iter().fold(
            Self::new(first[0], first[1], first[0], first[1]),
            |bbox, point| Self {
                x1: bbox.x1.min(point[0]),
                y1: bbox.y1.min(point[1]),
                x2: bbox.x2.max(point[0]),
                y2: bbox.y2.max(point[1]),
            },
        ))
    }

    /// Width times height, or 0 for a degenerate box.
    pub fn area(&self) -> f64 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    /// The smallest box containing both.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
            x2: self.x2.max(other.x2),
            y2: self.y2.max(other.y2),
        }
    }
}

/// Intersection over union of two boxes.
///
/// 0 when the boxes do not overlap or the union has no area.
///
/// # Example
///
/// ```
/// use markscan::{BoundingBox, iou};
///
/// let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
/// let b = BoundingBox::new(5.0, 0.0, 15.0, 10.0);
/// assert!((iou(&a, &b) - 1.0 / 3.0).abs() < 1e-9);
/// ```
pub fn iou(a: &BoundingBox, b: &BoundingBox) -> f64 {
    let inter_width = a.x2.min(b.x2) - a.x1.max(b.x1);
    let inter_height = a.y2.min(b.y2) - a.y1.max(b.y1);
    if inter_width <= 0.0 || inter_height <= 0.0 {
        return 0.0;
    }

    let intersection = inter_width * inter_height;
    let union = a.area() + b.area() - intersection;
    if union <= 0.0 {
        return 0.0;
    }
    intersection / union
}

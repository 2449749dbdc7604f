//! Frame-space rectangles and scalar interpolation.

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge x-coordinate
    pub x: f64,
    /// Top edge y-coordinate
    pub y: f64,
    /// Box width
    pub width: f64,
    /// Box height
    pub height: f64,
}

impl BoundingBox {
    /// Create a new bounding box.
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Box covering a whole frame.
    pub fn full_frame(frame_width: u32, frame_height: u32) -> Self {
        Self::new(0.0, 0.0, frame_width as f64, frame_height as f64)
    }

    /// Center x-coordinate.
    #[inline]
    pub fn cx(&self) -> f64 {
        self.x + self.width / 2.0
    }

    /// Center y-coordinate.
    #[inline]
    pub fn cy(&self) -> f64 {
        self.y + self.height / 2.0
    }

    /// Right edge x-coordinate.
    #[inline]
    pub fn x2(&self) -> f64 {
        self.x + self.width
    }

    /// Bottom edge y-coordinate.
    #[inline]
    pub fn y2(&self) -> f64 {
        self.y + self.height
    }

    /// Box area in pixels. Degenerate boxes report zero.
    #[inline]
    pub fn area(&self) -> f64 {
        if self.width <= 0.0 || self.height <= 0.0 {
            return 0.0;
        }
        self.width * self.height
    }

    /// Whether the point lies inside the box (edges inclusive).
    pub fn contains(&self, px: f64, py: f64) -> bool {
        px >= self.x && px <= self.x2() && py >= self.y && py <= self.y2()
    }

    /// Grow or shrink the box about its center.
    pub fn scale_about_center(&self, factor: f64) -> BoundingBox {
        let width = self.width * factor;
        let height = self.height * factor;
        BoundingBox {
            x: self.cx() - width / 2.0,
            y: self.cy() - height / 2.0,
            width,
            height,
        }
    }

    /// Intersect the box with the frame. May return an empty box.
    pub fn clamp_to(&self, frame_width: u32, frame_height: u32) -> BoundingBox {
        let x1 = self.x.max(0.0);
        let y1 = self.y.max(0.0);
        let x2 = self.x2().min(frame_width as f64);
        let y2 = self.y2().min(frame_height as f64);

        BoundingBox {
            x: x1,
            y: y1,
            width: (x2 - x1).max(0.0),
            height: (y2 - y1).max(0.0),
        }
    }

    /// Move each component a `factor` of the way toward `target`.
    pub fn lerp_towards(&self, target: &BoundingBox, factor: f64) -> BoundingBox {
        BoundingBox {
            x: lerp(self.x, target.x, factor),
            y: lerp(self.y, target.y, factor),
            width: lerp(self.width, target.width, factor),
            height: lerp(self.height, target.height, factor),
        }
    }

    /// Euclidean distance between the two boxes viewed as 4-vectors.
    pub fn distance(&self, other: &BoundingBox) -> f64 {
        ((self.x - other.x).powi(2)
            + (self.y - other.y).powi(2)
            + (self.width - other.width).powi(2)
            + (self.height - other.height).powi(2))
        .sqrt()
    }
}

/// Intersection-over-Union of two rectangles.
///
/// Returns 0 when the rectangles do not intersect or when either has a
/// non-positive area. Symmetric in its arguments.
pub fn overlap_ratio(a: &BoundingBox, b: &BoundingBox) -> f64 {
    let area_a = a.area();
    let area_b = b.area();
    if area_a <= 0.0 || area_b <= 0.0 {
        return 0.0;
    }

    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = a.x2().min(b.x2());
    let y2 = a.y2().min(b.y2());

    if x2 <= x1 || y2 <= y1 {
        return 0.0;
    }

    let intersection = (x2 - x1) * (y2 - y1);
    let union = area_a + area_b - intersection;

    if union > 0.0 {
        (intersection / union).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Linear interpolation: `current + (target - current) * factor`.
#[inline]
pub fn lerp(current: f64, target: f64, factor: f64) -> f64 {
    current + (target - current) * factor
}

//! Per-instance coverage masks produced by a segmentation model.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::BoundingBox;

/// Errors raised when building a mask from raw parts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MaskError {
    #[error("mask grid is {actual} bytes, expected {expected} for {width}x{height}")]
    SizeMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

/// Serialized form of an [`InstanceMask`]; validated on the way in.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MaskParts {
    id: usize,
    width: u32,
    height: u32,
    alpha: Vec<u8>,
}

/// Coverage grid for one segmented instance.
///
/// `alpha` holds one byte per frame pixel, row-major, where 0 means "not this
/// instance" and 255 means "fully this instance". Segmentation models do not
/// provide stable identities, so `id` is only meaningful within the cycle
/// that produced the mask.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MaskParts", into = "MaskParts")]
pub struct InstanceMask {
    id: usize,
    width: u32,
    height: u32,
    alpha: Vec<u8>,
}

impl TryFrom<MaskParts> for InstanceMask {
    type Error = MaskError;

    fn try_from(parts: MaskParts) -> Result<Self, Self::Error> {
        InstanceMask::new(parts.id, parts.width, parts.height, parts.alpha)
    }
}

impl From<InstanceMask> for MaskParts {
    fn from(mask: InstanceMask) -> Self {
        MaskParts {
            id: mask.id,
            width: mask.width,
            height: mask.height,
            alpha: mask.alpha,
        }
    }
}

impl InstanceMask {
    /// Build a mask, checking that the grid matches the stated resolution.
    pub fn new(id: usize, width: u32, height: u32, alpha: Vec<u8>) -> Result<Self, MaskError> {
        let expected = width as usize * height as usize;
        if alpha.len() != expected {
            return Err(MaskError::SizeMismatch {
                width,
                height,
                expected,
                actual: alpha.len(),
            });
        }
        Ok(Self {
            id,
            width,
            height,
            alpha,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw row-major coverage grid.
    pub fn alpha(&self) -> &[u8] {
        &self.alpha
    }

    /// Whether both masks share a resolution.
    pub fn same_dimensions(&self, other: &InstanceMask) -> bool {
        self.width == other.width && self.height == other.height
    }

    /// Coverage at a frame-space point; zero outside the grid.
    pub fn coverage_at(&self, x: f64, y: f64) -> u8 {
        if x < 0.0 || y < 0.0 {
            return 0;
        }
        let (px, py) = (x.floor() as u64, y.floor() as u64);
        if px >= self.width as u64 || py >= self.height as u64 {
            return 0;
        }
        self.alpha[py as usize * self.width as usize + px as usize]
    }

    /// Whether the point is covered at or above `threshold`.
    pub fn covers(&self, x: f64, y: f64, threshold: u8) -> bool {
        self.coverage_at(x, y) >= threshold
    }

    /// Tight box around every pixel covered at or above `threshold`.
    pub fn bounding_box(&self, threshold: u8) -> Option<BoundingBox> {
        let width = self.width as usize;
        if width == 0 {
            return None;
        }

        let mut min_x = usize::MAX;
        let mut min_y = usize::MAX;
        let mut max_x = 0usize;
        let mut max_y = 0usize;
        let mut any = false;

        for (row_idx, row) in self.alpha.chunks_exact(width).enumerate() {
            for (col_idx, &a) in row.iter().enumerate() {
                if a >= threshold && a > 0 {
                    any = true;
                    min_x = min_x.min(col_idx);
                    max_x = max_x.max(col_idx);
                    min_y = min_y.min(row_idx);
                    max_y = max_y.max(row_idx);
                }
            }
        }

        any.then(|| {
            BoundingBox::new(
                min_x as f64,
                min_y as f64,
                (max_x - min_x + 1) as f64,
                (max_y - min_y + 1) as f64,
            )
        })
    }

    /// Fraction of `previous`'s coverage that this mask still covers:
    /// `sum(min(prev, cur)) / sum(prev)`.
    ///
    /// Masks of different resolutions live in different coordinate spaces and
    /// report zero.
    pub fn overlap_with(&self, previous: &InstanceMask) -> f64 {
        if !self.same_dimensions(previous) {
            return 0.0;
        }

        let (shared, total) = previous
            .alpha
            .iter()
            .zip(&self.alpha)
            .fold((0u64, 0u64), |(shared, total), (&prev, &cur)| {
                (shared + prev.min(cur) as u64, total + prev as u64)
            });

        if total == 0 {
            return 0.0;
        }
        shared as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 10x10 mask with a filled rectangle.
    fn rect_mask(id: usize, x0: usize, y0: usize, w: usize, h: usize, value: u8) -> InstanceMask {
        let mut alpha = vec![0u8; 100];
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                alpha[y * 10 + x] = value;
            }
        }
        InstanceMask::new(id, 10, 10, alpha).unwrap()
    }

    #[test]
    fn test_size_mismatch_rejected() {
        let err = InstanceMask::new(0, 4, 4, vec![0; 15]).unwrap_err();
        assert_eq!(
            err,
            MaskError::SizeMismatch {
                width: 4,
                height: 4,
                expected: 16,
                actual: 15
            }
        );
    }

    #[test]
    fn test_coverage_and_bounds() {
        let mask = rect_mask(0, 2, 3, 4, 5, 200);
        assert_eq!(mask.coverage_at(2.5, 3.5), 200);
        assert_eq!(mask.coverage_at(1.0, 3.0), 0);
        assert_eq!(mask.coverage_at(-1.0, 3.0), 0);
        assert_eq!(mask.coverage_at(50.0, 3.0), 0);
        assert!(mask.covers(3.0, 4.0, 128));
        assert!(!mask.covers(3.0, 4.0, 201));

        let bbox = mask.bounding_box(128).unwrap();
        assert_eq!(bbox, BoundingBox::new(2.0, 3.0, 4.0, 5.0));
        assert!(mask.bounding_box(255).is_none());
    }

    #[test]
    fn test_overlap_with_previous() {
        let prev = rect_mask(0, 0, 0, 4, 4, 255);
        let same = rect_mask(3, 0, 0, 4, 4, 255);
        assert_eq!(same.overlap_with(&prev), 1.0);

        // Shifted by two columns keeps half the previous coverage
        let shifted = rect_mask(1, 2, 0, 4, 4, 255);
        assert!((shifted.overlap_with(&prev) - 0.5).abs() < 1e-9);

        let disjoint = rect_mask(2, 6, 6, 4, 4, 255);
        assert_eq!(disjoint.overlap_with(&prev), 0.0);
    }

    #[test]
    fn test_overlap_resolution_mismatch() {
        let prev = rect_mask(0, 0, 0, 4, 4, 255);
        let other = InstanceMask::new(0, 5, 20, vec![255; 100]).unwrap();
        assert_eq!(other.overlap_with(&prev), 0.0);
    }

    #[test]
    fn test_deserialize_validates() {
        let bad = r#"{"id":0,"width":2,"height":2,"alpha":[0,1,2]}"#;
        assert!(serde_json::from_str::<InstanceMask>(bad).is_err());

        let good = r#"{"id":0,"width":2,"height":2,"alpha":[0,1,2,3]}"#;
        let mask: InstanceMask = serde_json::from_str(good).unwrap();
        assert_eq!(mask.coverage_at(1.0, 1.0), 3);
    }
}

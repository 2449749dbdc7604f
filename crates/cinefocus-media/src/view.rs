//! Zoom/pan view transform between frame space and display space.
//!
//! Forward: scale about the frame centre, then translate by `-pan`:
//! `display = (frame - pan) * zoom + centre`.
//! Inverse: `frame = (display - centre) / zoom + pan`.

use serde::{Deserialize, Serialize};

const IDENTITY_EPSILON: f64 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewTransform {
    pub zoom: f64,
    pub pan_x: f64,
    pub pan_y: f64,
    pub center_x: f64,
    pub center_y: f64,
}

impl ViewTransform {
    /// No zoom, panned to the frame centre.
    pub fn identity(frame_width: u32, frame_height: u32) -> Self {
        let center_x = frame_width as f64 / 2.0;
        let center_y = frame_height as f64 / 2.0;
        Self {
            zoom: 1.0,
            pan_x: center_x,
            pan_y: center_y,
            center_x,
            center_y,
        }
    }

    /// Frame-space point to display-space point.
    pub fn to_display(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.pan_x) * self.zoom + self.center_x,
            (y - self.pan_y) * self.zoom + self.center_y,
        )
    }

    /// Display-space point back to frame space. Callers must already have
    /// converted from CSS/window units into backing-store pixels.
    pub fn to_frame(&self, display_x: f64, display_y: f64) -> (f64, f64) {
        let zoom = self.zoom.max(f64::EPSILON);
        (
            (display_x - self.center_x) / zoom + self.pan_x,
            (display_y - self.center_y) / zoom + self.pan_y,
        )
    }

    /// Close enough to identity that resampling would be wasted work.
    pub fn is_identity(&self) -> bool {
        (self.zoom - 1.0).abs() < IDENTITY_EPSILON
            && (self.pan_x - self.center_x).abs() < IDENTITY_EPSILON
            && (self.pan_y - self.center_y).abs() < IDENTITY_EPSILON
    }

    /// Row-major 3x3 homogeneous matrix of the forward transform.
    pub fn matrix(&self) -> [f32; 9] {
        let z = self.zoom;
        [
            z as f32,
            0.0,
            (self.center_x - z * self.pan_x) as f32,
            0.0,
            z as f32,
            (self.center_y - z * self.pan_y) as f32,
            0.0,
            0.0,
            1.0,
        ]
    }
}

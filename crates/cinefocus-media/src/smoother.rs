//! Per-frame exponential smoothing of focus geometry and camera motion.
//!
//! Detection lands every few frames and its boxes jitter; rendering happens
//! every frame. The smoother bridges the two by moving each value a fixed
//! fraction toward its target once per rendered frame:
//! - **Focus**: box, blend and scale at `focus_rate`
//! - **Camera**: zoom and pan at `camera_rate`, independent of focus so the
//!   fade and the camera move are separate animations
//!
//! Nothing ever jumps. The one exception is the focus box on a fresh lock,
//! which is placed on the target while the blend is still effectively zero,
//! where the placement cannot be seen.

use cinefocus_models::{lerp, BoundingBox};
use serde::{Deserialize, Serialize};

use crate::config::SmoothingConfig;
use crate::view::ViewTransform;

/// Blend below which the focus layer is invisible.
const INVISIBLE_BLEND: f64 = 0.01;

/// Interpolated values the compositor paints from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SmoothedGeometry {
    /// Sharp region before scaling
    pub focus_box: BoundingBox,
    /// Strength of the focus effect, 0-1
    pub focus_blend: f64,
    /// Expansion of the sharp region about its centre
    pub focus_scale: f64,
    /// Digital zoom, >= 1
    pub zoom: f64,
    pub pan_x: f64,
    pub pan_y: f64,
}

impl SmoothedGeometry {
    /// No focus, no zoom, panned to the frame centre.
    pub fn identity(frame_width: u32, frame_height: u32, rest_scale: f64) -> Self {
        Self {
            focus_box: BoundingBox::full_frame(frame_width, frame_height),
            focus_blend: 0.0,
            focus_scale: rest_scale,
            zoom: 1.0,
            pan_x: frame_width as f64 / 2.0,
            pan_y: frame_height as f64 / 2.0,
        }
    }

    /// Focus box after applying `focus_scale`.
    pub fn scaled_focus_box(&self) -> BoundingBox {
        self.focus_box.scale_about_center(self.focus_scale)
    }
}

/// Owner of [`SmoothedGeometry`]; the only thing that mutates it.
#[derive(Debug, Clone)]
pub struct TemporalSmoother {
    config: SmoothingConfig,
    frame_width: u32,
    frame_height: u32,
    geometry: SmoothedGeometry,
}

impl TemporalSmoother {
    pub fn new(config: SmoothingConfig, frame_width: u32, frame_height: u32) -> Self {
        let geometry = SmoothedGeometry::identity(frame_width, frame_height, config.focus_scale_rest);
        Self {
            config,
            frame_width,
            frame_height,
            geometry,
        }
    }

    pub fn geometry(&self) -> &SmoothedGeometry {
        &self.geometry
    }

    pub fn frame_dimensions(&self) -> (u32, u32) {
        (self.frame_width, self.frame_height)
    }

    pub fn set_auto_zoom(&mut self, enabled: bool) {
        self.config.auto_zoom = enabled;
    }

    /// Re-base on new frame dimensions. Old coordinates mean nothing in the
    /// new space, so this is a deliberate reset rather than an animation.
    pub fn reset(&mut self, frame_width: u32, frame_height: u32) {
        self.frame_width = frame_width;
        self.frame_height = frame_height;
        self.geometry =
            SmoothedGeometry::identity(frame_width, frame_height, self.config.focus_scale_rest);
    }

    /// Advance one rendered frame toward `target` (the selection's box, or
    /// `None` with no selection).
    pub fn advance(&mut self, target: Option<BoundingBox>) -> SmoothedGeometry {
        let focus_rate = self.config.focus_rate;
        let camera_rate = self.config.camera_rate;
        let g = &mut self.geometry;

        match target {
            Some(target) => {
                g.focus_box = if g.focus_blend < INVISIBLE_BLEND {
                    target
                } else {
                    g.focus_box.lerp_towards(&target, focus_rate)
                };
                g.focus_blend = lerp(g.focus_blend, 1.0, focus_rate);
                g.focus_scale = lerp(g.focus_scale, self.config.focus_scale_locked, focus_rate);
            }
            None => {
                // Focus box stays put while it fades out
                g.focus_blend = lerp(g.focus_blend, 0.0, focus_rate);
                g.focus_scale = lerp(g.focus_scale, self.config.focus_scale_rest, focus_rate);
            }
        }

        let (zoom, pan_x, pan_y) = self.camera_target(target);
        let g = &mut self.geometry;
        g.zoom = lerp(g.zoom, zoom, camera_rate);
        g.pan_x = lerp(g.pan_x, pan_x, camera_rate);
        g.pan_y = lerp(g.pan_y, pan_y, camera_rate);

        *g
    }

    /// Where the camera wants to be for a given focus target.
    ///
    /// With auto-zoom on, the subject is framed to fill `subject_fill` of the
    /// frame height, and the pan is held back so the zoomed viewport never
    /// leaves the frame.
    pub fn camera_target(&self, target: Option<BoundingBox>) -> (f64, f64, f64) {
        let width = self.frame_width as f64;
        let height = self.frame_height as f64;
        let centre = (1.0, width / 2.0, height / 2.0);

        let Some(target) = target.filter(|_| self.config.auto_zoom) else {
            return centre;
        };
        if target.height < 1.0 {
            return centre;
        }

        let zoom = (height * self.config.subject_fill / target.height)
            .clamp(1.0, self.config.max_zoom.max(1.0));
        let half_w = width / (2.0 * zoom);
        let half_h = height / (2.0 * zoom);

        (
            zoom,
            target.cx().clamp(half_w, width - half_w),
            target.cy().clamp(half_h, height - half_h),
        )
    }

    /// View transform matching the current zoom and pan.
    pub fn view_transform(&self) -> ViewTransform {
        ViewTransform {
            zoom: self.geometry.zoom,
            pan_x: self.geometry.pan_x,
            pan_y: self.geometry.pan_y,
            center_x: self.frame_width as f64 / 2.0,
            center_y: self.frame_height as f64 / 2.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn smoother(auto_zoom: bool) -> TemporalSmoother {
        let config = SmoothingConfig {
            auto_zoom,
            ..SmoothingConfig::default()
        };
        TemporalSmoother::new(config, 640, 480)
    }

    #[test]
    fn test_first_lock_places_box_invisibly() {
        let mut s = smoother(false);
        let target = BoundingBox::new(100.0, 100.0, 50.0, 80.0);
        let g = s.advance(Some(target));
        assert_eq!(g.focus_box, target);
        assert!(g.focus_blend > 0.0 && g.focus_blend < 0.2);
    }

    #[test]
    fn test_focus_box_converges_monotonically() {
        let mut s = smoother(false);
        let start = BoundingBox::new(100.0, 100.0, 50.0, 80.0);
        for _ in 0..60 {
            s.advance(Some(start));
        }

        let target = BoundingBox::new(300.0, 200.0, 120.0, 60.0);
        let mut previous = s.geometry().focus_box.distance(&target);
        for step in 0..50 {
            let g = s.advance(Some(target));
            let distance = g.focus_box.distance(&target);
            assert!(
                distance < previous,
                "step {step}: {distance} did not shrink from {previous}"
            );
            previous = distance;
        }
        assert!(previous < 0.1, "still {previous} away after 50 steps");
    }

    #[test]
    fn test_blend_and_scale_fade() {
        let mut s = smoother(false);
        let target = BoundingBox::new(10.0, 10.0, 40.0, 40.0);
        let mut last_blend = 0.0;
        for _ in 0..40 {
            let g = s.advance(Some(target));
            assert!(g.focus_blend > last_blend);
            last_blend = g.focus_blend;
        }
        assert!(last_blend > 0.99);
        assert!((s.geometry().focus_scale - 1.08).abs() < 0.01);

        for _ in 0..40 {
            let g = s.advance(None);
            assert!(g.focus_blend < last_blend);
            last_blend = g.focus_blend;
        }
        assert!(last_blend < 0.01);
        assert!((s.geometry().focus_scale - 0.85).abs() < 0.01);
    }

    #[test]
    fn test_no_zoom_without_auto_zoom() {
        let mut s = smoother(false);
        let target = BoundingBox::new(10.0, 10.0, 40.0, 40.0);
        for _ in 0..100 {
            s.advance(Some(target));
        }
        let g = s.geometry();
        assert!((g.zoom - 1.0).abs() < 1e-9);
        assert!((g.pan_x - 320.0).abs() < 1e-9);
        assert!(s.view_transform().is_identity());
    }

    #[test]
    fn test_auto_zoom_frames_subject() {
        let s = smoother(true);
        // 480 * 0.6 / 96 = 3.0, clamped to 2.5
        let (zoom, pan_x, pan_y) = s.camera_target(Some(BoundingBox::new(300.0, 200.0, 40.0, 96.0)));
        assert_eq!(zoom, 2.5);
        assert_eq!((pan_x, pan_y), (320.0, 248.0));

        // Subject in the corner: pan held so the viewport stays in frame
        let (zoom, pan_x, pan_y) = s.camera_target(Some(BoundingBox::new(0.0, 0.0, 20.0, 144.0)));
        assert_eq!(zoom, 2.0);
        assert_eq!((pan_x, pan_y), (160.0, 120.0));
    }

    #[test]
    fn test_camera_eases_back_after_release() {
        let mut s = smoother(true);
        let target = BoundingBox::new(300.0, 200.0, 40.0, 96.0);
        for _ in 0..120 {
            s.advance(Some(target));
        }
        assert!(s.geometry().zoom > 2.4);

        let mut last_zoom = s.geometry().zoom;
        for _ in 0..200 {
            let g = s.advance(None);
            assert!(g.zoom <= last_zoom);
            last_zoom = g.zoom;
        }
        assert!((last_zoom - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_reset_rebases_dimensions() {
        let mut s = smoother(true);
        s.advance(Some(BoundingBox::new(0.0, 0.0, 10.0, 10.0)));
        s.reset(1280, 720);
        let g = s.geometry();
        assert_eq!(g.focus_blend, 0.0);
        assert_eq!((g.pan_x, g.pan_y), (640.0, 360.0));
        assert_eq!(s.frame_dimensions(), (1280, 720));
    }
}

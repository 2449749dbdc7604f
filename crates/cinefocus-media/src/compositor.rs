//! Per-frame compositing of the cinematic focus effect.
//!
//! Layers, bottom to top, all in frame space:
//! 1. background: the frame blurred and dimmed in proportion to the blend
//! 2. sharp subject: the untouched frame inside the focus region, or mixed
//!    through the selected mask's coverage in mask mode
//! 3. overlays: candidate boxes, the locked box and the seeking brackets
//!
//! The zoom/pan view is applied last as a single warp over the result.
//! Text is not rasterised; labels are returned with display-space anchors
//! for the host UI to draw.

use cinefocus_models::{BoundingBox, Detection, InstanceMask};
use image::{imageops, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::geometric_transformations::{warp, Interpolation, Projection};
use imageproc::rect::Rect;
use serde::Serialize;
use tracing::debug;

use crate::config::CompositeConfig;
use crate::smoother::SmoothedGeometry;
use crate::tracking::{Selection, TrackingState};
use crate::view::ViewTransform;

/// Blend below which the focus effect is skipped entirely.
const MIN_VISIBLE_BLEND: f64 = 0.001;
/// Blur sigma below which blurring is a no-op in practice.
const MIN_BLUR_SIGMA: f32 = 0.05;

const DASH_ON: f32 = 6.0;
const DASH_OFF: f32 = 4.0;

/// Text the host UI should draw next to a box.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayLabel {
    pub text: String,
    /// Display-space anchor (top-left of the box)
    pub x: f64,
    pub y: f64,
    /// Whether this labels the locked subject
    pub locked: bool,
}

/// One composed output frame.
#[derive(Debug, Clone)]
pub struct CompositeFrame {
    pub image: RgbImage,
    pub labels: Vec<OverlayLabel>,
    /// View the image was rendered with, for mapping pointer input back
    pub view: ViewTransform,
    pub frame_number: u64,
}

/// Stateless painter of [`CompositeFrame`]s.
#[derive(Debug, Clone, Default)]
pub struct Compositor {
    config: CompositeConfig,
}

impl Compositor {
    pub fn new(config: CompositeConfig) -> Self {
        Self { config }
    }

    /// Compose one output frame.
    pub fn compose(
        &self,
        frame: &RgbImage,
        geometry: &SmoothedGeometry,
        view: &ViewTransform,
        state: &TrackingState,
        detections: &[Detection],
        frame_number: u64,
    ) -> CompositeFrame {
        let selection = state.selection();
        let blend = geometry.focus_blend.clamp(0.0, 1.0);

        let mut canvas = if blend > MIN_VISIBLE_BLEND {
            let mut canvas = self.background(frame, blend as f32);
            match selection.and_then(Selection::mask) {
                Some(mask) if mask.width() == frame.width() && mask.height() == frame.height() => {
                    mix_through_mask(&mut canvas, frame, mask);
                }
                _ => paste_region(&mut canvas, frame, &geometry.scaled_focus_box()),
            }
            canvas
        } else {
            frame.clone()
        };

        let mut labels = Vec::new();
        if self.config.show_overlays {
            self.draw_candidates(&mut canvas, selection, detections, &mut labels);
            if let Some(selection) = selection {
                self.draw_locked(&mut canvas, selection, &geometry.focus_box, &mut labels);
            }
            if state.is_reacquiring() {
                self.draw_seeking(&mut canvas, &geometry.scaled_focus_box(), frame_number);
            }
        }

        if !view.is_identity() {
            match Projection::from_matrix(view.matrix()) {
                Some(projection) => {
                    canvas = warp(&canvas, &projection, Interpolation::Bilinear, Rgb([0, 0, 0]));
                }
                None => debug!(zoom = view.zoom, "View transform not invertible, skipping warp"),
            }
            for label in &mut labels {
                let (x, y) = view.to_display(label.x, label.y);
                label.x = x;
                label.y = y;
            }
        }

        CompositeFrame {
            image: canvas,
            labels,
            view: *view,
            frame_number,
        }
    }

    fn background(&self, frame: &RgbImage, blend: f32) -> RgbImage {
        let sigma = self.config.max_blur_sigma * blend;
        let mut background = if sigma > MIN_BLUR_SIGMA {
            imageops::blur(frame, sigma)
        } else {
            frame.clone()
        };

        let dim = 1.0 - self.config.max_dim * blend;
        if dim < 1.0 {
            for pixel in background.pixels_mut() {
                for channel in pixel.0.iter_mut() {
                    *channel = (*channel as f32 * dim).round() as u8;
                }
            }
        }
        background
    }

    fn draw_candidates(
        &self,
        canvas: &mut RgbImage,
        selection: Option<&Selection>,
        detections: &[Detection],
        labels: &mut Vec<OverlayLabel>,
    ) {
        let selected = selection.and_then(Selection::detection);
        let color = Rgb(self.config.candidate_color);

        for detection in detections.iter().filter(|d| Some(*d) != selected) {
            draw_dashed_rect(canvas, &detection.bbox, color);
            labels.push(OverlayLabel {
                text: label_text(&detection.label, detection.confidence),
                x: detection.bbox.x,
                y: detection.bbox.y,
                locked: false,
            });
        }
    }

    fn draw_locked(
        &self,
        canvas: &mut RgbImage,
        selection: &Selection,
        focus_box: &BoundingBox,
        labels: &mut Vec<OverlayLabel>,
    ) {
        if let Some(rect) = to_rect(focus_box) {
            draw_hollow_rect_mut(canvas, rect, Rgb(self.config.locked_color));
        }
        labels.push(OverlayLabel {
            text: label_text(selection.label().unwrap_or("subject"), selection.confidence()),
            x: focus_box.x,
            y: focus_box.y,
            locked: true,
        });
    }

    /// Corner brackets around the last known region, breathing with the
    /// frame counter so a stalled subject still reads as "searching".
    fn draw_seeking(&self, canvas: &mut RgbImage, region: &BoundingBox, frame_number: u64) {
        if region.area() <= 0.0 {
            return;
        }
        let color = Rgb(self.config.seeking_color);
        let pulse = ((frame_number as f64 * 0.3).sin() + 1.0) / 2.0;
        let pad = 4.0 + 6.0 * pulse;
        let arm = (region.width.min(region.height) * 0.25).max(4.0) as f32;

        let x1 = (region.x - pad) as f32;
        let y1 = (region.y - pad) as f32;
        let x2 = (region.x2() + pad) as f32;
        let y2 = (region.y2() + pad) as f32;

        for (cx, cy, dx, dy) in [
            (x1, y1, arm, arm),
            (x2, y1, -arm, arm),
            (x1, y2, arm, -arm),
            (x2, y2, -arm, -arm),
        ] {
            draw_line_segment_mut(canvas, (cx, cy), (cx + dx, cy), color);
            draw_line_segment_mut(canvas, (cx, cy), (cx, cy + dy), color);
        }
    }
}

fn label_text(label: &str, confidence: f64) -> String {
    format!("{} {:.0}%", label, (confidence * 100.0).clamp(0.0, 100.0))
}

/// Whole-pixel bounds of a box clamped to the image, if non-empty.
fn pixel_bounds(bbox: &BoundingBox, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    let clamped = bbox.clamp_to(width, height);
    let x0 = clamped.x.floor() as u32;
    let y0 = clamped.y.floor() as u32;
    let x1 = (clamped.x2().ceil() as u32).min(width);
    let y1 = (clamped.y2().ceil() as u32).min(height);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some((x0, y0, x1 - x0, y1 - y0))
}

fn to_rect(bbox: &BoundingBox) -> Option<Rect> {
    let width = bbox.width.round();
    let height = bbox.height.round();
    if width < 1.0 || height < 1.0 {
        return None;
    }
    Some(Rect::at(bbox.x.round() as i32, bbox.y.round() as i32).of_size(width as u32, height as u32))
}

/// Copy the frame's pixels inside `region` onto the canvas.
fn paste_region(canvas: &mut RgbImage, frame: &RgbImage, region: &BoundingBox) {
    let Some((x, y, w, h)) = pixel_bounds(region, frame.width(), frame.height()) else {
        return;
    };
    let sharp = imageops::crop_imm(frame, x, y, w, h).to_image();
    imageops::replace(canvas, &sharp, x as i64, y as i64);
}

/// Mix frame over canvas by the mask's per-pixel coverage.
fn mix_through_mask(canvas: &mut RgbImage, frame: &RgbImage, mask: &InstanceMask) {
    let alpha = mask.alpha();
    for ((out, src), &a) in canvas.pixels_mut().zip(frame.pixels()).zip(alpha) {
        if a == 0 {
            continue;
        }
        let t = a as f32 / 255.0;
        for (o, s) in out.0.iter_mut().zip(src.0) {
            *o = (*o as f32 + (s as f32 - *o as f32) * t).round() as u8;
        }
    }
}

fn draw_dashed_rect(canvas: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>) {
    if bbox.area() <= 0.0 {
        return;
    }
    let (x1, y1) = (bbox.x as f32, bbox.y as f32);
    let (x2, y2) = (bbox.x2() as f32, bbox.y2() as f32);
    for (start, end) in [
        ((x1, y1), (x2, y1)),
        ((x2, y1), (x2, y2)),
        ((x2, y2), (x1, y2)),
        ((x1, y2), (x1, y1)),
    ] {
        draw_dashed_line(canvas, start, end, color);
    }
}

fn draw_dashed_line(canvas: &mut RgbImage, start: (f32, f32), end: (f32, f32), color: Rgb<u8>) {
    let (dx, dy) = (end.0 - start.0, end.1 - start.1);
    let length = (dx * dx + dy * dy).sqrt();
    if length < 1.0 {
        return;
    }
    let (ux, uy) = (dx / length, dy / length);

    let mut along = 0.0;
    while along < length {
        let stop = (along + DASH_ON).min(length);
        draw_line_segment_mut(
            canvas,
            (start.0 + ux * along, start.1 + uy * along),
            (start.0 + ux * stop, start.1 + uy * stop),
            color,
        );
        along += DASH_ON + DASH_OFF;
    }
}

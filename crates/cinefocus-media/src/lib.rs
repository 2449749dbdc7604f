#![deny(unreachable_patterns)]
//! Cinematic focus engine.
//!
//! This crate provides:
//! - Source traits for frames, object detection and instance segmentation
//! - Single-subject tracking across detection cycles (box IoU or mask overlap)
//! - Temporal smoothing of focus geometry, zoom and pan
//! - Compositing of the blurred/dimmed background, sharp subject and overlays
//! - A render loop driver that interleaves throttled async inference with
//!   per-frame rendering, discarding results from stale streams

pub mod compositor;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod inference;
pub mod render_loop;
pub mod smoother;
pub mod source;
pub mod tracking;
pub mod view;

pub use compositor::{CompositeFrame, Compositor, OverlayLabel};
pub use config::{CadenceConfig, CompositeConfig, FocusConfig, SmoothingConfig, TrackingConfig};
pub use diagnostics::{Diagnostics, DiagnosticsSnapshot};
pub use error::{MediaError, MediaResult};
pub use inference::{InferenceOutcome, InferenceSlot};
pub use render_loop::RenderLoop;
pub use smoother::{SmoothedGeometry, TemporalSmoother};
pub use source::{DetectionSource, Frame, FrameSource, SegmentationSource, StillFrameSource};
pub use tracking::{
    BoxSelection, MaskSelection, Selection, TrackingEvent, TrackingMode, TrackingSession,
    TrackingState,
};
pub use view::ViewTransform;

//! Interfaces to the collaborators the engine consumes but does not own.
//!
//! Camera access, file decoding and the neural models themselves live
//! outside this crate. The engine only sees:
//! - a [`FrameSource`] yielding decoded RGB frames,
//! - a [`DetectionSource`] turning a frame into labelled boxes,
//! - an optional [`SegmentationSource`] turning a frame into coverage masks.

use std::sync::Arc;

use async_trait::async_trait;
use cinefocus_models::{Detection, InstanceMask};
use image::RgbImage;

use crate::error::MediaResult;

/// A decoded frame shared between the render step and in-flight inference.
pub type Frame = Arc<RgbImage>;

/// Source of decoded video frames.
///
/// Implementations are polled once per displayed frame. Returning `None`, or
/// a frame with zero dimensions, means "not ready yet" and is not an error.
pub trait FrameSource {
    /// The most recent decoded frame, if one is available.
    fn current_frame(&mut self) -> Option<Frame>;

    /// Native resolution of the stream; `(0, 0)` until known.
    fn native_dimensions(&self) -> (u32, u32);
}

/// Object detection provider.
///
/// The engine never calls `detect` again while a previous call is
/// outstanding, so implementations need not be re-entrant.
#[async_trait]
pub trait DetectionSource: Send + Sync {
    /// Detect objects in a frame. Boxes are in frame pixel coordinates.
    async fn detect(&self, frame: Frame) -> MediaResult<Vec<Detection>>;

    /// Provider name for logging.
    fn name(&self) -> &'static str;
}

/// Instance segmentation provider.
///
/// Same concurrency contract as [`DetectionSource`]. Masks must have the
/// frame's resolution.
#[async_trait]
pub trait SegmentationSource: Send + Sync {
    /// Segment a frame into per-instance coverage masks.
    async fn segment(&self, frame: Frame) -> MediaResult<Vec<InstanceMask>>;

    /// Provider name for logging.
    fn name(&self) -> &'static str;
}

/// Frame source over a fixed, in-memory frame.
///
/// Useful for still-image previews and tests.
#[derive(Debug, Clone, Default)]
pub struct StillFrameSource {
    frame: Option<Frame>,
}

impl StillFrameSource {
    pub fn new(frame: RgbImage) -> Self {
        Self {
            frame: Some(Arc::new(frame)),
        }
    }

    /// A source that never produces a frame.
    pub fn empty() -> Self {
        Self { frame: None }
    }

    /// Swap in a different frame, e.g. to simulate a resolution change.
    pub fn replace(&mut self, frame: RgbImage) {
        self.frame = Some(Arc::new(frame));
    }
}

impl FrameSource for StillFrameSource {
    fn current_frame(&mut self) -> Option<Frame> {
        self.frame.clone()
    }

    fn native_dimensions(&self) -> (u32, u32) {
        self.frame
            .as_ref()
            .map(|f| f.dimensions())
            .unwrap_or((0, 0))
    }
}

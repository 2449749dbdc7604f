//! Shared data models for the cinematic focus engine.
//!
//! This crate provides Serde-serializable value types for:
//! - Frame-space rectangles and the geometry helpers built on them
//! - Object detections produced by a detection model
//! - Per-instance coverage masks produced by a segmentation model
//!
//! Everything here is an immutable value type. Lists produced by a model are
//! replaced wholesale each inference cycle; nothing is mutated in place.

pub mod detection;
pub mod geometry;
pub mod mask;

pub use detection::Detection;
pub use geometry::{lerp, overlap_ratio, BoundingBox};
pub use mask::{InstanceMask, MaskError};

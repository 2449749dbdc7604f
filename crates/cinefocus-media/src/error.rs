//! Error types for the focus engine.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for engine operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while tracking and compositing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Detection failed: {0}")]
    DetectionFailed(String),

    #[error("Segmentation failed: {0}")]
    SegmentationFailed(String),

    #[error("No async runtime available to run inference")]
    NoRuntime,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl MediaError {
    /// Create a detection failure error.
    pub fn detection_failed(message: impl Into<String>) -> Self {
        Self::DetectionFailed(message.into())
    }

    /// Create a segmentation failure error.
    pub fn segmentation_failed(message: impl Into<String>) -> Self {
        Self::SegmentationFailed(message.into())
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

//! Configuration for the focus engine.
//!
//! Thresholds vary a lot between footage types, so everything that shapes
//! tracking, smoothing, inference cadence and compositing is tunable here
//! rather than baked in as constants.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{MediaError, MediaResult};

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FocusConfig {
    pub tracking: TrackingConfig,
    pub smoothing: SmoothingConfig,
    pub cadence: CadenceConfig,
    pub composite: CompositeConfig,
}

/// Identity association and reacquisition thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Minimum IoU for a same-label detection to continue the track (default: 0.3)
    pub acceptance_iou: f64,

    /// Consecutive misses before entering reacquisition (default: 3)
    pub reacquire_after: u32,

    /// Consecutive misses before the selection is dropped (default: 60)
    pub give_up_after: u32,

    /// Minimum mask overlap to continue a mask track (default: 0.25)
    pub mask_overlap_threshold: f64,

    /// Coverage a mask pixel needs to count as "hit" by a click (default: 128)
    pub mask_alpha_threshold: u8,

    /// Detections below this confidence are discarded on arrival (default: 0.5)
    pub min_confidence: f64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            acceptance_iou: 0.3,
            reacquire_after: 3,
            give_up_after: 60,
            mask_overlap_threshold: 0.25,
            mask_alpha_threshold: 128,
            min_confidence: 0.5,
        }
    }
}

/// Per-frame exponential smoothing rates and zoom framing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    /// Lerp factor for focus box, blend and scale per frame (default: 0.15)
    pub focus_rate: f64,

    /// Lerp factor for zoom and pan per frame (default: 0.08)
    pub camera_rate: f64,

    /// Focus scale with no selection (default: 0.85)
    pub focus_scale_rest: f64,

    /// Focus scale once locked; >1 pads the sharp region (default: 1.08)
    pub focus_scale_locked: f64,

    /// Zoom and pan toward the locked subject (default: false)
    pub auto_zoom: bool,

    /// Fraction of frame height the subject should fill when zoomed (default: 0.6)
    pub subject_fill: f64,

    /// Maximum digital zoom factor (default: 2.5)
    pub max_zoom: f64,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            focus_rate: 0.15,
            camera_rate: 0.08,
            focus_scale_rest: 0.85,
            focus_scale_locked: 1.08,
            auto_zoom: false,
            subject_fill: 0.6,
            max_zoom: 2.5,
        }
    }
}

/// How often inference is launched, in rendered frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CadenceConfig {
    /// Detection interval while idle or locked (default: 10)
    pub detect_every: u64,

    /// Detection interval while reacquiring (default: 3)
    pub reacquire_detect_every: u64,

    /// Segmentation interval (default: 10)
    pub segment_every: u64,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            detect_every: 10,
            reacquire_detect_every: 3,
            segment_every: 10,
        }
    }
}

/// Look of the composited output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeConfig {
    /// Gaussian sigma of the background blur at full focus (default: 8.0)
    pub max_blur_sigma: f32,

    /// Background darkening at full focus, 0-1 (default: 0.45)
    pub max_dim: f32,

    /// Draw detection boxes and the seeking indicator (default: true)
    pub show_overlays: bool,

    /// Stroke colour for the locked subject
    pub locked_color: [u8; 3],

    /// Stroke colour for other detections
    pub candidate_color: [u8; 3],

    /// Colour of the seeking indicator
    pub seeking_color: [u8; 3],
}

impl Default for CompositeConfig {
    fn default() -> Self {
        Self {
            max_blur_sigma: 8.0,
            max_dim: 0.45,
            show_overlays: true,
            locked_color: [255, 196, 0],
            candidate_color: [220, 220, 220],
            seeking_color: [255, 96, 64],
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl FocusConfig {
    /// Create config from `CINEFOCUS_*` environment variables, falling back
    /// to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let d = FocusConfig::default();
        Self {
            tracking: TrackingConfig {
                acceptance_iou: env_or("CINEFOCUS_ACCEPTANCE_IOU", d.tracking.acceptance_iou),
                reacquire_after: env_or("CINEFOCUS_REACQUIRE_AFTER", d.tracking.reacquire_after),
                give_up_after: env_or("CINEFOCUS_GIVE_UP_AFTER", d.tracking.give_up_after),
                mask_overlap_threshold: env_or(
                    "CINEFOCUS_MASK_OVERLAP",
                    d.tracking.mask_overlap_threshold,
                ),
                mask_alpha_threshold: env_or(
                    "CINEFOCUS_MASK_ALPHA",
                    d.tracking.mask_alpha_threshold,
                ),
                min_confidence: env_or("CINEFOCUS_MIN_CONFIDENCE", d.tracking.min_confidence),
            },
            smoothing: SmoothingConfig {
                focus_rate: env_or("CINEFOCUS_FOCUS_RATE", d.smoothing.focus_rate),
                camera_rate: env_or("CINEFOCUS_CAMERA_RATE", d.smoothing.camera_rate),
                auto_zoom: env_or("CINEFOCUS_AUTO_ZOOM", d.smoothing.auto_zoom),
                max_zoom: env_or("CINEFOCUS_MAX_ZOOM", d.smoothing.max_zoom),
                ..d.smoothing
            },
            cadence: CadenceConfig {
                detect_every: env_or("CINEFOCUS_DETECT_EVERY", d.cadence.detect_every),
                reacquire_detect_every: env_or(
                    "CINEFOCUS_REACQUIRE_DETECT_EVERY",
                    d.cadence.reacquire_detect_every,
                ),
                segment_every: env_or("CINEFOCUS_SEGMENT_EVERY", d.cadence.segment_every),
            },
            composite: CompositeConfig {
                max_blur_sigma: env_or("CINEFOCUS_MAX_BLUR", d.composite.max_blur_sigma),
                max_dim: env_or("CINEFOCUS_MAX_DIM", d.composite.max_dim),
                show_overlays: env_or("CINEFOCUS_SHOW_OVERLAYS", d.composite.show_overlays),
                ..d.composite
            },
        }
    }

    /// Load config from a JSON file. Missing sections take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> MediaResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }
        let raw = std::fs::read_to_string(path)?;
        let config: FocusConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would stall or destabilise the pipeline.
    pub fn validate(&self) -> MediaResult<()> {
        let t = &self.tracking;
        if !(0.0..=1.0).contains(&t.acceptance_iou) {
            return Err(MediaError::invalid_config("acceptance_iou must be within 0..=1"));
        }
        if !(0.0..=1.0).contains(&t.mask_overlap_threshold) {
            return Err(MediaError::invalid_config(
                "mask_overlap_threshold must be within 0..=1",
            ));
        }
        if t.mask_alpha_threshold == 0 {
            return Err(MediaError::invalid_config("mask_alpha_threshold must be at least 1"));
        }
        if t.reacquire_after == 0 || t.give_up_after < t.reacquire_after {
            return Err(MediaError::invalid_config(
                "need 0 < reacquire_after <= give_up_after",
            ));
        }

        let s = &self.smoothing;
        for (name, rate) in [("focus_rate", s.focus_rate), ("camera_rate", s.camera_rate)] {
            if !(rate > 0.0 && rate <= 1.0) {
                return Err(MediaError::invalid_config(format!(
                    "{name} must be within (0, 1]"
                )));
            }
        }
        if s.max_zoom < 1.0 {
            return Err(MediaError::invalid_config("max_zoom must be >= 1"));
        }
        if s.subject_fill <= 0.0 {
            return Err(MediaError::invalid_config("subject_fill must be positive"));
        }

        let c = &self.cadence;
        if c.detect_every == 0 || c.reacquire_detect_every == 0 || c.segment_every == 0 {
            return Err(MediaError::invalid_config("inference intervals must be >= 1"));
        }

        if !(0.0..=1.0).contains(&self.composite.max_dim) || self.composite.max_blur_sigma < 0.0 {
            return Err(MediaError::invalid_config(
                "max_dim must be within 0..=1 and max_blur_sigma non-negative",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_is_valid() {
        assert!(FocusConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_thresholds() {
        let mut config = FocusConfig::default();
        config.tracking.give_up_after = 2;
        assert!(matches!(config.validate(), Err(MediaError::InvalidConfig(_))));

        let mut config = FocusConfig::default();
        config.smoothing.focus_rate = 0.0;
        assert!(config.validate().is_err());

        let mut config = FocusConfig::default();
        config.cadence.detect_every = 0;
        assert!(config.validate().is_err());

        let mut config = FocusConfig::default();
        config.tracking.mask_alpha_threshold = 0;
        assert!(matches!(config.validate(), Err(MediaError::InvalidConfig(_))));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"tracking":{{"acceptance_iou":0.45}},"smoothing":{{"auto_zoom":true}}}}"#
        )
        .unwrap();

        let config = FocusConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.tracking.acceptance_iou, 0.45);
        assert_eq!(config.tracking.give_up_after, 60);
        assert!(config.smoothing.auto_zoom);
        assert_eq!(config.cadence, CadenceConfig::default());
    }

    #[test]
    fn test_missing_file() {
        let err = FocusConfig::from_json_file("/nonexistent/cinefocus.json").unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }
}

//! Object detections produced by a detection model.

use serde::{Deserialize, Serialize};

use crate::geometry::BoundingBox;

/// A single model output: label, confidence and frame-space box.
///
/// Produced fresh each inference cycle. A detection is never mutated after
/// it leaves the model; "updating" a tracked subject means replacing it with
/// a newer value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Class label as reported by the model (e.g. "person")
    pub label: String,
    /// Detection confidence score (0.0-1.0)
    pub confidence: f64,
    /// Bounding box in frame pixel coordinates
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
}

impl Detection {
    /// Create a new detection.
    pub fn new(label: impl Into<String>, confidence: f64, bbox: BoundingBox) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox,
        }
    }

    /// Whether the detection shares a label with `other`.
    pub fn same_label(&self, other: &Detection) -> bool {
        self.label == other.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection_json_shape() {
        let json = r#"{"label":"person","confidence":0.9,"box":{"x":100.0,"y":100.0,"width":50.0,"height":80.0}}"#;
        let det: Detection = serde_json::from_str(json).unwrap();
        assert_eq!(det.label, "person");
        assert_eq!(det.bbox, BoundingBox::new(100.0, 100.0, 50.0, 80.0));

        let back = serde_json::to_string(&det).unwrap();
        assert!(back.contains("\"box\""));
    }
}

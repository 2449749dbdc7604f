//! Scripted playback: canned detection cycles plus timed user input.
//!
//! ```json
//! {
//!   "latency_ms": 40,
//!   "cycles": [[{"label": "person", "confidence": 0.9,
//!                "box": {"x": 100, "y": 100, "width": 50, "height": 80}}]],
//!   "events": [{"frame": 12, "action": "click", "x": 120, "y": 130},
//!              {"frame": 300, "action": "clear"}]
//! }
//! ```

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use cinefocus_media::{
    DetectionSource, Frame, MediaError, MediaResult, RenderLoop, TrackingEvent, TrackingMode,
};
use cinefocus_models::Detection;
use serde::{Deserialize, Serialize};
use tracing::info;

/// User input replayed at a given rendered frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScriptAction {
    /// Click in display coordinates
    Click { x: f64, y: f64 },
    Clear,
    AutoZoom { enabled: bool },
    Mode { mode: TrackingMode },
    Restart,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptEvent {
    /// Rendered frame count (1-based) after which the action fires
    pub frame: u64,
    #[serde(flatten)]
    pub action: ScriptAction,
}

impl ScriptEvent {
    /// Apply the action to the engine.
    pub fn apply(&self, engine: &mut RenderLoop) {
        info!(frame = self.frame, action = ?self.action, "Replaying input");
        match &self.action {
            ScriptAction::Click { x, y } => {
                if let TrackingEvent::Cleared = engine.pointer_select(*x, *y) {
                    info!(x, y, "Click hit nothing");
                }
            }
            ScriptAction::Clear => {
                engine.clear_selection();
            }
            ScriptAction::AutoZoom { enabled } => engine.set_auto_zoom(*enabled),
            ScriptAction::Mode { mode } => {
                engine.set_tracking_mode(*mode);
            }
            ScriptAction::Restart => engine.restart(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Script {
    /// Simulated model latency
    pub latency_ms: u64,
    /// Detection lists returned by successive calls, cycling
    pub cycles: Vec<Vec<Detection>>,
    pub events: Vec<ScriptEvent>,
}

impl Script {
    pub fn from_json_file(path: impl AsRef<Path>) -> MediaResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Events that fire after rendered frame `frame`.
    pub fn events_at(&self, frame: u64) -> impl Iterator<Item = &ScriptEvent> {
        self.events.iter().filter(move |e| e.frame == frame)
    }

    /// Detection source replaying this script's cycles.
    pub fn detector(&self) -> ScriptedDetector {
        ScriptedDetector {
            cycles: self.cycles.clone(),
            latency: Duration::from_millis(self.latency_ms),
            calls: AtomicUsize::new(0),
        }
    }
}

/// Detection source that replays canned cycles in order, looping.
#[derive(Debug)]
pub struct ScriptedDetector {
    cycles: Vec<Vec<Detection>>,
    latency: Duration,
    calls: AtomicUsize,
}

impl ScriptedDetector {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DetectionSource for ScriptedDetector {
    async fn detect(&self, _frame: Frame) -> MediaResult<Vec<Detection>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.cycles.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.cycles[call % self.cycles.len()].clone())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SCRIPT: &str = r#"{
        "cycles": [
            [{"label": "person", "confidence": 0.9, "box": {"x": 100, "y": 100, "width": 50, "height": 80}}],
            []
        ],
        "events": [
            {"frame": 12, "action": "click", "x": 120, "y": 130},
            {"frame": 40, "action": "auto_zoom", "enabled": true},
            {"frame": 40, "action": "mode", "mode": "mask"},
            {"frame": 90, "action": "restart"}
        ]
    }"#;

    #[test]
    fn test_parse_script() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SCRIPT.as_bytes()).unwrap();

        let script = Script::from_json_file(file.path()).unwrap();
        assert_eq!(script.latency_ms, 0);
        assert_eq!(script.cycles.len(), 2);
        assert_eq!(script.cycles[0][0].label, "person");
        assert_eq!(
            script.events[0].action,
            ScriptAction::Click { x: 120.0, y: 130.0 }
        );
        assert_eq!(script.events_at(40).count(), 2);
        assert_eq!(script.events_at(41).count(), 0);
        assert_eq!(script.events[3].action, ScriptAction::Restart);
    }

    #[tokio::test]
    async fn test_detector_cycles() {
        let script: Script = serde_json::from_str(SCRIPT).unwrap();
        let detector = script.detector();
        let frame = Frame::new(image::RgbImage::new(4, 4));

        assert_eq!(detector.detect(frame.clone()).await.unwrap().len(), 1);
        assert!(detector.detect(frame.clone()).await.unwrap().is_empty());
        assert_eq!(detector.detect(frame).await.unwrap().len(), 1);
        assert_eq!(detector.calls(), 3);
    }

    #[test]
    fn test_missing_script() {
        let err = Script::from_json_file("/nonexistent/script.json").unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }
}

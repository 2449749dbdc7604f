//! Read-only runtime diagnostics: render rate, inference latency, last error.
//!
//! Nothing here feeds back into control decisions. Values are kept locally
//! for the host UI and mirrored to the `metrics` facade; without an installed
//! recorder the metric calls are no-ops.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};
use serde::Serialize;

/// Metric names as constants for consistency.
pub mod names {
    pub const RENDER_FPS: &str = "cinefocus_render_fps";
    pub const INFERENCE_LATENCY_SECONDS: &str = "cinefocus_inference_latency_seconds";
    pub const INFERENCE_FAILURES_TOTAL: &str = "cinefocus_inference_failures_total";
    pub const TRACKING_EVENTS_TOTAL: &str = "cinefocus_tracking_events_total";
    pub const STALE_RESULTS_TOTAL: &str = "cinefocus_stale_results_total";
}

const FPS_WINDOW: Duration = Duration::from_secs(1);

/// Point-in-time copy of the diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiagnosticsSnapshot {
    pub fps: f64,
    pub frames_rendered: u64,
    pub last_detect_latency: Option<Duration>,
    pub last_segment_latency: Option<Duration>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    frame_times: VecDeque<Instant>,
    frames_rendered: u64,
    last_detect_latency: Option<Duration>,
    last_segment_latency: Option<Duration>,
    last_error: Option<String>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Note a rendered frame at `now`.
    pub fn record_frame(&mut self, now: Instant) {
        self.frames_rendered += 1;
        self.frame_times.push_back(now);
        while let Some(&oldest) = self.frame_times.front() {
            if now.duration_since(oldest) > FPS_WINDOW {
                self.frame_times.pop_front();
            } else {
                break;
            }
        }
        gauge!(names::RENDER_FPS).set(self.fps());
    }

    /// Rolling frames per second over the last second.
    pub fn fps(&self) -> f64 {
        let (Some(first), Some(last)) = (self.frame_times.front(), self.frame_times.back()) else {
            return 0.0;
        };
        let span = last.duration_since(*first).as_secs_f64();
        if self.frame_times.len() < 2 || span <= 0.0 {
            return 0.0;
        }
        (self.frame_times.len() - 1) as f64 / span
    }

    pub fn record_detect_latency(&mut self, latency: Duration) {
        self.last_detect_latency = Some(latency);
        histogram!(names::INFERENCE_LATENCY_SECONDS, "kind" => "detect").record(latency.as_secs_f64());
    }

    pub fn record_segment_latency(&mut self, latency: Duration) {
        self.last_segment_latency = Some(latency);
        histogram!(names::INFERENCE_LATENCY_SECONDS, "kind" => "segment").record(latency.as_secs_f64());
    }

    /// Remember an inference failure. Returns `true` when the message differs
    /// from the last one, so callers can surface each distinct failure once.
    pub fn record_error(&mut self, kind: &'static str, message: String) -> bool {
        counter!(names::INFERENCE_FAILURES_TOTAL, "kind" => kind).increment(1);
        if self.last_error.as_deref() == Some(message.as_str()) {
            return false;
        }
        self.last_error = Some(message);
        true
    }

    pub fn record_tracking_event(&self, event: &'static str) {
        counter!(names::TRACKING_EVENTS_TOTAL, "event" => event).increment(1);
    }

    pub fn record_stale_result(&self, kind: &'static str) {
        counter!(names::STALE_RESULTS_TOTAL, "kind" => kind).increment(1);
    }

    /// Forget the frame history, e.g. after the stream restarts.
    pub fn reset_rate(&mut self) {
        self.frame_times.clear();
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            fps: self.fps(),
            frames_rendered: self.frames_rendered,
            last_detect_latency: self.last_detect_latency,
            last_segment_latency: self.last_segment_latency,
            last_error: self.last_error.clone(),
        }
    }
}

//! Render loop driver.
//!
//! One [`RenderLoop::tick`] per displayed frame. The tick never waits on a
//! model: inference is launched fire-and-forget through [`InferenceSlot`]s
//! on the tokio runtime and collected on a later tick. Everything the tick
//! mutates lives in a single [`StreamState`], which is swapped out wholesale
//! when the stream stops or restarts. The slots outlive the swap, so a source
//! is never re-entered while an abandoned call is still running.
//!
//! Each stream carries a generation number. Inference launched under an
//! older generation (before a restart or a resolution change) is discarded
//! when it lands.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::{Duration, Instant};

use cinefocus_models::{Detection, InstanceMask};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::compositor::{CompositeFrame, Compositor};
use crate::config::FocusConfig;
use crate::diagnostics::{Diagnostics, DiagnosticsSnapshot};
use crate::error::{MediaError, MediaResult};
use crate::inference::{InferenceOutcome, InferenceSlot};
use crate::smoother::{SmoothedGeometry, TemporalSmoother};
use crate::source::{DetectionSource, Frame, FrameSource, SegmentationSource};
use crate::tracking::{Selection, TrackingEvent, TrackingMode, TrackingSession, TrackingState};
use crate::view::ViewTransform;

/// Everything owned by one run of the stream.
struct StreamState {
    generation: u64,
    frame_counter: u64,
    dims: (u32, u32),
    detections: Arc<[Detection]>,
    masks: Arc<[InstanceMask]>,
    session: TrackingSession,
    smoother: TemporalSmoother,
}

impl StreamState {
    fn new(generation: u64, config: &FocusConfig, mode: TrackingMode, auto_zoom: bool) -> Self {
        let mut session = TrackingSession::new(config.tracking.clone());
        session.set_mode(mode);
        let mut smoother = TemporalSmoother::new(config.smoothing.clone(), 0, 0);
        smoother.set_auto_zoom(auto_zoom);

        Self {
            generation,
            frame_counter: 0,
            dims: (0, 0),
            detections: Arc::from(Vec::new()),
            masks: Arc::from(Vec::new()),
            session,
            smoother,
        }
    }
}

/// Drives tracking, smoothing and compositing for a single video stream.
pub struct RenderLoop {
    config: FocusConfig,
    detector: Arc<dyn DetectionSource>,
    segmenter: Option<Arc<dyn SegmentationSource>>,
    compositor: Compositor,
    diagnostics: Diagnostics,
    runtime: Handle,
    stream: StreamState,
    detect_slot: InferenceSlot<Vec<Detection>>,
    segment_slot: InferenceSlot<Vec<InstanceMask>>,
    running: bool,
    mode: TrackingMode,
    auto_zoom: bool,
    next_generation: u64,
}

impl RenderLoop {
    /// Create a running loop. Must be called from within a tokio runtime,
    /// which is where inference tasks will be spawned.
    pub fn new(config: FocusConfig, detector: Arc<dyn DetectionSource>) -> MediaResult<Self> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| MediaError::NoRuntime)?;

        let auto_zoom = config.smoothing.auto_zoom;
        let stream = StreamState::new(1, &config, TrackingMode::Box, auto_zoom);

        info!(detector = detector.name(), "Render loop created");

        Ok(Self {
            compositor: Compositor::new(config.composite.clone()),
            config,
            detector,
            segmenter: None,
            diagnostics: Diagnostics::new(),
            runtime,
            stream,
            detect_slot: InferenceSlot::new("detect"),
            segment_slot: InferenceSlot::new("segment"),
            running: true,
            mode: TrackingMode::Box,
            auto_zoom,
            next_generation: 2,
        })
    }

    /// Attach a segmentation source, enabling mask tracking.
    pub fn with_segmenter(mut self, segmenter: Arc<dyn SegmentationSource>) -> Self {
        info!(segmenter = segmenter.name(), "Segmentation enabled");
        self.segmenter = Some(segmenter);
        self
    }

    /// Render one frame. Returns `None` when stopped or when the source has
    /// no usable frame yet.
    pub fn tick(&mut self, source: &mut dyn FrameSource) -> Option<CompositeFrame> {
        if !self.running {
            return None;
        }
        let frame = source.current_frame()?;
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return None;
        }

        if (width, height) != self.stream.dims {
            self.on_resolution_change(width, height);
        }

        self.collect_detections();
        self.collect_masks();

        self.stream.frame_counter += 1;
        self.launch_due_inference(&frame);

        let stream = &mut self.stream;
        let target = stream.session.selection().map(Selection::target_box);
        let geometry = stream.smoother.advance(target);
        let view = stream.smoother.view_transform();
        let composite = self.compositor.compose(
            &frame,
            &geometry,
            &view,
            stream.session.state(),
            &stream.detections,
            stream.frame_counter,
        );

        self.diagnostics.record_frame(Instant::now());
        Some(composite)
    }

    /// Handle a click in display (backing-store pixel) coordinates.
    pub fn pointer_select(&mut self, display_x: f64, display_y: f64) -> TrackingEvent {
        let (x, y) = self.view().to_frame(display_x, display_y);
        self.select_at(x, y)
    }

    /// Handle a click in frame coordinates against the latest lists.
    pub fn select_at(&mut self, frame_x: f64, frame_y: f64) -> TrackingEvent {
        let stream = &mut self.stream;
        let event = stream
            .session
            .select_at(frame_x, frame_y, &stream.detections, &stream.masks);
        self.report(&event);
        event
    }

    pub fn clear_selection(&mut self) -> TrackingEvent {
        let event = self.stream.session.clear();
        self.report(&event);
        event
    }

    pub fn set_auto_zoom(&mut self, enabled: bool) {
        self.auto_zoom = enabled;
        self.stream.smoother.set_auto_zoom(enabled);
        debug!(enabled, "Auto zoom toggled");
    }

    /// Switch association rule. Mask mode needs a segmentation source and
    /// falls back to box mode without one. Returns the mode now in effect.
    pub fn set_tracking_mode(&mut self, mode: TrackingMode) -> TrackingMode {
        let mode = if mode == TrackingMode::Mask && self.segmenter.is_none() {
            warn!("Mask tracking requested without a segmentation source, using box tracking");
            TrackingMode::Box
        } else {
            mode
        };

        self.mode = mode;
        let event = self.stream.session.set_mode(mode);
        self.report(&event);
        mode
    }

    /// Stop the stream. In-flight inference is abandoned; its result is
    /// discarded when it lands.
    pub fn stop(&mut self) {
        self.swap_stream();
        self.running = false;
        info!(generation = self.stream.generation, "Stream stopped");
    }

    /// Start a fresh stream: no selection, counters at zero, new generation.
    pub fn restart(&mut self) {
        self.swap_stream();
        self.running = true;
        info!(generation = self.stream.generation, "Stream restarted");
    }

    /// Tick at `fps` until `on_frame` breaks or `shutdown` flips to true.
    ///
    /// `on_frame` gets the loop back between frames so the host can feed
    /// user input. Returns the number of frames rendered. A dropped shutdown
    /// sender also ends the loop.
    pub async fn run<F>(
        &mut self,
        source: &mut dyn FrameSource,
        fps: f64,
        mut shutdown: watch::Receiver<bool>,
        mut on_frame: F,
    ) -> MediaResult<u64>
    where
        F: FnMut(&mut RenderLoop, CompositeFrame) -> ControlFlow<()>,
    {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(MediaError::invalid_config(format!("fps must be positive, got {fps}")));
        }

        let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / fps));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut rendered = 0u64;

        info!(fps, "Render loop running");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(rendered, "Shutdown signal received, stopping render loop");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if let Some(frame) = self.tick(source) {
                        rendered += 1;
                        if on_frame(self, frame).is_break() {
                            break;
                        }
                    }
                }
            }
        }

        Ok(rendered)
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn config(&self) -> &FocusConfig {
        &self.config
    }

    pub fn tracking_state(&self) -> &TrackingState {
        self.stream.session.state()
    }

    pub fn tracking_mode(&self) -> TrackingMode {
        self.mode
    }

    pub fn auto_zoom(&self) -> bool {
        self.auto_zoom
    }

    /// Latest accepted detection list.
    pub fn detections(&self) -> &[Detection] {
        &self.stream.detections
    }

    /// Latest accepted mask list.
    pub fn masks(&self) -> &[InstanceMask] {
        &self.stream.masks
    }

    pub fn geometry(&self) -> &SmoothedGeometry {
        self.stream.smoother.geometry()
    }

    /// View the last frame was rendered with.
    pub fn view(&self) -> ViewTransform {
        self.stream.smoother.view_transform()
    }

    pub fn generation(&self) -> u64 {
        self.stream.generation
    }

    /// Frames rendered in the current stream.
    pub fn frame_counter(&self) -> u64 {
        self.stream.frame_counter
    }

    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    fn bump_generation(&mut self) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        generation
    }

    fn swap_stream(&mut self) {
        let generation = self.bump_generation();
        self.stream = StreamState::new(generation, &self.config, self.mode, self.auto_zoom);
        self.diagnostics.reset_rate();
    }

    /// Coordinates from before the change are meaningless now, so the
    /// selection and lists go, and pending results are fenced off by a new
    /// generation.
    fn on_resolution_change(&mut self, width: u32, height: u32) {
        let previous = self.stream.dims;
        let generation = self.bump_generation();
        let stream = &mut self.stream;

        stream.generation = generation;
        stream.dims = (width, height);
        stream.smoother.reset(width, height);
        stream.detections = Arc::from(Vec::new());
        stream.masks = Arc::from(Vec::new());
        let event = stream.session.clear();

        info!(
            from_width = previous.0,
            from_height = previous.1,
            width,
            height,
            generation,
            "Stream resolution changed"
        );
        self.report(&event);
    }

    /// Whether an outcome belongs to the current stream; counts it if not.
    fn is_current<T>(&self, outcome: &InferenceOutcome<T>, kind: &'static str) -> bool {
        if outcome.generation == self.stream.generation {
            return true;
        }
        debug!(
            kind,
            launched = outcome.generation,
            current = self.stream.generation,
            "Discarding stale inference result"
        );
        self.diagnostics.record_stale_result(kind);
        false
    }

    fn collect_detections(&mut self) {
        let Some(outcome) = self.detect_slot.poll() else {
            return;
        };
        if !self.is_current(&outcome, "detect") {
            return;
        }

        match outcome.result {
            Ok(detections) => {
                self.diagnostics.record_detect_latency(outcome.latency);
                let min_confidence = self.config.tracking.min_confidence;
                let accepted: Arc<[Detection]> = detections
                    .into_iter()
                    .filter(|d| d.confidence >= min_confidence)
                    .collect();
                debug!(
                    count = accepted.len(),
                    latency_ms = outcome.latency.as_millis() as u64,
                    "Detections received"
                );

                let stream = &mut self.stream;
                stream.detections = accepted;
                if stream.session.mode() == TrackingMode::Box {
                    let event = stream.session.reconcile_detections(&stream.detections);
                    self.report(&event);
                }
            }
            Err(e) => self.report_failure("detect", e),
        }
    }

    fn collect_masks(&mut self) {
        let Some(outcome) = self.segment_slot.poll() else {
            return;
        };
        if !self.is_current(&outcome, "segment") {
            return;
        }

        match outcome.result {
            Ok(masks) => {
                self.diagnostics.record_segment_latency(outcome.latency);
                let (width, height) = self.stream.dims;
                let accepted: Arc<[InstanceMask]> = masks
                    .into_iter()
                    .filter(|m| m.width() == width && m.height() == height)
                    .collect();
                debug!(
                    count = accepted.len(),
                    latency_ms = outcome.latency.as_millis() as u64,
                    "Masks received"
                );

                let stream = &mut self.stream;
                stream.masks = accepted;
                if stream.session.mode() == TrackingMode::Mask {
                    let event = stream.session.reconcile_masks(&stream.masks);
                    self.report(&event);
                }
            }
            Err(e) => self.report_failure("segment", e),
        }
    }

    fn launch_due_inference(&mut self, frame: &Frame) {
        let cadence = &self.config.cadence;
        let stream = &self.stream;
        let tick = stream.frame_counter.saturating_sub(1);

        let detect_every = if stream.session.is_reacquiring() {
            cadence.reacquire_detect_every
        } else {
            cadence.detect_every
        };
        if tick % detect_every.max(1) == 0 && !self.detect_slot.is_busy() {
            let detector = Arc::clone(&self.detector);
            let frame = Arc::clone(frame);
            self.detect_slot
                .launch(&self.runtime, stream.generation, async move { detector.detect(frame).await });
        }

        let Some(segmenter) = &self.segmenter else {
            return;
        };
        if self.mode != TrackingMode::Mask {
            return;
        }
        if tick % cadence.segment_every.max(1) == 0 && !self.segment_slot.is_busy() {
            let segmenter = Arc::clone(segmenter);
            let frame = Arc::clone(frame);
            self.segment_slot
                .launch(&self.runtime, stream.generation, async move { segmenter.segment(frame).await });
        }
    }

    fn report_failure(&mut self, kind: &'static str, error: MediaError) {
        // Lists keep their last value; the next cycle retries
        if self.diagnostics.record_error(kind, error.to_string()) {
            warn!(kind, error = %error, "Inference failed");
        }
    }

    fn report(&self, event: &TrackingEvent) {
        match event {
            TrackingEvent::Ignored => return,
            TrackingEvent::Selected { bbox } => {
                info!(x = bbox.x, y = bbox.y, width = bbox.width, height = bbox.height, "Subject selected")
            }
            TrackingEvent::Cleared => info!("Selection cleared"),
            TrackingEvent::Lost => info!("Lost track of subject, selection cleared"),
            TrackingEvent::Reacquiring { misses } => info!(misses, "Subject missing, reacquiring"),
            TrackingEvent::Recovered { confidence } => info!(confidence, "Subject reacquired"),
            TrackingEvent::Matched { confidence } => debug!(confidence, "Subject matched"),
            TrackingEvent::Missed { misses } => debug!(misses, "Subject not matched"),
        }
        self.diagnostics.record_tracking_event(event.kind());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct NoDetections;

    #[async_trait]
    impl DetectionSource for NoDetections {
        async fn detect(&self, _frame: Frame) -> MediaResult<Vec<Detection>> {
            Ok(Vec::new())
        }

        fn name(&self) -> &'static str {
            "none"
        }
    }

    #[test]
    fn test_requires_runtime() {
        let result = RenderLoop::new(FocusConfig::default(), Arc::new(NoDetections));
        assert!(matches!(result, Err(MediaError::NoRuntime)));
    }

    #[tokio::test]
    async fn test_rejects_invalid_config() {
        let mut config = FocusConfig::default();
        config.tracking.acceptance_iou = 2.0;
        let result = RenderLoop::new(config, Arc::new(NoDetections));
        assert!(matches!(result, Err(MediaError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_mask_mode_needs_segmenter() {
        let mut engine = RenderLoop::new(FocusConfig::default(), Arc::new(NoDetections)).unwrap();
        assert_eq!(engine.set_tracking_mode(TrackingMode::Mask), TrackingMode::Box);
        assert_eq!(engine.tracking_mode(), TrackingMode::Box);
    }

    #[tokio::test]
    async fn test_stop_and_restart_bump_generation() {
        let mut engine = RenderLoop::new(FocusConfig::default(), Arc::new(NoDetections)).unwrap();
        let first = engine.generation();

        engine.stop();
        assert!(!engine.is_running());
        assert!(engine.generation() > first);

        let stopped = engine.generation();
        engine.restart();
        assert!(engine.is_running());
        assert!(engine.generation() > stopped);
        assert_eq!(engine.frame_counter(), 0);
    }

    #[tokio::test]
    async fn test_run_rejects_bad_fps() {
        let mut engine = RenderLoop::new(FocusConfig::default(), Arc::new(NoDetections)).unwrap();
        let (_tx, rx) = watch::channel(false);
        let mut source = crate::source::StillFrameSource::empty();
        let result = engine
            .run(&mut source, 0.0, rx, |_, _| ControlFlow::Continue(()))
            .await;
        assert!(result.is_err());
    }
}

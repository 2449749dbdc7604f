//! Identity association for the single user-selected subject.
//!
//! Detection and segmentation models run independently every cycle and hand
//! back anonymous lists, so the session re-associates the selection with
//! each new list:
//! - box mode: best same-label IoU against the last accepted box
//! - mask mode: best coverage overlap against the last accepted mask
//!
//! Results may be a few frames stale when they land. They are always matched
//! against the *current* selection, which may have moved on since the
//! inference was launched, never applied blindly.

use std::cmp::Ordering;
use std::mem;

use cinefocus_models::{overlap_ratio, Detection, InstanceMask};
use tracing::debug;

use super::selection::{
    BoxSelection, MaskSelection, Selection, TrackingEvent, TrackingMode, TrackingState,
};
use crate::config::TrackingConfig;

/// Owner of the tracking state machine.
#[derive(Debug, Clone)]
pub struct TrackingSession {
    config: TrackingConfig,
    mode: TrackingMode,
    state: TrackingState,
}

impl TrackingSession {
    /// Create an idle session in box mode.
    pub fn new(config: TrackingConfig) -> Self {
        Self {
            config,
            mode: TrackingMode::Box,
            state: TrackingState::Idle,
        }
    }

    pub fn state(&self) -> &TrackingState {
        &self.state
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.state.selection()
    }

    pub fn mode(&self) -> TrackingMode {
        self.mode
    }

    /// Whether the render loop should poll the detector faster.
    pub fn is_reacquiring(&self) -> bool {
        self.state.is_reacquiring()
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    /// Switch association rule. A selection made under the other rule cannot
    /// be carried across, so switching clears it.
    pub fn set_mode(&mut self, mode: TrackingMode) -> TrackingEvent {
        if mode == self.mode {
            return TrackingEvent::Ignored;
        }
        self.mode = mode;
        self.clear()
    }

    /// Drop the selection.
    pub fn clear(&mut self) -> TrackingEvent {
        if self.state.is_idle() {
            return TrackingEvent::Ignored;
        }
        self.state = TrackingState::Idle;
        TrackingEvent::Cleared
    }

    /// Handle a click at a frame-space point using the active mode.
    pub fn select_at(
        &mut self,
        x: f64,
        y: f64,
        detections: &[Detection],
        masks: &[InstanceMask],
    ) -> TrackingEvent {
        match self.mode {
            TrackingMode::Box => self.select_detection_at(x, y, detections),
            TrackingMode::Mask => self.select_mask_at(x, y, masks),
        }
    }

    /// Lock onto the smallest detection containing the point, or clear the
    /// selection when the click hits nothing.
    pub fn select_detection_at(&mut self, x: f64, y: f64, detections: &[Detection]) -> TrackingEvent {
        let hit = detections
            .iter()
            .filter(|d| d.bbox.contains(x, y))
            .min_by(|a, b| {
                a.bbox
                    .area()
                    .partial_cmp(&b.bbox.area())
                    .unwrap_or(Ordering::Equal)
            });

        match hit {
            Some(detection) => {
                let bbox = detection.bbox;
                self.state = TrackingState::Locked(Selection::Box(BoxSelection::new(
                    detection.clone(),
                )));
                debug!(label = %detection.label, x, y, "Locked onto detection");
                TrackingEvent::Selected { bbox }
            }
            None => {
                self.state = TrackingState::Idle;
                TrackingEvent::Cleared
            }
        }
    }

    /// Lock onto the first mask covering the point, or clear the selection.
    pub fn select_mask_at(&mut self, x: f64, y: f64, masks: &[InstanceMask]) -> TrackingEvent {
        let threshold = self.config.mask_alpha_threshold;
        let hit = masks.iter().enumerate().find_map(|(index, mask)| {
            if !mask.covers(x, y, threshold) {
                return None;
            }
            mask.bounding_box(threshold).map(|bbox| (index, mask, bbox))
        });

        match hit {
            Some((index, mask, bbox)) => {
                self.state = TrackingState::Locked(Selection::Mask(MaskSelection {
                    index,
                    mask: mask.clone(),
                    bbox,
                    confidence: 1.0,
                }));
                debug!(index, x, y, "Locked onto mask instance");
                TrackingEvent::Selected { bbox }
            }
            None => {
                self.state = TrackingState::Idle;
                TrackingEvent::Cleared
            }
        }
    }

    /// Reconcile a fresh detection list against a box selection.
    pub fn reconcile_detections(&mut self, detections: &[Detection]) -> TrackingEvent {
        let (current, was_reacquiring) = match mem::take(&mut self.state) {
            TrackingState::Locked(Selection::Box(s)) => (s, false),
            TrackingState::Reacquiring(Selection::Box(s)) => (s, true),
            other => {
                self.state = other;
                return TrackingEvent::Ignored;
            }
        };

        let best = detections
            .iter()
            .filter(|d| d.same_label(&current.detection))
            .map(|d| (d, overlap_ratio(&current.detection.bbox, &d.bbox)))
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));

        if let Some((detection, ratio)) = best {
            if ratio > self.config.acceptance_iou {
                self.state = TrackingState::Locked(Selection::Box(BoxSelection {
                    detection: detection.clone(),
                    confidence: ratio,
                    misses: 0,
                }));
                return if was_reacquiring {
                    TrackingEvent::Recovered { confidence: ratio }
                } else {
                    TrackingEvent::Matched { confidence: ratio }
                };
            }
        }

        let misses = current.misses + 1;
        if misses >= self.config.give_up_after {
            // Counter goes away with the selection
            return TrackingEvent::Lost;
        }

        let next = Selection::Box(BoxSelection {
            confidence: best.map(|(_, r)| r).unwrap_or(0.0),
            misses,
            ..current
        });

        if misses >= self.config.reacquire_after {
            self.state = TrackingState::Reacquiring(next);
            if was_reacquiring {
                TrackingEvent::Missed { misses }
            } else {
                TrackingEvent::Reacquiring { misses }
            }
        } else {
            self.state = TrackingState::Locked(next);
            TrackingEvent::Missed { misses }
        }
    }

    /// Reconcile a fresh mask list against a mask selection.
    ///
    /// Masks carry no label to disambiguate, so a weak overlap drops the
    /// selection immediately instead of entering reacquisition.
    pub fn reconcile_masks(&mut self, masks: &[InstanceMask]) -> TrackingEvent {
        let current = match mem::take(&mut self.state) {
            TrackingState::Locked(Selection::Mask(s))
            | TrackingState::Reacquiring(Selection::Mask(s)) => s,
            other => {
                self.state = other;
                return TrackingEvent::Ignored;
            }
        };

        let threshold = self.config.mask_alpha_threshold;
        let best = masks
            .iter()
            .enumerate()
            .map(|(index, mask)| (index, mask, mask.overlap_with(&current.mask)))
            .max_by(|a, b| a.2.partial_cmp(&b.2).unwrap_or(Ordering::Equal));

        match best {
            Some((index, mask, overlap)) if overlap >= self.config.mask_overlap_threshold => {
                let Some(bbox) = mask.bounding_box(threshold) else {
                    return TrackingEvent::Lost;
                };
                self.state = TrackingState::Locked(Selection::Mask(MaskSelection {
                    index,
                    mask: mask.clone(),
                    bbox,
                    confidence: overlap,
                }));
                TrackingEvent::Matched {
                    confidence: overlap,
                }
            }
            _ => TrackingEvent::Lost,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinefocus_models::BoundingBox;

    fn person(x: f64, y: f64, w: f64, h: f64) -> Detection {
        Detection::new("person", 0.9, BoundingBox::new(x, y, w, h))
    }

    fn locked_session() -> TrackingSession {
        let mut session = TrackingSession::new(TrackingConfig::default());
        let dets = vec![person(100.0, 100.0, 50.0, 80.0)];
        session.select_detection_at(120.0, 130.0, &dets);
        session
    }

    fn misses(session: &TrackingSession) -> Option<u32> {
        match session.selection() {
            Some(Selection::Box(s)) => Some(s.misses),
            _ => None,
        }
    }

    #[test]
    fn test_click_prefers_smallest_box() {
        let mut session = TrackingSession::new(TrackingConfig::default());
        let dets = vec![
            person(0.0, 0.0, 200.0, 200.0),
            Detection::new("dog", 0.8, BoundingBox::new(40.0, 40.0, 30.0, 30.0)),
            person(30.0, 30.0, 100.0, 100.0),
        ];

        let event = session.select_detection_at(50.0, 50.0, &dets);
        assert_eq!(
            event,
            TrackingEvent::Selected {
                bbox: BoundingBox::new(40.0, 40.0, 30.0, 30.0)
            }
        );
        assert_eq!(session.selection().and_then(|s| s.label()), Some("dog"));
    }

    #[test]
    fn test_click_outside_clears() {
        let mut session = locked_session();
        assert!(session.selection().is_some());

        let dets = vec![person(100.0, 100.0, 50.0, 80.0)];
        let event = session.select_detection_at(10.0, 10.0, &dets);
        assert_eq!(event, TrackingEvent::Cleared);
        assert!(session.state().is_idle());
    }

    #[test]
    fn test_good_overlap_updates_selection() {
        let mut session = locked_session();

        // 100x100 vs shifted by 25px -> IoU 0.6
        let mut session_b = TrackingSession::new(TrackingConfig::default());
        session_b.select_detection_at(50.0, 50.0, &[person(0.0, 0.0, 100.0, 100.0)]);
        let next = person(25.0, 0.0, 100.0, 100.0);
        let ratio = overlap_ratio(&BoundingBox::new(0.0, 0.0, 100.0, 100.0), &next.bbox);
        assert!((ratio - 0.6).abs() < 1e-9);

        let event = session_b.reconcile_detections(&[next.clone()]);
        assert!(matches!(event, TrackingEvent::Matched { confidence } if (confidence - 0.6).abs() < 1e-9));
        assert_eq!(session_b.selection().and_then(|s| s.detection()), Some(&next));
        assert_eq!(misses(&session_b), Some(0));

        // A miss then a hit resets the counter
        session.reconcile_detections(&[]);
        assert_eq!(misses(&session), Some(1));
        session.reconcile_detections(&[person(104.0, 100.0, 50.0, 80.0)]);
        assert_eq!(misses(&session), Some(0));
    }

    #[test]
    fn test_other_labels_never_match() {
        let mut session = locked_session();
        let dog = Detection::new("dog", 0.99, BoundingBox::new(100.0, 100.0, 50.0, 80.0));
        let event = session.reconcile_detections(&[dog]);
        assert_eq!(event, TrackingEvent::Missed { misses: 1 });
    }

    #[test]
    fn test_best_overlap_wins() {
        let mut session = locked_session();
        let far = person(130.0, 100.0, 50.0, 80.0);
        let near = person(102.0, 101.0, 50.0, 80.0);
        session.reconcile_detections(&[far, near.clone()]);
        assert_eq!(session.selection().and_then(|s| s.detection()), Some(&near));
    }

    #[test]
    fn test_low_overlap_gives_up() {
        let config = TrackingConfig::default();
        let give_up = config.give_up_after;
        let mut session = locked_session();

        // Same label, far away: IoU well under 0.3
        let stray = vec![person(300.0, 300.0, 50.0, 80.0)];
        for cycle in 1..give_up {
            let event = session.reconcile_detections(&stray);
            assert!(!event.ends_selection(), "dropped early at cycle {cycle}");
            assert_eq!(misses(&session), Some(cycle));
        }

        assert_eq!(session.reconcile_detections(&stray), TrackingEvent::Lost);
        assert!(session.state().is_idle());
        assert_eq!(misses(&session), None);

        // Fresh lock starts from zero
        session.select_detection_at(120.0, 130.0, &[person(100.0, 100.0, 50.0, 80.0)]);
        assert_eq!(misses(&session), Some(0));
    }

    #[test]
    fn test_reacquiring_transitions() {
        let mut session = locked_session();

        assert_eq!(session.reconcile_detections(&[]), TrackingEvent::Missed { misses: 1 });
        assert_eq!(session.reconcile_detections(&[]), TrackingEvent::Missed { misses: 2 });
        assert!(!session.is_reacquiring());
        assert_eq!(
            session.reconcile_detections(&[]),
            TrackingEvent::Reacquiring { misses: 3 }
        );
        assert!(session.is_reacquiring());
        assert_eq!(session.reconcile_detections(&[]), TrackingEvent::Missed { misses: 4 });

        let event = session.reconcile_detections(&[person(101.0, 100.0, 50.0, 80.0)]);
        assert!(matches!(event, TrackingEvent::Recovered { .. }));
        assert!(matches!(session.state(), TrackingState::Locked(_)));
    }

    #[test]
    fn test_reconcile_while_idle_is_ignored() {
        let mut session = TrackingSession::new(TrackingConfig::default());
        let event = session.reconcile_detections(&[person(0.0, 0.0, 10.0, 10.0)]);
        assert_eq!(event, TrackingEvent::Ignored);
        assert!(session.state().is_idle());
    }

    #[test]
    fn test_single_selection_invariant() {
        let mut session = TrackingSession::new(TrackingConfig::default());
        let dets = vec![person(0.0, 0.0, 50.0, 50.0), person(200.0, 0.0, 50.0, 50.0)];
        session.select_detection_at(10.0, 10.0, &dets);
        session.select_detection_at(210.0, 10.0, &dets);

        let selected = session.selection().and_then(|s| s.detection()).unwrap();
        assert_eq!(selected, &dets[1]);
    }

    fn rect_mask(id: usize, x0: usize, w: usize) -> InstanceMask {
        let mut alpha = vec![0u8; 20 * 10];
        for y in 2..8 {
            for x in x0..x0 + w {
                alpha[y * 20 + x] = 255;
            }
        }
        InstanceMask::new(id, 20, 10, alpha).unwrap()
    }

    #[test]
    fn test_mask_click_and_follow() {
        let mut session = TrackingSession::new(TrackingConfig::default());
        assert_eq!(session.set_mode(TrackingMode::Mask), TrackingEvent::Ignored);

        let masks = vec![rect_mask(0, 0, 4), rect_mask(1, 10, 6)];
        let event = session.select_at(12.0, 5.0, &[], &masks);
        assert_eq!(
            event,
            TrackingEvent::Selected {
                bbox: BoundingBox::new(10.0, 2.0, 6.0, 6.0)
            }
        );

        // Instance order changes between cycles; overlap finds it anyway
        let next = vec![rect_mask(0, 11, 6), rect_mask(1, 0, 4)];
        let event = session.reconcile_masks(&next);
        assert!(matches!(event, TrackingEvent::Matched { .. }));
        match session.selection() {
            Some(Selection::Mask(s)) => {
                assert_eq!(s.index, 0);
                assert_eq!(s.bbox, BoundingBox::new(11.0, 2.0, 6.0, 6.0));
            }
            other => panic!("expected mask selection, got {other:?}"),
        }
    }

    #[test]
    fn test_mask_low_overlap_drops() {
        let mut session = TrackingSession::new(TrackingConfig::default());
        session.set_mode(TrackingMode::Mask);
        session.select_mask_at(1.0, 5.0, &[rect_mask(0, 0, 4)]);

        let event = session.reconcile_masks(&[rect_mask(0, 12, 4)]);
        assert_eq!(event, TrackingEvent::Lost);
        assert!(session.state().is_idle());
    }

    #[test]
    fn test_mode_switch_clears() {
        let mut session = locked_session();
        assert_eq!(session.set_mode(TrackingMode::Mask), TrackingEvent::Cleared);
        assert!(session.state().is_idle());
    }
}

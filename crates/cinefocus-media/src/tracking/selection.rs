//! The locked subject and the states it moves through.

use cinefocus_models::{BoundingBox, Detection, InstanceMask};
use serde::{Deserialize, Serialize};

/// Which association rule the session uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingMode {
    /// Associate by same-label box IoU against the detection list
    #[default]
    Box,
    /// Associate by coverage overlap against the segmentation masks
    Mask,
}

/// A subject tracked by bounding box.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxSelection {
    /// Last detection accepted as this subject
    pub detection: Detection,
    /// Last measured overlap ratio against the previous box
    pub confidence: f64,
    /// Consecutive cycles without an acceptable match
    pub misses: u32,
}

impl BoxSelection {
    /// A freshly clicked subject.
    pub fn new(detection: Detection) -> Self {
        Self {
            detection,
            confidence: 1.0,
            misses: 0,
        }
    }
}

/// A subject tracked by segmentation mask.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskSelection {
    /// Instance index within the cycle that produced `mask`
    pub index: usize,
    /// Last mask accepted as this subject
    pub mask: InstanceMask,
    /// Covered extent of `mask`, used as the focus target
    pub bbox: BoundingBox,
    /// Last measured mask overlap
    pub confidence: f64,
}

/// The user's locked subject.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Box(BoxSelection),
    Mask(MaskSelection),
}

impl Selection {
    /// Rectangle the smoother should converge on.
    pub fn target_box(&self) -> BoundingBox {
        match self {
            Selection::Box(s) => s.detection.bbox,
            Selection::Mask(s) => s.bbox,
        }
    }

    /// Class label, when tracked by box.
    pub fn label(&self) -> Option<&str> {
        match self {
            Selection::Box(s) => Some(s.detection.label.as_str()),
            Selection::Mask(_) => None,
        }
    }

    pub fn confidence(&self) -> f64 {
        match self {
            Selection::Box(s) => s.confidence,
            Selection::Mask(s) => s.confidence,
        }
    }

    /// The selected coverage grid, when tracked by mask.
    pub fn mask(&self) -> Option<&InstanceMask> {
        match self {
            Selection::Box(_) => None,
            Selection::Mask(s) => Some(&s.mask),
        }
    }

    /// The selected detection, when tracked by box.
    pub fn detection(&self) -> Option<&Detection> {
        match self {
            Selection::Box(s) => Some(&s.detection),
            Selection::Mask(_) => None,
        }
    }
}

/// Tracking state. Holding the selection inside the variant means there is
/// never more than one, and dropping back to `Idle` drops its counters too.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TrackingState {
    #[default]
    Idle,
    /// Selection confirmed this cycle or carried forward
    Locked(Selection),
    /// Selection missed several consecutive cycles
    Reacquiring(Selection),
}

impl TrackingState {
    pub fn selection(&self) -> Option<&Selection> {
        match self {
            TrackingState::Idle => None,
            TrackingState::Locked(s) | TrackingState::Reacquiring(s) => Some(s),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, TrackingState::Idle)
    }

    pub fn is_reacquiring(&self) -> bool {
        matches!(self, TrackingState::Reacquiring(_))
    }

    /// Short name for logs and metrics labels.
    pub fn phase(&self) -> &'static str {
        match self {
            TrackingState::Idle => "idle",
            TrackingState::Locked(_) => "locked",
            TrackingState::Reacquiring(_) => "reacquiring",
        }
    }
}

/// Outcome of feeding the session a click or an inference cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackingEvent {
    /// A click locked onto a new subject
    Selected { bbox: BoundingBox },
    /// The selection was removed by the user
    Cleared,
    /// The subject was found again while locked
    Matched { confidence: f64 },
    /// The subject was found again while reacquiring
    Recovered { confidence: f64 },
    /// No acceptable match this cycle
    Missed { misses: u32 },
    /// Misses crossed the reacquisition threshold
    Reacquiring { misses: u32 },
    /// The session gave up on the subject
    Lost,
    /// Nothing to reconcile
    Ignored,
}

impl TrackingEvent {
    /// Short name for logs and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            TrackingEvent::Selected { .. } => "selected",
            TrackingEvent::Cleared => "cleared",
            TrackingEvent::Matched { .. } => "matched",
            TrackingEvent::Recovered { .. } => "recovered",
            TrackingEvent::Missed { .. } => "missed",
            TrackingEvent::Reacquiring { .. } => "reacquiring",
            TrackingEvent::Lost => "lost",
            TrackingEvent::Ignored => "ignored",
        }
    }

    /// Whether this event removed the selection.
    pub fn ends_selection(&self) -> bool {
        matches!(self, TrackingEvent::Cleared | TrackingEvent::Lost)
    }
}

//! Tracking state machine for the locked subject.
//!
//! ```text
//!            click hit                 misses >= reacquire_after
//!   Idle ───────────────▶ Locked ──────────────────────────▶ Reacquiring
//!    ▲                      ▲  │                                 │  │
//!    │   click miss/clear   │  └──── match ◀─────────────────────┘  │
//!    └──────────────────────┴───── misses >= give_up_after ◀────────┘
//! ```

pub mod selection;
pub mod session;

pub use selection::{
    BoxSelection, MaskSelection, Selection, TrackingEvent, TrackingMode, TrackingState,
};
pub use session::TrackingSession;

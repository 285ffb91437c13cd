pub mod controller;
pub mod state;

pub use controller::{HoverTimerKind, InteractionController, OpenChangeListener};
pub use state::{InteractionState, OverlayKind, OverlayPhase, DEFAULT_BUBBLE_POSITION};

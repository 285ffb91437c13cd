pub mod model;
pub mod probe;
pub mod tracker;

pub use model::{Context, Point, Rect};
pub use probe::{probe, DocumentSelection, ElementKind, FocusedElement, HostPage};
pub use tracker::{ContextTracker, HostEvent};

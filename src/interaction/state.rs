use serde::{Deserialize, Serialize};

use crate::context::Point;

/// Where the bubble sits before the user has dragged it anywhere.
pub const DEFAULT_BUBBLE_POSITION: Point = Point { x: 200.0, y: 200.0 };

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum OverlayPhase {
    #[default]
    Closed,
    /// Open-delay timer pending.
    Opening,
    Open,
    /// Close-delay timer pending; content still shown.
    Closing,
}

impl OverlayPhase {
    /// Content is on screen.
    pub fn is_shown(self) -> bool {
        matches!(self, OverlayPhase::Open | OverlayPhase::Closing)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum OverlayKind {
    /// Floating, draggable trigger gated by both enable settings.
    Bubble,
    /// Trigger pinned above the current selection; gated by the extension switch only.
    SelectionLabel,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct DragState {
    pub start: Point,
    /// Pointer position minus overlay position at press time.
    pub offset: Point,
    pub moved: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InteractionState {
    pub kind: OverlayKind,
    pub phase: OverlayPhase,
    pub pinned: bool,
    pub hovered: bool,
    pub dragging: bool,
    pub position: Point,
    pub extension_enabled: bool,
    pub overlay_visible: bool,
    /// Selection anchor; the label is only available while one exists.
    pub anchor: Option<Point>,
    pub context_selected: bool,
    #[serde(skip)]
    pub(crate) drag: Option<DragState>,
    /// Set by a pointer-up that ended a real drag; swallows the click that follows.
    #[serde(skip)]
    pub(crate) swallow_click: bool,
}

impl InteractionState {
    /// Settings are unknown until the first read lands, so both start
    /// disabled and nothing opens early.
    pub fn new(kind: OverlayKind) -> Self {
        Self {
            kind,
            phase: OverlayPhase::Closed,
            pinned: false,
            hovered: false,
            dragging: false,
            position: DEFAULT_BUBBLE_POSITION,
            extension_enabled: false,
            overlay_visible: false,
            anchor: None,
            context_selected: false,
            drag: None,
            swallow_click: false,
        }
    }

    pub fn settings_allow(&self) -> bool {
        match self.kind {
            OverlayKind::Bubble => self.extension_enabled && self.overlay_visible,
            OverlayKind::SelectionLabel => self.extension_enabled,
        }
    }

    /// Whether the trigger is rendered and accepts pointer input.
    pub fn is_available(&self) -> bool {
        match self.kind {
            OverlayKind::Bubble => self.settings_allow(),
            OverlayKind::SelectionLabel => self.settings_allow() && self.anchor.is_some(),
        }
    }

    pub fn is_draggable(&self) -> bool {
        self.kind == OverlayKind::Bubble && self.is_available()
    }

    /// Position the host should render the trigger at.
    pub fn render_position(&self) -> Option<Point> {
        match self.kind {
            OverlayKind::Bubble => Some(self.position),
            OverlayKind::SelectionLabel => self.anchor,
        }
    }

    pub(crate) fn open(&mut self, pinned: bool) {
        self.phase = OverlayPhase::Open;
        self.pinned = pinned;
    }

    pub(crate) fn close(&mut self) {
        self.phase = OverlayPhase::Closed;
        self.pinned = false;
    }

    pub(crate) fn end_drag(&mut self) -> bool {
        self.dragging = false;
        self.drag.take().map(|drag| drag.moved).unwrap_or(false)
    }
}

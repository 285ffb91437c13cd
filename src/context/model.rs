use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub fn distance_to(&self, other: Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Viewport-relative bounding box as reported by the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn has_area(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }

    /// Midpoint of the top edge shifted into document coordinates.
    pub fn top_center(&self, scroll: Point) -> Point {
        Point {
            x: self.left + self.width / 2.0 + scroll.x,
            y: self.top + scroll.y,
        }
    }
}

/// Snapshot of the text the user is engaged with and where to anchor UI.
///
/// Replaced wholesale by the tracker; `anchor_position` is only ever set
/// together with `selected_text`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    pub text: String,
    pub selected_text: Option<String>,
    pub anchor_position: Option<Point>,
    pub timestamp: i64,
}

impl Context {
    pub fn selected(text: impl Into<String>, anchor: Option<Point>) -> Self {
        let text = text.into();
        Self {
            selected_text: Some(text.clone()),
            text,
            anchor_position: anchor,
            timestamp: 0,
        }
    }

    pub fn page(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            selected_text: None,
            anchor_position: None,
            timestamp: 0,
        }
    }

    pub fn is_selected(&self) -> bool {
        self.selected_text.is_some()
    }

    /// Equality used to decide whether subscribers hear about a new probe.
    /// The timestamp never participates.
    pub fn same_as(&self, other: &Context) -> bool {
        self.text == other.text
            && self.is_selected() == other.is_selected()
            && self.anchor_position == other.anchor_position
    }

    pub(crate) fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }
}

use anyhow::Result;

use super::model::{Context, Point, Rect};

const ENABLE_LOGS: bool = true;

use crate::log_warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    /// Single-line text-like `<input>` (text, search, email, url).
    TextInput,
    TextArea,
    /// `contenteditable` region; its selection lives in the document selection.
    Editable,
    Other,
}

impl ElementKind {
    pub fn is_text_input_like(self) -> bool {
        !matches!(self, ElementKind::Other)
    }

    fn has_value_selection(self) -> bool {
        matches!(self, ElementKind::TextInput | ElementKind::TextArea)
    }
}

/// What the host reports about the focused element.
#[derive(Debug, Clone, PartialEq)]
pub struct FocusedElement {
    pub kind: ElementKind,
    pub value: String,
    /// Character offsets `(start, end)` of the element's own selection.
    pub selection: Option<(usize, usize)>,
    pub bounds: Rect,
}

/// What the host reports about the document-level selection.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSelection {
    pub text: String,
    pub collapsed: bool,
    /// Bounding box of the first range, if the host could measure it.
    pub range_bounds: Option<Rect>,
}

/// Read-only view of the host page. Every accessor may fail (detached
/// nodes, cross-origin frames); the probe treats any failure as "no
/// selection".
pub trait HostPage: Send + Sync {
    fn is_visible(&self) -> Result<bool>;
    fn focused_element(&self) -> Result<Option<FocusedElement>>;
    fn document_selection(&self) -> Result<Option<DocumentSelection>>;
    fn scroll_offset(&self) -> Result<Point>;
    fn body_text(&self) -> Result<String>;
}

enum AnchorSource {
    Element(Rect),
    Range(Option<Rect>),
}

struct FoundSelection {
    text: String,
    anchor: AnchorSource,
}

/// Inspects the page and returns a fresh, unstamped `Context`.
/// Never fails and never touches page state.
pub fn probe(page: &dyn HostPage) -> Context {
    let found = match find_selection(page) {
        Ok(found) => found,
        Err(err) => {
            log_warn!("selection probe failed, treating as no selection: {err:#}");
            None
        }
    };

    match found {
        Some(selection) => {
            let anchor = compute_anchor(page, &selection.anchor);
            Context::selected(selection.text, anchor)
        }
        None => Context::page(page_text(page)),
    }
}

fn find_selection(page: &dyn HostPage) -> Result<Option<FoundSelection>> {
    let focused = page
        .focused_element()?
        .filter(|element| element.kind.is_text_input_like());

    if let Some(element) = &focused {
        if let Some(text) = value_selection(element) {
            return Ok(Some(FoundSelection {
                text,
                anchor: AnchorSource::Element(element.bounds),
            }));
        }
    }

    let Some(selection) = page.document_selection()? else {
        return Ok(None);
    };
    if selection.collapsed {
        return Ok(None);
    }

    Ok(non_blank(&selection.text).map(|text| FoundSelection {
        text,
        anchor: AnchorSource::Range(selection.range_bounds),
    }))
}

fn value_selection(element: &FocusedElement) -> Option<String> {
    if !element.kind.has_value_selection() {
        return None;
    }
    let (start, end) = element.selection?;
    if start >= end {
        return None;
    }
    let slice: String = element.value.chars().skip(start).take(end - start).collect();
    non_blank(&slice)
}

fn non_blank(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn compute_anchor(page: &dyn HostPage, source: &AnchorSource) -> Option<Point> {
    match page.is_visible() {
        Ok(true) => {}
        Ok(false) => return None,
        Err(err) => {
            log_warn!("visibility check failed, skipping anchor: {err:#}");
            return None;
        }
    }

    let rect = match source {
        AnchorSource::Element(rect) => *rect,
        AnchorSource::Range(Some(rect)) => *rect,
        AnchorSource::Range(None) => return None,
    };
    if !rect.has_area() {
        return None;
    }

    let scroll = match page.scroll_offset() {
        Ok(scroll) => scroll,
        Err(err) => {
            log_warn!("scroll offset unavailable, skipping anchor: {err:#}");
            return None;
        }
    };

    Some(rect.top_center(scroll)).filter(Point::is_finite)
}

fn page_text(page: &dyn HostPage) -> String {
    match page.body_text() {
        Ok(text) => text.split_whitespace().collect::<Vec<_>>().join(" "),
        Err(err) => {
            log_warn!("page text unavailable: {err:#}");
            String::new()
        }
    }
}

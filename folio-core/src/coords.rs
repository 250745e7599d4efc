//! Transforms between screen, document and page-local coordinates.

use crate::geometry::{Point, Rect};
use crate::layout::PageLayoutEntry;

/// Scroll position and on-screen size of the visible window onto document space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub scroll_x: f32,
    pub scroll_y: f32,
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            scroll_x: 0.0,
            scroll_y: 0.0,
            width,
            height,
        }
    }

    pub fn document_rect(&self) -> Rect {
        Rect::new(
            self.scroll_x,
            self.scroll_y,
            self.scroll_x + self.width,
            self.scroll_y + self.height,
        )
    }
}

/// Index of the page owning `document_y`.
///
/// Anything above the first page resolves to page 0 and anything at or past the last top edge
/// resolves to the last page, so the result is monotonic and always in range.
pub fn page_at(tops: &[f32], document_y: f32) -> Option<usize> {
    if tops.is_empty() {
        return None;
    }
    let after = tops.partition_point(|&top| top <= document_y);
    Some(after.saturating_sub(1))
}

pub fn screen_to_document(point: Point, viewport: &Viewport) -> Point {
    Point::new(point.x + viewport.scroll_x, point.y + viewport.scroll_y)
}

pub fn document_to_screen(point: Point, viewport: &Viewport) -> Point {
    Point::new(point.x - viewport.scroll_x, point.y - viewport.scroll_y)
}

pub fn to_page_local(point: Point, entry: &PageLayoutEntry) -> Point {
    Point::new(point.x - entry.left, point.y - entry.top)
}

pub fn to_document(point: Point, entry: &PageLayoutEntry) -> Point {
    Point::new(point.x + entry.left, point.y + entry.top)
}

pub fn rect_to_page_local(rect: &Rect, entry: &PageLayoutEntry) -> Rect {
    rect.translated(-entry.left, -entry.top)
}

pub fn document_rect_intersects(a: &Rect, b: &Rect) -> bool {
    a.intersects(b)
}

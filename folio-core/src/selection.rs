//! Drag-to-select over the stacked pages.
//!
//! Pointer handling is an explicit machine: `Idle -> Dragging -> Idle`. Nothing is selected
//! while dragging; the matched words and their text are derived once, on release.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::geometry::{Point, Rect};
use crate::layout::{DocumentLayout, PageLayoutEntry};
use crate::words::Word;

#[derive(Debug, Clone, PartialEq)]
pub struct SelectedWord {
    pub page_index: usize,
    pub word: Word,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Selection {
    pub anchor: Point,
    pub current: Point,
    pub words: Vec<SelectedWord>,
    pub text: String,
}

impl Selection {
    pub fn rect(&self) -> Rect {
        Rect::from_corners(self.anchor, self.current)
    }

    /// True when the drag matched no words. An empty selection is a valid outcome.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn pages(&self) -> BTreeSet<usize> {
        self.words.iter().map(|selected| selected.page_index).collect()
    }

    pub fn words_on(&self, page_index: usize) -> impl Iterator<Item = &Word> + '_ {
        self.words
            .iter()
            .filter(move |selected| selected.page_index == page_index)
            .map(|selected| &selected.word)
    }

    /// Forgets word geometry after a rescale; only the text is still meaningful.
    pub fn drop_geometry(&mut self) {
        self.words.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DragState {
    Idle,
    Dragging { anchor: Point, current: Point },
}

#[derive(Debug)]
pub struct SelectionMachine {
    state: DragState,
    selection: Option<Selection>,
    newline_threshold: f32,
}

impl SelectionMachine {
    pub fn new(newline_threshold: f32) -> Self {
        Self {
            state: DragState::Idle,
            selection: None,
            newline_threshold,
        }
    }

    pub fn state(&self) -> DragState {
        self.state
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging { .. })
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    pub fn text(&self) -> &str {
        self.selection
            .as_ref()
            .map(|selection| selection.text.as_str())
            .unwrap_or("")
    }

    /// Starts a new drag at `point` (document space).
    ///
    /// Returns the selection this press discards so the caller can restore the pages it had
    /// highlighted.
    pub fn pointer_down(&mut self, point: Point) -> Option<Selection> {
        self.state = DragState::Dragging {
            anchor: point,
            current: point,
        };
        self.selection.take()
    }

    /// Updates the drag and returns the rectangle to draw as feedback.
    pub fn pointer_move(&mut self, point: Point) -> Option<Rect> {
        match &mut self.state {
            DragState::Dragging { anchor, current } => {
                *current = point;
                Some(Rect::from_corners(*anchor, *current))
            }
            DragState::Idle => None,
        }
    }

    pub fn drag_rect(&self) -> Option<Rect> {
        match self.state {
            DragState::Dragging { anchor, current } => Some(Rect::from_corners(anchor, current)),
            DragState::Idle => None,
        }
    }

    /// Finishes the drag and derives the selection.
    ///
    /// `words_for` yields the document-space words of a page, or `None` when they are not
    /// available; such pages simply contribute nothing.
    pub fn pointer_up<F>(
        &mut self,
        point: Point,
        layout: &DocumentLayout,
        words_for: F,
    ) -> Option<&Selection>
    where
        F: FnMut(&PageLayoutEntry) -> Option<Arc<[Word]>>,
    {
        let DragState::Dragging { anchor, .. } = self.state else {
            return None;
        };
        self.state = DragState::Idle;

        let rect = Rect::from_corners(anchor, point);
        let mut words = matched_words(&rect, layout, words_for);
        let text = reconstruct_text(&mut words, self.newline_threshold);
        self.selection = Some(Selection {
            anchor,
            current: point,
            words,
            text,
        });
        self.selection.as_ref()
    }

    /// Called when the layout scale changes: an in-progress drag is abandoned and a finished
    /// selection keeps only its text.
    pub fn invalidate_geometry(&mut self) {
        self.state = DragState::Idle;
        if let Some(selection) = self.selection.as_mut() {
            selection.drop_geometry();
        }
    }

    pub fn clear(&mut self) -> Option<Selection> {
        self.state = DragState::Idle;
        self.selection.take()
    }
}

/// Every word intersecting `rect`, gathered from the pages whose range overlaps its vertical
/// span, each attributed to the page containing its top edge.
pub fn matched_words<F>(
    rect: &Rect,
    layout: &DocumentLayout,
    mut words_for: F,
) -> Vec<SelectedWord>
where
    F: FnMut(&PageLayoutEntry) -> Option<Arc<[Word]>>,
{
    let mut matched = Vec::new();
    for entry in &layout.entries()[layout.pages_in_span(rect.top, rect.bottom)] {
        let Some(words) = words_for(entry) else {
            continue;
        };
        for word in words.iter().filter(|word| word.bounds.intersects(rect)) {
            let page_index = layout.page_at(word.bounds.top).unwrap_or(entry.page_index);
            matched.push(SelectedWord {
                page_index,
                word: word.clone(),
            });
        }
    }
    matched
}

/// Orders words top-to-bottom then left-to-right and joins them.
///
/// A newline separates two words whose top edges differ by more than `newline_threshold`;
/// otherwise a single space does.
pub fn reconstruct_text(words: &mut [SelectedWord], newline_threshold: f32) -> String {
    words.sort_by(|a, b| {
        a.word
            .bounds
            .top
            .total_cmp(&b.word.bounds.top)
            .then(a.word.bounds.left.total_cmp(&b.word.bounds.left))
    });

    let mut text = String::new();
    let mut last_top: Option<f32> = None;
    for selected in words.iter() {
        let top = selected.word.bounds.top;
        match last_top {
            Some(previous) if (top - previous).abs() > newline_threshold => text.push('\n'),
            Some(_) => text.push(' '),
            None => {}
        }
        text.push_str(&selected.word.text);
        last_top = Some(top);
    }
    text
}

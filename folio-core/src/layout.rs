use std::ops::Range;

use tracing::instrument;

use crate::config::ViewerConfig;
use crate::coords;
use crate::error::{ViewerError, ViewerResult};
use crate::geometry::{Rect, Size};
use crate::provider::PageGeometryProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleMode {
    FitWidth,
    Manual,
}

/// Placement of one page in document space at the layout's scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageLayoutEntry {
    pub page_index: usize,
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl PageLayoutEntry {
    pub fn bottom(&self) -> f32 {
        self.top + self.height
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(self.left, self.top, self.left + self.width, self.bottom())
    }
}

/// All pages stacked vertically, top to bottom.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentLayout {
    scale: f32,
    entries: Vec<PageLayoutEntry>,
    tops: Vec<f32>,
    size: Size,
}

impl DocumentLayout {
    pub fn empty(scale: f32) -> Self {
        Self {
            scale,
            entries: Vec::new(),
            tops: Vec::new(),
            size: Size::default(),
        }
    }

    /// Stacks pages of the given intrinsic sizes at `scale`.
    pub fn from_page_sizes(sizes: &[Size], scale: f32, config: &ViewerConfig) -> Self {
        if sizes.is_empty() {
            return Self::empty(scale);
        }

        let mut entries = Vec::with_capacity(sizes.len());
        let mut running = config.margin;
        let mut widest: f32 = 0.0;
        for (page_index, size) in sizes.iter().enumerate() {
            let scaled = size.scaled(scale);
            entries.push(PageLayoutEntry {
                page_index,
                left: config.margin,
                top: running,
                width: scaled.width,
                height: scaled.height,
            });
            widest = widest.max(scaled.width);
            running += scaled.height + config.spacing;
        }

        let tops = entries.iter().map(|entry| entry.top).collect();
        Self {
            scale,
            entries,
            tops,
            size: Size::new(widest + config.margin * 2.0, running),
        }
    }

    /// Rebuilds the whole layout from the document engine.
    #[instrument(skip(provider, config))]
    pub fn rebuild(
        provider: &dyn PageGeometryProvider,
        scale: f32,
        config: &ViewerConfig,
    ) -> ViewerResult<Self> {
        let sizes = (0..provider.page_count())
            .map(|page| {
                provider
                    .page_size(page)
                    .map_err(|err| ViewerError::provider(page, err))
            })
            .collect::<ViewerResult<Vec<_>>>()?;
        Ok(Self::from_page_sizes(&sizes, scale, config))
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[PageLayoutEntry] {
        &self.entries
    }

    pub fn tops(&self) -> &[f32] {
        &self.tops
    }

    pub fn get(&self, page_index: usize) -> Option<&PageLayoutEntry> {
        self.entries.get(page_index)
    }

    /// Panics when `page_index` is outside the layout; callers hold a valid index by
    /// construction.
    pub fn entry(&self, page_index: usize) -> &PageLayoutEntry {
        assert!(
            page_index < self.entries.len(),
            "page {} outside layout of {} pages",
            page_index,
            self.entries.len()
        );
        &self.entries[page_index]
    }

    pub fn page_at(&self, document_y: f32) -> Option<usize> {
        coords::page_at(&self.tops, document_y)
    }

    /// Pages whose claimed range overlaps the vertical span `[top, bottom]`.
    ///
    /// A page claims everything from its top edge down to the next page's top edge, so the
    /// gap below a page belongs to it and the last page claims everything below its top.
    pub fn pages_in_span(&self, top: f32, bottom: f32) -> Range<usize> {
        let first = self.page_at(top.min(bottom));
        let last = self.page_at(top.max(bottom));
        let (Some(first), Some(last)) = (first, last) else {
            return 0..0;
        };
        first..last + 1
    }
}

/// Scale that makes page 0 fill the viewport width minus both margins.
pub fn fit_width_scale(
    viewport_width: f32,
    first_page_width: f32,
    config: &ViewerConfig,
) -> Option<f32> {
    if first_page_width <= 0.0 || !first_page_width.is_finite() {
        return None;
    }
    let usable = viewport_width - config.margin * 2.0;
    if usable <= 0.0 || !usable.is_finite() {
        return None;
    }
    Some(usable / first_page_width)
}

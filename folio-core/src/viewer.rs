//! One open document: layout, scroll position, selection, search and rasters.
//!
//! Everything here runs on the interaction thread. Rasterization goes through the optional
//! [`RenderScheduler`]; without one, [`Viewer::render_missing`] renders synchronously.

use std::collections::BTreeSet;
use std::ops::Range;
use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::{debug, instrument, warn};

use crate::arena::PageArena;
use crate::background::RenderScheduler;
use crate::config::ViewerConfig;
use crate::coords::{rect_to_page_local, screen_to_document, Viewport};
use crate::error::{ViewerError, ViewerResult};
use crate::geometry::{Point, Rect, Size};
use crate::highlight::{paint_match, paint_page_selection, paint_selection};
use crate::layout::{fit_width_scale, DocumentLayout, ScaleMode};
use crate::page_range::{parse_page_range, PageRangeSet};
use crate::print_fit::{fit, FitTransform};
use crate::provider::{DocumentInfo, PageGeometryProvider, RenderImage, RenderRequest, Rotation};
use crate::search::{find_next, SearchMatch};
use crate::selection::SelectionMachine;
use crate::words::WordIndex;

/// Pages that received a raster and pages whose render failed, for one render pass or one
/// drain of background results.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RenderSummary {
    pub rendered: Vec<usize>,
    pub failed: Vec<usize>,
}

pub struct Viewer {
    provider: Arc<dyn PageGeometryProvider>,
    config: ViewerConfig,
    mode: ScaleMode,
    dark_mode: bool,
    layout: DocumentLayout,
    viewport: Viewport,
    words: WordIndex,
    arena: PageArena,
    selection: SelectionMachine,
    search: Option<SearchMatch>,
    last_query: Option<String>,
    failed: BTreeSet<usize>,
    scheduler: Option<RenderScheduler>,
}

impl Viewer {
    /// Lays out the document in fit-width mode for a viewport of `viewport_size`.
    #[instrument(skip(provider, config), fields(path = %provider.info().path.display()))]
    pub fn new(
        provider: Arc<dyn PageGeometryProvider>,
        config: ViewerConfig,
        viewport_size: Size,
        dark_mode: bool,
    ) -> ViewerResult<Self> {
        let page_count = provider.page_count();
        let mut viewer = Self {
            words: WordIndex::new(page_count, 1.0),
            arena: PageArena::new(page_count, 1.0, config.raster_capacity),
            selection: SelectionMachine::new(config.newline_threshold),
            layout: DocumentLayout::empty(1.0),
            viewport: Viewport::new(viewport_size.width, viewport_size.height),
            mode: ScaleMode::FitWidth,
            dark_mode,
            search: None,
            last_query: None,
            failed: BTreeSet::new(),
            scheduler: None,
            provider,
            config,
        };
        let scale = viewer.fit_width_target().unwrap_or(1.0);
        viewer
            .apply_scale(scale)
            .map_err(|err| ViewerError::DocumentOpen {
                path: viewer.provider.info().path.clone(),
                source: anyhow::Error::new(err),
            })?;
        Ok(viewer)
    }

    /// Moves rasterization onto a background worker on `handle`.
    pub fn attach_scheduler(&mut self, handle: &Handle) {
        self.scheduler = Some(RenderScheduler::spawn(handle, Arc::clone(&self.provider)));
    }

    pub fn info(&self) -> &DocumentInfo {
        self.provider.info()
    }

    pub fn provider(&self) -> &Arc<dyn PageGeometryProvider> {
        &self.provider
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn layout(&self) -> &DocumentLayout {
        &self.layout
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn scale(&self) -> f32 {
        self.layout.scale()
    }

    pub fn mode(&self) -> ScaleMode {
        self.mode
    }

    pub fn dark_mode(&self) -> bool {
        self.dark_mode
    }

    pub fn search_match(&self) -> Option<&SearchMatch> {
        self.search.as_ref()
    }

    pub fn drag_rect(&self) -> Option<Rect> {
        self.selection.drag_rect()
    }

    fn fit_width_target(&self) -> Option<f32> {
        let first = self.provider.page_size(0).ok()?;
        fit_width_scale(self.viewport.width, first.width, &self.config)
    }

    pub fn set_scale(&mut self, mode: ScaleMode) -> ViewerResult<()> {
        self.mode = mode;
        let scale = match mode {
            ScaleMode::FitWidth => self.fit_width_target().unwrap_or(self.scale()),
            ScaleMode::Manual => self.scale(),
        };
        self.apply_scale(scale)
    }

    /// Switches to manual mode at `scale`, which must lie strictly inside the configured range.
    pub fn set_manual_scale(&mut self, scale: f32) -> ViewerResult<()> {
        if !self.config.accepts_scale(scale) {
            return Err(ViewerError::ScaleOutOfRange {
                scale,
                min: self.config.min_scale,
                max: self.config.max_scale,
            });
        }
        self.mode = ScaleMode::Manual;
        self.apply_scale(scale)
    }

    /// Returns `false` when the step would leave the allowed range and was ignored.
    pub fn zoom_in(&mut self) -> ViewerResult<bool> {
        self.zoom_by(self.config.zoom_step)
    }

    pub fn zoom_out(&mut self) -> ViewerResult<bool> {
        self.zoom_by(1.0 / self.config.zoom_step)
    }

    fn zoom_by(&mut self, factor: f32) -> ViewerResult<bool> {
        let target = self.scale() * factor;
        if !self.config.accepts_scale(target) {
            debug!(target, "zoom step ignored");
            return Ok(false);
        }
        self.set_manual_scale(target)?;
        Ok(true)
    }

    pub fn resize_viewport(&mut self, width: f32, height: f32) -> ViewerResult<()> {
        self.viewport.width = width;
        self.viewport.height = height;
        if self.mode == ScaleMode::FitWidth {
            if let Some(scale) = self.fit_width_target() {
                self.apply_scale(scale)?;
            }
        }
        self.clamp_scroll();
        Ok(())
    }

    pub fn set_dark_mode(&mut self, dark_mode: bool) {
        if self.dark_mode == dark_mode {
            return;
        }
        self.dark_mode = dark_mode;
        self.invalidate_rasters();
    }

    /// Rebuilds everything that depends on the scale, keeping the reading position.
    #[instrument(skip(self))]
    fn apply_scale(&mut self, scale: f32) -> ViewerResult<()> {
        let anchor = self.reading_position();
        let layout = DocumentLayout::rebuild(self.provider.as_ref(), scale, &self.config)?;
        self.layout = layout;
        self.words.reset(self.layout.len(), scale);
        self.selection.invalidate_geometry();
        self.search = None;
        self.invalidate_rasters();

        if let Some((page_index, fraction)) = anchor {
            if let Some(entry) = self.layout.get(page_index) {
                self.viewport.scroll_y = entry.top + fraction * entry.height;
            }
        }
        self.clamp_scroll();
        Ok(())
    }

    fn invalidate_rasters(&mut self) {
        self.arena.reset(self.layout.len(), self.layout.scale());
        self.failed.clear();
        if let Some(scheduler) = &self.scheduler {
            scheduler.bump_generation();
        }
    }

    /// Current page and how far down into it the viewport's top edge sits. `None` while the
    /// top margin is still in view.
    fn reading_position(&self) -> Option<(usize, f32)> {
        let page_index = self.layout.page_at(self.viewport.scroll_y)?;
        let entry = self.layout.get(page_index)?;
        if self.viewport.scroll_y < entry.top {
            return None;
        }
        let fraction = if entry.height > 0.0 {
            ((self.viewport.scroll_y - entry.top) / entry.height).min(1.0)
        } else {
            0.0
        };
        Some((page_index, fraction))
    }

    fn clamp_scroll(&mut self) {
        let size = self.layout.size();
        let max_x = (size.width - self.viewport.width).max(0.0);
        let max_y = (size.height - self.viewport.height).max(0.0);
        self.viewport.scroll_x = self.viewport.scroll_x.clamp(0.0, max_x);
        self.viewport.scroll_y = self.viewport.scroll_y.clamp(0.0, max_y);
    }

    /// Brings `page_index` (clamped to the document) to the top of the viewport.
    pub fn scroll_to(&mut self, page_index: usize) {
        let Some(last) = self.layout.len().checked_sub(1) else {
            return;
        };
        let entry = self.layout.entry(page_index.min(last));
        self.viewport.scroll_y = entry.top;
        self.clamp_scroll();
    }

    pub fn scroll_by(&mut self, dx: f32, dy: f32) {
        self.viewport.scroll_x += dx;
        self.viewport.scroll_y += dy;
        self.clamp_scroll();
    }

    pub fn current_page(&self) -> usize {
        self.layout.page_at(self.viewport.scroll_y).unwrap_or(0)
    }

    pub fn page_count(&self) -> usize {
        self.layout.len()
    }

    pub fn visible_pages(&self) -> Range<usize> {
        let top = self.viewport.scroll_y;
        self.layout.pages_in_span(top, top + self.viewport.height)
    }

    pub fn on_pointer_down(&mut self, screen: Point) {
        let point = screen_to_document(screen, &self.viewport);
        self.selection.pointer_down(point);
        self.search = None;
        self.arena.clear_overlays();
    }

    pub fn on_pointer_move(&mut self, screen: Point) -> Option<Rect> {
        let point = screen_to_document(screen, &self.viewport);
        self.selection.pointer_move(point)
    }

    /// Finishes a drag and highlights the selected words. Returns the selected text, or `None`
    /// when no drag was in progress.
    #[instrument(skip(self))]
    pub fn on_pointer_up(&mut self, screen: Point) -> Option<String> {
        let point = screen_to_document(screen, &self.viewport);
        let words = &mut self.words;
        let provider = self.provider.as_ref();
        let selection = self.selection.pointer_up(point, &self.layout, |entry| {
            match words.page_words(provider, entry) {
                Ok(words) => Some(words),
                Err(err) => {
                    warn!(page = entry.page_index, error = %err, "word lookup failed");
                    None
                }
            }
        })?;

        let arena = &self.arena;
        let overlays = paint_selection(|page| arena.base(page), &self.layout, selection);
        let text = selection.text.clone();
        for (page_index, overlay) in overlays {
            self.arena.set_overlay(page_index, overlay);
        }
        Some(text)
    }

    pub fn current_selection_text(&self) -> &str {
        self.selection.text()
    }

    pub fn clear_selection(&mut self) {
        if let Some(previous) = self.selection.clear() {
            for page_index in previous.pages() {
                self.arena.clear_overlay(page_index);
            }
        }
    }

    /// Finds `query` starting at the current page, wrapping around.
    pub fn search(&mut self, query: &str) -> ViewerResult<bool> {
        let start = self.current_page();
        self.search_from(start, query)
    }

    /// Repeats the last query from the page after the last match.
    pub fn search_next(&mut self) -> ViewerResult<bool> {
        let Some(query) = self.last_query.clone() else {
            return Ok(false);
        };
        let start = match &self.search {
            Some(found) if self.page_count() > 0 => (found.page_index + 1) % self.page_count(),
            _ => self.current_page(),
        };
        self.search_from(start, &query)
    }

    #[instrument(skip(self))]
    fn search_from(&mut self, start: usize, query: &str) -> ViewerResult<bool> {
        self.clear_selection();
        self.search = None;
        self.arena.clear_overlays();
        self.last_query = Some(query.to_owned()).filter(|q| !q.trim().is_empty());

        let Some(hit) = find_next(self.provider.as_ref(), start, query)? else {
            return Ok(false);
        };
        if hit.page_index != self.current_page() {
            self.scroll_to(hit.page_index);
        }
        let entry = *self.layout.entry(hit.page_index);
        self.search = hit.to_match(&entry, self.scale());
        self.recomposite(hit.page_index);
        Ok(self.search.is_some())
    }

    pub fn parse_page_range(&self, spec: &str) -> ViewerResult<PageRangeSet> {
        parse_page_range(spec, self.page_count())
    }

    pub fn print_fit(&self, content: Size, target: Size) -> FitTransform {
        fit(content, target)
    }

    /// Sets an absolute rotation on `pages` and relayouts the document.
    #[instrument(skip(self, pages), fields(count = pages.len()))]
    pub fn rotate_pages(&mut self, pages: &PageRangeSet, rotation: Rotation) -> ViewerResult<()> {
        for page_index in pages.iter() {
            self.provider
                .rotate(page_index, rotation)
                .map_err(|err| ViewerError::provider(page_index, err))?;
        }
        let scale = match self.mode {
            ScaleMode::FitWidth => self.fit_width_target().unwrap_or(self.scale()),
            ScaleMode::Manual => self.scale(),
        };
        self.apply_scale(scale)
    }

    /// Overlay if the page is highlighted, else its base raster.
    pub fn display_raster(&self, page_index: usize) -> Option<&RenderImage> {
        self.arena.display(page_index)
    }

    pub fn has_raster(&self, page_index: usize) -> bool {
        self.arena.has_base(page_index)
    }

    /// Pages whose last render failed under the current scale and theme. They are not
    /// requested again until the rasters are invalidated.
    pub fn failed_pages(&self) -> &BTreeSet<usize> {
        &self.failed
    }

    /// Visible pages plus one on either side.
    fn nearby_pages(&self) -> Range<usize> {
        let visible = self.visible_pages();
        let start = visible.start.saturating_sub(1);
        let end = (visible.end + 1).min(self.page_count());
        start..end
    }

    fn wanted(&self, pages: Range<usize>) -> Vec<usize> {
        self.arena
            .missing(pages)
            .into_iter()
            .filter(|page_index| !self.failed.contains(page_index))
            .collect()
    }

    fn evict(&mut self) {
        let keep = self.nearby_pages();
        self.arena.evict_far_from(self.current_page(), keep);
    }

    fn record_failure(&mut self, page_index: usize, err: &ViewerError) {
        warn!(page = page_index, error = %err, "page render failed");
        self.failed.insert(page_index);
    }

    /// Renders every visible page that has no raster yet, on the calling thread.
    pub fn render_missing(&mut self) -> RenderSummary {
        let mut summary = RenderSummary::default();
        for page_index in self.wanted(self.visible_pages()) {
            let request = RenderRequest {
                page_index,
                scale: self.scale(),
                dark_mode: self.dark_mode,
            };
            match self.provider.render_page(request) {
                Ok(image) => {
                    self.install_base(page_index, request.scale, image);
                    summary.rendered.push(page_index);
                }
                Err(err) => {
                    self.record_failure(page_index, &ViewerError::provider(page_index, err));
                    summary.failed.push(page_index);
                }
            }
        }
        self.evict();
        summary
    }

    /// Queues background renders for visible pages and one page beyond either edge.
    pub fn request_visible(&self) {
        let Some(scheduler) = &self.scheduler else {
            return;
        };
        for page_index in self.wanted(self.nearby_pages()) {
            if !scheduler.is_pending(page_index) {
                scheduler.request(page_index, self.scale(), self.dark_mode);
            }
        }
    }

    /// Installs finished background renders and reports which pages changed or failed.
    pub fn accept_background(&mut self) -> RenderSummary {
        let mut summary = RenderSummary::default();
        let Some(scheduler) = self.scheduler.as_mut() else {
            return summary;
        };
        for result in scheduler.drain() {
            match result.outcome {
                Ok(image) => {
                    if self.install_base(result.page_index, result.scale, image) {
                        summary.rendered.push(result.page_index);
                    }
                }
                Err(err) => {
                    self.record_failure(result.page_index, &err);
                    summary.failed.push(result.page_index);
                }
            }
        }
        if !summary.rendered.is_empty() {
            self.evict();
        }
        summary
    }

    /// Awaits one background result and installs it; `false` when there is no worker.
    pub async fn wait_background(&mut self) -> bool {
        let Some(scheduler) = self.scheduler.as_mut() else {
            return false;
        };
        let Some(result) = scheduler.next_result().await else {
            return false;
        };
        match result.outcome {
            Ok(image) => self.install_base(result.page_index, result.scale, image),
            Err(err) => {
                self.record_failure(result.page_index, &err);
                false
            }
        }
    }

    fn install_base(&mut self, page_index: usize, scale: f32, image: RenderImage) -> bool {
        if !self.arena.insert_base(page_index, scale, image) {
            return false;
        }
        self.recomposite(page_index);
        true
    }

    /// Repaints the page's overlay from its base when it carries a highlight.
    fn recomposite(&mut self, page_index: usize) {
        let Some(base) = self.arena.base(page_index) else {
            return;
        };
        let Some(entry) = self.layout.get(page_index) else {
            return;
        };

        let overlay = if let Some(selection) = self
            .selection
            .selection()
            .filter(|selection| selection.pages().contains(&page_index))
        {
            Some(paint_page_selection(base, entry, selection.words_on(page_index)))
        } else {
            self.search
                .filter(|found| found.page_index == page_index)
                .map(|found| paint_match(base, &rect_to_page_local(&found.bounds, entry)))
        };

        if let Some(overlay) = overlay {
            self.arena.set_overlay(page_index, overlay);
        }
    }

    pub fn close(&mut self) {
        if let Some(mut scheduler) = self.scheduler.take() {
            scheduler.shutdown();
        }
    }
}

impl Drop for Viewer {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeDocument, PAPER};
    use crate::words::Word;

    /// Pages 300x200, 300x300, 300x250. A 340-wide viewport makes fit-width exactly 1.0.
    fn document() -> Arc<FakeDocument> {
        Arc::new(
            FakeDocument::three_pages("/docs/viewer.pdf")
                .with_words(
                    0,
                    vec![
                        Word::new("Intro", Rect::new(10.0, 10.0, 60.0, 22.0)),
                        Word::new("text", Rect::new(70.0, 10.0, 110.0, 22.0)),
                        Word::new("tail", Rect::new(10.0, 195.0, 50.0, 216.0)),
                    ],
                )
                .with_words(
                    1,
                    vec![
                        Word::new("head", Rect::new(10.0, 2.0, 50.0, 20.0)),
                        Word::new("needle", Rect::new(10.0, 100.0, 60.0, 112.0)),
                    ],
                )
                .with_words(2, vec![Word::new("needle", Rect::new(10.0, 10.0, 60.0, 22.0))]),
        )
    }

    fn viewer(doc: &Arc<FakeDocument>) -> Viewer {
        let provider: Arc<dyn PageGeometryProvider> = doc.clone();
        Viewer::new(
            provider,
            ViewerConfig::default(),
            Size::new(340.0, 400.0),
            false,
        )
        .unwrap()
    }

    #[test]
    fn opens_in_fit_width_mode() {
        let doc = document();
        let viewer = viewer(&doc);
        assert_eq!(viewer.mode(), ScaleMode::FitWidth);
        assert_eq!(viewer.scale(), 1.0);
        assert_eq!(viewer.layout().tops(), &[20.0, 240.0, 560.0]);
        assert_eq!(viewer.layout().size().height, 830.0);
        assert_eq!(viewer.current_page(), 0);
        assert_eq!(viewer.visible_pages(), 0..2);
    }

    #[test]
    fn zoom_steps_stay_inside_the_open_range() {
        let doc = document();
        let mut viewer = viewer(&doc);
        assert!(viewer.zoom_in().unwrap());
        assert_eq!(viewer.mode(), ScaleMode::Manual);
        assert!((viewer.scale() - 1.2).abs() < 1e-6);

        viewer.set_manual_scale(4.5).unwrap();
        assert!(!viewer.zoom_in().unwrap());
        assert_eq!(viewer.scale(), 4.5);

        assert!(matches!(
            viewer.set_manual_scale(5.0),
            Err(ViewerError::ScaleOutOfRange { .. })
        ));
        assert!(viewer.set_manual_scale(0.2).is_err());
    }

    #[test]
    fn fit_width_follows_viewport_resizes() {
        let doc = document();
        let mut viewer = viewer(&doc);
        viewer.resize_viewport(640.0, 400.0).unwrap();
        assert_eq!(viewer.scale(), 2.0);

        viewer.set_manual_scale(1.5).unwrap();
        viewer.resize_viewport(340.0, 400.0).unwrap();
        assert_eq!(viewer.scale(), 1.5);

        viewer.set_scale(ScaleMode::FitWidth).unwrap();
        assert_eq!(viewer.scale(), 1.0);
    }

    #[test]
    fn scroll_to_clamps_and_tracks_current_page() {
        let doc = document();
        let mut viewer = viewer(&doc);
        viewer.resize_viewport(340.0, 100.0).unwrap();
        viewer.scroll_to(1);
        assert_eq!(viewer.viewport().scroll_y, 240.0);
        assert_eq!(viewer.current_page(), 1);

        viewer.scroll_to(99);
        assert_eq!(viewer.current_page(), 2);

        viewer.scroll_by(0.0, -10_000.0);
        assert_eq!(viewer.viewport().scroll_y, 0.0);
    }

    #[test]
    fn zoom_keeps_the_reading_position() {
        let doc = document();
        let mut viewer = viewer(&doc);
        viewer.resize_viewport(340.0, 100.0).unwrap();
        viewer.scroll_to(1);
        viewer.zoom_in().unwrap();
        assert_eq!(viewer.current_page(), 1);
        assert_eq!(viewer.viewport().scroll_y, viewer.layout().entry(1).top);
    }

    #[test]
    fn drag_selects_and_highlights_across_pages() {
        let doc = document();
        let mut viewer = viewer(&doc);
        viewer.render_missing();

        viewer.on_pointer_down(Point::new(0.0, 235.0));
        viewer.on_pointer_move(Point::new(200.0, 240.0));
        let text = viewer.on_pointer_up(Point::new(400.0, 245.0)).unwrap();
        assert_eq!(text, "tail\nhead");
        assert_eq!(viewer.current_selection_text(), "tail\nhead");

        let base = viewer.arena.base(0).unwrap().clone();
        assert_ne!(viewer.display_raster(0), Some(&base));
        assert_eq!(viewer.arena.overlay_pages(), vec![0, 1]);

        viewer.on_pointer_down(Point::new(5.0, 5.0));
        assert_eq!(viewer.display_raster(0), Some(&base));
        assert_eq!(viewer.current_selection_text(), "");
    }

    #[test]
    fn words_are_fetched_once_per_scale() {
        let doc = document();
        let mut viewer = viewer(&doc);
        for _ in 0..3 {
            viewer.on_pointer_down(Point::new(0.0, 25.0));
            viewer.on_pointer_up(Point::new(300.0, 40.0));
        }
        assert_eq!(doc.word_queries(), 1);

        viewer.zoom_in().unwrap();
        viewer.on_pointer_down(Point::new(0.0, 25.0));
        viewer.on_pointer_up(Point::new(300.0, 40.0));
        assert_eq!(doc.word_queries(), 2);
    }

    #[test]
    fn rescale_keeps_selected_text() {
        let doc = document();
        let mut viewer = viewer(&doc);
        viewer.on_pointer_down(Point::new(0.0, 25.0));
        viewer.on_pointer_up(Point::new(300.0, 40.0));
        viewer.zoom_in().unwrap();
        assert_eq!(viewer.current_selection_text(), "Intro text");
    }

    #[test]
    fn search_scrolls_to_the_match_and_outlines_it() {
        let doc = document();
        let mut viewer = viewer(&doc);
        viewer.resize_viewport(340.0, 100.0).unwrap();
        assert!(viewer.search("needle").unwrap());
        let found = *viewer.search_match().unwrap();
        assert_eq!(found.page_index, 1);
        assert_eq!(found.count, 1);
        assert_eq!(found.bounds, Rect::new(30.0, 340.0, 80.0, 352.0));
        assert_eq!(viewer.current_page(), 1);

        viewer.render_missing();
        assert!(viewer.arena.overlay(1).is_some());

        assert!(viewer.search_next().unwrap());
        assert_eq!(viewer.search_match().unwrap().page_index, 2);
        assert!(viewer.search_next().unwrap());
        assert_eq!(viewer.search_match().unwrap().page_index, 1);

        assert!(!viewer.search("missing").unwrap());
        assert!(viewer.search_match().is_none());
    }

    #[test]
    fn rotation_relayouts_the_document() {
        let doc = document();
        let mut viewer = viewer(&doc);
        viewer.set_manual_scale(1.0).unwrap();
        let pages = viewer.parse_page_range("1").unwrap();
        viewer.rotate_pages(&pages, Rotation::Clockwise90).unwrap();
        assert_eq!(doc.rotation(0), Rotation::Clockwise90);
        assert_eq!(viewer.layout().entry(0).height, 300.0);
        assert_eq!(viewer.layout().entry(1).top, 340.0);
        assert_eq!(viewer.layout().entry(2).top, 660.0);
        assert_eq!(viewer.layout().size().width, 340.0);
    }

    #[test]
    fn failed_pages_keep_rendering_the_rest() {
        let doc = Arc::new(FakeDocument::three_pages("/docs/damaged.pdf").failing_on(1));
        let mut viewer = viewer(&doc);
        let summary = viewer.render_missing();
        assert_eq!(summary.rendered, vec![0]);
        assert_eq!(summary.failed, vec![1]);
        assert_eq!(
            viewer.display_raster(0),
            Some(&RenderImage::blank(300, 200, PAPER))
        );
        assert!(viewer.display_raster(1).is_none());

        let again = viewer.render_missing();
        assert!(again.rendered.is_empty() && again.failed.is_empty());
        assert_eq!(doc.renders(), 2);
        assert!(viewer.failed_pages().contains(&1));

        viewer.set_dark_mode(true);
        assert!(viewer.failed_pages().is_empty());
        assert_eq!(viewer.render_missing().failed, vec![1]);
    }

    #[test]
    fn visible_pages_survive_eviction() {
        let doc = Arc::new(FakeDocument::new(
            "/docs/strips.pdf",
            vec![Size::new(300.0, 40.0); 30],
        ));
        let provider: Arc<dyn PageGeometryProvider> = doc.clone();
        let mut viewer =
            Viewer::new(provider, ViewerConfig::default(), Size::new(340.0, 2000.0), false)
                .unwrap();
        assert_eq!(viewer.visible_pages(), 0..30);

        assert_eq!(viewer.render_missing().rendered.len(), 30);
        assert!((0..30).all(|page| viewer.display_raster(page).is_some()));
        assert!(viewer.render_missing().rendered.is_empty());
        assert_eq!(doc.renders(), 30);
    }

    #[tokio::test]
    async fn background_failures_are_reported_once() {
        let doc = Arc::new(FakeDocument::three_pages("/docs/broken.pdf").failing_on(0));
        let mut viewer = viewer(&doc);
        viewer.attach_scheduler(&Handle::current());

        let mut failed = Vec::new();
        let mut rendered = Vec::new();
        for _ in 0..20 {
            let summary = viewer.accept_background();
            failed.extend(summary.failed);
            rendered.extend(summary.rendered);
            viewer.request_visible();
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }

        assert_eq!(failed, vec![0]);
        rendered.sort_unstable();
        assert_eq!(rendered, vec![1, 2]);
        assert_eq!(doc.renders(), 3);
        viewer.close();
    }

    #[tokio::test]
    async fn background_results_land_in_the_arena() {
        let doc = document();
        let mut viewer = viewer(&doc);
        viewer.attach_scheduler(&Handle::current());
        viewer.request_visible();

        let mut installed = 0;
        while installed < 3 {
            assert!(viewer.wait_background().await);
            installed += 1;
        }
        assert!(viewer.has_raster(0) && viewer.has_raster(1) && viewer.has_raster(2));
        assert_eq!(viewer.accept_background(), RenderSummary::default());
        viewer.close();
    }
}

use tracing::{debug, instrument, warn};

use crate::error::{ViewerError, ViewerResult};
use crate::geometry::Rect;
use crate::layout::PageLayoutEntry;
use crate::provider::PageGeometryProvider;

/// Every box the engine reported on the first page that matched, in page-native units.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub page_index: usize,
    pub boxes: Vec<Rect>,
}

impl SearchHit {
    /// Only the first box drives navigation and highlight.
    pub fn primary(&self) -> Option<&Rect> {
        self.boxes.first()
    }

    pub fn to_match(&self, entry: &PageLayoutEntry, scale: f32) -> Option<SearchMatch> {
        let primary = self.primary()?;
        Some(SearchMatch {
            page_index: self.page_index,
            bounds: primary.scaled(scale).translated(entry.left, entry.top),
            count: self.boxes.len(),
        })
    }
}

/// The highlighted search result, in document space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchMatch {
    pub page_index: usize,
    pub bounds: Rect,
    pub count: usize,
}

/// Searches `start_page`, then the following pages, wrapping around to page 0.
///
/// A page the engine cannot search is skipped. When no page matched and at least one failed,
/// the first failure is returned instead of `Ok(None)`.
#[instrument(skip(provider), fields(pages = provider.page_count()))]
pub fn find_next(
    provider: &dyn PageGeometryProvider,
    start_page: usize,
    query: &str,
) -> ViewerResult<Option<SearchHit>> {
    let page_count = provider.page_count();
    if query.trim().is_empty() || page_count == 0 {
        return Ok(None);
    }

    let start = start_page.min(page_count - 1);
    let mut failure = None;
    for page_index in (start..page_count).chain(0..start) {
        match provider.search(page_index, query) {
            Ok(boxes) => {
                let boxes: Vec<Rect> = boxes.into_iter().filter(Rect::is_valid).collect();
                if !boxes.is_empty() {
                    debug!(page = page_index, count = boxes.len(), "search hit");
                    return Ok(Some(SearchHit { page_index, boxes }));
                }
            }
            Err(err) => {
                warn!(page = page_index, error = %err, "search failed on page");
                failure.get_or_insert((page_index, err));
            }
        }
    }

    match failure {
        Some((page_index, err)) => Err(ViewerError::provider(page_index, err)),
        None => Ok(None),
    }
}

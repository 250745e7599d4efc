use std::sync::Arc;

use tracing::{debug, instrument};

use crate::error::{ViewerError, ViewerResult};
use crate::geometry::Rect;
use crate::layout::PageLayoutEntry;
use crate::provider::PageGeometryProvider;

/// A run of characters with a single bounding box.
///
/// The engine reports words in page-native units; the index stores them in document space.
#[derive(Debug, Clone, PartialEq)]
pub struct Word {
    pub text: String,
    pub bounds: Rect,
}

impl Word {
    pub fn new(text: impl Into<String>, bounds: Rect) -> Self {
        Self {
            text: text.into(),
            bounds,
        }
    }
}

/// Maps page-native words into document space: `local * scale + (left, top)`.
pub fn place_words(native: Vec<Word>, entry: &PageLayoutEntry, scale: f32) -> Vec<Word> {
    native
        .into_iter()
        .filter(|word| !word.text.trim().is_empty() && word.bounds.is_valid())
        .map(|word| Word {
            text: word.text,
            bounds: word.bounds.scaled(scale).translated(entry.left, entry.top),
        })
        .collect()
}

/// Per-page word lists for one scale, built lazily and dropped together on rescale.
#[derive(Debug, Default)]
pub struct WordIndex {
    scale: f32,
    pages: Vec<Option<Arc<[Word]>>>,
}

impl WordIndex {
    pub fn new(page_count: usize, scale: f32) -> Self {
        Self {
            scale,
            pages: vec![None; page_count],
        }
    }

    pub fn reset(&mut self, page_count: usize, scale: f32) {
        self.scale = scale;
        self.pages.clear();
        self.pages.resize(page_count, None);
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn cached(&self, page_index: usize) -> Option<Arc<[Word]>> {
        self.pages.get(page_index).and_then(|slot| slot.clone())
    }

    pub fn built_pages(&self) -> usize {
        self.pages.iter().filter(|slot| slot.is_some()).count()
    }

    /// Words of the page in document space, asking the engine only on first use.
    ///
    /// A failure is reported for this page alone; nothing is cached for it so the next call
    /// retries.
    pub fn page_words(
        &mut self,
        provider: &dyn PageGeometryProvider,
        entry: &PageLayoutEntry,
    ) -> ViewerResult<Arc<[Word]>> {
        if let Some(words) = self.cached(entry.page_index) {
            return Ok(words);
        }
        let words: Arc<[Word]> = Self::build(provider, entry, self.scale)?.into();
        if let Some(slot) = self.pages.get_mut(entry.page_index) {
            *slot = Some(Arc::clone(&words));
        }
        Ok(words)
    }

    #[instrument(skip(provider, entry), fields(page = entry.page_index))]
    pub fn build(
        provider: &dyn PageGeometryProvider,
        entry: &PageLayoutEntry,
        scale: f32,
    ) -> ViewerResult<Vec<Word>> {
        let native = provider
            .words(entry.page_index)
            .map_err(|err| ViewerError::provider(entry.page_index, err))?;
        let words = place_words(native, entry, scale);
        debug!(count = words.len(), "indexed page words");
        Ok(words)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> PageLayoutEntry {
        PageLayoutEntry {
            page_index: 1,
            left: 20.0,
            top: 240.0,
            width: 200.0,
            height: 300.0,
        }
    }

    #[test]
    fn place_words_scales_then_offsets() {
        let native = vec![Word::new("alpha", Rect::new(10.0, 5.0, 30.0, 15.0))];
        let placed = place_words(native, &entry(), 2.0);
        assert_eq!(placed[0].bounds, Rect::new(40.0, 250.0, 80.0, 270.0));
        assert_eq!(placed[0].text, "alpha");
    }

    #[test]
    fn place_words_drops_blank_and_degenerate_entries() {
        let native = vec![
            Word::new(" ", Rect::new(0.0, 0.0, 1.0, 1.0)),
            Word::new("bad", Rect::new(5.0, 5.0, 1.0, 1.0)),
            Word::new("ok", Rect::new(0.0, 0.0, 1.0, 1.0)),
        ];
        let placed = place_words(native, &entry(), 1.0);
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].text, "ok");
    }

    #[test]
    fn reset_drops_every_page() {
        let mut index = WordIndex::new(2, 1.0);
        index.pages[0] = Some(Arc::from(vec![Word::new("x", Rect::default())]));
        assert_eq!(index.built_pages(), 1);

        index.reset(3, 1.5);
        assert_eq!(index.built_pages(), 0);
        assert_eq!(index.scale(), 1.5);
        assert!(index.cached(2).is_none());
    }
}

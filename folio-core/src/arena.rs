//! Per-page raster slots.
//!
//! Each page owns one base raster (as rendered by the engine) and at most one overlay painted
//! from that base. Slots are tagged with the quantized scale they were rendered at, so a late
//! result from a previous scale can never be displayed.

use std::ops::Range;
use std::sync::Arc;

use tracing::debug;

use crate::provider::RenderImage;

/// Scale in thousandths, so tiny float drift maps to the same key.
pub fn quantize_scale(scale: f32) -> u32 {
    let scaled = (scale * 1000.0).round();
    if !scaled.is_finite() || scaled <= 0.0 {
        1
    } else {
        scaled as u32
    }
}

#[derive(Debug, Clone, Default)]
struct PageSlot {
    base: Option<Arc<RenderImage>>,
    overlay: Option<Arc<RenderImage>>,
}

#[derive(Debug)]
pub struct PageArena {
    scale_key: u32,
    capacity: usize,
    slots: Vec<PageSlot>,
}

impl PageArena {
    pub fn new(page_count: usize, scale: f32, capacity: usize) -> Self {
        Self {
            scale_key: quantize_scale(scale),
            capacity: capacity.max(1),
            slots: vec![PageSlot::default(); page_count],
        }
    }

    /// Drops every raster and retags the arena for `scale`.
    pub fn reset(&mut self, page_count: usize, scale: f32) {
        self.scale_key = quantize_scale(scale);
        self.slots.clear();
        self.slots.resize(page_count, PageSlot::default());
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn accepts(&self, scale: f32) -> bool {
        quantize_scale(scale) == self.scale_key
    }

    /// Stores a freshly rendered base. Any overlay of the page was painted from the previous
    /// base and is dropped. Returns `false` when the raster belongs to another scale.
    pub fn insert_base(&mut self, page_index: usize, scale: f32, image: RenderImage) -> bool {
        if !self.accepts(scale) {
            debug!(page = page_index, scale, "discarding raster for another scale");
            return false;
        }
        let Some(slot) = self.slots.get_mut(page_index) else {
            return false;
        };
        slot.base = Some(Arc::new(image));
        slot.overlay = None;
        true
    }

    pub fn base(&self, page_index: usize) -> Option<&RenderImage> {
        self.slots.get(page_index)?.base.as_deref()
    }

    pub fn has_base(&self, page_index: usize) -> bool {
        self.base(page_index).is_some()
    }

    pub fn overlay(&self, page_index: usize) -> Option<&RenderImage> {
        self.slots.get(page_index)?.overlay.as_deref()
    }

    pub fn set_overlay(&mut self, page_index: usize, image: RenderImage) {
        if let Some(slot) = self.slots.get_mut(page_index) {
            slot.overlay = Some(Arc::new(image));
        }
    }

    /// Restores the base raster of `page_index`.
    pub fn clear_overlay(&mut self, page_index: usize) {
        if let Some(slot) = self.slots.get_mut(page_index) {
            slot.overlay = None;
        }
    }

    pub fn clear_overlays(&mut self) {
        for slot in &mut self.slots {
            slot.overlay = None;
        }
    }

    pub fn overlay_pages(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.overlay.is_some())
            .map(|(page_index, _)| page_index)
            .collect()
    }

    /// What the canvas shows for a page: its overlay when highlighted, else its base.
    pub fn display(&self, page_index: usize) -> Option<&RenderImage> {
        let slot = self.slots.get(page_index)?;
        slot.overlay.as_deref().or(slot.base.as_deref())
    }

    pub fn missing(&self, pages: Range<usize>) -> Vec<usize> {
        pages.filter(|&page| !self.has_base(page)).collect()
    }

    pub fn cached_pages(&self) -> usize {
        self.slots.iter().filter(|slot| slot.base.is_some()).count()
    }

    /// Keeps at most `capacity` bases, dropping those farthest from `current_page` first.
    /// Highlighted pages and pages inside `keep` are never dropped, even past capacity.
    pub fn evict_far_from(&mut self, current_page: usize, keep: Range<usize>) {
        let kept = self
            .slots
            .iter()
            .enumerate()
            .filter(|(page_index, slot)| slot.base.is_some() && keep.contains(page_index))
            .count();
        let mut held: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(page_index, slot)| {
                slot.base.is_some() && slot.overlay.is_none() && !keep.contains(page_index)
            })
            .map(|(page_index, _)| page_index)
            .collect();
        let room = self.capacity.saturating_sub(kept);
        if held.len() <= room {
            return;
        }
        held.sort_by_key(|page| page.abs_diff(current_page));
        for page in held.into_iter().skip(room) {
            self.slots[page].base = None;
        }
    }
}

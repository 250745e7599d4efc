//! Selection and search-match overlays.
//!
//! Every overlay is painted onto a fresh copy of the page's base raster; an overlay is never
//! used as the base of another one.

use std::collections::BTreeMap;

use crate::coords::rect_to_page_local;
use crate::geometry::Rect;
use crate::layout::{DocumentLayout, PageLayoutEntry};
use crate::provider::RenderImage;
use crate::selection::Selection;
use crate::words::Word;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paint {
    pub rgb: [u8; 3],
    pub alpha: u8,
}

impl Paint {
    pub const fn new(rgb: [u8; 3], alpha: u8) -> Self {
        Self { rgb, alpha }
    }
}

pub const SELECTION_FILL: Paint = Paint::new([255, 215, 0], 100);
pub const SELECTION_BORDER: Paint = Paint::new([255, 165, 0], 200);
pub const SELECTION_BORDER_WIDTH: u32 = 2;
pub const MATCH_OUTLINE: Paint = Paint::new([255, 140, 0], 255);
pub const MATCH_OUTLINE_WIDTH: u32 = 3;

/// Integer pixel box, half-open on the right and bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

/// Rasters are rendered at the layout scale, so one page-local unit is one pixel.
pub fn to_pixel_rect(local: &Rect, image: &RenderImage) -> Option<PixelRect> {
    if image.width == 0 || image.height == 0 || !local.is_valid() {
        return None;
    }
    let max_x = image.width as f32;
    let max_y = image.height as f32;
    let x0 = local.left.floor().clamp(0.0, max_x) as u32;
    let x1 = local.right.ceil().clamp(0.0, max_x) as u32;
    let y0 = local.top.floor().clamp(0.0, max_y) as u32;
    let y1 = local.bottom.ceil().clamp(0.0, max_y) as u32;
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some(PixelRect { x0, y0, x1, y1 })
}

/// Overlays for every page the selection touches, keyed by page index.
///
/// Pages without a base raster are skipped; the caller paints them once the raster arrives.
pub fn paint_selection<'a, F>(
    base_for: F,
    layout: &DocumentLayout,
    selection: &Selection,
) -> BTreeMap<usize, RenderImage>
where
    F: Fn(usize) -> Option<&'a RenderImage>,
{
    let mut overlays = BTreeMap::new();
    for page_index in selection.pages() {
        let (Some(base), Some(entry)) = (base_for(page_index), layout.get(page_index)) else {
            continue;
        };
        let overlay = paint_page_selection(base, entry, selection.words_on(page_index));
        overlays.insert(page_index, overlay);
    }
    overlays
}

pub fn paint_page_selection<'w>(
    base: &RenderImage,
    entry: &PageLayoutEntry,
    words: impl Iterator<Item = &'w Word>,
) -> RenderImage {
    let mut image = base.clone();
    for word in words {
        let local = rect_to_page_local(&word.bounds, entry);
        if let Some(rect) = to_pixel_rect(&local, &image) {
            fill_bordered_rect(
                &mut image,
                rect,
                Some(SELECTION_FILL),
                SELECTION_BORDER,
                SELECTION_BORDER_WIDTH,
            );
        }
    }
    image
}

/// Outlines one search match given in page-local units.
pub fn paint_match(base: &RenderImage, local_box: &Rect) -> RenderImage {
    let mut image = base.clone();
    if let Some(rect) = to_pixel_rect(local_box, &image) {
        fill_bordered_rect(&mut image, rect, None, MATCH_OUTLINE, MATCH_OUTLINE_WIDTH);
    }
    image
}

/// Paints `rect` in a single pass so border and fill never blend twice over the same pixel.
fn fill_bordered_rect(
    image: &mut RenderImage,
    rect: PixelRect,
    fill: Option<Paint>,
    border: Paint,
    border_width: u32,
) {
    let width = image.width as usize;
    let x1 = rect.x1.min(image.width);
    let y1 = rect.y1.min(image.height);
    let x0 = rect.x0.min(x1);
    let y0 = rect.y0.min(y1);

    for y in y0..y1 {
        let row_start = (y as usize) * width * 4;
        for x in x0..x1 {
            let on_border = x < x0 + border_width
                || x + border_width >= x1
                || y < y0 + border_width
                || y + border_width >= y1;
            let paint = if on_border { Some(border) } else { fill };
            if let Some(paint) = paint {
                let idx = row_start + (x as usize) * 4;
                blend_pixel(&mut image.pixels[idx..idx + 4], paint);
            }
        }
    }
}

fn blend_pixel(pixel: &mut [u8], paint: Paint) {
    let alpha = paint.alpha as f32 / 255.0;
    let inv = 1.0 - alpha;
    for (channel, color) in pixel.iter_mut().take(3).zip(paint.rgb) {
        *channel = ((*channel as f32 * inv) + (color as f32 * alpha))
            .round()
            .clamp(0.0, 255.0) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ViewerConfig;
    use crate::geometry::{Point, Size};
    use crate::selection::SelectedWord;

    const WHITE: [u8; 4] = [255, 255, 255, 255];

    fn layout() -> DocumentLayout {
        DocumentLayout::from_page_sizes(
            &[Size::new(40.0, 40.0), Size::new(40.0, 40.0)],
            1.0,
            &ViewerConfig::default(),
        )
    }

    fn selection_on_page_one() -> Selection {
        // Page 1 sits at (20, 80); the word covers local (10, 10)..(30, 20).
        Selection {
            anchor: Point::new(0.0, 0.0),
            current: Point::new(100.0, 200.0),
            words: vec![SelectedWord {
                page_index: 1,
                word: Word::new("w", Rect::new(30.0, 90.0, 50.0, 100.0)),
            }],
            text: "w".into(),
        }
    }

    #[test]
    fn selection_fills_interior_and_borders_edges() {
        let base = RenderImage::blank(40, 40, WHITE);
        let layout = layout();
        let selection = selection_on_page_one();

        let overlays = paint_selection(|_| Some(&base), &layout, &selection);
        assert_eq!(overlays.keys().copied().collect::<Vec<_>>(), vec![1]);
        let overlay = &overlays[&1];

        let interior = overlay.pixel(20, 15).unwrap();
        assert_eq!(interior, [255, 239, 155, 255]);
        let edge = overlay.pixel(10, 15).unwrap();
        assert_eq!(edge, [255, 184, 55, 255]);
        assert_eq!(overlay.pixel(5, 5).unwrap(), WHITE);
    }

    #[test]
    fn repainting_starts_from_the_base_every_time() {
        let base = RenderImage::blank(40, 40, WHITE);
        let layout = layout();
        let selection = selection_on_page_one();

        let first = paint_selection(|_| Some(&base), &layout, &selection);
        let second = paint_selection(|_| Some(&base), &layout, &selection);
        assert_eq!(first, second);
        assert_eq!(base.pixel(20, 15).unwrap(), WHITE);
    }

    #[test]
    fn pages_without_raster_are_skipped() {
        let layout = layout();
        let overlays = paint_selection(|_| None, &layout, &selection_on_page_one());
        assert!(overlays.is_empty());
    }

    #[test]
    fn match_outline_leaves_interior_untouched() {
        let base = RenderImage::blank(40, 40, WHITE);
        let overlay = paint_match(&base, &Rect::new(5.0, 5.0, 35.0, 25.0));
        assert_eq!(overlay.pixel(5, 5).unwrap(), [255, 140, 0, 255]);
        assert_eq!(overlay.pixel(7, 15).unwrap(), [255, 140, 0, 255]);
        assert_eq!(overlay.pixel(8, 15).unwrap(), WHITE);
        assert_eq!(overlay.pixel(20, 15).unwrap(), WHITE);
    }

    #[test]
    fn boxes_outside_the_raster_are_ignored() {
        let base = RenderImage::blank(10, 10, WHITE);
        assert_eq!(to_pixel_rect(&Rect::new(20.0, 20.0, 30.0, 30.0), &base), None);
        let clipped = to_pixel_rect(&Rect::new(-5.0, 2.0, 4.5, 12.0), &base).unwrap();
        assert_eq!(clipped, PixelRect { x0: 0, y0: 2, x1: 5, y1: 10 });
    }
}

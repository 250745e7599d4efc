//! Page orientation.
//!
//! Text and search boxes are reported in the page's unrotated space while the raster and the
//! reported page size follow the page's `/Rotate`. Boxes are first made top-left based in the
//! unrotated space, then turned with the page.

use folio_core::{Point, Rect, Rotation, Size};

/// Size of the page before `rotation` was applied to it.
pub fn unrotated_size(displayed: Size, rotation: Rotation) -> Size {
    match rotation {
        Rotation::Clockwise90 | Rotation::Clockwise270 => {
            Size::new(displayed.height, displayed.width)
        }
        Rotation::None | Rotation::Clockwise180 => displayed,
    }
}

/// Maps a top-left based rectangle on the unrotated page of size `unrotated` onto the page as
/// displayed after a clockwise `rotation`.
pub fn orient_rect(rect: &Rect, unrotated: Size, rotation: Rotation) -> Rect {
    let turn = |x: f32, y: f32| -> Point {
        match rotation {
            Rotation::None => Point::new(x, y),
            Rotation::Clockwise90 => Point::new(unrotated.height - y, x),
            Rotation::Clockwise180 => Point::new(unrotated.width - x, unrotated.height - y),
            Rotation::Clockwise270 => Point::new(y, unrotated.width - x),
        }
    };
    Rect::from_corners(turn(rect.left, rect.top), turn(rect.right, rect.bottom))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LETTER: Size = Size::new(612.0, 792.0);

    #[test]
    fn quarter_turns_swap_the_page_size() {
        let displayed = Size::new(792.0, 612.0);
        assert_eq!(unrotated_size(displayed, Rotation::Clockwise90), LETTER);
        assert_eq!(unrotated_size(displayed, Rotation::Clockwise270), LETTER);
        assert_eq!(unrotated_size(LETTER, Rotation::Clockwise180), LETTER);
    }

    #[test]
    fn unrotated_boxes_are_unchanged() {
        let word = Rect::new(100.0, 92.0, 140.0, 104.0);
        assert_eq!(orient_rect(&word, LETTER, Rotation::None), word);
    }

    #[test]
    fn clockwise_turns_move_the_top_left_corner_around_the_page() {
        // A word near the top-left corner of a portrait page.
        let word = Rect::new(100.0, 92.0, 140.0, 104.0);

        let quarter = orient_rect(&word, LETTER, Rotation::Clockwise90);
        assert_eq!(quarter, Rect::new(688.0, 100.0, 700.0, 140.0));

        let half = orient_rect(&word, LETTER, Rotation::Clockwise180);
        assert_eq!(half, Rect::new(472.0, 688.0, 512.0, 700.0));

        let three_quarters = orient_rect(&word, LETTER, Rotation::Clockwise270);
        assert_eq!(three_quarters, Rect::new(92.0, 472.0, 104.0, 512.0));
    }

    #[test]
    fn rotated_boxes_stay_on_the_displayed_page() {
        let word = Rect::new(100.0, 92.0, 140.0, 104.0);
        for rotation in [
            Rotation::Clockwise90,
            Rotation::Clockwise180,
            Rotation::Clockwise270,
        ] {
            let displayed = unrotated_size(LETTER, rotation);
            let placed = orient_rect(&word, LETTER, rotation);
            assert!(placed.is_valid());
            assert!(placed.left >= 0.0 && placed.right <= displayed.width);
            assert!(placed.top >= 0.0 && placed.bottom <= displayed.height);
            assert!((placed.width() * placed.height() - 480.0).abs() < 1e-3);
        }
    }
}

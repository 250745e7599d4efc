use crate::geometry::{Point, Size};

/// ISO A4 in points.
pub const A4: Size = Size::new(595.0, 842.0);

/// Uniform scale plus translation that places content on a target page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitTransform {
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl FitTransform {
    pub const IDENTITY: FitTransform = FitTransform {
        scale: 1.0,
        offset_x: 0.0,
        offset_y: 0.0,
    };

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    pub fn apply(&self, point: Point) -> Point {
        Point::new(
            point.x * self.scale + self.offset_x,
            point.y * self.scale + self.offset_y,
        )
    }
}

/// Shrinks `content` to fit inside `target`, centred. Content that already fits is left
/// alone; enlarging is never done.
pub fn fit(content: Size, target: Size) -> FitTransform {
    if content.width <= 0.0 || content.height <= 0.0 {
        return FitTransform::IDENTITY;
    }
    let scale = (target.width / content.width).min(target.height / content.height);
    if !scale.is_finite() || scale >= 1.0 {
        return FitTransform::IDENTITY;
    }
    FitTransform {
        scale,
        offset_x: (target.width - content.width * scale) / 2.0,
        offset_y: (target.height - content.height * scale) / 2.0,
    }
}

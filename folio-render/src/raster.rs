use anyhow::Result;
use folio_core::RenderImage;
use image::DynamicImage;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RasterError {
    #[error("engine produced an empty {width}x{height} bitmap")]
    Empty { width: u32, height: u32 },
}

pub fn to_render_image(image: DynamicImage, dark_mode: bool) -> Result<RenderImage> {
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    if width == 0 || height == 0 {
        return Err(RasterError::Empty { width, height }.into());
    }
    let mut pixels = rgba.into_raw();
    if dark_mode {
        invert_pixels(&mut pixels);
    }
    Ok(RenderImage {
        width,
        height,
        pixels,
    })
}

/// Inverts colour channels in place, leaving alpha alone.
pub fn invert_pixels(pixels: &mut [u8]) {
    for chunk in pixels.chunks_exact_mut(4) {
        chunk[0] = 255 - chunk[0];
        chunk[1] = 255 - chunk[1];
        chunk[2] = 255 - chunk[2];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn converts_to_rgba_and_inverts_for_dark_mode() {
        let mut rgb = RgbImage::new(2, 1);
        rgb.put_pixel(0, 0, Rgb([255, 255, 255]));
        rgb.put_pixel(1, 0, Rgb([10, 20, 30]));

        let light = to_render_image(DynamicImage::ImageRgb8(rgb.clone()), false).unwrap();
        assert_eq!(light.pixel(1, 0), Some([10, 20, 30, 255]));

        let dark = to_render_image(DynamicImage::ImageRgb8(rgb), true).unwrap();
        assert_eq!(dark.pixel(0, 0), Some([0, 0, 0, 255]));
        assert_eq!(dark.pixel(1, 0), Some([245, 235, 225, 255]));
    }

    #[test]
    fn empty_bitmaps_are_rejected() {
        let err = to_render_image(DynamicImage::new_rgba8(4, 0), false).unwrap_err();
        assert_eq!(
            err.downcast_ref::<RasterError>(),
            Some(&RasterError::Empty {
                width: 4,
                height: 0
            })
        );
    }
}

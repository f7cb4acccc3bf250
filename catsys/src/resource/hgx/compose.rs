use super::codec::PixelLayout;
use crate::{error::CatError, util};
use anyhow::Context;
use image::{buffer::ConvertBuffer, ImageBuffer, RgbaImage};

/// Build an image from a padded BGR(A) buffer, reversing the row order when
/// `flip` is set.
pub(crate) fn from_bgr(
    buf: &[u8],
    layout: &PixelLayout,
    flip: bool,
) -> anyhow::Result<RgbaImage> {
    let width_in_bytes = layout.width * layout.depth_bytes;
    let mut rows = util::image::remove_padding(buf, layout.stride, layout.padding());
    if flip {
        rows = util::image::flip_rows(&rows, width_in_bytes);
    }
    let (width, height) = (layout.width as u32, layout.height as u32);
    let image = match layout.depth_bytes {
        3 => {
            let image: ImageBuffer<image::Bgr<u8>, Vec<u8>> =
                ImageBuffer::from_vec(width, height, rows)
                    .context("Invalid image resolution")?;
            image.convert()
        }
        4 => {
            let image: ImageBuffer<image::Bgra<u8>, Vec<u8>> =
                ImageBuffer::from_vec(width, height, rows)
                    .context("Invalid image resolution")?;
            image.convert()
        }
        n => return Err(CatError::UnsupportedDepth(n as i32 * 8).into()),
    };
    Ok(image)
}

pub(crate) fn from_jpeg(buf: &[u8], flip: bool) -> anyhow::Result<RgbaImage> {
    let image =
        image::load_from_memory_with_format(buf, image::ImageFormat::Jpeg)?.to_rgba8();
    if flip {
        return Ok(image::imageops::flip_vertical(&image));
    }
    Ok(image)
}

/// Put a stored alpha mask into the fourth channel of a decoded JPEG.
pub(crate) fn merge_alpha(
    image: &mut RgbaImage,
    alpha: &[u8],
    layout: &PixelLayout,
) -> anyhow::Result<()> {
    if image.width() as usize != layout.width || image.height() as usize != layout.height {
        return Err(CatError::CorruptImage(format!(
            "JPEG is {}x{}, frame is {}x{}",
            image.width(),
            image.height(),
            layout.width,
            layout.height
        ))
        .into());
    }
    for (pixel, a) in image.pixels_mut().zip(alpha) {
        pixel[3] = *a;
    }
    Ok(())
}

/// Place `image` at (`offset_x`, `offset_y`) on a transparent canvas.
/// Pixels falling outside the canvas are dropped.
pub(crate) fn expand(
    image: &RgbaImage,
    total_width: i32,
    total_height: i32,
    offset_x: i32,
    offset_y: i32,
) -> anyhow::Result<RgbaImage> {
    if total_width <= 0 || total_height <= 0 {
        return Err(CatError::InvalidDimensions(total_width, total_height).into());
    }
    let len = total_width as u64 * total_height as u64 * 4;
    if len > super::codec::MAX_RGBA_LENGTH {
        return Err(CatError::DimensionsTooLarge(total_width, total_height, len).into());
    }
    let canvas = util::alloc_zeroed(len as usize)?;
    let mut canvas = RgbaImage::from_vec(total_width as u32, total_height as u32, canvas)
        .context("Invalid image resolution")?;
    for (x, y, pixel) in image.enumerate_pixels() {
        let cx = x as i64 + offset_x as i64;
        let cy = y as i64 + offset_y as i64;
        if cx < 0 || cy < 0 || cx >= total_width as i64 || cy >= total_height as i64 {
            continue;
        }
        canvas.put_pixel(cx as u32, cy as u32, *pixel);
    }
    Ok(canvas)
}

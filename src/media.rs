use std::cmp::max;

use image::imageops::FilterType;
use image::{imageops, DynamicImage, GenericImageView, ImageBuffer, Pixel};
use rayon::prelude::*;
use tracing::debug;

/// Resize `image` to fill the screen and encode it as 24 bit BGR, flattening
/// transparency against `background`
pub fn encode_bgr24(
    image: &DynamicImage,
    background: [u8; 3],
    nearest: bool,
    width: u32,
    height: u32,
) -> Vec<u8> {
    debug!(width, height, nearest, "resizing and encoding image");
    let resized = resize_to_fill(&image.to_rgba8(), width, height, nearest);
    let [br, bg, bb] = background;

    let row_len = width as usize;
    let mut buf = vec![0u8; row_len * height as usize * 3];
    resized
        .as_raw()
        .par_chunks_exact(row_len * 4)
        .zip(buf.par_chunks_exact_mut(row_len * 3))
        .for_each(|(src, dst)| {
            for (pixel, out) in src.chunks_exact(4).zip(dst.chunks_exact_mut(3)) {
                // Mix alpha values against the background
                let a = pixel[3] as f64 / 255.0;
                let ba = 1. - a;
                let r = ((br as f64 * ba) + (pixel[0] as f64 * a)) as u8;
                let g = ((bg as f64 * ba) + (pixel[1] as f64 * a)) as u8;
                let b = ((bb as f64 * ba) + (pixel[2] as f64 * a)) as u8;
                out.copy_from_slice(&[b, g, r]);
            }
        });

    buf
}

pub fn resize_to_fill<I: GenericImageView>(
    image: &I,
    nwidth: u32,
    nheight: u32,
    nearest: bool,
) -> ImageBuffer<I::Pixel, Vec<<I::Pixel as Pixel>::Subpixel>>
where
    I::Pixel: 'static,
    <I::Pixel as Pixel>::Subpixel: 'static,
{
    let (width2, height2) = resize_dimensions(image.width(), image.height(), nwidth, nheight);

    let mut intermediate = imageops::resize(
        image,
        width2,
        height2,
        if nearest {
            FilterType::Nearest
        } else {
            FilterType::Gaussian
        },
    );

    let (iwidth, iheight) = intermediate.dimensions();
    let ratio = u64::from(iwidth) * u64::from(nheight);
    let nratio = u64::from(nwidth) * u64::from(iheight);

    if nratio > ratio {
        imageops::crop(
            &mut intermediate,
            0,
            (iheight - nheight) / 2,
            nwidth,
            nheight,
        )
        .to_image()
    } else {
        imageops::crop(&mut intermediate, (iwidth - nwidth) / 2, 0, nwidth, nheight).to_image()
    }
}

/// Smallest size preserving the aspect ratio that covers `nwidth` x `nheight`
pub fn resize_dimensions(width: u32, height: u32, nwidth: u32, nheight: u32) -> (u32, u32) {
    let wratio = f64::from(nwidth) / f64::from(width);
    let hratio = f64::from(nheight) / f64::from(height);
    let ratio = f64::max(wratio, hratio);

    let nw = max((f64::from(width) * ratio).round() as u64, 1);
    let nh = max((f64::from(height) * ratio).round() as u64, 1);

    if nw > u64::from(u32::MAX) {
        let ratio = f64::from(u32::MAX) / f64::from(width);
        (u32::MAX, max((f64::from(height) * ratio).round() as u32, 1))
    } else if nh > u64::from(u32::MAX) {
        let ratio = f64::from(u32::MAX) / f64::from(height);
        (max((f64::from(width) * ratio).round() as u32, 1), u32::MAX)
    } else {
        (nw as u32, nh as u32)
    }
}

#[cfg(test)]
mod tests {
    use image::{Rgba, RgbaImage};

    use super::*;

    #[test]
    fn pixels_are_written_in_bgr_order() {
        let mut image = RgbaImage::new(2, 1);
        image.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        image.put_pixel(1, 0, Rgba([10, 20, 30, 255]));

        let encoded = encode_bgr24(&DynamicImage::ImageRgba8(image), [0; 3], true, 2, 1);
        assert_eq!(encoded, [0, 0, 255, 30, 20, 10]);
    }

    #[test]
    fn transparency_shows_background() {
        let image = RgbaImage::from_pixel(1, 1, Rgba([10, 20, 30, 0]));
        let encoded = encode_bgr24(&DynamicImage::ImageRgba8(image), [200, 100, 50], true, 1, 1);
        assert_eq!(encoded, [50, 100, 200]);
    }

    #[test]
    fn output_fills_the_screen() {
        let image = RgbaImage::from_pixel(300, 100, Rgba([1, 2, 3, 255]));
        let encoded = encode_bgr24(&DynamicImage::ImageRgba8(image), [0; 3], true, 800, 480);
        assert_eq!(encoded.len(), 800 * 480 * 3);
        assert!(encoded.chunks_exact(3).all(|p| p == [3, 2, 1]));
    }

    #[test]
    fn fill_dimensions_cover_target() {
        assert_eq!(resize_dimensions(300, 100, 800, 480), (1440, 480));
        assert_eq!(resize_dimensions(1600, 960, 800, 480), (800, 480));
        assert_eq!(resize_dimensions(100, 400, 800, 480), (800, 3200));
    }
}

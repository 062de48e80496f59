use image::{imageops, Rgba, RgbaImage};
use pdfview_core::RenderImage;

use crate::RenderError;

/// Horizontal gap between facing pages, in pixels.
pub const SPREAD_GAP: u32 = 16;

const PAPER: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Lays pages out left to right, vertically centred, on a white canvas.
pub fn compose_horizontal(
    mut pages: Vec<RenderImage>,
    gap: u32,
) -> Result<RenderImage, RenderError> {
    if pages.len() <= 1 {
        return pages.pop().ok_or(RenderError::NothingToRender);
    }

    let gaps = gap.saturating_mul(pages.len() as u32 - 1);
    let width = pages
        .iter()
        .fold(gaps, |acc, page| acc.saturating_add(page.width));
    let height = pages.iter().map(|page| page.height).max().unwrap_or(0);
    let mut canvas = RgbaImage::from_pixel(width, height, PAPER);

    let mut x = 0u32;
    for page in pages {
        let (page_width, page_height) = (page.width, page.height);
        let layer = RgbaImage::from_raw(page_width, page_height, page.pixels)
            .ok_or(RenderError::MalformedImage {
                width: page_width,
                height: page_height,
            })?;
        let y = (height - page_height) / 2;
        imageops::replace(&mut canvas, &layer, i64::from(x), i64::from(y));
        x = x.saturating_add(page_width).saturating_add(gap);
    }

    Ok(RenderImage {
        width,
        height,
        pixels: canvas.into_raw(),
    })
}

pub fn invert_pixels(pixels: &mut [u8]) {
    for chunk in pixels.chunks_exact_mut(4) {
        chunk[0] = 255 - chunk[0];
        chunk[1] = 255 - chunk[1];
        chunk[2] = 255 - chunk[2];
    }
}

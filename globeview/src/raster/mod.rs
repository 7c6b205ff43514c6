//! Raster operations on tile images.
//!
//! Decoding, the Mercator → Equirectangular row resample applied before a
//! tile is cached, and the crop/compose helpers used to build placeholders
//! from ancestor or child tiles.

use image::imageops::{self, FilterType};
use image::{ImageResult, Rgba, RgbaImage};
use rayon::prelude::*;

use crate::coord::{Mercator, TileAddress, TileScheme};

/// Bytes per RGBA pixel.
const CHANNELS: usize = 4;

/// Pixel rectangle inside a source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Decodes an encoded tile (any format the `image` crate recognises) into RGBA.
pub fn decode_tile(bytes: &[u8]) -> ImageResult<RgbaImage> {
    Ok(image::load_from_memory(bytes)?.to_rgba8())
}

/// Resamples a Mercator tile so its rows are spaced linearly in latitude.
///
/// Each destination row takes the latitude at its center, finds the Mercator
/// source row whose latitude interval contains it, and copies that row
/// verbatim. This is nearest-row sampling; there is no interpolation.
///
/// # Arguments
///
/// * `image` - Decoded tile in Mercator row space
/// * `tile` - Mercator address of the tile (determines its latitude extent)
pub fn resample_mercator_rows(image: &RgbaImage, tile: &TileAddress) -> RgbaImage {
    let (width, height) = image.dimensions();
    if height == 0 || width == 0 {
        return image.clone();
    }

    let source_rows = mercator_source_rows(tile, height);
    let row_bytes = width as usize * CHANNELS;
    let src = image.as_raw();
    let mut out = vec![0u8; src.len()];

    out.par_chunks_mut(row_bytes)
        .zip(source_rows.par_iter())
        .for_each(|(dst, &row)| {
            let start = row * row_bytes;
            dst.copy_from_slice(&src[start..start + row_bytes]);
        });

    RgbaImage::from_raw(width, height, out).unwrap_or_else(|| image.clone())
}

/// For each destination row, the index of the Mercator source row to copy.
fn mercator_source_rows(tile: &TileAddress, height: u32) -> Vec<usize> {
    let h = height as f64;
    // Row boundary latitudes, decreasing from north to south
    let boundaries: Vec<f64> = (0..=height)
        .map(|k| Mercator.y_to_lat(tile.y as f64 + k as f64 / h, tile.zoom))
        .collect();
    let north = boundaries[0];
    let south = boundaries[height as usize];

    (0..height)
        .map(|r| {
            let lat = north - (r as f64 + 0.5) / h * (north - south);
            // First boundary below `lat`; the source row ends there.
            let below = boundaries.partition_point(|&b| b >= lat);
            below.saturating_sub(1).min(height as usize - 1)
        })
        .collect()
}

/// Sub-rectangle of an ancestor tile image that covers `tile`.
///
/// `size` is the ancestor image edge in pixels. Returns `None` when
/// `ancestor` is not an ancestor of `tile`.
pub fn ancestor_crop(tile: &TileAddress, ancestor: &TileAddress, size: u32) -> Option<CropRect> {
    if ancestor.zoom > tile.zoom {
        return None;
    }
    let levels = tile.zoom - ancestor.zoom;
    if tile.ancestor(levels)? != *ancestor {
        return None;
    }

    let scale = 1_i64 << levels;
    let size = size as i64;
    let dx = tile.x - ancestor.x * scale;
    let dy = tile.y - ancestor.y * scale;
    let span = |d: i64| {
        let start = d * size / scale;
        let end = (d + 1) * size / scale;
        (start as u32, (end - start).max(1) as u32)
    };
    let (x, width) = span(dx);
    let (y, height) = span(dy);
    Some(CropRect {
        x: x.min(size.saturating_sub(1) as u32),
        y: y.min(size.saturating_sub(1) as u32),
        width,
        height,
    })
}

/// Crops `rect` out of `image` and scales it to `size`×`size`.
pub fn crop_and_scale(image: &RgbaImage, rect: CropRect, size: u32) -> RgbaImage {
    let cropped = imageops::crop_imm(image, rect.x, rect.y, rect.width, rect.height).to_image();
    if cropped.dimensions() == (size, size) {
        return cropped;
    }
    imageops::resize(&cropped, size, size, FilterType::Nearest)
}

/// Draws available child tiles into their quadrants of a `size`×`size`
/// canvas. Missing quadrants stay transparent.
///
/// `children` is in row-major order: NW, NE, SW, SE.
pub fn compose_children(children: [Option<&RgbaImage>; 4], size: u32) -> RgbaImage {
    let mut canvas = RgbaImage::from_pixel(size, size, Rgba([0, 0, 0, 0]));
    let half = (size / 2).max(1);
    for (index, child) in children.iter().enumerate() {
        let Some(child) = child else { continue };
        let scaled = if child.dimensions() == (half, half) {
            (*child).clone()
        } else {
            imageops::resize(*child, half, half, FilterType::Triangle)
        };
        let x = (index % 2) as i64 * half as i64;
        let y = (index / 2) as i64 * half as i64;
        imageops::overlay(&mut canvas, &scaled, x, y);
    }
    canvas
}

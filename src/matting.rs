//! Trimap-based alpha matting for the fast path
//!
//! The coarse mask is split into a trimap: confident foreground, confident
//! background and an unknown band between them. Both confident regions are
//! eroded so the band always straddles the real boundary. Inside the band each
//! pixel's alpha is estimated by projecting its colour onto the line between
//! the local mean foreground and background colours:
//!
//! ```text
//! alpha = clamp(dot(I - B, F - B) / |F - B|^2, 0, 1)
//! ```
//!
//! Local means come from separable box sums over a square window. When a
//! window holds no confident pixel of one kind the global mean of that kind is
//! used instead, and when even that is missing (or F and B are too close to
//! separate) the coarse mask value is kept.

use crate::compositor::composite;
use crate::error::{CutoutError, Result};
use crate::types::SegmentationMask;
use image::{GrayImage, RgbImage, RgbaImage};

pub const TRIMAP_FOREGROUND: u8 = 255;
pub const TRIMAP_BACKGROUND: u8 = 0;
pub const TRIMAP_UNKNOWN: u8 = 128;

/// Squared colour distance (in normalized units) below which F and B are
/// considered indistinguishable
const MIN_SEPARATION: f32 = 1e-4;

/// Alpha matting parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MattingParams {
    /// Mask values above this are confident foreground
    pub foreground_threshold: u8,
    /// Mask values below this are confident background
    pub background_threshold: u8,
    /// Side of the square erosion structure applied to both confident regions
    pub erode_size: usize,
    /// Half-width of the window used for local colour means
    pub window_radius: usize,
}

impl Default for MattingParams {
    fn default() -> Self {
        Self {
            foreground_threshold: 240,
            background_threshold: 10,
            erode_size: 10,
            window_radius: 20,
        }
    }
}

/// Build a trimap from a coarse mask
///
/// Foreground erosion treats pixels outside the image as unset, background
/// erosion treats them as set, so a subject touching the frame edge never
/// grows a confident band along it while the background does.
#[must_use]
pub fn trimap(mask: &SegmentationMask, params: &MattingParams) -> GrayImage {
    let (width, height) = mask.dimensions;
    let (w, h) = (width as usize, height as usize);

    let foreground: Vec<bool> = mask
        .data
        .iter()
        .map(|&v| v > params.foreground_threshold)
        .collect();
    let background: Vec<bool> = mask
        .data
        .iter()
        .map(|&v| v < params.background_threshold)
        .collect();

    let foreground = erode(&foreground, w, h, params.erode_size, false);
    let background = erode(&background, w, h, params.erode_size, true);

    let data = foreground
        .iter()
        .zip(&background)
        .map(|(&fg, &bg)| match (fg, bg) {
            (true, _) => TRIMAP_FOREGROUND,
            (false, true) => TRIMAP_BACKGROUND,
            (false, false) => TRIMAP_UNKNOWN,
        })
        .collect::<Vec<_>>();

    GrayImage::from_raw(width, height, data).unwrap_or_else(|| GrayImage::new(width, height))
}

/// Estimate a refined alpha channel for `image` from its coarse `mask`
///
/// # Errors
/// - Image and mask dimensions differ
pub fn estimate_alpha(
    image: &RgbImage,
    mask: &SegmentationMask,
    params: &MattingParams,
) -> Result<SegmentationMask> {
    if image.dimensions() != mask.dimensions {
        return Err(CutoutError::shape(format!(
            "Cannot matte {}x{} image with {}x{} mask",
            image.width(),
            image.height(),
            mask.width(),
            mask.height()
        )));
    }

    let (width, height) = image.dimensions();
    let (w, h) = (width as usize, height as usize);
    let trimap = trimap(mask, params);

    let foreground = ColourMeans::collect(image, &trimap, TRIMAP_FOREGROUND, params.window_radius);
    let background = ColourMeans::collect(image, &trimap, TRIMAP_BACKGROUND, params.window_radius);

    let mut unknown = 0usize;
    let alpha = (0..w * h)
        .map(|index| {
            let x = (index % w) as u32;
            let y = (index / w) as u32;
            match trimap.get_pixel(x, y)[0] {
                TRIMAP_FOREGROUND => 255,
                TRIMAP_BACKGROUND => 0,
                _ => {
                    unknown += 1;
                    let coarse = mask.data.get(index).copied().unwrap_or(0);
                    match (foreground.at(index), background.at(index)) {
                        (Some(f), Some(b)) => {
                            let pixel = normalized(image.get_pixel(x, y).0);
                            project(pixel, f, b).unwrap_or(coarse)
                        },
                        _ => coarse,
                    }
                },
            }
        })
        .collect();

    log::debug!("Alpha matting refined {unknown} of {} pixels", w * h);
    SegmentationMask::new(alpha, (width, height))
}

/// Cut out `image` with matting-refined alpha, keeping the original colours
///
/// # Errors
/// - Image and mask dimensions differ
pub fn matting_cutout(
    image: &RgbImage,
    mask: &SegmentationMask,
    params: &MattingParams,
) -> Result<RgbaImage> {
    let alpha = estimate_alpha(image, mask, params)?;
    composite(image, &alpha)
}

fn normalized(rgb: [u8; 3]) -> [f32; 3] {
    rgb.map(|v| f32::from(v) / 255.0)
}

fn project(pixel: [f32; 3], fg: [f32; 3], bg: [f32; 3]) -> Option<u8> {
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for c in 0..3 {
        let line = fg[c] - bg[c];
        numerator += (pixel[c] - bg[c]) * line;
        denominator += line * line;
    }

    if denominator < MIN_SEPARATION {
        return None;
    }
    let alpha = (numerator / denominator).clamp(0.0, 1.0);
    Some((alpha * 255.0).round() as u8)
}

/// Local mean colours of one trimap class, with a global fallback
struct ColourMeans {
    counts: Vec<u32>,
    sums: [Vec<u32>; 3],
    global: Option<[f32; 3]>,
}

impl ColourMeans {
    fn collect(image: &RgbImage, trimap: &GrayImage, class: u8, radius: usize) -> Self {
        let (w, h) = (image.width() as usize, image.height() as usize);

        let members: Vec<u32> = trimap.pixels().map(|p| u32::from(p[0] == class)).collect();
        let channel = |c: usize| -> Vec<u32> {
            image
                .pixels()
                .zip(&members)
                .map(|(p, &m)| u32::from(p[c]) * m)
                .collect()
        };
        let raw = [channel(0), channel(1), channel(2)];

        let total: u64 = members.iter().map(|&m| u64::from(m)).sum();
        let global = (total > 0).then(|| {
            raw.each_ref().map(|values| {
                let sum: u64 = values.iter().map(|&v| u64::from(v)).sum();
                sum as f32 / total as f32 / 255.0
            })
        });

        Self {
            counts: box_sum(&members, w, h, radius),
            sums: raw.map(|values| box_sum(&values, w, h, radius)),
            global,
        }
    }

    fn at(&self, index: usize) -> Option<[f32; 3]> {
        match self.counts.get(index).copied() {
            Some(count) if count > 0 => {
                let mean = |c: usize| {
                    let sum = self.sums.get(c).and_then(|s| s.get(index)).copied().unwrap_or(0);
                    sum as f32 / count as f32 / 255.0
                };
                Some([mean(0), mean(1), mean(2)])
            },
            _ => self.global,
        }
    }
}

/// Binary erosion with a `size x size` square structure
///
/// The structure origin sits at `size / 2`, so even sizes reach one pixel
/// further before the origin than after it.
fn erode(set: &[bool], width: usize, height: usize, size: usize, border: bool) -> Vec<bool> {
    if size <= 1 {
        return set.to_vec();
    }
    let before = size / 2;
    let after = size - before - 1;

    let rows: Vec<bool> = set
        .chunks(width.max(1))
        .flat_map(|row| erode_line(row, before, after, border))
        .collect();

    let mut eroded = rows.clone();
    for x in 0..width {
        let column: Vec<bool> = (0..height)
            .map(|y| rows.get(y * width + x).copied().unwrap_or(border))
            .collect();
        for (y, value) in erode_line(&column, before, after, border).into_iter().enumerate() {
            if let Some(slot) = eroded.get_mut(y * width + x) {
                *slot = value;
            }
        }
    }
    eroded
}

fn erode_line(line: &[bool], before: usize, after: usize, border: bool) -> Vec<bool> {
    let prefix = prefix_sums(line.iter().map(|&v| u32::from(v)));
    let span = before + after + 1;

    (0..line.len())
        .map(|i| {
            let start = i.saturating_sub(before);
            let end = (i + after + 1).min(line.len());
            let inside = end - start;
            let set = window(&prefix, start, end) as usize;
            set == inside && (border || inside == span)
        })
        .collect()
}

/// Sum of `values` over a clipped `(2r+1) x (2r+1)` window around each pixel
fn box_sum(values: &[u32], width: usize, height: usize, radius: usize) -> Vec<u32> {
    let horizontal: Vec<u32> = values
        .chunks(width.max(1))
        .flat_map(|row| line_box_sum(row, radius))
        .collect();

    let mut output = vec![0; horizontal.len()];
    for x in 0..width {
        let column: Vec<u32> = (0..height)
            .map(|y| horizontal.get(y * width + x).copied().unwrap_or(0))
            .collect();
        for (y, value) in line_box_sum(&column, radius).into_iter().enumerate() {
            if let Some(slot) = output.get_mut(y * width + x) {
                *slot = value;
            }
        }
    }
    output
}

fn line_box_sum(line: &[u32], radius: usize) -> Vec<u32> {
    let prefix = prefix_sums(line.iter().copied());
    (0..line.len())
        .map(|i| {
            let start = i.saturating_sub(radius);
            let end = (i + radius + 1).min(line.len());
            window(&prefix, start, end)
        })
        .collect()
}

fn prefix_sums(values: impl Iterator<Item = u32>) -> Vec<u32> {
    let mut prefix = vec![0];
    let mut running = 0u32;
    for v in values {
        running = running.saturating_add(v);
        prefix.push(running);
    }
    prefix
}

fn window(prefix: &[u32], start: usize, end: usize) -> u32 {
    let hi = prefix.get(end).copied().unwrap_or(0);
    let lo = prefix.get(start).copied().unwrap_or(0);
    hi.saturating_sub(lo)
}

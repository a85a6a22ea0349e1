//! High-level image operations.
//!
//! These functions combine the extent calculations with the pointwise
//! framework. They take decoded images plus [`params`](super::params) and
//! return new images; sources are never mutated.
//!
//! Operations return `None` when their input cannot produce an image (empty
//! crop, empty palette, no inputs). Callers log and propagate absence.

use super::calculations::{crop_window, rotated_extent};
use super::params::{
    CropParams, EdgeParams, GrowParams, MaskChannel, PaletteCombineParams, SpreadParams,
    TransformParams,
};
use super::pointwise::{apply_scaled, apply_unary, argb_at, generate, sample};
use crate::color::palette::DEFAULT_CUTOFF;
use crate::color::{
    ColorCoordinates, OPAQUE, Palette, TRANSPARENT, alpha, alpha_blend, blue, clamp8, gray_value,
    green, pack, red, with_alpha,
};
use image::RgbaImage;

// =========================================================================
// Geometry
// =========================================================================

/// Cut a window out of `source`; the window is given on a `total_size` grid
/// scaled to the source width. Parts of the window past the source edge are
/// transparent.
pub fn crop(source: &RgbaImage, params: &CropParams) -> Option<RgbaImage> {
    let window = crop_window(
        source.width(),
        params.total_size,
        (params.start_x, params.size_x),
        (params.start_y, params.size_y),
    )?;
    Some(generate(window.width, window.height, |x, y| {
        sample(
            source,
            i64::from(x) + i64::from(window.x),
            i64::from(y) + i64::from(window.y),
        )
        .0
    }))
}

/// One clockwise quarter turn: the top-left pixel moves to the top-right.
pub fn rotate_clockwise(source: &RgbaImage) -> RgbaImage {
    let (width, height) = rotated_extent(source.dimensions(), 1);
    let source_height = source.height();
    generate(width, height, |x, y| argb_at(source, y, source_height - 1 - x))
}

/// Mirror left to right.
pub fn flip_horizontal(source: &RgbaImage) -> RgbaImage {
    let (width, height) = source.dimensions();
    generate(width, height, |x, y| argb_at(source, width - 1 - x, y))
}

/// Rotate by `rotate % 4` clockwise quarter turns, then mirror if `flip`.
pub fn transform(source: &RgbaImage, params: &TransformParams) -> RgbaImage {
    let mut out = source.clone();
    for _ in 0..params.rotate % 4 {
        out = rotate_clockwise(&out);
    }
    if params.flip {
        out = flip_horizontal(&out);
    }
    out
}

// =========================================================================
// Compositing
// =========================================================================

/// Stack `layers` bottom to top: each later layer is alpha-composited over
/// everything before it. Out-of-bounds samples are skipped.
pub fn overlay(layers: &[&RgbaImage]) -> Option<RgbaImage> {
    apply_scaled(
        &|colors: &[u32], in_bounds: &[bool]| {
            colors
                .iter()
                .zip(in_bounds)
                .filter(|(_, inside)| **inside)
                .fold(TRANSPARENT, |under, (&over, _)| alpha_blend(over, under))
        },
        layers,
    )
}

/// Keep `input`'s color and scale its alpha by the mask strength, the mask's
/// luminance weighted by its own alpha. Padding on either side is transparent.
///
/// For a white mask the strength is just the mask alpha, so the result alpha
/// is `input_alpha × mask_alpha / 255`: masks built from white and transparent
/// pixels (as the `mask/*` helpers produce) behave as plain alpha masks.
pub fn mask(input: &RgbaImage, mask: &RgbaImage) -> Option<RgbaImage> {
    apply_scaled(
        &|colors: &[u32], in_bounds: &[bool]| {
            if !in_bounds[0] || !in_bounds[1] {
                return TRANSPARENT;
            }
            let (color, m) = (colors[0], colors[1]);
            let strength = u32::from(gray_value(m)) * u32::from(alpha(m)) / 255;
            with_alpha(color, (u32::from(alpha(color)) * strength / 255) as u8)
        },
        &[input, mask],
    )
}

/// Bitwise-invert every channel, alpha included.
pub fn invert(source: &RgbaImage) -> RgbaImage {
    let (width, height) = source.dimensions();
    apply_unary(
        &|c: u32, inside: bool| if inside { !c } else { TRANSPARENT },
        source,
        width,
        height,
    )
}

/// Per-channel clamped sum of the in-bounds inputs.
pub fn add(sources: &[&RgbaImage]) -> Option<RgbaImage> {
    apply_scaled(
        &|colors: &[u32], in_bounds: &[bool]| {
            let (mut a, mut r, mut g, mut b) = (0i64, 0i64, 0i64, 0i64);
            for (&c, _) in colors.iter().zip(in_bounds).filter(|(_, inside)| **inside) {
                a += i64::from(alpha(c));
                r += i64::from(red(c));
                g += i64::from(green(c));
                b += i64::from(blue(c));
            }
            pack(clamp8(a), clamp8(r), clamp8(g), clamp8(b))
        },
        sources,
    )
}

/// Per-channel product of the in-bounds inputs, each channel read as `0..=1`.
pub fn multiply(sources: &[&RgbaImage]) -> Option<RgbaImage> {
    apply_scaled(
        &|colors: &[u32], in_bounds: &[bool]| {
            let mut acc = [255f64; 4];
            for (&c, _) in colors.iter().zip(in_bounds).filter(|(_, inside)| **inside) {
                for (slot, channel) in acc.iter_mut().zip([alpha(c), red(c), green(c), blue(c)]) {
                    *slot *= f64::from(channel) / 255.0;
                }
            }
            let ch = |v: f64| clamp8(v.round() as i64);
            pack(ch(acc[0]), ch(acc[1]), ch(acc[2]), ch(acc[3]))
        },
        sources,
    )
}

/// Opaque white where the selected channel exceeds `cutoff` (`0..=1`),
/// transparent elsewhere.
pub fn cutoff_mask(source: &RgbaImage, channel: MaskChannel, cutoff: f64) -> RgbaImage {
    let (width, height) = source.dimensions();
    apply_unary(
        &|c: u32, inside: bool| {
            if !inside {
                return TRANSPARENT;
            }
            let value = match channel {
                MaskChannel::Alpha => alpha(c),
                MaskChannel::Red => red(c),
                MaskChannel::Green => green(c),
                MaskChannel::Blue => blue(c),
                MaskChannel::Lightness => gray_value(c),
            };
            if f64::from(value) / 255.0 > cutoff {
                0xFFFF_FFFF
            } else {
                TRANSPARENT
            }
        },
        source,
        width,
        height,
    )
}

/// Whether a pixel's alpha (as `0..=1`) exceeds `cutoff`.
fn solid_at(color: u32, cutoff: f64) -> bool {
    f64::from(alpha(color)) / 255.0 > cutoff
}

/// Opaque white on solid pixels that have an empty neighbour in one of the
/// listed directions, transparent elsewhere.
///
/// A neighbour past the border is empty only with `count_outside_frame`.
pub fn edge_mask(source: &RgbaImage, params: &EdgeParams) -> RgbaImage {
    let (width, height) = source.dimensions();
    let offsets: Vec<(i64, i64)> = params.edges.iter().map(|d| d.offset()).collect();
    generate(width, height, |x, y| {
        if !solid_at(argb_at(source, x, y), params.cutoff) {
            return TRANSPARENT;
        }
        let is_edge = offsets.iter().any(|&(dx, dy)| {
            let (c, inside) = sample(source, i64::from(x) + dx, i64::from(y) + dy);
            if inside {
                !solid_at(c, params.cutoff)
            } else {
                params.count_outside_frame
            }
        });
        if is_edge { 0xFFFF_FFFF } else { TRANSPARENT }
    })
}

/// Opaque white on every pixel within `floor(width × growth)` pixels
/// (square neighbourhood) of a solid pixel, transparent elsewhere.
pub fn grow_mask(source: &RgbaImage, params: &GrowParams) -> RgbaImage {
    let (width, height) = source.dimensions();
    let radius = (f64::from(width) * params.growth).floor().max(0.0) as usize;
    let (w, h) = (width as usize, height as usize);

    let solid: Vec<bool> = (0..h)
        .flat_map(|y| (0..w).map(move |x| (x, y)))
        .map(|(x, y)| solid_at(argb_at(source, x as u32, y as u32), params.cutoff))
        .collect();
    // Separable dilation: rows first, then columns.
    let rows = dilate(&solid, w, h, radius, |x, y| y * w + x);
    let grown = dilate(&rows, h, w, radius, |y, x| y * w + x);

    generate(width, height, |x, y| {
        if grown[y as usize * w + x as usize] {
            0xFFFF_FFFF
        } else {
            TRANSPARENT
        }
    })
}

/// One pass of a 1D dilation over `lines` lines of `len` cells each;
/// `index(i, line)` locates cell `i` of a line.
fn dilate(
    cells: &[bool],
    len: usize,
    lines: usize,
    radius: usize,
    index: impl Fn(usize, usize) -> usize,
) -> Vec<bool> {
    let mut out = vec![false; cells.len()];
    let mut prefix = vec![0usize; len + 1];
    for line in 0..lines {
        for i in 0..len {
            prefix[i + 1] = prefix[i] + usize::from(cells[index(i, line)]);
        }
        for i in 0..len {
            let lo = i.saturating_sub(radius);
            let hi = (i + radius + 1).min(len);
            out[index(i, line)] = prefix[hi] > prefix[lo];
        }
    }
    out
}

// =========================================================================
// Palettes
// =========================================================================

/// Palette of every visible (non-zero alpha) pixel, with the default cutoff.
pub fn palette_of(source: &RgbaImage) -> Palette {
    let (width, height) = source.dimensions();
    let visible = (0..height)
        .flat_map(|y| (0..width).map(move |x| (x, y)))
        .map(|(x, y)| argb_at(source, x, y))
        .filter(|&c| alpha(c) != 0);
    Palette::from_colors(visible, DEFAULT_CUTOFF)
}

/// Replace every visible pixel with a gray level given by the position of its
/// nearest palette entry, spread evenly from `lower_bound` (darkest entry) to
/// `upper_bound` (lightest). Alpha is kept; transparent pixels stay clear.
pub fn palette_spread(source: &RgbaImage, params: &SpreadParams) -> RgbaImage {
    let (width, height) = source.dimensions();
    let visible = (0..height)
        .flat_map(|y| (0..width).map(move |x| (x, y)))
        .map(|(x, y)| argb_at(source, x, y))
        .filter(|&c| alpha(c) != 0);
    let palette = Palette::from_colors(visible, params.palette_cutoff);
    let max_index = palette.len().saturating_sub(1);
    let span = params.upper_bound - params.lower_bound;
    apply_unary(
        &|c: u32, inside: bool| {
            if !inside || alpha(c) == 0 {
                return TRANSPARENT;
            }
            let ramp = match (palette.closest_index(c), max_index) {
                (Some(index), max) if max > 0 => index as f64 / max as f64,
                _ => 0.0,
            };
            let value = params.lower_bound + span * ramp;
            let v = clamp8((value * 255.0).round() as i64);
            pack(alpha(c), v, v, v)
        },
        source,
        width,
        height,
    )
}

/// Stretch the gray values of visible pixels to span `0..=255`. Images with a
/// single gray level are returned unchanged.
pub fn stretch_gray(source: &RgbaImage) -> RgbaImage {
    let (width, height) = source.dimensions();
    let mut min = u8::MAX;
    let mut max = u8::MIN;
    for y in 0..height {
        for x in 0..width {
            let c = argb_at(source, x, y);
            if alpha(c) != 0 {
                min = min.min(gray_value(c));
                max = max.max(gray_value(c));
            }
        }
    }
    if max <= min {
        return source.clone();
    }
    let range = u32::from(max - min);
    apply_unary(
        &|c: u32, _: bool| {
            let v = (u32::from(gray_value(c).saturating_sub(min)) * 255 / range).min(255) as u8;
            pack(alpha(c), v, v, v)
        },
        source,
        width,
        height,
    )
}

/// Replace each grayscale sample with the palette entry it points at,
/// keeping the sample pixel's alpha. `None` for an empty palette.
pub fn palette_to_color(paletted: &RgbaImage, palette: &Palette) -> Option<RgbaImage> {
    if palette.is_empty() {
        return None;
    }
    let (width, height) = paletted.dimensions();
    Some(apply_unary(
        &|c: u32, inside: bool| {
            if !inside {
                return TRANSPARENT;
            }
            let entry = palette.color_at(gray_value(c)).unwrap_or(TRANSPARENT);
            with_alpha(entry, alpha(c))
        },
        paletted,
        width,
        height,
    ))
}

/// Recolor a grayscale `paletted` image with the palette of `background`
/// and stack `[background?, recolored, overlay?]` bottom to top.
///
/// `None` when the background has no visible pixels.
pub fn combine_paletted(
    background: &RgbaImage,
    overlay_layer: Option<&RgbaImage>,
    paletted: &RgbaImage,
    params: &PaletteCombineParams,
) -> Option<RgbaImage> {
    let mut palette = palette_of(background);
    palette.extend_to_size(params.extend_palette_size);
    let stretched;
    let paletted = if params.stretch_paletted {
        stretched = stretch_gray(paletted);
        &stretched
    } else {
        paletted
    };
    let recolored = palette_to_color(paletted, &palette)?;
    let mut layers: Vec<&RgbaImage> = Vec::with_capacity(3);
    if params.include_background {
        layers.push(background);
    }
    layers.push(&recolored);
    if let Some(top) = overlay_layer {
        layers.push(top);
    }
    overlay(&layers)
}

/// Snap every visible pixel of `source` onto the nearest point of the palette
/// path extracted from `palette_source`, keeping alpha.
///
/// `None` when `palette_source` has no visible pixels.
pub fn palette_remap(
    source: &RgbaImage,
    palette_source: &RgbaImage,
    coordinates: &dyn ColorCoordinates,
) -> Option<RgbaImage> {
    let palette = palette_of(palette_source);
    if palette.is_empty() {
        return None;
    }
    let (width, height) = source.dimensions();
    Some(apply_unary(
        &|c: u32, inside: bool| {
            if !inside || alpha(c) == 0 {
                return c;
            }
            let snapped = palette
                .project_onto_path(c | OPAQUE, coordinates)
                .unwrap_or(c);
            with_alpha(snapped, alpha(c))
        },
        source,
        width,
        height,
    ))
}

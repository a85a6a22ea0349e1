//! Bounds-aware per-pixel operations.
//!
//! Every image operator is a function from one or more sampled colors to an
//! output color. Sampling never fails: coordinates outside a source yield
//! [`TRANSPARENT`](crate::color::TRANSPARENT) together with an `in_bounds =
//! false` flag, so operators can tell padding apart from pixels that really
//! are transparent.
//!
//! Sizing is the caller's decision for [`apply_unary`] and [`apply_binary`];
//! [`apply_scaled`] implements the shared "scale everything up to a common
//! width" policy used by the multi-input operators.
//!
//! Pixels are computed on the calling thread. Parallelism lives one level up,
//! across outputs ([`crate::export`]): a producer may block on a memo slot or
//! output lazy another thread is filling, and that wait must never happen
//! inside a rayon join the filling thread could itself be stealing from.
//! Operators are plain `Fn`s and must be `Sync` so images can be shared
//! between those threads.

use super::calculations::scaled_extent;
use crate::color::{TRANSPARENT, pack};
use image::{Rgba, RgbaImage};

pub trait UnaryOp: Sync {
    fn apply(&self, color: u32, in_bounds: bool) -> u32;
}

impl<F> UnaryOp for F
where
    F: Fn(u32, bool) -> u32 + Sync,
{
    fn apply(&self, color: u32, in_bounds: bool) -> u32 {
        self(color, in_bounds)
    }
}

pub trait BinaryOp: Sync {
    fn apply(&self, a: u32, b: u32, a_in_bounds: bool, b_in_bounds: bool) -> u32;
}

impl<F> BinaryOp for F
where
    F: Fn(u32, u32, bool, bool) -> u32 + Sync,
{
    fn apply(&self, a: u32, b: u32, a_in_bounds: bool, b_in_bounds: bool) -> u32 {
        self(a, b, a_in_bounds, b_in_bounds)
    }
}

/// Operator over any number of inputs; `colors[i]` pairs with `in_bounds[i]`.
pub trait ManyOp: Sync {
    fn apply(&self, colors: &[u32], in_bounds: &[bool]) -> u32;
}

impl<F> ManyOp for F
where
    F: Fn(&[u32], &[bool]) -> u32 + Sync,
{
    fn apply(&self, colors: &[u32], in_bounds: &[bool]) -> u32 {
        self(colors, in_bounds)
    }
}

/// Read a pixel as packed ARGB. The coordinates must be in bounds.
pub fn argb_at(image: &RgbaImage, x: u32, y: u32) -> u32 {
    let Rgba([r, g, b, a]) = *image.get_pixel(x, y);
    pack(a, r, g, b)
}

/// Read a pixel, reporting whether the coordinates were inside the image.
pub fn sample(image: &RgbaImage, x: i64, y: i64) -> (u32, bool) {
    if x < 0 || y < 0 || x >= i64::from(image.width()) || y >= i64::from(image.height()) {
        return (TRANSPARENT, false);
    }
    (argb_at(image, x as u32, y as u32), true)
}

pub fn to_rgba(color: u32) -> Rgba<u8> {
    Rgba([
        crate::color::red(color),
        crate::color::green(color),
        crate::color::blue(color),
        crate::color::alpha(color),
    ])
}

/// Build a `width × height` image by evaluating `pixel(x, y)` for every
/// coordinate, row by row.
pub fn generate<F>(width: u32, height: u32, pixel: F) -> RgbaImage
where
    F: Fn(u32, u32) -> u32 + Sync,
{
    RgbaImage::from_fn(width, height, |x, y| to_rgba(pixel(x, y)))
}

/// Apply `op` to every pixel of a `width × height` output, sampling `source`
/// at the same coordinates.
pub fn apply_unary(op: &impl UnaryOp, source: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    generate(width, height, |x, y| {
        let (c, inside) = sample(source, i64::from(x), i64::from(y));
        op.apply(c, inside)
    })
}

/// Apply `op` to every pixel of a `width × height` output, sampling both
/// sources at the same coordinates.
pub fn apply_binary(
    op: &impl BinaryOp,
    a: &RgbaImage,
    b: &RgbaImage,
    width: u32,
    height: u32,
) -> RgbaImage {
    generate(width, height, |x, y| {
        let (ca, a_in) = sample(a, i64::from(x), i64::from(y));
        let (cb, b_in) = sample(b, i64::from(x), i64::from(y));
        op.apply(ca, cb, a_in, b_in)
    })
}

/// Apply `op` across `sources` after scaling each one up to a common width.
///
/// The output width is the least common multiple of the source widths; each
/// source is nearest-neighbour scaled by `width / source_width` and the
/// output height is the tallest scaled source. Returns `None` when there are
/// no sources or a source has zero width.
pub fn apply_scaled(op: &impl ManyOp, sources: &[&RgbaImage]) -> Option<RgbaImage> {
    let dims: Vec<(u32, u32)> = sources.iter().map(|s| s.dimensions()).collect();
    let (width, height) = scaled_extent(&dims)?;
    let scales: Vec<u32> = dims.iter().map(|&(w, _)| width / w).collect();
    Some(generate(width, height, |x, y| {
        let mut colors = Vec::with_capacity(sources.len());
        let mut in_bounds = Vec::with_capacity(sources.len());
        for (source, &scale) in sources.iter().zip(&scales) {
            let (c, inside) = sample(source, i64::from(x / scale), i64::from(y / scale));
            colors.push(c);
            in_bounds.push(inside);
        }
        op.apply(&colors, &in_bounds)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(w: u32, h: u32, color: u32) -> RgbaImage {
        RgbaImage::from_pixel(w, h, to_rgba(color))
    }

    #[test]
    fn sample_out_of_bounds_is_flagged() {
        let img = solid(2, 2, 0xFF11_2233);
        assert_eq!(sample(&img, 1, 1), (0xFF11_2233, true));
        assert_eq!(sample(&img, 2, 0), (TRANSPARENT, false));
        assert_eq!(sample(&img, -1, 0), (TRANSPARENT, false));
    }

    #[test]
    fn unary_sees_padding_as_out_of_bounds() {
        let img = solid(2, 1, 0xFF00_0000);
        let out = apply_unary(
            &|c: u32, inside: bool| if inside { c } else { 0xFFFF_FFFF },
            &img,
            3,
            1,
        );
        assert_eq!(argb_at(&out, 0, 0), 0xFF00_0000);
        assert_eq!(argb_at(&out, 2, 0), 0xFFFF_FFFF);
    }

    #[test]
    fn binary_samples_both_sources() {
        let a = solid(2, 2, 0xFF01_0000);
        let b = solid(1, 1, 0xFF00_0200);
        let out = apply_binary(
            &|a: u32, b: u32, _: bool, b_in: bool| if b_in { a | b } else { a },
            &a,
            &b,
            2,
            2,
        );
        assert_eq!(argb_at(&out, 0, 0), 0xFF01_0200);
        assert_eq!(argb_at(&out, 1, 1), 0xFF01_0000);
    }

    #[test]
    fn scaled_uses_lcm_width() {
        let small = solid(2, 2, 0xFF00_0001);
        let large = solid(3, 3, 0xFF00_0100);
        let out = apply_scaled(&|c: &[u32], _: &[bool]| c[0] | c[1], &[&small, &large]).unwrap();
        assert_eq!(out.dimensions(), (6, 6));
        assert_eq!(argb_at(&out, 5, 5), 0xFF00_0101);
    }

    #[test]
    fn scaled_with_no_sources_is_none() {
        assert!(apply_scaled(&|_: &[u32], _: &[bool]| 0, &[]).is_none());
    }

    #[test]
    fn generate_handles_empty_extent() {
        let out = generate(0, 5, |_, _| 0xFFFF_FFFF);
        assert_eq!(out.dimensions(), (0, 5));
    }
}

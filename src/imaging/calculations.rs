//! Pure calculation functions for image extents.
//!
//! All functions here are pure and testable without any pixels.

use tracing::warn;

/// Largest pixel count any generated image may have (4096 × 4096).
pub const MAX_PIXELS: u64 = 1 << 24;

/// Whether a `width × height` RGBA buffer is small enough to allocate.
///
/// ```
/// # use dynamic_asset_gen::imaging::calculations::fits_extent;
/// assert!(fits_extent(4096, 4096));
/// assert!(!fits_extent(4097, 4096));
/// assert!(!fits_extent(4_000_000_000, 4_000_000_000));
/// ```
pub fn fits_extent(width: u32, height: u32) -> bool {
    let pixels = u64::from(width) * u64::from(height);
    pixels <= MAX_PIXELS
        && usize::try_from(pixels)
            .ok()
            .and_then(|p| p.checked_mul(4))
            .is_some()
}

/// `Some((width, height))` when the extent fits, otherwise `None` with a
/// warning naming `operation`.
pub fn checked_extent(operation: &str, width: u32, height: u32) -> Option<(u32, u32)> {
    if fits_extent(width, height) {
        Some((width, height))
    } else {
        warn!(operation, width, height, max_pixels = MAX_PIXELS, "image would be too large");
        None
    }
}

/// Greatest common divisor.
pub fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 { a } else { gcd(b, a % b) }
}

/// Least common multiple; `None` on zero input or overflow.
pub fn lcm(a: u32, b: u32) -> Option<u32> {
    if a == 0 || b == 0 {
        return None;
    }
    (a / gcd(a, b)).checked_mul(b)
}

/// Common extent for a set of images scaled to a shared width.
///
/// Width is the LCM of all widths; height is the tallest image after scaling
/// each by `width / image_width`. `None` when the result would exceed
/// [`MAX_PIXELS`].
///
/// ```
/// # use dynamic_asset_gen::imaging::calculations::scaled_extent;
/// assert_eq!(scaled_extent(&[(16, 16), (32, 64)]), Some((32, 64)));
/// assert_eq!(scaled_extent(&[(2, 1), (3, 1)]), Some((6, 3)));
/// ```
pub fn scaled_extent(dims: &[(u32, u32)]) -> Option<(u32, u32)> {
    let mut width = dims.first()?.0;
    for &(w, _) in &dims[1..] {
        width = lcm(width, w)?;
    }
    if width == 0 {
        return None;
    }
    let mut height = 0u32;
    for &(w, h) in dims {
        height = height.max(h.checked_mul(width / w)?);
    }
    checked_extent("scale to common width", width, height)
}

/// A crop window in source pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropWindow {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Map a crop expressed on a `total_size` grid onto a source of
/// `source_width` pixels.
///
/// The grid-to-pixel scale is `source_width / total_size` (integer). Returns
/// `None` when the grid is empty, the source is narrower than the grid,
/// either crop size is zero, or the window exceeds [`MAX_PIXELS`].
///
/// ```
/// # use dynamic_asset_gen::imaging::calculations::{crop_window, CropWindow};
/// // A 16-grid crop of the middle quarter of a 32px texture.
/// assert_eq!(
///     crop_window(32, 16, (4, 8), (4, 8)),
///     Some(CropWindow { x: 8, y: 8, width: 16, height: 16 })
/// );
/// ```
pub fn crop_window(
    source_width: u32,
    total_size: u32,
    (start_x, size_x): (u32, u32),
    (start_y, size_y): (u32, u32),
) -> Option<CropWindow> {
    if total_size == 0 || size_x == 0 || size_y == 0 {
        return None;
    }
    let scale = source_width / total_size;
    if scale == 0 {
        return None;
    }
    let (width, height) = checked_extent(
        "crop",
        size_x.checked_mul(scale)?,
        size_y.checked_mul(scale)?,
    )?;
    Some(CropWindow {
        x: start_x.checked_mul(scale)?,
        y: start_y.checked_mul(scale)?,
        width,
        height,
    })
}

/// Extent after `quarter_turns` clockwise rotations.
pub fn rotated_extent((width, height): (u32, u32), quarter_turns: u32) -> (u32, u32) {
    if quarter_turns % 2 == 0 {
        (width, height)
    } else {
        (height, width)
    }
}

/// Side of the smallest power-of-two square holding `count` pixels, capped at
/// 128 (the largest literal color image).
pub fn color_square_side(count: usize) -> u32 {
    let mut side = 1u32;
    while (side as usize) * (side as usize) < count && side < 128 {
        side *= 2;
    }
    side
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gcd_and_lcm() {
        assert_eq!(gcd(12, 18), 6);
        assert_eq!(lcm(4, 6), Some(12));
        assert_eq!(lcm(0, 6), None);
        assert_eq!(lcm(u32::MAX, u32::MAX - 1), None);
    }

    #[test]
    fn scaled_extent_single_image_is_identity() {
        assert_eq!(scaled_extent(&[(7, 3)]), Some((7, 3)));
    }

    #[test]
    fn scaled_extent_empty_is_none() {
        assert_eq!(scaled_extent(&[]), None);
        assert_eq!(scaled_extent(&[(0, 4)]), None);
    }

    #[test]
    fn crop_window_rejects_empty_grid_and_sizes() {
        assert_eq!(crop_window(16, 0, (0, 1), (0, 1)), None);
        assert_eq!(crop_window(16, 16, (0, 0), (0, 1)), None);
        assert_eq!(crop_window(8, 16, (0, 1), (0, 1)), None);
    }

    #[test]
    fn crop_window_rejects_oversized_window() {
        assert_eq!(
            crop_window(1, 1, (0, 4_000_000_000), (0, 4_000_000_000)),
            None
        );
        assert_eq!(crop_window(1, 1, (0, 4097), (0, 4096)), None);
        assert!(crop_window(1, 1, (0, 4096), (0, 4096)).is_some());
    }

    #[test]
    fn scaled_extent_rejects_huge_common_width() {
        // Two large coprime widths have an LCM far beyond any sane texture.
        assert_eq!(scaled_extent(&[(65_521, 1), (65_519, 1)]), None);
    }

    #[test]
    fn fits_extent_bounds() {
        assert!(fits_extent(0, 0));
        assert!(fits_extent(1 << 24, 1));
        assert!(!fits_extent((1 << 24) + 1, 1));
        assert!(!fits_extent(u32::MAX, u32::MAX));
    }

    #[test]
    fn crop_window_identity_scale() {
        assert_eq!(
            crop_window(100, 100, (10, 50), (10, 50)),
            Some(CropWindow {
                x: 10,
                y: 10,
                width: 50,
                height: 50
            })
        );
    }

    #[test]
    fn rotated_extent_swaps_on_odd_turns() {
        assert_eq!(rotated_extent((4, 2), 1), (2, 4));
        assert_eq!(rotated_extent((4, 2), 2), (4, 2));
        assert_eq!(rotated_extent((4, 2), 3), (2, 4));
    }

    #[test]
    fn color_square_side_is_power_of_two() {
        assert_eq!(color_square_side(0), 1);
        assert_eq!(color_square_side(1), 1);
        assert_eq!(color_square_side(2), 2);
        assert_eq!(color_square_side(5), 4);
        assert_eq!(color_square_side(16), 4);
        assert_eq!(color_square_side(100_000), 128);
    }
}

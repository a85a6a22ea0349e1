//! Packed colors, color spaces, and palette geometry.
//!
//! Every pixel that flows through the operator graph is a packed ARGB32 `u32`
//! (`0xAARRGGBB`, straight alpha). Helpers here pull channels apart, put them
//! back together, and alpha-composite two colors.
//!
//! | Piece | Module |
//! |---|---|
//! | Channel access, blending | this module |
//! | Integer literal encodings | [`ColorEncoding`] |
//! | Coordinate spaces (RGB, CIELAB) | [`space`] |
//! | Point-to-segment distance | [`geometry`] |
//! | Fuzzy palettes and sample numbers | [`palette`] |

pub mod geometry;
pub mod palette;
pub mod space;

use serde::{Deserialize, Serialize};

pub use geometry::LineSegment;
pub use palette::Palette;
pub use space::{CieLab, ColorCoordinates, Rgb, Space};

/// Fully transparent black; also the value sampled outside an image.
pub const TRANSPARENT: u32 = 0;

/// Alpha bits of an opaque color.
pub const OPAQUE: u32 = 0xFF00_0000;

pub fn alpha(color: u32) -> u8 {
    (color >> 24) as u8
}

pub fn red(color: u32) -> u8 {
    (color >> 16) as u8
}

pub fn green(color: u32) -> u8 {
    (color >> 8) as u8
}

pub fn blue(color: u32) -> u8 {
    color as u8
}

pub fn pack(a: u8, r: u8, g: u8, b: u8) -> u32 {
    (u32::from(a) << 24) | (u32::from(r) << 16) | (u32::from(g) << 8) | u32::from(b)
}

/// Clamp an arbitrary integer channel value to `0..=255`.
pub fn clamp8(value: i64) -> u8 {
    value.clamp(0, 255) as u8
}

/// Replace the alpha channel, keeping RGB.
pub fn with_alpha(color: u32, a: u8) -> u32 {
    (color & 0x00FF_FFFF) | (u32::from(a) << 24)
}

/// Average brightness `(r + g + b) / 3`, the value grayscale sample images carry.
pub fn gray_value(color: u32) -> u8 {
    ((u32::from(red(color)) + u32::from(green(color)) + u32::from(blue(color))) / 3) as u8
}

/// Composite `over` on top of `under` using straight-alpha "source over".
///
/// Result alpha is `aO + aU·(255 − aO)/255`; each channel is the
/// alpha-weighted mix divided by the result alpha. A fully transparent result
/// is canonicalized to [`TRANSPARENT`].
pub fn alpha_blend(over: u32, under: u32) -> u32 {
    let a_over = u32::from(alpha(over));
    let a_under = u32::from(alpha(under)) * (255 - a_over) / 255;
    let a = a_over + a_under;
    if a == 0 {
        return TRANSPARENT;
    }
    let mix = |o: u8, u: u8| ((u32::from(o) * a_over + u32::from(u) * a_under) / a) as u8;
    pack(
        a as u8,
        mix(red(over), red(under)),
        mix(green(over), green(under)),
        mix(blue(over), blue(under)),
    )
}

/// How integer color literals in declarative sources are laid out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorEncoding {
    /// `0xAARRGGBB`
    #[default]
    Argb,
    /// `0xRRGGBB`; alpha is forced opaque.
    Rgb,
    /// `0xAABBGGRR`
    Abgr,
    /// `0xBBGGRR`; alpha is forced opaque.
    Bgr,
}

impl ColorEncoding {
    pub fn to_argb(self, value: u32) -> u32 {
        match self {
            ColorEncoding::Argb => value,
            ColorEncoding::Rgb => value | OPAQUE,
            ColorEncoding::Abgr => swap_red_blue(value),
            ColorEncoding::Bgr => swap_red_blue(value) | OPAQUE,
        }
    }

    pub fn from_argb(self, color: u32) -> u32 {
        match self {
            ColorEncoding::Argb => color,
            ColorEncoding::Rgb => color & 0x00FF_FFFF,
            ColorEncoding::Abgr => swap_red_blue(color),
            ColorEncoding::Bgr => swap_red_blue(color) & 0x00FF_FFFF,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ColorEncoding::Argb => "argb",
            ColorEncoding::Rgb => "rgb",
            ColorEncoding::Abgr => "abgr",
            ColorEncoding::Bgr => "bgr",
        }
    }
}

fn swap_red_blue(value: u32) -> u32 {
    (value & 0xFF00_FF00) | ((value >> 16) & 0xFF) | ((value & 0xFF) << 16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_and_unpack_channels() {
        let c = pack(0x80, 0x11, 0x22, 0x33);
        assert_eq!(c, 0x8011_2233);
        assert_eq!((alpha(c), red(c), green(c), blue(c)), (0x80, 0x11, 0x22, 0x33));
    }

    #[test]
    fn blend_opaque_over_anything_is_over() {
        assert_eq!(alpha_blend(0xFF12_3456, 0xFFAB_CDEF), 0xFF12_3456);
        assert_eq!(alpha_blend(0xFF12_3456, 0), 0xFF12_3456);
    }

    #[test]
    fn blend_transparent_over_is_under() {
        assert_eq!(alpha_blend(0x00FF_FFFF, 0xFF10_2030), 0xFF10_2030);
    }

    #[test]
    fn blend_both_transparent_is_zero() {
        assert_eq!(alpha_blend(0x00FF_0000, 0x0000_FF00), TRANSPARENT);
    }

    #[test]
    fn blend_half_red_over_opaque_blue() {
        // a_over = 128, a_under = 255 * 127 / 255 = 127, a = 255
        let c = alpha_blend(0x80FF_0000, 0xFF00_00FF);
        assert_eq!(alpha(c), 255);
        assert_eq!(red(c), (255 * 128 / 255) as u8);
        assert_eq!(blue(c), (255 * 127 / 255) as u8);
        assert_eq!(green(c), 0);
    }

    #[test]
    fn gray_value_averages_rgb() {
        assert_eq!(gray_value(0xFF30_6090), 0x60);
        assert_eq!(gray_value(0x00FF_FFFF), 255);
    }

    #[test]
    fn encodings_convert_to_argb() {
        assert_eq!(ColorEncoding::Argb.to_argb(0x8011_2233), 0x8011_2233);
        assert_eq!(ColorEncoding::Rgb.to_argb(0x0011_2233), 0xFF11_2233);
        assert_eq!(ColorEncoding::Abgr.to_argb(0x8033_2211), 0x8011_2233);
        assert_eq!(ColorEncoding::Bgr.to_argb(0x0033_2211), 0xFF11_2233);
    }

    #[test]
    fn encodings_convert_back_from_argb() {
        for enc in [
            ColorEncoding::Argb,
            ColorEncoding::Rgb,
            ColorEncoding::Abgr,
            ColorEncoding::Bgr,
        ] {
            let argb = 0xFF11_2233;
            assert_eq!(enc.to_argb(enc.from_argb(argb)), argb, "{}", enc.name());
        }
    }

    #[test]
    fn space_selector_is_reachable_from_color() {
        let space: Space = serde_json::from_str("\"lab\"").unwrap();
        assert_eq!(space, Space::Lab);
        assert_eq!(Space::default().coordinates().distance(0xFF00_0000, 0xFF03_0400), 5.0);
    }
}

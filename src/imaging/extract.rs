//! Foreground extraction.
//!
//! Given a plain `background` texture and a `full` texture that is the same
//! background with something drawn on top, split the difference into:
//!
//! - an **overlay**: pixels that are clearly not shades of the background,
//!   kept in their real colors (possibly semi-transparent), and
//! - a **paletted** image: grayscale sample numbers into the background's
//!   palette for pixels that are shades of the background but differ from
//!   the background at that position.
//!
//! Recombining the two over a *different* background (see
//! [`combine_paletted`](super::operations::combine_paletted)) transfers the
//! foreground while re-shading the background-colored parts to match.
//!
//! ## Classification
//!
//! 1. Colors in the background palette become samples, but only where their
//!    sample differs from the background's sample at that pixel.
//! 2. Colors whose CIELAB distance to the palette path is within
//!    `close_cutoff × mean palette spacing` are queued as probable shades.
//! 3. Everything else goes to the overlay and seeds the foreground palette.
//!
//! Queued shades are then resolved against the foreground palette: the best
//! match among "plain background shade", "foreground color", and
//! "translucent foreground over a background shade" wins.
//!
//! If no foreground colors turn up at all, only palette shifts are extracted.

use super::calculations::scaled_extent;
use super::params::ForegroundParams;
use super::pointwise::{generate, sample};
use super::operations::palette_of;
use crate::color::{CieLab, ColorCoordinates, OPAQUE, Palette, TRANSPARENT, alpha, alpha_blend, pack, with_alpha};
use image::RgbaImage;
use tracing::{debug, warn};

/// Alpha levels tried when matching a pixel as translucent foreground over a
/// background shade.
const BLEND_ALPHAS: [u8; 4] = [25, 37, 49, 61];

/// Upper bound on `queued × foreground × background` blend comparisons;
/// above it, queued pixels are only compared against opaque colors.
const BLEND_SEARCH_BUDGET: usize = 4_000_000;

/// Spacing used when the background palette has a single entry.
const SINGLE_ENTRY_SPACING: f64 = 10.0;

const NEIGHBOURS: [(i64, i64); 9] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 0),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub overlay: RgbaImage,
    pub paletted: RgbaImage,
}

struct Grid {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
}

impl Grid {
    fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![TRANSPARENT; width as usize * height as usize],
        }
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    fn get(&self, x: i64, y: i64) -> Option<u32> {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return None;
        }
        Some(self.pixels[self.index(x as u32, y as u32)])
    }

    fn set(&mut self, x: u32, y: u32, color: u32) {
        let i = self.index(x, y);
        self.pixels[i] = color;
    }

    fn into_image(self) -> RgbaImage {
        let Grid {
            width,
            height,
            pixels,
        } = self;
        generate(width, height, |x, y| pixels[y as usize * width as usize + x as usize])
    }
}

fn sample_pixel(s: u8) -> u32 {
    pack(0xFF, s, s, s)
}

/// Mean CIELAB distance between consecutive palette entries.
fn mean_spacing(palette: &Palette) -> f64 {
    let segments = palette.segments();
    if segments.is_empty() {
        return SINGLE_ENTRY_SPACING;
    }
    let total: f64 = segments
        .iter()
        .map(|s| CieLab.distance(s.start, s.end))
        .sum();
    total / segments.len() as f64
}

struct Queued {
    x: u32,
    y: u32,
    color: u32,
}

/// Split `full` into an overlay and a paletted image relative to `background`.
///
/// Both inputs are scaled to a common width first. Returns `None` when the
/// background has no visible pixels.
pub fn extract_foreground(
    background: &RgbaImage,
    full: &RgbaImage,
    params: &ForegroundParams,
) -> Option<Extraction> {
    let (width, height) = scaled_extent(&[background.dimensions(), full.dimensions()])?;
    let bg_scale = width / background.width();
    let full_scale = width / full.width();

    let mut palette = palette_of(background);
    if palette.is_empty() {
        return None;
    }
    palette.extend_to_size(params.extend_palette_size);
    let close = params.close_cutoff * mean_spacing(&palette);

    let pixel_pair = |x: u32, y: u32| {
        let b = sample(
            background,
            i64::from(x / bg_scale),
            i64::from(y / bg_scale),
        )
        .0;
        let w = sample(full, i64::from(x / full_scale), i64::from(y / full_scale)).0;
        (b, w)
    };

    let mut overlay = Grid::new(width, height);
    let mut paletted = Grid::new(width, height);
    let mut front = Palette::default();
    let mut queue = Vec::new();

    for y in 0..height {
        for x in 0..width {
            let (b, w) = pixel_pair(x, y);
            if alpha(w) == 0 {
                continue;
            }
            if palette.contains(w) {
                let w_sample = palette.sample(w);
                if w_sample != palette.sample(b) {
                    if let Some(s) = w_sample {
                        paletted.set(x, y, sample_pixel(s));
                    }
                }
            } else if palette
                .distance_to_path(w, &CieLab)
                .is_some_and(|d| d <= close)
            {
                if let Some(s) = palette.sample(w) {
                    paletted.set(x, y, sample_pixel(s));
                }
                queue.push(Queued { x, y, color: w });
            } else {
                overlay.set(x, y, w);
                front.insert(w);
            }
        }
    }

    if front.is_empty() {
        warn!("no foreground colors found; extracting palette shifts only");
        let mut shifts = Grid::new(width, height);
        for y in 0..height {
            for x in 0..width {
                let (b, w) = pixel_pair(x, y);
                if alpha(w) == 0 {
                    continue;
                }
                let w_sample = palette.sample(w);
                if w_sample != palette.sample(b) {
                    if let Some(s) = w_sample {
                        shifts.set(x, y, sample_pixel(s));
                    }
                }
            }
        }
        return Some(Extraction {
            overlay: Grid::new(width, height).into_image(),
            paletted: shifts.into_image(),
        });
    }

    let blend_search =
        queue.len() * front.len() * palette.len() * BLEND_ALPHAS.len() <= BLEND_SEARCH_BUDGET;
    if !blend_search {
        debug!(
            queued = queue.len(),
            "skipping translucent blend search for large extraction"
        );
    }
    for item in &queue {
        resolve_queued(item, &palette, &front, blend_search, &mut overlay, &mut paletted);
    }

    tidy_neighbours(params, &palette, &overlay, &mut paletted, |x, y| {
        pixel_pair(x, y).1
    });

    Some(Extraction {
        overlay: overlay.into_image(),
        paletted: paletted.into_image(),
    })
}

/// Decide whether a probable background shade is really background, an
/// opaque foreground color, or translucent foreground over a shade.
fn resolve_queued(
    item: &Queued,
    palette: &Palette,
    front: &Palette,
    blend_search: bool,
    overlay: &mut Grid,
    paletted: &mut Grid,
) {
    let w = item.color;
    let Some(shade) = palette.sample(w).and_then(|s| palette.color_at(s)) else {
        return;
    };
    let mut best = CieLab.distance(w, shade);
    // (overlay color, paletted sample)
    let mut choice: Option<(u32, Option<u8>)> = None;

    if blend_search {
        for a in BLEND_ALPHAS {
            for (bi, &bg_color) in palette.colors().iter().enumerate() {
                for &fg_color in front.colors() {
                    let blend = alpha_blend(with_alpha(fg_color, a), bg_color);
                    let d = CieLab.distance(w, blend);
                    if d < best {
                        best = d;
                        choice = Some((with_alpha(fg_color, a), Some(palette.index_sample(bi))));
                    }
                }
            }
        }
    }
    for &fg_color in front.colors() {
        let d = CieLab.distance(w, fg_color);
        if d < best {
            best = d;
            choice = Some((w | OPAQUE, None));
        }
    }

    match choice {
        None => {}
        Some((color, sample)) => {
            overlay.set(item.x, item.y, color);
            paletted.set(item.x, item.y, sample.map_or(TRANSPARENT, sample_pixel));
        }
    }
}

/// Clear paletted pixels with no overlay nearby, and give pixels next to
/// fully opaque overlay pixels a paletted sample of the full image.
fn tidy_neighbours(
    params: &ForegroundParams,
    palette: &Palette,
    overlay: &Grid,
    paletted: &mut Grid,
    full_at: impl Fn(u32, u32) -> u32,
) {
    if !params.trim_trailing && !params.force_neighbors {
        return;
    }
    for y in 0..overlay.height {
        for x in 0..overlay.width {
            let mut has_neighbour = false;
            let mut has_opaque_neighbour = false;
            for (dx, dy) in NEIGHBOURS {
                if let Some(c) = overlay.get(i64::from(x) + dx, i64::from(y) + dy) {
                    has_neighbour |= alpha(c) != 0;
                    has_opaque_neighbour |= alpha(c) == 255;
                }
            }
            if params.trim_trailing && !has_neighbour {
                paletted.set(x, y, TRANSPARENT);
            }
            let own = overlay.get(i64::from(x), i64::from(y)).unwrap_or(TRANSPARENT);
            if params.force_neighbors && has_opaque_neighbour && alpha(own) == 0 {
                if let Some(s) = palette.sample(full_at(x, y)) {
                    paletted.set(x, y, sample_pixel(s));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::pointwise::{argb_at, to_rgba};

    /// 4×4 two-tone gray background: top half dark, bottom half light.
    fn background() -> RgbaImage {
        generate(4, 4, |_, y| if y < 2 { 0xFF50_5050 } else { 0xFF90_9090 })
    }

    #[test]
    fn red_dot_lands_in_overlay() {
        let bg = background();
        let mut full = bg.clone();
        full.put_pixel(1, 1, to_rgba(0xFFFF_0000));
        let out = extract_foreground(&bg, &full, &ForegroundParams::default()).unwrap();
        assert_eq!(argb_at(&out.overlay, 1, 1), 0xFFFF_0000);
        assert_eq!(argb_at(&out.overlay, 3, 3), TRANSPARENT);
    }

    #[test]
    fn unchanged_background_pixels_stay_empty() {
        let bg = background();
        let mut full = bg.clone();
        full.put_pixel(0, 0, to_rgba(0xFFFF_0000));
        let params = ForegroundParams {
            force_neighbors: false,
            ..ForegroundParams::default()
        };
        let out = extract_foreground(&bg, &full, &params).unwrap();
        assert_eq!(argb_at(&out.paletted, 3, 3), TRANSPARENT);
        assert_eq!(argb_at(&out.paletted, 1, 1), TRANSPARENT);
    }

    #[test]
    fn force_neighbours_samples_around_opaque_overlay() {
        let bg = background();
        let mut full = bg.clone();
        full.put_pixel(1, 1, to_rgba(0xFFFF_0000));
        let out = extract_foreground(&bg, &full, &ForegroundParams::default()).unwrap();
        // (2, 2) touches the red dot diagonally and is a plain light pixel.
        let p = argb_at(&out.paletted, 2, 2);
        assert_eq!(alpha(p), 255);
    }

    #[test]
    fn palette_shift_only_when_no_foreground() {
        let bg = background();
        // Swap the two tones: every pixel is still a background color.
        let full = generate(4, 4, |_, y| if y < 2 { 0xFF90_9090 } else { 0xFF50_5050 });
        let out = extract_foreground(&bg, &full, &ForegroundParams::default()).unwrap();
        assert!(out.overlay.pixels().all(|p| p.0[3] == 0));
        assert!(out.paletted.pixels().all(|p| p.0[3] == 255));
    }

    #[test]
    fn transparent_background_is_none() {
        let bg = RgbaImage::new(2, 2);
        let full = background();
        assert!(extract_foreground(&bg, &full, &ForegroundParams::default()).is_none());
    }

    #[test]
    fn mixed_sizes_scale_to_common_width() {
        let bg = generate(2, 2, |_, _| 0xFF60_6060);
        let full = generate(4, 4, |x, _| if x == 0 { 0xFF00_FF00 } else { 0xFF60_6060 });
        let out = extract_foreground(&bg, &full, &ForegroundParams::default()).unwrap();
        assert_eq!(out.overlay.dimensions(), (4, 4));
        assert_eq!(argb_at(&out.overlay, 0, 3), 0xFF00_FF00);
    }
}

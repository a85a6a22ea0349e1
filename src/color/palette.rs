//! Fuzzy color palettes and sample numbers.
//!
//! A [`Palette`] is a set of opaque colors where any two entries closer than
//! the palette's cutoff (RGB distance) are considered the same color: adding
//! a near-duplicate folds it into the existing entry, whose color becomes the
//! average of everything folded into it.
//!
//! Entries are ordered darkest to lightest by `r + g + b`, and consecutive
//! entries form the *palette path*, a poly-line through color space. Two
//! mappings are defined over that order:
//!
//! - **sample numbers**: `0..=255` positions along the palette, used by
//!   grayscale "paletted" images ([`Palette::sample`], [`Palette::color_at`]);
//! - **path projection**: the nearest point on the path to an arbitrary
//!   color ([`Palette::nearest_segment`], [`Palette::project_onto_path`]).
//!
//! ## Extension
//!
//! Small palettes can be grown toward black and white with
//! [`Palette::extend`], stepping by the palette's average spacing. The number
//! of entries added at each end is tracked so callers can map between the
//! original and the extended sample ranges.

use super::geometry::LineSegment;
use super::space::{ColorCoordinates, Rgb};
use super::{OPAQUE, blue, green, pack, red};

/// Default fuzzy-equality cutoff, in RGB distance.
pub const DEFAULT_CUTOFF: f64 = 3.5;

/// Fallback spacing for extending a single-color palette: 1/16 of the
/// black-to-white diagonal.
const SINGLE_COLOR_SPACING: f64 = 441.672_955_930_063_7 / 16.0;

/// Sample number of entry `index` in a palette of `size` entries, rounded up
/// so that [`Palette::color_at`] maps it back to the same entry.
fn index_sample(index: usize, size: usize) -> u8 {
    ((index * 256 + size - 1) / size).min(255) as u8
}

#[derive(Debug, Clone)]
struct Entry {
    color: u32,
    members: Vec<u32>,
}

impl Entry {
    fn average(&self) -> u32 {
        let n = self.members.len() as u32;
        let (mut r, mut g, mut b) = (0u32, 0u32, 0u32);
        for &m in &self.members {
            r += u32::from(red(m));
            g += u32::from(green(m));
            b += u32::from(blue(m));
        }
        pack(0xFF, (r / n) as u8, (g / n) as u8, (b / n) as u8)
    }
}

#[derive(Debug, Clone)]
pub struct Palette {
    /// Insertion-ordered entries; keeps merging deterministic.
    entries: Vec<Entry>,
    /// Entry colors sorted darkest first.
    colors: Vec<u32>,
    cutoff: f64,
    extended_low: usize,
    extended_high: usize,
}

impl Default for Palette {
    fn default() -> Self {
        Self::new(DEFAULT_CUTOFF)
    }
}

impl Palette {
    pub fn new(cutoff: f64) -> Self {
        Self {
            entries: Vec::new(),
            colors: Vec::new(),
            cutoff,
            extended_low: 0,
            extended_high: 0,
        }
    }

    pub fn from_colors(colors: impl IntoIterator<Item = u32>, cutoff: f64) -> Self {
        let mut palette = Self::new(cutoff);
        palette.extend_from(colors);
        palette
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Entry colors, darkest first.
    pub fn colors(&self) -> &[u32] {
        &self.colors
    }

    /// Add a color (forced opaque). Returns `true` when a new entry was
    /// created, `false` when it folded into an existing one.
    pub fn insert(&mut self, color: u32) -> bool {
        let added = self.insert_unsorted(color);
        self.update_order();
        added
    }

    pub fn extend_from(&mut self, colors: impl IntoIterator<Item = u32>) {
        for color in colors {
            self.insert_unsorted(color);
        }
        self.update_order();
    }

    fn insert_unsorted(&mut self, color: u32) -> bool {
        let color = color | OPAQUE;
        let cutoff = self.cutoff;
        for entry in &mut self.entries {
            if Rgb.distance(entry.color, color) < cutoff
                && entry.members.iter().all(|&m| Rgb.distance(m, color) < cutoff)
            {
                if !entry.members.contains(&color) {
                    entry.members.push(color);
                    entry.color = entry.average();
                }
                return false;
            }
        }
        self.entries.push(Entry {
            color,
            members: vec![color],
        });
        true
    }

    /// Whether some entry is within the cutoff of `color` (alpha ignored).
    pub fn contains(&self, color: u32) -> bool {
        self.entries.iter().any(|entry| {
            Rgb.distance(entry.color, color) < self.cutoff
                && entry.members.iter().all(|&m| Rgb.distance(m, color) < self.cutoff)
        })
    }

    fn update_order(&mut self) {
        let mut colors: Vec<u32> = self.entries.iter().map(|e| e.color).collect();
        colors.sort_by_key(|&c| (u32::from(red(c)) + u32::from(green(c)) + u32::from(blue(c)), c));
        self.colors = colors;
    }

    /// Consecutive-entry segments of the palette path.
    pub fn segments(&self) -> Vec<LineSegment> {
        self.colors
            .windows(2)
            .map(|pair| LineSegment::new(pair[0], pair[1]))
            .collect()
    }

    // =========================================================================
    // Sample numbers
    // =========================================================================

    /// Sample number (`0..=255`) of where `color` lies along the palette.
    ///
    /// Uses the nearest entry when it is within the cutoff (or is the only
    /// entry); otherwise interpolates between the two nearest entries by
    /// relative distance. Returns `None` for an empty palette.
    pub fn sample(&self, color: u32) -> Option<u8> {
        let color = color | OPAQUE;
        let size = self.colors.len();
        if size == 0 {
            return None;
        }
        let mut by_distance: Vec<(usize, f64)> = self
            .colors
            .iter()
            .enumerate()
            .map(|(i, &c)| (i, Rgb.distance(color, c)))
            .collect();
        // Stable sort: equal distances keep palette order.
        by_distance.sort_by(|a, b| a.1.total_cmp(&b.1));
        let (main_index, main_distance) = by_distance[0];
        if size == 1 || main_distance <= self.cutoff {
            return Some(index_sample(main_index, size));
        }
        let (next_index, next_distance) = by_distance[1];
        let lerp = (main_distance / (main_distance + next_distance)).clamp(0.0, 1.0);
        let position = main_index as f64 * (1.0 - lerp) + next_index as f64 * lerp;
        Some(((position * 256.0 / size as f64).round() as usize).min(255) as u8)
    }

    /// Sample number of the entry at `index` (darkest first).
    pub fn index_sample(&self, index: usize) -> u8 {
        match self.colors.len() {
            0 => 0,
            size => index_sample(index.min(size - 1), size),
        }
    }

    /// The entry a sample number points at. Returns `None` for an empty palette.
    pub fn color_at(&self, sample: u8) -> Option<u32> {
        let size = self.colors.len();
        if size == 0 {
            return None;
        }
        Some(self.colors[usize::from(sample) * size / 256])
    }

    /// The entry nearest to `color` in RGB distance.
    pub fn closest_color(&self, color: u32) -> Option<u32> {
        self.closest_index(color).map(|i| self.colors[i])
    }

    /// Index (darkest first) of the entry nearest to `color`; ties go to the
    /// earlier entry.
    pub fn closest_index(&self, color: u32) -> Option<usize> {
        self.colors
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| Rgb.distance(color, **a).total_cmp(&Rgb.distance(color, **b)))
            .map(|(i, _)| i)
    }

    /// Number of entries before extension.
    pub fn original_size(&self) -> usize {
        self.colors.len() - self.extended_low - self.extended_high
    }

    pub fn extended_low(&self) -> usize {
        self.extended_low
    }

    pub fn extended_high(&self) -> usize {
        self.extended_high
    }

    /// Sample number of the darkest entry that was present before extension.
    pub fn original_start_sample(&self) -> u8 {
        match self.colors.len() {
            0 => 0,
            size => index_sample(self.extended_low, size),
        }
    }

    /// Sample number of the lightest entry that was present before extension.
    pub fn original_end_sample(&self) -> u8 {
        match self.colors.len() {
            0 => 0,
            size => index_sample(size - self.extended_high - 1, size),
        }
    }

    // =========================================================================
    // Extension
    // =========================================================================

    /// Grow the palette until it has at least `size` entries or both ends
    /// reach black and white.
    pub fn extend_to_size(&mut self, size: usize) {
        self.extend(|palette| palette.len() >= size);
    }

    /// Add entries beyond the darkest and lightest colors, alternating ends,
    /// until `done` holds or neither end can grow any further.
    pub fn extend(&mut self, mut done: impl FnMut(&Palette) -> bool) {
        if self.colors.is_empty() {
            return;
        }
        let spacing = match self.colors.len() {
            1 => SINGLE_COLOR_SPACING,
            n => Rgb.distance(self.colors[0], self.colors[n - 1]) / (n - 1) as f64,
        };
        let mut reached_low = false;
        let mut reached_high = false;
        while !done(self) {
            for low in [true, false] {
                if (low && reached_low) || (!low && reached_high) {
                    continue;
                }
                let end = if low {
                    self.colors[0]
                } else {
                    self.colors[self.colors.len() - 1]
                };
                let target: u8 = if low { 0x00 } else { 0xFF };
                let target_color = pack(0xFF, target, target, target);
                let end_distance = Rgb.distance(end, target_color);
                let next = if end_distance < spacing {
                    target_color
                } else {
                    let step = |c: u8| {
                        ((f64::from(c) * (end_distance - spacing) + f64::from(target) * spacing)
                            / end_distance) as u8
                    };
                    pack(0xFF, step(red(end)), step(green(end)), step(blue(end)))
                };
                let grew = self.insert(next);
                if grew {
                    if low {
                        self.extended_low += 1;
                    } else {
                        self.extended_high += 1;
                    }
                }
                if !grew || next == target_color {
                    if low {
                        reached_low = true;
                    } else {
                        reached_high = true;
                    }
                }
                if done(self) {
                    return;
                }
            }
            if reached_low && reached_high {
                break;
            }
        }
    }

    // =========================================================================
    // Path geometry
    // =========================================================================

    /// Index and distance of the path segment nearest to `color`. Ties go to
    /// the earliest segment. `None` when the palette has fewer than two entries.
    pub fn nearest_segment(
        &self,
        color: u32,
        coordinates: &dyn ColorCoordinates,
    ) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for (i, segment) in self.segments().iter().enumerate() {
            let d = segment.distance_to(color, coordinates);
            if best.is_none_or(|(_, best_d)| d < best_d) {
                best = Some((i, d));
            }
        }
        best
    }

    /// Minimum distance from `color` to the palette path. A one-entry palette
    /// measures to its single color; an empty palette yields `None`.
    pub fn distance_to_path(&self, color: u32, coordinates: &dyn ColorCoordinates) -> Option<f64> {
        match self.nearest_segment(color, coordinates) {
            Some((_, d)) => Some(d),
            None => self
                .colors
                .first()
                .map(|&only| coordinates.distance(color, only)),
        }
    }

    /// The point of the palette path nearest to `color`, as an opaque color.
    pub fn project_onto_path(&self, color: u32, coordinates: &dyn ColorCoordinates) -> Option<u32> {
        match self.nearest_segment(color, coordinates) {
            Some((index, _)) => {
                let segment = self.segments()[index];
                Some(segment.lerp(segment.projection(color, coordinates)))
            }
            None => self.colors.first().copied(),
        }
    }
}

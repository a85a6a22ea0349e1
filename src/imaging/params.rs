//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the operator graph (which parses them out of declarative
//! sources) and [`operations`](super::operations) (which does the pixel work),
//! so they also carry the documented defaults.
//!
//! ## Types
//!
//! - [`CropParams`]: crop window on a `total_size` grid.
//! - [`TransformParams`]: clockwise quarter turns plus optional mirror.
//! - [`MaskChannel`]: which channel a cutoff mask thresholds.
//! - [`PaletteCombineParams`]: flags for recombining a paletted image.
//! - [`ForegroundParams`]: tuning for foreground extraction.
//! - [`EdgeParams`], [`Direction`]: which neighbours make a pixel an edge.
//! - [`GrowParams`]: how far a mask grows.
//! - [`SpreadParams`]: the gray range a palette is spread over.

use serde::{Deserialize, Serialize};

/// Palette entries grown toward black and white before sampling.
pub const DEFAULT_EXTEND_PALETTE_SIZE: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropParams {
    pub total_size: u32,
    pub start_x: u32,
    pub size_x: u32,
    pub start_y: u32,
    pub size_y: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformParams {
    /// Clockwise quarter turns; only `rotate % 4` matters.
    pub rotate: u32,
    /// Mirror horizontally after rotating.
    pub flip: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskChannel {
    #[default]
    Alpha,
    Red,
    Green,
    Blue,
    /// `(r + g + b) / 3`
    Lightness,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PaletteCombineParams {
    /// Draw the background itself under the paletted layer.
    pub include_background: bool,
    /// Stretch the paletted image's gray range to cover `0..=255` first.
    pub stretch_paletted: bool,
    /// Grow the background palette to at least this many entries.
    pub extend_palette_size: usize,
}

impl Default for PaletteCombineParams {
    fn default() -> Self {
        Self {
            include_background: true,
            stretch_paletted: false,
            extend_palette_size: DEFAULT_EXTEND_PALETTE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForegroundParams {
    pub extend_palette_size: usize,
    /// Clear paletted pixels that have no overlay pixel in their 3×3 neighbourhood.
    pub trim_trailing: bool,
    /// Give every pixel next to a fully opaque overlay pixel a paletted sample.
    pub force_neighbors: bool,
    /// A color counts as a shade of the background when its CIELAB distance
    /// to the background palette path is within `close_cutoff` times the mean
    /// spacing between consecutive palette entries.
    pub close_cutoff: f64,
}

impl Default for ForegroundParams {
    fn default() -> Self {
        Self {
            extend_palette_size: DEFAULT_EXTEND_PALETTE_SIZE,
            trim_trailing: true,
            force_neighbors: true,
            close_cutoff: 2.0,
        }
    }
}

/// A neighbour offset; `north` is up (negative y).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    North,
    Northeast,
    East,
    Southeast,
    South,
    Southwest,
    West,
    Northwest,
}

impl Direction {
    pub const ALL: [Direction; 8] = [
        Direction::North,
        Direction::Northeast,
        Direction::East,
        Direction::Southeast,
        Direction::South,
        Direction::Southwest,
        Direction::West,
        Direction::Northwest,
    ];

    pub fn offset(self) -> (i64, i64) {
        match self {
            Direction::North => (0, -1),
            Direction::Northeast => (1, -1),
            Direction::East => (1, 0),
            Direction::Southeast => (1, 1),
            Direction::South => (0, 1),
            Direction::Southwest => (-1, 1),
            Direction::West => (-1, 0),
            Direction::Northwest => (-1, -1),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Direction::North => "north",
            Direction::Northeast => "northeast",
            Direction::East => "east",
            Direction::Southeast => "southeast",
            Direction::South => "south",
            Direction::Southwest => "southwest",
            Direction::West => "west",
            Direction::Northwest => "northwest",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeParams {
    /// Neighbours past the image border count as empty.
    pub count_outside_frame: bool,
    pub edges: Vec<Direction>,
    /// Alpha (`0..=1`) a pixel must exceed to be solid.
    pub cutoff: f64,
}

impl Default for EdgeParams {
    fn default() -> Self {
        Self {
            count_outside_frame: false,
            edges: Direction::ALL.to_vec(),
            cutoff: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GrowParams {
    /// Grow radius as a fraction of the image width (rounded down to pixels).
    pub growth: f64,
    pub cutoff: f64,
}

impl Default for GrowParams {
    fn default() -> Self {
        Self {
            growth: 1.0 / 16.0,
            cutoff: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpreadParams {
    /// Merge distance used when extracting the palette.
    pub palette_cutoff: f64,
    /// Gray value (`0..=1`) of the darkest palette entry.
    pub lower_bound: f64,
    /// Gray value (`0..=1`) of the lightest palette entry.
    pub upper_bound: f64,
}

impl Default for SpreadParams {
    fn default() -> Self {
        Self {
            palette_cutoff: crate::color::palette::DEFAULT_CUTOFF,
            lower_bound: 0.0,
            upper_bound: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palette_combine_defaults() {
        let p = PaletteCombineParams::default();
        assert!(p.include_background);
        assert!(!p.stretch_paletted);
        assert_eq!(p.extend_palette_size, 6);
    }

    #[test]
    fn foreground_defaults() {
        let p = ForegroundParams::default();
        assert!(p.trim_trailing && p.force_neighbors);
        assert_eq!(p.close_cutoff, 2.0);
    }

    #[test]
    fn edge_defaults_cover_every_direction() {
        let p = EdgeParams::default();
        assert_eq!(p.edges.len(), 8);
        assert!(!p.count_outside_frame);
        let (dx, dy): (i64, i64) = p.edges.iter().map(|d| d.offset()).fold((0, 0), |(x, y), (a, b)| (x + a, y + b));
        assert_eq!((dx, dy), (0, 0));
    }

    #[test]
    fn directions_deserialize_lowercase() {
        let d: Vec<Direction> = serde_json::from_str(r#"["north", "southwest"]"#).unwrap();
        assert_eq!(d, vec![Direction::North, Direction::Southwest]);
        assert_eq!(Direction::Southwest.name(), "southwest");
    }

    #[test]
    fn transform_default_is_identity() {
        assert_eq!(
            TransformParams::default(),
            TransformParams {
                rotate: 0,
                flip: false
            }
        );
    }
}

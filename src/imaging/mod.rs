//! Image processing on `image::RgbaImage`, pure Rust.
//!
//! | Concern | Module |
//! |---|---|
//! | **PNG in/out** | [`codec`] (`image` crate, PNG only) |
//! | **Extent math** | [`calculations`] (LCM widths, crop windows) |
//! | **Per-pixel plumbing** | [`pointwise`] (bounds-aware sampling, row-major generation) |
//! | **Operators** | [`operations`] (crop, overlay, masks, palettes) |
//! | **Foreground transfer** | [`extract`] |
//! | **Animation strips** | [`animation`] (frame slicing and stacking) |
//!
//! Pixels are handled as packed `0xAARRGGBB` values (see [`crate::color`]);
//! conversion to and from `RgbaImage` channels happens only at the edges.
//!
//! The module is split into:
//! - **Calculations**: pure functions for dimension math (unit testable)
//! - **Parameters**: data structures describing image operations
//! - **Operations**: functions combining calculations + pointwise plumbing

pub mod animation;
pub mod calculations;
pub mod codec;
pub mod extract;
pub mod operations;
pub mod params;
pub mod pointwise;

pub use codec::{ImagingError, decode_png, encode_png};
pub use extract::{Extraction, extract_foreground};
pub use params::{
    CropParams, Direction, EdgeParams, ForegroundParams, GrowParams, MaskChannel,
    PaletteCombineParams, SpreadParams, TransformParams,
};

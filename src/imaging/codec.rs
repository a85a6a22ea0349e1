//! PNG decoding and encoding.
//!
//! Only PNG is supported; every texture read from a pack and every texture
//! produced by the generator goes through here.

use super::calculations::{MAX_PIXELS, fits_extent};
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageFormat, RgbaImage};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImagingError {
    #[error("PNG decode failed: {0}")]
    Decode(#[source] image::ImageError),
    #[error("PNG encode failed: {0}")]
    Encode(#[source] image::ImageError),
    #[error("{width}×{height} image exceeds {MAX_PIXELS} pixels")]
    TooLarge { width: u32, height: u32 },
}

/// Decode PNG bytes into RGBA8, converting from whatever color type the file uses.
///
/// Images over [`MAX_PIXELS`] are rejected so every operator can rely on its
/// inputs being of a size it may allocate again.
pub fn decode_png(bytes: &[u8]) -> Result<RgbaImage, ImagingError> {
    let decoded = image::load_from_memory_with_format(bytes, ImageFormat::Png)
        .map_err(ImagingError::Decode)?;
    let (width, height) = (decoded.width(), decoded.height());
    if !fits_extent(width, height) {
        return Err(ImagingError::TooLarge { width, height });
    }
    Ok(decoded.to_rgba8())
}

pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, ImagingError> {
    let mut out = Vec::new();
    PngEncoder::new(&mut out)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgba8,
        )
        .map_err(ImagingError::Encode)?;
    Ok(out)
}

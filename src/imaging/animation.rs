//! Animation strips.
//!
//! An animated texture is a strip of square frames stacked top to bottom: a
//! 16×64 image holds four 16×16 frames. These helpers cut frames out of a
//! strip and stack generated frames back into one.

use super::calculations::checked_extent;
use super::pointwise::{argb_at, generate, sample};
use image::RgbaImage;
use std::borrow::Borrow;

/// Whole square frames in `strip`; 0 when it is empty or wider than tall.
pub fn frame_count(strip: &RgbaImage) -> u32 {
    match strip.width() {
        0 => 0,
        width => strip.height() / width,
    }
}

/// Frame `index / scale` of `strip`, wrapping around its frame count.
///
/// `scale` slows a source down: with `scale` 2 every frame is shown for two
/// consecutive indices.
pub fn frame(strip: &RgbaImage, index: u32, scale: u32) -> RgbaImage {
    let size = strip.width();
    let count = frame_count(strip).max(1);
    let offset = i64::from((index / scale.max(1)) % count) * i64::from(size);
    generate(size, size, |x, y| {
        sample(strip, i64::from(x), offset + i64::from(y)).0
    })
}

/// Stack square `frames` into a strip `width` pixels wide, scaling each frame
/// to `width × width` by nearest neighbour.
///
/// `None` when there are no frames, a frame is not a non-empty square, or the
/// strip would be too large.
pub fn stack_frames<F: Borrow<RgbaImage> + Sync>(frames: &[F], width: u32) -> Option<RgbaImage> {
    if width == 0 || frames.is_empty() {
        return None;
    }
    if frames
        .iter()
        .map(|f| Borrow::<RgbaImage>::borrow(f))
        .any(|f| f.width() == 0 || f.width() != f.height())
    {
        return None;
    }
    let height = width.checked_mul(u32::try_from(frames.len()).ok()?)?;
    checked_extent("animation strip", width, height)?;
    Some(generate(width, height, |x, y| {
        let frame = Borrow::<RgbaImage>::borrow(&frames[(y / width) as usize]);
        let size = u64::from(frame.width());
        let scale = |v: u32| (u64::from(v) * size / u64::from(width)) as u32;
        argb_at(frame, scale(x), scale(y % width))
    }))
}

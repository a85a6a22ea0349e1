//! Generated texture metadata (`.png.mcmeta` files).
//!
//! A `texture_meta` document combines the metadata of several source
//! textures into one file, optionally overriding individual values:
//!
//! ```json
//! {"type": "texture_meta", "output_location": "ns:block/x",
//!  "sources": ["ns:block/base", "ns:block/glow"],
//!  "animation": {"frametime": 2, "pattern_source": "ns:block/glow", "scales": [1, 2]}}
//! ```
//!
//! The output is `ns:textures/block/x.png.mcmeta`. A source without a
//! readable metadata file counts as having none.
//!
//! ## Combining
//!
//! | Section | Present when | Values |
//! |---|---|---|
//! | `animation` | any source is animated | override, else first animated source |
//! | `texture` | any source has it, or the document does | override, else first source that has it, else `false` |
//! | `villager` | any source has it, or the document does | override, else first source that has it, else `none` |
//!
//! The combined animation is as long as the LCM of every source's frame count
//! times its scale. Its frame order follows the pattern source: each of its
//! frames `f` becomes `f·k .. f·k+k-1`, with `k` the total length over the
//! pattern source's own frame count.

use crate::imaging::calculations::{MAX_PIXELS, lcm};
use crate::types::{Identifier, IdentifierError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetaError {
    #[error("malformed document: {0}")]
    Malformed(String),
    #[error("at least one source texture is required")]
    NoSources,
    #[error("pattern source {0} is not one of the sources")]
    UnknownPatternSource(Identifier),
    #[error("animation scales must be at least 1")]
    ZeroScale,
}

// =========================================================================
// Metadata files
// =========================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hat {
    #[default]
    None,
    Partial,
    Full,
}

/// The `animation` section of a metadata file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimationMeta {
    #[serde(default = "default_frametime")]
    pub frametime: u32,
    #[serde(default = "default_frames")]
    pub frames: Vec<u32>,
    #[serde(default)]
    pub interpolate: bool,
}

fn default_frametime() -> u32 {
    1
}

fn default_frames() -> Vec<u32> {
    vec![0]
}

impl AnimationMeta {
    /// One more than the highest frame index listed.
    pub fn frame_count(&self) -> u32 {
        self.frames.iter().max().map_or(1, |max| max.saturating_add(1))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureFlags {
    #[serde(default)]
    pub blur: bool,
    #[serde(default)]
    pub clamp: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VillagerMeta {
    #[serde(default)]
    pub hat: Hat,
}

/// A texture's metadata file; absent sections are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub animation: Option<AnimationMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub texture: Option<TextureFlags>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub villager: Option<VillagerMeta>,
}

impl TextureMeta {
    /// Parse a metadata file; anything unreadable counts as no metadata.
    pub fn parse(bytes: &[u8]) -> Self {
        serde_json::from_slice(bytes).unwrap_or_else(|e| {
            debug!(error = %e, "ignoring unreadable texture metadata");
            Self::default()
        })
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }
}

/// `ns:block/x` → `ns:textures/block/x.png.mcmeta`.
pub fn metadata_location(texture: &Identifier) -> Result<Identifier, IdentifierError> {
    texture.wrap("textures/", ".png.mcmeta")
}

// =========================================================================
// Documents
// =========================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimationOverrides {
    pub frametime: Option<u32>,
    pub interpolate: Option<bool>,
    pub pattern_source: Option<Identifier>,
    /// Per source, in order; missing entries are 1.
    pub scales: Option<Vec<u32>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureOverrides {
    pub blur: Option<bool>,
    pub clamp: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VillagerOverrides {
    pub hat: Option<Hat>,
}

/// The body of a `texture_meta` document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaDocument {
    pub sources: Vec<Identifier>,
    #[serde(default)]
    pub animation: Option<AnimationOverrides>,
    #[serde(default)]
    pub texture: Option<TextureOverrides>,
    #[serde(default)]
    pub villager: Option<VillagerOverrides>,
}

impl MetaDocument {
    pub fn validate(&self) -> Result<(), MetaError> {
        if self.sources.is_empty() {
            return Err(MetaError::NoSources);
        }
        let Some(animation) = &self.animation else {
            return Ok(());
        };
        let unknown = animation
            .pattern_source
            .as_ref()
            .filter(|pattern| !self.sources.contains(pattern));
        if let Some(pattern) = unknown {
            return Err(MetaError::UnknownPatternSource(pattern.clone()));
        }
        if animation.scales.iter().flatten().any(|&scale| scale == 0) {
            return Err(MetaError::ZeroScale);
        }
        Ok(())
    }

    /// Deterministic JSON used for fingerprinting.
    pub fn canonical_string(&self) -> String {
        serde_json::to_value(self)
            .map(|value| value.to_string())
            .unwrap_or_default()
    }

    fn scale(&self, index: usize) -> u32 {
        self.animation
            .as_ref()
            .and_then(|a| a.scales.as_ref())
            .and_then(|scales| scales.get(index).copied())
            .unwrap_or(1)
    }

    /// Combine the metadata of every source, in `sources` order.
    ///
    /// `None` when the combined animation would have more frames than a
    /// texture can hold pixels.
    pub fn combine(&self, metas: &[TextureMeta]) -> Option<TextureMeta> {
        let texture = self.combine_texture(metas);
        let villager = self.combine_villager(metas);
        let animation = match self.combine_animation(metas) {
            Ok(animation) => animation,
            Err(e) => {
                warn!(error = %e, "could not combine texture animations");
                return None;
            }
        };
        Some(TextureMeta {
            animation,
            texture,
            villager,
        })
    }

    fn combine_texture(&self, metas: &[TextureMeta]) -> Option<TextureFlags> {
        let first = metas.iter().find_map(|m| m.texture);
        if first.is_none() && self.texture.is_none() {
            return None;
        }
        let overrides = self.texture.unwrap_or_default();
        let first = first.unwrap_or_default();
        Some(TextureFlags {
            blur: overrides.blur.unwrap_or(first.blur),
            clamp: overrides.clamp.unwrap_or(first.clamp),
        })
    }

    fn combine_villager(&self, metas: &[TextureMeta]) -> Option<VillagerMeta> {
        let first = metas.iter().find_map(|m| m.villager);
        if first.is_none() && self.villager.is_none() {
            return None;
        }
        let hat = self
            .villager
            .and_then(|v| v.hat)
            .unwrap_or(first.unwrap_or_default().hat);
        Some(VillagerMeta { hat })
    }

    fn combine_animation(
        &self,
        metas: &[TextureMeta],
    ) -> Result<Option<AnimationMeta>, AnimationError> {
        let Some(first) = metas.iter().find_map(|m| m.animation.as_ref()) else {
            return Ok(None);
        };
        let overrides = self.animation.clone().unwrap_or_default();

        let mut total = 1u32;
        for (index, meta) in metas.iter().enumerate() {
            let count = meta.animation.as_ref().map_or(1, AnimationMeta::frame_count);
            let length = count
                .checked_mul(self.scale(index))
                .ok_or(AnimationError::TooLong)?;
            total = lcm(total, length).ok_or(AnimationError::TooLong)?;
        }
        // A longer animation could not be stacked into a texture anyway.
        if u64::from(total) > MAX_PIXELS {
            return Err(AnimationError::TooLong);
        }

        let pattern = match &overrides.pattern_source {
            Some(pattern) => self
                .sources
                .iter()
                .position(|s| s == pattern)
                .ok_or_else(|| AnimationError::Pattern(pattern.clone()))?,
            None => metas
                .iter()
                .position(|m| m.animation.as_ref().is_some_and(|a| a.frames != [0]))
                .unwrap_or(0),
        };
        let pattern_animation = metas.get(pattern).and_then(|m| m.animation.as_ref());
        let pattern_frames = pattern_animation.map_or_else(default_frames, |a| a.frames.clone());
        let stretch = total / pattern_animation.map_or(1, AnimationMeta::frame_count);

        let mut frames = Vec::with_capacity(pattern_frames.len().saturating_mul(stretch as usize));
        for frame in pattern_frames {
            let start = frame.checked_mul(stretch).ok_or(AnimationError::TooLong)?;
            frames.extend((0..stretch).map(|i| start + i));
        }

        Ok(Some(AnimationMeta {
            frametime: overrides.frametime.unwrap_or(first.frametime),
            frames,
            interpolate: overrides.interpolate.unwrap_or(first.interpolate),
        }))
    }
}

#[derive(Error, Debug)]
enum AnimationError {
    #[error("combined animation is too long")]
    TooLong,
    #[error("pattern source {0} is not one of the sources")]
    Pattern(Identifier),
}

//! The operator graph: declarative texture derivations.
//!
//! A [`TexSource`] is one node of a tree decoded from JSON (see [`decode`]).
//! Leaves read textures from the pack stack or spell out literal colors;
//! inner nodes transform the images their children produce:
//!
//! ```text
//! {"type": "overlay", "inputs": [
//!     {"type": "file", "path": "minecraft:block/stone"},
//!     {"type": "transform", "rotate": 1,
//!      "input": {"type": "file", "path": "mymod:block/ore_overlay"}}
//! ]}
//! ```
//!
//! ## Evaluation
//!
//! [`TexSource::evaluate`] is a pure function of the node, the bytes of the
//! textures it references and the context's color encoding. Any node that
//! cannot produce an image yields `None` (absent). Absence propagates upward
//! and is never an error, except that [`TexSource::Fallback`] swallows it.
//!
//! ## Canonical form
//!
//! [`TexSource::canonical_json`] re-serializes a node with sorted keys and
//! every default filled in, so two documents that mean the same thing hash to
//! the same fingerprint regardless of key order or omitted defaults.

pub mod context;
pub mod decode;

pub use context::{
    EvaluationMemo, Frames, GenerationContext, ResourceSource, Texture, texture_location,
};
pub use decode::{DecoderTable, Fields, SourceError};

use crate::color::{ColorEncoding, Space, TRANSPARENT};
use crate::imaging::animation;
use crate::imaging::calculations::{checked_extent, color_square_side, lcm};
use crate::imaging::extract::extract_foreground;
use crate::imaging::operations;
use crate::imaging::params::{
    CropParams, EdgeParams, ForegroundParams, GrowParams, MaskChannel, PaletteCombineParams,
    SpreadParams, TransformParams,
};
use crate::imaging::pointwise::generate;
use crate::types::Identifier;
use image::RgbaImage;
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tracing::{error, warn};

/// A node type defined outside this crate and registered on a
/// [`DecoderTable`] with [`DecoderTable::register_extension`].
pub trait ExtensionSource: Send + Sync + fmt::Debug {
    fn tag(&self) -> &str;

    /// Canonical fields (without `"type"`); must fill in defaults.
    fn canonical_fields(&self) -> Map<String, Value>;

    fn evaluate(&self, ctx: &GenerationContext<'_>) -> Option<RgbaImage>;

    /// Add every texture this node reads to `out`.
    fn referenced_textures(&self, _out: &mut BTreeSet<Identifier>) {}
}

/// A named input of an animation splitter.
#[derive(Debug, Clone)]
pub struct TimedSource {
    pub source: TexSource,
    /// Each frame of the source lasts `scale` frames of the output.
    pub scale: u32,
}

#[derive(Debug, Clone)]
pub enum TexSource {
    /// `ns:textures/<path>.png` from the pack stack.
    File { path: Identifier },
    /// Literal colors, row-major on the smallest power-of-two square.
    Color {
        colors: Vec<u32>,
        /// `None` uses the context encoding.
        encoding: Option<ColorEncoding>,
    },
    Crop {
        input: Box<TexSource>,
        params: CropParams,
    },
    Transform {
        input: Box<TexSource>,
        params: TransformParams,
    },
    /// First input at the bottom.
    Overlay { inputs: Vec<TexSource> },
    Mask {
        input: Box<TexSource>,
        mask: Box<TexSource>,
    },
    Invert { source: Box<TexSource> },
    Add { sources: Vec<TexSource> },
    Multiply { sources: Vec<TexSource> },
    Cutoff {
        source: Box<TexSource>,
        channel: MaskChannel,
        cutoff: f64,
    },
    Edge {
        source: Box<TexSource>,
        params: EdgeParams,
    },
    Grow {
        source: Box<TexSource>,
        params: GrowParams,
    },
    CombinedPalettedImage {
        background: Box<TexSource>,
        overlay: Option<Box<TexSource>>,
        paletted: Box<TexSource>,
        params: PaletteCombineParams,
    },
    ForegroundTransfer {
        background: Box<TexSource>,
        full: Box<TexSource>,
        new_background: Box<TexSource>,
        params: ForegroundParams,
    },
    PaletteRemap {
        source: Box<TexSource>,
        palette: Box<TexSource>,
        space: Space,
    },
    PaletteSpread {
        source: Box<TexSource>,
        params: SpreadParams,
    },
    /// Evaluates `generator` once per frame of the combined animation of
    /// `sources`; `frame_capture` nodes inside it read the current frames.
    AnimationSplitter {
        sources: BTreeMap<String, TimedSource>,
        generator: Box<TexSource>,
    },
    /// The current frame of an enclosing splitter's source `capture`.
    FrameCapture { capture: String },
    /// First child that is not absent.
    Fallback { sources: Vec<TexSource> },
    /// Logs `message`; always absent.
    Error { message: String },
    Extension(Arc<dyn ExtensionSource>),
}

fn space_name(space: Space) -> &'static str {
    match space {
        Space::Rgb => "rgb",
        Space::Lab => "lab",
    }
}

fn channel_name(channel: MaskChannel) -> &'static str {
    match channel {
        MaskChannel::Alpha => "alpha",
        MaskChannel::Red => "red",
        MaskChannel::Green => "green",
        MaskChannel::Blue => "blue",
        MaskChannel::Lightness => "lightness",
    }
}

fn canonical_list(nodes: &[TexSource]) -> Value {
    Value::Array(nodes.iter().map(TexSource::canonical_json).collect())
}

impl TexSource {
    /// The serialization tag of this node.
    pub fn tag(&self) -> &str {
        match self {
            TexSource::File { .. } => "file",
            TexSource::Color { .. } => "color",
            TexSource::Crop { .. } => "crop",
            TexSource::Transform { .. } => "transform",
            TexSource::Overlay { .. } => "overlay",
            TexSource::Mask { .. } => "mask",
            TexSource::Invert { .. } => "mask/invert",
            TexSource::Add { .. } => "mask/add",
            TexSource::Multiply { .. } => "mask/multiply",
            TexSource::Cutoff { .. } => "mask/cutoff",
            TexSource::Edge { .. } => "mask/edge",
            TexSource::Grow { .. } => "mask/grow",
            TexSource::CombinedPalettedImage { .. } => "combined_paletted_image",
            TexSource::ForegroundTransfer { .. } => "foreground_transfer",
            TexSource::PaletteRemap { .. } => "palette_remap",
            TexSource::PaletteSpread { .. } => "palette_spread",
            TexSource::AnimationSplitter { .. } => "animation_splitter",
            TexSource::FrameCapture { .. } => "frame_capture",
            TexSource::Fallback { .. } => "fallback",
            TexSource::Error { .. } => "error",
            TexSource::Extension(ext) => ext.tag(),
        }
    }

    pub fn canonical_json(&self) -> Value {
        let tag = self.tag();
        match self {
            TexSource::File { path } => json!({"type": tag, "path": path.to_string()}),
            TexSource::Color { colors, encoding } => json!({
                "type": tag,
                "color": colors,
                "encoding": encoding.map(ColorEncoding::name),
            }),
            TexSource::Crop { input, params } => json!({
                "type": tag,
                "input": input.canonical_json(),
                "total_size": params.total_size,
                "start_x": params.start_x,
                "size_x": params.size_x,
                "start_y": params.start_y,
                "size_y": params.size_y,
            }),
            TexSource::Transform { input, params } => json!({
                "type": tag,
                "input": input.canonical_json(),
                "rotate": params.rotate,
                "flip": params.flip,
            }),
            TexSource::Overlay { inputs } => json!({"type": tag, "inputs": canonical_list(inputs)}),
            TexSource::Mask { input, mask } => json!({
                "type": tag,
                "input": input.canonical_json(),
                "mask": mask.canonical_json(),
            }),
            TexSource::Invert { source } => json!({"type": tag, "source": source.canonical_json()}),
            TexSource::Add { sources } | TexSource::Multiply { sources } => {
                json!({"type": tag, "sources": canonical_list(sources)})
            }
            TexSource::Cutoff {
                source,
                channel,
                cutoff,
            } => json!({
                "type": tag,
                "source": source.canonical_json(),
                "channel": channel_name(*channel),
                "cutoff": cutoff,
            }),
            TexSource::Edge { source, params } => json!({
                "type": tag,
                "source": source.canonical_json(),
                "count_outside_frame": params.count_outside_frame,
                "edges": params.edges.iter().map(|d| d.name()).collect::<Vec<_>>(),
                "cutoff": params.cutoff,
            }),
            TexSource::Grow { source, params } => json!({
                "type": tag,
                "source": source.canonical_json(),
                "growth": params.growth,
                "cutoff": params.cutoff,
            }),
            TexSource::CombinedPalettedImage {
                background,
                overlay,
                paletted,
                params,
            } => json!({
                "type": tag,
                "background": background.canonical_json(),
                "overlay": overlay.as_ref().map(|o| o.canonical_json()),
                "paletted": paletted.canonical_json(),
                "include_background": params.include_background,
                "stretch_paletted": params.stretch_paletted,
                "extend_palette_size": params.extend_palette_size,
            }),
            TexSource::ForegroundTransfer {
                background,
                full,
                new_background,
                params,
            } => json!({
                "type": tag,
                "background": background.canonical_json(),
                "full": full.canonical_json(),
                "new_background": new_background.canonical_json(),
                "extend_palette_size": params.extend_palette_size,
                "trim_trailing": params.trim_trailing,
                "force_neighbors": params.force_neighbors,
                "close_cutoff": params.close_cutoff,
            }),
            TexSource::PaletteRemap {
                source,
                palette,
                space,
            } => json!({
                "type": tag,
                "source": source.canonical_json(),
                "palette": palette.canonical_json(),
                "space": space_name(*space),
            }),
            TexSource::PaletteSpread { source, params } => json!({
                "type": tag,
                "source": source.canonical_json(),
                "palette_cutoff": params.palette_cutoff,
                "lower_bound": params.lower_bound,
                "upper_bound": params.upper_bound,
            }),
            TexSource::AnimationSplitter { sources, generator } => {
                let sources: Map<String, Value> = sources
                    .iter()
                    .map(|(key, timed)| {
                        let entry = json!({
                            "source": timed.source.canonical_json(),
                            "scale": timed.scale,
                        });
                        (key.clone(), entry)
                    })
                    .collect();
                json!({
                    "type": tag,
                    "sources": sources,
                    "generator": generator.canonical_json(),
                })
            }
            TexSource::FrameCapture { capture } => json!({"type": tag, "capture": capture}),
            TexSource::Fallback { sources } => {
                json!({"type": tag, "sources": canonical_list(sources)})
            }
            TexSource::Error { message } => json!({"type": tag, "message": message}),
            TexSource::Extension(ext) => {
                let mut fields = ext.canonical_fields();
                fields.insert("type".to_string(), Value::String(tag.to_string()));
                Value::Object(fields)
            }
        }
    }

    /// Compact canonical JSON text; the key of the subtree memo.
    pub fn canonical_string(&self) -> String {
        self.canonical_json().to_string()
    }

    fn children(&self) -> Vec<&TexSource> {
        match self {
            TexSource::File { .. }
            | TexSource::Color { .. }
            | TexSource::FrameCapture { .. }
            | TexSource::Error { .. }
            | TexSource::Extension(_) => Vec::new(),
            TexSource::Crop { input, .. } | TexSource::Transform { input, .. } => vec![&**input],
            TexSource::Invert { source }
            | TexSource::Cutoff { source, .. }
            | TexSource::Edge { source, .. }
            | TexSource::Grow { source, .. }
            | TexSource::PaletteSpread { source, .. } => vec![&**source],
            TexSource::Mask { input, mask } => vec![&**input, &**mask],
            TexSource::Overlay { inputs: list }
            | TexSource::Add { sources: list }
            | TexSource::Multiply { sources: list }
            | TexSource::Fallback { sources: list } => list.iter().collect(),
            TexSource::CombinedPalettedImage {
                background,
                overlay,
                paletted,
                ..
            } => {
                let mut out = vec![&**background, &**paletted];
                out.extend(overlay.as_deref());
                out
            }
            TexSource::ForegroundTransfer {
                background,
                full,
                new_background,
                ..
            } => vec![&**background, &**full, &**new_background],
            TexSource::PaletteRemap {
                source, palette, ..
            } => vec![&**source, &**palette],
            TexSource::AnimationSplitter { sources, generator } => {
                let mut out: Vec<&TexSource> = sources.values().map(|t| &t.source).collect();
                out.push(generator);
                out
            }
        }
    }

    /// Every texture identifier (as written in `file` nodes) this tree reads.
    pub fn referenced_textures(&self, out: &mut BTreeSet<Identifier>) {
        match self {
            TexSource::File { path } => {
                out.insert(path.clone());
            }
            TexSource::Extension(ext) => ext.referenced_textures(out),
            _ => {
                for child in self.children() {
                    child.referenced_textures(out);
                }
            }
        }
    }

    /// Evaluate this node, sharing identical subtrees through the context's
    /// memo when it has one.
    pub fn evaluate(&self, ctx: &GenerationContext<'_>) -> Texture {
        ctx.memoized(|| self.canonical_string(), || self.evaluate_node(ctx))
    }

    /// Evaluate a required input, logging when it is absent.
    fn input(&self, child: &TexSource, ctx: &GenerationContext<'_>) -> Texture {
        let image = child.evaluate(ctx);
        if image.is_none() {
            warn!(node = self.tag(), input = child.tag(), "input texture is absent");
        }
        image
    }

    fn inputs(
        &self,
        children: &[TexSource],
        ctx: &GenerationContext<'_>,
    ) -> Option<Vec<Arc<RgbaImage>>> {
        children.iter().map(|child| self.input(child, ctx)).collect()
    }

    fn evaluate_node(&self, ctx: &GenerationContext<'_>) -> Texture {
        let image = match self {
            TexSource::File { path } => {
                ctx.count_evaluation();
                ctx.read_texture(path)
            }
            TexSource::Fallback { sources } => {
                return sources.iter().find_map(|source| source.evaluate(ctx));
            }
            TexSource::FrameCapture { capture } => {
                let frame = ctx.frame(capture);
                if frame.is_none() {
                    warn!(capture = %capture, "no animation frame to capture");
                }
                return frame;
            }
            TexSource::Error { message } => {
                error!(message = %message, "error node evaluated");
                return None;
            }
            _ => {
                let image = self.evaluate_operator(ctx)?;
                ctx.count_evaluation();
                image
            }
        };
        image.map(Arc::new)
    }

    /// Operator nodes. The outer `Option` is absence of an input, the inner
    /// one failure of the operator itself.
    fn evaluate_operator(&self, ctx: &GenerationContext<'_>) -> Option<Option<RgbaImage>> {
        let image = match self {
            TexSource::Color { colors, encoding } => {
                let encoding = encoding.unwrap_or(ctx.encoding());
                if colors.is_empty() {
                    None
                } else {
                    let side = color_square_side(colors.len());
                    Some(generate(side, side, |x, y| {
                        colors
                            .get(y as usize * side as usize + x as usize)
                            .map_or(TRANSPARENT, |&c| encoding.to_argb(c))
                    }))
                }
            }
            TexSource::Crop { input, params } => {
                let image = self.input(input, ctx)?;
                operations::crop(&image, params)
            }
            TexSource::Transform { input, params } => {
                let image = self.input(input, ctx)?;
                Some(operations::transform(&image, params))
            }
            TexSource::Overlay { inputs } => {
                let images = self.inputs(inputs, ctx)?;
                let layers: Vec<&RgbaImage> = images.iter().map(Arc::as_ref).collect();
                operations::overlay(&layers)
            }
            TexSource::Mask { input, mask } => {
                let image = self.input(input, ctx)?;
                let mask = self.input(mask, ctx)?;
                operations::mask(&image, &mask)
            }
            TexSource::Invert { source } => {
                let image = self.input(source, ctx)?;
                Some(operations::invert(&image))
            }
            TexSource::Add { sources } => {
                let images = self.inputs(sources, ctx)?;
                let layers: Vec<&RgbaImage> = images.iter().map(Arc::as_ref).collect();
                operations::add(&layers)
            }
            TexSource::Multiply { sources } => {
                let images = self.inputs(sources, ctx)?;
                let layers: Vec<&RgbaImage> = images.iter().map(Arc::as_ref).collect();
                operations::multiply(&layers)
            }
            TexSource::Cutoff {
                source,
                channel,
                cutoff,
            } => {
                let image = self.input(source, ctx)?;
                Some(operations::cutoff_mask(&image, *channel, *cutoff))
            }
            TexSource::Edge { source, params } => {
                let image = self.input(source, ctx)?;
                Some(operations::edge_mask(&image, params))
            }
            TexSource::Grow { source, params } => {
                let image = self.input(source, ctx)?;
                Some(operations::grow_mask(&image, params))
            }
            TexSource::CombinedPalettedImage {
                background,
                overlay,
                paletted,
                params,
            } => {
                let background = self.input(background, ctx)?;
                let paletted = self.input(paletted, ctx)?;
                let overlay = match overlay {
                    Some(node) => Some(self.input(node, ctx)?),
                    None => None,
                };
                operations::combine_paletted(&background, overlay.as_deref(), &paletted, params)
            }
            TexSource::ForegroundTransfer {
                background,
                full,
                new_background,
                params,
            } => {
                let background = self.input(background, ctx)?;
                let full = self.input(full, ctx)?;
                let new_background = self.input(new_background, ctx)?;
                extract_foreground(&background, &full, params).and_then(|extraction| {
                    operations::combine_paletted(
                        &new_background,
                        Some(&extraction.overlay),
                        &extraction.paletted,
                        &PaletteCombineParams {
                            include_background: true,
                            stretch_paletted: false,
                            extend_palette_size: params.extend_palette_size,
                        },
                    )
                })
            }
            TexSource::PaletteRemap {
                source,
                palette,
                space,
            } => {
                let image = self.input(source, ctx)?;
                let palette = self.input(palette, ctx)?;
                operations::palette_remap(&image, &palette, space.coordinates())
            }
            TexSource::PaletteSpread { source, params } => {
                let image = self.input(source, ctx)?;
                Some(operations::palette_spread(&image, params))
            }
            TexSource::AnimationSplitter { sources, generator } => {
                let mut strips = Vec::with_capacity(sources.len());
                for (key, timed) in sources {
                    strips.push((key.as_str(), self.input(&timed.source, ctx)?, timed.scale));
                }
                self.animate(&strips, generator, ctx)
            }
            TexSource::Extension(ext) => ext.evaluate(ctx),
            TexSource::File { .. }
            | TexSource::FrameCapture { .. }
            | TexSource::Fallback { .. }
            | TexSource::Error { .. } => None,
        };
        if image.is_none() {
            warn!(node = self.tag(), "operator produced no image");
        }
        Some(image)
    }

    /// Run `generator` once per frame and stack the results.
    ///
    /// The output runs for the LCM of every source's frame count times its
    /// scale, and is as wide as the LCM of the source widths.
    fn animate(
        &self,
        strips: &[(&str, Arc<RgbaImage>, u32)],
        generator: &TexSource,
        ctx: &GenerationContext<'_>,
    ) -> Option<RgbaImage> {
        let (mut frames, mut width) = (1u32, 1u32);
        for (key, strip, scale) in strips {
            let count = animation::frame_count(strip).saturating_mul(*scale);
            if count == 0 {
                warn!(node = self.tag(), source = *key, "source is not a strip of square frames");
                return None;
            }
            frames = lcm(frames, count)?;
            width = lcm(width, strip.width())?;
        }
        checked_extent(self.tag(), width, width.checked_mul(frames)?)?;

        let mut rendered = Vec::with_capacity(frames as usize);
        for index in 0..frames {
            let current: Frames = strips
                .iter()
                .map(|(key, strip, scale)| {
                    (key.to_string(), Arc::new(animation::frame(strip, index, *scale)))
                })
                .collect();
            let Some(image) = generator.evaluate(&ctx.with_frames(&current)) else {
                warn!(node = self.tag(), frame = index, "generator produced no frame");
                return None;
            };
            rendered.push(image);
        }
        animation::stack_frames(&rendered, width)
    }
}

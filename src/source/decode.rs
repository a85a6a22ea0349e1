//! Decoding operator nodes from JSON.
//!
//! A node is a JSON object with a `"type"` tag; the [`DecoderTable`] maps tags
//! to decoder functions. The built-in tags are registered by
//! [`DecoderTable::builtin`] and hosts can add their own with
//! [`DecoderTable::register`].
//!
//! ## Strictness
//!
//! | Problem | Result |
//! |---|---|
//! | not an object / no `"type"` | [`SourceError`] |
//! | unknown `"type"` | [`SourceError::UnknownType`] |
//! | required field missing | [`SourceError::MissingField`] |
//! | required field of the wrong shape | [`SourceError::InvalidField`] |
//! | optional field of the wrong shape | `warn!`, documented default |
//!
//! Errors are raised eagerly: a document with any bad node produces no node
//! at all.

use super::{ExtensionSource, TexSource, TimedSource};
use crate::color::{ColorEncoding, Space};
use crate::imaging::params::{
    CropParams, DEFAULT_EXTEND_PALETTE_SIZE, EdgeParams, ForegroundParams, GrowParams, MaskChannel,
    PaletteCombineParams, SpreadParams, TransformParams,
};
use crate::types::Identifier;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("node is not a JSON object")]
    NotAnObject,
    #[error("node has no string \"type\" field")]
    MissingType,
    #[error("unknown node type \"{0}\"")]
    UnknownType(String),
    #[error("{tag}: missing required field \"{field}\"")]
    MissingField { tag: String, field: String },
    #[error("{tag}: field \"{field}\" is invalid: {reason}")]
    InvalidField {
        tag: String,
        field: String,
        reason: String,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SourceError {
    /// The node tag the error is about, when known.
    pub fn tag(&self) -> Option<&str> {
        match self {
            SourceError::UnknownType(tag)
            | SourceError::MissingField { tag, .. }
            | SourceError::InvalidField { tag, .. } => Some(tag),
            SourceError::NotAnObject | SourceError::MissingType | SourceError::Json(_) => None,
        }
    }
}

/// Decoder for one tag. Receives the table so it can decode child nodes.
pub type DecodeFn = dyn Fn(&DecoderTable, &Fields<'_>) -> Result<TexSource, SourceError> + Send + Sync;

#[derive(Clone)]
pub struct DecoderTable {
    decoders: BTreeMap<String, Arc<DecodeFn>>,
}

impl std::fmt::Debug for DecoderTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.decoders.keys()).finish()
    }
}

impl Default for DecoderTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl DecoderTable {
    /// A table with no tags at all.
    pub fn empty() -> Self {
        Self {
            decoders: BTreeMap::new(),
        }
    }

    /// A table holding every built-in tag.
    pub fn builtin() -> Self {
        let mut table = Self::empty();
        table.register("file", |_, f| {
            Ok(TexSource::File {
                path: f.identifier("path")?,
            })
        });
        table.register("color", |_, f| {
            Ok(TexSource::Color {
                colors: f.required_as("color")?,
                encoding: f.optional_as::<Option<ColorEncoding>>("encoding", None),
            })
        });
        table.register("crop", |t, f| {
            Ok(TexSource::Crop {
                input: Box::new(f.node(t, "input")?),
                params: CropParams {
                    total_size: f.required_as("total_size")?,
                    start_x: f.required_as("start_x")?,
                    size_x: f.required_as("size_x")?,
                    start_y: f.required_as("start_y")?,
                    size_y: f.required_as("size_y")?,
                },
            })
        });
        table.register("transform", |t, f| {
            let defaults = TransformParams::default();
            Ok(TexSource::Transform {
                input: Box::new(f.node(t, "input")?),
                params: TransformParams {
                    rotate: f.optional_as("rotate", defaults.rotate),
                    flip: f.optional_as("flip", defaults.flip),
                },
            })
        });
        table.register("overlay", |t, f| {
            Ok(TexSource::Overlay {
                inputs: f.nodes(t, "inputs")?,
            })
        });
        table.register("mask", |t, f| {
            Ok(TexSource::Mask {
                input: Box::new(f.node(t, "input")?),
                mask: Box::new(f.node(t, "mask")?),
            })
        });
        table.register("mask/invert", |t, f| {
            Ok(TexSource::Invert {
                source: Box::new(f.node(t, "source")?),
            })
        });
        table.register("mask/add", |t, f| {
            Ok(TexSource::Add {
                sources: f.nodes(t, "sources")?,
            })
        });
        table.register("mask/multiply", |t, f| {
            Ok(TexSource::Multiply {
                sources: f.nodes(t, "sources")?,
            })
        });
        table.register("mask/cutoff", |t, f| {
            Ok(TexSource::Cutoff {
                source: Box::new(f.node(t, "source")?),
                channel: f.optional_as("channel", MaskChannel::default()),
                cutoff: f.optional_as("cutoff", 0.5),
            })
        });
        table.register("mask/edge", |t, f| {
            let defaults = EdgeParams::default();
            Ok(TexSource::Edge {
                source: Box::new(f.node(t, "source")?),
                params: EdgeParams {
                    count_outside_frame: f
                        .optional_as("count_outside_frame", defaults.count_outside_frame),
                    edges: f.optional_as("edges", defaults.edges),
                    cutoff: f.optional_as("cutoff", defaults.cutoff),
                },
            })
        });
        table.register("mask/grow", |t, f| {
            let defaults = GrowParams::default();
            Ok(TexSource::Grow {
                source: Box::new(f.node(t, "source")?),
                params: GrowParams {
                    growth: f.optional_as("growth", defaults.growth),
                    cutoff: f.optional_as("cutoff", defaults.cutoff),
                },
            })
        });
        table.register("combined_paletted_image", |t, f| {
            let defaults = PaletteCombineParams::default();
            Ok(TexSource::CombinedPalettedImage {
                background: Box::new(f.node(t, "background")?),
                overlay: f.optional_node(t, "overlay")?.map(Box::new),
                paletted: Box::new(f.node(t, "paletted")?),
                params: PaletteCombineParams {
                    include_background: f
                        .optional_as("include_background", defaults.include_background),
                    stretch_paletted: f.optional_as("stretch_paletted", defaults.stretch_paletted),
                    extend_palette_size: f
                        .optional_as("extend_palette_size", DEFAULT_EXTEND_PALETTE_SIZE),
                },
            })
        });
        table.register("foreground_transfer", |t, f| {
            let defaults = ForegroundParams::default();
            Ok(TexSource::ForegroundTransfer {
                background: Box::new(f.node(t, "background")?),
                full: Box::new(f.node(t, "full")?),
                new_background: Box::new(f.node(t, "new_background")?),
                params: ForegroundParams {
                    extend_palette_size: f
                        .optional_as("extend_palette_size", defaults.extend_palette_size),
                    trim_trailing: f.optional_as("trim_trailing", defaults.trim_trailing),
                    force_neighbors: f.optional_as("force_neighbors", defaults.force_neighbors),
                    close_cutoff: f.optional_as("close_cutoff", defaults.close_cutoff),
                },
            })
        });
        table.register("palette_remap", |t, f| {
            Ok(TexSource::PaletteRemap {
                source: Box::new(f.node(t, "source")?),
                palette: Box::new(f.node(t, "palette")?),
                space: f.optional_as("space", Space::default()),
            })
        });
        table.register("palette_spread", |t, f| {
            let defaults = SpreadParams::default();
            Ok(TexSource::PaletteSpread {
                source: Box::new(f.node(t, "source")?),
                params: SpreadParams {
                    palette_cutoff: f.optional_as("palette_cutoff", defaults.palette_cutoff),
                    lower_bound: f.optional_as("lower_bound", defaults.lower_bound),
                    upper_bound: f.optional_as("upper_bound", defaults.upper_bound),
                },
            })
        });
        table.register("animation_splitter", |t, f| {
            let mut sources = BTreeMap::new();
            for (key, entry) in f.objects("sources")? {
                let scale: u32 = entry.optional_as("scale", 1);
                if scale == 0 {
                    return Err(f.invalid("sources", format!("source \"{key}\" has scale 0")));
                }
                let source = entry.node(t, "source")?;
                sources.insert(key.to_string(), TimedSource { source, scale });
            }
            if sources.is_empty() {
                return Err(f.invalid("sources", "expected at least one source"));
            }
            Ok(TexSource::AnimationSplitter {
                sources,
                generator: Box::new(f.node(t, "generator")?),
            })
        });
        table.register("frame_capture", |_, f| {
            Ok(TexSource::FrameCapture {
                capture: f.required_as("capture")?,
            })
        });
        table.register("fallback", |t, f| {
            Ok(TexSource::Fallback {
                sources: f.nodes(t, "sources")?,
            })
        });
        table.register("error", |_, f| {
            Ok(TexSource::Error {
                message: f.required_as("message")?,
            })
        });
        table
    }

    /// Register (or replace) the decoder for `tag`.
    pub fn register(
        &mut self,
        tag: &str,
        decoder: impl Fn(&DecoderTable, &Fields<'_>) -> Result<TexSource, SourceError>
        + Send
        + Sync
        + 'static,
    ) {
        self.decoders.insert(tag.to_string(), Arc::new(decoder));
    }

    /// Register an externally defined node type. `decode` builds the node
    /// from its fields; it becomes a [`TexSource::Extension`].
    pub fn register_extension<E>(
        &mut self,
        tag: &str,
        decode: impl Fn(&DecoderTable, &Fields<'_>) -> Result<E, SourceError> + Send + Sync + 'static,
    ) where
        E: ExtensionSource + 'static,
    {
        self.register(tag, move |table, fields| {
            let node = decode(table, fields)?;
            Ok(TexSource::Extension(Arc::new(node)))
        });
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.decoders.contains_key(tag)
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.decoders.keys().map(String::as_str)
    }

    pub fn decode(&self, value: &Value) -> Result<TexSource, SourceError> {
        let map = value.as_object().ok_or(SourceError::NotAnObject)?;
        let tag = map
            .get("type")
            .and_then(Value::as_str)
            .ok_or(SourceError::MissingType)?;
        let decoder = self
            .decoders
            .get(tag)
            .ok_or_else(|| SourceError::UnknownType(tag.to_string()))?;
        decoder(self, &Fields { tag, map })
    }

    pub fn decode_str(&self, json: &str) -> Result<TexSource, SourceError> {
        let value: Value = serde_json::from_str(json)?;
        self.decode(&value)
    }
}

/// The fields of one node, with accessors that apply the strictness rules.
pub struct Fields<'a> {
    tag: &'a str,
    map: &'a Map<String, Value>,
}

impl<'a> Fields<'a> {
    pub fn tag(&self) -> &str {
        self.tag
    }

    pub fn get(&self, field: &str) -> Option<&'a Value> {
        self.map.get(field).filter(|v| !v.is_null())
    }

    fn invalid(&self, field: &str, reason: impl ToString) -> SourceError {
        SourceError::InvalidField {
            tag: self.tag.to_string(),
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn required(&self, field: &str) -> Result<&'a Value, SourceError> {
        self.get(field).ok_or_else(|| SourceError::MissingField {
            tag: self.tag.to_string(),
            field: field.to_string(),
        })
    }

    pub fn required_as<T: DeserializeOwned>(&self, field: &str) -> Result<T, SourceError> {
        T::deserialize(self.required(field)?).map_err(|e| self.invalid(field, e))
    }

    /// An optional field; absent or wrong-shaped values give `default`.
    pub fn optional_as<T: DeserializeOwned>(&self, field: &str, default: T) -> T {
        let Some(value) = self.get(field) else {
            return default;
        };
        match T::deserialize(value) {
            Ok(v) => v,
            Err(e) => {
                warn!(node = self.tag, field, error = %e, "ignoring malformed optional field");
                default
            }
        }
    }

    pub fn identifier(&self, field: &str) -> Result<Identifier, SourceError> {
        let text: String = self.required_as(field)?;
        text.parse().map_err(|e| self.invalid(field, e))
    }

    pub fn node(&self, table: &DecoderTable, field: &str) -> Result<TexSource, SourceError> {
        table.decode(self.required(field)?)
    }

    /// An optional child node. A non-object value is ignored with a warning;
    /// an object must decode.
    pub fn optional_node(
        &self,
        table: &DecoderTable,
        field: &str,
    ) -> Result<Option<TexSource>, SourceError> {
        match self.get(field) {
            None => Ok(None),
            Some(value) if value.is_object() => table.decode(value).map(Some),
            Some(_) => {
                warn!(node = self.tag, field, "ignoring non-object optional node");
                Ok(None)
            }
        }
    }

    /// A required object whose values are objects, as named sub-fields that
    /// report errors under this node's tag.
    pub fn objects(&self, field: &str) -> Result<Vec<(&'a str, Fields<'a>)>, SourceError> {
        let entries = self
            .required(field)?
            .as_object()
            .ok_or_else(|| self.invalid(field, "expected an object"))?;
        entries
            .iter()
            .map(|(key, value)| {
                let map = value
                    .as_object()
                    .ok_or_else(|| self.invalid(field, format!("entry \"{key}\" is not an object")))?;
                Ok((key.as_str(), Fields { tag: self.tag, map }))
            })
            .collect()
    }

    pub fn nodes(&self, table: &DecoderTable, field: &str) -> Result<Vec<TexSource>, SourceError> {
        let items = self
            .required(field)?
            .as_array()
            .ok_or_else(|| self.invalid(field, "expected an array of nodes"))?;
        items.iter().map(|item| table.decode(item)).collect()
    }
}

//! What a node can see while it evaluates.
//!
//! Nodes never touch the file system or the pack list directly. They read
//! through a [`ResourceSource`] (in practice the pre-pack lookup, see
//! [`crate::pack::PrePackRepository`]) handed to them inside a
//! [`GenerationContext`], together with the ambient color encoding and the
//! planner's bookkeeping.

use crate::color::ColorEncoding;
use crate::imaging::decode_png;
use crate::types::{Bytes, Identifier, PackType};
use image::RgbaImage;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tracing::{debug, warn};

/// Result of evaluating a texture node; `None` means absent.
pub type Texture = Option<Arc<RgbaImage>>;

/// The current frame of every named source of an animation splitter.
pub type Frames = BTreeMap<String, Arc<RgbaImage>>;

/// Read access to the resources of the pack stack a generation runs against.
pub trait ResourceSource: Send + Sync {
    fn read_resource(&self, pack_type: PackType, id: &Identifier) -> Option<Bytes>;

    /// Identifiers in `namespace` whose path starts with `prefix`.
    fn list_identifiers(
        &self,
        pack_type: PackType,
        namespace: &str,
        prefix: &str,
    ) -> BTreeSet<Identifier>;

    fn namespaces(&self, pack_type: PackType) -> BTreeSet<String>;

    fn has_resource(&self, pack_type: PackType, id: &Identifier) -> bool {
        self.read_resource(pack_type, id).is_some()
    }
}

/// Evaluated subtrees keyed by their canonical JSON.
///
/// Identical subtrees appearing in several outputs (or twice in one graph)
/// are evaluated once between resets. Each key gets its own `OnceLock`, so two
/// threads asking for the same subtree share one evaluation.
#[derive(Default)]
pub struct EvaluationMemo {
    entries: Mutex<HashMap<String, Arc<OnceLock<Texture>>>>,
}

impl EvaluationMemo {
    fn slot(&self, key: String) -> Arc<OnceLock<Texture>> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.entry(key).or_default().clone()
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct GenerationContext<'a> {
    resources: &'a dyn ResourceSource,
    encoding: ColorEncoding,
    memo: Option<&'a EvaluationMemo>,
    evaluations: Option<&'a AtomicU64>,
    frames: Option<&'a Frames>,
}

impl<'a> GenerationContext<'a> {
    pub fn new(resources: &'a dyn ResourceSource, encoding: ColorEncoding) -> Self {
        Self {
            resources,
            encoding,
            memo: None,
            evaluations: None,
            frames: None,
        }
    }

    pub fn with_memo(mut self, memo: &'a EvaluationMemo) -> Self {
        self.memo = Some(memo);
        self
    }

    /// Count every operator pass into `counter`.
    pub fn with_evaluation_counter(mut self, counter: &'a AtomicU64) -> Self {
        self.evaluations = Some(counter);
        self
    }

    /// A context for one frame of an animation. Frame-dependent results
    /// must not be shared, so it has no memo.
    pub(crate) fn with_frames<'b>(&'b self, frames: &'b Frames) -> GenerationContext<'b> {
        GenerationContext {
            resources: self.resources,
            encoding: self.encoding,
            memo: None,
            evaluations: self.evaluations,
            frames: Some(frames),
        }
    }

    /// The current frame of source `key`, inside an animation splitter.
    pub fn frame(&self, key: &str) -> Option<Arc<RgbaImage>> {
        self.frames?.get(key).cloned()
    }

    pub fn resources(&self) -> &dyn ResourceSource {
        self.resources
    }

    pub fn encoding(&self) -> ColorEncoding {
        self.encoding
    }

    /// Read and decode `<namespace>:textures/<path>.png` from the assets side.
    pub fn read_texture(&self, path: &Identifier) -> Option<RgbaImage> {
        let location = texture_location(path)?;
        let Some(bytes) = self.resources.read_resource(PackType::Assets, &location) else {
            debug!(texture = %location, "texture not available");
            return None;
        };
        match decode_png(&bytes) {
            Ok(image) => Some(image),
            Err(e) => {
                warn!(texture = %location, error = %e, "could not read texture");
                None
            }
        }
    }

    pub(crate) fn count_evaluation(&self) {
        if let Some(counter) = self.evaluations {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Evaluate through the subtree memo when one is attached.
    pub(crate) fn memoized(
        &self,
        key: impl FnOnce() -> String,
        evaluate: impl FnOnce() -> Texture,
    ) -> Texture {
        match self.memo {
            Some(memo) => memo.slot(key()).get_or_init(evaluate).clone(),
            None => evaluate(),
        }
    }
}

/// `ns:block/stone` → `ns:textures/block/stone.png`.
pub fn texture_location(path: &Identifier) -> Option<Identifier> {
    match path.wrap("textures/", ".png") {
        Ok(id) => Some(id),
        Err(e) => {
            warn!(path = %path, error = %e, "texture path does not form a valid identifier");
            None
        }
    }
}

//! Shared test utilities.
//!
//! Provides an in-memory [`ResourceSource`] that records what was read, plus
//! builders for identifiers and solid-color images.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let source = MemorySource::new().with_texture("a:block/stone", &solid(4, 4, 0xFF80_8080));
//! let image = node.evaluate(&GenerationContext::new(&source, ColorEncoding::Argb));
//! assert_eq!(source.reads(), vec![id("a:textures/block/stone.png")]);
//! ```

use crate::imaging::encode_png;
use crate::imaging::pointwise::to_rgba;
use crate::source::ResourceSource;
use crate::types::{Bytes, Identifier, PackType};
use image::RgbaImage;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

// =========================================================================
// Builders
// =========================================================================

pub fn id(text: &str) -> Identifier {
    text.parse().unwrap()
}

pub fn solid(width: u32, height: u32, color: u32) -> RgbaImage {
    RgbaImage::from_pixel(width, height, to_rgba(color))
}

pub fn solid_png(width: u32, height: u32, color: u32) -> Vec<u8> {
    encode_png(&solid(width, height, color)).unwrap()
}

// =========================================================================
// In-memory resources
// =========================================================================

#[derive(Default)]
pub struct MemorySource {
    resources: Mutex<BTreeMap<(PackType, Identifier), Bytes>>,
    reads: Mutex<Vec<Identifier>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `image` as the texture `path` (stored at `ns:textures/<path>.png`).
    pub fn with_texture(self, path: &str, image: &RgbaImage) -> Self {
        let location = id(path).wrap("textures/", ".png").unwrap();
        self.insert(PackType::Assets, location, encode_png(image).unwrap());
        self
    }

    pub fn with_resource(self, pack_type: PackType, location: &str, bytes: &[u8]) -> Self {
        self.insert(pack_type, id(location), bytes.to_vec());
        self
    }

    pub fn insert(&self, pack_type: PackType, location: Identifier, bytes: Vec<u8>) {
        self.resources
            .lock()
            .unwrap()
            .insert((pack_type, location), bytes.into());
    }

    pub fn remove(&self, pack_type: PackType, location: &Identifier) {
        self.resources
            .lock()
            .unwrap()
            .remove(&(pack_type, location.clone()));
    }

    /// Every successful or failed read, in order.
    pub fn reads(&self) -> Vec<Identifier> {
        self.reads.lock().unwrap().clone()
    }
}

impl ResourceSource for MemorySource {
    fn read_resource(&self, pack_type: PackType, id: &Identifier) -> Option<Bytes> {
        self.reads.lock().unwrap().push(id.clone());
        self.resources
            .lock()
            .unwrap()
            .get(&(pack_type, id.clone()))
            .cloned()
    }

    fn list_identifiers(
        &self,
        pack_type: PackType,
        namespace: &str,
        prefix: &str,
    ) -> BTreeSet<Identifier> {
        self.resources
            .lock()
            .unwrap()
            .keys()
            .filter(|(t, id)| {
                *t == pack_type && id.namespace() == namespace && id.path().starts_with(prefix)
            })
            .map(|(_, id)| id.clone())
            .collect()
    }

    fn namespaces(&self, pack_type: PackType) -> BTreeSet<String> {
        self.resources
            .lock()
            .unwrap()
            .keys()
            .filter(|(t, _)| *t == pack_type)
            .map(|(_, id)| id.namespace().to_string())
            .collect()
    }
}

//! # Dynamic Asset Gen
//!
//! Lazily generated, content-addressed resources for a layered resource-pack
//! system. Declarative JSON documents shipped inside ordinary packs describe
//! how to derive new textures from existing ones (crop, rotate, overlay, mask,
//! palette remap, foreground transfer, animation), how to combine texture
//! metadata and how to assemble tag files from conditional members. A
//! generated overlay pack serves the results to the host on demand.
//!
//! # Architecture: Plan, Produce, Cache
//!
//! ```text
//! packs ─▶ PrePackRepository ─▶ Planner ─▶ GeneratedPack ─▶ host
//!           (snapshot of the      (documents → lazies,   (hasResource /
//!            stack in progress)    one per output)        getResource / reset)
//!                                      │
//!                                      ▼
//!                               ResourceCache (identifier + fingerprint → bytes)
//! ```
//!
//! 1. **Plan**: a [`planner::Planner`] lists the source documents visible in
//!    the stack, decodes each into an operator graph ([`source::TexSource`])
//!    or tag contribution ([`tags::TagMerge`]), and binds every output
//!    identifier to a [`lazy::ResettableLazy`].
//! 2. **Produce**: the first request for an identifier fingerprints its
//!    inputs, consults the cache, and only on a miss evaluates the graph.
//! 3. **Reset**: when the host rebuilds its stack it resets the generated
//!    pack; the reset cascades through every lazy and the next request
//!    replans.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`types`] | `Identifier`, `PackType` and the shared byte payload type |
//! | [`color`] | Packed ARGB colors, encodings, color spaces, palettes and palette paths |
//! | [`imaging`] | Pixel operations, foreground extraction and the PNG codec |
//! | [`source`] | The operator graph: node types, decoding, canonical form, evaluation |
//! | [`tags`] | Tag files, member predicates and tag merging |
//! | [`meta`] | Texture metadata documents and `.png.mcmeta` combining |
//! | [`lazy`] | Single-flight memoized values with cascading reset |
//! | [`cache`] | On-disk content-addressed cache, fingerprints and statistics |
//! | [`planner`] | Source documents → output registry, produce and reset |
//! | [`pack`] | Pack trait, directory packs, the pre-pack snapshot and the generated pack |
//! | [`export`] | Writes a generated pack to a directory tree in parallel |
//! | [`config`] | `dynamic_asset_gen.toml` loading and validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Absence, Not Errors, at Runtime
//!
//! Malformed documents are rejected when planning, with the document and node
//! tag in the error. Everything after that is infallible from the host's point
//! of view: a node that cannot produce an image yields `None`, a cache that
//! cannot be read is a miss. One broken texture never takes the rest of the
//! pack down with it.
//!
//! ## Registry Swap
//!
//! The planner never edits its registry in place. Planning builds a complete
//! new registry and swaps it in; a reset takes the old one out and resets its
//! lazies. Readers holding the old registry finish against consistent state.
//!
//! ## Fingerprints Over Timestamps
//!
//! A cache entry is keyed by a SHA-256 over the canonical JSON of the node,
//! the bytes of every texture it reads, the color encoding and the cache
//! format version. Equivalent documents written differently (key order,
//! omitted defaults) share entries; any input change misses.
//!
//! ## No Feedback Through Generated Packs
//!
//! Generation reads its inputs from a snapshot of the stack that excludes
//! generated packs. A document can use another document's input textures but
//! never another document's output.

pub mod cache;
pub mod color;
pub mod config;
pub mod export;
pub mod imaging;
pub mod lazy;
pub mod meta;
pub mod output;
pub mod pack;
pub mod planner;
pub mod source;
pub mod tags;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;

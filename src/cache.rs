//! Content-addressed cache for generated resources.
//!
//! Evaluating an operator graph means decoding PNGs, running per-pixel
//! passes and encoding the result again. This module lets the planner skip
//! all of that when nothing that went into a resource has changed since the
//! bytes were last produced, including across process restarts.
//!
//! # Design
//!
//! ## Cache keys
//!
//! Entries are keyed by `(identifier, fingerprint)`. The fingerprint is a
//! SHA-256 over everything that determines the output bytes:
//!
//! - **Textures** ([`texture_fingerprint`]): the node's canonical JSON, the
//!   content hash of every texture it reads (or an "absent" marker), the
//!   ambient color encoding, the pack type and the output identifier.
//! - **Tags** ([`tag_fingerprint`]): the tag identifier, the `replace` flag
//!   and every `(member, predicate result)` pair in contribution order.
//! - **Texture metadata** ([`meta_fingerprint`]): the document and the
//!   content hash of every source's metadata file.
//!
//! All of them also hash [`CACHE_VERSION`] and whether caching is enabled, so format
//! changes and toggling the switch never resurrect stale entries. Content
//! hashes rather than timestamps are used so the cache survives `git
//! checkout` and pack re-extraction.
//!
//! ## Storage
//!
//! ```text
//! <root>/cache-meta.json                    {"version": N}
//! <root>/<namespace>/<path>/<fingerprint>   payload bytes
//! ```
//!
//! Writes go to a temp file in the entry directory and are renamed into
//! place, so readers see either the old entry or the new one, never a torn
//! one. Storing a fingerprint removes the identifier's older fingerprints.
//!
//! A missing, unreadable or out-of-date `cache-meta.json` wipes the root and
//! starts over.
//!
//! ## Failure policy
//!
//! Cache I/O errors are logged with `tracing::warn!` and treated as misses;
//! they never fail a generation. A disabled cache misses every lookup and
//! drops every store, so callers use the same code path either way.

use crate::color::ColorEncoding;
use crate::types::{Bytes, Identifier, PackType};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Name of the metadata file within the cache root.
const METADATA_FILENAME: &str = "cache-meta.json";

/// Version of the on-disk format and fingerprint computation. Bump this to
/// invalidate all existing caches.
pub const CACHE_VERSION: u32 = 1;

const TEMP_SUFFIX: &str = ".tmp";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct CacheMetadata {
    version: u32,
}

/// Disk-backed store of generated payloads.
#[derive(Debug)]
pub struct ResourceCache {
    root: PathBuf,
    enabled: bool,
}

impl ResourceCache {
    /// Open (and if needed reset) the cache at `root`. A disabled cache never
    /// touches the disk.
    pub fn open(root: impl Into<PathBuf>, enabled: bool) -> Self {
        let cache = Self {
            root: root.into(),
            enabled,
        };
        if enabled {
            if let Err(e) = cache.prepare() {
                warn!(root = %cache.root.display(), error = %e, "could not prepare cache directory");
            }
        }
        cache
    }

    pub fn disabled() -> Self {
        Self {
            root: PathBuf::new(),
            enabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Make sure the root holds a current metadata file, wiping it otherwise.
    fn prepare(&self) -> io::Result<()> {
        let meta_path = self.root.join(METADATA_FILENAME);
        let current = std::fs::read_to_string(&meta_path)
            .ok()
            .and_then(|text| serde_json::from_str::<CacheMetadata>(&text).ok());
        if current.is_some_and(|m| m.version == CACHE_VERSION) {
            return Ok(());
        }
        if self.root.exists() {
            debug!(root = %self.root.display(), "cache metadata missing or outdated; clearing");
            std::fs::remove_dir_all(&self.root)?;
        }
        std::fs::create_dir_all(&self.root)?;
        let json = serde_json::to_string(&CacheMetadata {
            version: CACHE_VERSION,
        })?;
        std::fs::write(meta_path, json)
    }

    fn entry_dir(&self, id: &Identifier) -> PathBuf {
        let mut dir = self.root.join(id.namespace());
        for segment in id.path().split('/') {
            dir.push(segment);
        }
        dir
    }

    /// Cached bytes for `(id, fingerprint)`, if present.
    pub fn lookup(&self, id: &Identifier, fingerprint: &str) -> Option<Bytes> {
        if !self.enabled {
            return None;
        }
        let path = self.entry_dir(id).join(fingerprint);
        match std::fs::read(&path) {
            Ok(bytes) => Some(bytes.into()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(id = %id, error = %e, "cache read failed; regenerating");
                None
            }
        }
    }

    /// Persist `bytes` for `(id, fingerprint)` and drop older fingerprints.
    pub fn store(&self, id: &Identifier, fingerprint: &str, bytes: &[u8]) {
        if !self.enabled {
            return;
        }
        if let Err(e) = self.write_entry(id, fingerprint, bytes) {
            warn!(id = %id, error = %e, "cache write failed");
        }
    }

    fn write_entry(&self, id: &Identifier, fingerprint: &str, bytes: &[u8]) -> io::Result<()> {
        let dir = self.entry_dir(id);
        std::fs::create_dir_all(&dir)?;
        let temp = dir.join(format!(
            ".{fingerprint}.{}.{}{TEMP_SUFFIX}",
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        std::fs::write(&temp, bytes)?;
        if let Err(e) = std::fs::rename(&temp, dir.join(fingerprint)) {
            let _ = std::fs::remove_file(&temp);
            return Err(e);
        }
        self.evict_others(&dir, fingerprint)
    }

    /// Remove stale fingerprint files next to `keep`. Subdirectories belong to
    /// other identifiers and temp files to in-flight writers.
    fn evict_others(&self, dir: &Path, keep: &str) -> io::Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name != keep && is_fingerprint(name) && entry.file_type()?.is_file() {
                std::fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }
}

fn is_fingerprint(name: &str) -> bool {
    name.len() == 64 && name.bytes().all(|b| b.is_ascii_hexdigit())
}

// =========================================================================
// Hashing
// =========================================================================

/// SHA-256 of `bytes`, hex encoded.
pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Length-prefixed so that adjacent fields cannot run into each other.
fn update_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

fn start(domain: &[u8], pack_type: PackType, id: &Identifier, caching_enabled: bool) -> Sha256 {
    let mut hasher = Sha256::new();
    hasher.update(domain);
    hasher.update(CACHE_VERSION.to_le_bytes());
    hasher.update([u8::from(caching_enabled)]);
    update_field(&mut hasher, pack_type.directory().as_bytes());
    update_field(&mut hasher, id.to_string().as_bytes());
    hasher
}

/// Fingerprint of a generated texture.
///
/// `inputs` pairs every referenced texture with the hash of its bytes, or
/// `None` when it was absent; callers pass them in a stable order.
pub fn texture_fingerprint(
    id: &Identifier,
    caching_enabled: bool,
    encoding: ColorEncoding,
    canonical_node: &str,
    inputs: &[(Identifier, Option<String>)],
) -> String {
    let mut hasher = start(b"texture\0", PackType::Assets, id, caching_enabled);
    update_field(&mut hasher, encoding.name().as_bytes());
    update_field(&mut hasher, canonical_node.as_bytes());
    update_inputs(&mut hasher, inputs);
    format!("{:x}", hasher.finalize())
}

/// Fingerprint of a generated texture metadata file; `inputs` pairs every
/// source texture with the hash of its metadata file.
pub fn meta_fingerprint(
    id: &Identifier,
    caching_enabled: bool,
    canonical_document: &str,
    inputs: &[(Identifier, Option<String>)],
) -> String {
    let mut hasher = start(b"meta\0", PackType::Assets, id, caching_enabled);
    update_field(&mut hasher, canonical_document.as_bytes());
    update_inputs(&mut hasher, inputs);
    format!("{:x}", hasher.finalize())
}

fn update_inputs(hasher: &mut Sha256, inputs: &[(Identifier, Option<String>)]) {
    for (input, hash) in inputs {
        update_field(hasher, input.to_string().as_bytes());
        match hash {
            Some(hash) => {
                hasher.update(b"\x01");
                update_field(hasher, hash.as_bytes());
            }
            None => {
                hasher.update(b"\x00");
            }
        }
    }
}

/// Fingerprint of a generated tag file.
pub fn tag_fingerprint(
    id: &Identifier,
    caching_enabled: bool,
    replace: bool,
    members: &[(Identifier, bool)],
) -> String {
    let mut hasher = start(b"tag\0", PackType::Data, id, caching_enabled);
    hasher.update([u8::from(replace)]);
    for (member, included) in members {
        update_field(&mut hasher, member.to_string().as_bytes());
        hasher.update([u8::from(*included)]);
    }
    format!("{:x}", hasher.finalize())
}

// =========================================================================
// Statistics
// =========================================================================

/// Summary of what a planner did since it was created.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Operator passes (decodes and pixel operations) actually run.
    pub node_evaluations: u64,
    /// Resources handed out, cached or not.
    pub outputs: u64,
}

impl CacheStats {
    pub fn total(&self) -> u64 {
        self.hits + self.misses
    }
}

impl std::ops::Add for CacheStats {
    type Output = CacheStats;

    fn add(self, other: CacheStats) -> CacheStats {
        CacheStats {
            hits: self.hits + other.hits,
            misses: self.misses + other.misses,
            node_evaluations: self.node_evaluations + other.node_evaluations,
            outputs: self.outputs + other.outputs,
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits > 0 {
            write!(
                f,
                "{} cached, {} generated ({} total)",
                self.hits,
                self.misses,
                self.total()
            )
        } else {
            write!(f, "{} generated", self.misses)
        }
    }
}

/// Lock-free counters behind [`CacheStats`].
#[derive(Debug, Default)]
pub struct StatCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    node_evaluations: AtomicU64,
    outputs: AtomicU64,
}

impl StatCounters {
    pub fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn output(&self) {
        self.outputs.fetch_add(1, Ordering::Relaxed);
    }

    /// The counter nodes bump for every operator pass.
    pub fn evaluations(&self) -> &AtomicU64 {
        &self.node_evaluations
    }

    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            node_evaluations: self.node_evaluations.load(Ordering::Relaxed),
            outputs: self.outputs.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::id;
    use std::fs;
    use tempfile::TempDir;

    fn fp(seed: &str) -> String {
        hash_bytes(seed.as_bytes())
    }

    // =========================================================================
    // Lookup / store
    // =========================================================================

    #[test]
    fn store_then_lookup_returns_exact_bytes() {
        let tmp = TempDir::new().unwrap();
        let cache = ResourceCache::open(tmp.path().join("c"), true);
        let key = id("a:textures/x.png");
        cache.store(&key, &fp("1"), b"\x89PNG payload");
        assert_eq!(
            cache.lookup(&key, &fp("1")).as_deref(),
            Some(&b"\x89PNG payload"[..])
        );
    }

    #[test]
    fn lookup_misses_on_other_fingerprint() {
        let tmp = TempDir::new().unwrap();
        let cache = ResourceCache::open(tmp.path(), true);
        let key = id("a:x");
        cache.store(&key, &fp("1"), b"one");
        assert!(cache.lookup(&key, &fp("2")).is_none());
        assert!(cache.lookup(&id("a:y"), &fp("1")).is_none());
    }

    #[test]
    fn new_fingerprint_evicts_old_one() {
        let tmp = TempDir::new().unwrap();
        let cache = ResourceCache::open(tmp.path(), true);
        let key = id("a:x");
        cache.store(&key, &fp("1"), b"one");
        cache.store(&key, &fp("2"), b"two");
        assert!(cache.lookup(&key, &fp("1")).is_none());
        assert_eq!(cache.lookup(&key, &fp("2")).as_deref(), Some(&b"two"[..]));
        let files = fs::read_dir(tmp.path().join("a").join("x")).unwrap().count();
        assert_eq!(files, 1);
    }

    #[test]
    fn eviction_leaves_nested_identifiers_alone() {
        let tmp = TempDir::new().unwrap();
        let cache = ResourceCache::open(tmp.path(), true);
        cache.store(&id("a:x/y"), &fp("nested"), b"nested");
        cache.store(&id("a:x"), &fp("1"), b"one");
        cache.store(&id("a:x"), &fp("2"), b"two");
        assert_eq!(
            cache.lookup(&id("a:x/y"), &fp("nested")).as_deref(),
            Some(&b"nested"[..])
        );
    }

    #[test]
    fn disabled_cache_never_hits_or_writes() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("c");
        let cache = ResourceCache::open(&root, false);
        cache.store(&id("a:x"), &fp("1"), b"one");
        assert!(cache.lookup(&id("a:x"), &fp("1")).is_none());
        assert!(!root.exists());
        assert!(!ResourceCache::disabled().is_enabled());
    }

    #[test]
    fn survives_reopen() {
        let tmp = TempDir::new().unwrap();
        ResourceCache::open(tmp.path(), true).store(&id("a:x"), &fp("1"), b"one");
        let reopened = ResourceCache::open(tmp.path(), true);
        assert!(reopened.lookup(&id("a:x"), &fp("1")).is_some());
    }

    // =========================================================================
    // Metadata
    // =========================================================================

    #[test]
    fn open_writes_metadata() {
        let tmp = TempDir::new().unwrap();
        ResourceCache::open(tmp.path(), true);
        let text = fs::read_to_string(tmp.path().join(METADATA_FILENAME)).unwrap();
        let meta: CacheMetadata = serde_json::from_str(&text).unwrap();
        assert_eq!(meta.version, CACHE_VERSION);
    }

    #[test]
    fn wrong_version_wipes_entries() {
        let tmp = TempDir::new().unwrap();
        ResourceCache::open(tmp.path(), true).store(&id("a:x"), &fp("1"), b"one");
        fs::write(
            tmp.path().join(METADATA_FILENAME),
            format!(r#"{{"version": {}}}"#, CACHE_VERSION + 1),
        )
        .unwrap();
        let reopened = ResourceCache::open(tmp.path(), true);
        assert!(reopened.lookup(&id("a:x"), &fp("1")).is_none());
        assert!(!tmp.path().join("a").exists());
    }

    #[test]
    fn corrupt_metadata_wipes_entries() {
        let tmp = TempDir::new().unwrap();
        ResourceCache::open(tmp.path(), true).store(&id("a:x"), &fp("1"), b"one");
        fs::write(tmp.path().join(METADATA_FILENAME), "not json").unwrap();
        let reopened = ResourceCache::open(tmp.path(), true);
        assert!(reopened.lookup(&id("a:x"), &fp("1")).is_none());
    }

    // =========================================================================
    // Fingerprints
    // =========================================================================

    #[test]
    fn hash_bytes_is_sha256_hex() {
        assert_eq!(
            hash_bytes(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn texture_fingerprint_deterministic() {
        let inputs = vec![(id("a:x"), Some(fp("x")))];
        let f1 = texture_fingerprint(&id("a:out"), true, ColorEncoding::Argb, "{}", &inputs);
        let f2 = texture_fingerprint(&id("a:out"), true, ColorEncoding::Argb, "{}", &inputs);
        assert_eq!(f1, f2);
        assert!(is_fingerprint(&f1));
    }

    #[test]
    fn texture_fingerprint_varies_with_every_input() {
        let inputs = vec![(id("a:x"), Some(fp("x")))];
        let base = texture_fingerprint(&id("a:out"), true, ColorEncoding::Argb, "{}", &inputs);
        assert_ne!(
            base,
            texture_fingerprint(&id("a:other"), true, ColorEncoding::Argb, "{}", &inputs)
        );
        assert_ne!(
            base,
            texture_fingerprint(&id("a:out"), false, ColorEncoding::Argb, "{}", &inputs)
        );
        assert_ne!(
            base,
            texture_fingerprint(&id("a:out"), true, ColorEncoding::Rgb, "{}", &inputs)
        );
        assert_ne!(
            base,
            texture_fingerprint(&id("a:out"), true, ColorEncoding::Argb, "{ }", &inputs)
        );
        assert_ne!(
            base,
            texture_fingerprint(
                &id("a:out"),
                true,
                ColorEncoding::Argb,
                "{}",
                &[(id("a:x"), None)]
            )
        );
    }

    #[test]
    fn meta_fingerprint_is_its_own_domain() {
        let inputs = vec![(id("a:x"), Some(fp("x")))];
        let meta = meta_fingerprint(&id("a:out"), true, "{}", &inputs);
        assert!(is_fingerprint(&meta));
        assert_ne!(
            meta,
            texture_fingerprint(&id("a:out"), true, ColorEncoding::Argb, "{}", &inputs)
        );
        assert_ne!(meta, meta_fingerprint(&id("a:out"), true, "{}", &[(id("a:x"), None)]));
        assert_ne!(meta, meta_fingerprint(&id("a:out"), true, "{ }", &inputs));
    }

    #[test]
    fn tag_fingerprint_varies_with_predicate_results() {
        let t = id("a:blocks/ores");
        assert_ne!(
            tag_fingerprint(&t, true, false, &[(id("a:x"), true)]),
            tag_fingerprint(&t, true, false, &[(id("a:x"), false)])
        );
        assert_ne!(
            tag_fingerprint(&t, true, false, &[]),
            tag_fingerprint(&t, true, true, &[])
        );
    }

    // =========================================================================
    // CacheStats
    // =========================================================================

    #[test]
    fn cache_stats_display_with_hits() {
        let s = CacheStats {
            hits: 5,
            misses: 2,
            ..CacheStats::default()
        };
        assert_eq!(format!("{}", s), "5 cached, 2 generated (7 total)");
    }

    #[test]
    fn cache_stats_display_no_hits() {
        let s = CacheStats {
            misses: 3,
            ..CacheStats::default()
        };
        assert_eq!(format!("{}", s), "3 generated");
    }

    #[test]
    fn counters_snapshot_and_sum() {
        let c = StatCounters::default();
        c.hit();
        c.miss();
        c.miss();
        c.output();
        c.evaluations().fetch_add(4, Ordering::Relaxed);
        let s = c.snapshot();
        assert_eq!((s.hits, s.misses, s.node_evaluations, s.outputs), (1, 2, 4, 1));
        assert_eq!((s + s).misses, 4);
    }
}

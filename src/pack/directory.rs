//! Packs backed by a directory tree.
//!
//! ```text
//! my_pack/
//! ├── assets/
//! │   └── mymod/
//! │       ├── dynamic_asset_generator/ore.json
//! │       └── textures/block/stone.png
//! └── data/
//!     └── mymod/
//!         └── dynamic_asset_generator/ores.json
//! ```
//!
//! A resource `mymod:textures/block/stone.png` of type `assets` lives at
//! `my_pack/assets/mymod/textures/block/stone.png`. Files whose relative path
//! is not a valid identifier path (upper case, spaces) are invisible.

use super::PackResources;
use crate::types::{Bytes, Identifier, PackType, is_valid_namespace};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct DirectoryPack {
    name: String,
    root: PathBuf,
}

impl DirectoryPack {
    /// A pack named after the last component of `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| root.display().to_string());
        Self { name, root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn namespace_dir(&self, pack_type: PackType, namespace: &str) -> PathBuf {
        self.root.join(pack_type.directory()).join(namespace)
    }

    fn resource_path(&self, pack_type: PackType, id: &Identifier) -> PathBuf {
        let mut path = self.namespace_dir(pack_type, id.namespace());
        path.extend(id.path().split('/'));
        path
    }
}

/// `a/b/c.png` relative to `base`, with `/` separators.
fn relative_path(base: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(base).ok()?;
    let parts: Option<Vec<&str>> = relative.components().map(|c| c.as_os_str().to_str()).collect();
    Some(parts?.join("/"))
}

impl PackResources for DirectoryPack {
    fn name(&self) -> &str {
        &self.name
    }

    fn namespaces(&self, pack_type: PackType) -> BTreeSet<String> {
        WalkDir::new(self.root.join(pack_type.directory()))
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_dir())
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .filter(|name| is_valid_namespace(name))
            .collect()
    }

    fn has_resource(&self, pack_type: PackType, id: &Identifier) -> bool {
        self.resource_path(pack_type, id).is_file()
    }

    fn list_resources(
        &self,
        pack_type: PackType,
        namespace: &str,
        prefix: &str,
    ) -> BTreeSet<Identifier> {
        let base = self.namespace_dir(pack_type, namespace);
        // Only walk the directory the prefix's complete segments point at.
        let mut start = base.clone();
        if let Some((dirs, _)) = prefix.rsplit_once('/') {
            start.extend(dirs.split('/').filter(|s| !s.is_empty()));
        }

        let mut found = BTreeSet::new();
        for entry in WalkDir::new(&start).into_iter().filter_map(Result::ok) {
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(path) = relative_path(&base, entry.path()) else {
                continue;
            };
            if !path.starts_with(prefix) {
                continue;
            }
            match Identifier::new(namespace, &path) {
                Ok(id) => {
                    found.insert(id);
                }
                Err(e) => debug!(pack = %self.name, error = %e, "skipping file"),
            }
        }
        found
    }

    fn get_resource(&self, pack_type: PackType, id: &Identifier) -> Option<Bytes> {
        let path = self.resource_path(pack_type, id);
        match fs::read(&path) {
            Ok(bytes) => Some(bytes.into()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(pack = %self.name, path = %path.display(), error = %e, "could not read resource");
                None
            }
        }
    }
}

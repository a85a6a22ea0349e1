//! The generated overlay pack.
//!
//! [`GeneratedPack`] is the one pack the host adds on top of its stack to
//! receive generated resources. It owns one [`Planner`] per pack type and
//! answers pack queries by asking the matching planner; bytes are produced on
//! first request.
//!
//! The host calls [`GeneratedPack::reset`] whenever it rebuilds its pack stack
//! for a pack type. That drops the plan and every generated value for that
//! type, so the next query replans against the new stack.

use super::PackResources;
use crate::cache::CacheStats;
use crate::config::GeneratorConfig;
use crate::planner::Planner;
use crate::source::{DecoderTable, ResourceSource};
use crate::types::{Bytes, Identifier, PackType};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

pub struct GeneratedPack {
    assets: Planner,
    data: Planner,
}

impl std::fmt::Debug for GeneratedPack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratedPack")
            .field("assets", &self.assets)
            .field("data", &self.data)
            .finish()
    }
}

impl GeneratedPack {
    pub const NAME: &'static str = "dynamic_asset_generator";

    /// Wrap two planners. They are routed by their own pack type.
    pub fn new(assets: Planner, data: Planner) -> Self {
        debug_assert_eq!(assets.pack_type(), PackType::Assets);
        debug_assert_eq!(data.pack_type(), PackType::Data);
        Self { assets, data }
    }

    /// Planners over `resources`, with caches and encoding from `config`.
    pub fn from_config(resources: Arc<dyn ResourceSource>, config: &GeneratorConfig) -> Self {
        Self::with_decoders(resources, config, DecoderTable::builtin())
    }

    /// Like [`from_config`](Self::from_config) with a custom node decoder table.
    pub fn with_decoders(
        resources: Arc<dyn ResourceSource>,
        config: &GeneratorConfig,
        decoders: DecoderTable,
    ) -> Self {
        let planner = |pack_type| {
            Planner::new(pack_type, resources.clone(), config.open_cache(pack_type))
                .with_encoding(config.encoding)
                .with_decoders(decoders.clone())
        };
        Self::new(planner(PackType::Assets), planner(PackType::Data))
    }

    pub fn planner(&self, pack_type: PackType) -> &Planner {
        match pack_type {
            PackType::Assets => &self.assets,
            PackType::Data => &self.data,
        }
    }

    /// Discard everything generated for `pack_type`.
    pub fn reset(&self, pack_type: PackType) {
        info!(pack_type = %pack_type, "resetting generated resources");
        self.planner(pack_type).reset();
    }

    /// Combined statistics of both planners.
    pub fn stats(&self) -> CacheStats {
        self.assets.stats() + self.data.stats()
    }
}

impl PackResources for GeneratedPack {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn is_generated(&self) -> bool {
        true
    }

    fn namespaces(&self, pack_type: PackType) -> BTreeSet<String> {
        self.planner(pack_type).namespaces()
    }

    fn has_resource(&self, pack_type: PackType, id: &Identifier) -> bool {
        self.planner(pack_type).has(id)
    }

    fn list_resources(
        &self,
        pack_type: PackType,
        namespace: &str,
        prefix: &str,
    ) -> BTreeSet<Identifier> {
        self.planner(pack_type).list(namespace, prefix)
    }

    fn get_resource(&self, pack_type: PackType, id: &Identifier) -> Option<Bytes> {
        self.planner(pack_type).produce(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::PrePackRepository;
    use crate::pack::directory::DirectoryPack;
    use crate::test_helpers::{id, solid_png};
    use serde_json::json;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, bytes: &[u8]) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, bytes).unwrap();
    }

    fn stack(dir: &Path) -> (Arc<PrePackRepository>, Arc<GeneratedPack>) {
        let repository = Arc::new(PrePackRepository::new());
        let generated = Arc::new(GeneratedPack::from_config(
            repository.clone(),
            &GeneratorConfig::default(),
        ));
        repository.publish([
            generated.clone() as Arc<dyn PackResources>,
            Arc::new(DirectoryPack::new(dir)) as Arc<dyn PackResources>,
        ]);
        (repository, generated)
    }

    fn texture_doc(output: &str, input: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "type": "texture",
            "output_location": output,
            "input": {"type": "file", "path": input},
        }))
        .unwrap()
    }

    #[test]
    fn serves_both_pack_types() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "assets/a/textures/block/stone.png", &solid_png(2, 2, 0xFF10_2030));
        write(
            dir.path(),
            "assets/a/dynamic_asset_generator/copy.json",
            &texture_doc("a:block/copy", "a:block/stone"),
        );
        write(
            dir.path(),
            "data/a/dynamic_asset_generator/tag.json",
            br#"{"type": "tag", "tag": "a:blocks/x", "members": ["a:stone"]}"#,
        );
        let (_repository, pack) = stack(dir.path());

        let texture = id("a:textures/block/copy.png");
        let tag = id("a:tags/blocks/x.json");
        assert!(pack.has_resource(PackType::Assets, &texture));
        assert!(!pack.has_resource(PackType::Data, &texture));
        assert!(pack.get_resource(PackType::Assets, &texture).is_some());
        assert!(pack.get_resource(PackType::Data, &tag).is_some());
        assert_eq!(
            pack.list_resources(PackType::Data, "a", "tags/"),
            BTreeSet::from([tag])
        );
        assert_eq!(pack.namespaces(PackType::Assets), BTreeSet::from(["a".to_string()]));
        assert_eq!(pack.stats().outputs, 2);
    }

    #[test]
    fn reset_is_per_pack_type() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "assets/a/textures/block/stone.png", &solid_png(2, 2, 0xFF10_2030));
        let (_repository, pack) = stack(dir.path());
        assert!(pack.list_resources(PackType::Assets, "a", "").is_empty());
        assert!(pack.list_resources(PackType::Data, "a", "").is_empty());

        write(
            dir.path(),
            "assets/a/dynamic_asset_generator/copy.json",
            &texture_doc("a:block/copy", "a:block/stone"),
        );
        write(
            dir.path(),
            "data/a/dynamic_asset_generator/tag.json",
            br#"{"type": "tag", "tag": "a:blocks/x", "members": ["a:stone"]}"#,
        );

        pack.reset(PackType::Assets);
        assert_eq!(pack.list_resources(PackType::Assets, "a", "").len(), 1);
        assert!(pack.list_resources(PackType::Data, "a", "").is_empty());

        pack.reset(PackType::Data);
        assert_eq!(pack.list_resources(PackType::Data, "a", "").len(), 1);
    }

    #[test]
    fn generated_output_does_not_feed_back() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "assets/a/textures/block/stone.png", &solid_png(2, 2, 0xFF10_2030));
        write(
            dir.path(),
            "assets/a/dynamic_asset_generator/1.json",
            &texture_doc("a:block/copy", "a:block/stone"),
        );
        write(
            dir.path(),
            "assets/a/dynamic_asset_generator/2.json",
            &texture_doc("a:block/copy_of_copy", "a:block/copy"),
        );
        let (repository, pack) = stack(dir.path());
        assert!(pack.has_resource(PackType::Assets, &id("a:textures/block/copy_of_copy.png")));
        assert!(
            pack.get_resource(PackType::Assets, &id("a:textures/block/copy_of_copy.png"))
                .is_none()
        );
        assert!(
            repository
                .read_resource(PackType::Assets, &id("a:textures/block/copy.png"))
                .is_none()
        );
    }
}

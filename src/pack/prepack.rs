//! Pre-pack lookup: the pack stack as generation sees it.
//!
//! The host publishes its pack list here while it is still assembling the
//! final stack. Generation reads its inputs through this repository, so it
//! sees a *snapshot*: whatever list was published last.
//!
//! Lookups never wait. Before the first [`publish`](PrePackRepository::publish),
//! after [`begin_assembly`](PrePackRepository::begin_assembly), or while a
//! publish is swapping the list in, a lookup reports
//! [`PrePackLookup::NotYetAvailable`] and the caller treats the resource as
//! absent. Whatever was generated from such a snapshot is discarded by the
//! `reset` that follows the host finishing its stack.

use super::PackResources;
use crate::source::ResourceSource;
use crate::types::{Bytes, Identifier, PackType};
use std::collections::BTreeSet;
use std::sync::{Arc, RwLock, TryLockError};
use tracing::debug;

type Snapshot = Arc<[Arc<dyn PackResources>]>;

/// Outcome of one pre-pack lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrePackLookup {
    Found(Bytes),
    /// The stack is available and no pack has the resource.
    Missing,
    /// No stack has been published yet, or one is being swapped in.
    NotYetAvailable,
}

impl PrePackLookup {
    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            PrePackLookup::Found(bytes) => Some(bytes),
            PrePackLookup::Missing | PrePackLookup::NotYetAvailable => None,
        }
    }
}

#[derive(Default)]
pub struct PrePackRepository {
    packs: RwLock<Option<Snapshot>>,
}

impl std::fmt::Debug for PrePackRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Option<Vec<String>> = self
            .snapshot()
            .map(|packs| packs.iter().map(|p| p.name().to_string()).collect());
        f.debug_struct("PrePackRepository")
            .field("packs", &names)
            .finish()
    }
}

impl PrePackRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the stack, highest priority first. Generated packs in the list
    /// are kept out of the snapshot.
    pub fn publish(&self, packs: impl IntoIterator<Item = Arc<dyn PackResources>>) {
        let snapshot: Snapshot = packs.into_iter().filter(|p| !p.is_generated()).collect();
        debug!(packs = snapshot.len(), "published pre-pack snapshot");
        let mut slot = self
            .packs
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *slot = Some(snapshot);
    }

    /// The host started rebuilding its stack: lookups report
    /// `NotYetAvailable` until the next publish.
    pub fn begin_assembly(&self) {
        let mut slot = self
            .packs
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *slot = None;
    }

    /// The current snapshot, or `None` when it is not available right now.
    pub fn snapshot(&self) -> Option<Snapshot> {
        match self.packs.try_read() {
            Ok(guard) => guard.clone(),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().clone(),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    pub fn lookup(&self, pack_type: PackType, id: &Identifier) -> PrePackLookup {
        let Some(packs) = self.snapshot() else {
            debug!(id = %id, "pre-pack stack not yet available");
            return PrePackLookup::NotYetAvailable;
        };
        packs
            .iter()
            .find_map(|pack| pack.get_resource(pack_type, id))
            .map_or(PrePackLookup::Missing, PrePackLookup::Found)
    }
}

impl ResourceSource for PrePackRepository {
    fn read_resource(&self, pack_type: PackType, id: &Identifier) -> Option<Bytes> {
        self.lookup(pack_type, id).into_bytes()
    }

    fn list_identifiers(
        &self,
        pack_type: PackType,
        namespace: &str,
        prefix: &str,
    ) -> BTreeSet<Identifier> {
        self.snapshot()
            .map(|packs| {
                packs
                    .iter()
                    .flat_map(|p| p.list_resources(pack_type, namespace, prefix))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn namespaces(&self, pack_type: PackType) -> BTreeSet<String> {
        self.snapshot()
            .map(|packs| packs.iter().flat_map(|p| p.namespaces(pack_type)).collect())
            .unwrap_or_default()
    }

    fn has_resource(&self, pack_type: PackType, id: &Identifier) -> bool {
        self.snapshot()
            .is_some_and(|packs| packs.iter().any(|p| p.has_resource(pack_type, id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::id;
    use std::collections::BTreeMap;

    /// Fixed in-memory pack.
    struct StaticPack {
        name: &'static str,
        generated: bool,
        files: BTreeMap<Identifier, Bytes>,
    }

    impl StaticPack {
        fn new(name: &'static str, files: &[(&str, &[u8])]) -> Arc<dyn PackResources> {
            Arc::new(Self {
                name,
                generated: false,
                files: files
                    .iter()
                    .map(|(loc, bytes)| (id(loc), Bytes::from(*bytes)))
                    .collect(),
            })
        }

        fn generated(files: &[(&str, &[u8])]) -> Arc<dyn PackResources> {
            Arc::new(Self {
                name: "generated",
                generated: true,
                files: files
                    .iter()
                    .map(|(loc, bytes)| (id(loc), Bytes::from(*bytes)))
                    .collect(),
            })
        }
    }

    impl PackResources for StaticPack {
        fn name(&self) -> &str {
            self.name
        }

        fn is_generated(&self) -> bool {
            self.generated
        }

        fn namespaces(&self, _: PackType) -> BTreeSet<String> {
            self.files.keys().map(|id| id.namespace().to_string()).collect()
        }

        fn list_resources(&self, _: PackType, namespace: &str, prefix: &str) -> BTreeSet<Identifier> {
            self.files
                .keys()
                .filter(|id| id.namespace() == namespace && id.path().starts_with(prefix))
                .cloned()
                .collect()
        }

        fn get_resource(&self, _: PackType, id: &Identifier) -> Option<Bytes> {
            self.files.get(id).cloned()
        }
    }

    #[test]
    fn not_available_before_publish() {
        let repo = PrePackRepository::new();
        assert_eq!(
            repo.lookup(PackType::Assets, &id("a:x")),
            PrePackLookup::NotYetAvailable
        );
        assert!(repo.read_resource(PackType::Assets, &id("a:x")).is_none());
        assert!(repo.namespaces(PackType::Assets).is_empty());
    }

    #[test]
    fn highest_priority_pack_wins() {
        let repo = PrePackRepository::new();
        repo.publish([
            StaticPack::new("top", &[("a:x", b"top")]),
            StaticPack::new("bottom", &[("a:x", b"bottom"), ("a:y", b"y")]),
        ]);
        assert_eq!(
            repo.lookup(PackType::Assets, &id("a:x")),
            PrePackLookup::Found(Bytes::from(&b"top"[..]))
        );
        assert_eq!(&*repo.read_resource(PackType::Assets, &id("a:y")).unwrap(), b"y");
        assert_eq!(repo.lookup(PackType::Assets, &id("a:z")), PrePackLookup::Missing);
        assert_eq!(repo.list_identifiers(PackType::Assets, "a", "").len(), 2);
    }

    #[test]
    fn generated_packs_are_not_consulted() {
        let repo = PrePackRepository::new();
        repo.publish([
            StaticPack::generated(&[("a:x", b"generated")]),
            StaticPack::new("base", &[]),
        ]);
        assert_eq!(repo.lookup(PackType::Assets, &id("a:x")), PrePackLookup::Missing);
        assert!(!repo.has_resource(PackType::Assets, &id("a:x")));
        assert_eq!(repo.snapshot().unwrap().len(), 1);
    }

    #[test]
    fn begin_assembly_withdraws_the_snapshot() {
        let repo = PrePackRepository::new();
        repo.publish([StaticPack::new("base", &[("a:x", b"x")])]);
        assert!(repo.has_resource(PackType::Assets, &id("a:x")));
        repo.begin_assembly();
        assert_eq!(
            repo.lookup(PackType::Assets, &id("a:x")),
            PrePackLookup::NotYetAvailable
        );
    }

    #[test]
    fn lookup_during_publish_does_not_block() {
        let repo = PrePackRepository::new();
        repo.publish([StaticPack::new("base", &[("a:x", b"x")])]);
        let _writer = repo.packs.write().unwrap();
        assert_eq!(
            repo.lookup(PackType::Assets, &id("a:x")),
            PrePackLookup::NotYetAvailable
        );
    }
}

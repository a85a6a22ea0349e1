//! The resource-pack side of the system.
//!
//! The host assembles a *pack stack*: an ordered list of packs, each able to
//! answer queries for `assets` and `data` resources. This module supplies the
//! pieces needed to take part in that stack:
//!
//! | Module | Role |
//! |---|---|
//! | [`directory`] | a pack backed by a directory tree (`<root>/assets/<ns>/<path>`) |
//! | [`prepack`] | the pre-pack lookup: a snapshot of the stack generation reads from |
//! | [`generated`] | the overlay pack that serves planner output to the host |
//!
//! Generation resolves its inputs (source documents, referenced textures)
//! through the [`PrePackRepository`], which never consults generated packs, so
//! a generated resource can never feed back into its own inputs.

pub mod directory;
pub mod generated;
pub mod prepack;

pub use directory::DirectoryPack;
pub use generated::GeneratedPack;
pub use prepack::{PrePackLookup, PrePackRepository};

use crate::types::{Bytes, Identifier, PackType};
use std::collections::BTreeSet;

/// The host's view of one pack.
pub trait PackResources: Send + Sync {
    /// Display name, used in logs.
    fn name(&self) -> &str;

    /// Generated packs are skipped when resolving generation inputs.
    fn is_generated(&self) -> bool {
        false
    }

    fn namespaces(&self, pack_type: PackType) -> BTreeSet<String>;

    fn has_resource(&self, pack_type: PackType, id: &Identifier) -> bool {
        self.get_resource(pack_type, id).is_some()
    }

    /// Every resource in `namespace` whose path starts with `prefix`.
    fn list_resources(
        &self,
        pack_type: PackType,
        namespace: &str,
        prefix: &str,
    ) -> BTreeSet<Identifier>;

    fn get_resource(&self, pack_type: PackType, id: &Identifier) -> Option<Bytes>;
}

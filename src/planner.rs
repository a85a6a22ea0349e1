//! Generation planner: which identifiers exist, and how to produce them.
//!
//! A [`Planner`] serves one [`PackType`]. On first use after creation or a
//! [`reset`](Planner::reset) it *plans*: it lists the declarative source
//! documents visible through its [`ResourceSource`], decodes them, and builds
//! a fresh [`Registry`] mapping every output identifier to a
//! [`ResettableLazy`] that produces its bytes. The registry is then swapped in
//! whole; it is never edited in place.
//!
//! ## Source documents
//!
//! Documents are the JSON files under `<namespace>:dynamic_asset_generator/`.
//!
//! | Pack type | Document | Output |
//! |---|---|---|
//! | assets | `{"type": "texture", "output_location": "ns:block/x", "input": <node>}` | `ns:textures/block/x.png` |
//! | assets | `{"type": "texture_meta", "output_location": "ns:block/x", "sources": [..]}` | `ns:textures/block/x.png.mcmeta` |
//! | data | `{"type": "tag", "tag": "ns:blocks/x", "replace": false, "members": [..]}` | `ns:tags/blocks/x.json` |
//!
//! Metadata documents are described in [`crate::meta`]. Tag members are either an identifier string (always included) or
//! `{"id": "ns:x", "when": <predicate>}` (see [`crate::tags::Predicate`]).
//! Members from every document naming the same tag, plus those registered
//! with [`Planner::plan_tag`], end up in one tag file.
//!
//! A bad document is recorded as a [`PlanError`] and logged; the rest of the
//! plan goes ahead without it.
//!
//! ## Producing
//!
//! ```text
//! produce(id) ─▶ output lazy ─▶ fingerprint ─▶ cache hit? ── yes ─▶ bytes
//!                                                   │
//!                                                   no ─▶ evaluate ─▶ encode ─▶ store ─▶ bytes
//! ```
//!
//! Each output lazy memoizes its bytes until the next reset, so repeated
//! `produce` calls are free and concurrent callers share one generation.

use crate::cache::{
    CacheStats, ResourceCache, StatCounters, hash_bytes, meta_fingerprint, tag_fingerprint,
    texture_fingerprint,
};
use crate::color::ColorEncoding;
use crate::imaging::encode_png;
use crate::lazy::{Resettable, ResettableLazy};
use crate::meta::{MetaDocument, MetaError, TextureMeta, metadata_location};
use crate::source::{
    DecoderTable, EvaluationMemo, GenerationContext, ResourceSource, SourceError, TexSource,
    texture_location,
};
use crate::tags::{Predicate, TagFile, TagMember, TagMerge, tag_file_location};
use crate::types::{Bytes, Identifier, IdentifierError, PackType};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use thiserror::Error;
use tracing::{debug, error, info};

/// Path prefix (within each namespace) of declarative source documents.
pub const SOURCE_DIRECTORY: &str = "dynamic_asset_generator/";

#[derive(Error, Debug)]
pub enum PlanError {
    #[error("{document}: could not read document")]
    Unreadable { document: Identifier },
    #[error("{document}: invalid JSON: {error}")]
    Json {
        document: Identifier,
        #[source]
        error: serde_json::Error,
    },
    #[error("{document}: document type \"{kind}\" is not valid for {pack_type}")]
    DocumentType {
        document: Identifier,
        kind: String,
        pack_type: PackType,
    },
    #[error("{document}: missing or malformed field \"{field}\"")]
    Field {
        document: Identifier,
        field: &'static str,
    },
    #[error("{document}: invalid identifier in \"{field}\": {error}")]
    Identifier {
        document: Identifier,
        field: &'static str,
        #[source]
        error: IdentifierError,
    },
    #[error("{document}: {error}")]
    Source {
        document: Identifier,
        #[source]
        error: SourceError,
    },
    #[error("{document}: {error}")]
    Meta {
        document: Identifier,
        #[source]
        error: MetaError,
    },
    #[error("{document}: {output} is already produced by {first}")]
    DuplicateOutput {
        document: Identifier,
        output: Identifier,
        first: Identifier,
    },
}

impl PlanError {
    /// The source document the error was found in.
    pub fn document(&self) -> &Identifier {
        match self {
            PlanError::Unreadable { document }
            | PlanError::Json { document, .. }
            | PlanError::DocumentType { document, .. }
            | PlanError::Field { document, .. }
            | PlanError::Identifier { document, .. }
            | PlanError::Source { document, .. }
            | PlanError::Meta { document, .. }
            | PlanError::DuplicateOutput { document, .. } => document,
        }
    }

    /// The operator node tag involved, for node decoding errors.
    pub fn node_tag(&self) -> Option<&str> {
        match self {
            PlanError::Source { error, .. } => error.tag(),
            _ => None,
        }
    }
}

// =========================================================================
// Registry
// =========================================================================

#[derive(Debug, Clone)]
enum OutputKind {
    Texture(Arc<TexSource>),
    Tag(Arc<TagMerge>),
    Meta(Arc<MetaDocument>),
}

#[derive(Debug, Clone)]
struct PlannedOutput {
    kind: OutputKind,
    bytes: Arc<ResettableLazy<Option<Bytes>>>,
}

/// One complete plan: every output identifier and the errors met building it.
#[derive(Debug, Default)]
pub struct Registry {
    outputs: BTreeMap<Identifier, PlannedOutput>,
    errors: Vec<PlanError>,
}

impl Registry {
    pub fn contains(&self, id: &Identifier) -> bool {
        self.outputs.contains_key(id)
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &Identifier> {
        self.outputs.keys()
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn errors(&self) -> &[PlanError] {
        &self.errors
    }

    fn reset_outputs(&self) {
        for output in self.outputs.values() {
            output.bytes.reset();
        }
    }
}

/// Registry under construction.
#[derive(Default)]
struct RegistryBuilder {
    textures: BTreeMap<Identifier, (Identifier, TexSource)>,
    metas: BTreeMap<Identifier, (Identifier, MetaDocument)>,
    tags: BTreeMap<Identifier, TagMerge>,
    errors: Vec<PlanError>,
}

// =========================================================================
// Planner
// =========================================================================

/// State shared between a planner and the output lazies it hands out.
struct Shared {
    pack_type: PackType,
    resources: Arc<dyn ResourceSource>,
    cache: ResourceCache,
    memo: EvaluationMemo,
    stats: StatCounters,
}

pub struct Planner {
    shared: Arc<Shared>,
    encoding: ColorEncoding,
    decoders: DecoderTable,
    planned_tags: Mutex<Vec<(Identifier, TagMember)>>,
    registry: RwLock<Option<Arc<Registry>>>,
    planning: Mutex<()>,
    epoch: AtomicU64,
}

impl std::fmt::Debug for Planner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Planner")
            .field("pack_type", &self.shared.pack_type)
            .field("encoding", &self.encoding)
            .field("cache", &self.shared.cache)
            .finish_non_exhaustive()
    }
}

impl Planner {
    pub fn new(
        pack_type: PackType,
        resources: Arc<dyn ResourceSource>,
        cache: ResourceCache,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                pack_type,
                resources,
                cache,
                memo: EvaluationMemo::default(),
                stats: StatCounters::default(),
            }),
            encoding: ColorEncoding::default(),
            decoders: DecoderTable::builtin(),
            planned_tags: Mutex::new(Vec::new()),
            registry: RwLock::new(None),
            planning: Mutex::new(()),
            epoch: AtomicU64::new(0),
        }
    }

    /// Ambient encoding for color literals without an explicit one.
    pub fn with_encoding(mut self, encoding: ColorEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Replace the node decoder table, e.g. one with extension tags.
    pub fn with_decoders(mut self, decoders: DecoderTable) -> Self {
        self.decoders = decoders;
        self
    }

    pub fn pack_type(&self) -> PackType {
        self.shared.pack_type
    }

    /// Contribute a member to `tag` programmatically. Registrations survive
    /// resets and are merged with declarative members on every plan; adding
    /// one resets the planner.
    pub fn plan_tag(&self, tag: Identifier, member: TagMember) {
        self.planned_tags
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((tag, member));
        self.reset();
    }

    /// Drop the current plan and every generated value. The next query
    /// plans again against the (possibly changed) resources.
    pub fn reset(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let old = self
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(old) = old {
            old.reset_outputs();
        }
        self.shared.memo.clear();
        debug!(pack_type = %self.shared.pack_type, "planner reset");
    }

    /// The current plan, planning first if there is none.
    ///
    /// A reset that lands while planning is in progress makes the finished
    /// plan a one-off: it is returned to this caller but not kept.
    pub fn registry(&self) -> Arc<Registry> {
        if let Some(current) = self.current_registry() {
            return current;
        }
        let _planning = self
            .planning
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(current) = self.current_registry() {
            return current;
        }
        let epoch = self.epoch.load(Ordering::SeqCst);
        let registry = Arc::new(self.plan());
        let mut slot = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        if self.epoch.load(Ordering::SeqCst) == epoch {
            *slot = Some(registry.clone());
        }
        registry
    }

    fn current_registry(&self) -> Option<Arc<Registry>> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn has(&self, id: &Identifier) -> bool {
        self.registry().contains(id)
    }

    /// Bytes for `id`, or `None` when it is not planned or its node is absent.
    pub fn produce(&self, id: &Identifier) -> Option<Bytes> {
        let output = self.registry().outputs.get(id)?.bytes.clone();
        output.get()
    }

    pub fn all_identifiers(&self) -> BTreeSet<Identifier> {
        self.registry().identifiers().cloned().collect()
    }

    pub fn list(&self, namespace: &str, prefix: &str) -> BTreeSet<Identifier> {
        self.registry()
            .identifiers()
            .filter(|id| id.namespace() == namespace && id.path().starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn namespaces(&self) -> BTreeSet<String> {
        self.registry()
            .identifiers()
            .map(|id| id.namespace().to_string())
            .collect()
    }

    /// The fingerprint `id` would be cached under right now.
    pub fn fingerprint(&self, id: &Identifier) -> Option<String> {
        let registry = self.registry();
        let output = registry.outputs.get(id)?;
        Some(match &output.kind {
            OutputKind::Texture(node) => self.shared.texture_fingerprint(id, node, self.encoding),
            OutputKind::Tag(merge) => tag_fingerprint(
                id,
                self.shared.cache.is_enabled(),
                merge.replace(),
                &merge.resolve(),
            ),
            OutputKind::Meta(document) => self.shared.meta_fingerprint(id, document),
        })
    }

    pub fn stats(&self) -> CacheStats {
        self.shared.stats.snapshot()
    }

    // =========================================================================
    // Planning
    // =========================================================================

    fn plan(&self) -> Registry {
        let pack_type = self.shared.pack_type;
        let resources = self.shared.resources.as_ref();
        let mut builder = RegistryBuilder::default();

        for namespace in resources.namespaces(pack_type) {
            for document in resources.list_identifiers(pack_type, &namespace, SOURCE_DIRECTORY) {
                if !document.path().ends_with(".json") {
                    continue;
                }
                if let Err(e) = self.plan_document(&document, &mut builder) {
                    error!(document = %document, node = e.node_tag(), "{e}");
                    builder.errors.push(e);
                }
            }
        }

        let planned = self
            .planned_tags
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for (tag, member) in planned {
            builder
                .tags
                .entry(tag.clone())
                .or_insert_with(|| TagMerge::new(tag))
                .push(member);
        }

        let registry = self.build_registry(builder);
        info!(
            pack_type = %pack_type,
            outputs = registry.len(),
            errors = registry.errors.len(),
            "planned generated resources"
        );
        registry
    }

    fn plan_document(
        &self,
        document: &Identifier,
        builder: &mut RegistryBuilder,
    ) -> Result<(), PlanError> {
        let bytes = self
            .shared
            .resources
            .read_resource(self.shared.pack_type, document)
            .ok_or_else(|| PlanError::Unreadable {
                document: document.clone(),
            })?;
        let value: Value = serde_json::from_slice(&bytes).map_err(|error| PlanError::Json {
            document: document.clone(),
            error,
        })?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| PlanError::Field {
                document: document.clone(),
                field: "type",
            })?;
        match (kind, self.shared.pack_type) {
            ("texture", PackType::Assets) => self.plan_texture(document, &value, builder),
            ("texture_meta", PackType::Assets) => self.plan_meta(document, &value, builder),
            ("tag", PackType::Data) => self.plan_tag_document(document, &value, builder),
            _ => Err(PlanError::DocumentType {
                document: document.clone(),
                kind: kind.to_string(),
                pack_type: self.shared.pack_type,
            }),
        }
    }

    fn plan_texture(
        &self,
        document: &Identifier,
        value: &Value,
        builder: &mut RegistryBuilder,
    ) -> Result<(), PlanError> {
        let location = identifier_field(document, value, "output_location")?;
        let output = location
            .wrap("textures/", ".png")
            .map_err(|error| PlanError::Identifier {
                document: document.clone(),
                field: "output_location",
                error,
            })?;
        let input = value.get("input").ok_or_else(|| PlanError::Field {
            document: document.clone(),
            field: "input",
        })?;
        let node = self
            .decoders
            .decode(input)
            .map_err(|error| PlanError::Source {
                document: document.clone(),
                error,
            })?;
        if let Some((first, _)) = builder.textures.get(&output) {
            return Err(PlanError::DuplicateOutput {
                document: document.clone(),
                output,
                first: first.clone(),
            });
        }
        builder.textures.insert(output, (document.clone(), node));
        Ok(())
    }

    fn plan_meta(
        &self,
        document: &Identifier,
        value: &Value,
        builder: &mut RegistryBuilder,
    ) -> Result<(), PlanError> {
        let location = identifier_field(document, value, "output_location")?;
        let output = metadata_location(&location).map_err(|error| PlanError::Identifier {
            document: document.clone(),
            field: "output_location",
            error,
        })?;
        let meta_error = |error| PlanError::Meta {
            document: document.clone(),
            error,
        };
        let meta = MetaDocument::deserialize(value)
            .map_err(|e| meta_error(MetaError::Malformed(e.to_string())))?;
        meta.validate().map_err(meta_error)?;
        if let Some((first, _)) = builder.metas.get(&output) {
            return Err(PlanError::DuplicateOutput {
                document: document.clone(),
                output,
                first: first.clone(),
            });
        }
        builder.metas.insert(output, (document.clone(), meta));
        Ok(())
    }

    fn plan_tag_document(
        &self,
        document: &Identifier,
        value: &Value,
        builder: &mut RegistryBuilder,
    ) -> Result<(), PlanError> {
        let tag = identifier_field(document, value, "tag")?;
        let replace = match value.get("replace") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(_) => {
                return Err(PlanError::Field {
                    document: document.clone(),
                    field: "replace",
                });
            }
        };
        let items = value
            .get("members")
            .and_then(Value::as_array)
            .ok_or_else(|| PlanError::Field {
                document: document.clone(),
                field: "members",
            })?;

        // Decode everything before touching the builder so a bad member
        // drops the whole document.
        let mut members = Vec::with_capacity(items.len());
        for item in items {
            members.push(self.decode_member(document, item)?);
        }

        let merge = builder
            .tags
            .entry(tag.clone())
            .or_insert_with(|| TagMerge::new(tag));
        merge.set_replace(replace);
        for member in members {
            merge.push(member);
        }
        Ok(())
    }

    fn decode_member(&self, document: &Identifier, item: &Value) -> Result<TagMember, PlanError> {
        if item.is_string() {
            return Ok(TagMember::always(identifier_value(document, item, "members")?));
        }
        let id = identifier_field(document, item, "id")?;
        let predicate = match item.get("when") {
            None => return Ok(TagMember::always(id)),
            Some(when) => Predicate::decode(when).map_err(|error| PlanError::Source {
                document: document.clone(),
                error,
            })?,
        };
        Ok(TagMember::new(
            id,
            predicate.into_lazy(self.shared.resources.clone()),
        ))
    }

    fn build_registry(&self, builder: RegistryBuilder) -> Registry {
        let RegistryBuilder {
            textures,
            metas,
            tags,
            mut errors,
        } = builder;
        let mut outputs = BTreeMap::new();

        for (id, (_, node)) in textures {
            let node = Arc::new(node);
            let shared = self.shared.clone();
            let encoding = self.encoding;
            let (output_id, produced) = (id.clone(), node.clone());
            let bytes = ResettableLazy::new(move || {
                shared.produce_texture(&output_id, &produced, encoding)
            });
            outputs.insert(
                id,
                PlannedOutput {
                    kind: OutputKind::Texture(node),
                    bytes: Arc::new(bytes),
                },
            );
        }

        for (id, (_, meta)) in metas {
            let meta = Arc::new(meta);
            let shared = self.shared.clone();
            let (output_id, produced) = (id.clone(), meta.clone());
            let bytes = ResettableLazy::new(move || shared.produce_meta(&output_id, &produced));
            outputs.insert(
                id,
                PlannedOutput {
                    kind: OutputKind::Meta(meta),
                    bytes: Arc::new(bytes),
                },
            );
        }

        for (tag, merge) in tags {
            let id = match tag_file_location(&tag) {
                Ok(id) => id,
                Err(error) => {
                    let e = PlanError::Identifier {
                        document: tag.clone(),
                        field: "tag",
                        error,
                    };
                    error!(tag = %tag, "{e}");
                    errors.push(e);
                    continue;
                }
            };
            let merge = Arc::new(merge);
            let shared = self.shared.clone();
            let (output_id, produced) = (id.clone(), merge.clone());
            let bytes = ResettableLazy::with_children(
                move || shared.produce_tag(&output_id, &produced),
                merge.predicates(),
            );
            outputs.insert(
                id,
                PlannedOutput {
                    kind: OutputKind::Tag(merge),
                    bytes: Arc::new(bytes),
                },
            );
        }

        Registry { outputs, errors }
    }
}

fn identifier_value(
    document: &Identifier,
    value: &Value,
    field: &'static str,
) -> Result<Identifier, PlanError> {
    let text = value.as_str().ok_or_else(|| PlanError::Field {
        document: document.clone(),
        field,
    })?;
    text.parse().map_err(|error| PlanError::Identifier {
        document: document.clone(),
        field,
        error,
    })
}

fn identifier_field(
    document: &Identifier,
    value: &Value,
    field: &'static str,
) -> Result<Identifier, PlanError> {
    let inner = value.get(field).ok_or_else(|| PlanError::Field {
        document: document.clone(),
        field,
    })?;
    identifier_value(document, inner, field)
}

// =========================================================================
// Producing
// =========================================================================

impl Shared {
    fn texture_fingerprint(
        &self,
        id: &Identifier,
        node: &TexSource,
        encoding: ColorEncoding,
    ) -> String {
        let mut referenced = BTreeSet::new();
        node.referenced_textures(&mut referenced);
        let inputs: Vec<(Identifier, Option<String>)> = referenced
            .into_iter()
            .map(|path| {
                let hash = texture_location(&path)
                    .and_then(|location| self.resources.read_resource(PackType::Assets, &location))
                    .map(|bytes| hash_bytes(&bytes));
                (path, hash)
            })
            .collect();
        texture_fingerprint(
            id,
            self.cache.is_enabled(),
            encoding,
            &node.canonical_string(),
            &inputs,
        )
    }

    fn produce_texture(
        &self,
        id: &Identifier,
        node: &TexSource,
        encoding: ColorEncoding,
    ) -> Option<Bytes> {
        let fingerprint = self.texture_fingerprint(id, node, encoding);
        if let Some(bytes) = self.cache.lookup(id, &fingerprint) {
            debug!(id = %id, "cache hit");
            self.stats.hit();
            self.stats.output();
            return Some(bytes);
        }
        self.stats.miss();

        let ctx = GenerationContext::new(self.resources.as_ref(), encoding)
            .with_memo(&self.memo)
            .with_evaluation_counter(self.stats.evaluations());
        let Some(image) = node.evaluate(&ctx) else {
            debug!(id = %id, "texture source is absent");
            return None;
        };
        let bytes: Bytes = match encode_png(&image) {
            Ok(bytes) => bytes.into(),
            Err(e) => {
                error!(id = %id, error = %e, "could not encode generated texture");
                return None;
            }
        };
        self.cache.store(id, &fingerprint, &bytes);
        self.stats.output();
        Some(bytes)
    }

    /// Every source with the bytes of its metadata file, if it has one.
    fn source_metadata(&self, document: &MetaDocument) -> Vec<(Identifier, Option<Bytes>)> {
        document
            .sources
            .iter()
            .map(|source| {
                let bytes = metadata_location(source)
                    .ok()
                    .and_then(|location| self.resources.read_resource(PackType::Assets, &location));
                (source.clone(), bytes)
            })
            .collect()
    }

    fn meta_fingerprint_of(
        &self,
        id: &Identifier,
        document: &MetaDocument,
        sources: &[(Identifier, Option<Bytes>)],
    ) -> String {
        let inputs: Vec<(Identifier, Option<String>)> = sources
            .iter()
            .map(|(source, bytes)| (source.clone(), bytes.as_deref().map(hash_bytes)))
            .collect();
        meta_fingerprint(
            id,
            self.cache.is_enabled(),
            &document.canonical_string(),
            &inputs,
        )
    }

    fn meta_fingerprint(&self, id: &Identifier, document: &MetaDocument) -> String {
        self.meta_fingerprint_of(id, document, &self.source_metadata(document))
    }

    fn produce_meta(&self, id: &Identifier, document: &MetaDocument) -> Option<Bytes> {
        let sources = self.source_metadata(document);
        let fingerprint = self.meta_fingerprint_of(id, document, &sources);
        if let Some(bytes) = self.cache.lookup(id, &fingerprint) {
            self.stats.hit();
            self.stats.output();
            return Some(bytes);
        }
        self.stats.miss();
        self.stats.evaluations().fetch_add(1, Ordering::Relaxed);

        let metas: Vec<TextureMeta> = sources
            .iter()
            .map(|(_, bytes)| bytes.as_deref().map(TextureMeta::parse).unwrap_or_default())
            .collect();
        let Some(combined) = document.combine(&metas) else {
            debug!(id = %id, "texture metadata is absent");
            return None;
        };
        let bytes: Bytes = match combined.to_json() {
            Ok(bytes) => bytes.into(),
            Err(e) => {
                error!(id = %id, error = %e, "could not serialize texture metadata");
                return None;
            }
        };
        self.cache.store(id, &fingerprint, &bytes);
        self.stats.output();
        Some(bytes)
    }

    fn produce_tag(&self, id: &Identifier, merge: &TagMerge) -> Option<Bytes> {
        let members = merge.resolve();
        let fingerprint = tag_fingerprint(id, self.cache.is_enabled(), merge.replace(), &members);
        if let Some(bytes) = self.cache.lookup(id, &fingerprint) {
            self.stats.hit();
            self.stats.output();
            return Some(bytes);
        }
        self.stats.miss();
        self.stats.evaluations().fetch_add(1, Ordering::Relaxed);

        let file = TagFile::from_resolved(merge.replace(), &members);
        let bytes: Bytes = match file.to_json() {
            Ok(bytes) => bytes.into(),
            Err(e) => {
                error!(id = %id, error = %e, "could not serialize tag file");
                return None;
            }
        };
        self.cache.store(id, &fingerprint, &bytes);
        self.stats.output();
        Some(bytes)
    }
}

//! Generated tag files.
//!
//! A tag is a list of identifiers published as `ns:tags/<path>.json`:
//!
//! ```json
//! { "replace": false, "values": ["mymod:copper_ore", "mymod:tin_ore"] }
//! ```
//!
//! Members are contributed as `(identifier, predicate)` pairs, where the
//! predicate is a [`ResettableLazy<bool>`]. A [`TagMerge`] groups every
//! member for one tag and rebuilds the document from the predicates each time
//! it is computed. Values are sorted and deduplicated so the same inputs always
//! produce the same bytes.
//!
//! Declarative members carry a [`Predicate`]:
//!
//! | JSON | Meaning |
//! |---|---|
//! | `true` / `false` | constant |
//! | `{"resource_exists": "ns:path", "pack_type": "assets"}` | the pack stack has that resource (`pack_type` defaults to `data`) |
//! | `{"all": [..]}` / `{"any": [..]}` | conjunction / disjunction |
//! | `{"not": p}` | negation |

use crate::lazy::{Resettable, ResettableLazy};
use crate::source::{ResourceSource, SourceError};
use crate::types::{Identifier, IdentifierError, PackType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

const PREDICATE: &str = "predicate";

/// The serialized form of a tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagFile {
    pub replace: bool,
    pub values: Vec<Identifier>,
}

impl TagFile {
    /// The document for already-evaluated `(member, included)` pairs.
    pub fn from_resolved(replace: bool, members: &[(Identifier, bool)]) -> Self {
        let mut values: Vec<Identifier> = members
            .iter()
            .filter(|(_, included)| *included)
            .map(|(id, _)| id.clone())
            .collect();
        values.sort();
        values.dedup();
        Self { replace, values }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }
}

/// `ns:blocks/ores` → `ns:tags/blocks/ores.json`.
pub fn tag_file_location(tag: &Identifier) -> Result<Identifier, IdentifierError> {
    tag.wrap("tags/", ".json")
}

// =========================================================================
// Predicates
// =========================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    Constant(bool),
    ResourceExists {
        location: Identifier,
        pack_type: PackType,
    },
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
    Not(Box<Predicate>),
}

fn predicate_error(field: &str, reason: impl ToString) -> SourceError {
    SourceError::InvalidField {
        tag: PREDICATE.to_string(),
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

impl Predicate {
    pub fn decode(value: &Value) -> Result<Self, SourceError> {
        if let Some(b) = value.as_bool() {
            return Ok(Predicate::Constant(b));
        }
        let map = value.as_object().ok_or(SourceError::NotAnObject)?;
        if let Some(location) = map.get("resource_exists") {
            let text = location
                .as_str()
                .ok_or_else(|| predicate_error("resource_exists", "expected an identifier"))?;
            let location = text
                .parse()
                .map_err(|e| predicate_error("resource_exists", e))?;
            let pack_type = match map.get("pack_type") {
                None => PackType::Data,
                Some(v) => PackType::deserialize(v).map_err(|e| predicate_error("pack_type", e))?,
            };
            return Ok(Predicate::ResourceExists {
                location,
                pack_type,
            });
        }
        if let Some(items) = map.get("all") {
            return Ok(Predicate::All(Self::decode_list("all", items)?));
        }
        if let Some(items) = map.get("any") {
            return Ok(Predicate::Any(Self::decode_list("any", items)?));
        }
        if let Some(inner) = map.get("not") {
            return Ok(Predicate::Not(Box::new(Self::decode(inner)?)));
        }
        Err(predicate_error(
            "when",
            "expected true, false, resource_exists, all, any or not",
        ))
    }

    fn decode_list(field: &str, items: &Value) -> Result<Vec<Self>, SourceError> {
        items
            .as_array()
            .ok_or_else(|| predicate_error(field, "expected an array"))?
            .iter()
            .map(Self::decode)
            .collect()
    }

    pub fn evaluate(&self, resources: &dyn ResourceSource) -> bool {
        match self {
            Predicate::Constant(b) => *b,
            Predicate::ResourceExists {
                location,
                pack_type,
            } => resources.has_resource(*pack_type, location),
            Predicate::All(items) => items.iter().all(|p| p.evaluate(resources)),
            Predicate::Any(items) => items.iter().any(|p| p.evaluate(resources)),
            Predicate::Not(inner) => !inner.evaluate(resources),
        }
    }

    /// A lazy evaluating this predicate against `resources`.
    pub fn into_lazy(self, resources: Arc<dyn ResourceSource>) -> Arc<ResettableLazy<bool>> {
        Arc::new(ResettableLazy::new(move || self.evaluate(resources.as_ref())))
    }
}

// =========================================================================
// Merging
// =========================================================================

/// One candidate member of a tag.
#[derive(Debug, Clone)]
pub struct TagMember {
    pub id: Identifier,
    pub predicate: Arc<ResettableLazy<bool>>,
}

impl TagMember {
    pub fn new(id: Identifier, predicate: Arc<ResettableLazy<bool>>) -> Self {
        Self { id, predicate }
    }

    /// A member that is always included.
    pub fn always(id: Identifier) -> Self {
        Self::new(id, Arc::new(ResettableLazy::new(|| true)))
    }
}

/// Every member contributed to one tag.
#[derive(Debug, Clone)]
pub struct TagMerge {
    tag: Identifier,
    replace: bool,
    members: Vec<TagMember>,
}

impl TagMerge {
    pub fn new(tag: Identifier) -> Self {
        Self {
            tag,
            replace: false,
            members: Vec::new(),
        }
    }

    pub fn tag(&self) -> &Identifier {
        &self.tag
    }

    /// Any contributor asking for `replace` makes the whole tag replacing.
    pub fn set_replace(&mut self, replace: bool) {
        self.replace |= replace;
    }

    pub fn replace(&self) -> bool {
        self.replace
    }

    pub fn push(&mut self, member: TagMember) {
        self.members.push(member);
    }

    pub fn members(&self) -> &[TagMember] {
        &self.members
    }

    /// `(member, predicate result)` in contribution order.
    pub fn resolve(&self) -> Vec<(Identifier, bool)> {
        self.members
            .iter()
            .map(|m| (m.id.clone(), m.predicate.get()))
            .collect()
    }

    /// Evaluate every predicate and build the tag document.
    pub fn build(&self) -> TagFile {
        TagFile::from_resolved(self.replace, &self.resolve())
    }

    /// The predicates, as reset children of whatever caches this tag.
    pub fn predicates(&self) -> Vec<Arc<dyn Resettable>> {
        self.members
            .iter()
            .map(|m| m.predicate.clone() as Arc<dyn Resettable>)
            .collect()
    }
}

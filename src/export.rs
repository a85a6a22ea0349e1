//! Writing a generated pack to disk.
//!
//! Produces every identifier the [`GeneratedPack`] exposes, for both pack
//! types, and writes each one to `<out>/<type>/<namespace>/<path>`, the same
//! layout a [`DirectoryPack`](crate::pack::DirectoryPack) reads. Resources are
//! produced in parallel with rayon, one task per identifier; pixel work inside
//! a task stays on its thread (see [`crate::imaging::pointwise`]). Progress is
//! reported as [`ExportEvent`]s over an optional channel.
//!
//! An identifier whose node is absent is reported and skipped. A failed write
//! is reported and counted; it does not stop the export.

use crate::cache::CacheStats;
use crate::pack::{GeneratedPack, PackResources};
use crate::types::{Identifier, PackType};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportEvent {
    Written {
        pack_type: PackType,
        id: Identifier,
        path: PathBuf,
        size: usize,
    },
    Absent {
        pack_type: PackType,
        id: Identifier,
    },
    Failed {
        pack_type: PackType,
        id: Identifier,
        error: String,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub written: usize,
    pub absent: usize,
    pub failed: usize,
    pub stats: CacheStats,
}

/// `<out>/assets/ns/textures/x.png` for `ns:textures/x.png`.
pub fn output_path(out: &Path, pack_type: PackType, id: &Identifier) -> PathBuf {
    let mut path = out.join(pack_type.directory()).join(id.namespace());
    path.extend(id.path().split('/'));
    path
}

pub fn export(
    pack: &GeneratedPack,
    out: &Path,
    events: Option<Sender<ExportEvent>>,
) -> Result<ExportSummary, ExportError> {
    fs::create_dir_all(out)?;

    let work: Vec<(PackType, Identifier)> = PackType::ALL
        .into_iter()
        .flat_map(|pack_type| {
            pack.planner(pack_type)
                .all_identifiers()
                .into_iter()
                .map(move |id| (pack_type, id))
        })
        .collect();

    let results: Vec<ExportEvent> = work
        .into_par_iter()
        .map(|(pack_type, id)| {
            let event = export_one(pack, out, pack_type, id);
            if let Some(tx) = &events {
                // A dropped receiver only means nobody is listening.
                tx.send(event.clone()).ok();
            }
            event
        })
        .collect();

    let mut summary = ExportSummary {
        stats: pack.stats(),
        ..ExportSummary::default()
    };
    for event in &results {
        match event {
            ExportEvent::Written { .. } => summary.written += 1,
            ExportEvent::Absent { .. } => summary.absent += 1,
            ExportEvent::Failed { .. } => summary.failed += 1,
        }
    }
    Ok(summary)
}

fn export_one(pack: &GeneratedPack, out: &Path, pack_type: PackType, id: Identifier) -> ExportEvent {
    let Some(bytes) = pack.get_resource(pack_type, &id) else {
        return ExportEvent::Absent { pack_type, id };
    };
    let path = output_path(out, pack_type, &id);
    let written = path
        .parent()
        .map_or(Ok(()), fs::create_dir_all)
        .and_then(|()| fs::write(&path, &bytes));
    match written {
        Ok(()) => ExportEvent::Written {
            pack_type,
            id,
            path,
            size: bytes.len(),
        },
        Err(e) => {
            warn!(id = %id, path = %path.display(), error = %e, "could not write generated resource");
            ExportEvent::Failed {
                pack_type,
                id,
                error: e.to_string(),
            }
        }
    }
}

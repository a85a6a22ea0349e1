//! CLI output formatting for every command.
//!
//! # Identifier-First Display
//!
//! Every line leads with the resource identifier; file paths and details are
//! secondary context, either after an arrow or on indented lines. Output
//! reads as an inventory of what the generated pack provides.
//!
//! # Output Format
//!
//! ## List
//!
//! ```text
//! Assets
//! mymod (2 resources)
//!     textures/block/copper_ore.png
//!     textures/block/tin_ore.png
//!
//! Data
//! mymod (1 resource)
//!     tags/blocks/ores.json
//! ```
//!
//! ## Check
//!
//! ```text
//! Assets: 2 outputs, 1 error
//!     mymod:dynamic_asset_generator/broken.json
//!         Error: unknown node type "sparkle"
//! Data: 1 output
//! ```
//!
//! ## Generate
//!
//! ```text
//! mymod:textures/block/copper_ore.png → assets/mymod/textures/block/copper_ore.png (412 bytes)
//! mymod:textures/block/broken.png: absent
//!
//! Generated 2 resources, 1 absent
//! Cache: 1 cached, 2 generated (3 total)
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and, where output is printed in one go, a `print_*` wrapper
//! that writes to stdout. Format functions are pure.

use crate::export::{ExportEvent, ExportSummary};
use crate::planner::Registry;
use crate::types::{Identifier, PackType};
use std::collections::BTreeMap;
use std::path::Path;

// ============================================================================
// Shared helpers
// ============================================================================

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// `1 resource`, `2 resources`.
fn count(n: usize, noun: &str) -> String {
    if n == 1 {
        format!("{n} {noun}")
    } else {
        format!("{n} {noun}s")
    }
}

fn pack_type_title(pack_type: PackType) -> &'static str {
    match pack_type {
        PackType::Assets => "Assets",
        PackType::Data => "Data",
    }
}

// ============================================================================
// List
// ============================================================================

/// Identifiers grouped by namespace, one section per pack type.
pub fn format_list_output(listing: &[(PackType, Vec<Identifier>)]) -> Vec<String> {
    let mut lines = Vec::new();
    for (i, (pack_type, ids)) in listing.iter().enumerate() {
        if i > 0 {
            lines.push(String::new());
        }
        lines.push(pack_type_title(*pack_type).to_string());

        let mut by_namespace: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for id in ids {
            by_namespace.entry(id.namespace()).or_default().push(id.path());
        }
        if by_namespace.is_empty() {
            lines.push(format!("{}(nothing generated)", indent(1)));
        }
        for (namespace, paths) in by_namespace {
            lines.push(format!("{} ({})", namespace, count(paths.len(), "resource")));
            for path in paths {
                lines.push(format!("{}{}", indent(1), path));
            }
        }
    }
    lines
}

pub fn print_list_output(listing: &[(PackType, Vec<Identifier>)]) {
    for line in format_list_output(listing) {
        println!("{}", line);
    }
}

// ============================================================================
// Check
// ============================================================================

/// Plan summary per pack type, with every configuration error under the
/// document it was found in.
pub fn format_check_output(plans: &[(PackType, &Registry)]) -> Vec<String> {
    let mut lines = Vec::new();
    for (pack_type, registry) in plans {
        let mut header = format!(
            "{}: {}",
            pack_type_title(*pack_type),
            count(registry.len(), "output")
        );
        if !registry.errors().is_empty() {
            header.push_str(&format!(", {}", count(registry.errors().len(), "error")));
        }
        lines.push(header);
        for error in registry.errors() {
            lines.push(format!("{}{}", indent(1), error.document()));
            let message = error.to_string();
            let detail = message
                .strip_prefix(&format!("{}: ", error.document()))
                .unwrap_or(&message);
            lines.push(format!("{}Error: {}", indent(2), detail));
        }
    }
    lines
}

pub fn print_check_output(plans: &[(PackType, &Registry)]) {
    for line in format_check_output(plans) {
        println!("{}", line);
    }
}

// ============================================================================
// Generate
// ============================================================================

/// Format a single export event. Paths are shown relative to `out`.
pub fn format_export_event(event: &ExportEvent, out: &Path) -> Vec<String> {
    match event {
        ExportEvent::Written { id, path, size, .. } => {
            let shown = path.strip_prefix(out).unwrap_or(path);
            let shown: Vec<String> = shown
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            vec![format!("{} → {} ({} bytes)", id, shown.join("/"), size)]
        }
        ExportEvent::Absent { id, .. } => vec![format!("{}: absent", id)],
        ExportEvent::Failed { id, error, .. } => {
            vec![format!("{}: failed", id), format!("{}Error: {}", indent(1), error)]
        }
    }
}

pub fn format_export_summary(summary: &ExportSummary) -> Vec<String> {
    let mut line = format!("Generated {}", count(summary.written, "resource"));
    if summary.absent > 0 {
        line.push_str(&format!(", {} absent", summary.absent));
    }
    if summary.failed > 0 {
        line.push_str(&format!(", {} failed", summary.failed));
    }
    vec![line, format!("Cache: {}", summary.stats)]
}

pub fn print_export_summary(summary: &ExportSummary) {
    for line in format_export_summary(summary) {
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheStats, ResourceCache};
    use crate::planner::Planner;
    use crate::source::ResourceSource;
    use crate::test_helpers::{MemorySource, id};
    use std::path::PathBuf;
    use std::sync::Arc;

    // =========================================================================
    // Helper tests
    // =========================================================================

    #[test]
    fn count_pluralizes() {
        assert_eq!(count(0, "resource"), "0 resources");
        assert_eq!(count(1, "resource"), "1 resource");
        assert_eq!(count(2, "error"), "2 errors");
    }

    #[test]
    fn indent_is_four_spaces() {
        assert_eq!(indent(0), "");
        assert_eq!(indent(2), "        ");
    }

    // =========================================================================
    // List
    // =========================================================================

    #[test]
    fn list_groups_by_namespace() {
        let lines = format_list_output(&[
            (
                PackType::Assets,
                vec![
                    id("a:textures/block/x.png"),
                    id("a:textures/block/y.png"),
                    id("b:textures/z.png"),
                ],
            ),
            (PackType::Data, vec![]),
        ]);
        assert_eq!(
            lines,
            vec![
                "Assets",
                "a (2 resources)",
                "    textures/block/x.png",
                "    textures/block/y.png",
                "b (1 resource)",
                "    textures/z.png",
                "",
                "Data",
                "    (nothing generated)",
            ]
        );
    }

    // =========================================================================
    // Check
    // =========================================================================

    #[test]
    fn check_lists_errors_under_documents() {
        let source = Arc::new(MemorySource::new().with_resource(
            PackType::Assets,
            "a:dynamic_asset_generator/broken.json",
            br#"{"type": "texture", "output_location": "a:x", "input": {"type": "sparkle"}}"#,
        ));
        let assets = Planner::new(
            PackType::Assets,
            source.clone() as Arc<dyn ResourceSource>,
            ResourceCache::disabled(),
        );
        let data = Planner::new(PackType::Data, source, ResourceCache::disabled());
        let (assets, data) = (assets.registry(), data.registry());

        let lines = format_check_output(&[(PackType::Assets, &*assets), (PackType::Data, &*data)]);
        assert_eq!(lines[0], "Assets: 0 outputs, 1 error");
        assert_eq!(lines[1], "    a:dynamic_asset_generator/broken.json");
        assert_eq!(lines[2], "        Error: unknown node type \"sparkle\"");
        assert_eq!(lines[3], "Data: 0 outputs");
        assert_eq!(lines.len(), 4);
    }

    // =========================================================================
    // Generate
    // =========================================================================

    #[test]
    fn written_event_shows_relative_path() {
        let out = PathBuf::from("/tmp/out");
        let event = ExportEvent::Written {
            pack_type: PackType::Assets,
            id: id("a:textures/x.png"),
            path: out.join("assets").join("a").join("textures").join("x.png"),
            size: 42,
        };
        assert_eq!(
            format_export_event(&event, &out),
            vec!["a:textures/x.png → assets/a/textures/x.png (42 bytes)"]
        );
    }

    #[test]
    fn absent_and_failed_events() {
        let out = Path::new("out");
        let absent = ExportEvent::Absent {
            pack_type: PackType::Assets,
            id: id("a:textures/x.png"),
        };
        assert_eq!(format_export_event(&absent, out), vec!["a:textures/x.png: absent"]);
        let failed = ExportEvent::Failed {
            pack_type: PackType::Data,
            id: id("a:tags/x.json"),
            error: "disk full".into(),
        };
        assert_eq!(
            format_export_event(&failed, out),
            vec!["a:tags/x.json: failed", "    Error: disk full"]
        );
    }

    #[test]
    fn summary_mentions_only_nonzero_problems() {
        let summary = ExportSummary {
            written: 3,
            absent: 0,
            failed: 0,
            stats: CacheStats {
                hits: 1,
                misses: 2,
                node_evaluations: 4,
                outputs: 3,
            },
        };
        assert_eq!(
            format_export_summary(&summary),
            vec!["Generated 3 resources", "Cache: 1 cached, 2 generated (3 total)"]
        );

        let summary = ExportSummary {
            written: 1,
            absent: 2,
            failed: 1,
            stats: CacheStats::default(),
        };
        assert_eq!(
            format_export_summary(&summary)[0],
            "Generated 1 resource, 2 absent, 1 failed"
        );
    }
}

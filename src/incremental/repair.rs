//! Incremental edge repair
//!
//! Given the diff of one re-parsed file, recompute only the affected edges
//! against the persisted store. The caller has already detach-deleted
//! frames/edges of removed code and inserted the fresh frames; repair fills
//! the cross-reference edges back in. Steps are independent: a failed step
//! lands in the outcome's error list and the engine moves on, never aborting
//! the file. Assumes single-writer discipline against the store; concurrent
//! read-only queries are safe.

use tracing::{debug, info, warn};

use crate::build::context::BuildContext;
use crate::confidence::{adjust_field_usage_confidence, edge_confidence};
use crate::config::Tuning;
use crate::edge::{Edge, EdgeKind};
use crate::frame::{FrameId, FrameKind, Provenance};
use crate::graph::{FrameArena, FrameKey};
use crate::handler::{HandlerRegistry, LanguageHandler};
use crate::incremental::FrameDiff;
use crate::parse::{ParseHandle, RawNode};
use crate::resolve::strategy::{self, StoreStrategy};
use crate::storage::{EdgeRow, FrameRow, GraphStore};
use crate::Result;

/// Metrics and collected failures from one repair run.
#[derive(Debug, Default)]
pub struct RepairOutcome {
    pub edges_deleted: usize,
    pub edges_added: usize,
    pub calls_edges_added: usize,
    pub imports_edges_added: usize,
    pub contains_edges_added: usize,
    pub inherits_edges_added: usize,
    pub uses_edges_added: usize,
    pub relink_edges_added: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Repairs cross-reference edges for one changed file.
///
/// Unlike the full-build resolver, which has every frame in memory, this
/// engine resolves against the persisted store: during an incremental update
/// only the changed file is parsed.
pub struct RepairEngine<'a> {
    store: &'a dyn GraphStore,
    registry: &'a HandlerRegistry,
    tuning: &'a Tuning,
}

impl<'a> RepairEngine<'a> {
    pub fn new(store: &'a dyn GraphStore, registry: &'a HandlerRegistry, tuning: &'a Tuning) -> Self {
        Self {
            store,
            registry,
            tuning,
        }
    }

    /// Run all repair steps for one re-parsed file.
    ///
    /// `arena` holds the fresh single-file parse, `parsed_edges` the edges
    /// that parse produced (CONTAINS included), and `file_nodes` its raw
    /// nodes for call-site and field-usage extraction.
    pub fn repair(
        &self,
        arena: &FrameArena,
        diff: &FrameDiff,
        file_path: &str,
        parsed_edges: &[Edge],
        file_nodes: &[RawNode],
    ) -> RepairOutcome {
        let mut outcome = RepairOutcome::default();
        outcome.warnings = diff.warnings();

        info!(file = %file_path, added = diff.added_count(), stable = diff.stable_count(), "repairing edges");

        let added_callables: Vec<FrameKey> = diff
            .added
            .iter()
            .copied()
            .filter(|&k| arena[k].kind == FrameKind::Callable && arena[k].content.is_some())
            .collect();

        // (a) CALLS for added callables
        match self.recompute_calls_edges(arena, &added_callables, file_nodes) {
            Ok(rows) => {
                outcome.calls_edges_added = rows.len();
                self.insert_batch(&rows, &mut outcome);
            }
            Err(e) => outcome.errors.push(format!("calls repair failed: {}", e)),
        }

        // (b) IMPORTS for added packages
        let added_packages: Vec<FrameKey> = diff
            .added
            .iter()
            .copied()
            .filter(|&k| arena[k].kind == FrameKind::Package)
            .collect();
        match self.recompute_imports_edges(arena, &added_packages, file_nodes) {
            Ok(rows) => {
                outcome.imports_edges_added = rows.len();
                self.insert_batch(&rows, &mut outcome);
            }
            Err(e) => outcome.errors.push(format!("imports repair failed: {}", e)),
        }

        // (c) CONTAINS for added frames, straight from the parse's edge list
        let rows = self.recompute_contains_edges(arena, &diff.added, parsed_edges);
        outcome.contains_edges_added = rows.len();
        self.insert_batch(&rows, &mut outcome);

        // (d) INHERITS for every class in the file, stable ones included: a
        // changed base-class list does not change a class's id, so the class
        // will not be in the added set
        match self.recompute_inherits_edges(arena, diff, &mut outcome.edges_deleted) {
            Ok(rows) => {
                outcome.inherits_edges_added = rows.len();
                self.insert_batch(&rows, &mut outcome);
            }
            Err(e) => outcome.errors.push(format!("inherits repair failed: {}", e)),
        }

        // (e) USES for added callables; body edits change a callable's id,
        // so the added set is exactly the right scope
        match self.recompute_uses_edges(arena, &added_callables, file_nodes) {
            Ok(rows) => {
                outcome.uses_edges_added = rows.len();
                self.insert_batch(&rows, &mut outcome);
            }
            Err(e) => outcome.errors.push(format!("uses repair failed: {}", e)),
        }

        // (f) split-definition relink for added callables
        match self.recompute_relink_edges(arena, &added_callables) {
            Ok(rows) => {
                outcome.relink_edges_added = rows.len();
                self.insert_batch(&rows, &mut outcome);
            }
            Err(e) => outcome.errors.push(format!("relink repair failed: {}", e)),
        }

        info!(
            added = outcome.edges_added,
            deleted = outcome.edges_deleted,
            errors = outcome.errors.len(),
            "edge repair complete"
        );

        outcome
    }

    /// All edge batches funnel through the store's bulk insert.
    fn insert_batch(&self, rows: &[EdgeRow], outcome: &mut RepairOutcome) {
        if rows.is_empty() {
            return;
        }
        match self.store.insert_edges(rows) {
            Ok(count) => outcome.edges_added += count,
            Err(e) => outcome.errors.push(format!("edge insert failed: {}", e)),
        }
    }

    fn recompute_calls_edges(
        &self,
        arena: &FrameArena,
        callables: &[FrameKey],
        file_nodes: &[RawNode],
    ) -> Result<Vec<EdgeRow>> {
        let mut rows = Vec::new();

        for &caller in callables {
            let frame = &arena[caller];
            let Some(handler) = self.handler_for(frame.language.as_deref()) else {
                warn!(frame = %frame.id, "no handler for callable, skipping calls");
                continue;
            };

            let handle = ParseHandle::new(file_nodes, frame.start_byte, frame.end_byte);
            let content = frame.content.clone().unwrap_or_default();
            let call_sites = match handler.extract_call_sites(&content, handle) {
                Ok(sites) => sites,
                Err(e) => {
                    warn!(caller = ?frame.qualified_name, error = %e, "call extraction failed");
                    continue;
                }
            };

            for site in call_sites {
                let strategy_impl = StoreStrategy::new(self.store);
                let Some(result) = strategy::resolve_callable(&strategy_impl, &site.name, &frame.id)
                else {
                    debug!(callee = %site.name, caller = ?frame.qualified_name, "call unresolved");
                    continue;
                };

                let confidence =
                    edge_confidence(EdgeKind::Calls, frame.confidence, result.confidence, self.tuning);
                let mut metadata = serde_json::Map::new();
                metadata.insert("line".into(), site.line.into());
                rows.push(EdgeRow {
                    subject: frame.id.clone(),
                    object: result.frame_id,
                    kind: EdgeKind::Calls,
                    confidence,
                    metadata,
                });
            }
        }

        Ok(rows)
    }

    fn recompute_imports_edges(
        &self,
        arena: &FrameArena,
        packages: &[FrameKey],
        file_nodes: &[RawNode],
    ) -> Result<Vec<EdgeRow>> {
        let mut rows = Vec::new();
        let Some(&first) = packages.first() else {
            return Ok(rows);
        };

        // One file, one language: read content once from the root node
        let Some(content) = file_nodes.first().map(|n| n.content.as_str()) else {
            return Ok(rows);
        };
        let language = arena[first].language.clone().unwrap_or_default();
        let Some(handler) = self.handler_for(Some(&language)) else {
            warn!(language = %language, "no handler for package imports");
            return Ok(rows);
        };

        let imports = handler.extract_imports(content)?;
        let source_id = arena[first].id.clone();

        for import in imports {
            let Some(target_id) = self.resolve_import_in_store(&import.import_path)? else {
                debug!(import = %import.import_path, "import unresolved against store");
                continue;
            };

            let mut metadata = serde_json::Map::new();
            metadata.insert("import_path".into(), import.import_path.clone().into());
            rows.push(EdgeRow {
                subject: source_id.clone(),
                object: target_id,
                kind: EdgeKind::Imports,
                confidence: self.tuning.relative_import_resolved,
                metadata,
            });
        }

        Ok(rows)
    }

    /// PACKAGE match first, then CLASS, exact qualified name then suffix.
    fn resolve_import_in_store(&self, import_path: &str) -> Result<Option<FrameId>> {
        let path = import_path.trim_start_matches('.');

        for kind in [FrameKind::Package, FrameKind::Class] {
            if let Some(row) = self.store.find_by_kind_and_qualified_name(kind, path)? {
                return Ok(Some(row.id));
            }
            let suffix = format!(".{}", path);
            let mut rows = self.store.find_by_kind_and_suffix(kind, &suffix)?;
            rows.sort_by_key(|r| r.qualified_name.as_ref().map(|q| q.len()).unwrap_or(usize::MAX));
            if let Some(row) = rows.into_iter().next() {
                return Ok(Some(row.id));
            }
        }
        Ok(None)
    }

    /// CONTAINS edges for added frames, filtered out of the parse's edge
    /// list rather than recomputed.
    fn recompute_contains_edges(
        &self,
        arena: &FrameArena,
        added: &[FrameKey],
        parsed_edges: &[Edge],
    ) -> Vec<EdgeRow> {
        let added_ids: std::collections::HashSet<&FrameId> =
            added.iter().map(|&k| &arena[k].id).collect();

        parsed_edges
            .iter()
            .filter(|e| e.kind == EdgeKind::Contains)
            .filter(|e| added_ids.contains(&e.subject) || added_ids.contains(&e.object))
            .map(EdgeRow::from_edge)
            .collect()
    }

    fn recompute_inherits_edges(
        &self,
        arena: &FrameArena,
        diff: &FrameDiff,
        edges_deleted: &mut usize,
    ) -> Result<Vec<EdgeRow>> {
        // Stable and added both: identity does not cover the base-class list
        let mut class_keys: Vec<FrameKey> = diff
            .stable_ids
            .iter()
            .filter_map(|id| diff.new_id_to_key.get(id).copied())
            .chain(diff.added.iter().copied())
            .filter(|&k| arena[k].kind == FrameKind::Class && arena[k].content.is_some())
            .collect();
        class_keys.sort();
        class_keys.dedup();

        if class_keys.is_empty() {
            return Ok(Vec::new());
        }

        // Delete first, then unconditionally recompute
        let class_ids: Vec<FrameId> = class_keys.iter().map(|&k| arena[k].id.clone()).collect();
        *edges_deleted += self.store.delete_inherits_edges_from(&class_ids)?;

        let mut rows = Vec::new();
        for &class_key in &class_keys {
            let frame = &arena[class_key];
            let Some(handler) = self.handler_for(frame.language.as_deref()) else {
                continue;
            };
            let content = frame.content.clone().unwrap_or_default();

            let bases = handler.extract_base_classes(&content)?;
            for base in bases {
                let base = base.trim();
                if base.is_empty() {
                    continue;
                }

                let resolved = {
                    let strategy_impl = StoreStrategy::new(self.store);
                    strategy::resolve_class(&strategy_impl, base)
                };
                let (parent_id, parent_confidence) = match resolved {
                    Some(result) => (result.frame_id, result.confidence),
                    None => {
                        let id = self.create_external_class_row(frame, base)?;
                        (id, self.tuning.external_frame_confidence)
                    }
                };

                let confidence =
                    edge_confidence(EdgeKind::Inherits, frame.confidence, parent_confidence, self.tuning);
                let mut metadata = serde_json::Map::new();
                metadata.insert("parent_name".into(), base.into());
                rows.push(EdgeRow {
                    subject: frame.id.clone(),
                    object: parent_id,
                    kind: EdgeKind::Inherits,
                    confidence,
                    metadata,
                });
            }
        }

        Ok(rows)
    }

    /// Persist an EXTERNAL placeholder class for an unresolved base,
    /// deduplicated by qualified name against the store.
    fn create_external_class_row(
        &self,
        child: &crate::frame::Frame,
        class_name: &str,
    ) -> Result<FrameId> {
        let language = child.language.clone().unwrap_or_default();

        let parts: Vec<&str> = class_name.split('.').collect();
        let qualified_name = if parts.len() == 1 {
            match self.store.containing_package_qualified_name(&child.id)? {
                Some(package) => format!("{}.{}", package, class_name),
                None => format!("{}.{}", language, class_name),
            }
        } else {
            format!("{}.{}", language, class_name)
        };

        if let Some(existing) = self
            .store
            .find_by_kind_and_qualified_name(FrameKind::Class, &qualified_name)?
        {
            debug!(qname = %qualified_name, "external class already persisted");
            return Ok(existing.id);
        }

        let simple_name = parts[parts.len() - 1].to_string();
        let mut frame = crate::frame::Frame::new(FrameKind::Class)
            .with_name(simple_name)
            .with_qualified_name(qualified_name.clone())
            .with_language(language)
            .with_provenance(Provenance::External)
            .with_confidence(self.tuning.external_frame_confidence)
            .with_location("<external_or_unresolved>", 0, 0, 0, 0);
        frame.compute_id();

        let row = FrameRow::from_frame(&frame);
        self.store.insert_frames(std::slice::from_ref(&row))?;
        info!(qname = %qualified_name, "created external class for unresolved parent");

        Ok(row.id)
    }

    fn recompute_uses_edges(
        &self,
        arena: &FrameArena,
        callables: &[FrameKey],
        file_nodes: &[RawNode],
    ) -> Result<Vec<EdgeRow>> {
        let mut rows = Vec::new();

        for &callable in callables {
            let frame = &arena[callable];
            let Some(handler) = self.handler_for(frame.language.as_deref()) else {
                continue;
            };

            // Enclosing class comes from the store's CONTAINS edges
            let Some(class_id) = self.store.parent_class_id(&frame.id)? else {
                continue;
            };
            let Some(class_row) = self.store.frame_by_id(&class_id)? else {
                continue;
            };
            let field_names = class_row.field_names();
            if field_names.is_empty() {
                continue;
            }

            let handle = ParseHandle::new(file_nodes, frame.start_byte, frame.end_byte);
            let content = frame.content.clone().unwrap_or_default();
            let usages = match handler.extract_field_usages(&content, handle, &field_names) {
                Ok(usages) => usages,
                Err(e) => {
                    warn!(callable = ?frame.qualified_name, error = %e, "field usage extraction failed");
                    continue;
                }
            };

            for usage in usages {
                let base =
                    edge_confidence(EdgeKind::Uses, frame.confidence, class_row.confidence, self.tuning);
                let confidence = adjust_field_usage_confidence(base, usage.pattern, self.tuning);

                let mut metadata = serde_json::Map::new();
                metadata.insert("field_name".into(), usage.field.clone().into());
                metadata.insert("access_type".into(), usage.access.as_str().into());
                metadata.insert("line".into(), usage.line.into());
                metadata.insert("pattern_type".into(), usage.pattern.as_str().into());
                rows.push(EdgeRow {
                    subject: frame.id.clone(),
                    object: class_id.clone(),
                    kind: EdgeKind::Uses,
                    confidence,
                    metadata,
                });
            }
        }

        Ok(rows)
    }

    /// Cross-file CLASS → CALLABLE relink for split-definition languages.
    fn recompute_relink_edges(&self, arena: &FrameArena, callables: &[FrameKey]) -> Result<Vec<EdgeRow>> {
        let mut rows = Vec::new();

        for &callable in callables {
            let frame = &arena[callable];
            let Some(handler) = self.handler_for(frame.language.as_deref()) else {
                continue;
            };
            if !handler.has_split_definitions() {
                continue;
            }
            let content = frame.content.clone().unwrap_or_default();
            let Some(class_name) = handler.extract_class_scope(&content) else {
                continue;
            };

            let language = frame.language.clone().unwrap_or_default();
            let candidates = self
                .store
                .find_by_kind_and_name(FrameKind::Class, &language, &class_name)?;
            let Some(class_row) = candidates.into_iter().next() else {
                continue;
            };

            let confidence = edge_confidence(
                EdgeKind::Contains,
                class_row.confidence,
                frame.confidence,
                self.tuning,
            );
            let mut metadata = serde_json::Map::new();
            metadata.insert("cross_file_resolved".into(), true.into());
            metadata.insert("class_name".into(), class_name.into());
            rows.push(EdgeRow {
                subject: class_row.id,
                object: frame.id.clone(),
                kind: EdgeKind::Contains,
                confidence,
                metadata,
            });
        }

        Ok(rows)
    }

    fn handler_for(&self, language: Option<&str>) -> Option<&dyn LanguageHandler> {
        self.registry.get(language?)
    }
}

/// Parse one file in isolation and collect its frames and edges, the shape
/// the diff calculator and repair engine consume.
///
/// The returned context holds only this file's frames; everything else
/// lives in the store.
pub fn parse_single_file(
    registry: &HandlerRegistry,
    tuning: Tuning,
    codebase_root: &str,
    file_path: &str,
    raw_nodes: &[RawNode],
) -> (BuildContext, Vec<FrameKey>) {
    use crate::build::GraphBuilder;
    use crate::incremental::DiffCalculator;

    let mut file_map = std::collections::BTreeMap::new();
    file_map.insert(file_path.to_string(), raw_nodes.to_vec());

    let mut ctx = BuildContext::new(tuning);
    let builder = GraphBuilder::new(registry);
    let codebase = builder.build(&mut ctx, codebase_root, &file_map);

    let frames = DiffCalculator::new()
        .collect_frames(&ctx.arena, codebase)
        .into_iter()
        // The per-file parse scaffolding (codebase/language roots) is not
        // part of the file's frame set
        .filter(|&k| {
            !matches!(
                ctx.arena[k].kind,
                FrameKind::Codebase | FrameKind::Language
            )
        })
        .collect();

    (ctx, frames)
}

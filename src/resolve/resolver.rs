//! Cross-reference resolver
//!
//! Runs after structural construction as five independent passes, each
//! idempotent and individually re-runnable: imports, inheritance, the
//! cross-file relink for split declaration/definition languages, calls, and
//! field usages. Unresolved imports and calls simply produce no edge;
//! unresolved base classes get a low-confidence EXTERNAL placeholder so the
//! relationship is represented rather than dropped.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::build::BuildContext;
use crate::confidence::{adjust_field_usage_confidence, edge_confidence};
use crate::edge::EdgeKind;
use crate::frame::{Frame, FrameKind, Provenance};
use crate::graph::FrameKey;
use crate::handler::{HandlerRegistry, LanguageHandler};
use crate::parse::{ParseHandle, RawNode};
use crate::resolve::strategy::{self, MemoryStrategy};

pub struct CrossRefResolver<'a> {
    registry: &'a HandlerRegistry,
}

impl<'a> CrossRefResolver<'a> {
    pub fn new(registry: &'a HandlerRegistry) -> Self {
        Self { registry }
    }

    /// Run all resolution passes over a built graph.
    ///
    /// `file_nodes` is the same per-file raw-node map the builder consumed;
    /// imports read each file's content from its root node, calls and field
    /// usages walk each callable's contained nodes.
    pub fn resolve(&self, ctx: &mut BuildContext, file_nodes: &BTreeMap<String, Vec<RawNode>>) {
        self.resolve_imports(ctx, file_nodes);
        self.resolve_inheritance(ctx);
        self.relink_split_definitions(ctx);
        self.resolve_calls(ctx, file_nodes);
        self.resolve_field_usages(ctx, file_nodes);
    }

    // ==================== IMPORTS ====================

    /// One IMPORTS edge per resolved import, subject = the importing file's
    /// package (or language root when the file has none).
    pub fn resolve_imports(&self, ctx: &mut BuildContext, file_nodes: &BTreeMap<String, Vec<RawNode>>) {
        // Re-runnable: replace prior results instead of accumulating
        ctx.edges.retain(|e| e.kind != EdgeKind::Imports);

        let mut files: Vec<String> = ctx.processed_files.iter().cloned().collect();
        files.sort();

        for file_path in files {
            let Some(language) = self.registry.detect_language(Path::new(&file_path)) else {
                continue;
            };
            let Some(handler) = self.registry.get(&language) else {
                continue;
            };
            let Some(nodes) = file_nodes.get(&file_path) else {
                continue;
            };
            // The file's root node spans the whole file
            let Some(content) = nodes.first().map(|n| n.content.clone()) else {
                continue;
            };

            let imports = match handler.extract_imports(&content) {
                Ok(imports) => imports,
                Err(e) => {
                    warn!(file = %file_path, error = %e, "import extraction failed");
                    continue;
                }
            };
            if imports.is_empty() {
                continue;
            }

            let package = self.package_for_file(ctx, handler, &file_path, &language);
            let source = package
                .or_else(|| ctx.language_frames.get(&language).copied());
            let Some(source) = source else {
                continue;
            };

            for import in imports {
                let resolved = if import.import_path.starts_with('.') {
                    self.resolve_relative_import(ctx, package, &import.import_path, handler)
                } else {
                    self.resolve_absolute_import(ctx, &import.import_path, &language, handler)
                };

                // Unresolved imports are not edged
                let Some((target, confidence)) = resolved else {
                    debug!(import = %import.import_path, file = %file_path, "import unresolved");
                    continue;
                };

                let mut metadata = serde_json::Map::new();
                metadata.insert("import_path".into(), import.import_path.clone().into());
                metadata.insert(
                    "provenance".into(),
                    if confidence > 0.5 { "resolved" } else { "speculative" }.into(),
                );
                ctx.push_edge(source, target, EdgeKind::Imports, confidence, metadata);
            }
        }
    }

    /// Package frame a file belongs to, recomputed from its path.
    fn package_for_file(
        &self,
        ctx: &BuildContext,
        handler: &dyn LanguageHandler,
        file_path: &str,
        language: &str,
    ) -> Option<FrameKey> {
        let parts = handler.extract_package_hierarchy_from_path(file_path, &ctx.codebase_root);
        if parts.is_empty() {
            return None;
        }

        let language_key = ctx.language_frames.get(language)?;
        let mut qname = ctx.arena[*language_key].qualified_name.clone()?;
        for part in parts {
            qname = format!("{}{}{}", qname, handler.separator(), part);
        }
        ctx.package_registry.get(&qname).copied()
    }

    /// Navigate a relative import from the file's package anchor.
    ///
    /// Returns the target frame plus the confidence of the path taken: a
    /// clean hit, a synthesized package tail, a missing anchor, or a failed
    /// upward navigation, in decreasing order.
    fn resolve_relative_import(
        &self,
        ctx: &mut BuildContext,
        package: Option<FrameKey>,
        import_path: &str,
        handler: &dyn LanguageHandler,
    ) -> Option<(FrameKey, f32)> {
        let dots = import_path.len() - import_path.trim_start_matches('.').len();
        let rest = import_path.trim_start_matches('.');

        let Some(anchor) = package else {
            let frame = self.create_unknown_import_frame(ctx, import_path);
            return Some((frame, ctx.tuning.relative_import_no_anchor));
        };

        // One dot stays at the current package; each further dot goes up one
        let mut current = anchor;
        for _ in 1..dots {
            match ctx.arena.parent_of_kind(current, FrameKind::Package) {
                Some(parent) => current = parent,
                None => {
                    let frame = self.create_unknown_import_frame(ctx, import_path);
                    return Some((frame, ctx.tuning.relative_import_navigation_failed));
                }
            }
        }

        let mut synthesized = false;
        if !rest.is_empty() {
            for part in rest.split(handler.separator()).flat_map(|p| p.split('.')) {
                if part.is_empty() {
                    continue;
                }
                match ctx.arena.find_child_by_name(current, part) {
                    Some(child) => current = child,
                    None => {
                        current = self.create_inferred_package(ctx, part, current);
                        synthesized = true;
                    }
                }
            }
        }

        let confidence = if synthesized {
            ctx.tuning.relative_import_synthesized
        } else {
            ctx.tuning.relative_import_resolved
        };
        Some((current, confidence))
    }

    /// Walk an absolute import path down from the language root.
    fn resolve_absolute_import(
        &self,
        ctx: &BuildContext,
        import_path: &str,
        language: &str,
        handler: &dyn LanguageHandler,
    ) -> Option<(FrameKey, f32)> {
        let mut current = *ctx.language_frames.get(language)?;
        for part in import_path.split(handler.separator()).flat_map(|p| p.split('.')) {
            if part.is_empty() {
                continue;
            }
            current = ctx.arena.find_child_by_name(current, part)?;
        }
        Some((current, ctx.tuning.absolute_import_resolved))
    }

    fn create_unknown_import_frame(&self, ctx: &mut BuildContext, import_path: &str) -> FrameKey {
        let mut frame = Frame::new(FrameKind::Package)
            .with_name(import_path)
            .with_qualified_name(import_path)
            .with_provenance(Provenance::External)
            .with_confidence(ctx.tuning.relative_import_no_anchor)
            .with_location("<external_or_unresolved>", 0, 0, 0, 0);
        frame.compute_id();
        let key = ctx.arena.insert(frame);
        ctx.external_frames.push(key);
        key
    }

    /// Synthesize a missing package on a relative-import path.
    fn create_inferred_package(&self, ctx: &mut BuildContext, name: &str, parent: FrameKey) -> FrameKey {
        let parent_qname = ctx.arena[parent].qualified_name.clone();
        let language = ctx.arena[parent].language.clone();

        let qualified_name = match &parent_qname {
            Some(q) => format!("{}.{}", q, name),
            None => name.to_string(),
        };

        let mut frame = Frame::new(FrameKind::Package)
            .with_name(name)
            .with_qualified_name(qualified_name)
            .with_provenance(Provenance::Inferred)
            .with_confidence(ctx.tuning.relative_import_synthesized)
            .with_location("<external_or_unresolved>", 0, 0, 0, 0);
        if let Some(language) = language {
            frame = frame.with_language(language);
        }
        frame.compute_id();
        let key = ctx.arena.insert(frame);
        ctx.arena.attach(parent, key);
        key
    }

    // ==================== INHERITANCE ====================

    /// One INHERITS edge per extracted base class. Unresolvable bases get a
    /// deduplicated low-confidence EXTERNAL placeholder class instead of
    /// being dropped.
    pub fn resolve_inheritance(&self, ctx: &mut BuildContext) {
        ctx.edges.retain(|e| e.kind != EdgeKind::Inherits);

        // Snapshot: resolution may add external classes to the registry
        let mut classes: Vec<(String, FrameKey)> = ctx
            .class_registry
            .iter()
            .map(|(q, &k)| (q.clone(), k))
            .collect();
        classes.sort();

        for (_, class_key) in classes {
            let Some(content) = ctx.arena[class_key].content.clone() else {
                continue;
            };
            let Some(language) = ctx.arena[class_key].language.clone() else {
                continue;
            };
            let Some(handler) = self.registry.get(&language) else {
                continue;
            };

            let bases = match handler.extract_base_classes(&content) {
                Ok(bases) => bases,
                Err(e) => {
                    warn!(class = ?ctx.arena[class_key].qualified_name, error = %e, "base class extraction failed");
                    continue;
                }
            };

            for base in bases {
                let base = base.trim();
                if base.is_empty() {
                    continue;
                }
                self.resolve_parent_class(ctx, class_key, base, &language);
            }
        }
    }

    fn resolve_parent_class(
        &self,
        ctx: &mut BuildContext,
        class_key: FrameKey,
        parent_name: &str,
        language: &str,
    ) {
        let resolved = {
            let strategy_impl = MemoryStrategy::new(ctx);
            strategy::resolve_class(&strategy_impl, parent_name)
                .and_then(|r| ctx.arena.key_of(&r.frame_id))
        };

        let parent_key = match resolved {
            Some(key) => key,
            None => self.create_external_class(ctx, parent_name, language),
        };

        let confidence = edge_confidence(
            EdgeKind::Inherits,
            ctx.arena[class_key].confidence,
            ctx.arena[parent_key].confidence,
            &ctx.tuning,
        );

        let mut metadata = serde_json::Map::new();
        metadata.insert("parent_name".into(), parent_name.into());
        ctx.push_edge(class_key, parent_key, EdgeKind::Inherits, confidence, metadata);
    }

    /// EXTERNAL placeholder class, deduplicated by qualified name. A dotted
    /// base name materializes its intermediate packages too.
    fn create_external_class(&self, ctx: &mut BuildContext, class_name: &str, language: &str) -> FrameKey {
        let language_key = ctx.language_frames.get(language).copied();
        let language_qname = language_key
            .and_then(|k| ctx.arena[k].qualified_name.clone())
            .unwrap_or_else(|| language.to_string());

        let parts: Vec<&str> = class_name.split('.').collect();
        let (simple_name, qualified_name) = if parts.len() == 1 {
            (parts[0].to_string(), format!("{}.{}", language_qname, parts[0]))
        } else {
            let package_parts = &parts[..parts.len() - 1];
            let simple = parts[parts.len() - 1].to_string();
            let parent = self.ensure_package_path(ctx, package_parts, &language_qname, language);
            let parent_qname = ctx.arena[parent]
                .qualified_name
                .clone()
                .unwrap_or_else(|| language_qname.clone());
            (simple.clone(), format!("{}.{}", parent_qname, simple))
        };

        if let Some(&existing) = ctx.class_registry.get(&qualified_name) {
            return existing;
        }

        let mut frame = Frame::new(FrameKind::Class)
            .with_name(simple_name)
            .with_qualified_name(qualified_name.clone())
            .with_language(language)
            .with_provenance(Provenance::External)
            .with_confidence(ctx.tuning.external_frame_confidence)
            .with_location("<external_or_unresolved>", 0, 0, 0, 0);
        frame.compute_id();
        let key = ctx.arena.insert(frame);

        ctx.class_registry.insert(qualified_name, key);
        ctx.external_frames.push(key);
        key
    }

    /// Ensure a package chain exists under the language root, creating
    /// low-confidence external packages where missing.
    fn ensure_package_path(
        &self,
        ctx: &mut BuildContext,
        parts: &[&str],
        language_qname: &str,
        language: &str,
    ) -> FrameKey {
        let mut current_key = ctx.language_frames.get(language).copied();
        let mut current_qname = language_qname.to_string();

        for part in parts {
            let next_qname = format!("{}.{}", current_qname, part);

            if let Some(&existing) = ctx.package_registry.get(&next_qname) {
                current_key = Some(existing);
                current_qname = next_qname;
                continue;
            }

            let mut frame = Frame::new(FrameKind::Package)
                .with_name(*part)
                .with_qualified_name(next_qname.clone())
                .with_language(language)
                .with_provenance(Provenance::External)
                .with_confidence(ctx.tuning.external_frame_confidence)
                .with_location("<external_or_unresolved>", 0, 0, 0, 0);
            frame.compute_id();
            let key = ctx.arena.insert(frame);

            if let Some(parent) = current_key {
                ctx.arena.attach(parent, key);
            }
            ctx.package_registry.insert(next_qname.clone(), key);
            ctx.external_frames.push(key);

            current_key = Some(key);
            current_qname = next_qname;
        }

        current_key.unwrap_or(FrameKey(0))
    }

    // ==================== SPLIT-DEFINITION RELINK ====================

    /// Cross-file relinking for languages that separate declarations from
    /// definitions: locate a CALLABLE's class by the scope in its signature
    /// (`Logger::log`), attach it, and fix its qualified name.
    pub fn relink_split_definitions(&self, ctx: &mut BuildContext) {
        ctx.edges.retain(|e| {
            !(e.kind == EdgeKind::Contains && e.metadata.contains_key("cross_file_resolved"))
        });

        let callables: Vec<FrameKey> = ctx
            .arena
            .iter()
            .filter(|(_, f)| f.kind == FrameKind::Callable)
            .map(|(k, _)| k)
            .collect();

        let mut resolved_count = 0usize;
        let mut failed_count = 0usize;

        for callable in callables {
            let Some(language) = ctx.arena[callable].language.clone() else {
                continue;
            };
            let Some(handler) = self.registry.get(&language) else {
                continue;
            };
            if !handler.has_split_definitions() {
                continue;
            }
            let Some(content) = ctx.arena[callable].content.clone() else {
                continue;
            };

            // Free functions have no class scope
            let Some(class_name) = handler.extract_class_scope(&content) else {
                continue;
            };

            let Some(class_key) = self.find_class_by_simple_name(ctx, &class_name, &language, callable)
            else {
                failed_count += 1;
                debug!(class = %class_name, callable = ?ctx.arena[callable].qualified_name, "class not found for method");
                continue;
            };

            let confidence = edge_confidence(
                EdgeKind::Contains,
                ctx.arena[class_key].confidence,
                ctx.arena[callable].confidence,
                &ctx.tuning,
            );

            let mut metadata = serde_json::Map::new();
            metadata.insert("cross_file_resolved".into(), true.into());
            metadata.insert("class_name".into(), class_name.clone().into());
            ctx.push_edge(class_key, callable, EdgeKind::Contains, confidence, metadata);

            if !ctx.arena[class_key].children().contains(&callable) {
                ctx.arena.attach(class_key, callable);
            }

            // Fix the qualified name: utils.log → utils.Logger.log; the
            // class/method separator stays '.' across languages
            let class_qname = ctx.arena[class_key].qualified_name.clone();
            let method_name = ctx.arena[callable].name.clone();
            if let (Some(class_qname), Some(method_name)) = (class_qname, method_name) {
                ctx.arena.get_mut(callable).qualified_name =
                    Some(format!("{}.{}", class_qname, method_name));
            }

            resolved_count += 1;
        }

        if resolved_count > 0 || failed_count > 0 {
            info!(resolved = resolved_count, failed = failed_count, "split-definition relink complete");
        }
    }

    /// Class lookup by simple name within a language; multiple matches
    /// prefer the candidate sharing the method's namespace, else the first.
    fn find_class_by_simple_name(
        &self,
        ctx: &BuildContext,
        class_name: &str,
        language: &str,
        context_frame: FrameKey,
    ) -> Option<FrameKey> {
        let mut candidates: Vec<FrameKey> = ctx
            .class_registry
            .values()
            .copied()
            .filter(|&k| {
                let f = &ctx.arena[k];
                f.language.as_deref() == Some(language) && f.name.as_deref() == Some(class_name)
            })
            .collect();
        candidates.sort();

        match candidates.len() {
            0 => None,
            1 => Some(candidates[0]),
            _ => {
                let method_qname = ctx.arena[context_frame].qualified_name.clone().unwrap_or_default();
                let method_ns: Vec<&str> = method_qname.split("::").collect();

                for &candidate in &candidates {
                    let class_qname = ctx.arena[candidate].qualified_name.clone().unwrap_or_default();
                    let class_ns: Vec<&str> = class_qname.split("::").collect();
                    if class_ns.len() == method_ns.len()
                        && class_ns[..class_ns.len() - 1] == method_ns[..method_ns.len() - 1]
                    {
                        return Some(candidate);
                    }
                }
                Some(candidates[0])
            }
        }
    }

    // ==================== CALLS ====================

    /// One CALLS edge per resolved call site.
    pub fn resolve_calls(&self, ctx: &mut BuildContext, file_nodes: &BTreeMap<String, Vec<RawNode>>) {
        ctx.edges.retain(|e| e.kind != EdgeKind::Calls);

        for caller in self.all_callables(ctx) {
            let Some((handler, handle)) = self.handle_for(ctx, caller, file_nodes) else {
                continue;
            };
            let content = ctx.arena[caller].content.clone().unwrap_or_default();

            let call_sites = match handler.extract_call_sites(&content, handle) {
                Ok(sites) => sites,
                Err(e) => {
                    warn!(caller = ?ctx.arena[caller].qualified_name, error = %e, "call extraction failed");
                    continue;
                }
            };

            for site in call_sites {
                let caller_id = ctx.arena[caller].id.clone();
                let resolved = {
                    let strategy_impl = MemoryStrategy::new(ctx);
                    strategy::resolve_callable(&strategy_impl, &site.name, &caller_id)
                        .and_then(|r| ctx.arena.key_of(&r.frame_id))
                };
                let Some(callee) = resolved else {
                    continue;
                };
                let confidence = edge_confidence(
                    EdgeKind::Calls,
                    ctx.arena[caller].confidence,
                    ctx.arena[callee].confidence,
                    &ctx.tuning,
                );

                let mut metadata = serde_json::Map::new();
                metadata.insert("line".into(), site.line.into());
                ctx.push_edge(caller, callee, EdgeKind::Calls, confidence, metadata);
            }
        }
    }

    // ==================== FIELD USAGES ====================

    /// One USES edge (CALLABLE → CLASS) per detected access to a declared
    /// field of the callable's enclosing class.
    pub fn resolve_field_usages(&self, ctx: &mut BuildContext, file_nodes: &BTreeMap<String, Vec<RawNode>>) {
        ctx.edges.retain(|e| e.kind != EdgeKind::Uses);

        let callables = self.all_callables(ctx);
        info!(count = callables.len(), "resolving field usages");

        for callable in callables {
            // Free functions have no enclosing class, hence no fields
            let Some(class_key) = ctx.arena.enclosing_class(callable) else {
                continue;
            };
            let field_names = ctx.arena[class_key].payload.field_names();
            if field_names.is_empty() {
                continue;
            }

            let Some((handler, handle)) = self.handle_for(ctx, callable, file_nodes) else {
                continue;
            };
            let content = ctx.arena[callable].content.clone().unwrap_or_default();

            let usages = match handler.extract_field_usages(&content, handle, &field_names) {
                Ok(usages) => usages,
                Err(e) => {
                    warn!(callable = ?ctx.arena[callable].qualified_name, error = %e, "field usage extraction failed");
                    continue;
                }
            };

            for usage in usages {
                let base = edge_confidence(
                    EdgeKind::Uses,
                    ctx.arena[callable].confidence,
                    ctx.arena[class_key].confidence,
                    &ctx.tuning,
                );
                let confidence = adjust_field_usage_confidence(base, usage.pattern, &ctx.tuning);

                let mut metadata = serde_json::Map::new();
                metadata.insert("field_name".into(), usage.field.clone().into());
                metadata.insert("access_type".into(), usage.access.as_str().into());
                metadata.insert("line".into(), usage.line.into());
                metadata.insert("pattern_type".into(), usage.pattern.as_str().into());
                ctx.push_edge(callable, class_key, EdgeKind::Uses, confidence, metadata);
            }
        }
    }

    // ==================== HELPERS ====================

    fn all_callables(&self, ctx: &BuildContext) -> Vec<FrameKey> {
        ctx.arena
            .iter()
            .filter(|(_, f)| f.kind == FrameKind::Callable && f.content.is_some())
            .map(|(k, _)| k)
            .collect()
    }

    /// Handler plus parse handle for a callable's byte range, when the
    /// file's raw nodes are available.
    fn handle_for<'n>(
        &self,
        ctx: &BuildContext,
        callable: FrameKey,
        file_nodes: &'n BTreeMap<String, Vec<RawNode>>,
    ) -> Option<(&dyn LanguageHandler, ParseHandle<'n>)> {
        let frame = &ctx.arena[callable];
        let language = frame.language.as_deref()?;
        let handler = self.registry.get(language)?;
        let file_path = frame.file_path.as_deref()?;
        let nodes = file_nodes.get(file_path)?;
        Some((handler, ParseHandle::new(nodes, frame.start_byte, frame.end_byte)))
    }
}

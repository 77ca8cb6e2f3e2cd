//! Structural builder - raw nodes to semantic frames
//!
//! A state machine over each file's flat raw-node array. Two decisions per
//! node: does it become a frame (the handler's mapping table), and does that
//! frame open a new scope (structural and control-flow kinds). Pass-through
//! nodes are drilled into so semantic descendants surface at the right level,
//! and indices claimed by one sibling's descent are excluded from the next
//! so a class's second method cannot end up nested under its first.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use tracing::{error, warn};

use crate::build::context::BuildContext;
use crate::frame::{Frame, FrameKind, FramePayload};
use crate::graph::FrameKey;
use crate::handler::{HandlerRegistry, LanguageHandler};
use crate::parse::RawNode;

pub struct GraphBuilder<'a> {
    registry: &'a HandlerRegistry,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(registry: &'a HandlerRegistry) -> Self {
        Self { registry }
    }

    /// Build the frame forest for a set of flattened files.
    ///
    /// Creates the hierarchy CODEBASE → LANGUAGE → PACKAGE... → CLASS/...
    /// and returns the codebase root. Files whose language has no registered
    /// handler are skipped with a warning.
    pub fn build(
        &self,
        ctx: &mut BuildContext,
        root_path: &str,
        file_raw_nodes: &BTreeMap<String, Vec<RawNode>>,
    ) -> FrameKey {
        let codebase_name = Path::new(root_path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| root_path.to_string());

        let mut codebase = Frame::new(FrameKind::Codebase)
            .with_name(codebase_name.clone())
            .with_qualified_name(codebase_name);
        codebase.compute_id();
        let codebase_key = ctx.arena.insert(codebase);

        ctx.codebase_root = root_path.to_string();
        ctx.stack.push_level(&ctx.arena, &[codebase_key]);

        // Group files by detected language
        let mut language_files: BTreeMap<String, Vec<&String>> = BTreeMap::new();
        for file_path in file_raw_nodes.keys() {
            match self.registry.detect_language(Path::new(file_path)) {
                Some(language) => language_files.entry(language).or_default().push(file_path),
                None => warn!(file = %file_path, "no handler for file, skipping"),
            }
        }

        for (language, files) in language_files {
            let Some(handler) = self.registry.get(&language) else {
                warn!(language = %language, "no handler registered, skipping language");
                continue;
            };

            let language_key = self.ensure_language_frame(ctx, &language, codebase_key);

            ctx.stack.push_level(&ctx.arena, &[language_key]);
            for file_path in files {
                if ctx.processed_files.contains(file_path) {
                    continue;
                }
                self.build_file(ctx, handler, file_path, &file_raw_nodes[file_path], &language);
                ctx.processed_files.insert(file_path.clone());
            }
            ctx.stack.pop_level();
        }

        ctx.stack.pop_level();
        codebase_key
    }

    /// Reuse or create the per-language root frame under the codebase.
    fn ensure_language_frame(
        &self,
        ctx: &mut BuildContext,
        language: &str,
        codebase_key: FrameKey,
    ) -> FrameKey {
        if let Some(&existing) = ctx.language_frames.get(language) {
            return existing;
        }

        let language_name = format!("{}_root", language);
        let codebase_qname = ctx.arena[codebase_key]
            .qualified_name
            .clone()
            .unwrap_or_default();

        let mut frame = Frame::new(FrameKind::Language)
            .with_name(language_name.clone())
            .with_qualified_name(format!("{}.{}", codebase_qname, language_name))
            .with_language(language);
        frame.compute_id();
        let key = ctx.arena.insert(frame);

        ctx.contain(codebase_key, key);
        ctx.language_frames.insert(language.to_string(), key);
        key
    }

    /// Build the hierarchy for one file: package frames from the file path,
    /// then the file's raw nodes. Children become direct descendants of the
    /// PACKAGE and LANGUAGE frames; there is no FILE frame.
    fn build_file(
        &self,
        ctx: &mut BuildContext,
        handler: &dyn LanguageHandler,
        file_path: &str,
        raw_nodes: &[RawNode],
        language: &str,
    ) {
        let package_key = self.create_package_hierarchy(ctx, handler, file_path, language);

        let mut processed: HashSet<usize> = HashSet::new();
        let all_indices: Vec<usize> = (0..raw_nodes.len()).collect();

        match package_key {
            // Package and language root are simultaneously active: top-level
            // frames in the file acquire both as parents
            Some(package) => {
                let language_key = ctx.language_frames[language];
                ctx.stack.push_level(&ctx.arena, &[package, language_key]);
                self.process_raw_nodes(ctx, handler, &all_indices, raw_nodes, language, &mut processed, 0);
                ctx.stack.pop_level();
            }
            // No package: nodes land directly in the enclosing language
            // level, which is already on the stack
            None => {
                self.process_raw_nodes(ctx, handler, &all_indices, raw_nodes, language, &mut processed, 0);
            }
        }
    }

    /// Materialize the package chain for a file path, deduplicated globally
    /// by qualified name. Returns the deepest package, or None when the
    /// handler derives no package parts.
    fn create_package_hierarchy(
        &self,
        ctx: &mut BuildContext,
        handler: &dyn LanguageHandler,
        file_path: &str,
        language: &str,
    ) -> Option<FrameKey> {
        let codebase_root = ctx.codebase_root.clone();
        let parts = handler.extract_package_hierarchy_from_path(file_path, &codebase_root);
        if parts.is_empty() {
            return None;
        }

        let mut current = *ctx.language_frames.get(language)?;

        for part in parts {
            let parent_qname = ctx.arena[current].qualified_name.clone().unwrap_or_default();
            let qualified_name = format!("{}{}{}", parent_qname, handler.separator(), part);

            if let Some(&existing) = ctx.package_registry.get(&qualified_name) {
                // Reuse; only add the parent link when it is new so the
                // language root does not accumulate duplicate edges
                ctx.contain(current, existing);
                current = existing;
                continue;
            }

            let mut package = Frame::new(FrameKind::Package)
                .with_name(part)
                .with_qualified_name(qualified_name.clone())
                .with_language(language)
                // Packages span the whole file; no meaningful range
                .with_location(file_path, 0, 0, 0, 0);
            package.compute_id();
            let key = ctx.arena.insert(package);

            ctx.package_registry.insert(qualified_name, key);
            ctx.contain(current, key);
            current = key;
        }

        Some(current)
    }

    /// Walk candidate nodes in order, materializing mapped ones.
    ///
    /// `indices` refer to `all_nodes`; `processed` tracks indices already
    /// claimed by an earlier frame's descent so they are not re-materialized
    /// at an outer level.
    fn process_raw_nodes(
        &self,
        ctx: &mut BuildContext,
        handler: &dyn LanguageHandler,
        indices: &[usize],
        all_nodes: &[RawNode],
        language: &str,
        processed: &mut HashSet<usize>,
        depth: usize,
    ) {
        for &index in indices {
            if processed.contains(&index) {
                continue;
            }
            let raw_node = &all_nodes[index];

            // Decision 1: does this raw node become a frame?
            let Some(kind) = handler.frame_mapping(&raw_node.node_type) else {
                continue;
            };

            let frame_key = self.materialize_frame(ctx, handler, raw_node, kind, language);
            ctx.add_child_to_current(frame_key);
            processed.insert(index);

            // Decision 2: does the frame open a new scope for its children?
            if kind.creates_scope() {
                ctx.stack.push_level(&ctx.arena, &[frame_key]);
                self.process_child_nodes(ctx, handler, index, all_nodes, language, processed, depth);
                ctx.stack.pop_level();
            }
        }
    }

    /// Collect and process the descendants of a scope-opening node.
    ///
    /// Drills through pass-through nodes (blocks and the like) to find
    /// semantic candidates, constrained to the parent's byte range, and stops
    /// descending at each semantic node so its own children are handled by
    /// its recursive scope.
    fn process_child_nodes(
        &self,
        ctx: &mut BuildContext,
        handler: &dyn LanguageHandler,
        parent_index: usize,
        all_nodes: &[RawNode],
        language: &str,
        processed: &mut HashSet<usize>,
        depth: usize,
    ) {
        if depth > ctx.tuning.max_recursion_depth {
            let node = &all_nodes[parent_index];
            error!(
                node_type = %node.node_type,
                line = node.start_line,
                "recursion limit exceeded, abandoning subtree"
            );
            return;
        }

        let parent = &all_nodes[parent_index];
        if parent.children.is_empty() {
            return;
        }

        let mut descendants: Vec<usize> = Vec::new();
        let mut collected: HashSet<usize> = HashSet::new();

        collect_candidates(
            handler,
            all_nodes,
            &parent.children,
            parent.start_byte,
            parent.end_byte,
            processed,
            &mut collected,
            &mut descendants,
        );

        self.process_raw_nodes(ctx, handler, &descendants, all_nodes, language, processed, depth + 1);

        // Claim everything this descent touched so outer levels skip it
        processed.extend(collected);
    }

    /// Create a frame for a raw node, deduplicating against the registries.
    ///
    /// Control-flow frames deduplicate by source location; semantic frames by
    /// qualified name. A reused frame whose text changed is refreshed in
    /// place and its stable id recomputed.
    fn materialize_frame(
        &self,
        ctx: &mut BuildContext,
        handler: &dyn LanguageHandler,
        raw_node: &RawNode,
        kind: FrameKind,
        language: &str,
    ) -> FrameKey {
        let name = self.extract_name(handler, raw_node, kind);
        let qualified_name = name.as_ref().map(|n| {
            let path = ctx.stack.context_path(&ctx.arena);
            handler.build_qualified_name(&path, n)
        });

        if kind.is_control_flow() {
            let location_key = format!(
                "{}:{}:{}",
                raw_node.file_path, raw_node.start_byte, raw_node.end_byte
            );
            if let Some(&existing) = ctx.control_flow_registry.get(&location_key) {
                self.refresh_if_changed(ctx, handler, existing, raw_node, kind, language);
                return existing;
            }
            let key = self.instantiate(ctx, handler, raw_node, kind, name, qualified_name, language);
            ctx.control_flow_registry.insert(location_key, key);
            return key;
        }

        if let Some(qname) = &qualified_name {
            let existing = match kind {
                FrameKind::Class => ctx.class_registry.get(qname).copied(),
                FrameKind::Callable => ctx.callable_registry.get(qname).copied(),
                FrameKind::Package => ctx.package_registry.get(qname).copied(),
                _ => None,
            };
            if let Some(existing) = existing {
                if ctx.arena[existing].kind == kind {
                    self.refresh_if_changed(ctx, handler, existing, raw_node, kind, language);
                    return existing;
                }
            }
        }

        let key = self.instantiate(ctx, handler, raw_node, kind, name, qualified_name.clone(), language);

        if let Some(qname) = qualified_name {
            match kind {
                FrameKind::Class => {
                    ctx.class_registry.insert(qname, key);
                }
                FrameKind::Callable => {
                    ctx.callable_registry.insert(qname, key);
                }
                FrameKind::Package => {
                    ctx.package_registry.insert(qname, key);
                }
                _ => {}
            }
        }

        key
    }

    fn instantiate(
        &self,
        ctx: &mut BuildContext,
        handler: &dyn LanguageHandler,
        raw_node: &RawNode,
        kind: FrameKind,
        name: Option<String>,
        qualified_name: Option<String>,
        language: &str,
    ) -> FrameKey {
        // Control flows keep only their statement line; semantic frames keep
        // full content
        let content = if kind.is_control_flow() {
            raw_node.content.lines().next().unwrap_or_default().to_string()
        } else {
            raw_node.content.clone()
        };

        let mut frame = Frame::new(kind)
            .with_language(language)
            .with_content(content)
            .with_location(
                &raw_node.file_path,
                raw_node.start_line,
                raw_node.end_line,
                raw_node.start_byte,
                raw_node.end_byte,
            )
            .with_payload(extract_payload(handler, kind, &raw_node.content));

        frame.name = name;
        frame.qualified_name = qualified_name;
        frame.compute_id();

        ctx.arena.insert(frame)
    }

    /// Refresh a reused frame whose source text changed since it was built.
    fn refresh_if_changed(
        &self,
        ctx: &mut BuildContext,
        handler: &dyn LanguageHandler,
        key: FrameKey,
        raw_node: &RawNode,
        kind: FrameKind,
        _language: &str,
    ) {
        let changed = ctx.arena[key].content.as_deref() != Some(raw_node.content.as_str());
        if !changed {
            return;
        }

        let old_id = ctx.arena[key].id.clone();
        {
            let frame = ctx.arena.get_mut(key);
            frame.content = Some(if kind.is_control_flow() {
                raw_node.content.lines().next().unwrap_or_default().to_string()
            } else {
                raw_node.content.clone()
            });
            frame.start_line = raw_node.start_line;
            frame.end_line = raw_node.end_line;
            frame.start_byte = raw_node.start_byte;
            frame.end_byte = raw_node.end_byte;
            frame.payload = extract_payload(handler, kind, &raw_node.content);
            frame.compute_id();
        }
        ctx.arena.reindex(key, &old_id);
    }

    fn extract_name(
        &self,
        handler: &dyn LanguageHandler,
        raw_node: &RawNode,
        kind: FrameKind,
    ) -> Option<String> {
        if raw_node.content.trim().is_empty() {
            return None;
        }

        if kind.has_semantic_name() {
            return match kind {
                FrameKind::Class => handler.extract_class_name(&raw_node.content),
                FrameKind::Callable => handler.extract_callable_name(&raw_node.content),
                FrameKind::Package => handler.extract_package_name(&raw_node.content),
                _ => None,
            };
        }

        // Control flow: positional names keep same-line blocks in different
        // files and columns distinct
        if kind.is_control_flow() {
            return Some(format!(
                "{}_line_{}_byte_{}",
                kind.as_str().to_lowercase(),
                raw_node.start_line,
                raw_node.start_byte
            ));
        }

        None
    }
}

/// Collect frame candidates among a node's descendants: semantic nodes stop
/// the descent, pass-through nodes are drilled into, and anything outside
/// the parent's byte range or already claimed is skipped.
#[allow(clippy::too_many_arguments)]
fn collect_candidates(
    handler: &dyn LanguageHandler,
    all_nodes: &[RawNode],
    children: &[usize],
    start_byte: usize,
    end_byte: usize,
    processed: &HashSet<usize>,
    collected: &mut HashSet<usize>,
    out: &mut Vec<usize>,
) {
    for &index in children {
        if index >= all_nodes.len() || collected.contains(&index) || processed.contains(&index) {
            continue;
        }
        let node = &all_nodes[index];
        if node.start_byte < start_byte || node.end_byte > end_byte {
            continue;
        }

        out.push(index);
        collected.insert(index);

        // Semantic nodes handle their own children when pushed; only drill
        // into pass-through nodes
        if handler.frame_mapping(&node.node_type).is_none() {
            collect_candidates(
                handler,
                all_nodes,
                &node.children,
                start_byte,
                end_byte,
                processed,
                collected,
                out,
            );
        }
    }
}

fn extract_payload(handler: &dyn LanguageHandler, kind: FrameKind, content: &str) -> FramePayload {
    match kind {
        FrameKind::Class => FramePayload::Class {
            instance_fields: handler.extract_instance_fields(content),
            static_fields: handler.extract_static_fields(content),
        },
        FrameKind::Callable => FramePayload::Callable {
            parameters: handler.extract_parameters(content),
            return_type: handler.extract_return_type(content),
        },
        _ => FramePayload::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Tuning;
    use crate::edge::EdgeKind;
    use crate::parse::SourceParser;

    fn build_python(sources: &[(&str, &str)]) -> (BuildContext, FrameKey) {
        let registry = HandlerRegistry::with_builtin_handlers();
        let mut parser = SourceParser::new(&registry).unwrap();

        let mut file_raw_nodes = BTreeMap::new();
        for (path, source) in sources {
            let nodes = parser.extract_raw_nodes("python", path, source).unwrap();
            file_raw_nodes.insert(path.to_string(), nodes);
        }

        let mut ctx = BuildContext::new(Tuning::default());
        let builder = GraphBuilder::new(&registry);
        let codebase = builder.build(&mut ctx, "repo", &file_raw_nodes);
        (ctx, codebase)
    }

    fn find_by_qname(ctx: &BuildContext, qname: &str) -> Option<FrameKey> {
        ctx.arena
            .iter()
            .find(|(_, f)| f.qualified_name.as_deref() == Some(qname))
            .map(|(k, _)| k)
    }

    #[test]
    fn test_hierarchy_codebase_language_package_class() {
        let source = "class Foo:\n    def bar(self):\n        pass\n";
        let (ctx, codebase) = build_python(&[("src/pkg/mod.py", source)]);

        let lang = ctx.language_frames["python"];
        let codebase_id = ctx.arena[codebase].id.clone();
        assert!(ctx.arena[lang].has_parent(&codebase_id));

        let pkg = find_by_qname(&ctx, "repo.python_root.pkg").expect("package frame");
        assert_eq!(ctx.arena[pkg].kind, FrameKind::Package);

        let class = find_by_qname(&ctx, "repo.python_root.pkg.Foo").expect("class frame");
        let method = find_by_qname(&ctx, "repo.python_root.pkg.Foo.bar").expect("method frame");

        assert!(ctx.arena.is_descendant_of(class, pkg));
        assert!(ctx.arena.is_descendant_of(method, class));
    }

    #[test]
    fn test_sibling_methods_not_nested() {
        let source = "class C:\n    def first(self):\n        pass\n    def second(self):\n        pass\n";
        let (ctx, _) = build_python(&[("src/pkg/mod.py", source)]);

        let class = find_by_qname(&ctx, "repo.python_root.pkg.C").unwrap();
        let first = find_by_qname(&ctx, "repo.python_root.pkg.C.first").unwrap();
        let second = find_by_qname(&ctx, "repo.python_root.pkg.C.second").unwrap();

        // Both methods are direct children of the class, not of each other
        assert!(ctx.arena[class].children().contains(&first));
        assert!(ctx.arena[class].children().contains(&second));
        assert!(!ctx.arena[first].children().contains(&second));
    }

    #[test]
    fn test_control_flow_nested_in_callable() {
        let source = "def f(x):\n    if x:\n        return 1\n    return 2\n";
        let (ctx, _) = build_python(&[("src/pkg/mod.py", source)]);

        let func = find_by_qname(&ctx, "repo.python_root.pkg.f").unwrap();
        let if_blocks = ctx.arena.children_of_kind(func, FrameKind::IfBlock);
        assert_eq!(if_blocks.len(), 1);
        assert_eq!(ctx.arena[if_blocks[0]].provenance, crate::frame::Provenance::Parsed);
    }

    #[test]
    fn test_contains_edges_created() {
        let source = "def f():\n    pass\n";
        let (ctx, _) = build_python(&[("src/pkg/mod.py", source)]);

        let func = find_by_qname(&ctx, "repo.python_root.pkg.f").unwrap();
        let func_id = ctx.arena[func].id.clone();
        let has_contains = ctx
            .edges
            .iter()
            .any(|e| e.kind == EdgeKind::Contains && e.object == func_id);
        assert!(has_contains);
    }

    #[test]
    fn test_package_dedup_across_files() {
        let (ctx, _) = build_python(&[
            ("src/pkg/a.py", "def fa():\n    pass\n"),
            ("src/pkg/b.py", "def fb():\n    pass\n"),
        ]);

        let packages: Vec<_> = ctx
            .arena
            .iter()
            .filter(|(_, f)| f.kind == FrameKind::Package)
            .collect();
        assert_eq!(packages.len(), 1);

        let pkg = packages[0].0;
        let names: Vec<_> = ctx.arena[pkg]
            .children()
            .iter()
            .map(|&c| ctx.arena[c].name.clone().unwrap_or_default())
            .collect();
        assert!(names.contains(&"fa".to_string()));
        assert!(names.contains(&"fb".to_string()));
    }

    #[test]
    fn test_file_without_package_lands_in_language_root() {
        let (ctx, _) = build_python(&[("standalone.py", "def top():\n    pass\n")]);

        // No package on the path: the context path is empty, so the
        // qualified name is the bare name
        let lang = ctx.language_frames["python"];
        let func = find_by_qname(&ctx, "top").expect("function frame");
        assert!(ctx.arena[lang].children().contains(&func));
        assert_eq!(ctx.arena.primary_parent(func), Some(lang));
    }

    #[test]
    fn test_packaged_frame_has_package_and_language_parents() {
        let (ctx, _) = build_python(&[("src/pkg/mod.py", "class Foo:\n    pass\n")]);

        let class = find_by_qname(&ctx, "repo.python_root.pkg.Foo").unwrap();
        let pkg = find_by_qname(&ctx, "repo.python_root.pkg").unwrap();
        let lang = ctx.language_frames["python"];

        assert_eq!(ctx.arena[class].parents().len(), 2);
        // Package is more specific, so it is attached first and is primary
        assert_eq!(ctx.arena.primary_parent(class), Some(pkg));
        assert!(ctx.arena[class].parents().contains(&lang));
    }
}

//! Construction context: scope stack and shared build state
//!
//! The scope stack holds one map per level so several frames can be active at
//! once (a PACKAGE and its LANGUAGE root, for instance); adding a child to
//! the current scope attaches it to every active frame, which is how a frame
//! acquires multiple parents. The build context owns the arena, the stack,
//! the deduplication registries, and the edge list, and is passed by mutable
//! reference through every construction call - never a global.

use std::collections::{HashMap, HashSet};

use crate::confidence::{edge_confidence, scope_distance_adjustment};
use crate::config::Tuning;
use crate::edge::{Edge, EdgeKind};
use crate::frame::FrameKind;
use crate::graph::{FrameArena, FrameKey};

/// Resolution order for picking the most semantically specific frame at a
/// scope level.
const PRIORITY_ORDER: &[FrameKind] = &[
    FrameKind::Callable,
    FrameKind::Class,
    FrameKind::Package,
    FrameKind::Language,
    FrameKind::Codebase,
];

/// Frame kinds whose names participate in qualified-name paths.
const SEMANTIC_PATH_KINDS: &[FrameKind] = &[FrameKind::Callable, FrameKind::Class, FrameKind::Package];

/// Stack of active scope levels used during construction.
///
/// Each level maps frame kind to the active frame of that kind, so one level
/// can hold several simultaneously active parents.
#[derive(Debug, Default)]
pub struct ScopeStack {
    levels: Vec<HashMap<FrameKind, FrameKey>>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Push a new level holding the given frames (keyed by their kind).
    pub fn push_level(&mut self, arena: &FrameArena, frames: &[FrameKey]) {
        let mut level = HashMap::new();
        for &key in frames {
            level.insert(arena[key].kind, key);
        }
        self.levels.push(level);
    }

    /// Pop the top level. Builder call sites pop on every exit path.
    pub fn pop_level(&mut self) -> Option<HashMap<FrameKind, FrameKey>> {
        self.levels.pop()
    }

    /// All frames active at the top level.
    pub fn current_level(&self) -> Option<&HashMap<FrameKind, FrameKey>> {
        self.levels.last()
    }

    /// Frames at the top level, most semantically specific first.
    ///
    /// Attachment order matters: the first parent attached becomes the
    /// child's primary parent, which must be the package rather than the
    /// language root when both are active.
    pub fn current_level_by_priority(&self) -> Vec<FrameKey> {
        let Some(level) = self.levels.last() else {
            return Vec::new();
        };
        let mut ordered = Vec::with_capacity(level.len());
        for kind in PRIORITY_ORDER {
            if let Some(&key) = level.get(kind) {
                ordered.push(key);
            }
        }
        for (kind, &key) in level {
            if !PRIORITY_ORDER.contains(kind) {
                ordered.push(key);
            }
        }
        ordered
    }

    /// The most semantically specific active frame, by fixed priority
    /// (CALLABLE > CLASS > PACKAGE > LANGUAGE > CODEBASE).
    pub fn current(&self) -> Option<FrameKey> {
        let level = self.levels.last()?;
        for kind in PRIORITY_ORDER {
            if let Some(&key) = level.get(kind) {
                return Some(key);
            }
        }
        level.values().next().copied()
    }

    /// Active frame of a specific kind at the top level.
    pub fn current_of_kind(&self, kind: FrameKind) -> Option<FrameKey> {
        self.levels.last()?.get(&kind).copied()
    }

    /// Innermost active frame of a kind anywhere on the stack.
    pub fn nearest_of_kind(&self, kind: FrameKind) -> Option<FrameKey> {
        self.levels.iter().rev().find_map(|level| level.get(&kind).copied())
    }

    /// The root (bottom) frame.
    pub fn root(&self) -> Option<FrameKey> {
        self.levels.first()?.values().next().copied()
    }

    /// Scoped symbol lookup, innermost level first.
    ///
    /// Within a level, frame kinds are tried in priority order; the returned
    /// confidence is the symbol's own confidence decayed by how many levels
    /// were skipped.
    pub fn lookup_symbol(
        &self,
        arena: &FrameArena,
        name: &str,
        tuning: &Tuning,
    ) -> Option<(FrameKey, f32)> {
        for (distance, level) in self.levels.iter().rev().enumerate() {
            for kind in PRIORITY_ORDER {
                let Some(&frame) = level.get(kind) else {
                    continue;
                };
                if let Some(symbol) = arena.find_child_by_name(frame, name) {
                    let confidence =
                        scope_distance_adjustment(arena[symbol].confidence, distance, tuning);
                    return Some((symbol, confidence));
                }
            }
        }
        None
    }

    /// Ordered name path for qualified-name construction.
    ///
    /// Takes CALLABLE/CLASS/PACKAGE names per level, outermost first. PACKAGE
    /// contributes its qualified name so same-named packages in sibling trees
    /// cannot collide.
    pub fn context_path(&self, arena: &FrameArena) -> Vec<String> {
        let mut path = Vec::new();
        for level in &self.levels {
            for kind in SEMANTIC_PATH_KINDS {
                let Some(&key) = level.get(kind) else {
                    continue;
                };
                let frame = &arena[key];
                if *kind == FrameKind::Package {
                    if let Some(qname) = &frame.qualified_name {
                        path.push(qname.clone());
                        break;
                    }
                }
                if let Some(name) = &frame.name {
                    path.push(name.clone());
                    break;
                }
            }
        }
        path
    }
}

/// Shared state for one build session.
///
/// Single source of truth for edge ids, deduplication registries, and the
/// frame arena; shared by the builder and the resolver so neither duplicates
/// state.
pub struct BuildContext {
    pub arena: FrameArena,
    pub stack: ScopeStack,
    pub tuning: Tuning,

    /// All edges produced so far (CONTAINS during build, cross-reference
    /// edges during resolution).
    pub edges: Vec<Edge>,
    edge_id_counter: u64,

    /// language name → language root frame
    pub language_frames: HashMap<String, FrameKey>,
    /// qualified name → frame, per dedup-relevant kind
    pub package_registry: HashMap<String, FrameKey>,
    pub class_registry: HashMap<String, FrameKey>,
    pub callable_registry: HashMap<String, FrameKey>,
    /// file:start:end location key → control-flow frame
    pub control_flow_registry: HashMap<String, FrameKey>,

    /// Frames synthesized for unresolved/external references; not part of
    /// the containment hierarchy.
    pub external_frames: Vec<FrameKey>,

    pub processed_files: HashSet<String>,
    pub codebase_root: String,
}

impl BuildContext {
    pub fn new(tuning: Tuning) -> Self {
        Self {
            arena: FrameArena::new(),
            stack: ScopeStack::new(),
            tuning,
            edges: Vec::new(),
            edge_id_counter: 0,
            language_frames: HashMap::new(),
            package_registry: HashMap::new(),
            class_registry: HashMap::new(),
            callable_registry: HashMap::new(),
            control_flow_registry: HashMap::new(),
            external_frames: Vec::new(),
            processed_files: HashSet::new(),
            codebase_root: String::new(),
        }
    }

    pub fn next_edge_id(&mut self) -> u64 {
        self.edge_id_counter += 1;
        self.edge_id_counter
    }

    /// Record an edge between two frames already in the arena; returns the
    /// edge id.
    pub fn push_edge(
        &mut self,
        subject: FrameKey,
        object: FrameKey,
        kind: EdgeKind,
        confidence: f32,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> u64 {
        let id = self.next_edge_id();
        let edge = Edge::new(
            id,
            self.arena[subject].id.clone(),
            self.arena[object].id.clone(),
            kind,
            confidence,
        )
        .with_metadata(metadata);
        self.edges.push(edge);
        id
    }

    /// Attach `child` to a parent and record the CONTAINS edge, unless the
    /// child is already attached there.
    pub fn contain(&mut self, parent: FrameKey, child: FrameKey) {
        if self.arena[parent].children().contains(&child) {
            return;
        }
        self.arena.attach(parent, child);
        let confidence = edge_confidence(
            EdgeKind::Contains,
            self.arena[parent].confidence,
            self.arena[child].confidence,
            &self.tuning,
        );
        self.push_edge(parent, child, EdgeKind::Contains, confidence, serde_json::Map::new());
    }

    /// Attach `child` to every frame active at the current scope level.
    ///
    /// This is what gives a single child multiple parents when a level holds
    /// several active frames; the most specific one is attached first and
    /// becomes the primary parent.
    pub fn add_child_to_current(&mut self, child: FrameKey) {
        for parent in self.stack.current_level_by_priority() {
            self.contain(parent, child);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;

    fn ctx() -> BuildContext {
        BuildContext::new(Tuning::default())
    }

    fn frame(ctx: &mut BuildContext, kind: FrameKind, name: &str) -> FrameKey {
        let mut f = Frame::new(kind)
            .with_name(name)
            .with_qualified_name(format!("repo.{}", name))
            .with_location("test.py", 1, 1, 0, 0);
        f.compute_id();
        ctx.arena.insert(f)
    }

    #[test]
    fn test_current_priority_order() {
        let mut ctx = ctx();
        let pkg = frame(&mut ctx, FrameKind::Package, "pkg");
        let lang = frame(&mut ctx, FrameKind::Language, "python_root");

        ctx.stack.push_level(&ctx.arena, &[lang, pkg]);
        assert_eq!(ctx.stack.current(), Some(pkg));

        let class = frame(&mut ctx, FrameKind::Class, "Foo");
        ctx.stack.push_level(&ctx.arena, &[class]);
        assert_eq!(ctx.stack.current(), Some(class));
    }

    #[test]
    fn test_add_child_to_current_multi_parent() {
        let mut ctx = ctx();
        let pkg = frame(&mut ctx, FrameKind::Package, "pkg");
        let lang = frame(&mut ctx, FrameKind::Language, "python_root");
        let class = frame(&mut ctx, FrameKind::Class, "Foo");

        ctx.stack.push_level(&ctx.arena, &[lang, pkg]);
        ctx.add_child_to_current(class);

        assert_eq!(ctx.arena[class].parents().len(), 2);
        let contains_edges = ctx.edges.iter().filter(|e| e.kind == EdgeKind::Contains).count();
        assert_eq!(contains_edges, 2);

        // Idempotent: re-adding creates nothing new
        ctx.add_child_to_current(class);
        assert_eq!(ctx.edges.len(), 2);
    }

    #[test]
    fn test_lookup_symbol_scope_decay() {
        let mut ctx = ctx();
        let pkg = frame(&mut ctx, FrameKind::Package, "pkg");
        let class = frame(&mut ctx, FrameKind::Class, "Foo");
        let helper = frame(&mut ctx, FrameKind::Callable, "helper");
        ctx.arena.attach(pkg, helper);

        ctx.stack.push_level(&ctx.arena, &[pkg]);
        ctx.stack.push_level(&ctx.arena, &[class]);

        // helper lives one level out, so its confidence decays once
        let (found, confidence) = ctx.stack.lookup_symbol(&ctx.arena, "helper", &ctx.tuning).unwrap();
        assert_eq!(found, helper);
        assert!((confidence - 0.95).abs() < 1e-6);

        assert!(ctx.stack.lookup_symbol(&ctx.arena, "missing", &ctx.tuning).is_none());
    }

    #[test]
    fn test_context_path_uses_package_qualified_name() {
        let mut ctx = ctx();
        let pkg = frame(&mut ctx, FrameKind::Package, "pkg");
        let class = frame(&mut ctx, FrameKind::Class, "Foo");

        ctx.stack.push_level(&ctx.arena, &[pkg]);
        ctx.stack.push_level(&ctx.arena, &[class]);

        assert_eq!(
            ctx.stack.context_path(&ctx.arena),
            vec!["repo.pkg".to_string(), "Foo".to_string()]
        );
    }

    #[test]
    fn test_pop_restores_previous_level() {
        let mut ctx = ctx();
        let pkg = frame(&mut ctx, FrameKind::Package, "pkg");
        let class = frame(&mut ctx, FrameKind::Class, "Foo");

        ctx.stack.push_level(&ctx.arena, &[pkg]);
        ctx.stack.push_level(&ctx.arena, &[class]);
        ctx.stack.pop_level();

        assert_eq!(ctx.stack.current(), Some(pkg));
    }
}

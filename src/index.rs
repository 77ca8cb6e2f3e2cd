//! Frame index - lazily rebuilt lookups over one language-root subtree
//!
//! One index instance per language root. Rather than maintaining the maps
//! incrementally, the index carries a dirty flag and rebuilds all four maps
//! in a single depth-first walk when next queried.

use std::collections::{HashMap, HashSet};

use crate::frame::{FrameId, FrameKind};
use crate::graph::{FrameArena, FrameKey};

/// Lazily rebuilt lookup structure for a language subtree.
#[derive(Debug)]
pub struct FrameIndex {
    root: FrameKey,

    by_id: HashMap<FrameId, FrameKey>,
    by_qualified_name: HashMap<String, FrameKey>,
    by_kind: HashMap<FrameKind, Vec<FrameKey>>,
    // Names are not unique, so this is a list
    by_name: HashMap<String, Vec<FrameKey>>,

    dirty: bool,
}

impl FrameIndex {
    pub fn new(root: FrameKey) -> Self {
        Self {
            root,
            by_id: HashMap::new(),
            by_qualified_name: HashMap::new(),
            by_kind: HashMap::new(),
            by_name: HashMap::new(),
            dirty: true,
        }
    }

    pub fn root(&self) -> FrameKey {
        self.root
    }

    /// Mark the index as needing a rebuild.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn rebuild_if_dirty(&mut self, arena: &FrameArena) {
        if self.dirty {
            self.rebuild(arena);
            self.dirty = false;
        }
    }

    fn rebuild(&mut self, arena: &FrameArena) {
        self.by_id.clear();
        self.by_qualified_name.clear();
        self.by_kind.clear();
        self.by_name.clear();

        let mut visited = HashSet::new();
        self.index_recursive(arena, self.root, &mut visited);
    }

    fn index_recursive(&mut self, arena: &FrameArena, key: FrameKey, visited: &mut HashSet<FrameKey>) {
        if !visited.insert(key) {
            return;
        }
        let frame = &arena[key];

        self.by_id.insert(frame.id.clone(), key);
        if let Some(qname) = &frame.qualified_name {
            self.by_qualified_name.insert(qname.clone(), key);
        }
        self.by_kind.entry(frame.kind).or_default().push(key);
        if let Some(name) = &frame.name {
            self.by_name.entry(name.clone()).or_default().push(key);
        }

        for child in frame.children().to_vec() {
            self.index_recursive(arena, child, visited);
        }
    }

    pub fn find_by_id(&mut self, arena: &FrameArena, id: &FrameId) -> Option<FrameKey> {
        self.rebuild_if_dirty(arena);
        self.by_id.get(id).copied()
    }

    pub fn find_by_qualified_name(&mut self, arena: &FrameArena, qname: &str) -> Option<FrameKey> {
        self.rebuild_if_dirty(arena);
        self.by_qualified_name.get(qname).copied()
    }

    pub fn find_by_kind(&mut self, arena: &FrameArena, kind: FrameKind) -> Vec<FrameKey> {
        self.rebuild_if_dirty(arena);
        self.by_kind.get(&kind).cloned().unwrap_or_default()
    }

    pub fn find_by_name(&mut self, arena: &FrameArena, name: &str) -> Vec<FrameKey> {
        self.rebuild_if_dirty(arena);
        self.by_name.get(name).cloned().unwrap_or_default()
    }

    /// All frames of `kind` within the subtree rooted at `subtree_root`,
    /// filtered from the by-kind list through the ancestry check.
    pub fn find_in_subtree(
        &mut self,
        arena: &FrameArena,
        subtree_root: FrameKey,
        kind: FrameKind,
    ) -> Vec<FrameKey> {
        self.rebuild_if_dirty(arena);
        self.by_kind
            .get(&kind)
            .map(|keys| {
                keys.iter()
                    .copied()
                    .filter(|k| *k == subtree_root || arena.is_descendant_of(*k, subtree_root))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Diagnostic integrity check; not used on the hot path.
    ///
    /// Verifies that every parent-side and child-side link is mirrored on the
    /// other side, that the parent views agree with each other, and that no
    /// two frames share a qualified name.
    pub fn verify_integrity(&mut self, arena: &FrameArena) -> Vec<String> {
        self.rebuild_if_dirty(arena);
        let mut issues = Vec::new();

        for &key in self.by_id.values() {
            let frame = &arena[key];

            for &child in frame.children() {
                if !arena[child].has_parent(&frame.id) {
                    issues.push(format!(
                        "frame {} ({}:{}) lists child {} that does not link back",
                        frame.id,
                        frame.kind,
                        frame.name.as_deref().unwrap_or("?"),
                        arena[child].id,
                    ));
                }
            }

            for &parent in frame.parents() {
                if !arena[parent].children().contains(&key) {
                    issues.push(format!(
                        "frame {} ({}:{}) lists parent {} that does not link back",
                        frame.id,
                        frame.kind,
                        frame.name.as_deref().unwrap_or("?"),
                        arena[parent].id,
                    ));
                }
            }

            if frame.parents().len() != frame.parent_count_by_id() {
                issues.push(format!(
                    "frame {} has {} parents in list but {} in id map",
                    frame.id,
                    frame.parents().len(),
                    frame.parent_count_by_id(),
                ));
            }
        }

        // A qualified name indexed to a different frame than the one that
        // carries it means two frames share that name.
        for &key in self.by_id.values() {
            let frame = &arena[key];
            if let Some(qname) = &frame.qualified_name {
                if let Some(&indexed) = self.by_qualified_name.get(qname) {
                    if indexed != key {
                        issues.push(format!("duplicate qualified name: {}", qname));
                    }
                }
            }
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;

    fn frame(arena: &mut FrameArena, kind: FrameKind, name: &str, qname: &str) -> FrameKey {
        let mut f = Frame::new(kind)
            .with_name(name)
            .with_qualified_name(qname)
            .with_location("test.py", 1, 1, 0, 0);
        f.compute_id();
        arena.insert(f)
    }

    fn sample_tree(arena: &mut FrameArena) -> (FrameKey, FrameKey, FrameKey, FrameKey) {
        let lang = frame(arena, FrameKind::Language, "python_root", "repo.python_root");
        let pkg = frame(arena, FrameKind::Package, "pkg", "repo.python_root.pkg");
        let class = frame(arena, FrameKind::Class, "Foo", "repo.python_root.pkg.Foo");
        let method = frame(arena, FrameKind::Callable, "bar", "repo.python_root.pkg.Foo.bar");

        arena.attach(lang, pkg);
        arena.attach(pkg, class);
        arena.attach(class, method);

        (lang, pkg, class, method)
    }

    #[test]
    fn test_lookup_after_rebuild() {
        let mut arena = FrameArena::new();
        let (lang, _pkg, class, method) = sample_tree(&mut arena);

        let mut index = FrameIndex::new(lang);

        assert_eq!(
            index.find_by_qualified_name(&arena, "repo.python_root.pkg.Foo"),
            Some(class)
        );
        assert_eq!(index.find_by_kind(&arena, FrameKind::Callable), vec![method]);
        assert_eq!(index.find_by_name(&arena, "bar"), vec![method]);
    }

    #[test]
    fn test_dirty_flag_picks_up_new_frames() {
        let mut arena = FrameArena::new();
        let (lang, pkg, _class, _method) = sample_tree(&mut arena);

        let mut index = FrameIndex::new(lang);
        assert_eq!(index.find_by_kind(&arena, FrameKind::Class).len(), 1);

        let extra = frame(&mut arena, FrameKind::Class, "Baz", "repo.python_root.pkg.Baz");
        arena.attach(pkg, extra);

        // Stale until marked dirty
        assert_eq!(index.find_by_kind(&arena, FrameKind::Class).len(), 1);
        index.mark_dirty();
        assert_eq!(index.find_by_kind(&arena, FrameKind::Class).len(), 2);
    }

    #[test]
    fn test_find_in_subtree() {
        let mut arena = FrameArena::new();
        let (lang, pkg, class, method) = sample_tree(&mut arena);

        let other_pkg = frame(&mut arena, FrameKind::Package, "other", "repo.python_root.other");
        let other_fn = frame(
            &mut arena,
            FrameKind::Callable,
            "loose",
            "repo.python_root.other.loose",
        );
        arena.attach(lang, other_pkg);
        arena.attach(other_pkg, other_fn);

        let mut index = FrameIndex::new(lang);
        assert_eq!(index.find_in_subtree(&arena, class, FrameKind::Callable), vec![method]);
        let in_pkg = index.find_in_subtree(&arena, pkg, FrameKind::Callable);
        assert_eq!(in_pkg, vec![method]);
    }

    #[test]
    fn test_integrity_clean_tree() {
        let mut arena = FrameArena::new();
        let (lang, ..) = sample_tree(&mut arena);
        let mut index = FrameIndex::new(lang);
        assert!(index.verify_integrity(&arena).is_empty());
    }
}

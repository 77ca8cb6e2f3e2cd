//! Frame arena - owned storage and ownership operations for the frame graph
//!
//! All frames live in one owned collection and reference each other through
//! [`FrameKey`] indices, so identity comparison is O(1) and there are no
//! ownership cycles to manage. Parent links are kept in three synchronized
//! views on each frame (by id, by qualified name, ordered list); `attach` is
//! the only mutator and keeps both sides consistent.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::frame::{Frame, FrameId, FrameKind};

/// Index of a frame inside a [`FrameArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameKey(pub u32);

impl FrameKey {
    fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Owned collection of frames plus the parent/child relation between them.
#[derive(Debug, Default)]
pub struct FrameArena {
    frames: Vec<Frame>,
    by_id: HashMap<FrameId, FrameKey>,
}

impl FrameArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frames in the arena.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Insert a frame. The frame's id must already be computed.
    pub fn insert(&mut self, frame: Frame) -> FrameKey {
        let key = FrameKey(self.frames.len() as u32);
        self.by_id.insert(frame.id.clone(), key);
        self.frames.push(frame);
        key
    }

    pub fn get(&self, key: FrameKey) -> &Frame {
        &self.frames[key.index()]
    }

    pub fn get_mut(&mut self, key: FrameKey) -> &mut Frame {
        &mut self.frames[key.index()]
    }

    pub fn key_of(&self, id: &FrameId) -> Option<FrameKey> {
        self.by_id.get(id).copied()
    }

    /// Re-index a frame whose stable id changed (content refresh on reuse).
    pub fn reindex(&mut self, key: FrameKey, old_id: &FrameId) {
        if self.by_id.get(old_id) == Some(&key) {
            self.by_id.remove(old_id);
        }
        let new_id = self.frames[key.index()].id.clone();
        self.by_id.insert(new_id, key);
    }

    pub fn iter(&self) -> impl Iterator<Item = (FrameKey, &Frame)> {
        self.frames
            .iter()
            .enumerate()
            .map(|(i, f)| (FrameKey(i as u32), f))
    }

    /// Attach `child` under `parent`.
    ///
    /// Idempotent and bidirectional: updates the parent's children list and
    /// all three parent-side views on the child atomically. Does not create
    /// CONTAINS edges; that is the builder's job.
    pub fn attach(&mut self, parent: FrameKey, child: FrameKey) {
        if parent == child {
            return;
        }

        let (parent_id, parent_qname) = {
            let p = &self.frames[parent.index()];
            (p.id.clone(), p.qualified_name.clone())
        };

        let child_frame = &mut self.frames[child.index()];
        if !child_frame.parents_by_id.contains_key(&parent_id) {
            child_frame.parents_by_id.insert(parent_id, parent);
            if let Some(qname) = parent_qname {
                child_frame.parents_by_qualified_name.insert(qname, parent);
            }
            child_frame.parents.push(parent);
        }

        let parent_frame = &mut self.frames[parent.index()];
        if !parent_frame.children.contains(&child) {
            parent_frame.children.push(child);
        }
    }

    /// Attach with cycle detection.
    ///
    /// Returns false and leaves the graph unchanged if `child` is already an
    /// ancestor of `parent`. Callers must check the return value; no panic,
    /// no error.
    pub fn attach_checked(&mut self, parent: FrameKey, child: FrameKey) -> bool {
        if parent == child || self.is_descendant_of(parent, child) {
            return false;
        }
        self.attach(parent, child);
        true
    }

    /// Primary parent: the first parent ever attached.
    pub fn primary_parent(&self, key: FrameKey) -> Option<FrameKey> {
        self.frames[key.index()].parents.first().copied()
    }

    /// First parent of the given kind, in attachment order.
    pub fn parent_of_kind(&self, key: FrameKey, kind: FrameKind) -> Option<FrameKey> {
        self.frames[key.index()]
            .parents
            .iter()
            .copied()
            .find(|p| self.frames[p.index()].kind == kind)
    }

    /// All parents of the given kind, in attachment order.
    pub fn parents_of_kind(&self, key: FrameKey, kind: FrameKind) -> Vec<FrameKey> {
        self.frames[key.index()]
            .parents
            .iter()
            .copied()
            .filter(|p| self.frames[p.index()].kind == kind)
            .collect()
    }

    /// Whether `key` is a descendant of `ancestor` via any parent path.
    ///
    /// BFS over all parents with a visited set, so multi-parent diamonds
    /// terminate.
    pub fn is_descendant_of(&self, key: FrameKey, ancestor: FrameKey) -> bool {
        let mut visited = HashSet::new();
        let mut queue: VecDeque<FrameKey> = self.frames[key.index()].parents.iter().copied().collect();

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            if current == ancestor {
                return true;
            }
            queue.extend(self.frames[current.index()].parents.iter().copied());
        }
        false
    }

    /// All descendants in depth-first order.
    ///
    /// Traverses children only; children form a DAG by construction, but a
    /// visited set still guards multi-parent re-visits.
    pub fn walk_descendants(&self, key: FrameKey) -> Vec<FrameKey> {
        let mut result = Vec::new();
        let mut visited = HashSet::new();
        self.walk_descendants_into(key, &mut result, &mut visited);
        result
    }

    fn walk_descendants_into(
        &self,
        key: FrameKey,
        result: &mut Vec<FrameKey>,
        visited: &mut HashSet<FrameKey>,
    ) {
        for child in self.frames[key.index()].children.clone() {
            if !visited.insert(child) {
                continue;
            }
            result.push(child);
            self.walk_descendants_into(child, result, visited);
        }
    }

    /// Minimum depth across all parent paths; roots are depth 0.
    pub fn depth(&self, key: FrameKey) -> usize {
        let parents = &self.frames[key.index()].parents;
        parents
            .iter()
            .map(|p| self.depth(*p) + 1)
            .min()
            .unwrap_or(0)
    }

    /// Direct child with the given name.
    pub fn find_child_by_name(&self, key: FrameKey, name: &str) -> Option<FrameKey> {
        self.frames[key.index()]
            .children
            .iter()
            .copied()
            .find(|c| self.frames[c.index()].name.as_deref() == Some(name))
    }

    /// Direct children of a given kind.
    pub fn children_of_kind(&self, key: FrameKey, kind: FrameKind) -> Vec<FrameKey> {
        self.frames[key.index()]
            .children
            .iter()
            .copied()
            .filter(|c| self.frames[c.index()].kind == kind)
            .collect()
    }

    /// Ancestor chain used for qualified-name mangling.
    ///
    /// Follows only CALLABLE → CLASS → PACKAGE parents (in that priority at
    /// each step), skipping structural containers (LANGUAGE, CODEBASE).
    /// Returned root-first.
    pub fn mangling_chain(&self, key: FrameKey) -> Vec<FrameKey> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        self.mangling_chain_into(key, &mut chain, &mut visited);
        chain
    }

    fn mangling_chain_into(
        &self,
        key: FrameKey,
        chain: &mut Vec<FrameKey>,
        visited: &mut HashSet<FrameKey>,
    ) {
        if !visited.insert(key) {
            return;
        }
        for kind in [FrameKind::Callable, FrameKind::Class, FrameKind::Package] {
            if let Some(parent) = self.parent_of_kind(key, kind) {
                self.mangling_chain_into(parent, chain, visited);
                chain.push(parent);
                // Only one semantic parent path is followed
                break;
            }
        }
    }

    /// Language root for a frame: primary-parent chain first, then BFS over
    /// all parent paths.
    pub fn language_root(&self, key: FrameKey) -> Option<FrameKey> {
        let mut current = self.primary_parent(key);
        while let Some(k) = current {
            if self.frames[k.index()].kind == FrameKind::Language {
                return Some(k);
            }
            current = self.primary_parent(k);
        }

        let mut visited = HashSet::new();
        let mut queue: VecDeque<FrameKey> = self.frames[key.index()].parents.iter().copied().collect();
        while let Some(k) = queue.pop_front() {
            if !visited.insert(k) {
                continue;
            }
            if self.frames[k.index()].kind == FrameKind::Language {
                return Some(k);
            }
            queue.extend(self.frames[k.index()].parents.iter().copied());
        }
        None
    }

    /// Nearest enclosing CLASS; None for free functions.
    ///
    /// Primary-parent chain first, then BFS over all parent paths so classes
    /// attached by cross-file relinking are still found.
    pub fn enclosing_class(&self, key: FrameKey) -> Option<FrameKey> {
        let mut visited = HashSet::new();
        let mut current = self.primary_parent(key);
        while let Some(k) = current {
            if !visited.insert(k) {
                break;
            }
            if self.frames[k.index()].kind == FrameKind::Class {
                return Some(k);
            }
            current = self.primary_parent(k);
        }

        let mut visited = HashSet::new();
        let mut queue: VecDeque<FrameKey> = self.frames[key.index()].parents.iter().copied().collect();
        while let Some(k) = queue.pop_front() {
            if !visited.insert(k) {
                continue;
            }
            if self.frames[k.index()].kind == FrameKind::Class {
                return Some(k);
            }
            queue.extend(self.frames[k.index()].parents.iter().copied());
        }
        None
    }

    /// Nearest enclosing PACKAGE qualified name following primary parents.
    pub fn enclosing_package_qualified_name(&self, key: FrameKey) -> Option<String> {
        let mut visited = HashSet::new();
        let mut current = self.primary_parent(key);
        while let Some(k) = current {
            if !visited.insert(k) {
                break;
            }
            let frame = &self.frames[k.index()];
            if frame.kind == FrameKind::Package {
                return frame.qualified_name.clone();
            }
            current = self.primary_parent(k);
        }
        None
    }
}

impl std::ops::Index<FrameKey> for FrameArena {
    type Output = Frame;

    fn index(&self, key: FrameKey) -> &Frame {
        self.get(key)
    }
}

impl std::ops::IndexMut<FrameKey> for FrameArena {
    fn index_mut(&mut self, key: FrameKey) -> &mut Frame {
        self.get_mut(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Frame, FrameKind};

    fn frame(arena: &mut FrameArena, kind: FrameKind, name: &str) -> FrameKey {
        let mut f = Frame::new(kind)
            .with_name(name)
            .with_qualified_name(format!("test.{}", name))
            .with_location("test.py", 1, 1, 0, 0);
        f.compute_id();
        arena.insert(f)
    }

    #[test]
    fn test_attach_bidirectional() {
        let mut arena = FrameArena::new();
        let parent = frame(&mut arena, FrameKind::Class, "Parent");
        let child = frame(&mut arena, FrameKind::Callable, "child");

        arena.attach(parent, child);

        assert!(arena[parent].children().contains(&child));
        let parent_id = arena[parent].id.clone();
        assert!(arena[child].has_parent(&parent_id));
        assert_eq!(arena[child].parents(), &[parent]);
    }

    #[test]
    fn test_attach_idempotent() {
        let mut arena = FrameArena::new();
        let parent = frame(&mut arena, FrameKind::Class, "Parent");
        let child = frame(&mut arena, FrameKind::Callable, "child");

        arena.attach(parent, child);
        arena.attach(parent, child);

        assert_eq!(arena[parent].children().len(), 1);
        assert_eq!(arena[child].parents().len(), 1);
    }

    #[test]
    fn test_primary_parent_is_first_attached() {
        let mut arena = FrameArena::new();
        let p1 = frame(&mut arena, FrameKind::Package, "pkg");
        let p2 = frame(&mut arena, FrameKind::Language, "python_root");
        let child = frame(&mut arena, FrameKind::Class, "Foo");

        arena.attach(p1, child);
        arena.attach(p2, child);

        assert_eq!(arena.primary_parent(child), Some(p1));
        assert_eq!(arena[child].parents().len(), 2);
    }

    #[test]
    fn test_cycle_refused() {
        let mut arena = FrameArena::new();
        let a = frame(&mut arena, FrameKind::Package, "a");
        let b = frame(&mut arena, FrameKind::Package, "b");
        let c = frame(&mut arena, FrameKind::Package, "c");

        assert!(arena.attach_checked(a, b));
        assert!(arena.attach_checked(b, c));

        // c is a descendant of a; attaching a under c would cycle
        let children_before = arena[c].children().len();
        assert!(!arena.attach_checked(c, a));
        assert_eq!(arena[c].children().len(), children_before);
        assert!(arena[a].parents().is_empty());
    }

    #[test]
    fn test_descendant_diamond_terminates() {
        let mut arena = FrameArena::new();
        let root = frame(&mut arena, FrameKind::Codebase, "root");
        let left = frame(&mut arena, FrameKind::Package, "left");
        let right = frame(&mut arena, FrameKind::Package, "right");
        let leaf = frame(&mut arena, FrameKind::Class, "Leaf");

        arena.attach(root, left);
        arena.attach(root, right);
        arena.attach(left, leaf);
        arena.attach(right, leaf);

        assert!(arena.is_descendant_of(leaf, root));
        assert!(!arena.is_descendant_of(root, leaf));
        assert_eq!(arena.depth(leaf), 2);
    }

    #[test]
    fn test_mangling_chain_skips_language() {
        let mut arena = FrameArena::new();
        let codebase = frame(&mut arena, FrameKind::Codebase, "repo");
        let lang = frame(&mut arena, FrameKind::Language, "python_root");
        let pkg = frame(&mut arena, FrameKind::Package, "pkg");
        let class = frame(&mut arena, FrameKind::Class, "Foo");
        let method = frame(&mut arena, FrameKind::Callable, "bar");

        arena.attach(codebase, lang);
        arena.attach(lang, pkg);
        arena.attach(pkg, class);
        arena.attach(class, method);

        let chain = arena.mangling_chain(method);
        assert_eq!(chain, vec![pkg, class]);
    }

    #[test]
    fn test_walk_descendants_depth_first() {
        let mut arena = FrameArena::new();
        let root = frame(&mut arena, FrameKind::Package, "pkg");
        let class = frame(&mut arena, FrameKind::Class, "Foo");
        let m1 = frame(&mut arena, FrameKind::Callable, "a");
        let m2 = frame(&mut arena, FrameKind::Callable, "b");

        arena.attach(root, class);
        arena.attach(class, m1);
        arena.attach(root, m2);

        assert_eq!(arena.walk_descendants(root), vec![class, m1, m2]);
    }

    #[test]
    fn test_enclosing_class() {
        let mut arena = FrameArena::new();
        let pkg = frame(&mut arena, FrameKind::Package, "pkg");
        let class = frame(&mut arena, FrameKind::Class, "Foo");
        let method = frame(&mut arena, FrameKind::Callable, "bar");
        let free_fn = frame(&mut arena, FrameKind::Callable, "baz");

        arena.attach(pkg, class);
        arena.attach(class, method);
        arena.attach(pkg, free_fn);

        assert_eq!(arena.enclosing_class(method), Some(class));
        assert_eq!(arena.enclosing_class(free_fn), None);
    }
}

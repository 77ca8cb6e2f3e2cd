//! Stable-id diffing for incremental updates
//!
//! Compares the frames a file had in the persisted store against the frames
//! a fresh parse of that file produced, by stable id. Deterministic ids make
//! this a set comparison: whatever survived the edit keeps its id.

use std::collections::{HashMap, HashSet};

use crate::frame::{FrameId, Provenance};
use crate::graph::{FrameArena, FrameKey};

/// Result of comparing old vs new frames by stable id.
///
/// Constructed once per file re-parse, consumed once by the repair engine,
/// then discarded.
#[derive(Debug)]
pub struct FrameDiff {
    /// In the store but gone from the fresh parse
    pub deleted_ids: HashSet<FrameId>,
    /// In the fresh parse but not the store
    pub added: Vec<FrameKey>,
    /// Present in both, by identity
    pub stable_ids: HashSet<FrameId>,

    /// id → arena key for every frame of the fresh parse
    pub new_id_to_key: HashMap<FrameId, FrameKey>,

    pub total_old: usize,
    pub total_new: usize,
}

impl FrameDiff {
    pub fn deleted_count(&self) -> usize {
        self.deleted_ids.len()
    }

    pub fn added_count(&self) -> usize {
        self.added.len()
    }

    pub fn stable_count(&self) -> usize {
        self.stable_ids.len()
    }

    /// Share of the fresh parse that kept its identity.
    pub fn stability_percentage(&self) -> f32 {
        if self.total_new == 0 {
            return 0.0;
        }
        self.stable_count() as f32 / self.total_new as f32 * 100.0
    }

    /// Share of the fresh parse that changed (deleted + added).
    pub fn churn_percentage(&self) -> f32 {
        if self.total_new == 0 {
            return 0.0;
        }
        (self.deleted_count() + self.added_count()) as f32 / self.total_new as f32 * 100.0
    }

    /// Advisory warnings for suspicious diffs.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.total_old > 0 && self.churn_percentage() > 80.0 {
            warnings.push(format!(
                "high churn: {:.0}% of frames changed identity; check for formatting-wide edits",
                self.churn_percentage()
            ));
        }
        if self.total_new == 0 && self.total_old > 0 {
            warnings.push("fresh parse produced no frames for a previously indexed file".to_string());
        }
        warnings
    }
}

/// Computes [`FrameDiff`]s from store rows and freshly parsed frames.
pub struct DiffCalculator;

impl DiffCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Diff old frame ids (from the store) against new frames (in the
    /// arena).
    pub fn compute(
        &self,
        old_ids: &[FrameId],
        arena: &FrameArena,
        new_frames: &[FrameKey],
    ) -> FrameDiff {
        let old_set: HashSet<FrameId> = old_ids.iter().cloned().collect();

        let mut new_id_to_key: HashMap<FrameId, FrameKey> = HashMap::new();
        for &key in new_frames {
            new_id_to_key.insert(arena[key].id.clone(), key);
        }
        let new_set: HashSet<FrameId> = new_id_to_key.keys().cloned().collect();

        let deleted_ids: HashSet<FrameId> = old_set.difference(&new_set).cloned().collect();
        let stable_ids: HashSet<FrameId> = old_set.intersection(&new_set).cloned().collect();
        let mut added: Vec<FrameKey> = new_set
            .difference(&old_set)
            .filter_map(|id| new_id_to_key.get(id).copied())
            .collect();
        added.sort();

        FrameDiff {
            deleted_ids,
            added,
            stable_ids,
            new_id_to_key,
            total_old: old_set.len(),
            total_new: new_set.len(),
        }
    }

    /// All frames in a hierarchy, depth-first, excluding EXTERNAL frames
    /// (they belong to other files). A visited set handles multi-parent
    /// re-visits.
    pub fn collect_frames(&self, arena: &FrameArena, root: FrameKey) -> Vec<FrameKey> {
        let mut result = Vec::new();
        let mut visited = HashSet::new();
        self.collect_recursive(arena, root, &mut visited, &mut result);
        result
    }

    fn collect_recursive(
        &self,
        arena: &FrameArena,
        key: FrameKey,
        visited: &mut HashSet<FrameKey>,
        result: &mut Vec<FrameKey>,
    ) {
        if !visited.insert(key) {
            return;
        }
        if arena[key].provenance != Provenance::External {
            result.push(key);
        }
        for child in arena[key].children().to_vec() {
            self.collect_recursive(arena, child, visited, result);
        }
    }
}

impl Default for DiffCalculator {
    fn default() -> Self {
        Self::new()
    }
}

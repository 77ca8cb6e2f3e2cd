//! Tuning constants for the confidence system
//!
//! Every confidence coefficient lives here as a named value rather than a
//! scattered literal. The shape of the system (monotonic scope decay, fixed
//! tier cut points) is preserved while the values stay adjustable, including
//! from a TOML file.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::edge::EdgeKind;
use crate::handler::FieldPattern;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    /// Per-edge-type weights applied on top of min(subject, object).
    pub contains_weight: f32,
    pub inherits_weight: f32,
    pub imports_weight: f32,
    pub calls_weight: f32,
    pub uses_weight: f32,

    /// Confidence decay per scope level when a symbol resolves from an
    /// outer lexical scope.
    pub scope_decay: f32,

    /// Confidence of EXTERNAL placeholder frames synthesized for
    /// unresolved base classes.
    pub external_frame_confidence: f32,

    /// Import resolution outcomes, from best to worst.
    pub relative_import_resolved: f32,
    pub relative_import_synthesized: f32,
    pub relative_import_no_anchor: f32,
    pub relative_import_navigation_failed: f32,
    pub absolute_import_resolved: f32,

    /// Field-usage detection pattern multipliers (applied after the USES
    /// edge weight).
    pub field_pattern_explicit: f32,
    pub field_pattern_uppercase_heuristic: f32,
    pub field_pattern_qualified_static: f32,
    pub field_pattern_regex_based: f32,

    /// Hard recursion guard for builder descent; exceeding it aborts only
    /// the offending subtree.
    pub max_recursion_depth: usize,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            contains_weight: 1.0,
            inherits_weight: 0.95,
            imports_weight: 0.9,
            calls_weight: 0.85,
            uses_weight: 0.80,

            scope_decay: 0.95,

            external_frame_confidence: 0.3,

            relative_import_resolved: 0.8,
            relative_import_synthesized: 0.6,
            relative_import_no_anchor: 0.3,
            relative_import_navigation_failed: 0.2,
            absolute_import_resolved: 0.7,

            field_pattern_explicit: 1.0,
            field_pattern_uppercase_heuristic: 0.85,
            field_pattern_qualified_static: 0.70,
            field_pattern_regex_based: 0.88,

            max_recursion_depth: 1000,
        }
    }
}

impl Tuning {
    /// Weight applied to an edge of the given kind.
    pub fn edge_weight(&self, kind: EdgeKind) -> f32 {
        match kind {
            EdgeKind::Contains => self.contains_weight,
            EdgeKind::Inherits => self.inherits_weight,
            EdgeKind::Imports => self.imports_weight,
            EdgeKind::Calls => self.calls_weight,
            EdgeKind::Uses => self.uses_weight,
        }
    }

    /// Multiplier for a field-usage detection pattern.
    pub fn field_pattern_weight(&self, pattern: FieldPattern) -> f32 {
        match pattern {
            FieldPattern::Explicit => self.field_pattern_explicit,
            FieldPattern::UppercaseHeuristic => self.field_pattern_uppercase_heuristic,
            FieldPattern::QualifiedStatic => self.field_pattern_qualified_static,
            FieldPattern::RegexBased => self.field_pattern_regex_based,
        }
    }

    /// Load tuning overrides from a TOML file. Missing keys keep defaults.
    pub fn load(path: &Path) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents).map_err(|e| crate::Error::Config(e.to_string()))
    }
}

//! Edge types - typed, confidence-scored relations between frames
//!
//! All cross-frame relationships reduce to five edge types:
//! - `Contains`: structural ownership (package → class, class → method)
//! - `Imports`: package → imported package/class
//! - `Calls`: callable → callable
//! - `Inherits`: class → base class
//! - `Uses`: callable → class whose fields it touches

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::confidence::{tier_of, ConfidenceTier};
use crate::frame::FrameId;

/// Relationship types between frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EdgeKind {
    /// Parent-child hierarchical relationship
    Contains,
    /// Import relationship
    Imports,
    /// Function/method call
    Calls,
    /// Class inheritance
    Inherits,
    /// Field usage (CALLABLE → CLASS)
    Uses,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Contains => "CONTAINS",
            EdgeKind::Imports => "IMPORTS",
            EdgeKind::Calls => "CALLS",
            EdgeKind::Inherits => "INHERITS",
            EdgeKind::Uses => "USES",
        }
    }

    /// Get all edge kinds
    pub fn all() -> &'static [EdgeKind] {
        &[
            EdgeKind::Contains,
            EdgeKind::Imports,
            EdgeKind::Calls,
            EdgeKind::Inherits,
            EdgeKind::Uses,
        ]
    }
}

impl FromStr for EdgeKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "CONTAINS" => Ok(EdgeKind::Contains),
            "IMPORTS" => Ok(EdgeKind::Imports),
            "CALLS" => Ok(EdgeKind::Calls),
            "INHERITS" | "EXTENDS" => Ok(EdgeKind::Inherits),
            "USES" => Ok(EdgeKind::Uses),
            _ => Err(crate::Error::Parse(format!("Unknown edge kind: {}", s))),
        }
    }
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An edge in the frame graph.
///
/// `subject` and `object` reference frames by stable id, which is also the
/// shape the storage exporter consumes. The confidence tier is always derived
/// from the raw confidence, never stored independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: u64,
    pub subject: FrameId,
    pub object: FrameId,
    pub kind: EdgeKind,
    pub confidence: f32,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Edge {
    pub fn new(id: u64, subject: FrameId, object: FrameId, kind: EdgeKind, confidence: f32) -> Self {
        Self {
            id,
            subject,
            object,
            kind,
            confidence: confidence.clamp(0.0, 1.0),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Map<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Confidence tier, recomputed from the raw confidence.
    pub fn tier(&self) -> ConfidenceTier {
        tier_of(self.confidence)
    }
}

impl PartialEq for Edge {
    fn eq(&self, other: &Self) -> bool {
        self.subject == other.subject && self.object == other.object && self.kind == other.kind
    }
}

impl Eq for Edge {}

impl std::hash::Hash for Edge {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.subject.hash(state);
        self.object.hash(state);
        self.kind.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fid(s: &str) -> FrameId {
        FrameId::from(s)
    }

    #[test]
    fn test_edge_kind_roundtrip() {
        for kind in EdgeKind::all() {
            let s = kind.as_str();
            let parsed: EdgeKind = s.parse().unwrap();
            assert_eq!(*kind, parsed);
        }
    }

    #[test]
    fn test_tier_derived_from_confidence() {
        let edge = Edge::new(1, fid("a"), fid("b"), EdgeKind::Calls, 0.85);
        assert_eq!(edge.tier(), ConfidenceTier::High);

        let edge = Edge::new(2, fid("a"), fid("b"), EdgeKind::Uses, 0.56);
        assert_eq!(edge.tier(), ConfidenceTier::Medium);
    }

    #[test]
    fn test_confidence_clamped() {
        let edge = Edge::new(1, fid("a"), fid("b"), EdgeKind::Calls, 1.7);
        assert_eq!(edge.confidence, 1.0);
    }

    #[test]
    fn test_edge_identity_ignores_confidence() {
        let a = Edge::new(1, fid("x"), fid("y"), EdgeKind::Calls, 0.9);
        let b = Edge::new(2, fid("x"), fid("y"), EdgeKind::Calls, 0.4);
        assert_eq!(a, b);
    }
}

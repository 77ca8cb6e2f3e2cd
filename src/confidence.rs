//! Confidence scoring for uncertain symbol resolution
//!
//! Everything here is a pure function over the raw `f32` confidence and the
//! [`Tuning`] table. Tiers are always derived on read, never stored as an
//! independent source of truth.

use serde::{Deserialize, Serialize};

use crate::config::Tuning;
use crate::edge::EdgeKind;

/// Discretization of a [0,1] confidence score for simpler queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfidenceTier {
    /// confidence >= 0.8
    High,
    /// confidence 0.5-0.79
    Medium,
    /// confidence 0.2-0.49
    Low,
    /// confidence < 0.2
    Speculative,
}

impl ConfidenceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceTier::High => "HIGH",
            ConfidenceTier::Medium => "MEDIUM",
            ConfidenceTier::Low => "LOW",
            ConfidenceTier::Speculative => "SPECULATIVE",
        }
    }
}

impl std::str::FromStr for ConfidenceTier {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "HIGH" => Ok(ConfidenceTier::High),
            "MEDIUM" => Ok(ConfidenceTier::Medium),
            "LOW" => Ok(ConfidenceTier::Low),
            "SPECULATIVE" => Ok(ConfidenceTier::Speculative),
            _ => Err(crate::Error::Parse(format!("Unknown confidence tier: {}", s))),
        }
    }
}

impl std::fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Convert a confidence value to its tier.
///
/// The cut points (0.8 / 0.5 / 0.2) are fixed; only the coefficients that
/// feed into confidence values are tunable.
pub fn tier_of(confidence: f32) -> ConfidenceTier {
    if confidence >= 0.8 {
        ConfidenceTier::High
    } else if confidence >= 0.5 {
        ConfidenceTier::Medium
    } else if confidence >= 0.2 {
        ConfidenceTier::Low
    } else {
        ConfidenceTier::Speculative
    }
}

/// Calculate edge confidence from the confidences of its endpoints.
///
/// Edge confidence = min(subject, object) * type weight. A chain is only as
/// strong as its weakest link.
pub fn edge_confidence(
    kind: EdgeKind,
    subject_confidence: f32,
    object_confidence: f32,
    tuning: &Tuning,
) -> f32 {
    let base = subject_confidence.min(object_confidence);
    base * tuning.edge_weight(kind)
}

/// Adjust confidence for resolution from an outer lexical scope.
///
/// Resolution becomes less certain the further up the scope chain the match
/// was found; decay is monotonic in distance (distance 0 = innermost scope).
pub fn scope_distance_adjustment(base_confidence: f32, distance: usize, tuning: &Tuning) -> f32 {
    base_confidence * tuning.scope_decay.powi(distance as i32)
}

/// Adjust a USES edge confidence for the detection pattern that produced it.
///
/// An explicit receiver access (`self.field`, `this->field`) is trusted more
/// than an uppercase-qualified static access heuristic.
pub fn adjust_field_usage_confidence(
    base_confidence: f32,
    pattern: crate::handler::FieldPattern,
    tuning: &Tuning,
) -> f32 {
    base_confidence * tuning.field_pattern_weight(pattern)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_thresholds() {
        assert_eq!(tier_of(1.0), ConfidenceTier::High);
        assert_eq!(tier_of(0.8), ConfidenceTier::High);
        assert_eq!(tier_of(0.79), ConfidenceTier::Medium);
        assert_eq!(tier_of(0.5), ConfidenceTier::Medium);
        assert_eq!(tier_of(0.49), ConfidenceTier::Low);
        assert_eq!(tier_of(0.2), ConfidenceTier::Low);
        assert_eq!(tier_of(0.19), ConfidenceTier::Speculative);
        assert_eq!(tier_of(0.0), ConfidenceTier::Speculative);
    }

    #[test]
    fn test_edge_confidence_weakest_link() {
        let tuning = Tuning::default();
        let c = edge_confidence(EdgeKind::Contains, 1.0, 0.6, &tuning);
        assert!((c - 0.6).abs() < f32::EPSILON);

        // INHERITS carries a small fixed discount
        let c = edge_confidence(EdgeKind::Inherits, 1.0, 1.0, &tuning);
        assert!((c - 0.95).abs() < f32::EPSILON);
    }

    #[test]
    fn test_scope_decay_monotonic() {
        let tuning = Tuning::default();
        let c0 = scope_distance_adjustment(1.0, 0, &tuning);
        let c1 = scope_distance_adjustment(1.0, 1, &tuning);
        let c3 = scope_distance_adjustment(1.0, 3, &tuning);
        assert_eq!(c0, 1.0);
        assert!(c1 < c0);
        assert!(c3 < c1);
    }
}

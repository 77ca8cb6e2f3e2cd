//! # Framegraph - Semantic Code Graph Engine
//!
//! Language-agnostic semantic code graph with confidence-scored edges.
//!
//! Framegraph provides:
//! - A typed frame forest (packages, classes, callables, control flow) with
//!   stable content-derived identity and multi-parent ownership
//! - Confidence-scored, typed edges (CONTAINS, IMPORTS, CALLS, INHERITS, USES)
//! - A scope-aware builder that turns flat parse trees into frames
//! - A multi-pass cross-reference resolver with pluggable resolution tiers
//! - An incremental repair engine that keeps a persisted graph consistent
//!   after single-file edits

pub mod frame;
pub mod edge;
pub mod confidence;
pub mod config;
pub mod graph;
pub mod index;
pub mod parse;
pub mod handler;
pub mod build;
pub mod resolve;
pub mod storage;
pub mod incremental;

// Re-exports for convenient access
pub use frame::{Frame, FrameId, FrameKind, Provenance};
pub use edge::{Edge, EdgeKind};
pub use confidence::ConfidenceTier;
pub use config::Tuning;
pub use graph::{FrameArena, FrameKey};
pub use index::FrameIndex;
pub use handler::{HandlerRegistry, LanguageHandler};
pub use parse::{RawNode, SourceParser};
pub use build::{BuildContext, GraphBuilder};
pub use resolve::CrossRefResolver;
pub use storage::{GraphStore, SqliteStore};
pub use incremental::{DiffCalculator, FrameDiff, RepairEngine};

/// Result type alias for framegraph operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for framegraph operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Handler error: {0}")]
    Handler(String),

    #[error("No handler registered for language: {0}")]
    UnknownLanguage(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Frame not found: {0}")]
    FrameNotFound(String),
}

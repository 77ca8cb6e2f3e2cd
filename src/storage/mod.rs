//! Persisted-store interface
//!
//! The core's only knowledge of storage: point lookups that return enough
//! fields to rebuild a minimal frame projection, and bulk insert of frame
//! and edge rows. The incremental repair engine and the store-backed
//! resolution strategy run entirely against this trait.

pub mod schema;
pub mod sqlite;

pub use sqlite::SqliteStore;

use serde::{Deserialize, Serialize};

use crate::confidence::tier_of;
use crate::edge::{Edge, EdgeKind};
use crate::frame::{Frame, FrameId, FrameKind, FramePayload, Provenance};
use crate::resolve::ResolutionResult;
use crate::Result;

/// One persisted frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameRow {
    pub id: FrameId,
    pub kind: FrameKind,
    pub name: Option<String>,
    pub qualified_name: Option<String>,
    pub confidence: f32,
    pub provenance: Provenance,
    pub resolution_pass: u8,
    pub language: Option<String>,
    pub file_path: Option<String>,
    pub start_line: u32,
    pub end_line: u32,
    pub start_byte: usize,
    pub end_byte: usize,
    pub content: Option<String>,
    pub payload: FramePayload,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl FrameRow {
    pub fn from_frame(frame: &Frame) -> Self {
        Self {
            id: frame.id.clone(),
            kind: frame.kind,
            name: frame.name.clone(),
            qualified_name: frame.qualified_name.clone(),
            confidence: frame.confidence,
            provenance: frame.provenance,
            resolution_pass: frame.resolution_pass,
            language: frame.language.clone(),
            file_path: frame.file_path.clone(),
            start_line: frame.start_line,
            end_line: frame.end_line,
            start_byte: frame.start_byte,
            end_byte: frame.end_byte,
            content: frame.content.clone(),
            payload: frame.payload.clone(),
            metadata: frame.metadata.clone(),
        }
    }

    /// Tier string derived from the raw confidence at write time.
    pub fn tier_str(&self) -> &'static str {
        tier_of(self.confidence).as_str()
    }

    pub fn resolution_result(&self) -> ResolutionResult {
        ResolutionResult {
            frame_id: self.id.clone(),
            qualified_name: self.qualified_name.clone().unwrap_or_default(),
            confidence: self.confidence,
        }
    }

    /// Declared field names for a class row.
    pub fn field_names(&self) -> Vec<String> {
        self.payload.field_names()
    }
}

/// One persisted edge. Identity at the store level is
/// (subject, object, kind, metadata); re-inserting the same row is an
/// upsert, which is what keeps repair passes idempotent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeRow {
    pub subject: FrameId,
    pub object: FrameId,
    pub kind: EdgeKind,
    pub confidence: f32,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl EdgeRow {
    pub fn from_edge(edge: &Edge) -> Self {
        Self {
            subject: edge.subject.clone(),
            object: edge.object.clone(),
            kind: edge.kind,
            confidence: edge.confidence,
            metadata: edge.metadata.clone(),
        }
    }

    pub fn tier_str(&self) -> &'static str {
        tier_of(self.confidence).as_str()
    }
}

/// Point lookups and bulk mutation against a persisted frame graph.
///
/// Implementations are expected to tolerate concurrent read-only queries;
/// write operations assume single-writer discipline (one repair in flight
/// per store), which callers uphold rather than this trait enforcing.
pub trait GraphStore {
    fn frame_by_id(&self, id: &FrameId) -> Result<Option<FrameRow>>;

    fn find_by_kind_and_qualified_name(&self, kind: FrameKind, qname: &str) -> Result<Option<FrameRow>>;

    /// Frames of a kind whose qualified name ends with `suffix`.
    fn find_by_kind_and_suffix(&self, kind: FrameKind, suffix: &str) -> Result<Vec<FrameRow>>;

    /// Frames of a kind with a given simple name, filtered by language.
    fn find_by_kind_and_name(&self, kind: FrameKind, language: &str, name: &str) -> Result<Vec<FrameRow>>;

    /// Qualified name of the nearest PACKAGE that (transitively) contains a
    /// frame, walking CONTAINS edges upward.
    fn containing_package_qualified_name(&self, id: &FrameId) -> Result<Option<String>>;

    /// The CLASS that directly contains a callable, if any.
    fn parent_class_id(&self, callable_id: &FrameId) -> Result<Option<FrameId>>;

    fn frames_in_file(&self, file_path: &str) -> Result<Vec<FrameRow>>;

    fn insert_frames(&self, rows: &[FrameRow]) -> Result<usize>;

    /// Shared bulk-insert primitive; every repair step funnels through this.
    fn insert_edges(&self, rows: &[EdgeRow]) -> Result<usize>;

    /// Delete all INHERITS edges whose subject is in `subjects`; returns the
    /// number deleted.
    fn delete_inherits_edges_from(&self, subjects: &[FrameId]) -> Result<usize>;

    /// Detach-delete frames: removes the frames and every edge touching
    /// them.
    fn delete_frames(&self, ids: &[FrameId]) -> Result<usize>;

    fn edges_from(&self, subject: &FrameId) -> Result<Vec<EdgeRow>>;
}

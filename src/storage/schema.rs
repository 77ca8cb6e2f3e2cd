//! Database schema definitions

/// SQL to create the frames table
pub const CREATE_FRAMES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS frames (
    id TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    name TEXT,
    qualified_name TEXT,
    confidence REAL NOT NULL DEFAULT 1.0,
    confidence_tier TEXT NOT NULL DEFAULT 'HIGH',
    provenance TEXT NOT NULL DEFAULT 'parsed',
    resolution_pass INTEGER NOT NULL DEFAULT 1,
    language TEXT,
    file_path TEXT,
    start_line INTEGER NOT NULL DEFAULT 0,
    end_line INTEGER NOT NULL DEFAULT 0,
    start_byte INTEGER NOT NULL DEFAULT 0,
    end_byte INTEGER NOT NULL DEFAULT 0,
    content TEXT,
    payload TEXT NOT NULL DEFAULT '{"kind":"none"}',
    metadata TEXT NOT NULL DEFAULT '{}'
)
"#;

/// SQL to create the edges table.
///
/// Uniqueness includes metadata so repeated repair runs upsert rather than
/// duplicate, while several USES edges between the same frames (one per
/// field) stay distinct rows.
pub const CREATE_EDGES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS edges (
    subject TEXT NOT NULL,
    object TEXT NOT NULL,
    kind TEXT NOT NULL,
    confidence REAL NOT NULL DEFAULT 1.0,
    confidence_tier TEXT NOT NULL DEFAULT 'HIGH',
    metadata TEXT NOT NULL DEFAULT '{}',
    UNIQUE(subject, object, kind, metadata) ON CONFLICT REPLACE
)
"#;

/// SQL to create indexes
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_frames_qualified_name ON frames(qualified_name)",
    "CREATE INDEX IF NOT EXISTS idx_frames_kind ON frames(kind)",
    "CREATE INDEX IF NOT EXISTS idx_frames_name ON frames(name)",
    "CREATE INDEX IF NOT EXISTS idx_frames_file ON frames(file_path)",
    "CREATE INDEX IF NOT EXISTS idx_edges_subject ON edges(subject)",
    "CREATE INDEX IF NOT EXISTS idx_edges_object ON edges(object)",
    "CREATE INDEX IF NOT EXISTS idx_edges_kind ON edges(kind)",
];

/// All schema creation statements
pub fn all_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![CREATE_FRAMES_TABLE, CREATE_EDGES_TABLE];
    stmts.extend(CREATE_INDEXES.iter().copied());
    stmts
}

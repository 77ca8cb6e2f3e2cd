//! SQLite implementation of the persisted store

use std::path::Path;
use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};

use super::schema;
use super::{EdgeRow, FrameRow, GraphStore};
use crate::edge::EdgeKind;
use crate::frame::{FrameId, FrameKind, FramePayload, Provenance};
use crate::{Error, Result};

const FRAME_COLUMNS: &str = "id, kind, name, qualified_name, confidence, provenance, \
     resolution_pass, language, file_path, start_line, end_line, start_byte, end_byte, \
     content, payload, metadata";

/// SQLite-backed frame graph store.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open a database file (creates if it doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<()> {
        for stmt in schema::all_schema_statements() {
            self.conn.execute(stmt, [])?;
        }
        Ok(())
    }

    pub fn count_frames(&self) -> Result<usize> {
        let count: i64 = self.conn.query_row("SELECT COUNT(*) FROM frames", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn count_edges(&self) -> Result<usize> {
        let count: i64 = self.conn.query_row("SELECT COUNT(*) FROM edges", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn edges_by_kind(&self, kind: EdgeKind) -> Result<Vec<EdgeRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT subject, object, kind, confidence, metadata FROM edges WHERE kind = ?1",
        )?;
        let rows = stmt
            .query_map([kind.as_str()], row_to_edge)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    fn query_frames<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<FrameRow>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, row_to_frame)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }
}

impl GraphStore for SqliteStore {
    fn frame_by_id(&self, id: &FrameId) -> Result<Option<FrameRow>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM frames WHERE id = ?1", FRAME_COLUMNS),
                [id.as_str()],
                row_to_frame,
            )
            .optional()
            .map_err(Into::into)
    }

    fn find_by_kind_and_qualified_name(&self, kind: FrameKind, qname: &str) -> Result<Option<FrameRow>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {} FROM frames WHERE kind = ?1 AND qualified_name = ?2 LIMIT 1",
                    FRAME_COLUMNS
                ),
                params![kind.as_str(), qname],
                row_to_frame,
            )
            .optional()
            .map_err(Into::into)
    }

    fn find_by_kind_and_suffix(&self, kind: FrameKind, suffix: &str) -> Result<Vec<FrameRow>> {
        let pattern = format!("%{}", suffix);
        self.query_frames(
            &format!(
                "SELECT {} FROM frames WHERE kind = ?1 AND qualified_name LIKE ?2",
                FRAME_COLUMNS
            ),
            params![kind.as_str(), pattern],
        )
    }

    fn find_by_kind_and_name(&self, kind: FrameKind, language: &str, name: &str) -> Result<Vec<FrameRow>> {
        self.query_frames(
            &format!(
                "SELECT {} FROM frames WHERE kind = ?1 AND language = ?2 AND name = ?3",
                FRAME_COLUMNS
            ),
            params![kind.as_str(), language, name],
        )
    }

    fn containing_package_qualified_name(&self, id: &FrameId) -> Result<Option<String>> {
        // Walk CONTAINS edges upward; depth bound guards multi-parent loops
        self.conn
            .query_row(
                r#"
                WITH RECURSIVE ancestors(id, depth) AS (
                    SELECT e.subject, 1 FROM edges e
                    WHERE e.object = ?1 AND e.kind = 'CONTAINS'
                    UNION
                    SELECT e.subject, a.depth + 1 FROM edges e
                    JOIN ancestors a ON e.object = a.id
                    WHERE e.kind = 'CONTAINS' AND a.depth < 64
                )
                SELECT f.qualified_name FROM ancestors a
                JOIN frames f ON f.id = a.id
                WHERE f.kind = 'PACKAGE'
                ORDER BY a.depth
                LIMIT 1
                "#,
                [id.as_str()],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()
            .map(|opt| opt.flatten())
            .map_err(Into::into)
    }

    fn parent_class_id(&self, callable_id: &FrameId) -> Result<Option<FrameId>> {
        self.conn
            .query_row(
                r#"
                SELECT f.id FROM edges e
                JOIN frames f ON f.id = e.subject
                WHERE e.object = ?1 AND e.kind = 'CONTAINS' AND f.kind = 'CLASS'
                LIMIT 1
                "#,
                [callable_id.as_str()],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map(|opt| opt.map(FrameId::from))
            .map_err(Into::into)
    }

    fn frames_in_file(&self, file_path: &str) -> Result<Vec<FrameRow>> {
        self.query_frames(
            &format!(
                "SELECT {} FROM frames WHERE file_path = ?1 ORDER BY start_line",
                FRAME_COLUMNS
            ),
            params![file_path],
        )
    }

    fn insert_frames(&self, rows: &[FrameRow]) -> Result<usize> {
        let mut stmt = self.conn.prepare(
            r#"
            INSERT OR REPLACE INTO frames
                (id, kind, name, qualified_name, confidence, confidence_tier, provenance,
                 resolution_pass, language, file_path, start_line, end_line, start_byte,
                 end_byte, content, payload, metadata)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
            "#,
        )?;

        for row in rows {
            let payload = serde_json::to_string(&row.payload)
                .map_err(|e| Error::Parse(format!("payload serialization: {}", e)))?;
            let metadata = serde_json::to_string(&row.metadata)
                .map_err(|e| Error::Parse(format!("metadata serialization: {}", e)))?;

            stmt.execute(params![
                row.id.as_str(),
                row.kind.as_str(),
                row.name,
                row.qualified_name,
                row.confidence,
                row.tier_str(),
                row.provenance.as_str(),
                row.resolution_pass,
                row.language,
                row.file_path,
                row.start_line,
                row.end_line,
                row.start_byte as i64,
                row.end_byte as i64,
                row.content,
                payload,
                metadata,
            ])?;
        }
        Ok(rows.len())
    }

    fn insert_edges(&self, rows: &[EdgeRow]) -> Result<usize> {
        let mut stmt = self.conn.prepare(
            r#"
            INSERT OR REPLACE INTO edges (subject, object, kind, confidence, confidence_tier, metadata)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )?;

        for row in rows {
            let metadata = serde_json::to_string(&row.metadata)
                .map_err(|e| Error::Parse(format!("metadata serialization: {}", e)))?;
            stmt.execute(params![
                row.subject.as_str(),
                row.object.as_str(),
                row.kind.as_str(),
                row.confidence,
                row.tier_str(),
                metadata,
            ])?;
        }
        Ok(rows.len())
    }

    fn delete_inherits_edges_from(&self, subjects: &[FrameId]) -> Result<usize> {
        let mut deleted = 0;
        for subject in subjects {
            deleted += self.conn.execute(
                "DELETE FROM edges WHERE subject = ?1 AND kind = 'INHERITS'",
                [subject.as_str()],
            )?;
        }
        Ok(deleted)
    }

    fn delete_frames(&self, ids: &[FrameId]) -> Result<usize> {
        let mut deleted = 0;
        for id in ids {
            self.conn.execute(
                "DELETE FROM edges WHERE subject = ?1 OR object = ?1",
                [id.as_str()],
            )?;
            deleted += self
                .conn
                .execute("DELETE FROM frames WHERE id = ?1", [id.as_str()])?;
        }
        Ok(deleted)
    }

    fn edges_from(&self, subject: &FrameId) -> Result<Vec<EdgeRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT subject, object, kind, confidence, metadata FROM edges WHERE subject = ?1",
        )?;
        let rows = stmt
            .query_map([subject.as_str()], row_to_edge)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }
}

fn row_to_frame(row: &rusqlite::Row) -> rusqlite::Result<FrameRow> {
    let kind_str: String = row.get(1)?;
    let provenance_str: String = row.get(5)?;
    let payload_str: String = row.get(14)?;
    let metadata_str: String = row.get(15)?;

    let kind = FrameKind::from_str(&kind_str).map_err(|e| conversion_error(1, e))?;
    let provenance = Provenance::from_str(&provenance_str).map_err(|e| conversion_error(5, e))?;
    let payload: FramePayload = serde_json::from_str(&payload_str)
        .map_err(|e| conversion_error(14, Error::Parse(e.to_string())))?;
    let metadata = serde_json::from_str(&metadata_str)
        .map_err(|e| conversion_error(15, Error::Parse(e.to_string())))?;

    Ok(FrameRow {
        id: FrameId::from(row.get::<_, String>(0)?),
        kind,
        name: row.get(2)?,
        qualified_name: row.get(3)?,
        confidence: row.get(4)?,
        provenance,
        resolution_pass: row.get(6)?,
        language: row.get(7)?,
        file_path: row.get(8)?,
        start_line: row.get(9)?,
        end_line: row.get(10)?,
        start_byte: row.get::<_, i64>(11)? as usize,
        end_byte: row.get::<_, i64>(12)? as usize,
        content: row.get(13)?,
        payload,
        metadata,
    })
}

fn row_to_edge(row: &rusqlite::Row) -> rusqlite::Result<EdgeRow> {
    let kind_str: String = row.get(2)?;
    let metadata_str: String = row.get(4)?;

    let kind = EdgeKind::from_str(&kind_str).map_err(|e| conversion_error(2, e))?;
    let metadata = serde_json::from_str(&metadata_str)
        .map_err(|e| conversion_error(4, Error::Parse(e.to_string())))?;

    Ok(EdgeRow {
        subject: FrameId::from(row.get::<_, String>(0)?),
        object: FrameId::from(row.get::<_, String>(1)?),
        kind,
        confidence: row.get(3)?,
        metadata,
    })
}

fn conversion_error(column: usize, error: Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FieldInfo, Frame};

    fn sample_frame(kind: FrameKind, name: &str, qname: &str) -> FrameRow {
        let mut frame = Frame::new(kind)
            .with_name(name)
            .with_qualified_name(qname)
            .with_language("python")
            .with_location("src/pkg/mod.py", 1, 5, 0, 100)
            .with_content(format!("def {}(): pass", name));
        frame.compute_id();
        FrameRow::from_frame(&frame)
    }

    #[test]
    fn test_frame_roundtrip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let row = sample_frame(FrameKind::Callable, "helper", "pkg.helper");

        store.insert_frames(std::slice::from_ref(&row)).unwrap();

        let loaded = store.frame_by_id(&row.id).unwrap().unwrap();
        assert_eq!(loaded.qualified_name.as_deref(), Some("pkg.helper"));
        assert_eq!(loaded.kind, FrameKind::Callable);
        assert_eq!(loaded.provenance, Provenance::Parsed);
    }

    #[test]
    fn test_class_payload_roundtrip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut row = sample_frame(FrameKind::Class, "Foo", "pkg.Foo");
        row.payload = FramePayload::Class {
            instance_fields: vec![FieldInfo {
                name: "count".into(),
                declared_type: Some("int".into()),
                line: 3,
                confidence: 1.0,
            }],
            static_fields: vec![],
        };

        store.insert_frames(std::slice::from_ref(&row)).unwrap();

        let loaded = store.frame_by_id(&row.id).unwrap().unwrap();
        assert_eq!(loaded.field_names(), vec!["count".to_string()]);
    }

    #[test]
    fn test_suffix_lookup() {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = sample_frame(FrameKind::Callable, "helper", "pkg.inner.helper");
        let b = sample_frame(FrameKind::Callable, "helper2", "pkg.helper2");
        store.insert_frames(&[a, b]).unwrap();

        let rows = store.find_by_kind_and_suffix(FrameKind::Callable, ".helper").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].qualified_name.as_deref(), Some("pkg.inner.helper"));
    }

    #[test]
    fn test_containing_package_walk() {
        let store = SqliteStore::open_in_memory().unwrap();
        let pkg = sample_frame(FrameKind::Package, "pkg", "root.pkg");
        let class = sample_frame(FrameKind::Class, "Foo", "root.pkg.Foo");
        let method = sample_frame(FrameKind::Callable, "bar", "root.pkg.Foo.bar");
        store.insert_frames(&[pkg.clone(), class.clone(), method.clone()]).unwrap();

        store
            .insert_edges(&[
                EdgeRow {
                    subject: pkg.id.clone(),
                    object: class.id.clone(),
                    kind: EdgeKind::Contains,
                    confidence: 1.0,
                    metadata: serde_json::Map::new(),
                },
                EdgeRow {
                    subject: class.id.clone(),
                    object: method.id.clone(),
                    kind: EdgeKind::Contains,
                    confidence: 1.0,
                    metadata: serde_json::Map::new(),
                },
            ])
            .unwrap();

        assert_eq!(
            store.containing_package_qualified_name(&method.id).unwrap(),
            Some("root.pkg".to_string())
        );
        assert_eq!(store.parent_class_id(&method.id).unwrap(), Some(class.id.clone()));
        assert_eq!(store.parent_class_id(&class.id).unwrap(), None);
    }

    #[test]
    fn test_edge_upsert_identical_row() {
        let store = SqliteStore::open_in_memory().unwrap();
        let edge = EdgeRow {
            subject: FrameId::from("aaa"),
            object: FrameId::from("bbb"),
            kind: EdgeKind::Calls,
            confidence: 0.85,
            metadata: serde_json::Map::new(),
        };

        store.insert_edges(std::slice::from_ref(&edge)).unwrap();
        store.insert_edges(std::slice::from_ref(&edge)).unwrap();

        assert_eq!(store.count_edges().unwrap(), 1);
    }

    #[test]
    fn test_delete_frames_detaches_edges() {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = sample_frame(FrameKind::Callable, "a", "pkg.a");
        let b = sample_frame(FrameKind::Callable, "b", "pkg.b");
        store.insert_frames(&[a.clone(), b.clone()]).unwrap();
        store
            .insert_edges(&[EdgeRow {
                subject: a.id.clone(),
                object: b.id.clone(),
                kind: EdgeKind::Calls,
                confidence: 0.85,
                metadata: serde_json::Map::new(),
            }])
            .unwrap();

        store.delete_frames(&[a.id.clone()]).unwrap();

        assert!(store.frame_by_id(&a.id).unwrap().is_none());
        assert_eq!(store.count_edges().unwrap(), 0);
        assert!(store.frame_by_id(&b.id).unwrap().is_some());
    }
}

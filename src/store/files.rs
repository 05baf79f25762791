//! File row operations.

use std::collections::HashMap;

use rusqlite::params;

use super::schema::FileRecord;
use super::Store;
use crate::error::Result;

/// Row-level access to the `files` table.
pub struct FileRepo<'a> {
    store: &'a Store,
}

impl<'a> FileRepo<'a> {
    pub(super) fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Fetch one file row by its composite key.
    pub fn get(&self, project: &str, file_path: &str) -> Result<Option<FileRecord>> {
        let mut stmt = self.store.conn().prepare_cached(
            "SELECT project, file_path, mtime_ms, size, content_hash, updated_at, line_count
             FROM files WHERE project = ?1 AND file_path = ?2",
        )?;
        let mut rows = stmt.query_map(params![project, file_path], row_to_record)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Insert or update a file row. The row must exist before any symbol or
    /// relation row that references it is written.
    pub fn upsert(&self, record: &FileRecord) -> Result<()> {
        self.store.conn().execute(
            "INSERT INTO files (project, file_path, mtime_ms, size, content_hash, updated_at, line_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(project, file_path) DO UPDATE SET
                 mtime_ms = excluded.mtime_ms,
                 size = excluded.size,
                 content_hash = excluded.content_hash,
                 updated_at = excluded.updated_at,
                 line_count = excluded.line_count",
            params![
                record.project,
                record.file_path,
                record.mtime_ms,
                record.size,
                record.content_hash,
                record.updated_at,
                record.line_count,
            ],
        )?;
        Ok(())
    }

    /// All file rows for one project, sorted by path.
    pub fn list_all(&self, project: &str) -> Result<Vec<FileRecord>> {
        let mut stmt = self.store.conn().prepare_cached(
            "SELECT project, file_path, mtime_ms, size, content_hash, updated_at, line_count
             FROM files WHERE project = ?1 ORDER BY file_path",
        )?;
        let rows = stmt.query_map(params![project], row_to_record)?;
        collect(rows)
    }

    /// All file rows across every project, sorted by (project, path).
    pub fn list_everything(&self) -> Result<Vec<FileRecord>> {
        let mut stmt = self.store.conn().prepare_cached(
            "SELECT project, file_path, mtime_ms, size, content_hash, updated_at, line_count
             FROM files ORDER BY project, file_path",
        )?;
        let rows = stmt.query_map([], row_to_record)?;
        collect(rows)
    }

    /// Map of file path → record for one project.
    pub fn map_by_path(&self, project: &str) -> Result<HashMap<String, FileRecord>> {
        let records = self.list_all(project)?;
        Ok(records
            .into_iter()
            .map(|r| (r.file_path.clone(), r))
            .collect())
    }

    /// Delete a file row. Symbol rows go first through an explicit DELETE
    /// so the FTS sync triggers observe them; relation rows fall to the
    /// cascading foreign keys.
    pub fn delete(&self, project: &str, file_path: &str) -> Result<bool> {
        let conn = self.store.conn();
        conn.execute(
            "DELETE FROM symbols WHERE project = ?1 AND file_path = ?2",
            params![project, file_path],
        )?;
        let affected = conn.execute(
            "DELETE FROM files WHERE project = ?1 AND file_path = ?2",
            params![project, file_path],
        )?;
        Ok(affected > 0)
    }

    /// Total file count across projects.
    pub fn count(&self) -> Result<i64> {
        let count = self
            .store
            .conn()
            .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        project: row.get(0)?,
        file_path: row.get(1)?,
        mtime_ms: row.get(2)?,
        size: row.get(3)?,
        content_hash: row.get(4)?,
        updated_at: row.get(5)?,
        line_count: row.get(6)?,
    })
}

fn collect(
    rows: impl Iterator<Item = rusqlite::Result<FileRecord>>,
) -> Result<Vec<FileRecord>> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(project: &str, path: &str, hash: &str) -> FileRecord {
        FileRecord {
            project: project.to_string(),
            file_path: path.to_string(),
            mtime_ms: 1_000,
            size: 42,
            content_hash: hash.to_string(),
            updated_at: "2026-01-01T00:00:00Z".to_string(),
            line_count: Some(3),
        }
    }

    #[test]
    fn upsert_then_get_round_trips() {
        let store = Store::open_in_memory().unwrap();
        let rec = record("app", "src/a.ts", "h1");
        store.files().upsert(&rec).unwrap();

        let got = store.files().get("app", "src/a.ts").unwrap().unwrap();
        assert_eq!(got, rec);

        // Update in place keeps one row.
        let rec2 = FileRecord {
            content_hash: "h2".into(),
            ..rec
        };
        store.files().upsert(&rec2).unwrap();
        assert_eq!(store.files().count().unwrap(), 1);
        assert_eq!(
            store
                .files()
                .get("app", "src/a.ts")
                .unwrap()
                .unwrap()
                .content_hash,
            "h2"
        );
    }

    #[test]
    fn map_by_path_scopes_to_project() {
        let store = Store::open_in_memory().unwrap();
        store.files().upsert(&record("app", "a.ts", "h")).unwrap();
        store.files().upsert(&record("lib", "b.ts", "h")).unwrap();

        let map = store.files().map_by_path("app").unwrap();
        assert_eq!(map.len(), 1);
        assert!(map.contains_key("a.ts"));
    }

    #[test]
    fn delete_reports_presence() {
        let store = Store::open_in_memory().unwrap();
        store.files().upsert(&record("app", "a.ts", "h")).unwrap();
        assert!(store.files().delete("app", "a.ts").unwrap());
        assert!(!store.files().delete("app", "a.ts").unwrap());
    }
}

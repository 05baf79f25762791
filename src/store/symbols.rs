//! Symbol row operations.
//!
//! Symbol rows for a file are replaced as a unit, keyed by the file's
//! content hash: when the incoming hash matches the recorded one the whole
//! replacement is elided. Name lookup goes through the FTS5 companion
//! index, which the schema triggers keep synchronized.

use rusqlite::params;

use super::schema::SymbolRecord;
use super::Store;
use crate::error::Result;

/// Aggregate symbol statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct SymbolStats {
    pub total: i64,
    pub exported: i64,
    pub by_kind: Vec<(String, i64)>,
}

/// Row-level access to the `symbols` table and its FTS index.
pub struct SymbolRepo<'a> {
    store: &'a Store,
}

impl<'a> SymbolRepo<'a> {
    pub(super) fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Replace all symbol rows of a file in one unit.
    ///
    /// No-op when the recorded content hash already matches `content_hash`;
    /// returns whether rows were written.
    pub fn replace_file_symbols(
        &self,
        project: &str,
        file_path: &str,
        content_hash: &str,
        rows: &[SymbolRecord],
    ) -> Result<bool> {
        let recorded: Option<String> = self
            .store
            .conn()
            .query_row(
                "SELECT content_hash FROM symbol_state WHERE project = ?1 AND file_path = ?2",
                params![project, file_path],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        if recorded.as_deref() == Some(content_hash) {
            return Ok(false);
        }

        self.store.transaction(|store| {
            let conn = store.conn();
            conn.execute(
                "DELETE FROM symbols WHERE project = ?1 AND file_path = ?2",
                params![project, file_path],
            )?;

            let mut stmt = conn.prepare_cached(
                "INSERT INTO symbols
                     (project, file_path, name, kind, span_start, span_end,
                      is_exported, signature, fingerprint, detail_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;
            for row in rows {
                stmt.execute(params![
                    project,
                    file_path,
                    row.name,
                    row.kind,
                    row.span_start,
                    row.span_end,
                    row.is_exported,
                    row.signature,
                    row.fingerprint,
                    row.detail_json,
                ])?;
            }

            conn.execute(
                "INSERT INTO symbol_state (project, file_path, content_hash)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(project, file_path) DO UPDATE SET content_hash = excluded.content_hash",
                params![project, file_path, content_hash],
            )?;
            Ok(())
        })?;

        Ok(true)
    }

    /// All symbol rows of one file, in declaration order.
    pub fn get_file_symbols(&self, project: &str, file_path: &str) -> Result<Vec<SymbolRecord>> {
        let mut stmt = self.store.conn().prepare_cached(
            "SELECT id, project, file_path, name, kind, span_start, span_end,
                    is_exported, signature, fingerprint, detail_json
             FROM symbols WHERE project = ?1 AND file_path = ?2 ORDER BY span_start, id",
        )?;
        let rows = stmt.query_map(params![project, file_path], row_to_record)?;
        collect(rows)
    }

    /// Prefix search over symbol names through the FTS index, optionally
    /// narrowed by kind and project.
    pub fn search_by_prefix(
        &self,
        text: &str,
        kind: Option<&str>,
        project: Option<&str>,
    ) -> Result<Vec<SymbolRecord>> {
        if text.is_empty() {
            return Ok(Vec::new());
        }
        // FTS5 prefix phrase: name:"text"* — embedded quotes doubled.
        let query = format!("name:\"{}\"*", text.replace('"', "\"\""));

        let mut stmt = self.store.conn().prepare_cached(
            "SELECT s.id, s.project, s.file_path, s.name, s.kind, s.span_start, s.span_end,
                    s.is_exported, s.signature, s.fingerprint, s.detail_json
             FROM symbols_fts
             JOIN symbols s ON s.id = symbols_fts.rowid
             WHERE symbols_fts MATCH ?1
               AND (?2 IS NULL OR s.kind = ?2)
               AND (?3 IS NULL OR s.project = ?3)
             ORDER BY s.name, s.file_path
             LIMIT 200",
        )?;
        let rows = stmt.query_map(params![query, kind, project], row_to_record)?;
        collect(rows)
    }

    /// Exact-name lookup, optionally narrowed by kind and project.
    pub fn search_exact(
        &self,
        name: &str,
        kind: Option<&str>,
        project: Option<&str>,
    ) -> Result<Vec<SymbolRecord>> {
        let mut stmt = self.store.conn().prepare_cached(
            "SELECT id, project, file_path, name, kind, span_start, span_end,
                    is_exported, signature, fingerprint, detail_json
             FROM symbols
             WHERE name = ?1
               AND (?2 IS NULL OR kind = ?2)
               AND (?3 IS NULL OR project = ?3)
             ORDER BY project, file_path",
        )?;
        let rows = stmt.query_map(params![name, kind, project], row_to_record)?;
        collect(rows)
    }

    /// Content hash the current symbol rows of a file were computed from.
    pub fn recorded_hash(&self, project: &str, file_path: &str) -> Result<Option<String>> {
        let hash = self
            .store
            .conn()
            .query_row(
                "SELECT content_hash FROM symbol_state WHERE project = ?1 AND file_path = ?2",
                params![project, file_path],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        Ok(hash)
    }

    /// Aggregate counts for the status surface.
    pub fn stats(&self) -> Result<SymbolStats> {
        let conn = self.store.conn();
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM symbols", [], |row| row.get(0))?;
        let exported: i64 = conn.query_row(
            "SELECT COUNT(*) FROM symbols WHERE is_exported = 1",
            [],
            |row| row.get(0),
        )?;

        let mut stmt =
            conn.prepare_cached("SELECT kind, COUNT(*) FROM symbols GROUP BY kind ORDER BY kind")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        let mut by_kind = Vec::new();
        for row in rows {
            by_kind.push(row?);
        }

        Ok(SymbolStats {
            total,
            exported,
            by_kind,
        })
    }

}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<SymbolRecord> {
    Ok(SymbolRecord {
        id: row.get(0)?,
        project: row.get(1)?,
        file_path: row.get(2)?,
        name: row.get(3)?,
        kind: row.get(4)?,
        span_start: row.get(5)?,
        span_end: row.get(6)?,
        is_exported: row.get(7)?,
        signature: row.get(8)?,
        fingerprint: row.get(9)?,
        detail_json: row.get(10)?,
    })
}

fn collect(
    rows: impl Iterator<Item = rusqlite::Result<SymbolRecord>>,
) -> Result<Vec<SymbolRecord>> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::schema::FileRecord;

    fn seed_file(store: &Store, project: &str, path: &str, hash: &str) {
        store
            .files()
            .upsert(&FileRecord {
                project: project.to_string(),
                file_path: path.to_string(),
                mtime_ms: 0,
                size: 0,
                content_hash: hash.to_string(),
                updated_at: "2026-01-01T00:00:00Z".to_string(),
                line_count: None,
            })
            .unwrap();
    }

    fn symbol(name: &str, kind: &str) -> SymbolRecord {
        SymbolRecord {
            id: 0,
            project: "app".to_string(),
            file_path: "a.ts".to_string(),
            name: name.to_string(),
            kind: kind.to_string(),
            span_start: 0,
            span_end: 10,
            is_exported: true,
            signature: None,
            fingerprint: "f0".to_string(),
            detail_json: None,
        }
    }

    #[test]
    fn replace_is_elided_on_matching_hash() {
        let store = Store::open_in_memory().unwrap();
        seed_file(&store, "app", "a.ts", "h1");

        let wrote = store
            .symbols()
            .replace_file_symbols("app", "a.ts", "h1", &[symbol("A", "variable")])
            .unwrap();
        assert!(wrote);

        let ids_before: Vec<i64> = store
            .symbols()
            .get_file_symbols("app", "a.ts")
            .unwrap()
            .iter()
            .map(|s| s.id)
            .collect();

        // Same hash: elided, ids untouched.
        let wrote = store
            .symbols()
            .replace_file_symbols("app", "a.ts", "h1", &[symbol("A", "variable")])
            .unwrap();
        assert!(!wrote);

        let ids_after: Vec<i64> = store
            .symbols()
            .get_file_symbols("app", "a.ts")
            .unwrap()
            .iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids_before, ids_after);

        // New hash: replaced.
        let wrote = store
            .symbols()
            .replace_file_symbols("app", "a.ts", "h2", &[symbol("B", "variable")])
            .unwrap();
        assert!(wrote);
        let names: Vec<String> = store
            .symbols()
            .get_file_symbols("app", "a.ts")
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["B"]);
    }

    #[test]
    fn fts_prefix_search_tracks_replacements() {
        let store = Store::open_in_memory().unwrap();
        seed_file(&store, "app", "a.ts", "h1");
        store
            .symbols()
            .replace_file_symbols(
                "app",
                "a.ts",
                "h1",
                &[symbol("fetchUser", "function"), symbol("fetchPost", "function")],
            )
            .unwrap();

        let hits = store.symbols().search_by_prefix("fetch", None, None).unwrap();
        assert_eq!(hits.len(), 2);

        let hits = store
            .symbols()
            .search_by_prefix("fetchU", Some("function"), Some("app"))
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "fetchUser");

        // Replacement keeps the FTS index synchronized via triggers.
        store
            .symbols()
            .replace_file_symbols("app", "a.ts", "h2", &[symbol("other", "function")])
            .unwrap();
        assert!(store
            .symbols()
            .search_by_prefix("fetch", None, None)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn cascade_delete_purges_symbols_and_state() {
        let store = Store::open_in_memory().unwrap();
        seed_file(&store, "app", "a.ts", "h1");
        store
            .symbols()
            .replace_file_symbols("app", "a.ts", "h1", &[symbol("A", "variable")])
            .unwrap();

        store.files().delete("app", "a.ts").unwrap();
        assert!(store.symbols().get_file_symbols("app", "a.ts").unwrap().is_empty());
        assert_eq!(store.symbols().recorded_hash("app", "a.ts").unwrap(), None);
    }

    #[test]
    fn stats_counts_by_kind() {
        let store = Store::open_in_memory().unwrap();
        seed_file(&store, "app", "a.ts", "h1");
        store
            .symbols()
            .replace_file_symbols(
                "app",
                "a.ts",
                "h1",
                &[symbol("A", "variable"), symbol("f", "function")],
            )
            .unwrap();

        let stats = store.symbols().stats().unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.exported, 2);
        assert_eq!(
            stats.by_kind,
            vec![("function".to_string(), 1), ("variable".to_string(), 1)]
        );
    }
}

//! Relation row operations.
//!
//! `replace_file_relations` is DELETE-then-INSERT inside a transaction, so
//! a source file's outgoing edges change atomically. Both endpoints of
//! every row are FK-checked against `files`; the relation indexer's
//! known-file filter makes violations impossible by construction, and the
//! store enforces it regardless.

use rusqlite::params;

use super::schema::RelationRecord;
use super::Store;
use crate::error::Result;

/// Filter for [`RelationRepo::search`]. Empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct RelationFilter {
    pub project: Option<String>,
    pub rtype: Option<String>,
    pub src_file_path: Option<String>,
    pub dst_file_path: Option<String>,
    pub dst_symbol_name: Option<String>,
}

/// Row-level access to the `relations` table.
pub struct RelationRepo<'a> {
    store: &'a Store,
}

impl<'a> RelationRepo<'a> {
    pub(super) fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Atomically replace all relations whose source is (project, file).
    pub fn replace_file_relations(
        &self,
        project: &str,
        src_file_path: &str,
        rows: &[RelationRecord],
    ) -> Result<()> {
        self.store.transaction(|store| {
            let conn = store.conn();
            conn.execute(
                "DELETE FROM relations WHERE project = ?1 AND src_file_path = ?2",
                params![project, src_file_path],
            )?;

            let mut stmt = conn.prepare_cached(
                "INSERT INTO relations
                     (project, type, src_file_path, src_symbol_name,
                      dst_project, dst_file_path, dst_symbol_name, meta_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for row in rows {
                stmt.execute(params![
                    project,
                    row.rtype,
                    src_file_path,
                    row.src_symbol_name,
                    row.dst_project,
                    row.dst_file_path,
                    row.dst_symbol_name,
                    row.meta_json,
                ])?;
            }
            Ok(())
        })
    }

    /// Outgoing relations of a source file.
    pub fn get_outgoing(&self, project: &str, src_file_path: &str) -> Result<Vec<RelationRecord>> {
        let mut stmt = self.store.conn().prepare_cached(
            "SELECT id, project, type, src_file_path, src_symbol_name,
                    dst_project, dst_file_path, dst_symbol_name, meta_json
             FROM relations WHERE project = ?1 AND src_file_path = ?2
             ORDER BY type, dst_file_path, id",
        )?;
        let rows = stmt.query_map(params![project, src_file_path], row_to_record)?;
        collect(rows)
    }

    /// Incoming relations of a destination file.
    pub fn get_incoming(
        &self,
        dst_project: &str,
        dst_file_path: &str,
    ) -> Result<Vec<RelationRecord>> {
        let mut stmt = self.store.conn().prepare_cached(
            "SELECT id, project, type, src_file_path, src_symbol_name,
                    dst_project, dst_file_path, dst_symbol_name, meta_json
             FROM relations WHERE dst_project = ?1 AND dst_file_path = ?2
             ORDER BY type, src_file_path, id",
        )?;
        let rows = stmt.query_map(params![dst_project, dst_file_path], row_to_record)?;
        collect(rows)
    }

    /// All relations of one type within a project.
    pub fn get_by_type(&self, project: &str, rtype: &str) -> Result<Vec<RelationRecord>> {
        let mut stmt = self.store.conn().prepare_cached(
            "SELECT id, project, type, src_file_path, src_symbol_name,
                    dst_project, dst_file_path, dst_symbol_name, meta_json
             FROM relations WHERE project = ?1 AND type = ?2
             ORDER BY src_file_path, dst_file_path, id",
        )?;
        let rows = stmt.query_map(params![project, rtype], row_to_record)?;
        collect(rows)
    }

    /// Dependency-kind relations (imports, type-references, re-exports),
    /// optionally scoped to one project. Feeds the graph engine.
    pub fn dependency_edges(&self, project: Option<&str>) -> Result<Vec<RelationRecord>> {
        let mut stmt = self.store.conn().prepare_cached(
            "SELECT id, project, type, src_file_path, src_symbol_name,
                    dst_project, dst_file_path, dst_symbol_name, meta_json
             FROM relations
             WHERE type IN ('imports', 'type-references', 're-exports')
               AND (?1 IS NULL OR project = ?1)
             ORDER BY src_file_path, dst_file_path, id",
        )?;
        let rows = stmt.query_map(params![project], row_to_record)?;
        collect(rows)
    }

    /// Filtered search across all columns the filter names.
    pub fn search(&self, filter: &RelationFilter) -> Result<Vec<RelationRecord>> {
        let mut stmt = self.store.conn().prepare_cached(
            "SELECT id, project, type, src_file_path, src_symbol_name,
                    dst_project, dst_file_path, dst_symbol_name, meta_json
             FROM relations
             WHERE (?1 IS NULL OR project = ?1)
               AND (?2 IS NULL OR type = ?2)
               AND (?3 IS NULL OR src_file_path = ?3)
               AND (?4 IS NULL OR dst_file_path = ?4)
               AND (?5 IS NULL OR dst_symbol_name = ?5)
             ORDER BY project, src_file_path, id",
        )?;
        let rows = stmt.query_map(
            params![
                filter.project,
                filter.rtype,
                filter.src_file_path,
                filter.dst_file_path,
                filter.dst_symbol_name,
            ],
            row_to_record,
        )?;
        collect(rows)
    }

    /// Re-point relations targeting (dst_project, old_file, old_symbol) at a
    /// new destination. Returns the number of rows updated.
    #[allow(clippy::too_many_arguments)]
    pub fn retarget(
        &self,
        dst_project: &str,
        old_file: &str,
        old_symbol: Option<&str>,
        new_file: &str,
        new_symbol: Option<&str>,
        new_dst_project: Option<&str>,
    ) -> Result<usize> {
        let new_project = new_dst_project.unwrap_or(dst_project);
        let affected = self.store.conn().execute(
            "UPDATE relations
             SET dst_project = ?1, dst_file_path = ?2, dst_symbol_name = ?3
             WHERE dst_project = ?4 AND dst_file_path = ?5
               AND ((?6 IS NULL AND dst_symbol_name IS NULL) OR dst_symbol_name = ?6)",
            params![new_project, new_file, new_symbol, dst_project, old_file, old_symbol],
        )?;
        Ok(affected)
    }

    /// Total relation count across projects.
    pub fn count(&self) -> Result<i64> {
        let count = self
            .store
            .conn()
            .query_row("SELECT COUNT(*) FROM relations", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<RelationRecord> {
    Ok(RelationRecord {
        id: row.get(0)?,
        project: row.get(1)?,
        rtype: row.get(2)?,
        src_file_path: row.get(3)?,
        src_symbol_name: row.get(4)?,
        dst_project: row.get(5)?,
        dst_file_path: row.get(6)?,
        dst_symbol_name: row.get(7)?,
        meta_json: row.get(8)?,
    })
}

fn collect(
    rows: impl Iterator<Item = rusqlite::Result<RelationRecord>>,
) -> Result<Vec<RelationRecord>> {
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

    fn seed_file(store: &Store, project: &str, path: &str) {
        store
            .files()
            .upsert(&FileRecord {
                project: project.to_string(),
                file_path: path.to_string(),
                mtime_ms: 0,
                size: 0,
                content_hash: "h".to_string(),
                updated_at: "2026-01-01T00:00:00Z".to_string(),
                line_count: None,
            })
            .unwrap();
    }

    fn relation(src: &str, dst: &str, rtype: &str, dst_symbol: Option<&str>) -> RelationRecord {
        RelationRecord {
            id: 0,
            project: "app".to_string(),
            rtype: rtype.to_string(),
            src_file_path: src.to_string(),
            src_symbol_name: None,
            dst_project: "app".to_string(),
            dst_file_path: dst.to_string(),
            dst_symbol_name: dst_symbol.map(str::to_string),
            meta_json: None,
        }
    }

    #[test]
    fn replace_is_atomic_per_source_file() {
        let store = Store::open_in_memory().unwrap();
        seed_file(&store, "app", "a.ts");
        seed_file(&store, "app", "b.ts");
        seed_file(&store, "app", "c.ts");

        store
            .relations()
            .replace_file_relations(
                "app",
                "b.ts",
                &[relation("b.ts", "a.ts", "imports", Some("A"))],
            )
            .unwrap();
        store
            .relations()
            .replace_file_relations(
                "app",
                "b.ts",
                &[relation("b.ts", "c.ts", "imports", Some("C"))],
            )
            .unwrap();

        let outgoing = store.relations().get_outgoing("app", "b.ts").unwrap();
        assert_eq!(outgoing.len(), 1);
        assert_eq!(outgoing[0].dst_file_path, "c.ts");
    }

    #[test]
    fn fk_violation_rejected_by_store() {
        let store = Store::open_in_memory().unwrap();
        seed_file(&store, "app", "b.ts");

        let result = store.relations().replace_file_relations(
            "app",
            "b.ts",
            &[relation("b.ts", "missing.ts", "imports", None)],
        );
        assert!(result.is_err());
    }

    #[test]
    fn incoming_and_by_type_queries() {
        let store = Store::open_in_memory().unwrap();
        for path in ["a.ts", "b.ts", "c.ts"] {
            seed_file(&store, "app", path);
        }
        store
            .relations()
            .replace_file_relations(
                "app",
                "b.ts",
                &[
                    relation("b.ts", "a.ts", "imports", Some("A")),
                    relation("b.ts", "a.ts", "calls", Some("A")),
                ],
            )
            .unwrap();
        store
            .relations()
            .replace_file_relations(
                "app",
                "c.ts",
                &[relation("c.ts", "a.ts", "imports", Some("A"))],
            )
            .unwrap();

        let incoming = store.relations().get_incoming("app", "a.ts").unwrap();
        assert_eq!(incoming.len(), 3);

        let imports = store.relations().get_by_type("app", "imports").unwrap();
        assert_eq!(imports.len(), 2);
    }

    #[test]
    fn retarget_moves_symbol_references() {
        let store = Store::open_in_memory().unwrap();
        seed_file(&store, "app", "a.ts");
        seed_file(&store, "app", "b.ts");
        store
            .relations()
            .replace_file_relations(
                "app",
                "b.ts",
                &[relation("b.ts", "a.ts", "imports", Some("Old"))],
            )
            .unwrap();

        let updated = store
            .relations()
            .retarget("app", "a.ts", Some("Old"), "a.ts", Some("New"), None)
            .unwrap();
        assert_eq!(updated, 1);

        let outgoing = store.relations().get_outgoing("app", "b.ts").unwrap();
        assert_eq!(outgoing[0].dst_symbol_name.as_deref(), Some("New"));
    }

    #[test]
    fn search_applies_every_named_filter() {
        let store = Store::open_in_memory().unwrap();
        for path in ["a.ts", "b.ts"] {
            seed_file(&store, "app", path);
        }
        store
            .relations()
            .replace_file_relations(
                "app",
                "b.ts",
                &[
                    relation("b.ts", "a.ts", "imports", Some("A")),
                    relation("b.ts", "a.ts", "calls", Some("A")),
                ],
            )
            .unwrap();

        let all = store.relations().search(&RelationFilter::default()).unwrap();
        assert_eq!(all.len(), 2);

        let calls = store
            .relations()
            .search(&RelationFilter {
                rtype: Some("calls".into()),
                dst_symbol_name: Some("A".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].rtype, "calls");

        let none = store
            .relations()
            .search(&RelationFilter {
                project: Some("other".into()),
                ..Default::default()
            })
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn cascade_delete_on_either_endpoint() {
        let store = Store::open_in_memory().unwrap();
        seed_file(&store, "app", "a.ts");
        seed_file(&store, "app", "b.ts");
        store
            .relations()
            .replace_file_relations(
                "app",
                "b.ts",
                &[relation("b.ts", "a.ts", "imports", Some("A"))],
            )
            .unwrap();

        // Deleting the destination file purges the edge too.
        store.files().delete("app", "a.ts").unwrap();
        assert_eq!(store.relations().count().unwrap(), 0);
    }
}

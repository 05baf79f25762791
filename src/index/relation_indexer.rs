//! Relation indexer: extractor output → persisted relation rows.
//!
//! The filtering resolver wraps the plain resolver with the known-files
//! set, so only destinations that exist as file rows survive. That makes
//! foreign-key violations impossible by construction: anything else is
//! filtered before insertion.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::projects::ProjectBoundaries;
use crate::error::Result;
use crate::extract::relations::extract_relations;
use crate::parser::ParsedFile;
use crate::resolver::{self, AliasTable, ImportResolver};
use crate::store::{RelationRecord, RelationRepo};
use crate::validation::rel_key;

/// In-memory mirror of current file rows, keyed `"<project>::<path>"`.
/// Rebuilt from the repository once per indexing pass.
#[derive(Debug, Clone, Default)]
pub struct KnownFiles {
    keys: HashSet<String>,
}

impl KnownFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, project: &str, rel_path: &str) {
        self.keys.insert(format!("{project}::{rel_path}"));
    }

    pub fn contains(&self, project: &str, rel_path: &str) -> bool {
        self.keys.contains(&format!("{project}::{rel_path}"))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Resolver wrapper that admits only known files.
///
/// Candidates run in order: plain resolution first, then installed-package
/// candidates for bare specifiers. The first candidate whose
/// root-relative form is a known file wins; otherwise resolution fails.
pub struct FilteringResolver<'a> {
    pub root: &'a Path,
    pub aliases: Option<&'a AliasTable>,
    pub known: &'a KnownFiles,
    pub boundaries: &'a ProjectBoundaries,
    pub src_project: &'a str,
}

impl ImportResolver for FilteringResolver<'_> {
    fn resolve(&self, current_file: &Path, specifier: &str) -> Vec<PathBuf> {
        let mut candidates = resolver::resolve(current_file, specifier, self.aliases);
        if candidates.is_empty() && is_bare(specifier) {
            candidates = resolver::bare_package_candidates(self.root, specifier);
        }

        for candidate in candidates {
            let Ok(rel) = rel_key(&candidate, self.root) else {
                continue;
            };
            let project = self
                .boundaries
                .project_for(&rel)
                .unwrap_or(self.src_project);
            if self.known.contains(project, &rel) {
                return vec![candidate];
            }
        }
        Vec::new()
    }
}

fn is_bare(specifier: &str) -> bool {
    !specifier.starts_with('.') && !specifier.starts_with('/')
}

/// Index the relations of one parsed file, replacing its rows atomically.
/// Returns the number of rows written.
#[allow(clippy::too_many_arguments)]
pub fn index_file_relations(
    parsed: &ParsedFile,
    project: &str,
    rel_path: &str,
    abs_path: &Path,
    repo: &RelationRepo<'_>,
    root: &Path,
    aliases: Option<&AliasTable>,
    known: &KnownFiles,
    boundaries: &ProjectBoundaries,
) -> Result<usize> {
    let filtering = FilteringResolver {
        root,
        aliases,
        known,
        boundaries,
        src_project: project,
    };

    let raw = extract_relations(parsed, abs_path, &filtering);

    let mut rows = Vec::with_capacity(raw.len());
    for relation in raw {
        // The filtering resolver only returns known in-root candidates,
        // but destinations are re-checked here so a differently injected
        // resolver cannot smuggle in a dangling edge.
        let Ok(dst_rel) = rel_key(&relation.dst_file, root) else {
            continue;
        };
        let dst_project = boundaries
            .project_for(&dst_rel)
            .unwrap_or(project)
            .to_string();
        if !known.contains(&dst_project, &dst_rel) {
            continue;
        }

        let meta = serde_json::json!({ "specifier": relation.specifier });
        rows.push(RelationRecord {
            id: 0,
            project: project.to_string(),
            rtype: relation.rtype.as_key().to_string(),
            src_file_path: rel_path.to_string(),
            src_symbol_name: relation.src_symbol,
            dst_project,
            dst_file_path: dst_rel,
            dst_symbol_name: relation.dst_symbol,
            meta_json: Some(meta.to_string()),
        });
    }

    let count = rows.len();
    repo.replace_file_relations(project, rel_path, &rows)?;
    Ok(count)
}

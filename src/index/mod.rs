//! Index coordinator: full and incremental indexing over the discovered
//! project roots.
//!
//! Both entry points run the same two-pass structure inside one
//! transaction: pass 1 upserts every affected file row, then the
//! known-files set is rebuilt, then pass 2 writes symbols and relations.
//! The split matters even for small batches — a batch may contain
//! mutually-referencing new files, and a relation row may only be inserted
//! once both endpoints exist.

pub mod projects;
pub mod relation_indexer;
pub mod symbol_indexer;

pub use projects::{discover_projects, load_tsconfig_aliases, ProjectBoundaries};
pub use relation_indexer::KnownFiles;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::filter::FileFilter;
use crate::parser::{AstCache, ParsedFile, TsParser};
use crate::resolver::AliasTable;
use crate::store::{FileRecord, Store};
use crate::validation::rel_key;

/// Stage at which a per-file failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum FailureStage {
    Read,
    Parse,
}

impl std::fmt::Display for FailureStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureStage::Read => write!(f, "read"),
            FailureStage::Parse => write!(f, "parse"),
        }
    }
}

/// One recoverable per-file failure. Failures stay inside the batch; the
/// rest of the run proceeds.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct IndexFailure {
    pub path: String,
    pub stage: FailureStage,
    pub message: String,
}

/// Result of an index run.
#[derive(Debug, Clone, Default)]
pub struct IndexReport {
    pub projects: Vec<String>,
    pub files_seen: usize,
    /// Reindexed files (new or content-changed), root-relative, sorted.
    pub changed: Vec<String>,
    /// Subset of `changed` that had no prior file row.
    pub created: Vec<String>,
    /// Removed files, root-relative, sorted.
    pub deleted: Vec<String>,
    pub symbols_written: usize,
    pub relations_written: usize,
    pub failures: Vec<IndexFailure>,
}

impl IndexReport {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.deleted.is_empty()
    }
}

/// A file read from disk, hashed and sized, before any store mutation.
#[derive(Debug)]
struct ReadFile {
    abs: PathBuf,
    rel: String,
    project: String,
    source: Vec<u8>,
    hash: String,
    mtime_ms: i64,
    size: i64,
    line_count: i64,
}

/// A file parked between pass 1 and pass 2.
struct ParkedFile {
    rel: String,
    project: String,
    abs: PathBuf,
    parsed: Arc<ParsedFile>,
    hash: String,
    created: bool,
    /// Exported (name → (kind, signature)) before replacement, for the
    /// rename-retarget heuristic.
    old_exports: BTreeMap<String, (String, Option<String>)>,
}

/// Coordinates indexing over one project root.
pub struct IndexCoordinator {
    root: PathBuf,
    extensions: Vec<String>,
    ignore_patterns: Vec<String>,
    parser: TsParser,
    ast_cache: AstCache,
    aliases: Option<AliasTable>,
}

impl IndexCoordinator {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let root = std::fs::canonicalize(&config.project_root)
            .unwrap_or_else(|_| config.project_root.clone());
        let aliases = load_tsconfig_aliases(&root);

        Ok(Self {
            root,
            extensions: config.extensions.clone(),
            ignore_patterns: config.ignore_patterns.clone(),
            parser: TsParser::new()?,
            ast_cache: AstCache::new(config.parser_cache_capacity),
            aliases,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Full index: discover projects, walk the tree, reconcile every file
    /// row, then reindex symbols and relations for new or changed files.
    pub fn full_index(&mut self, store: &Store) -> Result<IndexReport> {
        let (projects, boundaries) = discover_projects(&self.root)?;
        let filter = FileFilter::new(&self.root, &self.extensions, &self.ignore_patterns)?;

        // Enumerate candidates in sorted order for determinism. Dependency
        // and VCS directories are pruned from the walk itself; per-file
        // rules run through the filter.
        let mut candidates: Vec<PathBuf> = Vec::new();
        for entry in walkdir::WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| {
                let name = e.file_name().to_string_lossy();
                e.depth() == 0
                    || !matches!(
                        name.as_ref(),
                        ".git" | ".gildash" | "node_modules" | "dist" | "build" | ".next"
                    )
            })
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if filter.should_skip(path).is_some() {
                continue;
            }
            candidates.push(path.to_path_buf());
        }
        candidates.sort();

        // File I/O and hashing parallelize; store writes stay sequential.
        let reads: Vec<std::result::Result<ReadFile, IndexFailure>> = candidates
            .par_iter()
            .map(|path| read_file(path, &self.root, &boundaries))
            .collect();

        let mut report = IndexReport {
            projects: projects.iter().map(|p| p.name.clone()).collect(),
            ..Default::default()
        };

        store.transaction(|store| {
            let mut existing: HashMap<(String, String), FileRecord> = store
                .files()
                .list_everything()?
                .into_iter()
                .map(|r| ((r.project.clone(), r.file_path.clone()), r))
                .collect();

            let mut parked: Vec<ParkedFile> = Vec::new();

            // Pass 1: reconcile file rows.
            for read in reads {
                let read = match read {
                    Ok(read) => read,
                    Err(failure) => {
                        report.failures.push(failure);
                        continue;
                    }
                };
                report.files_seen += 1;

                let key = (read.project.clone(), read.rel.clone());
                let prior = existing.remove(&key);
                if let Some(ref prior) = prior {
                    if prior.content_hash == read.hash {
                        continue;
                    }
                }

                // A parse failure leaves the file's rows untouched; the key
                // was already removed from `existing`, so the file is not
                // treated as deleted either.
                if let Some(parked_file) =
                    self.park(store, read, prior.is_none(), &mut report.failures)?
                {
                    parked.push(parked_file);
                }
            }

            // Files left in `existing` no longer exist on disk; cascading
            // foreign keys purge their symbol and relation rows.
            for (project, rel) in existing.keys() {
                store.files().delete(project, rel)?;
                report.deleted.push(rel.clone());
            }
            report.deleted.sort();

            self.run_pass_two(store, &boundaries, parked, &mut report)?;
            if !report.is_empty() {
                store.bump_index_version()?;
            }
            Ok(())
        })?;

        report.failures.sort_by(|a, b| a.path.cmp(&b.path));
        debug!(
            files = report.files_seen,
            changed = report.changed.len(),
            deleted = report.deleted.len(),
            "full index complete"
        );
        Ok(report)
    }

    /// Incremental index over a coalesced batch of changed paths. The whole
    /// batch commits or none of it does.
    pub fn incremental(&mut self, store: &Store, paths: &[PathBuf]) -> Result<IndexReport> {
        let mut report = IndexReport::default();
        if paths.is_empty() {
            return Ok(report);
        }

        let (projects, boundaries) = discover_projects(&self.root)?;
        report.projects = projects.iter().map(|p| p.name.clone()).collect();
        let filter = FileFilter::new(&self.root, &self.extensions, &self.ignore_patterns)?;

        // De-duplicate and order the batch.
        let batch: BTreeSet<PathBuf> = paths.iter().cloned().collect();

        let mut changed_paths: Vec<(PathBuf, String, String)> = Vec::new();
        let mut deleted_paths: Vec<(String, String)> = Vec::new();
        for path in batch {
            let Ok(rel) = rel_key(&path, &self.root) else {
                report.failures.push(IndexFailure {
                    path: path.to_string_lossy().to_string(),
                    stage: FailureStage::Read,
                    message: "path escapes project root".to_string(),
                });
                continue;
            };
            if filter.should_skip(&path).is_some() && path.exists() {
                continue;
            }
            let project = boundaries.project_for(&rel).unwrap_or("root").to_string();
            if path.is_file() {
                changed_paths.push((path, rel, project));
            } else {
                deleted_paths.push((project, rel));
            }
        }

        if changed_paths.is_empty() && deleted_paths.is_empty() {
            return Ok(report);
        }

        store.transaction(|store| {
            let mut parked: Vec<ParkedFile> = Vec::new();

            // Pass 1: upsert every affected file before any pass-2 write.
            for (abs, rel, project) in changed_paths {
                let read = match read_file(&abs, &self.root, &boundaries) {
                    Ok(read) => read,
                    Err(failure) => {
                        report.failures.push(failure);
                        continue;
                    }
                };
                report.files_seen += 1;

                let prior = store.files().get(&project, &rel)?;
                if let Some(ref prior) = prior {
                    if prior.content_hash == read.hash {
                        continue;
                    }
                }
                if let Some(parked_file) =
                    self.park(store, read, prior.is_none(), &mut report.failures)?
                {
                    parked.push(parked_file);
                }
            }

            for (project, rel) in deleted_paths {
                if store.files().delete(&project, &rel)? {
                    report.deleted.push(rel);
                }
            }
            report.deleted.sort();

            self.run_pass_two(store, &boundaries, parked, &mut report)?;

            if !report.is_empty() {
                store.bump_index_version()?;
            }
            Ok(())
        })?;

        report.failures.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(report)
    }

    /// Parse a file and upsert its row. Returns `None` (and records a
    /// failure) when the parser rejects it, leaving the store untouched
    /// for that file.
    fn park(
        &mut self,
        store: &Store,
        mut read: ReadFile,
        created: bool,
        failures: &mut Vec<IndexFailure>,
    ) -> Result<Option<ParkedFile>> {
        let cache_key = format!("{}::{}", read.project, read.rel);
        let parsed = match self.ast_cache.get(&cache_key, &read.hash) {
            Some(parsed) => parsed,
            None => match self.parser.parse(&read.abs, std::mem::take(&mut read.source)) {
                Ok(parsed) => {
                    let parsed = Arc::new(parsed);
                    self.ast_cache.put(&cache_key, &read.hash, parsed.clone());
                    parsed
                }
                Err(err) => {
                    failures.push(IndexFailure {
                        path: read.rel.clone(),
                        stage: FailureStage::Parse,
                        message: err.to_string(),
                    });
                    return Ok(None);
                }
            },
        };

        let old_exports = self.exported_shapes(store, &read.project, &read.rel)?;

        store.files().upsert(&FileRecord {
            project: read.project.clone(),
            file_path: read.rel.clone(),
            mtime_ms: read.mtime_ms,
            size: read.size,
            content_hash: read.hash.clone(),
            updated_at: chrono::Utc::now().to_rfc3339(),
            line_count: Some(read.line_count),
        })?;

        Ok(Some(ParkedFile {
            rel: read.rel,
            project: read.project,
            abs: read.abs,
            parsed,
            hash: read.hash,
            created,
            old_exports,
        }))
    }

    /// Pass 2: with the known-files set rebuilt from current rows, write
    /// symbols and relations for every parked file.
    fn run_pass_two(
        &mut self,
        store: &Store,
        boundaries: &ProjectBoundaries,
        parked: Vec<ParkedFile>,
        report: &mut IndexReport,
    ) -> Result<()> {
        let mut known = KnownFiles::new();
        for record in store.files().list_everything()? {
            known.insert(&record.project, &record.file_path);
        }

        for file in parked {
            report.symbols_written += symbol_indexer::index_file_symbols(
                &file.parsed,
                &file.project,
                &file.rel,
                &file.hash,
                &store.symbols(),
            )?;

            report.relations_written += relation_indexer::index_file_relations(
                &file.parsed,
                &file.project,
                &file.rel,
                &file.abs,
                &store.relations(),
                &self.root,
                self.aliases.as_ref(),
                &known,
                boundaries,
            )?;

            self.retarget_renamed_export(store, &file)?;

            if file.created {
                report.created.push(file.rel.clone());
            }
            report.changed.push(file.rel);
        }

        report.changed.sort();
        report.created.sort();
        Ok(())
    }

    /// When exactly one exported name vanished and exactly one appeared
    /// with the same kind and signature, incoming relations follow the
    /// rename. Anything more ambiguous is left for normal re-resolution.
    fn retarget_renamed_export(&self, store: &Store, file: &ParkedFile) -> Result<()> {
        if file.old_exports.is_empty() {
            return Ok(());
        }
        let new_exports = self.exported_shapes(store, &file.project, &file.rel)?;

        let removed: Vec<_> = file
            .old_exports
            .iter()
            .filter(|(name, _)| !new_exports.contains_key(*name))
            .collect();
        let added: Vec<_> = new_exports
            .iter()
            .filter(|(name, _)| !file.old_exports.contains_key(*name))
            .collect();

        if let ([(old_name, old_shape)], [(new_name, new_shape)]) =
            (removed.as_slice(), added.as_slice())
        {
            if old_shape == new_shape {
                let updated = store.relations().retarget(
                    &file.project,
                    &file.rel,
                    Some(old_name.as_str()),
                    &file.rel,
                    Some(new_name.as_str()),
                    None,
                )?;
                if updated > 0 {
                    debug!(
                        file = file.rel.as_str(),
                        from = old_name.as_str(),
                        to = new_name.as_str(),
                        "retargeted renamed export"
                    );
                }
            }
        }
        Ok(())
    }

    fn exported_shapes(
        &self,
        store: &Store,
        project: &str,
        rel: &str,
    ) -> Result<BTreeMap<String, (String, Option<String>)>> {
        Ok(store
            .symbols()
            .get_file_symbols(project, rel)?
            .into_iter()
            .filter(|s| s.is_exported && !s.name.contains('.'))
            .map(|s| (s.name, (s.kind, s.signature)))
            .collect())
    }
}

/// Read, hash, and size one file. Pure I/O; no store access.
fn read_file(
    path: &Path,
    root: &Path,
    boundaries: &ProjectBoundaries,
) -> std::result::Result<ReadFile, IndexFailure> {
    let rel = rel_key(path, root).map_err(|e| IndexFailure {
        path: path.to_string_lossy().to_string(),
        stage: FailureStage::Read,
        message: e.to_string(),
    })?;

    let source = std::fs::read(path).map_err(|e| IndexFailure {
        path: rel.clone(),
        stage: FailureStage::Read,
        message: e.to_string(),
    })?;

    let metadata = std::fs::metadata(path).map_err(|e| IndexFailure {
        path: rel.clone(),
        stage: FailureStage::Read,
        message: e.to_string(),
    })?;
    let mtime_ms = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);

    let mut hasher = Sha256::new();
    hasher.update(&source);
    let hash: String = hasher.finalize().iter().map(|b| format!("{b:02x}")).collect();

    let line_count = source.iter().filter(|b| **b == b'\n').count() as i64 + 1;
    let project = boundaries.project_for(&rel).unwrap_or("root").to_string();

    Ok(ReadFile {
        abs: path.to_path_buf(),
        rel,
        project,
        size: source.len() as i64,
        source,
        hash,
        mtime_ms,
        line_count,
    })
}

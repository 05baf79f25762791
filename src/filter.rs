//! File filtering for discovery and watching.
//!
//! Precedence:
//! 1. Hard internal ignores (store files, `.git/`, `node_modules/`, ...)
//! 2. Extension include list
//! 3. Gitignore-style rules (`.gitignore`, `.ignore`)
//! 4. Configured ignore globs
//!
//! Filtering is a pure function of the path: same inputs always produce the
//! same answer.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobMatcher};
use ignore::gitignore::Gitignore;
use tracing::warn;

use crate::error::{EngineError, Result};

/// Directories that are always ignored.
const INTERNAL_IGNORE_DIRS: &[&str] = &[
    ".git",
    ".gildash",
    "node_modules",
    "dist",
    "build",
    ".next",
];

/// File suffixes that are always ignored (store artifacts; watching them
/// would feed the indexer's own writes back into the watcher).
const INTERNAL_IGNORE_SUFFIXES: &[&str] = &[".db", ".db-journal", ".db-wal", ".db-shm"];

/// Why a path was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Internal,
    Extension,
    Gitignored,
    IgnorePattern,
    Directory,
}

/// Filter configuration for scanning and watching.
pub struct FileFilter {
    root: PathBuf,
    extensions: Vec<String>,
    gitignore: Option<Gitignore>,
    ignore_patterns: Vec<GlobMatcher>,
}

impl FileFilter {
    /// Create a filter rooted at `root`.
    ///
    /// `extensions` are dotted suffixes (`.ts`); `ignore_patterns` are globs
    /// matched against root-relative paths.
    pub fn new(root: &Path, extensions: &[String], ignore_patterns: &[String]) -> Result<Self> {
        let root = std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
        let gitignore = Self::load_gitignore(&root);

        let mut matchers = Vec::with_capacity(ignore_patterns.len());
        for pattern in ignore_patterns {
            let glob = Glob::new(pattern)
                .map_err(|e| EngineError::Config(format!("bad ignore pattern {pattern:?}: {e}")))?;
            matchers.push(glob.compile_matcher());
        }

        Ok(Self {
            root,
            extensions: extensions.to_vec(),
            gitignore,
            ignore_patterns: matchers,
        })
    }

    fn load_gitignore(root: &Path) -> Option<Gitignore> {
        let mut builder = ignore::gitignore::GitignoreBuilder::new(root);

        for name in [".gitignore", ".ignore"] {
            let path = root.join(name);
            if path.exists() {
                if let Some(err) = builder.add(&path) {
                    // A malformed ignore file must not stop indexing.
                    warn!("failed to load {}: {}", path.display(), err);
                }
            }
        }

        match builder.build() {
            Ok(gi) => Some(gi),
            Err(err) => {
                warn!("failed to build gitignore matcher: {}", err);
                None
            }
        }
    }

    /// Decide whether `path` should be skipped, and why.
    ///
    /// Returns `None` when the file passes all rules.
    pub fn should_skip(&self, path: &Path) -> Option<SkipReason> {
        if path.is_dir() {
            return Some(SkipReason::Directory);
        }

        let path_str = path.to_string_lossy();
        if INTERNAL_IGNORE_SUFFIXES
            .iter()
            .any(|suffix| path_str.ends_with(suffix))
        {
            return Some(SkipReason::Internal);
        }

        for component in path.components() {
            if let std::path::Component::Normal(name) = component {
                if let Some(name) = name.to_str() {
                    if INTERNAL_IGNORE_DIRS.contains(&name) {
                        return Some(SkipReason::Internal);
                    }
                }
            }
        }

        if !self.matches_extension(&path_str) {
            return Some(SkipReason::Extension);
        }

        if let Some(ref gitignore) = self.gitignore {
            if gitignore.matched(path, false).is_ignore() {
                return Some(SkipReason::Gitignored);
            }
        }

        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        if self.ignore_patterns.iter().any(|m| m.is_match(rel)) {
            return Some(SkipReason::IgnorePattern);
        }

        None
    }

    /// Whether the filename carries one of the configured extensions.
    ///
    /// `.d.ts` counts as `.ts`; compound suffixes are matched by suffix, not
    /// by `Path::extension`.
    fn matches_extension(&self, path_str: &str) -> bool {
        self.extensions.iter().any(|ext| path_str.ends_with(ext.as_str()))
    }
}

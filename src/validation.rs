//! Path validation and normalization.
//!
//! All rows in the store are keyed by project-root-relative paths with `/`
//! separators. Every path arriving from the walker or the watcher goes
//! through here before it can touch the store; anything that escapes the
//! project root is rejected rather than indexed.

use std::path::{Component, Path, PathBuf};

/// Error types for path validation.
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    /// Resolved path escapes the project root
    #[error("path escapes project root: {0}")]
    OutsideRoot(String),

    /// Path is not valid UTF-8 and cannot be used as a row key
    #[error("path is not valid UTF-8: {0}")]
    NotUtf8(String),
}

/// Lexically normalize a path: drop `.` components and fold `..` into the
/// preceding component. Does not touch the filesystem, so it works for
/// deleted files too.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Convert an absolute path into the project-root-relative key used by the
/// store (`/`-separated, no leading `./`).
///
/// Returns `OutsideRoot` when the normalized path does not sit under `root`.
pub fn rel_key(path: &Path, root: &Path) -> Result<String, PathError> {
    let normalized = normalize(path);
    let root = normalize(root);

    let rel = normalized
        .strip_prefix(&root)
        .map_err(|_| PathError::OutsideRoot(path.to_string_lossy().to_string()))?;

    let rel_str = rel
        .to_str()
        .ok_or_else(|| PathError::NotUtf8(path.to_string_lossy().to_string()))?;

    Ok(rel_str.replace('\\', "/"))
}

/// Check whether a path stays inside `root` after lexical normalization.
pub fn is_within_root(path: &Path, root: &Path) -> bool {
    normalize(path).starts_with(normalize(root))
}

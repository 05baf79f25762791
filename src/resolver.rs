//! Import specifier resolution.
//!
//! Maps the specifier text of an import/re-export statement to an ordered
//! candidate list of absolute file paths. The resolver is pure and
//! synchronous: it never touches the filesystem. Existence is decided
//! downstream by the known-file filter.

use std::path::{Path, PathBuf};

use crate::validation::normalize;

/// Number of candidates an extensionless specifier expands to.
const CANDIDATE_COUNT: usize = 8;

/// One alias entry: an exact name (`@app`) or a wildcard pattern with a
/// trailing `*` (`@app/*`), mapped to one or more targets. A `*` inside a
/// target is substituted with the matched suffix.
#[derive(Debug, Clone)]
pub struct AliasEntry {
    pub pattern: String,
    pub targets: Vec<String>,
}

/// Alias table, mirroring a tsconfig `paths` map: entries are joined to
/// `base` (the `baseUrl`) before extension expansion.
#[derive(Debug, Clone)]
pub struct AliasTable {
    pub base: PathBuf,
    pub entries: Vec<AliasEntry>,
}

impl AliasTable {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            entries: Vec::new(),
        }
    }

    pub fn with_entry(mut self, pattern: &str, targets: &[&str]) -> Self {
        self.entries.push(AliasEntry {
            pattern: pattern.to_string(),
            targets: targets.iter().map(|t| t.to_string()).collect(),
        });
        self
    }

    /// Find the first entry matching `specifier` and return the expanded
    /// target paths (joined to `base`, before extension expansion).
    fn expand(&self, specifier: &str) -> Option<Vec<PathBuf>> {
        for entry in &self.entries {
            if let Some(prefix) = entry.pattern.strip_suffix('*') {
                if let Some(rest) = specifier.strip_prefix(prefix) {
                    let paths = entry
                        .targets
                        .iter()
                        .map(|target| self.base.join(target.replace('*', rest)))
                        .collect();
                    return Some(paths);
                }
            } else if entry.pattern == specifier {
                let paths = entry
                    .targets
                    .iter()
                    .map(|target| self.base.join(target))
                    .collect();
                return Some(paths);
            }
        }
        None
    }
}

/// Seam for injecting resolution behavior into the extractors. The relation
/// indexer wraps the plain resolver with its known-file filter through this
/// trait.
pub trait ImportResolver {
    fn resolve(&self, current_file: &Path, specifier: &str) -> Vec<PathBuf>;
}

/// The plain, filterless resolver.
pub struct PlainResolver {
    pub aliases: Option<AliasTable>,
}

impl ImportResolver for PlainResolver {
    fn resolve(&self, current_file: &Path, specifier: &str) -> Vec<PathBuf> {
        resolve(current_file, specifier, self.aliases.as_ref())
    }
}

/// Resolve a specifier written in `current_file` to an ordered candidate
/// list of absolute paths.
///
/// - Relative specifiers (leading `.` or `/`) resolve against the
///   directory of `current_file` and expand through [`EXTENSION_ORDER`]
///   when they carry no extension.
/// - Alias-matched specifiers expand against the alias table.
/// - Bare specifiers return an empty list at this layer; see
///   [`bare_package_candidates`].
pub fn resolve(
    current_file: &Path,
    specifier: &str,
    aliases: Option<&AliasTable>,
) -> Vec<PathBuf> {
    if specifier.starts_with('.') || specifier.starts_with('/') {
        let dir = current_file.parent().unwrap_or_else(|| Path::new("/"));
        return expand_extensions(&normalize(&dir.join(specifier)));
    }

    if let Some(table) = aliases {
        if let Some(bases) = table.expand(specifier) {
            return bases
                .iter()
                .flat_map(|base| expand_extensions(&normalize(base)))
                .collect();
        }
    }

    Vec::new()
}

/// Enumerate likely installed-package paths for a bare specifier. These are
/// only ever admitted through the known-file filter, so over-generation is
/// harmless.
pub fn bare_package_candidates(project_root: &Path, specifier: &str) -> Vec<PathBuf> {
    expand_extensions(&normalize(&project_root.join("node_modules").join(specifier)))
}

/// Expand a resolved base path through the extension candidate order, or
/// return it as the sole candidate when it already has an extension.
/// `.ts` ranks strictly ahead of `.d.ts`.
fn expand_extensions(base: &Path) -> Vec<PathBuf> {
    if base.extension().is_some() {
        return vec![base.to_path_buf()];
    }

    let b = base.to_string_lossy();
    let mut candidates = Vec::with_capacity(CANDIDATE_COUNT);
    candidates.push(PathBuf::from(format!("{b}.ts")));
    candidates.push(PathBuf::from(format!("{b}.d.ts")));
    candidates.push(base.join("index.ts"));
    candidates.push(base.join("index.d.ts"));
    candidates.push(PathBuf::from(format!("{b}.mts")));
    candidates.push(base.join("index.mts"));
    candidates.push(PathBuf::from(format!("{b}.cts")));
    candidates.push(base.join("index.cts"));
    candidates
}

//! Project discovery and the project boundary table.
//!
//! A project is a directory carrying a `package.json` at its root; every
//! source file under it belongs to that project. The boundary table maps
//! directory prefixes to project names, longest prefix winning. The root
//! itself is always a project so no file is left unowned.

use std::path::Path;

use tracing::warn;

use crate::error::Result;
use crate::resolver::{AliasEntry, AliasTable};
use crate::validation::rel_key;

/// Name used for the root project when its manifest is missing or nameless.
const ROOT_PROJECT: &str = "root";

/// One discovered project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredProject {
    pub name: String,
    /// Directory prefix relative to the walk root; empty for the root.
    pub rel_dir: String,
}

/// Ordered mapping from directory prefixes to project names.
#[derive(Debug, Clone, Default)]
pub struct ProjectBoundaries {
    /// (prefix, project), sorted by prefix length descending.
    entries: Vec<(String, String)>,
}

impl ProjectBoundaries {
    pub fn from_projects(projects: &[DiscoveredProject]) -> Self {
        let mut entries: Vec<(String, String)> = projects
            .iter()
            .map(|p| {
                let prefix = if p.rel_dir.is_empty() {
                    String::new()
                } else {
                    format!("{}/", p.rel_dir)
                };
                (prefix, p.name.clone())
            })
            .collect();
        entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then(a.0.cmp(&b.0)));
        Self { entries }
    }

    /// Project owning `rel_path`; longest prefix wins.
    pub fn project_for(&self, rel_path: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(prefix, _)| rel_path.starts_with(prefix.as_str()))
            .map(|(_, project)| project.as_str())
    }
}

/// Discover projects under `root` by locating `package.json` manifests.
///
/// The root is always included, named from its manifest when one exists.
/// Dependency and VCS directories are never descended into.
pub fn discover_projects(root: &Path) -> Result<(Vec<DiscoveredProject>, ProjectBoundaries)> {
    let mut projects = vec![DiscoveredProject {
        name: manifest_name(&root.join("package.json")).unwrap_or_else(|| ROOT_PROJECT.to_string()),
        rel_dir: String::new(),
    }];

    for entry in walkdir::WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            !matches!(
                name.as_ref(),
                ".git" | ".gildash" | "node_modules" | "dist" | "build"
            )
        })
        .filter_map(|e| e.ok())
    {
        if entry.file_name() != "package.json" || entry.depth() < 2 {
            continue;
        }
        let Some(dir) = entry.path().parent() else {
            continue;
        };
        let Ok(rel_dir) = rel_key(dir, root) else {
            continue;
        };
        let name = manifest_name(entry.path()).unwrap_or_else(|| {
            dir.file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| ROOT_PROJECT.to_string())
        });
        projects.push(DiscoveredProject { name, rel_dir });
    }

    projects.sort_by(|a, b| a.rel_dir.cmp(&b.rel_dir));
    let boundaries = ProjectBoundaries::from_projects(&projects);
    Ok((projects, boundaries))
}

fn manifest_name(manifest: &Path) -> Option<String> {
    let text = std::fs::read_to_string(manifest).ok()?;
    let value: serde_json::Value = match serde_json::from_str(&text) {
        Ok(v) => v,
        Err(err) => {
            warn!("unparsable manifest {}: {}", manifest.display(), err);
            return None;
        }
    };
    value
        .get("name")
        .and_then(|n| n.as_str())
        .map(str::to_string)
}

/// Load an alias table from `tsconfig.json` (`compilerOptions.baseUrl` +
/// `paths`), when present.
pub fn load_tsconfig_aliases(root: &Path) -> Option<AliasTable> {
    let text = std::fs::read_to_string(root.join("tsconfig.json")).ok()?;
    let value: serde_json::Value = match serde_json::from_str(&text) {
        Ok(v) => v,
        Err(err) => {
            warn!("unparsable tsconfig.json: {}", err);
            return None;
        }
    };

    let options = value.get("compilerOptions")?;
    let base_url = options.get("baseUrl").and_then(|b| b.as_str()).unwrap_or(".");
    let paths = options.get("paths")?.as_object()?;

    let mut table = AliasTable::new(crate::validation::normalize(&root.join(base_url)));
    for (pattern, targets) in paths {
        let targets: Vec<String> = targets
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|t| t.as_str())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        if !targets.is_empty() {
            table.entries.push(AliasEntry {
                pattern: pattern.clone(),
                targets,
            });
        }
    }

    if table.entries.is_empty() {
        None
    } else {
        Some(table)
    }
}

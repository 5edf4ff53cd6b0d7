//! Always-relevant context: project config, entry files and the component
//! inventory, independent of the request text.

use std::collections::HashSet;
use std::sync::Arc;

use super::gatherer::GatheredFile;
use crate::file_source::FileSource;

/// Exact paths always worth showing the model.
const WELL_KNOWN_FILES: &[&str] = &[
    "package.json",
    "tsconfig.json",
    "src/app/layout.tsx",
    "app/layout.tsx",
    "src/app/globals.css",
    "app/globals.css",
    "src/styles/globals.css",
];

/// File-name prefixes of framework config files (`next.config.mjs`, ...).
const CONFIG_PREFIXES: &[&str] = &["next.config.", "tailwind.config."];

const COMPONENT_DIRS: &[&str] = &["src/components/", "components/"];

/// Upper bound on inventory entries rendered into the prompt.
const MAX_INVENTORY: usize = 200;

/// Score assigned to builder files so they sort ahead of ranked ones.
const BUILDER_SCORE: i32 = 100;

#[derive(Debug, Clone, Default)]
pub struct BuiltContext {
    pub files: Vec<GatheredFile>,
    /// Component names (file stems) found under component directories.
    pub component_inventory: Vec<String>,
}

pub struct ContextBuilder {
    source: Arc<dyn FileSource>,
}

impl ContextBuilder {
    pub fn new(source: Arc<dyn FileSource>) -> Self {
        Self { source }
    }

    pub async fn build(&self, paths: &[String], max_file_size: usize) -> BuiltContext {
        let mut files = Vec::new();
        for path in paths.iter().filter(|p| is_well_known(p)) {
            match self.source.read_file(path).await {
                Ok(content) if content.len() <= max_file_size => files.push(GatheredFile {
                    path: path.clone(),
                    size: content.len(),
                    content,
                    score: BUILDER_SCORE,
                }),
                Ok(_) => tracing::debug!(%path, "Skipping oversized config file"),
                Err(e) => tracing::warn!(%path, error = %e, "Failed to load config file"),
            }
        }

        BuiltContext {
            files,
            component_inventory: component_inventory(paths),
        }
    }
}

fn is_well_known(path: &str) -> bool {
    WELL_KNOWN_FILES.contains(&path)
        || (!path.contains('/') && CONFIG_PREFIXES.iter().any(|p| path.starts_with(p)))
}

/// Sorted, deduplicated component names.
pub fn component_inventory(paths: &[String]) -> Vec<String> {
    let mut names: Vec<String> = paths
        .iter()
        .filter(|p| COMPONENT_DIRS.iter().any(|d| p.starts_with(d)))
        .filter(|p| p.ends_with(".tsx") || p.ends_with(".jsx"))
        .filter(|p| !p.contains(".test.") && !p.contains(".stories."))
        .filter_map(|p| {
            let file = p.rsplit('/').next()?;
            let stem = file.split('.').next()?;
            (stem != "index").then(|| stem.to_string())
        })
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    names.sort();
    names.truncate(MAX_INVENTORY);
    names
}

/// Builder files first, then gatherer files whose paths the builder did
/// not already include.
pub fn merge_files(built: Vec<GatheredFile>, gathered: Vec<GatheredFile>) -> Vec<GatheredFile> {
    let seen: HashSet<String> = built.iter().map(|f| f.path.clone()).collect();
    built
        .into_iter()
        .chain(gathered.into_iter().filter(|f| !seen.contains(&f.path)))
        .collect()
}

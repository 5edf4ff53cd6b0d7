//! Codebase analysis types and classification.
//!
//! The analyzer in the agent crate walks the tree and reads `package.json`;
//! this module turns those raw inputs into a [`CodebaseAnalysis`].

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Depth of the directory tree rendered into prompts.
pub const DEFAULT_TREE_DEPTH: usize = 3;

/// Dependency name (or prefix ending in `/`) to framework label.
pub const FRAMEWORK_TABLE: &[(&str, &str)] = &[
    ("next", "Next.js"),
    ("react", "React"),
    ("@trpc/", "tRPC"),
    ("@prisma/client", "Prisma"),
    ("drizzle-orm", "Drizzle ORM"),
    ("tailwindcss", "Tailwind CSS"),
    ("next-auth", "NextAuth.js"),
    ("@clerk/", "Clerk"),
    ("stripe", "Stripe"),
    ("openai", "OpenAI SDK"),
    ("@tanstack/react-query", "TanStack Query"),
    ("zod", "Zod"),
    ("@radix-ui/", "Radix UI"),
    ("next-themes", "next-themes"),
    ("vitest", "Vitest"),
    ("jest", "Jest"),
    ("@playwright/test", "Playwright"),
];

/// Path marker to architectural pattern label.
pub const PATTERN_TABLE: &[(&str, &str)] = &[
    ("src/app/", "App Router"),
    ("app/", "App Router"),
    ("pages/", "Pages Router"),
    ("src/pages/", "Pages Router"),
    ("src/server/api/routers/", "tRPC routers"),
    ("src/components/ui/", "Shared UI components"),
    ("src/hooks/", "Custom hooks"),
    ("src/server/db/", "Server-side data layer"),
    ("middleware.ts", "Edge middleware"),
    ("src/middleware.ts", "Edge middleware"),
    ("prisma/schema.prisma", "Prisma schema"),
];

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One node of the summarised directory tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DirectoryNode {
    pub name: String,
    /// Files directly in this directory.
    pub file_count: usize,
    pub children: Vec<DirectoryNode>,
}

/// Flat summary of a project, rebuilt per request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CodebaseAnalysis {
    pub project_name: Option<String>,
    pub structure: DirectoryNode,
    pub dependencies: Vec<String>,
    pub frameworks: Vec<String>,
    pub patterns: Vec<String>,
    pub total_files: usize,
}

/// Dependency names read from a `package.json` document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageManifest {
    pub name: Option<String>,
    pub dependencies: Vec<String>,
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse `package.json`, collecting both runtime and dev dependencies.
pub fn parse_package_json(raw: &str) -> Result<PackageManifest, CoreError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| CoreError::Validation(format!("Invalid package.json: {e}")))?;

    let mut dependencies: Vec<String> = ["dependencies", "devDependencies", "peerDependencies"]
        .iter()
        .filter_map(|key| value.get(key).and_then(Value::as_object))
        .flat_map(|deps| deps.keys().cloned())
        .collect();
    dependencies.sort();
    dependencies.dedup();

    Ok(PackageManifest {
        name: value.get("name").and_then(Value::as_str).map(str::to_string),
        dependencies,
    })
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Framework labels implied by the dependency list, in table order.
pub fn detect_frameworks(dependencies: &[String]) -> Vec<String> {
    let mut found = Vec::new();
    for (marker, label) in FRAMEWORK_TABLE {
        let hit = dependencies.iter().any(|dep| {
            if marker.ends_with('/') {
                dep.starts_with(marker)
            } else {
                dep == marker
            }
        });
        if hit && !found.iter().any(|f| f == label) {
            found.push(label.to_string());
        }
    }
    found
}

/// Architectural patterns implied by the file list, in table order.
pub fn detect_patterns<S: AsRef<str>>(paths: &[S]) -> Vec<String> {
    let mut found = Vec::new();
    for (marker, label) in PATTERN_TABLE {
        let hit = paths.iter().any(|p| {
            let p = p.as_ref();
            if marker.ends_with('/') {
                p.starts_with(marker)
            } else {
                p == *marker
            }
        });
        if hit && !found.iter().any(|f| f == label) {
            found.push(label.to_string());
        }
    }
    found
}

/// Summarise a list of relative file paths into a tree of at most
/// `max_depth` directory levels.
pub fn build_tree<S: AsRef<str>>(root_name: &str, paths: &[S], max_depth: usize) -> DirectoryNode {
    #[derive(Default)]
    struct Builder {
        files: usize,
        dirs: BTreeMap<String, Builder>,
    }

    fn finish(name: String, b: Builder) -> DirectoryNode {
        DirectoryNode {
            name,
            file_count: b.files,
            children: b.dirs.into_iter().map(|(n, c)| finish(n, c)).collect(),
        }
    }

    let mut root = Builder::default();
    for path in paths {
        let segments: Vec<&str> = path.as_ref().split('/').filter(|s| !s.is_empty()).collect();
        let Some((_, dirs)) = segments.split_last() else {
            continue;
        };
        let mut node = &mut root;
        let mut truncated = false;
        for (depth, dir) in dirs.iter().enumerate() {
            if depth >= max_depth {
                truncated = true;
                break;
            }
            node = node.dirs.entry(dir.to_string()).or_default();
        }
        if !truncated {
            node.files += 1;
        }
    }
    finish(root_name.to_string(), root)
}

/// Assemble the full analysis from raw inputs.
pub fn analyze(
    root_name: &str,
    paths: &[String],
    manifest: Option<PackageManifest>,
) -> CodebaseAnalysis {
    let manifest = manifest.unwrap_or_default();
    CodebaseAnalysis {
        project_name: manifest.name,
        structure: build_tree(root_name, paths, DEFAULT_TREE_DEPTH),
        frameworks: detect_frameworks(&manifest.dependencies),
        patterns: detect_patterns(paths),
        dependencies: manifest.dependencies,
        total_files: paths.len(),
    }
}

impl DirectoryNode {
    /// Indented text rendering used in prompts.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out
    }

    fn render_into(&self, out: &mut String, depth: usize) {
        out.push_str(&"  ".repeat(depth));
        out.push_str(&self.name);
        out.push('/');
        if self.file_count > 0 {
            out.push_str(&format!(" ({} files)", self.file_count));
        }
        out.push('\n');
        for child in &self.children {
            child.render_into(out, depth + 1);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const PACKAGE_JSON: &str = r#"{
        "name": "apex-agents",
        "dependencies": { "next": "14.1.0", "react": "18", "@trpc/server": "10", "stripe": "14" },
        "devDependencies": { "tailwindcss": "3", "vitest": "1", "react": "18" }
    }"#;

    #[test]
    fn parses_and_merges_dependency_tables() {
        let manifest = parse_package_json(PACKAGE_JSON).unwrap();
        assert_eq!(manifest.name.as_deref(), Some("apex-agents"));
        assert_eq!(manifest.dependencies.len(), 6);
    }

    #[test]
    fn rejects_invalid_manifest() {
        assert_matches!(parse_package_json("{"), Err(CoreError::Validation(_)));
    }

    #[test]
    fn detects_frameworks_including_scoped_prefixes() {
        let manifest = parse_package_json(PACKAGE_JSON).unwrap();
        let frameworks = detect_frameworks(&manifest.dependencies);
        assert_eq!(
            frameworks,
            vec!["Next.js", "React", "tRPC", "Tailwind CSS", "Stripe", "Vitest"]
        );
    }

    #[test]
    fn detects_patterns_once() {
        let paths = ["src/app/page.tsx", "src/app/layout.tsx", "src/components/ui/button.tsx"];
        assert_eq!(detect_patterns(&paths), vec!["App Router", "Shared UI components"]);
    }

    #[test]
    fn tree_respects_depth_limit() {
        let paths = ["package.json", "src/app/page.tsx", "src/app/a/b/c/deep.tsx", "src/lib/x.ts"];
        let tree = build_tree("root", &paths, 2);
        assert_eq!(tree.file_count, 1);
        let src = &tree.children[0];
        assert_eq!(src.name, "src");
        assert_eq!(src.children.len(), 2);
        assert_eq!(src.children[0].name, "app");
        assert_eq!(src.children[0].file_count, 1);
        assert!(src.children[0].children.is_empty());
    }

    #[test]
    fn render_indents_children() {
        let tree = build_tree("root", &["src/a.ts"], 3);
        assert_eq!(tree.render(), "root/\n  src/ (1 files)\n");
    }

    #[test]
    fn analyze_without_manifest() {
        let analysis = analyze("root", &["src/app/page.tsx".to_string()], None);
        assert!(analysis.frameworks.is_empty());
        assert_eq!(analysis.patterns, vec!["App Router"]);
        assert_eq!(analysis.total_files, 1);
    }
}

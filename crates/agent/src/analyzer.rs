//! Codebase analyzer: lists the project and classifies it.

use std::sync::Arc;

use apex_core::analysis::{self, CodebaseAnalysis, PackageManifest};
use apex_core::context::is_excluded;

use crate::error::AgentError;
use crate::file_source::FileSource;

const PACKAGE_JSON: &str = "package.json";

pub struct CodebaseAnalyzer {
    source: Arc<dyn FileSource>,
    root_name: String,
}

impl CodebaseAnalyzer {
    pub fn new(source: Arc<dyn FileSource>, root_name: impl Into<String>) -> Self {
        Self {
            source,
            root_name: root_name.into(),
        }
    }

    /// List the project, skipping vendored and generated directories.
    pub async fn list_project_files(&self) -> Result<Vec<String>, AgentError> {
        let mut paths = self.source.list_files().await?;
        paths.retain(|p| !is_excluded(p));
        Ok(paths)
    }

    pub async fn analyze(&self) -> Result<CodebaseAnalysis, AgentError> {
        let paths = self.list_project_files().await?;
        Ok(self.analyze_paths(&paths).await)
    }

    /// Analyse an already-listed project. A missing or malformed
    /// `package.json` only drops the dependency information.
    pub async fn analyze_paths(&self, paths: &[String]) -> CodebaseAnalysis {
        let manifest = self.read_manifest(paths).await;
        let analysis = analysis::analyze(&self.root_name, paths, manifest);
        tracing::info!(
            source = %self.source.describe(),
            files = analysis.total_files,
            frameworks = analysis.frameworks.len(),
            "Analyzed codebase",
        );
        analysis
    }

    async fn read_manifest(&self, paths: &[String]) -> Option<PackageManifest> {
        if !paths.iter().any(|p| p == PACKAGE_JSON) {
            return None;
        }
        let raw = match self.source.read_file(PACKAGE_JSON).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read package.json");
                return None;
            }
        };
        match analysis::parse_package_json(&raw) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring malformed package.json");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_source::LocalFileSource;

    #[tokio::test]
    async fn analyzes_local_project() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src/app")).unwrap();
        std::fs::write(dir.path().join("src/app/page.tsx"), "x").unwrap();
        std::fs::write(
            dir.path().join("package.json"),
            r#"{"name":"demo","dependencies":{"next":"14","react":"18"}}"#,
        )
        .unwrap();

        let analyzer = CodebaseAnalyzer::new(Arc::new(LocalFileSource::new(dir.path())), "demo");
        let analysis = analyzer.analyze().await.unwrap();
        assert_eq!(analysis.project_name.as_deref(), Some("demo"));
        assert_eq!(analysis.frameworks, vec!["Next.js", "React"]);
        assert_eq!(analysis.patterns, vec!["App Router"]);
        assert_eq!(analysis.total_files, 2);
    }

    #[tokio::test]
    async fn malformed_manifest_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("package.json"), "{oops").unwrap();

        let analyzer = CodebaseAnalyzer::new(Arc::new(LocalFileSource::new(dir.path())), "demo");
        let analysis = analyzer.analyze().await.unwrap();
        assert!(analysis.dependencies.is_empty());
        assert_eq!(analysis.total_files, 1);
    }
}

//! Request-specific context: which files does this request touch?

use std::sync::Arc;

use apex_core::context::{self, ContextStrategy};
use serde::Serialize;

use crate::config::ContextLimits;
use crate::file_source::FileSource;

/// A loaded project file handed to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatheredFile {
    pub path: String,
    pub content: String,
    pub size: usize,
    pub score: i32,
}

/// Ranked, loaded files for one request.
#[derive(Debug, Clone, Serialize)]
pub struct GatheredContext {
    pub files: Vec<GatheredFile>,
    /// Ranked candidate paths, including any that failed to load.
    pub relevant_paths: Vec<String>,
    pub keywords: Vec<String>,
    pub buckets: Vec<&'static str>,
    pub strategy: ContextStrategy,
}

impl GatheredContext {
    fn empty(keywords: Vec<String>) -> Self {
        Self {
            files: Vec::new(),
            relevant_paths: Vec::new(),
            keywords,
            buckets: Vec::new(),
            strategy: ContextStrategy::None,
        }
    }
}

pub struct ContextGatherer {
    source: Arc<dyn FileSource>,
}

impl ContextGatherer {
    pub fn new(source: Arc<dyn FileSource>) -> Self {
        Self { source }
    }

    /// List the project and gather context for `prompt`.
    ///
    /// A listing failure yields an empty context rather than an error; the
    /// validator rejects whatever the model makes of it downstream.
    pub async fn gather_context(
        &self,
        prompt: &str,
        max_files: usize,
        max_file_size: usize,
    ) -> GatheredContext {
        let paths = match self.source.list_files().await {
            Ok(paths) => paths,
            Err(e) => {
                tracing::warn!(error = %e, source = %self.source.describe(), "Failed to list project files");
                return GatheredContext::empty(context::extract_keywords(prompt).all());
            }
        };
        self.gather_from_paths(
            &paths,
            prompt,
            ContextLimits {
                max_files,
                max_file_size,
            },
        )
        .await
    }

    /// Gather context from an already-listed project.
    pub async fn gather_from_paths(
        &self,
        paths: &[String],
        prompt: &str,
        limits: ContextLimits,
    ) -> GatheredContext {
        let keywords = context::extract_keywords(prompt);
        let discovery = context::discover(paths, &keywords);
        let ranked = context::rank(&discovery.paths, &keywords, limits.max_files);

        let mut files = Vec::with_capacity(ranked.len());
        for candidate in &ranked {
            match self.source.read_file(&candidate.path).await {
                Ok(content) if content.len() > limits.max_file_size => {
                    tracing::debug!(path = %candidate.path, size = content.len(), "Skipping oversized file");
                }
                Ok(content) => files.push(GatheredFile {
                    path: candidate.path.clone(),
                    size: content.len(),
                    content,
                    score: candidate.score,
                }),
                Err(e) => {
                    tracing::warn!(path = %candidate.path, error = %e, "Failed to load context file");
                }
            }
        }

        tracing::info!(
            strategy = discovery.strategy.as_str(),
            candidates = discovery.paths.len(),
            loaded = files.len(),
            "Gathered request context",
        );

        GatheredContext {
            files,
            relevant_paths: ranked.into_iter().map(|r| r.path).collect(),
            keywords: keywords.all(),
            buckets: discovery.buckets,
            strategy: discovery.strategy,
        }
    }
}

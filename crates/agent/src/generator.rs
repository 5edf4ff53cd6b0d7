//! Patch generation: context, prompt, bounded LLM attempts, validation.

use std::future::Future;
use std::sync::Arc;

use apex_core::context::ContextStrategy;
use apex_core::conventions::RouteConventions;
use apex_core::patch::{validate_request_text, PatchData, PatchIdSequence, PatchRecord};
use apex_core::types::DbId;
use apex_core::validation::{
    assess_patch_quality, decode_patch, format_error_message, validate, QualityAssessment,
};
use serde::Serialize;

use crate::analyzer::CodebaseAnalyzer;
use crate::config::ContextLimits;
use crate::context::{merge_files, ContextBuilder, ContextGatherer};
use crate::error::AgentError;
use crate::file_source::FileSource;
use crate::llm::ChatProvider;
use crate::prompt::{build_system_prompt, PromptInput};

/// LLM attempts per request.
pub const MAX_GENERATION_ATTEMPTS: u32 = 3;

// ---------------------------------------------------------------------------
// Bounded retry
// ---------------------------------------------------------------------------

/// Result of one generation attempt.
#[derive(Debug)]
pub enum AttemptOutcome<T> {
    /// Done; stop retrying.
    Ready(T),
    /// The attempt produced something unusable; the reason is fed into the
    /// next attempt.
    Retryable(String),
    /// Retrying cannot help.
    Fatal(AgentError),
}

/// Run `attempt` until it is ready, fatal, or `max_attempts` runs were
/// retryable. Each call receives its 1-based attempt number and the reason
/// the previous attempt was rejected.
pub async fn retry_bounded<T, F, Fut>(max_attempts: u32, mut attempt: F) -> Result<T, AgentError>
where
    F: FnMut(u32, Option<String>) -> Fut,
    Fut: Future<Output = AttemptOutcome<T>>,
{
    let mut last_reason: Option<String> = None;
    for n in 1..=max_attempts {
        match attempt(n, last_reason.take()).await {
            AttemptOutcome::Ready(value) => return Ok(value),
            AttemptOutcome::Fatal(err) => return Err(err),
            AttemptOutcome::Retryable(reason) => {
                tracing::warn!(attempt = n, max_attempts, "Attempt rejected");
                last_reason = Some(reason);
            }
        }
    }
    Err(AgentError::GenerationFailed {
        attempts: max_attempts,
        message: last_reason.unwrap_or_else(|| "no attempts were made".to_string()),
    })
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

/// Context that went into a generated patch.
#[derive(Debug, Clone, Serialize)]
pub struct ContextSummary {
    pub strategy: ContextStrategy,
    pub keywords: Vec<String>,
    pub files: Vec<String>,
}

/// A freshly generated, validated patch.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedPatch {
    pub record: PatchRecord,
    pub warnings: Vec<String>,
    pub quality: QualityAssessment,
    pub context: ContextSummary,
}

pub struct PatchGenerator {
    provider: Arc<dyn ChatProvider>,
    analyzer: CodebaseAnalyzer,
    gatherer: ContextGatherer,
    builder: ContextBuilder,
    limits: ContextLimits,
    max_attempts: u32,
    ids: PatchIdSequence,
}

impl PatchGenerator {
    pub fn new(
        provider: Arc<dyn ChatProvider>,
        source: Arc<dyn FileSource>,
        root_name: impl Into<String>,
        limits: ContextLimits,
    ) -> Self {
        Self {
            provider,
            analyzer: CodebaseAnalyzer::new(Arc::clone(&source), root_name),
            gatherer: ContextGatherer::new(Arc::clone(&source)),
            builder: ContextBuilder::new(source),
            limits,
            max_attempts: MAX_GENERATION_ATTEMPTS,
            ids: PatchIdSequence::new(),
        }
    }

    pub fn analyzer(&self) -> &CodebaseAnalyzer {
        &self.analyzer
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Generate a validated patch for `request`.
    pub async fn generate_patch(
        &self,
        request: &str,
        user_id: Option<DbId>,
    ) -> Result<GeneratedPatch, AgentError> {
        validate_request_text(request)?;

        let paths = match self.analyzer.list_project_files().await {
            Ok(paths) => paths,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to list project; generating without context");
                Vec::new()
            }
        };
        let analysis = self.analyzer.analyze_paths(&paths).await;
        let conventions = RouteConventions::from_paths(paths.iter().map(String::as_str));
        let gathered = self.gatherer.gather_from_paths(&paths, request, self.limits).await;
        let built = self.builder.build(&paths, self.limits.max_file_size).await;

        let strategy = gathered.strategy;
        let keywords = gathered.keywords;
        let files = merge_files(built.files, gathered.files);
        let context = ContextSummary {
            strategy,
            keywords,
            files: files.iter().map(|f| f.path.clone()).collect(),
        };

        let prompt_input = PromptInput {
            request,
            analysis: &analysis,
            files: &files,
            component_inventory: &built.component_inventory,
        };

        let input = &prompt_input;
        let (patch, mut warnings) = retry_bounded(self.max_attempts, move |n, previous| {
            self.attempt(input, n, previous)
        })
        .await
        .inspect_err(|e| tracing::error!(error = %e, "Patch generation failed"))?;

        warnings.extend(conventions.check(&patch));
        let quality = assess_patch_quality(&patch);

        let id = self.ids.next_id(chrono::Utc::now());
        let mut record = PatchRecord::new(id, request, patch, user_id);
        record.quality_score = Some(quality.score);

        tracing::info!(
            patch_id = %record.id,
            files = record.files.len(),
            warnings = warnings.len(),
            quality = quality.score,
            "Generated patch",
        );

        Ok(GeneratedPatch {
            record,
            warnings,
            quality,
            context,
        })
    }

    async fn attempt(
        &self,
        input: &PromptInput<'_>,
        n: u32,
        previous_error: Option<String>,
    ) -> AttemptOutcome<(PatchData, Vec<String>)> {
        let system = build_system_prompt(input, previous_error.as_deref());
        tracing::debug!(attempt = n, prompt_len = system.len(), model = self.provider.model_name(), "Requesting patch");

        let raw = match self.provider.complete_json(&system, input.request).await {
            Ok(raw) => raw,
            Err(e) => return AttemptOutcome::Fatal(e),
        };

        let patch = match decode_patch(&raw) {
            Ok(patch) => patch,
            Err(result) => return AttemptOutcome::Retryable(format_error_message(&result)),
        };

        let result = validate(&patch, Some(input.request));
        if !result.valid {
            return AttemptOutcome::Retryable(format_error_message(&result));
        }
        for warning in &result.warnings {
            tracing::warn!(attempt = n, %warning, "Patch validation warning");
        }
        AttemptOutcome::Ready((patch, result.warnings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retry_bounded_stops_on_ready() {
        let calls = AtomicU32::new(0);
        let result = retry_bounded(3, |n, _| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 2 {
                    AttemptOutcome::Ready(n)
                } else {
                    AttemptOutcome::Retryable(format!("bad {n}"))
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn retry_bounded_feeds_previous_reason() {
        let seen = std::sync::Mutex::new(Vec::new());
        let _ = retry_bounded::<(), _, _>(3, |_, prev| {
            seen.lock().unwrap().push(prev);
            async { AttemptOutcome::Retryable("nope".into()) }
        })
        .await;
        assert_eq!(
            *seen.lock().unwrap(),
            vec![None, Some("nope".to_string()), Some("nope".to_string())]
        );
    }

    #[tokio::test]
    async fn retry_bounded_exhaustion_carries_last_reason() {
        let result = retry_bounded::<(), _, _>(3, |n, _| async move {
            AttemptOutcome::Retryable(format!("reason {n}"))
        })
        .await;
        assert_matches!(
            result,
            Err(AgentError::GenerationFailed { attempts: 3, ref message }) if message == "reason 3"
        );
    }

    #[tokio::test]
    async fn retry_bounded_fatal_stops_immediately() {
        let calls = AtomicU32::new(0);
        let result = retry_bounded::<(), _, _>(3, |_, _| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { AttemptOutcome::Fatal(AgentError::Llm("HTTP 401".into())) }
        })
        .await;
        assert_matches!(result, Err(AgentError::Llm(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

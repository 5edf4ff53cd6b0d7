//! The patch pipeline as one injectable service.
//!
//! [`PatchService`] owns the generator, the sink chosen for this deployment
//! and the patch store. It is built once at startup and shared behind an
//! `Arc`.

use std::sync::Arc;

use serde::Serialize;

use apex_core::analysis::CodebaseAnalysis;
use apex_core::error::CoreError;
use apex_core::patch::{validate_patch_id, PatchRecord, PatchStatus};
use apex_core::types::DbId;

use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::file_source::{FileSource, GithubFileSource, LocalFileSource};
use crate::generator::{GeneratedPatch, PatchGenerator};
use crate::github::GithubClient;
use crate::llm::{ChatProvider, OpenAiClient};
use crate::sink::{LocalFilesystemSink, LocalSinkOptions, PatchSink, RemoteCommitSink};
use crate::store::PatchStore;

/// Result of a one-shot "generate, then maybe apply" command.
#[derive(Debug, Clone, Serialize)]
pub struct CommandOutcome {
    #[serde(flatten)]
    pub generated: GeneratedPatch,
    pub applied: bool,
}

pub struct PatchService {
    generator: PatchGenerator,
    sink: Arc<dyn PatchSink>,
    store: Arc<dyn PatchStore>,
}

impl PatchService {
    pub fn new(
        generator: PatchGenerator,
        sink: Arc<dyn PatchSink>,
        store: Arc<dyn PatchStore>,
    ) -> Self {
        Self {
            generator,
            sink,
            store,
        }
    }

    /// Wire the pipeline for `config`. Production with a configured
    /// repository reads from and commits to GitHub; everything else works
    /// on `project_root`.
    pub fn from_config(
        config: &AgentConfig,
        store: Arc<dyn PatchStore>,
    ) -> Result<Self, AgentError> {
        let provider: Arc<dyn ChatProvider> = Arc::new(OpenAiClient::new(&config.openai)?);

        let remote = match &config.github {
            Some(github) if config.environment.is_production() => {
                Some(Arc::new(GithubClient::new(github.clone())?))
            }
            _ => None,
        };

        let (source, sink, root_name): (Arc<dyn FileSource>, Arc<dyn PatchSink>, String) =
            match remote {
                Some(client) if config.uses_remote_sink() => {
                    let root_name = client.repo_key();
                    (
                        Arc::new(GithubFileSource::new(Arc::clone(&client))),
                        Arc::new(RemoteCommitSink::new(client)),
                        root_name,
                    )
                }
                _ => {
                    let options = LocalSinkOptions {
                        type_check_command: if config.environment.is_production() {
                            None
                        } else {
                            config.type_check_command.clone()
                        },
                        git_auto_commit: config.git_auto_commit,
                        git_auto_push: config.git_auto_push,
                    };
                    let root = &config.project_root;
                    let root_name = std::fs::canonicalize(root)
                        .ok()
                        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
                        .unwrap_or_else(|| root.display().to_string());
                    (
                        Arc::new(LocalFileSource::new(root.clone())),
                        Arc::new(LocalFilesystemSink::new(root.clone(), options)),
                        root_name,
                    )
                }
            };

        tracing::info!(
            environment = ?config.environment,
            source = %source.describe(),
            sink = sink.kind(),
            model = %config.openai.model,
            "Patch service configured",
        );

        let generator = PatchGenerator::new(provider, source, root_name, config.context);
        Ok(Self::new(generator, sink, store))
    }

    /// `"local"` or `"remote"`.
    pub fn sink_kind(&self) -> &'static str {
        self.sink.kind()
    }

    pub fn model_name(&self) -> &str {
        self.generator.model_name()
    }

    pub async fn analyze_codebase(&self) -> Result<CodebaseAnalysis, AgentError> {
        self.generator.analyzer().analyze().await
    }

    /// Generate a patch and store it as `pending`.
    pub async fn generate_patch(
        &self,
        request: &str,
        user_id: Option<DbId>,
    ) -> Result<GeneratedPatch, AgentError> {
        let generated = self.generator.generate_patch(request, user_id).await?;
        self.store.save(&generated.record).await?;
        Ok(generated)
    }

    pub async fn get_patch(&self, id: &str) -> Result<PatchRecord, AgentError> {
        validate_patch_id(id)?;
        self.store
            .find(id)
            .await?
            .ok_or_else(|| AgentError::NotFound(id.to_string()))
    }

    pub async fn patch_history(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PatchRecord>, AgentError> {
        self.store.list_recent(limit, offset).await
    }

    /// Apply a stored patch. The resulting status is persisted whether the
    /// sink succeeds or fails.
    pub async fn apply_patch(&self, id: &str) -> Result<PatchRecord, AgentError> {
        let mut record = self.get_patch(id).await?;
        if record.status == PatchStatus::Applied {
            return Err(CoreError::Conflict(format!("Patch {id} is already applied")).into());
        }
        self.apply_record(&mut record).await?;
        Ok(record)
    }

    async fn apply_record(&self, record: &mut PatchRecord) -> Result<(), AgentError> {
        let result = self.sink.apply_patch(record).await;
        if let Err(e) = &result {
            if record.status != PatchStatus::Failed {
                record.transition(PatchStatus::Failed, Some(e.to_string()));
            }
        }
        self.store.save_status(record).await?;
        result.map(|_| ())
    }

    /// Undo an applied patch.
    pub async fn rollback_patch(&self, id: &str) -> Result<PatchRecord, AgentError> {
        let mut record = self.get_patch(id).await?;
        if record.status != PatchStatus::Applied {
            return Err(CoreError::Conflict(format!(
                "Patch {id} is {}, only applied patches can be rolled back",
                record.status
            ))
            .into());
        }
        if !self.sink.rollback_patch(&mut record).await? {
            return Err(AgentError::RollbackUnavailable(id.to_string()));
        }
        self.store.save_status(&record).await?;
        tracing::info!(patch_id = %id, "Rolled back patch");
        Ok(record)
    }

    /// Generate a patch and, if asked, apply it straight away. An apply
    /// failure is reported through the record's status and error.
    pub async fn execute_command(
        &self,
        request: &str,
        auto_apply: bool,
        user_id: Option<DbId>,
    ) -> Result<CommandOutcome, AgentError> {
        let mut generated = self.generate_patch(request, user_id).await?;
        if !auto_apply {
            return Ok(CommandOutcome {
                generated,
                applied: false,
            });
        }

        let applied = match self.apply_record(&mut generated.record).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(patch_id = %generated.record.id, error = %e, "Auto-apply failed");
                false
            }
        };
        Ok(CommandOutcome { generated, applied })
    }
}

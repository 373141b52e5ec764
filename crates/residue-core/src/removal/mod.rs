//! Removal executor.
//!
//! Artifacts are removed in a fixed order: services first (so their binaries
//! are released), then registry keys, files, and finally directories with the
//! deepest paths first. Every artifact yields exactly one [`RemovalResult`].

pub mod ladder;

use std::cmp::Reverse;
use std::io;
use std::path::Path;
use std::thread;

use serde::{Deserialize, Serialize};

use crate::context::RunContext;
use crate::error::RemovalError;
use crate::platform::is_in_use;
use crate::types::{Artifact, ArtifactType, Presence, RemovalResult, RetryStrategy, normalize_key};

pub use ladder::{Escalation, Ladder, LadderOutcome};

/// Aggregate outcome of a removal pass; the `cleanupCompleted` payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovalSummary {
    pub removed: usize,
    pub failed: usize,
    pub reboot_pending: usize,
    pub freed_bytes: u64,
    pub dry_run: bool,
}

impl RemovalSummary {
    pub fn from_results(results: &[RemovalResult], dry_run: bool) -> Self {
        let mut summary = Self {
            dry_run,
            ..Self::default()
        };
        for result in results {
            match (result.success, result.reboot_pending) {
                (false, _) => summary.failed += 1,
                (true, true) => summary.reboot_pending += 1,
                (true, false) => summary.removed += 1,
            }
            summary.freed_bytes += result.freed_bytes;
        }
        summary
    }
}

fn type_rank(artifact_type: ArtifactType) -> u8 {
    match artifact_type {
        ArtifactType::Service => 0,
        ArtifactType::Registry => 1,
        ArtifactType::File => 2,
        ArtifactType::Directory => 3,
    }
}

fn depth(path: &str) -> usize {
    normalize_key(path).split('\\').filter(|c| !c.is_empty()).count()
}

/// Artifacts in execution order.
pub fn removal_order<'a>(artifacts: &[&'a Artifact]) -> Vec<&'a Artifact> {
    let mut ordered = artifacts.to_vec();
    ordered.sort_by_cached_key(|a| {
        let deepest_first = match a.artifact_type {
            ArtifactType::Directory => Reverse(depth(&a.path)),
            _ => Reverse(0),
        };
        (type_rank(a.artifact_type), deepest_first, normalize_key(&a.path))
    });
    ordered
}

pub struct RemovalExecutor<'a> {
    ctx: &'a RunContext,
    dry_run: bool,
}

impl<'a> RemovalExecutor<'a> {
    pub fn new(ctx: &'a RunContext, dry_run: bool) -> Self {
        Self { ctx, dry_run }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Remove every artifact in execution order.
    pub fn execute(&self, artifacts: &[&Artifact]) -> (Vec<RemovalResult>, RemovalSummary) {
        let results: Vec<RemovalResult> = removal_order(artifacts)
            .into_iter()
            .map(|artifact| self.remove(artifact))
            .collect();
        let summary = RemovalSummary::from_results(&results, self.dry_run);
        (results, summary)
    }

    /// Remove a single artifact. Errors are folded into the result.
    pub fn remove(&self, artifact: &Artifact) -> RemovalResult {
        let mut result = match self.ctx.guard().check(artifact) {
            Err(err) => {
                tracing::warn!(id = %artifact.id, error = %err, "artifact is protected");
                RemovalResult::failed(&artifact.id, err.to_string())
            }
            Ok(()) if self.dry_run => {
                tracing::info!(id = %artifact.id, path = %artifact.path, "dry run: would remove");
                RemovalResult::succeeded(&artifact.id, artifact.size_bytes.unwrap_or(0))
            }
            Ok(()) => match artifact.artifact_type {
                ArtifactType::Registry => self.remove_registry(artifact),
                ArtifactType::Service => self.remove_service(artifact),
                ArtifactType::File | ArtifactType::Directory => self.remove_path(artifact),
            },
        };
        result.dry_run = self.dry_run;
        tracing::debug!(
            id = %artifact.id,
            success = result.success,
            strategy = ?result.retry_strategy,
            "removal finished"
        );
        result
    }

    fn remove_registry(&self, artifact: &Artifact) -> RemovalResult {
        let registry = self.ctx.registry();
        self.retry_once(artifact, || registry.delete_tree(&artifact.path).map(|_| ()))
    }

    fn remove_service(&self, artifact: &Artifact) -> RemovalResult {
        let services = self.ctx.services();
        self.retry_once(artifact, || {
            services.stop(&artifact.path)?;
            services.delete(&artifact.path)?;
            Ok(())
        })
    }

    /// Registry keys and services: one delayed retry, no further escalation.
    fn retry_once<F>(&self, artifact: &Artifact, mut attempt: F) -> RemovalResult
    where
        F: FnMut() -> anyhow::Result<()>,
    {
        let Err(first) = attempt() else {
            return RemovalResult::succeeded(&artifact.id, 0);
        };
        tracing::info!(id = %artifact.id, error = %first, "removal failed, retrying after delay");
        thread::sleep(self.ctx.config().removal.retry_delay());

        let mut result = match attempt() {
            Ok(()) => RemovalResult::succeeded(&artifact.id, 0),
            Err(err) => {
                let err = RemovalError::Failed {
                    artifact_type: artifact.artifact_type,
                    path: artifact.path.clone(),
                    reason: format!("{:#}", err),
                };
                tracing::warn!(id = %artifact.id, error = %err, "removal failed");
                RemovalResult::failed(&artifact.id, err.to_string())
            }
        };
        result.retry_strategy = Some(RetryStrategy::RetryAfterDelay);
        result
    }

    fn remove_path(&self, artifact: &Artifact) -> RemovalResult {
        let fs = self.ctx.filesystem();
        let path = Path::new(&artifact.path);
        match fs.probe(path) {
            Ok(Presence::Absent) => {
                tracing::debug!(id = %artifact.id, "already absent");
                return RemovalResult::succeeded(&artifact.id, 0);
            }
            Ok(_) => {}
            Err(err) => {
                return self.path_failure(artifact, err);
            }
        }

        let freed = artifact
            .size_bytes
            .or_else(|| fs.size(path).ok())
            .unwrap_or(0);
        let attempt = || match artifact.artifact_type {
            ArtifactType::Directory => fs.remove_dir_all(path),
            _ => fs.remove_file(path),
        };

        let first_error = match attempt() {
            Ok(()) => return RemovalResult::succeeded(&artifact.id, freed),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return RemovalResult::succeeded(&artifact.id, 0);
            }
            Err(err) if is_in_use(&err) => err,
            Err(err) => return self.path_failure(artifact, err),
        };

        let escalation =
            Ladder::new(self.ctx).climb(artifact.artifact_type, path, first_error, attempt);
        let mut result = match escalation.outcome {
            LadderOutcome::Removed => RemovalResult::succeeded(&artifact.id, freed),
            LadderOutcome::RebootPending => {
                let mut pending = RemovalResult::succeeded(&artifact.id, 0);
                pending.reboot_pending = true;
                pending
            }
            LadderOutcome::Failed(err) => {
                tracing::warn!(id = %artifact.id, error = %err, "removal failed after escalation");
                RemovalResult::failed(&artifact.id, err.to_string())
            }
        };
        result.retry_strategy = escalation.last_step;
        result
    }

    fn path_failure(&self, artifact: &Artifact, err: io::Error) -> RemovalResult {
        let err = RemovalError::Failed {
            artifact_type: artifact.artifact_type,
            path: artifact.path.clone(),
            reason: err.to_string(),
        };
        tracing::warn!(id = %artifact.id, error = %err, "removal failed");
        RemovalResult::failed(&artifact.id, err.to_string())
    }
}

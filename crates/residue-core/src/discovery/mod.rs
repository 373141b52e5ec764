//! Artifact discovery.
//!
//! Each heuristic is independent and additive. Results are unioned by a
//! case-insensitive `type:path` key; the first heuristic to report an
//! artifact owns its `discoverySource`. A heuristic that fails or runs out of
//! time is recorded in the report and the remaining heuristics still run.

pub mod filesystem;
pub mod install_location;
pub mod registry;
pub mod services;

use std::collections::HashSet;
use std::io;
use std::path::Path;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::cancel::Deadline;
use crate::context::RunContext;
use crate::error::DiscoveryError;
use crate::inventory::ApplicationRecord;
use crate::types::{Artifact, DiscoverySource, normalize_key};

pub use filesystem::FilesystemScan;
pub use install_location::{InstallLocation, command_executable};
pub use registry::{RegistrySoftwareKeys, RegistryUninstallScan};
pub use services::ServiceTableScan;

/// What a heuristic sees.
pub struct DiscoveryInput<'a> {
    pub ctx: &'a RunContext,
    pub app: &'a ApplicationRecord,
    /// Lower-cased name tokens
    pub tokens: &'a [String],
    /// Artifacts merged from the heuristics that ran before this one
    pub found: &'a [Artifact],
    pub deadline: Deadline,
}

impl DiscoveryInput<'_> {
    pub fn check_deadline(&self) -> Result<(), DiscoveryError> {
        if self.deadline.expired() {
            return Err(DiscoveryError::TimedOut(self.deadline.limit()));
        }
        Ok(())
    }

    /// Size of a discovered path, charged against this heuristic's budget.
    ///
    /// Other sizing failures leave the size unknown.
    pub fn size_of(&self, path: &Path) -> Result<Option<u64>, DiscoveryError> {
        match self.ctx.filesystem().size_within(path, &self.deadline) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::TimedOut => {
                Err(DiscoveryError::TimedOut(self.deadline.limit()))
            }
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %err, "size unavailable");
                Ok(None)
            }
        }
    }

    /// Whether `text` (any case) contains one of the name tokens.
    pub fn mentions_token(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.tokens.iter().any(|token| lower.contains(token.as_str()))
    }
}

/// Artifacts produced by one heuristic.
#[derive(Debug, Default)]
pub struct HeuristicOutput {
    pub artifacts: Vec<Artifact>,
    /// The heuristic stopped at its match bound
    pub truncated: bool,
}

impl HeuristicOutput {
    pub fn new(artifacts: Vec<Artifact>) -> Self {
        Self {
            artifacts,
            truncated: false,
        }
    }
}

/// One independent strategy for locating artifacts.
pub trait Heuristic {
    fn source(&self) -> DiscoverySource;

    fn discover(&self, input: &DiscoveryInput<'_>) -> Result<HeuristicOutput, DiscoveryError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HeuristicStatus {
    Ok,
    Failed,
}

/// Per-heuristic entry of the discovery report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeuristicReport {
    pub heuristic: DiscoverySource,
    pub status: HeuristicStatus,
    /// Artifacts the heuristic reported (before deduplication)
    pub count: usize,
    pub truncated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryReport {
    pub heuristics: Vec<HeuristicReport>,
    pub total: usize,
}

impl DiscoveryReport {
    pub fn failed(&self) -> impl Iterator<Item = &HeuristicReport> {
        self.heuristics
            .iter()
            .filter(|h| h.status == HeuristicStatus::Failed)
    }
}

/// Deduplicated artifacts plus the per-heuristic report.
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    pub artifacts: Vec<Artifact>,
    pub report: DiscoveryReport,
}

impl Discovery {
    pub fn ids(&self) -> HashSet<&str> {
        self.artifacts.iter().map(|a| a.id.as_str()).collect()
    }
}

/// Lower-cased name tokens: the application name and the last segment of a
/// dotted app id, dropped when shorter than `min_len` characters.
pub fn name_tokens(app: &ApplicationRecord, min_len: usize) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    let candidates = [
        Some(app.name.trim()),
        app.app_id.rsplit('.').next().map(str::trim),
    ];
    for candidate in candidates.into_iter().flatten() {
        let lower = candidate.to_lowercase();
        if lower.chars().count() >= min_len && !tokens.contains(&lower) {
            tokens.push(lower);
        }
    }
    tokens
}

pub struct DiscoveryEngine<'a> {
    ctx: &'a RunContext,
    heuristics: Vec<Box<dyn Heuristic>>,
}

impl<'a> DiscoveryEngine<'a> {
    /// Engine with the standard heuristic set.
    pub fn new(ctx: &'a RunContext) -> Self {
        Self::with_heuristics(
            ctx,
            vec![
                Box::new(RegistryUninstallScan),
                Box::new(RegistrySoftwareKeys),
                Box::new(InstallLocation),
                Box::new(FilesystemScan),
                Box::new(ServiceTableScan),
            ],
        )
    }

    pub fn with_heuristics(ctx: &'a RunContext, heuristics: Vec<Box<dyn Heuristic>>) -> Self {
        Self { ctx, heuristics }
    }

    pub fn discover(&self, app: &ApplicationRecord) -> Discovery {
        let config = &self.ctx.config().discovery;
        let tokens = name_tokens(app, config.min_token_len);
        tracing::info!(app_id = %app.app_id, ?tokens, "discovery started");

        let mut merged: Vec<Artifact> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut report = DiscoveryReport::default();

        for heuristic in &self.heuristics {
            let source = heuristic.source();
            let started = Instant::now();
            let input = DiscoveryInput {
                ctx: self.ctx,
                app,
                tokens: &tokens,
                found: &merged,
                deadline: Deadline::after(config.heuristic_timeout()),
            };
            let outcome = heuristic.discover(&input);
            let elapsed_ms = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(output) => {
                    tracing::debug!(
                        heuristic = %source,
                        count = output.artifacts.len(),
                        truncated = output.truncated,
                        "heuristic completed"
                    );
                    report.heuristics.push(HeuristicReport {
                        heuristic: source,
                        status: HeuristicStatus::Ok,
                        count: output.artifacts.len(),
                        truncated: output.truncated,
                        error: None,
                        elapsed_ms,
                    });
                    for artifact in output.artifacts {
                        if seen.insert(artifact.dedup_key()) {
                            merged.push(artifact);
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(heuristic = %source, error = %err, "heuristic failed, continuing");
                    report.heuristics.push(HeuristicReport {
                        heuristic: source,
                        status: HeuristicStatus::Failed,
                        count: 0,
                        truncated: false,
                        error: Some(err.to_string()),
                        elapsed_ms,
                    });
                }
            }
        }

        merged.sort_by_cached_key(|a| (a.artifact_type, normalize_key(&a.path)));
        report.total = merged.len();
        tracing::info!(total = report.total, "discovery completed");

        Discovery {
            artifacts: merged,
            report,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_cover_name_and_id_segment() {
        let app = ApplicationRecord::new("Mozilla.Firefox", "Mozilla Firefox");
        assert_eq!(name_tokens(&app, 3), vec!["mozilla firefox", "firefox"]);
    }

    #[test]
    fn short_tokens_are_dropped() {
        let app = ApplicationRecord::new("Foo.QT", "QT");
        assert!(name_tokens(&app, 3).is_empty());
    }

    #[test]
    fn duplicate_tokens_collapse() {
        let app = ApplicationRecord::new("vlc", "VLC");
        assert_eq!(name_tokens(&app, 3), vec!["vlc"]);
    }
}

//! Bounded filesystem scan below the configured search roots.

use glob::{MatchOptions, Pattern};
use walkdir::WalkDir;

use super::{DiscoveryInput, Heuristic, HeuristicOutput};
use crate::error::DiscoveryError;
use crate::types::{Artifact, ArtifactType, DiscoverySource};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Entries whose file name contains a name token or matches a configured glob.
///
/// Matched directories are reported whole and not descended into.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilesystemScan;

impl Heuristic for FilesystemScan {
    fn source(&self) -> DiscoverySource {
        DiscoverySource::FilesystemScan
    }

    fn discover(&self, input: &DiscoveryInput<'_>) -> Result<HeuristicOutput, DiscoveryError> {
        let config = &input.ctx.config().discovery;
        let patterns = compile_patterns(&config.patterns, input.tokens)?;
        if input.tokens.is_empty() && patterns.is_empty() {
            tracing::debug!("no usable name tokens or patterns, skipping filesystem scan");
            return Ok(HeuristicOutput::default());
        }

        let guard = input.ctx.guard();
        let mut output = HeuristicOutput::default();

        'roots: for root in config.resolved_search_roots() {
            if !root.is_dir() {
                tracing::debug!(root = %root.display(), "search root missing, skipping");
                continue;
            }
            let mut walker = WalkDir::new(&root)
                .min_depth(1)
                .max_depth(config.max_depth)
                .sort_by_file_name()
                .into_iter();

            while let Some(entry) = walker.next() {
                input.check_deadline()?;
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(err) => {
                        tracing::debug!(error = %err, "skipping unreadable entry");
                        continue;
                    }
                };
                let name = entry.file_name().to_string_lossy();
                if !(input.mentions_token(&name) || matches_any(&patterns, &name)) {
                    continue;
                }

                let is_dir = entry.file_type().is_dir();
                if is_dir {
                    walker.skip_current_dir();
                }
                let path = entry.path().to_string_lossy().into_owned();
                let artifact_type = if is_dir {
                    ArtifactType::Directory
                } else {
                    ArtifactType::File
                };
                if guard.is_protected(artifact_type, &path) {
                    continue;
                }
                if output.artifacts.len() >= config.max_matches {
                    tracing::warn!(
                        max_matches = config.max_matches,
                        "filesystem scan reached its match bound"
                    );
                    output.truncated = true;
                    break 'roots;
                }
                let size = input.size_of(entry.path())?;
                output.artifacts.push(Artifact::new(
                    artifact_type,
                    path,
                    size,
                    DiscoverySource::FilesystemScan,
                ));
            }
        }
        Ok(output)
    }
}

/// Compile the configured globs, expanding `{name}` once per name token.
fn compile_patterns(raw: &[String], tokens: &[String]) -> Result<Vec<Pattern>, DiscoveryError> {
    let mut expanded: Vec<String> = Vec::new();
    for pattern in raw {
        if pattern.contains("{name}") {
            expanded.extend(tokens.iter().map(|token| pattern.replace("{name}", token)));
        } else {
            expanded.push(pattern.clone());
        }
    }
    expanded
        .into_iter()
        .map(|pattern| {
            Pattern::new(&pattern).map_err(|err| DiscoveryError::Pattern {
                pattern,
                reason: err.to_string(),
            })
        })
        .collect()
}

fn matches_any(patterns: &[Pattern], name: &str) -> bool {
    patterns
        .iter()
        .any(|pattern| pattern.matches_with(name, MATCH_OPTIONS))
}

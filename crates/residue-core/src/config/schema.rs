//! Configuration schema for residue.toml
//!
//! ```toml
//! [discovery]
//! max_matches = 200
//! search_roots = ["C:\\ProgramData"]
//!
//! [selection]
//! poll_interval_ms = 500
//!
//! [removal]
//! escalation = ["retryAfterDelay", "stopOwningProcess", "scheduleOnReboot"]
//!
//! [run_log]
//! enabled = true
//! ```

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::RetryStrategy;

/// Root configuration structure for residue.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResidueConfig {
    pub discovery: DiscoveryConfig,
    pub selection: SelectionConfig,
    pub removal: RemovalConfig,
    pub run_log: RunLogConfig,
}

impl ResidueConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.discovery.max_matches == 0 {
            anyhow::bail!("discovery.max_matches must be greater than zero");
        }
        if self.discovery.min_token_len == 0 {
            anyhow::bail!("discovery.min_token_len must be greater than zero");
        }
        if self.selection.poll_interval_ms == 0 {
            anyhow::bail!("selection.poll_interval_ms must be greater than zero");
        }
        let mut seen = HashSet::new();
        for strategy in &self.removal.escalation {
            if !seen.insert(*strategy) {
                anyhow::bail!("removal.escalation lists '{}' more than once", strategy);
            }
        }
        Ok(())
    }
}

/// Bounds for the discovery heuristics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiscoveryConfig {
    /// Stop the filesystem scan after this many matches
    pub max_matches: usize,
    /// Depth below each search root the filesystem scan descends to
    pub max_depth: usize,
    /// Name tokens shorter than this are ignored
    pub min_token_len: usize,
    /// Time budget for each heuristic
    pub heuristic_timeout_secs: u64,
    /// Roots for the filesystem scan (platform defaults when unset)
    pub search_roots: Option<Vec<PathBuf>>,
    /// Extra glob patterns; `{name}` expands to each name token
    pub patterns: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_matches: 200,
            max_depth: 2,
            min_token_len: 3,
            heuristic_timeout_secs: 30,
            search_roots: None,
            patterns: Vec::new(),
        }
    }
}

impl DiscoveryConfig {
    pub fn heuristic_timeout(&self) -> Duration {
        Duration::from_secs(self.heuristic_timeout_secs)
    }

    pub fn resolved_search_roots(&self) -> Vec<PathBuf> {
        self.search_roots
            .clone()
            .unwrap_or_else(super::paths::default_search_roots)
    }
}

/// Selection-file wait parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SelectionConfig {
    pub poll_interval_ms: u64,
    pub timeout_secs: u64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            timeout_secs: 600,
        }
    }
}

impl SelectionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Removal executor policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RemovalConfig {
    pub retry_delay_ms: u64,
    /// Escalation steps for in-use files and directories, in order
    pub escalation: Vec<RetryStrategy>,
    /// Locations that are never removed, in addition to the built-in list
    pub protected_paths: Vec<String>,
}

impl Default for RemovalConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: 500,
            escalation: vec![
                RetryStrategy::RetryAfterDelay,
                RetryStrategy::StopOwningProcess,
                RetryStrategy::ScheduleOnReboot,
            ],
            protected_paths: Vec::new(),
        }
    }
}

impl RemovalConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Per-run JSON log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunLogConfig {
    pub enabled: bool,
    pub dir: Option<PathBuf>,
}

impl Default for RunLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}

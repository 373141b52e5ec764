//! Per-run JSON log.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;

use super::RunReport;
use crate::config::{RunLogConfig, default_run_dir};

/// Write the run log; failures are logged and never fail the run.
pub fn persist(config: &RunLogConfig, report: &RunReport) -> Option<PathBuf> {
    let dir = match config.dir.clone().map(Ok).unwrap_or_else(default_run_dir) {
        Ok(dir) => dir,
        Err(err) => {
            tracing::warn!(error = %err, "no run log directory, skipping run log");
            return None;
        }
    };
    match write_run_log(&dir, report) {
        Ok(path) => {
            tracing::info!(path = %path.display(), "run log written");
            Some(path)
        }
        Err(err) => {
            tracing::warn!(error = %format!("{:#}", err), "failed to write run log");
            None
        }
    }
}

/// Create `<dir>/<timestamp>-<appId>.json`; never overwrites an existing log.
pub fn write_run_log(dir: &Path, report: &RunReport) -> anyhow::Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create run log directory {}", dir.display()))?;
    let file_name = format!(
        "{}-{}.json",
        Utc::now().format("%Y%m%dT%H%M%S%.3fZ"),
        file_safe(&report.application.app_id)
    );
    let path = dir.join(file_name);
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .with_context(|| format!("Failed to create run log {}", path.display()))?;
    let content =
        serde_json::to_string_pretty(report).context("Failed to serialize run log")?;
    file.write_all(content.as_bytes())
        .with_context(|| format!("Failed to write run log {}", path.display()))?;
    Ok(path)
}

fn file_safe(app_id: &str) -> String {
    app_id
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' | '_' => c,
            _ => '_',
        })
        .collect()
}

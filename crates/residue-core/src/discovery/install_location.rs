//! Installation directory derived from the uninstall command line.

use std::path::Path;

use super::{DiscoveryInput, Heuristic, HeuristicOutput};
use crate::error::DiscoveryError;
use crate::types::{Artifact, ArtifactType, DiscoverySource, Presence, normalize_key};

/// Launchers whose location says nothing about the application.
const SYSTEM_LAUNCHERS: &[&str] = &["msiexec.exe", "msiexec", "rundll32.exe", "cmd.exe", "powershell.exe"];

/// Directory names uninstallers commonly live in below the install root.
const UNINSTALLER_DIRS: &[&str] = &["uninstall", "uninst", "_uninstall", "uninstaller"];

#[derive(Debug, Clone, Copy, Default)]
pub struct InstallLocation;

impl Heuristic for InstallLocation {
    fn source(&self) -> DiscoverySource {
        DiscoverySource::InstallLocation
    }

    fn discover(&self, input: &DiscoveryInput<'_>) -> Result<HeuristicOutput, DiscoveryError> {
        let fs = input.ctx.filesystem();
        let guard = input.ctx.guard();
        let mut artifacts: Vec<Artifact> = Vec::new();

        for command in input.app.uninstall_commands() {
            input.check_deadline()?;
            let Some(executable) = command_executable(command) else {
                continue;
            };
            let Some(dir) = install_dir_of(&executable) else {
                continue;
            };
            if guard.is_protected(ArtifactType::Directory, &dir) {
                tracing::debug!(dir = %dir, "install location is protected, skipping");
                continue;
            }
            let path = Path::new(&dir);
            match fs.probe(path) {
                Ok(Presence::Present) if path.is_dir() => {}
                Ok(_) => continue,
                Err(err) => {
                    return Err(DiscoveryError::Backend(anyhow::Error::new(err).context(
                        format!("Failed to probe install location {}", dir),
                    )));
                }
            }
            let artifact = Artifact::new(
                ArtifactType::Directory,
                dir.clone(),
                input.size_of(path)?,
                DiscoverySource::InstallLocation,
            );
            if !artifacts.iter().any(|a| a.id == artifact.id) {
                artifacts.push(artifact);
            }
        }
        Ok(HeuristicOutput::new(artifacts))
    }
}

/// Executable path of a command line, quoted or not.
///
/// Unquoted paths may contain spaces, so everything up to the first `.exe`
/// is taken when present. Returns `None` for well-known system launchers.
pub fn command_executable(command: &str) -> Option<String> {
    let command = command.trim();
    let executable = if let Some(rest) = command.strip_prefix('"') {
        rest.split('"').next()?.to_string()
    } else if let Some(end) = command.to_ascii_lowercase().find(".exe") {
        command[..end + ".exe".len()].to_string()
    } else {
        command.split_whitespace().next()?.to_string()
    };
    let executable = executable.trim().to_string();
    if executable.is_empty() {
        return None;
    }
    let file_name = file_name_of(&executable).to_ascii_lowercase();
    if SYSTEM_LAUNCHERS.contains(&file_name.as_str()) {
        return None;
    }
    Some(executable)
}

/// Parent directory of an executable, skipping a trailing uninstaller folder.
fn install_dir_of(executable: &str) -> Option<String> {
    let parent = parent_of(executable)?;
    let folder = file_name_of(parent).to_ascii_lowercase();
    let dir = if UNINSTALLER_DIRS.contains(&folder.as_str()) {
        parent_of(parent)?
    } else {
        parent
    };
    // Relative launchers ("helper.exe") carry no location.
    if normalize_key(dir).is_empty() {
        return None;
    }
    Some(dir.to_string())
}

fn parent_of(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches(['\\', '/']);
    let idx = trimmed.rfind(['\\', '/'])?;
    let parent = &trimmed[..idx];
    if parent.is_empty() {
        // "/foo.exe" has the root as parent
        return Some(&trimmed[..=idx]);
    }
    Some(parent)
}

fn file_name_of(path: &str) -> &str {
    let trimmed = path.trim_end_matches(['\\', '/']);
    trimmed
        .rfind(['\\', '/'])
        .map(|idx| &trimmed[idx + 1..])
        .unwrap_or(trimmed)
}

//! Protected-location guard applied before any removal.

use std::collections::HashSet;
use std::path::PathBuf;

use crate::error::RemovalError;
use crate::platform::path_within;
use crate::types::{Artifact, ArtifactType, normalize_key};

const PROTECTED_REGISTRY_KEYS: &[&str] = &[
    r"HKLM\SOFTWARE",
    r"HKLM\SOFTWARE\WOW6432Node",
    r"HKLM\SOFTWARE\Microsoft",
    r"HKLM\SOFTWARE\Microsoft\Windows\CurrentVersion\Uninstall",
    r"HKLM\SOFTWARE\WOW6432Node\Microsoft\Windows\CurrentVersion\Uninstall",
    r"HKLM\SYSTEM",
    r"HKLM\SYSTEM\CurrentControlSet",
    r"HKLM\SYSTEM\CurrentControlSet\Services",
    r"HKCU\SOFTWARE",
    r"HKCU\SOFTWARE\Microsoft",
    r"HKCU\SOFTWARE\Microsoft\Windows\CurrentVersion\Uninstall",
];

const PROTECTED_UNIX_DIRS: &[&str] = &[
    "/bin", "/boot", "/etc", "/lib", "/lib64", "/opt", "/proc", "/sbin", "/sys", "/usr",
    "/usr/bin", "/usr/lib", "/usr/local", "/usr/share", "/var", "/var/lib",
];

/// Rejects artifacts that name a system root or a shared container directory.
///
/// Containers (`Program Files`, `AppData`, the home directory...) are protected
/// only by exact match; entries below them stay removable. The Windows
/// directory is protected together with everything below it.
#[derive(Debug, Clone)]
pub struct ProtectionGuard {
    exact: HashSet<String>,
    trees: Vec<String>,
}

impl Default for ProtectionGuard {
    fn default() -> Self {
        Self::new(&[])
    }
}

impl ProtectionGuard {
    pub fn new(extra: &[String]) -> Self {
        let mut exact: HashSet<String> = PROTECTED_REGISTRY_KEYS
            .iter()
            .chain(PROTECTED_UNIX_DIRS)
            .map(|p| normalize_key(p))
            .collect();
        let mut trees = Vec::new();

        let env_containers = [
            "ProgramFiles",
            "ProgramFiles(x86)",
            "ProgramW6432",
            "ProgramData",
            "APPDATA",
            "LOCALAPPDATA",
            "USERPROFILE",
            "PUBLIC",
            "TEMP",
        ];
        for var in env_containers {
            if let Some(value) = std::env::var_os(var) {
                exact.insert(normalize_key(&value.to_string_lossy()));
            }
        }
        let dir_containers: [Option<PathBuf>; 7] = [
            dirs::home_dir(),
            dirs::data_dir(),
            dirs::data_local_dir(),
            dirs::config_dir(),
            dirs::cache_dir(),
            dirs::document_dir(),
            dirs::desktop_dir(),
        ];
        for dir in dir_containers.into_iter().flatten() {
            exact.insert(normalize_key(&dir.to_string_lossy()));
        }
        for var in ["SystemRoot", "windir"] {
            if let Some(value) = std::env::var_os(var) {
                trees.push(normalize_key(&value.to_string_lossy()));
            }
        }
        for path in extra {
            exact.insert(normalize_key(path));
        }

        Self { exact, trees }
    }

    pub fn is_protected(&self, artifact_type: ArtifactType, path: &str) -> bool {
        let key = normalize_key(path);
        if key.is_empty() || key == "\\" || is_drive_root(&key) {
            return true;
        }
        if artifact_type == ArtifactType::Registry && !key.contains('\\') {
            return true;
        }
        if self.exact.contains(&key) {
            return true;
        }
        matches!(artifact_type, ArtifactType::File | ArtifactType::Directory)
            && self.trees.iter().any(|tree| path_within(&key, tree))
    }

    pub fn check(&self, artifact: &Artifact) -> Result<(), RemovalError> {
        if self.is_protected(artifact.artifact_type, &artifact.path) {
            return Err(RemovalError::Protected(artifact.path.clone()));
        }
        Ok(())
    }
}

fn is_drive_root(key: &str) -> bool {
    let bytes = key.as_bytes();
    match bytes.len() {
        2 => bytes[0].is_ascii_alphabetic() && bytes[1] == b':',
        3 => bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && bytes[2] == b'\\',
        _ => false,
    }
}

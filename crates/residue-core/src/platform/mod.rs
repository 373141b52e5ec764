//! Host operations behind traits.
//!
//! Discovery, removal and verification never touch the registry, the service
//! table or the process list directly; they go through these backends held by
//! the [`RunContext`](crate::context::RunContext).

pub mod fs;
pub mod guard;
pub mod process;
pub mod registry;
pub mod services;

use std::io;
use std::path::{Path, PathBuf};

use crate::cancel::Deadline;
use crate::types::Presence;

pub use fs::LocalFileSystem;
pub use guard::ProtectionGuard;
pub use process::SysinfoProcesses;
pub use registry::{Hive, RegistryPath, UnavailableRegistry};
pub use services::UnavailableServices;

#[cfg(windows)]
pub use registry::WindowsRegistry;
#[cfg(windows)]
pub use services::WindowsServices;

/// Registry access on `HIVE\sub\key` path strings.
pub trait RegistryBackend {
    /// Whether this host has a registry at all.
    fn is_available(&self) -> bool;

    /// Names of the direct subkeys; empty when the key does not exist.
    fn subkeys(&self, path: &str) -> anyhow::Result<Vec<String>>;

    /// A string value of a key; `None` when the key or value is missing.
    fn string_value(&self, path: &str, name: &str) -> anyhow::Result<Option<String>>;

    fn probe(&self, path: &str) -> anyhow::Result<Presence>;

    /// Delete a key and everything below it. Returns `false` if it was absent.
    fn delete_tree(&self, path: &str) -> anyhow::Result<bool>;
}

/// A row of the host's service table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub name: String,
    pub display_name: Option<String>,
    pub binary_path: Option<String>,
}

impl ServiceInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            binary_path: None,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn with_binary_path(mut self, binary_path: impl Into<String>) -> Self {
        self.binary_path = Some(binary_path.into());
        self
    }
}

/// Service control.
pub trait ServiceBackend {
    fn is_available(&self) -> bool;

    fn list(&self) -> anyhow::Result<Vec<ServiceInfo>>;

    fn probe(&self, name: &str) -> anyhow::Result<Presence>;

    /// Stop a service. Stopping one that is not running succeeds.
    fn stop(&self, name: &str) -> anyhow::Result<()>;

    /// Delete a service. Returns `false` if it did not exist.
    fn delete(&self, name: &str) -> anyhow::Result<bool>;
}

/// Filesystem mutation and existence checks used by removal and verification.
pub trait FileSystemBackend {
    fn probe(&self, path: &Path) -> io::Result<Presence>;

    /// Bytes occupied by a file, or by every file below a directory.
    fn size(&self, path: &Path) -> io::Result<u64>;

    /// [`size`](Self::size), failing with `ErrorKind::TimedOut` once `deadline` passes.
    fn size_within(&self, path: &Path, deadline: &Deadline) -> io::Result<u64>;

    fn remove_file(&self, path: &Path) -> io::Result<()>;

    fn remove_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Register the path (and its contents) for deletion at next boot.
    fn schedule_delete_on_reboot(&self, path: &Path) -> io::Result<()>;
}

/// A running process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub exe: Option<PathBuf>,
}

/// Process lookup and termination for the escalation ladder.
pub trait ProcessBackend {
    /// Processes whose executable lives at or below `path`.
    fn holders(&self, path: &Path) -> anyhow::Result<Vec<ProcessInfo>>;

    fn terminate(&self, pid: u32) -> anyhow::Result<()>;
}

/// Whether an I/O error means the resource is held open by someone else.
pub fn is_in_use(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::ResourceBusy {
        return true;
    }
    // ERROR_SHARING_VIOLATION, ERROR_LOCK_VIOLATION; running images report access denied
    cfg!(windows)
        && (matches!(err.raw_os_error(), Some(32 | 33))
            || err.kind() == io::ErrorKind::PermissionDenied)
}

/// Whether `path` equals `root` or lies below it, compared case-insensitively.
pub fn path_within(path: &str, root: &str) -> bool {
    let path = crate::types::normalize_key(path);
    let root = crate::types::normalize_key(root);
    if root.is_empty() {
        return false;
    }
    path == root
        || path
            .strip_prefix(root.as_str())
            .is_some_and(|rest| rest.starts_with('\\') || root.ends_with('\\'))
}

//! Local filesystem backend.

use std::io;
use std::path::Path;

use walkdir::WalkDir;

use super::FileSystemBackend;
use crate::cancel::Deadline;
use crate::types::Presence;

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    pub fn new() -> Self {
        Self
    }
}

impl FileSystemBackend for LocalFileSystem {
    fn probe(&self, path: &Path) -> io::Result<Presence> {
        match std::fs::symlink_metadata(path) {
            Ok(_) => Ok(Presence::Present),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Presence::Absent),
            Err(err) => Err(err),
        }
    }

    fn size(&self, path: &Path) -> io::Result<u64> {
        total_size(path, None)
    }

    fn size_within(&self, path: &Path, deadline: &Deadline) -> io::Result<u64> {
        total_size(path, Some(deadline))
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_dir_all(path)
    }

    fn schedule_delete_on_reboot(&self, path: &Path) -> io::Result<()> {
        // Children must be registered before their parent directory.
        for entry in WalkDir::new(path).contents_first(true) {
            let entry = entry.map_err(io::Error::other)?;
            delay_until_reboot(entry.path())?;
        }
        Ok(())
    }
}

#[cfg(windows)]
fn delay_until_reboot(path: &Path) -> io::Result<()> {
    use std::os::windows::ffi::OsStrExt;
    use windows_sys::Win32::Storage::FileSystem::{MOVEFILE_DELAY_UNTIL_REBOOT, MoveFileExW};

    let wide: Vec<u16> = path
        .as_os_str()
        .encode_wide()
        .chain(std::iter::once(0))
        .collect();
    // SAFETY: `wide` is NUL-terminated and outlives the call; a null target means delete.
    let ok = unsafe { MoveFileExW(wide.as_ptr(), std::ptr::null(), MOVEFILE_DELAY_UNTIL_REBOOT) };
    if ok == 0 {
        return Err(io::Error::last_os_error());
    }
    tracing::debug!(path = %path.display(), "scheduled delete on reboot");
    Ok(())
}

#[cfg(not(windows))]
fn delay_until_reboot(path: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!(
            "delete-on-reboot is not supported on this host: {}",
            path.display()
        ),
    ))
}

fn total_size(path: &Path, deadline: Option<&Deadline>) -> io::Result<u64> {
    let metadata = std::fs::symlink_metadata(path)?;
    if !metadata.is_dir() {
        return Ok(metadata.len());
    }
    // Unreadable entries are skipped; the figure is an estimate of freed space.
    let mut total = 0;
    for entry in WalkDir::new(path).into_iter().filter_map(|e| e.ok()) {
        if let Some(deadline) = deadline
            && deadline.expired()
        {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("sizing {} exceeded {:?}", path.display(), deadline.limit()),
            ));
        }
        if entry.file_type().is_file()
            && let Ok(metadata) = entry.metadata()
        {
            total += metadata.len();
        }
    }
    Ok(total)
}

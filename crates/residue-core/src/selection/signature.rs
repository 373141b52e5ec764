//! SHA-256 signatures for selection files.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;
use sha2::{Digest, Sha256};

use crate::error::IntegrityError;

pub const SIGNATURE_SUFFIX: &str = ".sha256";

/// Lowercase hex SHA-256 of `bytes`.
pub fn digest_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// `<path>.sha256`, keeping the original extension.
pub fn signature_path(path: &Path) -> PathBuf {
    let mut raw: OsString = path.as_os_str().to_owned();
    raw.push(SIGNATURE_SUFFIX);
    PathBuf::from(raw)
}

/// Check `bytes` (read from `path`) against the companion signature file.
pub fn verify(path: &Path, bytes: &[u8]) -> Result<(), IntegrityError> {
    let sig_path = signature_path(path);
    let expected = match fs::read_to_string(&sig_path) {
        Ok(content) => content.trim().to_ascii_lowercase(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(IntegrityError::SignatureMissing(sig_path));
        }
        Err(source) => {
            return Err(IntegrityError::Unreadable {
                path: sig_path,
                source,
            });
        }
    };
    let actual = digest_hex(bytes);
    if expected != actual {
        return Err(IntegrityError::DigestMismatch {
            path: path.to_path_buf(),
            expected,
            actual,
        });
    }
    Ok(())
}

/// Write `<path>.sha256` for an existing selection file.
pub fn sign_file(path: &Path) -> anyhow::Result<PathBuf> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let sig_path = signature_path(path);
    fs::write(&sig_path, digest_hex(&bytes))
        .with_context(|| format!("Failed to write {}", sig_path.display()))?;
    tracing::debug!(path = %sig_path.display(), "wrote selection signature");
    Ok(sig_path)
}

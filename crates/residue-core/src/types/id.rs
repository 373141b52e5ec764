//! Deterministic artifact identity.

use sha2::{Digest, Sha256};

use super::ArtifactType;

const ID_HEX_LEN: usize = 16;

/// Normalize a registry or filesystem path for case-insensitive comparison.
///
/// Separators are unified to `\`, runs of separators collapse, trailing
/// separators are dropped and the result is lower-cased.
pub fn normalize_key(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut last_sep = false;
    for ch in path.trim().chars() {
        if ch == '/' || ch == '\\' {
            if !last_sep {
                out.push('\\');
            }
            last_sep = true;
        } else {
            out.extend(ch.to_lowercase());
            last_sep = false;
        }
    }
    while out.len() > 1 && out.ends_with('\\') {
        out.pop();
    }
    out
}

/// Stable id: `<type>-<first 16 hex chars of sha256("type:normalized")>`.
pub fn artifact_id(artifact_type: ArtifactType, path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(artifact_type.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(normalize_key(path).as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("{}-{}", artifact_type, &digest[..ID_HEX_LEN])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_unifies_separators_and_case() {
        assert_eq!(
            normalize_key(r"C:/Program Files//Foo\Bar\"),
            r"c:\program files\foo\bar"
        );
    }

    #[test]
    fn normalize_keeps_bare_root() {
        assert_eq!(normalize_key("/"), r"\");
    }

    #[test]
    fn id_is_case_and_separator_insensitive() {
        let a = artifact_id(ArtifactType::File, r"C:\Users\me\AppData\Foo\log.txt");
        let b = artifact_id(ArtifactType::File, "c:/users/ME/appdata/foo/LOG.txt");
        assert_eq!(a, b);
    }

    #[test]
    fn id_depends_on_type() {
        let file = artifact_id(ArtifactType::File, r"C:\Foo");
        let dir = artifact_id(ArtifactType::Directory, r"C:\Foo");
        assert_ne!(file, dir);
        assert!(file.starts_with("file-"));
        assert!(dir.starts_with("directory-"));
        assert_eq!(file.len(), "file-".len() + ID_HEX_LEN);
    }
}

//! Registry path parsing and backends.

use std::fmt;
use std::str::FromStr;

use super::RegistryBackend;
use crate::types::Presence;

/// Root hive of a registry path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hive {
    LocalMachine,
    CurrentUser,
    ClassesRoot,
    Users,
}

impl Hive {
    pub fn short_name(self) -> &'static str {
        match self {
            Hive::LocalMachine => "HKLM",
            Hive::CurrentUser => "HKCU",
            Hive::ClassesRoot => "HKCR",
            Hive::Users => "HKU",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "HKLM" | "HKEY_LOCAL_MACHINE" => Some(Hive::LocalMachine),
            "HKCU" | "HKEY_CURRENT_USER" => Some(Hive::CurrentUser),
            "HKCR" | "HKEY_CLASSES_ROOT" => Some(Hive::ClassesRoot),
            "HKU" | "HKEY_USERS" => Some(Hive::Users),
            _ => None,
        }
    }
}

/// A parsed `HIVE\sub\key` path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegistryPath {
    pub hive: Hive,
    /// Path below the hive, `\`-separated, empty for the hive itself.
    pub subkey: String,
}

impl RegistryPath {
    pub fn join(&self, child: &str) -> RegistryPath {
        let subkey = if self.subkey.is_empty() {
            child.to_string()
        } else {
            format!("{}\\{}", self.subkey, child)
        };
        RegistryPath {
            hive: self.hive,
            subkey,
        }
    }

    pub fn is_hive_root(&self) -> bool {
        self.subkey.is_empty()
    }
}

impl FromStr for RegistryPath {
    type Err = anyhow::Error;

    fn from_str(path: &str) -> Result<Self, Self::Err> {
        let trimmed = path.trim().trim_matches('\\');
        let (hive, rest) = match trimmed.split_once('\\') {
            Some((hive, rest)) => (hive, rest),
            None => (trimmed, ""),
        };
        let hive = Hive::parse(hive)
            .ok_or_else(|| anyhow::anyhow!("Unknown registry hive in path: {}", path))?;
        let subkey = rest
            .split('\\')
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("\\");
        Ok(RegistryPath { hive, subkey })
    }
}

impl fmt::Display for RegistryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.subkey.is_empty() {
            f.write_str(self.hive.short_name())
        } else {
            write!(f, "{}\\{}", self.hive.short_name(), self.subkey)
        }
    }
}

/// Registry stand-in for hosts without one.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableRegistry;

impl RegistryBackend for UnavailableRegistry {
    fn is_available(&self) -> bool {
        false
    }

    fn subkeys(&self, _path: &str) -> anyhow::Result<Vec<String>> {
        anyhow::bail!("registry is not available on this host")
    }

    fn string_value(&self, _path: &str, _name: &str) -> anyhow::Result<Option<String>> {
        anyhow::bail!("registry is not available on this host")
    }

    fn probe(&self, _path: &str) -> anyhow::Result<Presence> {
        Ok(Presence::Unknown)
    }

    fn delete_tree(&self, path: &str) -> anyhow::Result<bool> {
        anyhow::bail!("registry is not available on this host: {}", path)
    }
}

#[cfg(windows)]
pub use windows::WindowsRegistry;

#[cfg(windows)]
mod windows {
    use std::io;

    use anyhow::Context;
    use winreg::RegKey;
    use winreg::enums::{
        HKEY_CLASSES_ROOT, HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE, HKEY_USERS,
    };

    use super::{Hive, RegistryPath};
    use crate::platform::RegistryBackend;
    use crate::types::Presence;

    /// The live Windows registry via `winreg`.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct WindowsRegistry;

    impl WindowsRegistry {
        pub fn new() -> Self {
            Self
        }

        fn root(hive: Hive) -> RegKey {
            RegKey::predef(match hive {
                Hive::LocalMachine => HKEY_LOCAL_MACHINE,
                Hive::CurrentUser => HKEY_CURRENT_USER,
                Hive::ClassesRoot => HKEY_CLASSES_ROOT,
                Hive::Users => HKEY_USERS,
            })
        }

        fn open(path: &RegistryPath) -> io::Result<RegKey> {
            Self::root(path.hive).open_subkey(&path.subkey)
        }
    }

    impl RegistryBackend for WindowsRegistry {
        fn is_available(&self) -> bool {
            true
        }

        fn subkeys(&self, path: &str) -> anyhow::Result<Vec<String>> {
            let parsed: RegistryPath = path.parse()?;
            match Self::open(&parsed) {
                Ok(key) => key
                    .enum_keys()
                    .collect::<io::Result<Vec<_>>>()
                    .with_context(|| format!("Failed to enumerate subkeys of {}", parsed)),
                Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
                Err(err) => Err(err).with_context(|| format!("Failed to open {}", parsed)),
            }
        }

        fn string_value(&self, path: &str, name: &str) -> anyhow::Result<Option<String>> {
            let parsed: RegistryPath = path.parse()?;
            let key = match Self::open(&parsed) {
                Ok(key) => key,
                Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
                Err(err) => return Err(err).with_context(|| format!("Failed to open {}", parsed)),
            };
            match key.get_value::<String, _>(name) {
                Ok(value) => Ok(Some(value)),
                Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
                // Non-string values are treated as absent.
                Err(err) if err.kind() == io::ErrorKind::InvalidData => Ok(None),
                Err(err) => {
                    Err(err).with_context(|| format!("Failed to read {}\\{}", parsed, name))
                }
            }
        }

        fn probe(&self, path: &str) -> anyhow::Result<Presence> {
            let parsed: RegistryPath = path.parse()?;
            match Self::open(&parsed) {
                Ok(_) => Ok(Presence::Present),
                Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Presence::Absent),
                Err(err) => Err(err).with_context(|| format!("Failed to open {}", parsed)),
            }
        }

        fn delete_tree(&self, path: &str) -> anyhow::Result<bool> {
            let parsed: RegistryPath = path.parse()?;
            if parsed.is_hive_root() {
                anyhow::bail!("Refusing to delete registry hive {}", parsed);
            }
            match Self::root(parsed.hive).delete_subkey_all(&parsed.subkey) {
                Ok(()) => Ok(true),
                Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
                Err(err) => Err(err).with_context(|| format!("Failed to delete {}", parsed)),
            }
        }
    }
}

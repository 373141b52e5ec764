//! Service table backends.

use super::{ServiceBackend, ServiceInfo};
use crate::types::Presence;

/// Service table stand-in for hosts without Windows services.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableServices;

impl ServiceBackend for UnavailableServices {
    fn is_available(&self) -> bool {
        false
    }

    fn list(&self) -> anyhow::Result<Vec<ServiceInfo>> {
        anyhow::bail!("service control is not available on this host")
    }

    fn probe(&self, _name: &str) -> anyhow::Result<Presence> {
        Ok(Presence::Unknown)
    }

    fn stop(&self, name: &str) -> anyhow::Result<()> {
        anyhow::bail!("service control is not available on this host: {}", name)
    }

    fn delete(&self, name: &str) -> anyhow::Result<bool> {
        anyhow::bail!("service control is not available on this host: {}", name)
    }
}

#[cfg(windows)]
pub use windows::WindowsServices;

#[cfg(windows)]
mod windows {
    use std::path::PathBuf;
    use std::process::Command;

    use anyhow::Context;

    use crate::platform::{RegistryBackend, ServiceBackend, ServiceInfo, WindowsRegistry};
    use crate::types::Presence;

    const SERVICES_KEY: &str = r"HKLM\SYSTEM\CurrentControlSet\Services";

    const ERROR_SERVICE_DOES_NOT_EXIST: i32 = 1060;
    const ERROR_SERVICE_NOT_ACTIVE: i32 = 1062;
    const ERROR_SERVICE_MARKED_FOR_DELETE: i32 = 1072;

    /// Windows services: the table is read from the registry, control goes through `sc.exe`.
    #[derive(Debug, Clone)]
    pub struct WindowsServices {
        registry: WindowsRegistry,
        sc_exe: PathBuf,
    }

    impl WindowsServices {
        /// Resolve `sc.exe` once from `SystemRoot`.
        pub fn new() -> Self {
            let system_root = std::env::var_os("SystemRoot")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(r"C:\Windows"));
            Self::with_sc_path(system_root.join("System32").join("sc.exe"))
        }

        pub fn with_sc_path(sc_exe: PathBuf) -> Self {
            Self {
                registry: WindowsRegistry::new(),
                sc_exe,
            }
        }

        fn sc(&self, args: &[&str]) -> anyhow::Result<(i32, String)> {
            let output = Command::new(&self.sc_exe)
                .args(args)
                .output()
                .with_context(|| format!("Failed to run {}", self.sc_exe.display()))?;
            let code = output.status.code().unwrap_or(-1);
            let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
            Ok((code, text))
        }
    }

    impl Default for WindowsServices {
        fn default() -> Self {
            Self::new()
        }
    }

    impl ServiceBackend for WindowsServices {
        fn is_available(&self) -> bool {
            true
        }

        fn list(&self) -> anyhow::Result<Vec<ServiceInfo>> {
            let mut services = Vec::new();
            for name in self.registry.subkeys(SERVICES_KEY)? {
                let key = format!(r"{}\{}", SERVICES_KEY, name);
                let Some(image_path) = self.registry.string_value(&key, "ImagePath")? else {
                    continue;
                };
                let mut info = ServiceInfo::new(name).with_binary_path(image_path);
                if let Some(display) = self.registry.string_value(&key, "DisplayName")? {
                    info = info.with_display_name(display);
                }
                services.push(info);
            }
            Ok(services)
        }

        fn probe(&self, name: &str) -> anyhow::Result<Presence> {
            self.registry.probe(&format!(r"{}\{}", SERVICES_KEY, name))
        }

        fn stop(&self, name: &str) -> anyhow::Result<()> {
            let (code, text) = self.sc(&["stop", name])?;
            match code {
                0 | ERROR_SERVICE_NOT_ACTIVE | ERROR_SERVICE_DOES_NOT_EXIST => Ok(()),
                _ => anyhow::bail!("sc stop {} failed ({}): {}", name, code, text),
            }
        }

        fn delete(&self, name: &str) -> anyhow::Result<bool> {
            let (code, text) = self.sc(&["delete", name])?;
            match code {
                0 | ERROR_SERVICE_MARKED_FOR_DELETE => Ok(true),
                ERROR_SERVICE_DOES_NOT_EXIST => Ok(false),
                _ => anyhow::bail!("sc delete {} failed ({}): {}", name, code, text),
            }
        }
    }
}

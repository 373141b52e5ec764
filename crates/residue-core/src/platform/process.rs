//! Process lookup via `sysinfo`.

use std::path::Path;

use sysinfo::{Pid, ProcessesToUpdate, System};

use super::{ProcessBackend, ProcessInfo, path_within};

/// Never terminated, whatever their executable path.
const PROTECTED_PROCESSES: &[&str] = &[
    "system",
    "smss.exe",
    "csrss.exe",
    "wininit.exe",
    "winlogon.exe",
    "services.exe",
    "lsass.exe",
    "svchost.exe",
    "explorer.exe",
    "init",
    "systemd",
    "launchd",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct SysinfoProcesses;

impl SysinfoProcesses {
    pub fn new() -> Self {
        Self
    }
}

fn is_protected(name: &str) -> bool {
    let lower = name.to_lowercase();
    PROTECTED_PROCESSES.contains(&lower.as_str())
}

impl ProcessBackend for SysinfoProcesses {
    fn holders(&self, path: &Path) -> anyhow::Result<Vec<ProcessInfo>> {
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::All, true);

        let own_pid = std::process::id();
        let root = path.to_string_lossy();
        let mut holders: Vec<ProcessInfo> = system
            .processes()
            .iter()
            .filter_map(|(pid, process)| {
                let exe = process.exe()?;
                let name = process.name().to_string_lossy().to_string();
                if pid.as_u32() == own_pid || is_protected(&name) {
                    return None;
                }
                path_within(&exe.to_string_lossy(), &root).then(|| ProcessInfo {
                    pid: pid.as_u32(),
                    name,
                    exe: Some(exe.to_path_buf()),
                })
            })
            .collect();
        holders.sort_by_key(|p| p.pid);
        Ok(holders)
    }

    fn terminate(&self, pid: u32) -> anyhow::Result<()> {
        let target = Pid::from_u32(pid);
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::Some(&[target]), true);
        let Some(process) = system.process(target) else {
            // Already gone.
            return Ok(());
        };
        let name = process.name().to_string_lossy().to_string();
        if is_protected(&name) {
            anyhow::bail!("Refusing to terminate protected process {} ({})", name, pid);
        }
        if !process.kill() {
            anyhow::bail!("Failed to terminate process {} ({})", name, pid);
        }
        tracing::info!(pid, name = %name, "terminated process holding artifact");
        Ok(())
    }
}

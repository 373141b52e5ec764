//! In-memory host backends and fixtures shared by the integration tests.
#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use residue_core::cancel::Deadline;
use residue_core::config::ResidueConfig;
use residue_core::context::RunContext;
use residue_core::inventory::{ApplicationRecord, JsonInventory};
use residue_core::platform::{
    FileSystemBackend, LocalFileSystem, ProcessBackend, ProcessInfo, RegistryBackend,
    ServiceBackend, ServiceInfo,
};
use residue_core::types::{Presence, normalize_key};
use tempfile::TempDir;

pub const APP_ID: &str = "Acme.FooApp";
pub const APP_NAME: &str = "FooApp";

/// Registry keyed by normalized path; intermediate keys are implied.
#[derive(Default)]
pub struct MemoryRegistry {
    keys: RefCell<BTreeMap<String, (String, HashMap<String, String>)>>,
    delete_failures: Cell<usize>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(self, path: &str) -> Self {
        self.keys
            .borrow_mut()
            .insert(normalize_key(path), (path.to_string(), HashMap::new()));
        self
    }

    pub fn with_value(self, path: &str, name: &str, value: &str) -> Self {
        self.keys
            .borrow_mut()
            .entry(normalize_key(path))
            .or_insert_with(|| (path.to_string(), HashMap::new()))
            .1
            .insert(name.to_string(), value.to_string());
        self
    }

    /// The next `count` deletes fail with access denied.
    pub fn failing_deletes(self, count: usize) -> Self {
        self.delete_failures.set(count);
        self
    }

    fn is_under(key: &str, root: &str) -> bool {
        key == root || key.strip_prefix(root).is_some_and(|rest| rest.starts_with('\\'))
    }
}

impl RegistryBackend for MemoryRegistry {
    fn is_available(&self) -> bool {
        true
    }

    fn subkeys(&self, path: &str) -> anyhow::Result<Vec<String>> {
        let root = normalize_key(path);
        let mut names: Vec<String> = Vec::new();
        for (key, (original, _)) in self.keys.borrow().iter() {
            if key == &root || !Self::is_under(key, &root) {
                continue;
            }
            // Child segment, in its original case.
            let depth = root.split('\\').count();
            let Some(name) = original.split('\\').nth(depth) else {
                continue;
            };
            if !names.iter().any(|n| n.eq_ignore_ascii_case(name)) {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    fn string_value(&self, path: &str, name: &str) -> anyhow::Result<Option<String>> {
        Ok(self
            .keys
            .borrow()
            .get(&normalize_key(path))
            .and_then(|(_, values)| values.get(name).cloned()))
    }

    fn probe(&self, path: &str) -> anyhow::Result<Presence> {
        let root = normalize_key(path);
        let present = self.keys.borrow().keys().any(|key| Self::is_under(key, &root));
        Ok(if present {
            Presence::Present
        } else {
            Presence::Absent
        })
    }

    fn delete_tree(&self, path: &str) -> anyhow::Result<bool> {
        if take_failure(&self.delete_failures) {
            anyhow::bail!("access denied deleting {}", path);
        }
        let root = normalize_key(path);
        let mut keys = self.keys.borrow_mut();
        let before = keys.len();
        keys.retain(|key, _| !Self::is_under(key, &root));
        Ok(keys.len() != before)
    }
}

#[derive(Default)]
pub struct MemoryServices {
    services: RefCell<Vec<ServiceInfo>>,
    pub stopped: RefCell<Vec<String>>,
    stop_failures: Cell<usize>,
}

impl MemoryServices {
    pub fn new(services: Vec<ServiceInfo>) -> Self {
        Self {
            services: RefCell::new(services),
            ..Self::default()
        }
    }

    /// The next `count` stop requests fail as if the service hung.
    pub fn failing_stops(self, count: usize) -> Self {
        self.stop_failures.set(count);
        self
    }
}

impl ServiceBackend for MemoryServices {
    fn is_available(&self) -> bool {
        true
    }

    fn list(&self) -> anyhow::Result<Vec<ServiceInfo>> {
        Ok(self.services.borrow().clone())
    }

    fn probe(&self, name: &str) -> anyhow::Result<Presence> {
        let present = self
            .services
            .borrow()
            .iter()
            .any(|s| s.name.eq_ignore_ascii_case(name));
        Ok(if present {
            Presence::Present
        } else {
            Presence::Absent
        })
    }

    fn stop(&self, name: &str) -> anyhow::Result<()> {
        if take_failure(&self.stop_failures) {
            anyhow::bail!("service {} did not stop in time", name);
        }
        self.stopped.borrow_mut().push(name.to_string());
        Ok(())
    }

    fn delete(&self, name: &str) -> anyhow::Result<bool> {
        let mut services = self.services.borrow_mut();
        let before = services.len();
        services.retain(|s| !s.name.eq_ignore_ascii_case(name));
        Ok(services.len() != before)
    }
}

fn take_failure(remaining: &Cell<usize>) -> bool {
    let left = remaining.get();
    if left == 0 {
        return false;
    }
    remaining.set(left - 1);
    true
}

/// Local filesystem where some paths report `ResourceBusy` on removal.
///
/// Scheduling a locked path for reboot succeeds but leaves it in place.
#[derive(Clone, Default)]
pub struct LockingFileSystem {
    inner: LocalFileSystem,
    locked: Rc<RefCell<Vec<PathBuf>>>,
    pub attempts: Rc<RefCell<usize>>,
    pub scheduled: Rc<RefCell<Vec<PathBuf>>>,
}

impl LockingFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(self, path: impl Into<PathBuf>) -> Self {
        self.locked.borrow_mut().push(path.into());
        self
    }

    /// Release a lock; clones share the same lock table.
    pub fn unlock(&self, path: &Path) {
        self.locked.borrow_mut().retain(|locked| locked != path);
    }

    pub fn is_locked(&self, path: &Path) -> bool {
        self.locked.borrow().iter().any(|locked| locked == path)
    }

    fn busy(&self, path: &Path, recursive: bool) -> io::Result<()> {
        *self.attempts.borrow_mut() += 1;
        let held = self
            .locked
            .borrow()
            .iter()
            .any(|locked| locked == path || (recursive && locked.starts_with(path)));
        if held {
            return Err(io::Error::new(
                io::ErrorKind::ResourceBusy,
                format!("{} is locked", path.display()),
            ));
        }
        Ok(())
    }
}

impl FileSystemBackend for LockingFileSystem {
    fn probe(&self, path: &Path) -> io::Result<Presence> {
        self.inner.probe(path)
    }

    fn size(&self, path: &Path) -> io::Result<u64> {
        self.inner.size(path)
    }

    fn size_within(&self, path: &Path, deadline: &Deadline) -> io::Result<u64> {
        self.inner.size_within(path, deadline)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        self.busy(path, false)?;
        self.inner.remove_file(path)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        self.busy(path, true)?;
        self.inner.remove_dir_all(path)
    }

    fn schedule_delete_on_reboot(&self, path: &Path) -> io::Result<()> {
        self.scheduled.borrow_mut().push(path.to_path_buf());
        Ok(())
    }
}

#[derive(Default)]
pub struct NoProcesses;

impl ProcessBackend for NoProcesses {
    fn holders(&self, _path: &Path) -> anyhow::Result<Vec<ProcessInfo>> {
        Ok(Vec::new())
    }

    fn terminate(&self, pid: u32) -> anyhow::Result<()> {
        anyhow::bail!("unexpected terminate of {}", pid)
    }
}

/// One process holding a locked path; terminating it releases the lock.
pub struct LockHolder {
    pub process: ProcessInfo,
    pub path: PathBuf,
    filesystem: LockingFileSystem,
    pub terminated: Rc<RefCell<Vec<u32>>>,
}

impl LockHolder {
    pub fn new(pid: u32, path: impl Into<PathBuf>, filesystem: &LockingFileSystem) -> Self {
        let path = path.into();
        Self {
            process: ProcessInfo {
                pid,
                name: "fooapp.exe".to_string(),
                exe: Some(path.with_file_name("fooapp.exe")),
            },
            path,
            filesystem: filesystem.clone(),
            terminated: Rc::new(RefCell::new(Vec::new())),
        }
    }
}

impl ProcessBackend for LockHolder {
    fn holders(&self, path: &Path) -> anyhow::Result<Vec<ProcessInfo>> {
        if path == self.path && self.filesystem.is_locked(path) {
            return Ok(vec![self.process.clone()]);
        }
        Ok(Vec::new())
    }

    fn terminate(&self, pid: u32) -> anyhow::Result<()> {
        if pid != self.process.pid {
            anyhow::bail!("no process {}", pid);
        }
        self.terminated.borrow_mut().push(pid);
        self.filesystem.unlock(&self.path);
        Ok(())
    }
}

/// Config scanning only `root`, with short delays and no run log.
pub fn test_config(root: &Path) -> ResidueConfig {
    let mut config = ResidueConfig::default();
    config.discovery.search_roots = Some(vec![root.to_path_buf()]);
    config.discovery.heuristic_timeout_secs = 60;
    config.selection.poll_interval_ms = 20;
    config.removal.retry_delay_ms = 5;
    config.run_log.enabled = false;
    config
}

pub fn context_with(
    config: ResidueConfig,
    registry: MemoryRegistry,
    services: MemoryServices,
    filesystem: LockingFileSystem,
) -> RunContext {
    RunContext::new(
        config,
        Box::new(registry),
        Box::new(services),
        Box::new(filesystem),
        Box::new(NoProcesses),
    )
}

pub fn app() -> ApplicationRecord {
    ApplicationRecord::new(APP_ID, APP_NAME).with_version("2.1.0")
}

pub fn inventory() -> JsonInventory {
    JsonInventory::from_records([app()])
}

/// A search root holding three leftovers: a directory and two files.
pub struct Fixture {
    pub temp: TempDir,
    pub root: PathBuf,
    pub data_dir: PathBuf,
    pub log_file: PathBuf,
    pub cache_file: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("root");
        let data_dir = root.join("FooApp");
        std::fs::create_dir_all(data_dir.join("cache")).unwrap();
        std::fs::write(data_dir.join("settings.json"), b"{\"theme\":\"dark\"}").unwrap();
        std::fs::write(data_dir.join("cache").join("blob.bin"), vec![0u8; 64]).unwrap();

        let log_file = root.join("fooapp-install.log");
        std::fs::write(&log_file, b"installed\n").unwrap();
        let cache_file = root.join("fooapp-cache.db");
        std::fs::write(&cache_file, vec![1u8; 128]).unwrap();

        // Unrelated neighbour that must survive every run.
        std::fs::write(root.join("other-app.log"), b"keep me").unwrap();

        Self {
            temp,
            root,
            data_dir,
            log_file,
            cache_file,
        }
    }

    pub fn selection_path(&self) -> PathBuf {
        self.temp.path().join("selection.json")
    }

    pub fn config(&self) -> ResidueConfig {
        test_config(&self.root)
    }

    pub fn context(&self, filesystem: LockingFileSystem) -> RunContext {
        context_with(
            self.config(),
            MemoryRegistry::new(),
            MemoryServices::default(),
            filesystem,
        )
    }
}

/// Index of the first event of `kind`, panicking when absent.
pub fn position(kinds: &[&str], kind: &str) -> usize {
    kinds
        .iter()
        .position(|k| *k == kind)
        .unwrap_or_else(|| panic!("no {kind} event in {kinds:?}"))
}

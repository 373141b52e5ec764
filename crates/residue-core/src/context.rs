//! Per-run context for dependency injection.

use crate::config::ResidueConfig;
use crate::platform::{
    FileSystemBackend, LocalFileSystem, ProcessBackend, ProtectionGuard, RegistryBackend,
    ServiceBackend, SysinfoProcesses,
};

/// Everything a run needs from the host, built once and passed by reference
/// into discovery, removal and verification.
pub struct RunContext {
    config: ResidueConfig,
    registry: Box<dyn RegistryBackend>,
    services: Box<dyn ServiceBackend>,
    filesystem: Box<dyn FileSystemBackend>,
    processes: Box<dyn ProcessBackend>,
    guard: ProtectionGuard,
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("config", &self.config)
            .field("registry_available", &self.registry.is_available())
            .field("services_available", &self.services.is_available())
            .finish_non_exhaustive()
    }
}

impl RunContext {
    /// Create a context with explicit backends.
    pub fn new(
        config: ResidueConfig,
        registry: Box<dyn RegistryBackend>,
        services: Box<dyn ServiceBackend>,
        filesystem: Box<dyn FileSystemBackend>,
        processes: Box<dyn ProcessBackend>,
    ) -> Self {
        let guard = ProtectionGuard::new(&config.removal.protected_paths);
        Self {
            config,
            registry,
            services,
            filesystem,
            processes,
            guard,
        }
    }

    /// Create a context wired to the live host.
    pub fn for_host(config: ResidueConfig) -> Self {
        Self::new(
            config,
            host_registry(),
            host_services(),
            Box::new(LocalFileSystem::new()),
            Box::new(SysinfoProcesses::new()),
        )
    }

    pub fn config(&self) -> &ResidueConfig {
        &self.config
    }

    pub fn registry(&self) -> &dyn RegistryBackend {
        self.registry.as_ref()
    }

    pub fn services(&self) -> &dyn ServiceBackend {
        self.services.as_ref()
    }

    pub fn filesystem(&self) -> &dyn FileSystemBackend {
        self.filesystem.as_ref()
    }

    pub fn processes(&self) -> &dyn ProcessBackend {
        self.processes.as_ref()
    }

    pub fn guard(&self) -> &ProtectionGuard {
        &self.guard
    }
}

#[cfg(windows)]
fn host_registry() -> Box<dyn RegistryBackend> {
    Box::new(crate::platform::WindowsRegistry::new())
}

#[cfg(not(windows))]
fn host_registry() -> Box<dyn RegistryBackend> {
    Box::new(crate::platform::UnavailableRegistry)
}

#[cfg(windows)]
fn host_services() -> Box<dyn ServiceBackend> {
    Box::new(crate::platform::WindowsServices::new())
}

#[cfg(not(windows))]
fn host_services() -> Box<dyn ServiceBackend> {
    Box::new(crate::platform::UnavailableServices)
}

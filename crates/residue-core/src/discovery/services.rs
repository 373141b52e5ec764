//! Service-table heuristic.

use super::{DiscoveryInput, Heuristic, HeuristicOutput, command_executable};
use crate::error::DiscoveryError;
use crate::platform::{ServiceInfo, path_within};
use crate::types::{Artifact, ArtifactType, DiscoverySource};

/// Services named after the application, or running a binary from one of its
/// already discovered directories.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServiceTableScan;

impl Heuristic for ServiceTableScan {
    fn source(&self) -> DiscoverySource {
        DiscoverySource::ServiceTable
    }

    fn discover(&self, input: &DiscoveryInput<'_>) -> Result<HeuristicOutput, DiscoveryError> {
        let services = input.ctx.services();
        if !services.is_available() {
            return Err(DiscoveryError::Unavailable("service table"));
        }
        let install_dirs: Vec<&str> = input
            .found
            .iter()
            .filter(|a| a.artifact_type == ArtifactType::Directory)
            .map(|a| a.path.as_str())
            .collect();

        let mut artifacts = Vec::new();
        for service in services.list()? {
            input.check_deadline()?;
            if is_owned(input, &service, &install_dirs) {
                tracing::debug!(service = %service.name, "matched service");
                artifacts.push(Artifact::new(
                    ArtifactType::Service,
                    service.name,
                    None,
                    DiscoverySource::ServiceTable,
                ));
            }
        }
        Ok(HeuristicOutput::new(artifacts))
    }
}

fn is_owned(input: &DiscoveryInput<'_>, service: &ServiceInfo, install_dirs: &[&str]) -> bool {
    if input.mentions_token(&service.name) {
        return true;
    }
    if service
        .display_name
        .as_deref()
        .is_some_and(|display| input.mentions_token(display))
    {
        return true;
    }
    service
        .binary_path
        .as_deref()
        .and_then(command_executable)
        .is_some_and(|exe| install_dirs.iter().any(|dir| path_within(&exe, dir)))
}

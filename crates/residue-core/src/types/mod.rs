//! Shared domain types that flow through every pipeline stage.

mod id;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use id::{artifact_id, normalize_key};

/// Kind of residual resource.
///
/// Variant order is also the order in which discovery sorts its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ArtifactType {
    Registry,
    File,
    Directory,
    Service,
}

impl ArtifactType {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactType::Registry => "registry",
            ArtifactType::File => "file",
            ArtifactType::Directory => "directory",
            ArtifactType::Service => "service",
        }
    }
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Heuristic that produced an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DiscoverySource {
    RegistryUninstall,
    RegistrySoftware,
    InstallLocation,
    FilesystemScan,
    ServiceTable,
}

impl DiscoverySource {
    pub fn as_str(self) -> &'static str {
        match self {
            DiscoverySource::RegistryUninstall => "registryUninstall",
            DiscoverySource::RegistrySoftware => "registrySoftware",
            DiscoverySource::InstallLocation => "installLocation",
            DiscoverySource::FilesystemScan => "filesystemScan",
            DiscoverySource::ServiceTable => "serviceTable",
        }
    }
}

impl fmt::Display for DiscoverySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single leftover resource attributable to one application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub id: String,
    #[serde(rename = "type")]
    pub artifact_type: ArtifactType,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    pub discovery_source: DiscoverySource,
}

impl Artifact {
    /// Build an artifact whose id is derived from its type and path.
    pub fn new(
        artifact_type: ArtifactType,
        path: impl Into<String>,
        size_bytes: Option<u64>,
        discovery_source: DiscoverySource,
    ) -> Self {
        let path = path.into();
        Self {
            id: artifact_id(artifact_type, &path),
            artifact_type,
            path,
            size_bytes,
            discovery_source,
        }
    }

    /// Case-insensitive key used to union heuristic results.
    pub fn dedup_key(&self) -> String {
        format!("{}:{}", self.artifact_type, normalize_key(&self.path))
    }
}

/// Observed existence of a resource on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Presence {
    Present,
    Absent,
    /// No local predicate applies (e.g. registry on a non-Windows host).
    Unknown,
}

impl Presence {
    /// Tri-state "was it removed" view of a probe.
    pub fn verified_removed(self) -> Option<bool> {
        match self {
            Presence::Absent => Some(true),
            Presence::Present => Some(false),
            Presence::Unknown => None,
        }
    }
}

/// Escalation step applied when a resource is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RetryStrategy {
    RetryAfterDelay,
    StopOwningProcess,
    ScheduleOnReboot,
}

impl RetryStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            RetryStrategy::RetryAfterDelay => "retryAfterDelay",
            RetryStrategy::StopOwningProcess => "stopOwningProcess",
            RetryStrategy::ScheduleOnReboot => "scheduleOnReboot",
        }
    }
}

impl fmt::Display for RetryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of removing one selected artifact, as reported by the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovalResult {
    pub artifact_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_strategy: Option<RetryStrategy>,
    pub freed_bytes: u64,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub reboot_pending: bool,
}

impl RemovalResult {
    pub fn succeeded(artifact_id: impl Into<String>, freed_bytes: u64) -> Self {
        Self {
            artifact_id: artifact_id.into(),
            success: true,
            error: None,
            retry_strategy: None,
            freed_bytes,
            dry_run: false,
            reboot_pending: false,
        }
    }

    pub fn failed(artifact_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            artifact_id: artifact_id.into(),
            success: false,
            error: Some(error.into()),
            retry_strategy: None,
            freed_bytes: 0,
            dry_run: false,
            reboot_pending: false,
        }
    }
}

/// Reconciled per-artifact outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FinalStatus {
    VerifiedRemoved,
    StillPresent,
    Failed,
    Error,
    Unknown,
}

impl FinalStatus {
    /// Reconcile the executor's claim with the independent probe.
    ///
    /// Priority: probe error, confirmed removal, observed presence,
    /// reported failure, then unknown.
    pub fn reconcile(
        reported_success: bool,
        verified_removed: Option<bool>,
        verification_error: Option<&str>,
    ) -> Self {
        if verification_error.is_some() {
            return FinalStatus::Error;
        }
        match (verified_removed, reported_success) {
            (Some(true), true) => FinalStatus::VerifiedRemoved,
            (Some(false), _) => FinalStatus::StillPresent,
            (_, false) => FinalStatus::Failed,
            _ => FinalStatus::Unknown,
        }
    }
}

/// Independent post-removal check for one selected artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRecord {
    pub artifact_id: String,
    pub reported_success: bool,
    pub verified_removed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_error: Option<String>,
    pub final_status: FinalStatus,
}

impl VerificationRecord {
    pub fn new(
        artifact_id: impl Into<String>,
        reported_success: bool,
        verified_removed: Option<bool>,
        verification_error: Option<String>,
    ) -> Self {
        let final_status = FinalStatus::reconcile(
            reported_success,
            verified_removed,
            verification_error.as_deref(),
        );
        Self {
            artifact_id: artifact_id.into(),
            reported_success,
            verified_removed,
            verification_error,
            final_status,
        }
    }
}

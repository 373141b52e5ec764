//! Independent post-removal verification.
//!
//! Each artifact is re-probed with the same predicates discovery uses. The
//! executor's own report is only one input to the final status.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::context::RunContext;
use crate::error::VerificationError;
use crate::types::{Artifact, ArtifactType, FinalStatus, Presence, RemovalResult, VerificationRecord};

/// Per-status counts; the `verificationSummary` payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationSummary {
    pub total: usize,
    pub verified_removed: usize,
    pub still_present: usize,
    pub failed: usize,
    pub error: usize,
    pub unknown: usize,
}

impl VerificationSummary {
    pub fn from_records(records: &[VerificationRecord]) -> Self {
        let mut summary = Self {
            total: records.len(),
            ..Self::default()
        };
        for record in records {
            let counter = match record.final_status {
                FinalStatus::VerifiedRemoved => &mut summary.verified_removed,
                FinalStatus::StillPresent => &mut summary.still_present,
                FinalStatus::Failed => &mut summary.failed,
                FinalStatus::Error => &mut summary.error,
                FinalStatus::Unknown => &mut summary.unknown,
            };
            *counter += 1;
        }
        summary
    }
}

pub struct Verifier<'a> {
    ctx: &'a RunContext,
}

impl<'a> Verifier<'a> {
    pub fn new(ctx: &'a RunContext) -> Self {
        Self { ctx }
    }

    /// Current presence of an artifact on the host.
    pub fn probe(&self, artifact: &Artifact) -> Result<Presence, VerificationError> {
        let failed = |reason: String| VerificationError {
            artifact_type: artifact.artifact_type,
            path: artifact.path.clone(),
            reason,
        };
        match artifact.artifact_type {
            ArtifactType::Registry => self
                .ctx
                .registry()
                .probe(&artifact.path)
                .map_err(|err| failed(format!("{:#}", err))),
            ArtifactType::Service => self
                .ctx
                .services()
                .probe(&artifact.path)
                .map_err(|err| failed(format!("{:#}", err))),
            ArtifactType::File | ArtifactType::Directory => self
                .ctx
                .filesystem()
                .probe(Path::new(&artifact.path))
                .map_err(|err| failed(err.to_string())),
        }
    }

    /// Reconcile the executor's result with a fresh probe.
    pub fn verify(&self, artifact: &Artifact, result: &RemovalResult) -> VerificationRecord {
        let (verified_removed, verification_error) = match self.probe(artifact) {
            Ok(presence) => (presence.verified_removed(), None),
            Err(err) => {
                tracing::warn!(id = %artifact.id, error = %err, "verification probe failed");
                (None, Some(err.to_string()))
            }
        };
        let record = VerificationRecord::new(
            &artifact.id,
            result.success,
            verified_removed,
            verification_error,
        );
        tracing::debug!(id = %artifact.id, status = ?record.final_status, "verified");
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_counts_every_status() {
        let records = vec![
            VerificationRecord::new("a", true, Some(true), None),
            VerificationRecord::new("b", true, Some(true), None),
            VerificationRecord::new("c", true, Some(false), None),
            VerificationRecord::new("d", false, None, None),
            VerificationRecord::new("e", true, None, Some("denied".into())),
            VerificationRecord::new("f", true, None, None),
        ];
        let summary = VerificationSummary::from_records(&records);
        assert_eq!(summary.total, 6);
        assert_eq!(summary.verified_removed, 2);
        assert_eq!(summary.still_present, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.error, 1);
        assert_eq!(summary.unknown, 1);
    }
}

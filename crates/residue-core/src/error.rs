//! Error taxonomy for the deep-uninstall pipeline.
//!
//! Validation and integrity errors are fatal and surface as [`PipelineError`].
//! Discovery, removal and verification errors are folded into the per-heuristic
//! or per-artifact records and never abort a run.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::types::ArtifactType;

/// Fatal: the run cannot start or the selection cannot be trusted as input.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("unknown application id '{0}'")]
    UnknownApplication(String),

    #[error("failed to load inventory {path}: {reason}")]
    Inventory { path: PathBuf, reason: String },

    #[error("malformed selection file {path}: {reason}")]
    MalformedSelection { path: PathBuf, reason: String },

    #[error("selection file not found: {0}")]
    SelectionMissing(PathBuf),

    #[error("no selection source: pass a selection file or auto-select-all")]
    NoSelectionSource,

    #[error("timed out after {waited:?} waiting for selection file {path}")]
    SelectionTimeout { path: PathBuf, waited: Duration },

    #[error("run cancelled before any artifact was removed")]
    Cancelled,
}

/// Fatal: the selection file's signature is absent or does not match.
#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error("signature file missing: {0}")]
    SignatureMissing(PathBuf),

    #[error("failed to read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("digest mismatch for {path}: signature {expected}, actual {actual}")]
    DigestMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
}

/// A single heuristic failed; discovery continues without its results.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("{0} is not available on this host")]
    Unavailable(&'static str),

    #[error("exceeded time budget of {0:?}")]
    TimedOut(Duration),

    #[error("invalid pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Removal of one artifact failed.
#[derive(Debug, Error)]
pub enum RemovalError {
    #[error("refusing to remove protected location {0}")]
    Protected(String),

    #[error("{path} is in use")]
    InUse {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to remove {artifact_type} {path}: {reason}")]
    Failed {
        artifact_type: ArtifactType,
        path: String,
        reason: String,
    },
}

/// Probing an artifact after removal failed.
#[derive(Debug, Error)]
#[error("failed to probe {artifact_type} {path}: {reason}")]
pub struct VerificationError {
    pub artifact_type: ArtifactType,
    pub path: String,
    pub reason: String,
}

/// Errors that terminate a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error("event sink failed: {0:#}")]
    Sink(anyhow::Error),
}

impl PipelineError {
    /// Short tag used in the `error` event.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "validation",
            PipelineError::Integrity(_) => "integrity",
            PipelineError::Sink(_) => "sink",
        }
    }
}

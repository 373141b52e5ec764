//! Residue Core Library
//!
//! Deep-uninstall engine: discovers what an application left behind, removes
//! the host-approved subset and independently verifies the result.

pub mod cancel;
pub mod config;
pub mod context;
pub mod discovery;
pub mod error;
pub mod events;
pub mod inventory;
pub mod pipeline;
pub mod platform;
pub mod removal;
pub mod selection;
pub mod types;
pub mod verification;

/// Re-exports of commonly used types
pub mod prelude {
    // Configuration
    pub use crate::config::{ConfigStore, ResidueConfig};
    pub use crate::context::RunContext;

    // Domain types
    pub use crate::types::{
        Artifact, ArtifactType, DiscoverySource, FinalStatus, Presence, RemovalResult,
        RetryStrategy, VerificationRecord,
    };

    // Stages
    pub use crate::discovery::{Discovery, DiscoveryEngine, DiscoveryReport};
    pub use crate::removal::{RemovalExecutor, RemovalSummary};
    pub use crate::selection::{Selection, SelectionPayload, SelectionRequest};
    pub use crate::verification::{VerificationSummary, Verifier};

    // Pipeline
    pub use crate::cancel::CancellationToken;
    pub use crate::error::{IntegrityError, PipelineError, ValidationError};
    pub use crate::events::{CollectingSink, Event, EventSink, JsonLinesSink};
    pub use crate::inventory::{ApplicationRecord, InventoryProvider, JsonInventory};
    pub use crate::pipeline::{DeepUninstall, RunReport, RunSummary, UninstallRequest};
}

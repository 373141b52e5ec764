//! Deep-uninstall orchestration: discovery, selection, removal, verification.

pub mod run_log;

use std::path::PathBuf;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::cancel::CancellationToken;
use crate::context::RunContext;
use crate::discovery::{DiscoveryEngine, DiscoveryReport};
use crate::error::{PipelineError, ValidationError};
use crate::events::{
    ArtifactsPayload, CleanupStartedPayload, DiscoveryStartedPayload, ErrorPayload, Event,
    EventSink, StartedPayload,
};
use crate::inventory::{ApplicationRecord, InventoryProvider};
use crate::removal::{RemovalExecutor, RemovalSummary, removal_order};
use crate::selection::{Selection, SelectionProtocol, SelectionRequest};
use crate::types::{Artifact, RemovalResult, VerificationRecord};
use crate::verification::{VerificationSummary, Verifier};

/// Parameters of one deep-uninstall run.
#[derive(Debug, Clone)]
pub struct UninstallRequest {
    pub app_id: String,
    pub selection: SelectionRequest,
    pub dry_run: bool,
    /// Write the per-run JSON log (also subject to `[run_log] enabled`)
    pub write_run_log: bool,
}

impl UninstallRequest {
    pub fn new(app_id: impl Into<String>, selection: SelectionRequest) -> Self {
        Self {
            app_id: app_id.into(),
            selection,
            dry_run: false,
            write_run_log: true,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn write_run_log(mut self, enabled: bool) -> Self {
        self.write_run_log = enabled;
        self
    }
}

/// The final `summary` payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub app_id: String,
    pub dry_run: bool,
    pub discovered: usize,
    pub selected: usize,
    pub verified_removed: usize,
    pub still_present: usize,
    pub failed: usize,
    pub error: usize,
    pub unknown: usize,
    pub reboot_pending: usize,
    pub freed_bytes: u64,
    pub elapsed_ms: u64,
}

/// Everything a completed run produced; also the run log document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub application: ApplicationRecord,
    pub discovery: DiscoveryReport,
    pub artifacts: Vec<Artifact>,
    pub selection: Selection,
    pub results: Vec<RemovalResult>,
    pub removal: RemovalSummary,
    pub verifications: Vec<VerificationRecord>,
    pub verification: VerificationSummary,
    pub summary: RunSummary,
    #[serde(skip)]
    pub run_log: Option<PathBuf>,
}

pub struct DeepUninstall<'a> {
    ctx: &'a RunContext,
    inventory: &'a dyn InventoryProvider,
    cancel: CancellationToken,
}

impl<'a> DeepUninstall<'a> {
    pub fn new(ctx: &'a RunContext, inventory: &'a dyn InventoryProvider) -> Self {
        Self {
            ctx,
            inventory,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run the whole pipeline, streaming events into `sink`.
    ///
    /// Validation and integrity failures emit a single `error` event and are
    /// returned; nothing has been removed at that point.
    pub fn run(
        &self,
        request: &UninstallRequest,
        sink: &mut dyn EventSink,
    ) -> Result<RunReport, PipelineError> {
        match self.run_stages(request, sink) {
            Ok(report) => Ok(report),
            Err(err @ PipelineError::Sink(_)) => Err(err),
            Err(err) => {
                report_fatal(sink, &err)?;
                Err(err)
            }
        }
    }

    fn run_stages(
        &self,
        request: &UninstallRequest,
        sink: &mut dyn EventSink,
    ) -> Result<RunReport, PipelineError> {
        let started = Instant::now();
        emit(
            sink,
            Event::Started(StartedPayload {
                app_id: request.app_id.clone(),
                dry_run: request.dry_run,
            }),
        )?;
        tracing::info!(app_id = %request.app_id, dry_run = request.dry_run, "deep uninstall started");

        let application = self.lookup(&request.app_id)?;

        // Discovery
        emit(
            sink,
            Event::DiscoveryStarted(DiscoveryStartedPayload {
                application: application.clone(),
            }),
        )?;
        let discovery = DiscoveryEngine::new(self.ctx).discover(&application);
        emit(sink, Event::DiscoveryCompleted(discovery.report.clone()))?;
        emit(
            sink,
            Event::Artifacts(ArtifactsPayload {
                artifacts: discovery.artifacts.clone(),
            }),
        )?;

        // Selection
        let selection =
            SelectionProtocol::new(&request.selection, &self.cancel).resolve(&discovery.artifacts)?;
        emit(sink, Event::Selection(selection.clone()))?;
        tracing::info!(
            selected = selection.selected_ids.len(),
            unknown = selection.unknown_ids.len(),
            "selection resolved"
        );

        // Removal
        if self.cancel.is_cancelled() {
            return Err(ValidationError::Cancelled.into());
        }
        let selected = removal_order(&selection.artifacts(&discovery.artifacts));
        emit(
            sink,
            Event::CleanupStarted(CleanupStartedPayload {
                count: selected.len(),
                dry_run: request.dry_run,
            }),
        )?;
        let executor = RemovalExecutor::new(self.ctx, request.dry_run);
        let mut results = Vec::with_capacity(selected.len());
        for artifact in &selected {
            let result = executor.remove(artifact);
            emit(sink, Event::ArtifactResult(result.clone()))?;
            results.push(result);
        }
        let removal = RemovalSummary::from_results(&results, request.dry_run);

        // Verification
        let verifier = Verifier::new(self.ctx);
        let mut verifications = Vec::with_capacity(selected.len());
        for (artifact, result) in selected.iter().zip(&results) {
            let record = verifier.verify(artifact, result);
            emit(sink, Event::ArtifactVerification(record.clone()))?;
            verifications.push(record);
        }
        let verification = VerificationSummary::from_records(&verifications);
        emit(sink, Event::VerificationSummary(verification.clone()))?;
        emit(sink, Event::CleanupCompleted(removal.clone()))?;

        let summary = RunSummary {
            app_id: application.app_id.clone(),
            dry_run: request.dry_run,
            discovered: discovery.artifacts.len(),
            selected: selected.len(),
            verified_removed: verification.verified_removed,
            still_present: verification.still_present,
            failed: verification.failed,
            error: verification.error,
            unknown: verification.unknown,
            reboot_pending: removal.reboot_pending,
            freed_bytes: removal.freed_bytes,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        emit(sink, Event::Summary(summary.clone()))?;
        tracing::info!(
            verified_removed = summary.verified_removed,
            still_present = summary.still_present,
            failed = summary.failed,
            reboot_pending = summary.reboot_pending,
            "deep uninstall completed"
        );

        let mut report = RunReport {
            application,
            discovery: discovery.report,
            artifacts: discovery.artifacts,
            selection,
            results,
            removal,
            verifications,
            verification,
            summary,
            run_log: None,
        };
        if request.write_run_log && self.ctx.config().run_log.enabled {
            report.run_log = run_log::persist(&self.ctx.config().run_log, &report);
        }
        Ok(report)
    }

    fn lookup(&self, app_id: &str) -> Result<ApplicationRecord, ValidationError> {
        match self.inventory.application(app_id) {
            Ok(Some(record)) => Ok(record),
            Ok(None) => Err(ValidationError::UnknownApplication(app_id.to_string())),
            Err(err) => Err(ValidationError::Inventory {
                path: PathBuf::from("<inventory>"),
                reason: format!("{:#}", err),
            }),
        }
    }
}

fn emit(sink: &mut dyn EventSink, event: Event) -> Result<(), PipelineError> {
    sink.emit(&event).map_err(PipelineError::Sink)
}

/// Emit the single `error` event for a fatal failure.
pub fn report_fatal(sink: &mut dyn EventSink, err: &PipelineError) -> Result<(), PipelineError> {
    tracing::error!(kind = err.kind(), error = %err, "deep uninstall aborted");
    emit(
        sink,
        Event::Error(ErrorPayload {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }),
    )
}

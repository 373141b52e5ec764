mod support;

use std::fs;
use std::time::{Duration, Instant};

use residue_core::cancel::CancellationToken;
use residue_core::error::{IntegrityError, PipelineError, ValidationError};
use residue_core::events::{CollectingSink, Event, JsonLinesSink};
use residue_core::pipeline::{DeepUninstall, UninstallRequest};
use residue_core::selection::{SelectionMode, SelectionRequest, digest_hex, sign_file, signature_path};
use residue_core::types::{ArtifactType, FinalStatus, RetryStrategy};

use support::{APP_ID, Fixture, LockingFileSystem, inventory, position};

fn auto_request() -> UninstallRequest {
    UninstallRequest::new(APP_ID, SelectionRequest::auto_select_all()).write_run_log(false)
}

#[test]
fn locked_file_escalates_and_is_reported_still_present() {
    let fixture = Fixture::new();
    let fs_backend = LockingFileSystem::new().lock(&fixture.cache_file);
    let attempts = fs_backend.attempts.clone();
    let scheduled = fs_backend.scheduled.clone();
    let ctx = fixture.context(fs_backend);
    let inventory = inventory();
    let mut sink = CollectingSink::new();

    let report = DeepUninstall::new(&ctx, &inventory)
        .run(&auto_request(), &mut sink)
        .unwrap();

    assert_eq!(report.artifacts.len(), 3);
    assert_eq!(report.summary.selected, 3);
    assert_eq!(report.summary.verified_removed, 2);
    assert_eq!(report.summary.still_present, 1);
    assert_eq!(report.summary.reboot_pending, 1);

    let locked = report
        .artifacts
        .iter()
        .find(|a| a.path == fixture.cache_file.to_string_lossy())
        .unwrap();
    let result = report
        .results
        .iter()
        .find(|r| r.artifact_id == locked.id)
        .unwrap();
    assert!(result.reboot_pending);
    assert_eq!(result.retry_strategy, Some(RetryStrategy::ScheduleOnReboot));
    let record = report
        .verifications
        .iter()
        .find(|v| v.artifact_id == locked.id)
        .unwrap();
    assert_eq!(record.final_status, FinalStatus::StillPresent);

    // Initial attempt plus one retry per retrying step, for the locked file;
    // one attempt each for the other two artifacts.
    assert_eq!(*attempts.borrow(), 5);
    assert_eq!(scheduled.borrow().as_slice(), &[fixture.cache_file.clone()]);

    assert!(!fixture.data_dir.exists());
    assert!(!fixture.log_file.exists());
    assert!(fixture.cache_file.exists());
    assert!(fixture.root.join("other-app.log").exists());
}

#[test]
fn events_follow_the_ordering_contract() {
    let fixture = Fixture::new();
    let ctx = fixture.context(LockingFileSystem::new());
    let inventory = inventory();
    let mut sink = CollectingSink::new();

    DeepUninstall::new(&ctx, &inventory)
        .run(&auto_request(), &mut sink)
        .unwrap();

    let kinds = sink.kinds();
    assert_eq!(kinds.first(), Some(&"started"));
    assert_eq!(kinds.last(), Some(&"summary"));
    assert!(position(&kinds, "artifacts") < position(&kinds, "selection"));
    assert!(position(&kinds, "selection") < position(&kinds, "cleanupStarted"));
    assert!(position(&kinds, "verificationSummary") < position(&kinds, "summary"));
    assert!(!kinds.contains(&"error"));

    // Each artifactResult precedes the verification of the same artifact.
    for (idx, event) in sink.events().iter().enumerate() {
        if let Event::ArtifactVerification(record) = event {
            let result_at = sink
                .events()
                .iter()
                .position(|e| matches!(e, Event::ArtifactResult(r) if r.artifact_id == record.artifact_id))
                .unwrap();
            assert!(result_at < idx);
        }
    }
}

#[test]
fn json_stream_is_one_object_per_line() {
    let fixture = Fixture::new();
    let ctx = fixture.context(LockingFileSystem::new());
    let inventory = inventory();
    let mut sink = JsonLinesSink::new(Vec::new());

    DeepUninstall::new(&ctx, &inventory)
        .run(&auto_request().dry_run(true), &mut sink)
        .unwrap();

    let output = String::from_utf8(sink.into_inner()).unwrap();
    let events: Vec<serde_json::Value> = output
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert!(events.iter().all(|e| e["timestamp"].is_string() && e["payload"].is_object()));
    let artifacts = events.iter().find(|e| e["type"] == "artifacts").unwrap();
    assert_eq!(artifacts["payload"]["artifacts"].as_array().unwrap().len(), 3);
    let summary = events.last().unwrap();
    assert_eq!(summary["type"], "summary");
    assert_eq!(summary["payload"]["dryRun"], true);
}

#[test]
fn missing_signature_aborts_before_selection() {
    let fixture = Fixture::new();
    let selection = fixture.selection_path();
    fs::write(&selection, br#"{"selectedIds":[]}"#).unwrap();

    let ctx = fixture.context(LockingFileSystem::new());
    let inventory = inventory();
    let mut sink = CollectingSink::new();
    let request = UninstallRequest::new(APP_ID, SelectionRequest::from_file(&selection))
        .write_run_log(false);

    let err = DeepUninstall::new(&ctx, &inventory)
        .run(&request, &mut sink)
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Integrity(IntegrityError::SignatureMissing(_))
    ));
    let kinds = sink.kinds();
    assert!(!kinds.contains(&"selection"));
    assert!(!kinds.contains(&"cleanupStarted"));
    assert_eq!(kinds.last(), Some(&"error"));
    assert_eq!(kinds.iter().filter(|k| **k == "error").count(), 1);
    match sink.events().last() {
        Some(Event::Error(payload)) => assert_eq!(payload.kind, "integrity"),
        other => panic!("expected error event, got {other:?}"),
    }
    assert!(fixture.cache_file.exists());
}

#[test]
fn mutated_selection_file_is_rejected() {
    let fixture = Fixture::new();
    let ctx = fixture.context(LockingFileSystem::new());
    let inventory = inventory();

    // Learn the ids from a read-only pass, then approve everything.
    let discovery = residue_core::discovery::DiscoveryEngine::new(&ctx).discover(&support::app());
    let ids: Vec<String> = discovery.artifacts.iter().map(|a| format!("\"{}\"", a.id)).collect();
    let selection = fixture.selection_path();
    fs::write(&selection, format!(r#"{{"selectedIds":[{}]}}"#, ids.join(","))).unwrap();
    sign_file(&selection).unwrap();

    // Flip one byte after signing.
    let mut bytes = fs::read(&selection).unwrap();
    let last = bytes.len() - 2;
    bytes[last] ^= 0x20;
    fs::write(&selection, &bytes).unwrap();

    let mut sink = CollectingSink::new();
    let request = UninstallRequest::new(APP_ID, SelectionRequest::from_file(&selection))
        .write_run_log(false);
    let err = DeepUninstall::new(&ctx, &inventory)
        .run(&request, &mut sink)
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Integrity(IntegrityError::DigestMismatch { .. })
    ));
    assert!(fixture.data_dir.exists());
    assert!(fixture.log_file.exists());
    assert!(fixture.cache_file.exists());
}

#[test]
fn waiting_for_selection_times_out() {
    let fixture = Fixture::new();
    let ctx = fixture.context(LockingFileSystem::new());
    let inventory = inventory();
    let mut sink = CollectingSink::new();
    let request = UninstallRequest::new(
        APP_ID,
        SelectionRequest::from_file(fixture.selection_path())
            .waiting(Duration::from_secs(1), Duration::from_millis(50)),
    )
    .write_run_log(false);

    let started = Instant::now();
    let err = DeepUninstall::new(&ctx, &inventory)
        .run(&request, &mut sink)
        .unwrap_err();
    let waited = started.elapsed();

    assert!(matches!(
        err,
        PipelineError::Validation(ValidationError::SelectionTimeout { .. })
    ));
    assert!(waited >= Duration::from_secs(1));
    assert!(waited < Duration::from_secs(10));
    assert!(!sink.kinds().contains(&"artifactResult"));
    assert!(fixture.data_dir.exists());
    assert!(fixture.cache_file.exists());
}

#[test]
fn signed_subset_removes_only_approved_artifacts() {
    let fixture = Fixture::new();
    let ctx = fixture.context(LockingFileSystem::new());
    let inventory = inventory();

    let discovery = residue_core::discovery::DiscoveryEngine::new(&ctx).discover(&support::app());
    let log = discovery
        .artifacts
        .iter()
        .find(|a| a.path == fixture.log_file.to_string_lossy())
        .unwrap();
    let data_dir = discovery
        .artifacts
        .iter()
        .find(|a| a.artifact_type == ArtifactType::Directory)
        .unwrap();
    let body = format!(
        r#"{{"selectedIds":["{}","{}","registry-0000000000000000"],"deselectedIds":["{}"]}}"#,
        log.id, data_dir.id, data_dir.id
    );
    let selection = fixture.selection_path();
    fs::write(&selection, &body).unwrap();
    fs::write(signature_path(&selection), digest_hex(body.as_bytes())).unwrap();

    let mut sink = CollectingSink::new();
    let request = UninstallRequest::new(APP_ID, SelectionRequest::from_file(&selection))
        .write_run_log(false);
    let report = DeepUninstall::new(&ctx, &inventory)
        .run(&request, &mut sink)
        .unwrap();

    assert_eq!(report.selection.mode, SelectionMode::File);
    assert_eq!(report.selection.selected_ids, vec![log.id.clone()]);
    assert_eq!(report.selection.unknown_ids, vec!["registry-0000000000000000"]);
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.verifications.len(), 1);
    assert_eq!(report.summary.verified_removed, 1);

    assert!(!fixture.log_file.exists());
    assert!(fixture.data_dir.exists());
    assert!(fixture.cache_file.exists());
}

#[test]
fn dry_run_touches_nothing_but_reports_every_artifact() {
    let fixture = Fixture::new();
    let fs_backend = LockingFileSystem::new();
    let attempts = fs_backend.attempts.clone();
    let ctx = fixture.context(fs_backend);
    let inventory = inventory();
    let mut sink = CollectingSink::new();

    let report = DeepUninstall::new(&ctx, &inventory)
        .run(&auto_request().dry_run(true), &mut sink)
        .unwrap();

    assert_eq!(*attempts.borrow(), 0);
    assert_eq!(report.results.len(), 3);
    assert!(report.results.iter().all(|r| r.success && r.dry_run));
    assert_eq!(report.removal.freed_bytes, 80 + 10 + 128);
    assert!(
        report
            .verifications
            .iter()
            .all(|v| v.final_status == FinalStatus::StillPresent)
    );
    assert_eq!(report.summary.still_present, 3);

    assert!(fixture.data_dir.join("settings.json").exists());
    assert!(fixture.log_file.exists());
    assert!(fixture.cache_file.exists());
}

#[test]
fn unknown_application_is_fatal() {
    let fixture = Fixture::new();
    let ctx = fixture.context(LockingFileSystem::new());
    let inventory = inventory();
    let mut sink = CollectingSink::new();
    let request =
        UninstallRequest::new("Nobody.Nothing", SelectionRequest::auto_select_all()).write_run_log(false);

    let err = DeepUninstall::new(&ctx, &inventory)
        .run(&request, &mut sink)
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Validation(ValidationError::UnknownApplication(_))
    ));
    assert_eq!(sink.kinds(), vec!["started", "error"]);
}

#[test]
fn cancelled_run_removes_nothing() {
    let fixture = Fixture::new();
    let ctx = fixture.context(LockingFileSystem::new());
    let inventory = inventory();
    let mut sink = CollectingSink::new();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = DeepUninstall::new(&ctx, &inventory)
        .with_cancellation(cancel)
        .run(&auto_request(), &mut sink)
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Validation(ValidationError::Cancelled)
    ));
    let kinds = sink.kinds();
    assert_eq!(kinds.last(), Some(&"error"));
    assert!(!kinds.contains(&"cleanupStarted"));
    assert!(!kinds.contains(&"artifactResult"));
    assert!(fixture.data_dir.exists());
    assert!(fixture.cache_file.exists());
    assert!(fixture.log_file.exists());
}

#[test]
fn run_log_is_written_when_enabled() {
    let fixture = Fixture::new();
    let log_dir = fixture.temp.path().join("runs");
    let mut config = fixture.config();
    config.run_log.enabled = true;
    config.run_log.dir = Some(log_dir.clone());
    let ctx = support::context_with(
        config,
        support::MemoryRegistry::new(),
        support::MemoryServices::default(),
        LockingFileSystem::new(),
    );
    let inventory = inventory();
    let mut sink = CollectingSink::new();
    let request = UninstallRequest::new(APP_ID, SelectionRequest::auto_select_all()).dry_run(true);

    let report = DeepUninstall::new(&ctx, &inventory)
        .run(&request, &mut sink)
        .unwrap();

    let path = report.run_log.expect("run log path");
    assert!(path.starts_with(&log_dir));
    assert!(path.file_name().unwrap().to_string_lossy().ends_with("-Acme.FooApp.json"));
    let document: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(document["application"]["appId"], APP_ID);
    assert_eq!(document["results"].as_array().unwrap().len(), 3);
    assert_eq!(document["summary"]["stillPresent"], 3);
}

//! Pipeline event stream.
//!
//! Every event is one JSON object `{"type", "payload", "timestamp"}` on its
//! own line. Ordering: `artifacts` before `selection`, `selection` before
//! `cleanupStarted`, each `artifactResult` before its `artifactVerification`,
//! and `verificationSummary` before `summary`.

use std::io::Write;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::discovery::DiscoveryReport;
use crate::inventory::ApplicationRecord;
use crate::pipeline::RunSummary;
use crate::removal::RemovalSummary;
use crate::selection::Selection;
use crate::types::{Artifact, RemovalResult, VerificationRecord};
use crate::verification::VerificationSummary;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Event {
    Started(StartedPayload),
    DiscoveryStarted(DiscoveryStartedPayload),
    DiscoveryCompleted(DiscoveryReport),
    Artifacts(ArtifactsPayload),
    Selection(Selection),
    CleanupStarted(CleanupStartedPayload),
    ArtifactResult(RemovalResult),
    ArtifactVerification(VerificationRecord),
    VerificationSummary(VerificationSummary),
    CleanupCompleted(RemovalSummary),
    Summary(RunSummary),
    Error(ErrorPayload),
}

impl Event {
    /// The `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Started(_) => "started",
            Event::DiscoveryStarted(_) => "discoveryStarted",
            Event::DiscoveryCompleted(_) => "discoveryCompleted",
            Event::Artifacts(_) => "artifacts",
            Event::Selection(_) => "selection",
            Event::CleanupStarted(_) => "cleanupStarted",
            Event::ArtifactResult(_) => "artifactResult",
            Event::ArtifactVerification(_) => "artifactVerification",
            Event::VerificationSummary(_) => "verificationSummary",
            Event::CleanupCompleted(_) => "cleanupCompleted",
            Event::Summary(_) => "summary",
            Event::Error(_) => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedPayload {
    pub app_id: String,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryStartedPayload {
    pub application: ApplicationRecord,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactsPayload {
    pub artifacts: Vec<Artifact>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupStartedPayload {
    pub count: usize,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    /// `validation`, `integrity` or `sink`
    pub kind: String,
    pub message: String,
}

/// Wire form of an event.
#[derive(Serialize)]
struct Envelope<'a> {
    #[serde(flatten)]
    event: &'a Event,
    timestamp: DateTime<Utc>,
}

/// Receives pipeline events as they happen.
pub trait EventSink {
    fn emit(&mut self, event: &Event) -> anyhow::Result<()>;
}

/// Newline-delimited JSON, flushed after every event.
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> EventSink for JsonLinesSink<W> {
    fn emit(&mut self, event: &Event) -> anyhow::Result<()> {
        let envelope = Envelope {
            event,
            timestamp: Utc::now(),
        };
        let line = serde_json::to_string(&envelope)
            .with_context(|| format!("Failed to serialize {} event", event.kind()))?;
        writeln!(self.writer, "{}", line).context("Failed to write event")?;
        self.writer.flush().context("Failed to flush event stream")?;
        Ok(())
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Vec<Event>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events.iter().map(Event::kind).collect()
    }
}

impl EventSink for CollectingSink {
    fn emit(&mut self, event: &Event) -> anyhow::Result<()> {
        self.events.push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_line_has_type_timestamp_and_payload() {
        let mut sink = JsonLinesSink::new(Vec::new());
        sink.emit(&Event::CleanupStarted(CleanupStartedPayload {
            count: 3,
            dry_run: true,
        }))
        .unwrap();
        sink.emit(&Event::Error(ErrorPayload {
            kind: "integrity".into(),
            message: "digest mismatch".into(),
        }))
        .unwrap();

        let output = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["type"], "cleanupStarted");
        assert_eq!(first["payload"]["count"], 3);
        assert_eq!(first["payload"]["dryRun"], true);
        assert!(
            DateTime::parse_from_rfc3339(first["timestamp"].as_str().unwrap()).is_ok(),
            "timestamp is RFC 3339"
        );

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["type"], "error");
        assert_eq!(second["payload"]["kind"], "integrity");
    }

    #[test]
    fn kind_matches_serialized_tag() {
        let event = Event::Artifacts(ArtifactsPayload { artifacts: vec![] });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], event.kind());
    }

    #[test]
    fn collecting_sink_keeps_order() {
        let mut sink = CollectingSink::new();
        sink.emit(&Event::Started(StartedPayload {
            app_id: "Foo.Bar".into(),
            dry_run: false,
        }))
        .unwrap();
        sink.emit(&Event::Artifacts(ArtifactsPayload { artifacts: vec![] }))
            .unwrap();
        assert_eq!(sink.kinds(), vec!["started", "artifacts"]);
    }
}

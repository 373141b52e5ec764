//! Selection protocol.
//!
//! A host approves artifacts either with an auto-select-all directive or by
//! writing a selection file plus its `.sha256` signature. The file is read
//! once; the digest and the JSON parse come from the same bytes.
//!
//! ```text
//! AwaitingSelection --file present, signature ok, schema ok--> Validated
//! Validated --intersect with discovered ids--> Resolved
//! ```

pub mod payload;
pub mod signature;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cancel::{CancellationToken, Deadline};
use crate::error::{IntegrityError, PipelineError, ValidationError};
use crate::types::Artifact;

pub use payload::SelectionPayload;
pub use signature::{digest_hex, sign_file, signature_path};

/// Where the approval comes from.
#[derive(Debug, Clone, Default)]
pub struct SelectionRequest {
    pub auto_select_all: bool,
    pub file: Option<PathBuf>,
    /// Poll for the file instead of failing when it is absent
    pub wait: bool,
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl SelectionRequest {
    pub fn auto_select_all() -> Self {
        Self {
            auto_select_all: true,
            ..Self::default()
        }
    }

    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            file: Some(path.into()),
            timeout: Duration::from_secs(600),
            poll_interval: Duration::from_millis(500),
            ..Self::default()
        }
    }

    pub fn waiting(mut self, timeout: Duration, poll_interval: Duration) -> Self {
        self.wait = true;
        self.timeout = timeout;
        self.poll_interval = poll_interval;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SelectionMode {
    AutoSelectAll,
    File,
}

/// The resolved selection; this is also the `selection` event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    pub mode: SelectionMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    /// Approved ids, in discovery order
    pub selected_ids: Vec<String>,
    /// Approved ids that name no discovered artifact
    pub unknown_ids: Vec<String>,
}

impl Selection {
    /// The approved artifacts, in discovery order.
    pub fn artifacts<'a>(&self, discovered: &'a [Artifact]) -> Vec<&'a Artifact> {
        discovered
            .iter()
            .filter(|a| self.selected_ids.contains(&a.id))
            .collect()
    }
}

#[derive(Debug)]
pub enum SelectionState {
    AwaitingSelection,
    Validated {
        mode: SelectionMode,
        file: Option<PathBuf>,
        payload: Option<SelectionPayload>,
    },
    Resolved(Selection),
}

/// Drives one selection from `AwaitingSelection` to `Resolved`.
pub struct SelectionProtocol<'a> {
    request: &'a SelectionRequest,
    cancel: &'a CancellationToken,
}

impl<'a> SelectionProtocol<'a> {
    pub fn new(request: &'a SelectionRequest, cancel: &'a CancellationToken) -> Self {
        Self { request, cancel }
    }

    pub fn resolve(&self, discovered: &[Artifact]) -> Result<Selection, PipelineError> {
        let mut state = SelectionState::AwaitingSelection;
        loop {
            state = match state {
                SelectionState::AwaitingSelection => self.await_selection()?,
                SelectionState::Validated {
                    mode,
                    file,
                    payload,
                } => SelectionState::Resolved(resolve_ids(mode, file, payload, discovered)),
                SelectionState::Resolved(selection) => return Ok(selection),
            };
        }
    }

    fn await_selection(&self) -> Result<SelectionState, PipelineError> {
        if self.cancel.is_cancelled() {
            return Err(ValidationError::Cancelled.into());
        }
        let request = self.request;
        let auto = || SelectionState::Validated {
            mode: SelectionMode::AutoSelectAll,
            file: None,
            payload: None,
        };
        let Some(path) = request.file.as_deref() else {
            if request.auto_select_all {
                return Ok(auto());
            }
            return Err(ValidationError::NoSelectionSource.into());
        };

        if !path.exists() {
            if request.auto_select_all {
                tracing::info!(path = %path.display(), "selection file absent, selecting all");
                return Ok(auto());
            }
            if !request.wait {
                return Err(ValidationError::SelectionMissing(path.to_path_buf()).into());
            }
            self.wait_for(path)?;
        }

        let payload = read_signed(path)?;
        tracing::info!(
            path = %path.display(),
            selected = payload.selected_ids.len(),
            deselected = payload.deselected_ids.len(),
            "selection file validated"
        );
        Ok(SelectionState::Validated {
            mode: SelectionMode::File,
            file: Some(path.to_path_buf()),
            payload: Some(payload),
        })
    }

    fn wait_for(&self, path: &Path) -> Result<(), ValidationError> {
        let deadline = Deadline::after(self.request.timeout);
        let poll = self.request.poll_interval.max(Duration::from_millis(1));
        tracing::info!(
            path = %path.display(),
            timeout_secs = deadline.limit().as_secs(),
            "waiting for selection file"
        );
        loop {
            if self.cancel.is_cancelled() {
                return Err(ValidationError::Cancelled);
            }
            if path.exists() {
                return Ok(());
            }
            if deadline.expired() {
                return Err(ValidationError::SelectionTimeout {
                    path: path.to_path_buf(),
                    waited: deadline.elapsed(),
                });
            }
            std::thread::sleep(poll.min(deadline.remaining()));
        }
    }
}

/// Read the selection file once, check its signature, then its schema.
pub fn read_signed(path: &Path) -> Result<SelectionPayload, PipelineError> {
    let bytes = fs::read(path).map_err(|source| IntegrityError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    signature::verify(path, &bytes)?;
    let payload =
        SelectionPayload::from_slice(&bytes).map_err(|err| ValidationError::MalformedSelection {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
    Ok(payload)
}

fn resolve_ids(
    mode: SelectionMode,
    file: Option<PathBuf>,
    payload: Option<SelectionPayload>,
    discovered: &[Artifact],
) -> Selection {
    let Some(payload) = payload else {
        return Selection {
            mode,
            file,
            selected_ids: discovered.iter().map(|a| a.id.clone()).collect(),
            unknown_ids: Vec::new(),
        };
    };
    let approved = payload.effective_ids();
    let selected_ids: Vec<String> = discovered
        .iter()
        .filter(|a| approved.contains(a.id.as_str()))
        .map(|a| a.id.clone())
        .collect();
    let unknown_ids: Vec<String> = approved
        .into_iter()
        .filter(|id| !discovered.iter().any(|a| a.id == *id))
        .map(str::to_string)
        .collect();
    if !unknown_ids.is_empty() {
        tracing::warn!(?unknown_ids, "selection names ids that were not discovered, ignoring");
    }
    Selection {
        mode,
        file,
        selected_ids,
        unknown_ids,
    }
}

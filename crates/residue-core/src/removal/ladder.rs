//! Escalation ladder for in-use files and directories.

use std::io;
use std::path::Path;
use std::thread;
use std::time::Duration;

use crate::context::RunContext;
use crate::error::RemovalError;
use crate::platform::is_in_use;
use crate::types::{ArtifactType, RetryStrategy};

/// How a climb up the ladder ended.
#[derive(Debug)]
pub enum LadderOutcome {
    Removed,
    RebootPending,
    Failed(RemovalError),
}

#[derive(Debug)]
pub struct Escalation {
    /// Last step attempted, if any
    pub last_step: Option<RetryStrategy>,
    pub outcome: LadderOutcome,
}

pub struct Ladder<'a> {
    ctx: &'a RunContext,
    steps: &'a [RetryStrategy],
    delay: Duration,
}

impl<'a> Ladder<'a> {
    pub fn new(ctx: &'a RunContext) -> Self {
        let removal = &ctx.config().removal;
        Self {
            ctx,
            steps: &removal.escalation,
            delay: removal.retry_delay(),
        }
    }

    /// Climb the configured steps after `attempt` failed with an in-use error.
    ///
    /// Stops at the first step that clears the resource, or as soon as a retry
    /// fails for a reason other than the resource being in use.
    pub fn climb<F>(
        &self,
        artifact_type: ArtifactType,
        path: &Path,
        first_error: io::Error,
        mut attempt: F,
    ) -> Escalation
    where
        F: FnMut() -> io::Result<()>,
    {
        let mut last_error = first_error;
        let mut last_step = None;

        for &step in self.steps {
            last_step = Some(step);
            tracing::info!(path = %path.display(), strategy = %step, "escalating");

            let result = match step {
                RetryStrategy::RetryAfterDelay => {
                    thread::sleep(self.delay);
                    attempt()
                }
                RetryStrategy::StopOwningProcess => {
                    self.stop_holders(path);
                    thread::sleep(self.delay);
                    attempt()
                }
                RetryStrategy::ScheduleOnReboot => {
                    match self.ctx.filesystem().schedule_delete_on_reboot(path) {
                        Ok(()) => {
                            tracing::info!(path = %path.display(), "removal scheduled for next reboot");
                            return Escalation {
                                last_step,
                                outcome: LadderOutcome::RebootPending,
                            };
                        }
                        Err(err) => {
                            tracing::warn!(path = %path.display(), error = %err, "could not schedule removal on reboot");
                            last_error = err;
                            continue;
                        }
                    }
                }
            };

            match result {
                Ok(()) => {
                    return Escalation {
                        last_step,
                        outcome: LadderOutcome::Removed,
                    };
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    return Escalation {
                        last_step,
                        outcome: LadderOutcome::Removed,
                    };
                }
                Err(err) if is_in_use(&err) => last_error = err,
                Err(err) => {
                    return Escalation {
                        last_step,
                        outcome: LadderOutcome::Failed(RemovalError::Failed {
                            artifact_type,
                            path: path.display().to_string(),
                            reason: err.to_string(),
                        }),
                    };
                }
            }
        }

        Escalation {
            last_step,
            outcome: LadderOutcome::Failed(RemovalError::InUse {
                path: path.display().to_string(),
                source: last_error,
            }),
        }
    }

    fn stop_holders(&self, path: &Path) {
        let processes = self.ctx.processes();
        let holders = match processes.holders(path) {
            Ok(holders) => holders,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "could not list owning processes");
                return;
            }
        };
        if holders.is_empty() {
            tracing::debug!(path = %path.display(), "no owning process found");
        }
        for holder in holders {
            match processes.terminate(holder.pid) {
                Ok(()) => tracing::info!(pid = holder.pid, name = %holder.name, "terminated owning process"),
                Err(err) => tracing::warn!(pid = holder.pid, error = %err, "failed to terminate owning process"),
            }
        }
    }
}

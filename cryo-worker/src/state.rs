//! Process-wide worker state
//!
//! Worker and job identity are written by the dispatcher and the job
//! sequence and read by the heartbeat task. The state lives behind a single
//! mutex so a heartbeat report can never observe a torn job id.

use cryo_core::domain::job::JobId;
use cryo_core::domain::worker::WorkerIdentity;

/// Mutable identity state shared by the dispatcher, the job sequence and
/// the heartbeat task.
#[derive(Debug, Default)]
pub struct WorkerState {
    /// Identity assigned at registration; `None` until the handshake
    /// completes
    pub identity: Option<WorkerIdentity>,

    /// Current job, or the nil sentinel while idle
    pub job: JobId,
}

impl WorkerState {
    pub fn new() -> Self {
        Self {
            identity: None,
            job: JobId::none(),
        }
    }

    /// Returns the worker to the idle state.
    pub fn clear_job(&mut self) {
        self.job = JobId::none();
    }
}

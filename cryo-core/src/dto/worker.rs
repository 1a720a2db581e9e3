//! Worker lifecycle DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::job::JobId;

/// Body of the `registerResponse` message assigning a worker its identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub worker_id: String,
    pub server_name: String,
}

/// Body of the periodic `report` message announcing worker liveness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerReport {
    pub worker_id: String,
    /// Current job, or the nil sentinel while idle
    pub job_id: JobId,
    pub sent_at: DateTime<Utc>,
}

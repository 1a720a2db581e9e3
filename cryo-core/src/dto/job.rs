//! Job control DTOs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body of a `startJob` control message.
///
/// Recovery requests (`recoverJob`) carry the same fields; the header
/// alone distinguishes the two.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStart {
    pub id: Uuid,
    /// `host:user:credential:path` of the payload to execute
    pub source_path: String,
    /// `host:user:credential:path` prefix the result is uploaded under
    pub result_path: String,
    /// `host:user:credential:path` prefix checkpoints are archived under
    pub backup_path: String,
}

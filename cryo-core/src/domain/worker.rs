//! Worker identity
//!
//! Assigned once by the controller's registration response and held for the
//! lifetime of the process. Read by every outbound message and by log output.

use serde::{Deserialize, Serialize};

/// Identity assigned to a worker at registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerIdentity {
    /// Controller-assigned unique worker id
    pub worker_id: String,
    /// Name of the server this worker was registered against
    pub server_name: String,
}

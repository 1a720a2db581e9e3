//! Message vocabulary
//!
//! Control and report messages are tagged with a type header. Inbound
//! headers are decoded once at the channel boundary into a closed variant
//! set and matched exhaustively by the dispatcher; outbound messages carry
//! a fixed header per type.

use serde::{Deserialize, Serialize};

/// A raw message as delivered from a worker queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    /// Message-type header. Deliveries without one are silently ignored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    /// JSON-encoded message body
    pub body: String,
}

/// Classification of an inbound control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundType {
    StartJob,
    RecoverJob,
    StopJob,
    RegisterResponse,
    /// A header value outside the control vocabulary
    Unknown,
}

impl InboundType {
    /// Decodes a type header. Unrecognized values map to `Unknown` rather
    /// than an error; the dispatcher drops them.
    pub fn classify(header: &str) -> Self {
        match header {
            "startJob" => Self::StartJob,
            "recoverJob" => Self::RecoverJob,
            "stopJob" => Self::StopJob,
            "registerResponse" => Self::RegisterResponse,
            _ => Self::Unknown,
        }
    }
}

/// Message types a worker publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundType {
    /// Acknowledges acceptance of a job message, echoing the job id
    StartJobAck,
    /// Announces clean completion of a job
    JobDone,
    /// Acknowledges a stop request
    StopJobAck,
    /// Periodic liveness report
    Report,
}

impl OutboundType {
    /// Wire header carried by the published message.
    pub fn header(&self) -> &'static str {
        match self {
            Self::StartJobAck => "startJob",
            Self::JobDone => "jobDone",
            Self::StopJobAck => "stopJob",
            Self::Report => "report",
        }
    }
}

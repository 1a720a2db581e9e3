//! Job domain types
//!
//! A worker owns at most one job at a time. The job's identity and its three
//! remote paths are parsed once from the triggering control message and stay
//! immutable for the job's lifetime.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Identity of the job currently owned by a worker.
///
/// The nil UUID is the explicit "no job" sentinel reported while idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// The "no job" sentinel.
    pub fn none() -> Self {
        Self(Uuid::nil())
    }

    pub fn is_none(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::none()
    }
}

impl From<Uuid> for JobId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Error raised when a job message carries a malformed remote path
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathParseError {
    /// The path string had fewer than the four colon-delimited parts
    #[error("remote path {0:?} must be of the form host:user:credential:path")]
    MissingParts(String),
}

/// A remote-storage location encoded as `host:user:credential:path`.
///
/// The path component may itself contain colons; only the first three
/// delimiters are significant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePath {
    pub host: String,
    pub user: String,
    pub credential: String,
    pub path: String,
}

impl FromStr for RemotePath {
    type Err = PathParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(4, ':');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(host), Some(user), Some(credential), Some(path)) => Ok(Self {
                host: host.to_string(),
                user: user.to_string(),
                credential: credential.to_string(),
                path: path.to_string(),
            }),
            _ => Err(PathParseError::MissingParts(s.to_string())),
        }
    }
}

/// Everything a worker derives from one accepted job message.
///
/// Parsed once per job and reused; immutable for the job's lifetime.
#[derive(Debug, Clone)]
pub struct JobDescriptor {
    pub id: JobId,
    /// Where the payload is downloaded from
    pub source: RemotePath,
    /// Prefix the result file is uploaded under
    pub result: RemotePath,
    /// Prefix checkpoint snapshots are archived under
    pub backup: RemotePath,
    /// Last `/`-segment of the source path string
    pub payload_name: String,
}

impl JobDescriptor {
    /// Parses the three path strings of a job message.
    ///
    /// Any malformed path is fatal to the job's acceptance.
    pub fn parse(
        id: Uuid,
        source_path: &str,
        result_path: &str,
        backup_path: &str,
    ) -> Result<Self, PathParseError> {
        let source: RemotePath = source_path.parse()?;
        let result: RemotePath = result_path.parse()?;
        let backup: RemotePath = backup_path.parse()?;

        // The payload keeps the name it has on the remote store.
        let payload_name = source_path
            .rsplit('/')
            .next()
            .unwrap_or(source_path)
            .to_string();

        Ok(Self {
            id: JobId::new(id),
            source,
            result,
            backup,
            payload_name,
        })
    }
}

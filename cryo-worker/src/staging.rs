//! Local staging operations
//!
//! Moves payloads, checkpoints and results between the staging root, the
//! runtime scratch area and the execution environment, and owns the purge
//! of the staging root at job end.
//!
//! Staging layout: the downloaded payload and recovery archive sit directly
//! under the root, each shipped checkpoint generation gets its own
//! subdirectory, and the extracted result file lands next to them. The
//! whole root is cleared unconditionally when a job finishes.

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info};

/// File staging between local storage and the execution environment.
#[async_trait]
pub trait StagingOperations: Send + Sync {
    /// Fails when the given staged file is missing.
    async fn validate_presence(&self, local: &Path) -> Result<()>;

    /// Copies a staged payload into the named environment.
    async fn move_payload_in(&self, payload_name: &str, env_name: &str) -> Result<()>;

    /// Makes a downloaded checkpoint archive available for a restore of
    /// the environment.
    async fn move_checkpoint_in(&self, checkpoint_name: &str, env_id: &str) -> Result<()>;

    /// Stages a freshly taken checkpoint archive out of the runtime
    /// scratch area into its own staging subdirectory.
    async fn move_checkpoint_out(&self, checkpoint_name: &str, env_id: &str) -> Result<()>;

    /// Copies the result file out of the environment into staging.
    async fn extract_result(&self, result_name: &str, env_id: &str) -> Result<()>;

    /// Removes every file and subdirectory under the staging root.
    async fn purge_all(&self) -> Result<()>;
}

/// Staging over the local filesystem and `podman cp`
pub struct LocalStaging {
    staging_dir: PathBuf,
    scratch_dir: PathBuf,
}

impl LocalStaging {
    pub fn new(staging_dir: PathBuf, scratch_dir: PathBuf) -> Self {
        Self {
            staging_dir,
            scratch_dir,
        }
    }

    /// Archive location in the runtime scratch area, matching the runtime
    /// engine's naming.
    fn scratch_archive(&self, checkpoint_name: &str) -> PathBuf {
        self.scratch_dir.join(format!("{}.tar.gz", checkpoint_name))
    }

    /// Archive location in the staging root for a downloaded recovery
    /// checkpoint.
    fn staged_archive(&self, checkpoint_name: &str) -> PathBuf {
        self.staging_dir.join(format!("{}.tar.gz", checkpoint_name))
    }

    fn podman_cp(&self, from: &str, to: &str) -> Result<()> {
        debug!("podman cp {} {}", from, to);

        let output = Command::new("podman")
            .arg("cp")
            .arg(from)
            .arg(to)
            .output()
            .context("Failed to execute podman cp")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("podman cp {} -> {} failed: {}", from, to, stderr.trim());
        }

        Ok(())
    }
}

#[async_trait]
impl StagingOperations for LocalStaging {
    async fn validate_presence(&self, local: &Path) -> Result<()> {
        std::fs::metadata(local)
            .with_context(|| format!("staged file {} is missing", local.display()))?;
        Ok(())
    }

    async fn move_payload_in(&self, payload_name: &str, env_name: &str) -> Result<()> {
        let local = self.staging_dir.join(payload_name);
        let target = format!("{}:/{}", env_name, payload_name);
        self.podman_cp(&local.to_string_lossy(), &target)?;

        debug!("Staged payload {} into {}", payload_name, env_name);
        Ok(())
    }

    async fn move_checkpoint_in(&self, checkpoint_name: &str, env_id: &str) -> Result<()> {
        let staged = self.staged_archive(checkpoint_name);
        let scratch = self.scratch_archive(checkpoint_name);

        std::fs::create_dir_all(&self.scratch_dir)
            .context("Failed to create runtime scratch directory")?;
        std::fs::copy(&staged, &scratch).with_context(|| {
            format!("Failed to stage checkpoint archive {}", staged.display())
        })?;

        debug!(
            "Staged recovery checkpoint {} for environment {}",
            checkpoint_name, env_id
        );
        Ok(())
    }

    async fn move_checkpoint_out(&self, checkpoint_name: &str, env_id: &str) -> Result<()> {
        let scratch = self.scratch_archive(checkpoint_name);
        let generation_dir = self.staging_dir.join(checkpoint_name);
        let staged = generation_dir.join(format!("{}.tar.gz", checkpoint_name));

        std::fs::create_dir_all(&generation_dir)
            .context("Failed to create checkpoint staging directory")?;
        std::fs::rename(&scratch, &staged).with_context(|| {
            format!(
                "Failed to move checkpoint archive {} out of scratch",
                scratch.display()
            )
        })?;

        debug!(
            "Staged checkpoint {} from environment {}",
            checkpoint_name, env_id
        );
        Ok(())
    }

    async fn extract_result(&self, result_name: &str, env_id: &str) -> Result<()> {
        let source = format!("{}:/{}", env_id, result_name);
        let local = self.staging_dir.join(result_name);
        self.podman_cp(&source, &local.to_string_lossy())?;

        debug!("Extracted result {} from {}", result_name, env_id);
        Ok(())
    }

    async fn purge_all(&self) -> Result<()> {
        let entries = match std::fs::read_dir(&self.staging_dir) {
            Ok(entries) => entries,
            // Nothing was ever staged.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(e).context("Failed to read staging directory");
            }
        };

        for entry in entries {
            let entry = entry.context("Failed to read staging directory entry")?;
            let path = entry.path();
            if entry
                .file_type()
                .context("Failed to inspect staging entry")?
                .is_dir()
            {
                std::fs::remove_dir_all(&path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
            } else {
                std::fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
            }
        }

        info!("Purged staging storage at {}", self.staging_dir.display());
        Ok(())
    }
}

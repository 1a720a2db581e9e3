//! Podman runtime engine
//!
//! Lifecycle operations on the single named execution environment:
//! - Checking podman availability
//! - Creating, starting, stopping and deleting the environment
//! - Checkpointing a running environment into an archive
//! - Restoring an environment from a previously staged archive
//!
//! Checkpoint archives live in a scratch directory shared with the staging
//! layer: `checkpoint` exports into it and `restore` imports from it.

use std::path::PathBuf;
use std::process::Command;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info};

/// Checks if podman is installed and available
pub fn check_podman_available() -> Result<()> {
    let output = Command::new("podman")
        .arg("--version")
        .output()
        .context("Failed to execute 'podman --version'. Is podman installed?")?;

    if !output.status.success() {
        anyhow::bail!("Podman is not working correctly");
    }

    let version = String::from_utf8_lossy(&output.stdout);
    info!("Podman is available: {}", version.trim());

    Ok(())
}

/// Lifecycle operations on a single named execution environment.
///
/// The orchestrator drives this trait; [`PodmanRuntime`] is the production
/// implementation.
#[async_trait]
pub trait RuntimeClient: Send + Sync {
    /// Creates the environment and returns its runtime id.
    async fn create_environment(&self, name: &str, image: &str, payload_ref: &str)
    -> Result<String>;

    /// Resolves the environment id by name; `None` when no such
    /// environment exists.
    async fn resolve_id(&self, name: &str) -> Result<Option<String>>;

    async fn start(&self, id: &str) -> Result<()>;

    async fn stop(&self, id: &str) -> Result<()>;

    /// Snapshots the named environment under `checkpoint_name`, leaving it
    /// running.
    async fn checkpoint(&self, name: &str, checkpoint_name: &str) -> Result<()>;

    /// Recreates the named environment from a previously staged checkpoint
    /// archive.
    async fn restore(&self, checkpoint_name: &str, name: &str) -> Result<()>;

    async fn is_running(&self, id: &str) -> Result<bool>;

    async fn delete(&self, id: &str) -> Result<()>;
}

/// Podman-backed runtime engine
pub struct PodmanRuntime {
    /// Directory checkpoint archives are exported to and imported from
    scratch_dir: PathBuf,
}

impl PodmanRuntime {
    /// Creates a new podman runtime
    ///
    /// # Arguments
    /// * `scratch_dir` - Directory for checkpoint archives, shared with the
    ///   staging layer
    pub fn new(scratch_dir: PathBuf) -> Self {
        Self { scratch_dir }
    }

    /// Archive location for a checkpoint name, matching the staging
    /// layer's naming.
    fn archive_path(&self, checkpoint_name: &str) -> PathBuf {
        self.scratch_dir.join(format!("{}.tar.gz", checkpoint_name))
    }
}

/// Runs one podman command, logging its output and failing with the
/// captured stderr on a non-zero exit.
fn podman(args: &[&str]) -> Result<String> {
    debug!("podman {}", args.join(" "));

    let output = Command::new("podman")
        .args(args)
        .output()
        .context("Failed to execute podman command")?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    if !stderr.trim().is_empty() {
        debug!("podman stderr: {}", stderr.trim());
    }

    if !output.status.success() {
        let exit_code = output.status.code().unwrap_or(-1);
        anyhow::bail!(
            "podman {} failed: exit_code={}, stderr='{}'",
            args.first().copied().unwrap_or(""),
            exit_code,
            stderr.trim()
        );
    }

    Ok(stdout.trim().to_string())
}

#[async_trait]
impl RuntimeClient for PodmanRuntime {
    async fn create_environment(
        &self,
        name: &str,
        image: &str,
        payload_ref: &str,
    ) -> Result<String> {
        std::fs::create_dir_all(&self.scratch_dir)
            .context("Failed to create runtime scratch directory")?;

        info!("Creating environment {} from image {}", name, image);

        let payload = format!("/{}", payload_ref);
        let id = podman(&["create", "--name", name, image, "python", &payload])?;

        info!("Environment {} created with id {}", name, id);
        Ok(id)
    }

    async fn resolve_id(&self, name: &str) -> Result<Option<String>> {
        match podman(&["inspect", "--format", "{{.Id}}", name]) {
            Ok(id) => Ok(Some(id)),
            Err(e) => {
                debug!("No environment named {}: {:#}", name, e);
                Ok(None)
            }
        }
    }

    async fn start(&self, id: &str) -> Result<()> {
        podman(&["start", id])?;
        Ok(())
    }

    async fn stop(&self, id: &str) -> Result<()> {
        podman(&["stop", id])?;
        Ok(())
    }

    async fn checkpoint(&self, name: &str, checkpoint_name: &str) -> Result<()> {
        let archive = self.archive_path(checkpoint_name);
        let archive = archive.to_string_lossy();

        podman(&[
            "container",
            "checkpoint",
            "--leave-running",
            "--export",
            &archive,
            name,
        ])?;

        debug!("Checkpointed {} -> {}", name, archive);
        Ok(())
    }

    async fn restore(&self, checkpoint_name: &str, name: &str) -> Result<()> {
        let archive = self.archive_path(checkpoint_name);
        let archive = archive.to_string_lossy();

        // The placeholder created earlier holds the name; restore replaces
        // it with the checkpointed instance.
        let _ = podman(&["rm", "-f", name]);

        podman(&[
            "container",
            "restore",
            "--import",
            &archive,
            "--name",
            name,
        ])?;

        info!("Restored environment {} from {}", name, archive);
        Ok(())
    }

    async fn is_running(&self, id: &str) -> Result<bool> {
        let state = podman(&["inspect", "--format", "{{.State.Running}}", id])?;
        Ok(state == "true")
    }

    async fn delete(&self, id: &str) -> Result<()> {
        podman(&["rm", "-f", id])?;
        info!("Environment {} removed", id);
        Ok(())
    }
}

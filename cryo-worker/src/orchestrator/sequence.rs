//! Start/recover execution sequence and checkpoint loop
//!
//! Drives one job from environment creation to result upload. Checkpoint
//! failures abandon further checkpointing but never the salvage of the
//! result, and `jobDone` is only published after a clean stop.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::time;
use tracing::{info, warn};

use cryo_core::domain::checkpoint::CheckpointSequence;
use cryo_core::domain::job::JobDescriptor;
use cryo_core::message::OutboundType;

use super::{LaunchMode, Orchestrator};
use crate::storage::RemoteStorage;

/// Terminal outcome of the checkpoint loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopOutcome {
    /// The environment stopped running on its own
    StoppedCleanly,
    /// An iteration failed and checkpointing was abandoned
    Aborted(String),
}

impl Orchestrator {
    /// Runs the full execution sequence for one accepted job.
    ///
    /// Extraction, environment deletion and the result upload run even
    /// when the checkpoint loop aborted: whatever the environment produced
    /// is still delivered. Completion is only acknowledged after a clean
    /// stop.
    pub(super) async fn execute_job(
        &self,
        descriptor: JobDescriptor,
        mode: LaunchMode,
        storage: Arc<dyn RemoteStorage>,
    ) -> Result<()> {
        info!(
            "Creating environment {} for job {}",
            self.config.container_name, descriptor.id
        );
        self.runtime
            .create_environment(
                &self.config.container_name,
                &self.config.image,
                &descriptor.payload_name,
            )
            .await
            .context("Failed to create environment")?;

        let env_id = self
            .runtime
            .resolve_id(&self.config.container_name)
            .await?
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Environment {} vanished after creation",
                    self.config.container_name
                )
            })?;

        if mode == LaunchMode::Recover {
            self.staging
                .move_checkpoint_in(&self.config.checkpoint_base, &env_id)
                .await
                .context("Failed to stage recovery checkpoint")?;
        }

        let payload_local = self.config.staging_dir.join(&descriptor.payload_name);
        self.staging.validate_presence(&payload_local).await?;
        self.staging
            .move_payload_in(&descriptor.payload_name, &self.config.container_name)
            .await
            .context("Failed to stage payload")?;

        match mode {
            LaunchMode::Recover => {
                info!(
                    "Restoring environment {} from checkpoint {}",
                    env_id, self.config.checkpoint_base
                );
                self.runtime
                    .restore(&self.config.checkpoint_base, &self.config.container_name)
                    .await
                    .context("Failed to restore environment")?;
            }
            LaunchMode::Fresh => {
                info!("Starting environment {}", env_id);
                self.runtime
                    .start(&env_id)
                    .await
                    .context("Failed to start environment")?;
            }
        }

        let started = Instant::now();
        let outcome = self
            .checkpoint_loop(&descriptor, &env_id, mode, storage.as_ref())
            .await;
        info!(
            "Environment for job {} ran {:?} with payload {}",
            descriptor.id,
            started.elapsed(),
            descriptor.payload_name
        );

        // Salvage whatever the environment produced, clean run or not.
        info!(
            "Extracting result {} from environment {}",
            self.config.result_name, env_id
        );
        self.staging
            .extract_result(&self.config.result_name, &env_id)
            .await
            .context("Failed to extract result")?;

        self.runtime
            .delete(&env_id)
            .await
            .context("Failed to delete environment")?;

        let result_local = self.config.staging_dir.join(&self.config.result_name);
        let result_remote = format!("{}{}", descriptor.result.path, self.config.result_name);
        storage
            .upload_file(&result_local, &result_remote)
            .await
            .context("Failed to upload result")?;
        info!("Uploaded result to {}", result_remote);

        match outcome {
            LoopOutcome::StoppedCleanly => {
                self.channel
                    .publish(OutboundType::JobDone, descriptor.id.to_string())
                    .await?;
                info!("Job {} done", descriptor.id);
            }
            LoopOutcome::Aborted(reason) => {
                warn!(
                    "Job {} salvaged after checkpointing aborted: {}",
                    descriptor.id, reason
                );
            }
        }

        self.state.lock().unwrap().clear_job();
        self.staging
            .purge_all()
            .await
            .context("Failed to purge staging storage")?;

        Ok(())
    }

    /// Periodically snapshots the running environment and ships each
    /// snapshot to the job's backup path.
    ///
    /// Any error inside an iteration abandons checkpointing immediately;
    /// there is no retry. The surrounding sequence still salvages the
    /// result.
    pub(super) async fn checkpoint_loop(
        &self,
        descriptor: &JobDescriptor,
        env_id: &str,
        mode: LaunchMode,
        storage: &dyn RemoteStorage,
    ) -> LoopOutcome {
        let mut sequence = CheckpointSequence::new();

        let mut running = match self.runtime.is_running(env_id).await {
            Ok(running) => running,
            Err(e) => return LoopOutcome::Aborted(format!("running probe failed: {e:#}")),
        };

        while running {
            match self
                .checkpoint_iteration(descriptor, env_id, mode, storage, &mut sequence)
                .await
            {
                Ok(still_running) => running = still_running,
                Err(e) => {
                    warn!("Checkpointing aborted for job {}: {:#}", descriptor.id, e);
                    return LoopOutcome::Aborted(format!("{e:#}"));
                }
            }
        }

        info!(
            "Environment for job {} stopped after {} checkpoint(s)",
            descriptor.id,
            sequence.value()
        );
        LoopOutcome::StoppedCleanly
    }

    /// One checkpoint generation: snapshot, stage out, upload, advance,
    /// re-probe.
    ///
    /// A recovering environment runs one interval before its first new
    /// checkpoint; a freshly started one is checkpointed immediately to
    /// capture a baseline and sleeps afterwards.
    async fn checkpoint_iteration(
        &self,
        descriptor: &JobDescriptor,
        env_id: &str,
        mode: LaunchMode,
        storage: &dyn RemoteStorage,
        sequence: &mut CheckpointSequence,
    ) -> Result<bool> {
        if mode == LaunchMode::Recover {
            time::sleep(self.config.checkpoint_interval).await;
        }

        let name = sequence.name(&self.config.checkpoint_base);
        self.runtime
            .checkpoint(&self.config.container_name, &name)
            .await
            .with_context(|| format!("Checkpoint {} failed", name))?;

        self.staging
            .move_checkpoint_out(&name, env_id)
            .await
            .with_context(|| format!("Failed to stage checkpoint {}", name))?;

        let local = self.config.staging_dir.join(&name);
        let remote = format!("{}{}", descriptor.backup.path, name);
        storage
            .upload_directory(&local, &remote)
            .await
            .with_context(|| format!("Failed to upload checkpoint {}", name))?;
        info!("Uploaded checkpoint {} for job {}", name, descriptor.id);

        sequence.advance();

        if mode == LaunchMode::Fresh {
            time::sleep(self.config.checkpoint_interval).await;
        }

        self.runtime.is_running(env_id).await
    }
}

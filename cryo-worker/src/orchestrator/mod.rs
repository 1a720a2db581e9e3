//! Job orchestrator
//!
//! The core of the worker: owns job identity and lifecycle state,
//! classifies incoming control messages, decides between a fresh start and
//! a checkpoint recovery, drives the checkpoint loop while a job runs, and
//! emits heartbeat reports on a fixed cadence.
//!
//! Collaborators (runtime engine, staging, remote storage, message channel)
//! are injected as trait objects so the orchestration logic is testable in
//! isolation.

mod sequence;
#[cfg(test)]
mod tests;

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, error, info, warn};

use cryo_core::domain::job::{JobDescriptor, JobId};
use cryo_core::domain::worker::WorkerIdentity;
use cryo_core::dto::job::JobStart;
use cryo_core::dto::worker::{RegisterResponse, WorkerReport};
use cryo_core::message::{Delivery, InboundType, OutboundType};

use crate::channel::MessageChannel;
use crate::config::Config;
use crate::runtime::RuntimeClient;
use crate::staging::StagingOperations;
use crate::state::WorkerState;
use crate::storage::{RemoteStorage, StorageConnector};

/// Recovery decision for one job execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    /// Start the environment fresh
    Fresh,
    /// Restore the environment from a downloaded checkpoint
    Recover,
}

/// The job-lifecycle orchestrator.
///
/// Cloning is cheap (shared state and trait objects); spawned job and
/// heartbeat tasks each hold their own clone.
#[derive(Clone)]
pub struct Orchestrator {
    config: Config,
    state: Arc<Mutex<WorkerState>>,
    runtime: Arc<dyn RuntimeClient>,
    staging: Arc<dyn StagingOperations>,
    connector: Arc<dyn StorageConnector>,
    channel: Arc<dyn MessageChannel>,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        runtime: Arc<dyn RuntimeClient>,
        staging: Arc<dyn StagingOperations>,
        connector: Arc<dyn StorageConnector>,
        channel: Arc<dyn MessageChannel>,
    ) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(WorkerState::new())),
            runtime,
            staging,
            connector,
            channel,
        }
    }

    /// Consumes deliveries until the inbound channel closes.
    ///
    /// A malformed registration response aborts startup; every other
    /// failure is logged and the dispatcher keeps consuming.
    pub async fn run(&self, mut inbound: mpsc::Receiver<Delivery>) -> Result<()> {
        while let Some(delivery) = inbound.recv().await {
            self.dispatch(delivery).await?;
        }

        info!("Inbound channel closed, dispatcher stopping");
        Ok(())
    }

    /// Classifies one delivery by its type header and routes it.
    /// Deliveries without a header are ignored.
    async fn dispatch(&self, delivery: Delivery) -> Result<()> {
        debug!("Received message: {}", delivery.body);

        let Some(header) = delivery.header.as_deref() else {
            return Ok(());
        };

        match InboundType::classify(header) {
            InboundType::StartJob => {
                if let Err(e) = self.accept_job(&delivery.body, false).await {
                    error!("Rejected startJob message: {:#}", e);
                    self.state.lock().unwrap().clear_job();
                }
            }
            InboundType::RecoverJob => {
                if let Err(e) = self.accept_job(&delivery.body, true).await {
                    error!("Rejected recoverJob message: {:#}", e);
                    self.state.lock().unwrap().clear_job();
                }
            }
            InboundType::StopJob => {
                if let Err(e) = self.handle_stop().await {
                    error!("Failed to handle stopJob: {:#}", e);
                }
            }
            InboundType::RegisterResponse => {
                self.handle_register_response(&delivery.body)
                    .await
                    .context("Failed to complete registration")?;
            }
            InboundType::Unknown => {
                debug!("Ignoring message with unknown type header {:?}", header);
            }
        }

        Ok(())
    }

    /// Accepts a start/recover control message: acknowledges it, stages the
    /// payload (and recovery checkpoint when one exists remotely), and
    /// launches the execution sequence on its own task.
    async fn accept_job(&self, body: &str, probe_recovery: bool) -> Result<()> {
        let message: JobStart = serde_json::from_str(body).context("Malformed job message")?;

        // Ack before any transfer so the controller knows the job was
        // accepted ahead of the download/run cycle.
        self.channel
            .publish(OutboundType::StartJobAck, message.id.to_string())
            .await?;
        self.state.lock().unwrap().job = JobId::new(message.id);

        let descriptor = JobDescriptor::parse(
            message.id,
            &message.source_path,
            &message.result_path,
            &message.backup_path,
        )
        .context("Malformed job paths")?;

        info!(
            "Accepted job {} with payload {}",
            descriptor.id, descriptor.payload_name
        );

        let storage = self
            .connector
            .connect(
                &descriptor.source.host,
                &descriptor.source.user,
                &descriptor.source.credential,
            )
            .await
            .context("Failed to connect to remote storage")?;

        let payload_local = self.config.staging_dir.join(&descriptor.payload_name);
        storage
            .download_file(&payload_local, &descriptor.source.path)
            .await
            .context("Failed to download payload")?;
        debug!("Downloaded payload {}", descriptor.payload_name);

        let mode = if probe_recovery {
            self.probe_recovery(&descriptor, storage.as_ref()).await?
        } else {
            LaunchMode::Fresh
        };

        self.spawn_job(descriptor, mode, storage);
        Ok(())
    }

    /// Decides between a fresh start and a checkpoint recovery by probing
    /// the remote backup path for a previously shipped checkpoint.
    async fn probe_recovery(
        &self,
        descriptor: &JobDescriptor,
        storage: &dyn RemoteStorage,
    ) -> Result<LaunchMode> {
        if !storage.file_exists(&descriptor.backup.path).await? {
            info!(
                "No recovery checkpoint for job {}, starting fresh",
                descriptor.id
            );
            return Ok(LaunchMode::Fresh);
        }

        let archive_local = self
            .config
            .staging_dir
            .join(format!("{}.tar.gz", self.config.checkpoint_base));
        storage
            .download_file(&archive_local, &descriptor.backup.path)
            .await
            .context("Failed to download recovery checkpoint")?;

        info!(
            "Recovery checkpoint found for job {}, resuming from backup",
            descriptor.id
        );
        Ok(LaunchMode::Recover)
    }

    /// Launches the execution sequence on its own task so the dispatcher
    /// stays free to accept further control traffic, a concurrent stopJob
    /// in particular.
    fn spawn_job(
        &self,
        descriptor: JobDescriptor,
        mode: LaunchMode,
        storage: Arc<dyn RemoteStorage>,
    ) {
        let orchestrator = self.clone();

        tokio::spawn(async move {
            let job_id = descriptor.id;
            if let Err(e) = orchestrator.execute_job(descriptor, mode, storage).await {
                error!("Job {} failed: {:#}", job_id, e);

                // The sequence aborted partway; return the worker to a
                // clean idle state rather than leaving identity and staged
                // files behind.
                orchestrator.state.lock().unwrap().clear_job();
                if let Err(e) = orchestrator.staging.purge_all().await {
                    warn!(
                        "Failed to purge staging storage after failed job {}: {:#}",
                        job_id, e
                    );
                }
            }
        });
    }

    /// Stops the execution environment for the current job.
    ///
    /// A missing environment is not an error; the acknowledgement is sent
    /// either way.
    async fn handle_stop(&self) -> Result<()> {
        match self.runtime.resolve_id(&self.config.container_name).await? {
            Some(id) => {
                self.runtime
                    .stop(&id)
                    .await
                    .context("Failed to stop environment")?;
                info!("Stopped environment {}", id);
            }
            None => {
                info!(
                    "stopJob received but no environment named {} exists",
                    self.config.container_name
                );
            }
        }

        let job_id = self.state.lock().unwrap().job;
        self.channel
            .publish(OutboundType::StopJobAck, job_id.to_string())
            .await?;
        self.state.lock().unwrap().clear_job();

        Ok(())
    }

    /// Completes the registration handshake: records the assigned
    /// identity, opens the worker's queue and starts the heartbeat task.
    async fn handle_register_response(&self, body: &str) -> Result<()> {
        let response: RegisterResponse =
            serde_json::from_str(body).context("Malformed registration response")?;

        info!(
            "Registered as worker {} on server {}",
            response.worker_id, response.server_name
        );

        self.state.lock().unwrap().identity = Some(WorkerIdentity {
            worker_id: response.worker_id.clone(),
            server_name: response.server_name,
        });

        self.channel
            .declare_worker_queue(&response.worker_id)
            .await
            .context("Failed to open worker queue")?;

        let _heartbeat_handle = self.start_heartbeat_loop();
        Ok(())
    }

    /// Starts the liveness report task.
    ///
    /// Runs for the life of the process regardless of job state; publish
    /// failures are logged and the cadence is kept.
    fn start_heartbeat_loop(&self) -> tokio::task::JoinHandle<()> {
        let orchestrator = self.clone();

        tokio::spawn(async move {
            let mut ticker = time::interval(orchestrator.config.report_interval);

            loop {
                ticker.tick().await;

                let report = {
                    let state = orchestrator.state.lock().unwrap();
                    let Some(identity) = state.identity.as_ref() else {
                        continue;
                    };
                    WorkerReport {
                        worker_id: identity.worker_id.clone(),
                        job_id: state.job,
                        sent_at: Utc::now(),
                    }
                };

                let body = match serde_json::to_string(&report) {
                    Ok(body) => body,
                    Err(e) => {
                        warn!("Failed to encode report: {}", e);
                        continue;
                    }
                };

                debug!("Publishing report for job {}", report.job_id);
                if let Err(e) = orchestrator
                    .channel
                    .publish(OutboundType::Report, body)
                    .await
                {
                    warn!("Failed to publish report: {:#}", e);
                }
            }
        })
    }
}

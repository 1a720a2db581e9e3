//! Cryo Worker
//!
//! A long-lived worker that executes one computational job at a time inside
//! an isolated, periodically checkpointed execution environment.
//!
//! Architecture:
//! - Configuration: Load settings from environment or defaults
//! - Collaborators: podman runtime engine, local staging, remote storage,
//!   controller-backed message channel
//! - Orchestrator: message dispatch, start/recover sequencing, the
//!   checkpoint loop and heartbeat reports
//!
//! The worker registers with the controller, consumes its dedicated control
//! queue, and ships checkpoint snapshots to remote backup storage while a
//! job runs so another worker can resume it after a failure.

mod channel;
mod config;
mod orchestrator;
mod runtime;
mod staging;
mod state;
mod storage;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::channel::ControllerChannel;
use crate::config::Config;
use crate::orchestrator::Orchestrator;
use crate::runtime::{PodmanRuntime, check_podman_available};
use crate::staging::LocalStaging;
use crate::storage::HttpStorageConnector;
use cryo_client::ControllerClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cryo_worker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Cryo Worker");

    // Load configuration
    let config = load_config()?;
    info!(
        "Loaded configuration: controller_url={}, container_name={}, staging_dir={}",
        config.controller_url,
        config.container_name,
        config.staging_dir.display()
    );

    // The runtime engine must be usable before any job can be accepted
    check_podman_available()?;

    // Wire collaborators
    let client = ControllerClient::new(config.controller_url.clone());
    let (inbound_tx, inbound_rx) = mpsc::channel(32);
    let channel = Arc::new(ControllerChannel::new(
        client,
        inbound_tx,
        config.queue_poll_interval,
    ));

    let runtime = Arc::new(PodmanRuntime::new(config.scratch_dir.clone()));
    let staging = Arc::new(LocalStaging::new(
        config.staging_dir.clone(),
        config.scratch_dir.clone(),
    ));
    let connector = Arc::new(HttpStorageConnector);

    let orchestrator = Orchestrator::new(config, runtime, staging, connector, channel.clone());

    info!("Collaborators initialized");

    // Register with controller (with retry logic)
    info!("Registering with controller");
    register_with_retry(&channel).await?;

    // Consume control messages until shutdown
    info!("Worker initialized, consuming control messages");
    if let Err(e) = orchestrator.run(inbound_rx).await {
        error!("Worker stopped: {:#}", e);
        return Err(e);
    }

    Ok(())
}

/// Loads configuration from environment variables with fallback to defaults
fn load_config() -> Result<Config> {
    match Config::from_env() {
        Ok(config) => {
            config.validate()?;
            Ok(config)
        }
        Err(_) => {
            info!("Failed to load config from environment, using defaults");
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }
}

/// Register with the controller with retry logic and exponential backoff
///
/// This handles the case where the controller may not be ready yet when
/// the worker starts (common in container environments).
async fn register_with_retry(channel: &ControllerChannel) -> Result<()> {
    const MAX_RETRIES: u32 = 10;
    const INITIAL_DELAY_MS: u64 = 500;
    const MAX_DELAY_MS: u64 = 30_000;

    let mut attempt = 0;
    let mut delay_ms = INITIAL_DELAY_MS;

    loop {
        attempt += 1;

        match channel.register().await {
            Ok(_) => {
                if attempt > 1 {
                    info!(
                        "Successfully registered with controller after {} attempt(s)",
                        attempt
                    );
                }
                return Ok(());
            }
            Err(e) => {
                if attempt >= MAX_RETRIES {
                    error!(
                        "Failed to register with controller after {} attempts",
                        MAX_RETRIES
                    );
                    return Err(anyhow::anyhow!(
                        "Failed to register with controller: {}",
                        e
                    ));
                }

                warn!(
                    "Failed to register with controller (attempt {}/{}): {}",
                    attempt, MAX_RETRIES, e
                );
                warn!("Retrying in {} ms...", delay_ms);

                tokio::time::sleep(Duration::from_millis(delay_ms)).await;

                // Exponential backoff with cap
                delay_ms = (delay_ms * 2).min(MAX_DELAY_MS);
            }
        }
    }
}

//! Worker configuration
//!
//! Defines all configurable parameters for the worker including the
//! checkpoint and report cadences, staging locations, and controller
//! connection settings.

use std::path::PathBuf;
use std::time::Duration;

/// Worker configuration
///
/// All timeouts and intervals are configurable to allow tuning for
/// different deployment scenarios (dev vs prod, fast vs slow networks).
#[derive(Debug, Clone)]
pub struct Config {
    /// Controller base URL (e.g., "http://localhost:8080")
    pub controller_url: String,

    /// Name of the single execution environment this worker manages
    pub container_name: String,

    /// Image every job environment is created from
    pub image: String,

    /// Local staging root for payloads, checkpoints and results
    pub staging_dir: PathBuf,

    /// Scratch directory where the runtime engine reads and writes
    /// checkpoint archives
    pub scratch_dir: PathBuf,

    /// File name a job writes its result under inside the environment
    pub result_name: String,

    /// Base name checkpoint generations are derived from
    pub checkpoint_base: String,

    /// Pause between checkpoint generations while a job runs
    pub checkpoint_interval: Duration,

    /// Heartbeat report period
    pub report_interval: Duration,

    /// How often the worker queue is polled for control messages
    pub queue_poll_interval: Duration,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(controller_url: String) -> Self {
        Self {
            controller_url,
            container_name: "worker".to_string(),
            image: "python:3.10-alpine".to_string(),
            staging_dir: PathBuf::from("/var/lib/cryo/staging"),
            scratch_dir: PathBuf::from("/var/lib/cryo/scratch"),
            result_name: "worker.result".to_string(),
            checkpoint_base: "checkpoint".to_string(),
            checkpoint_interval: Duration::from_secs(10),
            report_interval: Duration::from_secs(5),
            queue_poll_interval: Duration::from_secs(1),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - WORKER_CONTROLLER_URL (required)
    /// - WORKER_CONTAINER_NAME (optional, default: "worker")
    /// - WORKER_IMAGE (optional, default: "python:3.10-alpine")
    /// - WORKER_STAGING_DIR (optional, default: /var/lib/cryo/staging)
    /// - WORKER_SCRATCH_DIR (optional, default: /var/lib/cryo/scratch)
    /// - WORKER_RESULT_NAME (optional, default: "worker.result")
    /// - WORKER_CHECKPOINT_BASE (optional, default: "checkpoint")
    /// - WORKER_CHECKPOINT_INTERVAL (optional, seconds, default: 10)
    /// - WORKER_REPORT_INTERVAL (optional, seconds, default: 5)
    /// - WORKER_QUEUE_POLL_INTERVAL (optional, seconds, default: 1)
    pub fn from_env() -> anyhow::Result<Self> {
        let controller_url = std::env::var("WORKER_CONTROLLER_URL")
            .map_err(|_| anyhow::anyhow!("WORKER_CONTROLLER_URL environment variable not set"))?;

        let mut config = Self::new(controller_url);

        if let Ok(name) = std::env::var("WORKER_CONTAINER_NAME") {
            config.container_name = name;
        }
        if let Ok(image) = std::env::var("WORKER_IMAGE") {
            config.image = image;
        }
        if let Ok(dir) = std::env::var("WORKER_STAGING_DIR") {
            config.staging_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("WORKER_SCRATCH_DIR") {
            config.scratch_dir = PathBuf::from(dir);
        }
        if let Ok(name) = std::env::var("WORKER_RESULT_NAME") {
            config.result_name = name;
        }
        if let Ok(base) = std::env::var("WORKER_CHECKPOINT_BASE") {
            config.checkpoint_base = base;
        }

        config.checkpoint_interval = env_duration("WORKER_CHECKPOINT_INTERVAL")
            .unwrap_or(config.checkpoint_interval);
        config.report_interval =
            env_duration("WORKER_REPORT_INTERVAL").unwrap_or(config.report_interval);
        config.queue_poll_interval =
            env_duration("WORKER_QUEUE_POLL_INTERVAL").unwrap_or(config.queue_poll_interval);

        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.controller_url.is_empty() {
            anyhow::bail!("controller_url cannot be empty");
        }

        if !self.controller_url.starts_with("http://")
            && !self.controller_url.starts_with("https://")
        {
            anyhow::bail!("controller_url must start with http:// or https://");
        }

        if self.container_name.is_empty() {
            anyhow::bail!("container_name cannot be empty");
        }

        if self.checkpoint_base.is_empty() {
            anyhow::bail!("checkpoint_base cannot be empty");
        }

        if self.result_name.is_empty() {
            anyhow::bail!("result_name cannot be empty");
        }

        if self.checkpoint_interval.is_zero() {
            anyhow::bail!("checkpoint_interval must be greater than 0");
        }

        if self.report_interval.is_zero() {
            anyhow::bail!("report_interval must be greater than 0");
        }

        if self.queue_poll_interval.is_zero() {
            anyhow::bail!("queue_poll_interval must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new("http://localhost:8080".to_string())
    }
}

fn env_duration(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
}

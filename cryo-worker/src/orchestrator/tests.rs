//! Orchestrator behavior tests against recording mock collaborators.
//!
//! Every mock appends to one shared chronological event log so ordering
//! properties (ack-before-transfer, stage-before-restore) can be asserted
//! directly.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use cryo_core::domain::job::JobId;
use cryo_core::domain::worker::WorkerIdentity;
use cryo_core::dto::job::JobStart;
use cryo_core::dto::worker::WorkerReport;
use cryo_core::message::{Delivery, OutboundType};

use super::Orchestrator;
use crate::channel::MessageChannel;
use crate::config::Config;
use crate::runtime::RuntimeClient;
use crate::staging::StagingOperations;
use crate::storage::{RemoteStorage, StorageConnector};

/// Shared chronological record of collaborator calls.
type EventLog = Arc<Mutex<Vec<String>>>;

fn record(log: &EventLog, event: impl Into<String>) {
    log.lock().unwrap().push(event.into());
}

struct MockRuntime {
    log: EventLog,
    /// Whether `resolve_id` finds an environment
    env_exists: bool,
    /// How many running probes report true before the environment stops
    running_probes: Mutex<u32>,
    /// 1-based checkpoint call that fails, if any
    fail_checkpoint_at: Option<u32>,
    checkpoints_taken: Mutex<u32>,
}

#[async_trait]
impl RuntimeClient for MockRuntime {
    async fn create_environment(
        &self,
        name: &str,
        _image: &str,
        _payload_ref: &str,
    ) -> Result<String> {
        record(&self.log, format!("create:{name}"));
        Ok("env-1".to_string())
    }

    async fn resolve_id(&self, _name: &str) -> Result<Option<String>> {
        Ok(self.env_exists.then(|| "env-1".to_string()))
    }

    async fn start(&self, id: &str) -> Result<()> {
        record(&self.log, format!("start:{id}"));
        Ok(())
    }

    async fn stop(&self, id: &str) -> Result<()> {
        record(&self.log, format!("stop:{id}"));
        Ok(())
    }

    async fn checkpoint(&self, _name: &str, checkpoint_name: &str) -> Result<()> {
        let mut taken = self.checkpoints_taken.lock().unwrap();
        *taken += 1;
        if self.fail_checkpoint_at == Some(*taken) {
            anyhow::bail!("simulated checkpoint failure");
        }
        record(&self.log, format!("checkpoint:{checkpoint_name}"));
        Ok(())
    }

    async fn restore(&self, checkpoint_name: &str, _name: &str) -> Result<()> {
        record(&self.log, format!("restore:{checkpoint_name}"));
        Ok(())
    }

    async fn is_running(&self, _id: &str) -> Result<bool> {
        let mut probes = self.running_probes.lock().unwrap();
        if *probes > 0 {
            *probes -= 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn delete(&self, id: &str) -> Result<()> {
        record(&self.log, format!("delete:{id}"));
        Ok(())
    }
}

struct MockStaging {
    log: EventLog,
}

#[async_trait]
impl StagingOperations for MockStaging {
    async fn validate_presence(&self, _local: &Path) -> Result<()> {
        Ok(())
    }

    async fn move_payload_in(&self, payload_name: &str, _env_name: &str) -> Result<()> {
        record(&self.log, format!("payload_in:{payload_name}"));
        Ok(())
    }

    async fn move_checkpoint_in(&self, checkpoint_name: &str, _env_id: &str) -> Result<()> {
        record(&self.log, format!("checkpoint_in:{checkpoint_name}"));
        Ok(())
    }

    async fn move_checkpoint_out(&self, checkpoint_name: &str, _env_id: &str) -> Result<()> {
        record(&self.log, format!("checkpoint_out:{checkpoint_name}"));
        Ok(())
    }

    async fn extract_result(&self, result_name: &str, _env_id: &str) -> Result<()> {
        record(&self.log, format!("extract:{result_name}"));
        Ok(())
    }

    async fn purge_all(&self) -> Result<()> {
        record(&self.log, "purge");
        Ok(())
    }
}

struct MockStorage {
    log: EventLog,
    has_backup: bool,
}

#[async_trait]
impl RemoteStorage for MockStorage {
    async fn file_exists(&self, remote: &str) -> Result<bool> {
        record(&self.log, format!("probe:{remote}"));
        Ok(self.has_backup)
    }

    async fn download_file(&self, _local: &Path, remote: &str) -> Result<()> {
        record(&self.log, format!("download:{remote}"));
        Ok(())
    }

    async fn upload_file(&self, _local: &Path, remote: &str) -> Result<()> {
        record(&self.log, format!("upload_file:{remote}"));
        Ok(())
    }

    async fn upload_directory(&self, _local_dir: &Path, remote_dir: &str) -> Result<()> {
        record(&self.log, format!("upload_dir:{remote_dir}"));
        Ok(())
    }
}

struct MockConnector {
    log: EventLog,
    storage: Arc<MockStorage>,
}

#[async_trait]
impl StorageConnector for MockConnector {
    async fn connect(
        &self,
        host: &str,
        user: &str,
        _credential: &str,
    ) -> Result<Arc<dyn RemoteStorage>> {
        record(&self.log, format!("connect:{host}:{user}"));
        Ok(Arc::clone(&self.storage) as Arc<dyn RemoteStorage>)
    }
}

struct MockChannel {
    log: EventLog,
    published: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl MessageChannel for MockChannel {
    async fn publish(&self, kind: OutboundType, body: String) -> Result<()> {
        record(&self.log, format!("publish:{}", kind.header()));
        self.published
            .lock()
            .unwrap()
            .push((kind.header().to_string(), body));
        Ok(())
    }

    async fn declare_worker_queue(&self, worker_id: &str) -> Result<()> {
        record(&self.log, format!("declare:{worker_id}"));
        Ok(())
    }
}

struct Harness {
    log: EventLog,
    channel: Arc<MockChannel>,
    orchestrator: Orchestrator,
}

fn build(
    running_probes: u32,
    fail_checkpoint_at: Option<u32>,
    env_exists: bool,
    has_backup: bool,
) -> Harness {
    let log: EventLog = Arc::new(Mutex::new(Vec::new()));

    let runtime = Arc::new(MockRuntime {
        log: Arc::clone(&log),
        env_exists,
        running_probes: Mutex::new(running_probes),
        fail_checkpoint_at,
        checkpoints_taken: Mutex::new(0),
    });
    let staging = Arc::new(MockStaging {
        log: Arc::clone(&log),
    });
    let storage = Arc::new(MockStorage {
        log: Arc::clone(&log),
        has_backup,
    });
    let connector = Arc::new(MockConnector {
        log: Arc::clone(&log),
        storage,
    });
    let channel = Arc::new(MockChannel {
        log: Arc::clone(&log),
        published: Mutex::new(Vec::new()),
    });

    let mut config = Config::default();
    config.checkpoint_interval = Duration::from_millis(2);
    config.report_interval = Duration::from_millis(10);

    let orchestrator = Orchestrator::new(
        config,
        runtime,
        staging,
        connector,
        Arc::clone(&channel) as Arc<dyn MessageChannel>,
    );

    Harness {
        log,
        channel,
        orchestrator,
    }
}

fn job_message(header: &str) -> (Uuid, Delivery) {
    let id = Uuid::new_v4();
    let message = JobStart {
        id,
        source_path: "ftp.example.com:alice:secret:/jobs/42/payload.py".to_string(),
        result_path: "ftp.example.com:alice:secret:/results/".to_string(),
        backup_path: "ftp.example.com:alice:secret:/backups/".to_string(),
    };
    let delivery = Delivery {
        header: Some(header.to_string()),
        body: serde_json::to_string(&message).unwrap(),
    };
    (id, delivery)
}

fn events(log: &EventLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

fn position(events: &[String], needle: &str) -> usize {
    events
        .iter()
        .position(|e| e == needle)
        .unwrap_or_else(|| panic!("event {needle:?} not found in {events:?}"))
}

/// Waits until the spawned job sequence reaches its final staging purge.
async fn wait_for_purge(log: &EventLog) {
    for _ in 0..500 {
        if log.lock().unwrap().iter().any(|e| e == "purge") {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("timed out waiting for purge: {:?}", events(log));
}

#[tokio::test]
async fn test_start_job_acks_before_any_transfer() {
    let harness = build(0, None, true, false);
    let (id, delivery) = job_message("startJob");

    harness.orchestrator.dispatch(delivery).await.unwrap();

    let events = events(&harness.log);
    let ack = position(&events, "publish:startJob");
    let download = position(&events, "download:/jobs/42/payload.py");
    assert!(ack < download, "ack must precede transfers: {events:?}");

    let published = harness.channel.published.lock().unwrap();
    assert_eq!(published[0], ("startJob".to_string(), id.to_string()));
}

#[tokio::test]
async fn test_start_job_connects_with_source_credentials() {
    let harness = build(0, None, true, false);
    let (_, delivery) = job_message("startJob");

    harness.orchestrator.dispatch(delivery).await.unwrap();
    wait_for_purge(&harness.log).await;

    let events = events(&harness.log);
    assert!(events.contains(&"connect:ftp.example.com:alice".to_string()));
    assert!(events.contains(&"payload_in:payload.py".to_string()));
}

#[tokio::test]
async fn test_recover_without_backup_starts_fresh() {
    let harness = build(1, None, true, false);
    let (_, delivery) = job_message("recoverJob");

    harness.orchestrator.dispatch(delivery).await.unwrap();
    wait_for_purge(&harness.log).await;

    let events = events(&harness.log);
    assert!(events.contains(&"probe:/backups/".to_string()));
    assert!(events.contains(&"start:env-1".to_string()));
    assert!(
        !events.iter().any(|e| e.starts_with("restore:")),
        "no restore expected: {events:?}"
    );
    assert!(
        !events.iter().any(|e| e.starts_with("checkpoint_in:")),
        "no checkpoint staging expected: {events:?}"
    );
}

#[tokio::test]
async fn test_recover_with_backup_stages_checkpoint_before_restore() {
    let harness = build(1, None, true, true);
    let (_, delivery) = job_message("recoverJob");

    harness.orchestrator.dispatch(delivery).await.unwrap();
    wait_for_purge(&harness.log).await;

    let events = events(&harness.log);
    assert!(events.contains(&"download:/backups/".to_string()));

    let staged = position(&events, "checkpoint_in:checkpoint");
    let restored = position(&events, "restore:checkpoint");
    assert!(
        staged < restored,
        "checkpoint must be staged before restore: {events:?}"
    );
    assert!(
        !events.iter().any(|e| e.starts_with("start:")),
        "restore path must not start fresh: {events:?}"
    );
}

#[tokio::test]
async fn test_checkpoint_names_follow_sequence() {
    let harness = build(3, None, true, false);
    let (_, delivery) = job_message("startJob");

    harness.orchestrator.dispatch(delivery).await.unwrap();
    wait_for_purge(&harness.log).await;

    let events = events(&harness.log);
    let checkpoints: Vec<&String> = events
        .iter()
        .filter(|e| e.starts_with("checkpoint:"))
        .collect();
    assert_eq!(
        checkpoints,
        vec!["checkpoint:checkpoint0", "checkpoint:checkpoint1", "checkpoint:checkpoint2"]
    );

    assert!(events.contains(&"upload_dir:/backups/checkpoint0".to_string()));
    assert!(events.contains(&"upload_dir:/backups/checkpoint2".to_string()));
}

#[tokio::test]
async fn test_clean_completion_publishes_job_done() {
    let harness = build(1, None, true, false);
    let (id, delivery) = job_message("startJob");

    harness.orchestrator.dispatch(delivery).await.unwrap();
    wait_for_purge(&harness.log).await;

    let events = events(&harness.log);
    let extract = position(&events, "extract:worker.result");
    let delete = position(&events, "delete:env-1");
    let upload = position(&events, "upload_file:/results/worker.result");
    let done = position(&events, "publish:jobDone");
    assert!(extract < delete && delete < upload && upload < done);

    let published = harness.channel.published.lock().unwrap();
    assert!(
        published
            .iter()
            .any(|(header, body)| header == "jobDone" && body == &id.to_string())
    );

    assert!(harness.orchestrator.state.lock().unwrap().job.is_none());
}

#[tokio::test]
async fn test_checkpoint_abort_skips_job_done_but_still_uploads_result() {
    // Second checkpoint attempt fails; the environment would keep running.
    let harness = build(10, Some(2), true, false);
    let (_, delivery) = job_message("startJob");

    harness.orchestrator.dispatch(delivery).await.unwrap();
    wait_for_purge(&harness.log).await;

    let events = events(&harness.log);
    assert!(
        !events.contains(&"publish:jobDone".to_string()),
        "aborted loop must not ack completion: {events:?}"
    );
    assert!(
        events.contains(&"upload_file:/results/worker.result".to_string()),
        "result must still be salvaged: {events:?}"
    );
    assert!(events.contains(&"purge".to_string()));

    // Only the first generation was shipped.
    let shipped: Vec<&String> = events
        .iter()
        .filter(|e| e.starts_with("checkpoint_out:"))
        .collect();
    assert_eq!(shipped, vec!["checkpoint_out:checkpoint0"]);
}

#[tokio::test]
async fn test_stop_without_environment_still_acks() {
    let harness = build(0, None, false, false);
    let job_id = JobId::new(Uuid::new_v4());
    harness.orchestrator.state.lock().unwrap().job = job_id;

    let delivery = Delivery {
        header: Some("stopJob".to_string()),
        body: String::new(),
    };
    harness.orchestrator.dispatch(delivery).await.unwrap();

    let events = events(&harness.log);
    assert!(
        !events.iter().any(|e| e.starts_with("stop:")),
        "nothing to stop: {events:?}"
    );

    let published = harness.channel.published.lock().unwrap();
    assert!(
        published
            .iter()
            .any(|(header, body)| header == "stopJob" && body == &job_id.to_string())
    );
    assert!(harness.orchestrator.state.lock().unwrap().job.is_none());
}

#[tokio::test]
async fn test_stop_with_environment_stops_it_first() {
    let harness = build(0, None, true, false);

    let delivery = Delivery {
        header: Some("stopJob".to_string()),
        body: String::new(),
    };
    harness.orchestrator.dispatch(delivery).await.unwrap();

    let events = events(&harness.log);
    let stopped = position(&events, "stop:env-1");
    let acked = position(&events, "publish:stopJob");
    assert!(stopped < acked);
}

#[tokio::test]
async fn test_register_response_opens_queue_and_sets_identity() {
    let harness = build(0, None, true, false);

    let delivery = Delivery {
        header: Some("registerResponse".to_string()),
        body: r#"{"worker_id":"w-1","server_name":"srv-a"}"#.to_string(),
    };
    harness.orchestrator.dispatch(delivery).await.unwrap();

    let events = events(&harness.log);
    assert!(events.contains(&"declare:w-1".to_string()));

    let state = harness.orchestrator.state.lock().unwrap();
    assert_eq!(
        state.identity,
        Some(WorkerIdentity {
            worker_id: "w-1".to_string(),
            server_name: "srv-a".to_string(),
        })
    );
}

#[tokio::test]
async fn test_malformed_register_response_is_fatal() {
    let harness = build(0, None, true, false);

    let delivery = Delivery {
        header: Some("registerResponse".to_string()),
        body: "not json".to_string(),
    };
    assert!(harness.orchestrator.dispatch(delivery).await.is_err());
}

#[tokio::test]
async fn test_delivery_without_header_is_ignored() {
    let harness = build(0, None, true, false);

    let delivery = Delivery {
        header: None,
        body: "anything".to_string(),
    };
    harness.orchestrator.dispatch(delivery).await.unwrap();

    assert!(events(&harness.log).is_empty());
}

#[tokio::test]
async fn test_unknown_header_is_ignored() {
    let harness = build(0, None, true, false);

    let delivery = Delivery {
        header: Some("mystery".to_string()),
        body: "{}".to_string(),
    };
    harness.orchestrator.dispatch(delivery).await.unwrap();

    assert!(events(&harness.log).is_empty());
}

#[tokio::test]
async fn test_malformed_job_paths_rejected_after_ack() {
    let harness = build(0, None, true, false);
    let message = JobStart {
        id: Uuid::new_v4(),
        source_path: "not-a-remote-path".to_string(),
        result_path: "host:user:cred:/results/".to_string(),
        backup_path: "host:user:cred:/backups/".to_string(),
    };
    let delivery = Delivery {
        header: Some("startJob".to_string()),
        body: serde_json::to_string(&message).unwrap(),
    };

    // The rejection is logged, not surfaced to the dispatcher loop.
    harness.orchestrator.dispatch(delivery).await.unwrap();

    let events = events(&harness.log);
    assert!(events.contains(&"publish:startJob".to_string()));
    assert!(
        !events.iter().any(|e| e.starts_with("download:")),
        "no transfer for a rejected job: {events:?}"
    );
    assert!(harness.orchestrator.state.lock().unwrap().job.is_none());
}

#[tokio::test]
async fn test_heartbeat_reports_idle_sentinel() {
    let harness = build(0, None, true, false);
    harness.orchestrator.state.lock().unwrap().identity = Some(WorkerIdentity {
        worker_id: "w-1".to_string(),
        server_name: "srv-a".to_string(),
    });

    let handle = harness.orchestrator.start_heartbeat_loop();
    tokio::time::sleep(Duration::from_millis(55)).await;
    handle.abort();

    let published = harness.channel.published.lock().unwrap();
    let reports: Vec<&(String, String)> = published
        .iter()
        .filter(|(header, _)| header == "report")
        .collect();
    assert!(
        reports.len() >= 2,
        "expected periodic reports, got {}",
        reports.len()
    );

    let report: WorkerReport = serde_json::from_str(&reports[0].1).unwrap();
    assert_eq!(report.worker_id, "w-1");
    assert!(report.job_id.is_none());
}

#[tokio::test]
async fn test_heartbeat_reports_active_job() {
    let harness = build(0, None, true, false);
    let job_id = JobId::new(Uuid::new_v4());
    {
        let mut state = harness.orchestrator.state.lock().unwrap();
        state.identity = Some(WorkerIdentity {
            worker_id: "w-1".to_string(),
            server_name: "srv-a".to_string(),
        });
        state.job = job_id;
    }

    let handle = harness.orchestrator.start_heartbeat_loop();
    tokio::time::sleep(Duration::from_millis(30)).await;
    handle.abort();

    let published = harness.channel.published.lock().unwrap();
    let (_, body) = published
        .iter()
        .find(|(header, _)| header == "report")
        .expect("at least one report");
    let report: WorkerReport = serde_json::from_str(body).unwrap();
    assert_eq!(report.job_id, job_id);
}

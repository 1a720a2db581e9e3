//! Controller messaging endpoints

use crate::ControllerClient;
use crate::error::Result;
use cryo_core::message::Delivery;

impl ControllerClient {
    // =============================================================================
    // Registration
    // =============================================================================

    /// Announce this worker to the controller.
    ///
    /// The registration response assigns the worker its identity. The raw
    /// body is returned so the worker can parse exactly the fields it
    /// reads.
    pub async fn register(&self) -> Result<String> {
        let url = format!("{}/api/workers/register", self.base_url);
        let response = self.client.post(&url).send().await?;

        self.handle_text_response(response).await
    }

    // =============================================================================
    // Worker Queue
    // =============================================================================

    /// Declare the dedicated inbound queue for a worker.
    ///
    /// Control messages addressed to the worker accumulate here until
    /// consumed.
    pub async fn declare_worker_queue(&self, worker_id: &str) -> Result<()> {
        let url = format!("{}/api/workers/{}/queue", self.base_url, worker_id);
        let response = self.client.put(&url).send().await?;

        self.handle_empty_response(response).await
    }

    /// Drain pending deliveries from the worker's queue.
    ///
    /// Returns an empty list when nothing is queued; callers poll this on
    /// an interval.
    pub async fn fetch_deliveries(&self, worker_id: &str) -> Result<Vec<Delivery>> {
        let url = format!("{}/api/workers/{}/messages", self.base_url, worker_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    // =============================================================================
    // Publishing
    // =============================================================================

    /// Publish a message tagged with a type header.
    ///
    /// # Arguments
    /// * `header` - Message-type header (e.g., "report", "jobDone")
    /// * `body` - JSON-encoded message body
    pub async fn publish(&self, header: &str, body: String) -> Result<()> {
        let url = format!("{}/api/messages", self.base_url);
        let delivery = Delivery {
            header: Some(header.to_string()),
            body,
        };
        let response = self.client.post(&url).json(&delivery).send().await?;

        self.handle_empty_response(response).await
    }
}

//! Message channel
//!
//! Inbound control messages arrive with a typed header and are fed to the
//! dispatcher through one mpsc stream; outbound messages are published
//! tagged with a type header. The production channel is backed by the
//! controller API and polls the worker's dedicated queue.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time;
use tracing::warn;

use cryo_client::ControllerClient;
use cryo_core::message::{Delivery, OutboundType};

/// Outbound publishing and worker-queue consumption.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Publishes a message tagged with the given type header.
    async fn publish(&self, kind: OutboundType, body: String) -> Result<()>;

    /// Declares the worker's dedicated inbound queue and attaches the
    /// consumer feeding the dispatcher.
    async fn declare_worker_queue(&self, worker_id: &str) -> Result<()>;
}

/// Controller-backed channel.
///
/// Registration and queue consumption both feed the same inbound stream so
/// every message is classified in one place, by the dispatcher.
pub struct ControllerChannel {
    client: ControllerClient,
    inbound: mpsc::Sender<Delivery>,
    poll_interval: Duration,
}

impl ControllerChannel {
    pub fn new(
        client: ControllerClient,
        inbound: mpsc::Sender<Delivery>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            client,
            inbound,
            poll_interval,
        }
    }

    /// Sends the registration request and injects the response into the
    /// inbound stream as a `registerResponse` delivery.
    pub async fn register(&self) -> Result<()> {
        let body = self
            .client
            .register()
            .await
            .context("Registration request failed")?;

        self.inbound
            .send(Delivery {
                header: Some("registerResponse".to_string()),
                body,
            })
            .await
            .map_err(|_| anyhow::anyhow!("Dispatcher inbound channel closed"))?;

        Ok(())
    }
}

#[async_trait]
impl MessageChannel for ControllerChannel {
    async fn publish(&self, kind: OutboundType, body: String) -> Result<()> {
        self.client.publish(kind.header(), body).await?;
        Ok(())
    }

    async fn declare_worker_queue(&self, worker_id: &str) -> Result<()> {
        self.client.declare_worker_queue(worker_id).await?;

        let client = self.client.clone();
        let inbound = self.inbound.clone();
        let worker_id = worker_id.to_string();
        let poll_interval = self.poll_interval;

        tokio::spawn(async move {
            let mut ticker = time::interval(poll_interval);

            loop {
                ticker.tick().await;

                match client.fetch_deliveries(&worker_id).await {
                    Ok(deliveries) => {
                        for delivery in deliveries {
                            if inbound.send(delivery).await.is_err() {
                                warn!("Dispatcher gone, stopping queue consumer");
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        warn!("Failed to poll worker queue: {:#}", e);
                    }
                }
            }
        });

        Ok(())
    }
}

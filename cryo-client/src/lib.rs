//! Cryo HTTP Clients
//!
//! Type-safe HTTP clients for the two remote parties a worker talks to:
//!
//! - [`ControllerClient`]: registration, worker-queue consumption and
//!   message publishing against the controller API
//! - [`StorageClient`]: per-job file transfer against the remote store a
//!   job's paths point at
//!
//! # Example
//!
//! ```no_run
//! use cryo_client::ControllerClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), cryo_client::ClientError> {
//!     let client = ControllerClient::new("http://localhost:8080");
//!
//!     let response = client.register().await?;
//!     println!("Registered: {}", response);
//!     Ok(())
//! }
//! ```

pub mod error;
mod messages;
mod storage;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use storage::StorageClient;

use reqwest::Client;
use serde::de::DeserializeOwned;

/// HTTP client for the Cryo controller API
///
/// This client provides methods for the worker-facing controller endpoints:
/// - Worker registration
/// - Worker-queue declaration and consumption
/// - Publishing messages tagged with a type header
#[derive(Debug, Clone)]
pub struct ControllerClient {
    /// Base URL of the controller (e.g., "http://localhost:8080")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl ControllerClient {
    /// Create a new controller client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the controller API (e.g., "http://localhost:8080")
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    /// Create a new controller client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the controller
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Handle an API response and deserialize JSON
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Handle an API response whose raw body the caller parses itself
    async fn handle_text_response(&self, response: reqwest::Response) -> Result<String> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        response
            .text()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to read response body: {}", e)))
    }

    /// Handle an API response that returns no content
    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        Ok(())
    }
}

//! Remote storage seam
//!
//! The orchestrator connects to a different remote store per job, using the
//! host and credentials embedded in the job's source path. The traits here
//! keep the orchestration logic independent of the transfer protocol; the
//! production connector hands out HTTP-backed [`StorageClient`]s.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use cryo_client::StorageClient;

/// File transfer against one connected remote store.
#[async_trait]
pub trait RemoteStorage: Send + Sync {
    async fn file_exists(&self, remote: &str) -> Result<bool>;

    async fn download_file(&self, local: &Path, remote: &str) -> Result<()>;

    async fn upload_file(&self, local: &Path, remote: &str) -> Result<()>;

    async fn upload_directory(&self, local_dir: &Path, remote_dir: &str) -> Result<()>;
}

/// Connects to the remote store a job's paths point at.
#[async_trait]
pub trait StorageConnector: Send + Sync {
    async fn connect(
        &self,
        host: &str,
        user: &str,
        credential: &str,
    ) -> Result<Arc<dyn RemoteStorage>>;
}

#[async_trait]
impl RemoteStorage for StorageClient {
    async fn file_exists(&self, remote: &str) -> Result<bool> {
        Ok(StorageClient::file_exists(self, remote).await?)
    }

    async fn download_file(&self, local: &Path, remote: &str) -> Result<()> {
        Ok(StorageClient::download_file(self, local, remote).await?)
    }

    async fn upload_file(&self, local: &Path, remote: &str) -> Result<()> {
        Ok(StorageClient::upload_file(self, local, remote).await?)
    }

    async fn upload_directory(&self, local_dir: &Path, remote_dir: &str) -> Result<()> {
        Ok(StorageClient::upload_directory(self, local_dir, remote_dir).await?)
    }
}

/// Production connector producing HTTP-backed storage clients
pub struct HttpStorageConnector;

#[async_trait]
impl StorageConnector for HttpStorageConnector {
    async fn connect(
        &self,
        host: &str,
        user: &str,
        credential: &str,
    ) -> Result<Arc<dyn RemoteStorage>> {
        let client = StorageClient::connect(host, user, credential).await?;
        Ok(Arc::new(client))
    }
}

//! Remote file-store client
//!
//! One `StorageClient` is connected per job from the host and credentials
//! embedded in the job's source path. Files are addressed by the path
//! component of a `host:user:credential:path` string.

use std::path::Path;

use tracing::debug;
use walkdir::WalkDir;

use crate::error::{ClientError, Result};

/// HTTP client for a per-job remote file store
#[derive(Debug, Clone)]
pub struct StorageClient {
    base_url: String,
    user: String,
    credential: String,
    client: reqwest::Client,
}

impl StorageClient {
    /// Connects to a remote store and verifies the host is reachable.
    ///
    /// # Arguments
    /// * `host` - Store host, with or without an http(s) scheme
    /// * `user` - Account name from the job's path string
    /// * `credential` - Account credential from the job's path string
    pub async fn connect(host: &str, user: &str, credential: &str) -> Result<Self> {
        let base_url = if host.starts_with("http://") || host.starts_with("https://") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", host)
        };

        let store = Self {
            base_url,
            user: user.to_string(),
            credential: credential.to_string(),
            client: reqwest::Client::new(),
        };

        // Reachability probe; a 404 on the root is still a live server.
        let response = store.request(reqwest::Method::HEAD, "/").send().await?;
        let status = response.status();
        if status.is_server_error() {
            return Err(ClientError::api_error(status.as_u16(), "store unavailable"));
        }

        debug!("Connected to remote store {} as {}", store.base_url, store.user);
        Ok(store)
    }

    fn request(&self, method: reqwest::Method, remote: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.base_url, remote.trim_start_matches('/'));
        self.client
            .request(method, url)
            .basic_auth(&self.user, Some(&self.credential))
    }

    /// Checks whether a file exists on the remote store.
    pub async fn file_exists(&self, remote: &str) -> Result<bool> {
        let response = self.request(reqwest::Method::HEAD, remote).send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !status.is_success() {
            return Err(ClientError::api_error(status.as_u16(), remote.to_string()));
        }

        Ok(true)
    }

    /// Downloads a remote file to a local path, creating parent directories
    /// as needed.
    pub async fn download_file(&self, local: &Path, remote: &str) -> Result<()> {
        let response = self.request(reqwest::Method::GET, remote).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::api_error(status.as_u16(), remote.to_string()));
        }

        let bytes = response.bytes().await?;
        if let Some(parent) = local.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(local, &bytes).await?;

        debug!("Downloaded {} -> {}", remote, local.display());
        Ok(())
    }

    /// Uploads a local file to a remote path.
    pub async fn upload_file(&self, local: &Path, remote: &str) -> Result<()> {
        let bytes = tokio::fs::read(local).await?;
        let response = self
            .request(reqwest::Method::PUT, remote)
            .body(bytes)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::api_error(status.as_u16(), remote.to_string()));
        }

        debug!("Uploaded {} -> {}", local.display(), remote);
        Ok(())
    }

    /// Uploads every file under a local directory to the remote prefix,
    /// preserving relative paths.
    pub async fn upload_directory(&self, local_dir: &Path, remote_dir: &str) -> Result<()> {
        for entry in WalkDir::new(local_dir) {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry.path().strip_prefix(local_dir).unwrap_or(entry.path());
            let remote = format!(
                "{}/{}",
                remote_dir.trim_end_matches('/'),
                relative.to_string_lossy()
            );
            self.upload_file(entry.path(), &remote).await?;
        }

        debug!("Uploaded directory {} -> {}", local_dir.display(), remote_dir);
        Ok(())
    }
}

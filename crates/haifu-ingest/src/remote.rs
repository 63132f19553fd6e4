//! HTTP access to the remote site
//!
//! Every download is streamed into a `*.part` sibling and renamed over the
//! target once the body is complete, so an interrupted transfer never leaves
//! a target behind.

use crate::config::{RemoteConfig, ID_PLACEHOLDER};
use crate::error::{IngestError, Result};
use crate::layout::part_path;
use futures::StreamExt;
use haifu_common::types::Identifier;
use reqwest::{Client, StatusCode};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// What to do with a response whose status is not 2xx
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusPolicy {
    /// Reject the response and write nothing
    RequireSuccess,
    /// Persist the body whatever the status
    KeepBody,
}

/// Result of a completed download
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Download {
    pub status: StatusCode,
    pub bytes: u64,
}

/// Client for the listing, archive, record and conversion endpoints
#[derive(Debug, Clone)]
pub struct RemoteSite {
    client: Client,
    config: RemoteConfig,
}

impl RemoteSite {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| IngestError::fatal(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    pub fn archive_url(&self, name: &str) -> String {
        format!(
            "{}/{}",
            self.config.archive_base_url.trim_end_matches('/'),
            name.trim_start_matches('/')
        )
    }

    pub fn record_url(&self, id: &Identifier) -> String {
        self.config.record_url_template.replace(ID_PLACEHOLDER, id.as_str())
    }

    pub fn convert_url(&self, id: &Identifier) -> String {
        self.config.convert_url_template.replace(ID_PLACEHOLDER, id.as_str())
    }

    /// Fetch the listing body, retrying with exponential backoff.
    ///
    /// Running out of attempts is fatal: without a listing there is nothing
    /// to synchronize against.
    pub async fn fetch_listing(&self) -> Result<String> {
        let url = &self.config.listing_url;
        let max_retries = self.config.listing_max_retries.max(1);
        let mut last_error = None;

        for attempt in 1..=max_retries {
            match self.get_text(url).await {
                Ok(body) => {
                    debug!(url = %url, bytes = body.len(), "Fetched listing");
                    return Ok(body);
                },
                Err(e) => {
                    warn!("Listing attempt {}/{} failed: {}", attempt, max_retries, e);
                    last_error = Some(e);

                    if attempt < max_retries {
                        // Exponential backoff: 2^attempt seconds
                        let backoff_secs = 2u64.pow(attempt);
                        info!("Retrying in {} seconds...", backoff_secs);
                        tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                    }
                },
            }
        }

        let reason = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempt made".to_string());
        Err(IngestError::fatal(format!(
            "listing {} unreachable after {} attempts: {}",
            url, max_retries, reason
        )))
    }

    /// Fetch a whole body into memory; anything but 2xx is a transport error
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::transport(url, format!("HTTP {}", status)));
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        let body = self.fetch_bytes(url).await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    /// Stream `url` into `dest`, creating parent directories as needed.
    ///
    /// `dest` is only replaced after the whole body arrived. On any error
    /// the partial file is removed and `dest` is left as it was.
    pub async fn download(&self, url: &str, dest: &Path, policy: StatusPolicy) -> Result<Download> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if policy == StatusPolicy::RequireSuccess && !status.is_success() {
            return Err(IngestError::transport(url, format!("HTTP {}", status)));
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let part = part_path(dest);
        match stream_to_file(response, &part).await {
            Ok(bytes) => {
                tokio::fs::rename(&part, dest).await?;
                Ok(Download { status, bytes })
            },
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_file(&part).await {
                    debug!(
                        path = %part.display(),
                        error = %cleanup,
                        "Could not remove partial file"
                    );
                }
                Err(e)
            },
        }
    }

    /// Write bytes already in memory to `dest` through a partial file
    pub async fn persist(bytes: &[u8], dest: &Path) -> Result<()> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let part = part_path(dest);
        tokio::fs::write(&part, bytes).await?;
        tokio::fs::rename(&part, dest).await?;
        Ok(())
    }
}

async fn stream_to_file(response: reqwest::Response, path: &Path) -> Result<u64> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    file.flush().await?;
    Ok(written)
}

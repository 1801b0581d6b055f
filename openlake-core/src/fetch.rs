//! HTTP downloads into the staging directory.

use crate::config::HttpConfig;
use crate::error::{LakeError, Result};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use url::Url;

/// Downloads remote files to local staging paths.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    staging_dir: PathBuf,
}

impl Fetcher {
    pub fn new(staging_dir: impl Into<PathBuf>, config: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            staging_dir: staging_dir.into(),
        })
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Local path a URL is staged at: the last path segment of the URL.
    pub fn staging_path(&self, url: &str) -> Result<PathBuf> {
        let parsed =
            Url::parse(url).map_err(|e| LakeError::invalid_input(format!("{url}: {e}")))?;
        let name = parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| LakeError::invalid_input(format!("{url}: no file name in path")))?;
        Ok(self.staging_dir.join(name))
    }

    /// Download `url` into the staging directory and return the local path.
    ///
    /// The body is streamed to a temporary file and renamed once complete, so
    /// an interrupted download never leaves a truncated file behind.
    pub async fn download(&self, url: &str) -> Result<PathBuf> {
        let path = self.staging_path(url)?;
        tokio::fs::create_dir_all(&self.staging_dir).await?;

        debug!(url, "Requesting");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LakeError::fetch(format!("GET {url} returned {status}")));
        }

        let tmp = path.with_extension("download");
        let bytes = match write_body(response, &tmp).await {
            Ok(bytes) => bytes,
            Err(err) => {
                let _ = tokio::fs::remove_file(&tmp).await;
                return Err(err);
            }
        };
        tokio::fs::rename(&tmp, &path).await?;

        info!(url, bytes, "Downloaded {} → {}", url, path.display());
        Ok(path)
    }
}

/// Stream a response body into `tmp`, returning the byte count.
async fn write_body(response: reqwest::Response, tmp: &Path) -> Result<u64> {
    let mut file = tokio::fs::File::create(tmp).await?;
    let mut stream = response.bytes_stream();
    let mut bytes: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        bytes += chunk.len() as u64;
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    Ok(bytes)
}

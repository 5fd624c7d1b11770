use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio_retry::RetryIf;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::{debug, info, warn};

const MAX_RETRIES: usize = 5;
const MAX_DELAY: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum DownloadError {
  #[error("File at {0} does not exist")]
  NotFound(String),

  #[error("Download of {url} failed with status {status}")]
  Status { url: String, status: u16 },

  #[error("Download of {url} ended after {received} of {expected} bytes")]
  Incomplete { url: String, expected: u64, received: u64 },

  #[error("Transport error: {0}")]
  Transport(#[from] reqwest::Error),

  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
}

impl DownloadError {
  fn is_transient(&self) -> bool {
    match self {
      DownloadError::Transport(_) | DownloadError::Incomplete { .. } => true,
      DownloadError::Status { status, .. } => *status >= 500,
      DownloadError::NotFound(_) | DownloadError::Io(_) => false,
    }
  }
}

#[async_trait]
pub trait Downloader: Send + Sync {
  async fn download(&self, url: &str, file: &Path) -> Result<(), DownloadError>;
}

/// Backoff of 100ms, 200ms, 400ms and so on, capped at `MAX_DELAY`.
fn retry_delays(retries: usize) -> impl Iterator<Item = Duration> {
  ExponentialBackoff::from_millis(2)
    .factor(50)
    .max_delay(MAX_DELAY)
    .take(retries)
}

/// `chef_18.2.7.deb` is written as `chef_18.2.7.deb.part` until complete.
fn partial_path(file: &Path) -> PathBuf {
  let mut name = file.file_name().map(|name| name.to_os_string()).unwrap_or_default();
  name.push(".part");
  file.with_file_name(name)
}

/// Fetches files over HTTP, retrying transport failures with bounded
/// exponential backoff. A missing remote file is reported as `NotFound` and
/// never retried. The target path only ever holds a complete download.
#[derive(Debug, Clone)]
pub struct FileDownloader {
  client: reqwest::Client,
  max_retries: usize,
}

impl Default for FileDownloader {
  fn default() -> Self {
    Self {
      client: reqwest::Client::new(),
      max_retries: MAX_RETRIES,
    }
  }
}

impl FileDownloader {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_max_retries(mut self, max_retries: usize) -> Self {
    self.max_retries = max_retries;
    self
  }

  async fn try_download(&self, url: &str, file: &Path) -> Result<(), DownloadError> {
    let response = self.client.get(url).send().await?;
    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND {
      info!("File at {} does not exist", url);
      return Err(DownloadError::NotFound(url.to_string()));
    }
    if !status.is_success() {
      return Err(DownloadError::Status { url: url.to_string(), status: status.as_u16() });
    }

    if let Some(parent) = file.parent() {
      fs::create_dir_all(parent).await?;
    }
    let partial = partial_path(file);
    debug!("Downloading {} to {}", url, partial.display());
    match write_body(response, url, &partial).await {
      Ok(()) => {
        fs::rename(&partial, file).await?;
        debug!("Finished downloading {} to {}", url, file.display());
        Ok(())
      }
      Err(e) => {
        if let Err(remove) = fs::remove_file(&partial).await {
          warn!("Could not remove partial download {}: {}", partial.display(), remove);
        }
        Err(e)
      }
    }
  }
}

async fn write_body(mut response: reqwest::Response, url: &str, partial: &Path) -> Result<(), DownloadError> {
  let expected = response.content_length();
  let mut out = File::create(partial).await?;
  let mut received = 0u64;
  while let Some(chunk) = response.chunk().await? {
    out.write_all(&chunk).await?;
    received += chunk.len() as u64;
  }
  out.flush().await?;
  match expected {
    Some(expected) if expected != received => Err(DownloadError::Incomplete {
      url: url.to_string(),
      expected,
      received,
    }),
    _ => Ok(()),
  }
}

#[async_trait]
impl Downloader for FileDownloader {
  async fn download(&self, url: &str, file: &Path) -> Result<(), DownloadError> {
    RetryIf::start(
      retry_delays(self.max_retries),
      || self.try_download(url, file),
      |e: &DownloadError| e.is_transient(),
    )
    .await
  }
}

/// Where installers for a given chef version come from and where they are
/// staged locally.
#[derive(Debug, Clone)]
pub struct InstallerSource {
  url_template: String,
  staging_dir: PathBuf,
}

impl InstallerSource {
  pub fn new(url_template: impl Into<String>, staging_dir: impl Into<PathBuf>) -> Self {
    Self {
      url_template: url_template.into(),
      staging_dir: staging_dir.into(),
    }
  }

  pub fn url_for(&self, version: &str) -> String {
    self.url_template.replace("{version}", version)
  }

  pub fn staged_path(&self, version: &str) -> PathBuf {
    let url = self.url_for(version);
    let file_name = url
      .rsplit('/')
      .next()
      .filter(|name| !name.is_empty())
      .map(str::to_string)
      .unwrap_or_else(|| format!("chef-{}", version));
    self.staging_dir.join(file_name)
  }
}

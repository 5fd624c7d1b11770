#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cafe::chef::ChefAgent;
use cafe::config::ServerConfig;
use cafe::downloader::{DownloadError, Downloader};
use cafe::jobs::{ChefJobRunner, JobRunner, ProgressReporter};
use cafe::server::CafeServer;
use cafe::status::ScheduledTaskStatus;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Stands in for chef-client: records calls and never touches the system.
#[derive(Default)]
pub struct FakeAgent {
  pub runs: Mutex<Vec<Vec<String>>>,
  pub installs: Mutex<Vec<PathBuf>>,
  pub run_delay: Duration,
  pub fail_runs: AtomicBool,
  pub version: Mutex<Option<String>>,
  pub version_after_install: Option<String>,
  pub concurrent: AtomicUsize,
  pub max_concurrent: AtomicUsize,
}

impl FakeAgent {
  pub fn with_delay(run_delay: Duration) -> Self {
    Self { run_delay, ..Default::default() }
  }

  pub fn run_count(&self) -> usize {
    self.runs.lock().unwrap().len()
  }
}

#[async_trait]
impl ChefAgent for FakeAgent {
  async fn run(&self, args: &[String], progress: &ProgressReporter) -> anyhow::Result<()> {
    let now = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
    self.max_concurrent.fetch_max(now, Ordering::SeqCst);
    self.runs.lock().unwrap().push(args.to_vec());
    progress.report("Converging 3 resources");
    tokio::time::sleep(self.run_delay).await;
    self.concurrent.fetch_sub(1, Ordering::SeqCst);
    if self.fail_runs.load(Ordering::SeqCst) {
      anyhow::bail!("chef-client exited with code 1");
    }
    Ok(())
  }

  async fn install(&self, installer: &Path, progress: &ProgressReporter) -> anyhow::Result<()> {
    progress.report("Installing");
    self.installs.lock().unwrap().push(installer.to_path_buf());
    *self.version.lock().unwrap() = self.version_after_install.clone();
    Ok(())
  }

  async fn installed_version(&self) -> anyhow::Result<Option<String>> {
    Ok(self.version.lock().unwrap().clone())
  }
}

#[derive(Default)]
pub struct FakeDownloader {
  pub missing: bool,
  pub downloads: Mutex<Vec<(String, PathBuf)>>,
}

impl FakeDownloader {
  pub fn missing() -> Self {
    Self { missing: true, ..Default::default() }
  }
}

#[async_trait]
impl Downloader for FakeDownloader {
  async fn download(&self, url: &str, file: &Path) -> Result<(), DownloadError> {
    if self.missing {
      return Err(DownloadError::NotFound(url.to_string()));
    }
    self.downloads.lock().unwrap().push((url.to_string(), file.to_path_buf()));
    Ok(())
  }
}

pub struct TestServer {
  pub chef: Arc<ChefJobRunner>,
  pub agent: Arc<FakeAgent>,
  pub downloader: Arc<FakeDownloader>,
  pub shutdown: CancellationToken,
  pub dir: TempDir,
}

impl Drop for TestServer {
  fn drop(&mut self) {
    self.shutdown.cancel();
  }
}

pub fn test_config(dir: &TempDir) -> ServerConfig {
  ServerConfig {
    chef_config_dir: dir.path().join("chef"),
    staging_dir: dir.path().join("staging"),
    installer_url: "https://packages.example.com/chef/{version}/chef_{version}.deb".into(),
    policy_tick: Duration::from_secs(3600),
    ..ServerConfig::default()
  }
}

pub fn start_server(agent: FakeAgent, downloader: FakeDownloader) -> TestServer {
  start_server_with(agent, downloader, |_| {})
}

pub fn start_server_with(
  agent: FakeAgent,
  downloader: FakeDownloader,
  configure: impl FnOnce(&mut ServerConfig),
) -> TestServer {
  let dir = tempfile::tempdir().unwrap();
  let mut config = test_config(&dir);
  configure(&mut config);
  let agent = Arc::new(agent);
  let downloader = Arc::new(downloader);
  let shutdown = CancellationToken::new();
  let server = CafeServer::start(&config, agent.clone(), downloader.clone(), shutdown.clone()).unwrap();
  TestServer {
    chef: server.chef,
    agent,
    downloader,
    shutdown,
    dir,
  }
}

pub async fn wait_for_finish(runner: &JobRunner, id: Uuid) -> ScheduledTaskStatus {
  for _ in 0..1000 {
    if let Some(status) = runner.find_status_by_id(id) {
      if status.is_finished() {
        return status;
      }
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
  }
  panic!("job run {} did not finish", id);
}

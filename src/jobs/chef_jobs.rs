//! The three chef lifecycle jobs. They share the same `Job` plumbing and only
//! differ in the work they hand to the runner and in how they are triggered.

use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::Context;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use crate::chef::ChefAgent;
use crate::chef::bootstrap::{BootstrapSettings, validate_version};
use crate::downloader::{DownloadError, Downloader, InstallerSource};
use crate::errors::{CafeError, Result};
use crate::jobs::job::{Job, JobRun, ProgressReporter};
use crate::jobs::run_policy::RunPolicy;
use crate::status::ScheduledTaskStatus;

async fn fetch_installer(
  downloader: &dyn Downloader,
  installers: &InstallerSource,
  version: &str,
  progress: &ProgressReporter,
) -> anyhow::Result<PathBuf> {
  let url = installers.url_for(version);
  let file = installers.staged_path(version);
  progress.report(format!("Downloading chef {} from {}", version, url));
  match downloader.download(&url, &file).await {
    Ok(()) => {
      progress.report(format!("Downloaded chef {} to {}", version, file.display()));
      Ok(file)
    }
    Err(DownloadError::NotFound(url)) => anyhow::bail!("installer for chef {} not found at {}", version, url),
    Err(e) => Err(e).with_context(|| format!("failed to download chef {}", version)),
  }
}

/// Manual job that stages the installer for a chef version.
pub struct DownloadChefJob {
  job: Job,
  downloader: Arc<dyn Downloader>,
  installers: InstallerSource,
}

impl DownloadChefJob {
  pub fn new(downloader: Arc<dyn Downloader>, installers: InstallerSource, ready_tx: UnboundedSender<JobRun>) -> Self {
    Self {
      job: Job::new("download chef", RunPolicy::on_demand(), ready_tx),
      downloader,
      installers,
    }
  }

  pub fn job(&self) -> &Job {
    &self.job
  }

  pub fn download(&self, version: &str) -> Result<ScheduledTaskStatus> {
    validate_version(version).map_err(CafeError::InvalidRequest)?;
    let version = version.to_string();
    let downloader = self.downloader.clone();
    let installers = self.installers.clone();
    self.job.submit(format!("Download chef {}", version), move |progress| async move {
      fetch_installer(downloader.as_ref(), &installers, &version, &progress).await?;
      anyhow::Ok(())
    })
  }
}

/// Manual job that installs a chef version, downloading it first if it has
/// not been staged yet.
pub struct InstallChefJob {
  job: Job,
  agent: Arc<dyn ChefAgent>,
  downloader: Arc<dyn Downloader>,
  installers: InstallerSource,
  current_version: Arc<RwLock<Option<String>>>,
}

impl InstallChefJob {
  pub fn new(
    agent: Arc<dyn ChefAgent>,
    downloader: Arc<dyn Downloader>,
    installers: InstallerSource,
    ready_tx: UnboundedSender<JobRun>,
  ) -> Self {
    Self {
      job: Job::new("install chef", RunPolicy::on_demand(), ready_tx),
      agent,
      downloader,
      installers,
      current_version: Arc::new(RwLock::new(None)),
    }
  }

  pub fn job(&self) -> &Job {
    &self.job
  }

  pub fn current_version(&self) -> Option<String> {
    self.current_version.read().unwrap_or_else(PoisonError::into_inner).clone()
  }

  /// Asks the agent which version is installed right now.
  pub async fn refresh_version(&self) -> Option<String> {
    refresh_version(self.agent.as_ref(), &self.current_version).await
  }

  pub fn install(&self, version: &str) -> Result<ScheduledTaskStatus> {
    validate_version(version).map_err(CafeError::InvalidRequest)?;
    let version = version.to_string();
    let agent = self.agent.clone();
    let downloader = self.downloader.clone();
    let installers = self.installers.clone();
    let current_version = self.current_version.clone();
    self.job.submit(format!("Install chef {}", version), move |progress| async move {
      let staged = installers.staged_path(&version);
      let installer = if tokio::fs::try_exists(&staged).await.unwrap_or(false) {
        progress.report(format!("Using staged installer {}", staged.display()));
        staged
      } else {
        fetch_installer(downloader.as_ref(), &installers, &version, &progress).await?
      };
      agent.install(&installer, &progress).await?;
      let installed = refresh_version(agent.as_ref(), &current_version).await;
      progress.report(format!("Chef version is now {}", installed.as_deref().unwrap_or("unknown")));
      anyhow::Ok(())
    })
  }
}

async fn refresh_version(agent: &dyn ChefAgent, current_version: &RwLock<Option<String>>) -> Option<String> {
  let version = match agent.installed_version().await {
    Ok(version) => version,
    Err(e) => {
      warn!("Could not determine installed chef version: {:#}", e);
      None
    }
  };
  *current_version.write().unwrap_or_else(PoisonError::into_inner) = version.clone();
  version
}

/// Runs chef-client, on demand and on its interval policy. Bootstrapping is
/// a run with a first-boot file.
pub struct RunChefJob {
  job: Job,
  agent: Arc<dyn ChefAgent>,
  config_dir: PathBuf,
}

impl RunChefJob {
  pub fn new(agent: Arc<dyn ChefAgent>, policy: RunPolicy, config_dir: impl Into<PathBuf>, ready_tx: UnboundedSender<JobRun>) -> Self {
    Self {
      job: Job::new("run chef", policy, ready_tx),
      agent,
      config_dir: config_dir.into(),
    }
  }

  pub fn job(&self) -> &Job {
    &self.job
  }

  pub fn run(&self) -> Result<ScheduledTaskStatus> {
    let agent = self.agent.clone();
    self.job.submit("Run chef", move |progress| async move {
      agent.run(&[], &progress).await
    })
  }

  pub fn bootstrap(&self, settings: BootstrapSettings) -> Result<ScheduledTaskStatus> {
    let agent = self.agent.clone();
    let config_dir = self.config_dir.clone();
    let description = format!("Bootstrap chef with {}", settings.target.describe());
    self.job.submit(description, move |progress| async move {
      progress.report("Writing bootstrap files");
      let first_boot = settings
        .write_files(&config_dir)
        .await
        .with_context(|| format!("failed to write bootstrap files to {}", config_dir.display()))?;
      let args = vec!["-j".to_string(), first_boot.display().to_string()];
      agent.run(&args, &progress).await
    })
  }

  /// Called by the policy timer. Submits a run when the policy says one is
  /// due and no run of this job is already queued or running.
  pub fn on_tick(&self, now: DateTime<Utc>) -> Option<ScheduledTaskStatus> {
    if !self.job.is_due(now) {
      return None;
    }
    info!("Chef run is due, submitting");
    match self.run() {
      Ok(status) => Some(status),
      Err(e) => {
        warn!("Could not submit scheduled chef run: {}", e);
        None
      }
    }
  }

  pub fn pause(&self) {
    info!("Pausing scheduled chef runs");
    self.job.pause();
  }

  pub fn resume(&self) {
    info!("Resuming scheduled chef runs");
    self.job.resume();
  }
}

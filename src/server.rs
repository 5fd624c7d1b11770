//! Wiring of the server side: jobs, the shared runner and the background
//! tasks that drive them.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::chef::ChefAgent;
use crate::config::ServerConfig;
use crate::downloader::{Downloader, InstallerSource};
use crate::errors::{CafeError, Result};
use crate::jobs::{ChefJobRunner, DownloadChefJob, InstallChefJob, JobRunner, RunChefJob, RunPolicy};

pub struct CafeServer {
  pub chef: Arc<ChefJobRunner>,
  pub tasks: Vec<JoinHandle<()>>,
}

impl CafeServer {
  /// Builds the chef jobs on top of one runner and spawns the worker, the
  /// ready-run forwarder and the policy timer. Everything stops when
  /// `shutdown` is cancelled.
  pub fn start(
    config: &ServerConfig,
    agent: Arc<dyn ChefAgent>,
    downloader: Arc<dyn Downloader>,
    shutdown: CancellationToken,
  ) -> Result<Self> {
    let policy = match config.chef_interval {
      Some(interval) => {
        let interval = chrono::Duration::from_std(interval)
          .map_err(|e| CafeError::InvalidRequest(format!("chef interval out of range: {}", e)))?;
        RunPolicy::regularly_every(interval)
      }
      None => RunPolicy::on_demand(),
    };
    let installers = InstallerSource::new(config.installer_url.clone(), config.staging_dir.clone());

    let (ready_tx, ready_rx) = mpsc::unbounded_channel();
    let runner = Arc::new(JobRunner::new(config.history_limit));
    let chef = Arc::new(ChefJobRunner::new(
      runner.clone(),
      DownloadChefJob::new(downloader.clone(), installers.clone(), ready_tx.clone()),
      InstallChefJob::new(agent.clone(), downloader, installers, ready_tx.clone()),
      RunChefJob::new(agent, policy, config.chef_config_dir.clone(), ready_tx),
    ));

    let tasks = vec![
      runner.start(shutdown.clone()),
      chef.listen_for_ready_runs(ready_rx, shutdown.clone()),
      chef.spawn_policy_timer(config.policy_tick, shutdown),
    ];
    info!(interval = ?config.chef_interval, "Chef job runner started");
    Ok(Self { chef, tasks })
  }

  pub async fn join(self) {
    for task in self.tasks {
      let _ = task.await;
    }
  }
}

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::jobs::chef_jobs::{DownloadChefJob, InstallChefJob, RunChefJob};
use crate::jobs::job::JobRun;
use crate::jobs::job_runner::JobRunner;
use crate::models::{ChefStatus, ServerStatus};
use crate::status::ScheduledTaskStatus;

/// Funnels the runs of every chef job into one `JobRunner`, so only one
/// chef-client invocation happens on the node at a time no matter which job
/// asked for it.
pub struct ChefJobRunner {
  runner: Arc<JobRunner>,
  download_job: DownloadChefJob,
  install_job: InstallChefJob,
  run_job: RunChefJob,
}

impl ChefJobRunner {
  pub fn new(runner: Arc<JobRunner>, download_job: DownloadChefJob, install_job: InstallChefJob, run_job: RunChefJob) -> Self {
    Self {
      runner,
      download_job,
      install_job,
      run_job,
    }
  }

  pub fn runner(&self) -> &Arc<JobRunner> {
    &self.runner
  }

  pub fn download_job(&self) -> &DownloadChefJob {
    &self.download_job
  }

  pub fn install_job(&self) -> &InstallChefJob {
    &self.install_job
  }

  pub fn run_job(&self) -> &RunChefJob {
    &self.run_job
  }

  /// Forwards every ready run, in the order the jobs raised them, into the
  /// runner's queue.
  pub fn listen_for_ready_runs(&self, ready_rx: UnboundedReceiver<JobRun>, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(forward_ready_runs(self.runner.clone(), ready_rx, shutdown))
  }

  /// Checks the run job's policy every `tick`.
  pub fn spawn_policy_timer(self: &Arc<Self>, tick: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
    let chef = self.clone();
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(tick);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
      loop {
        tokio::select! {
          _ = ticker.tick() => {
            chef.run_job.on_tick(Utc::now());
          }
          _ = shutdown.cancelled() => break,
        }
      }
      debug!("Policy timer stopped");
    })
  }

  pub fn to_status(&self) -> ServerStatus {
    let mut status = self.runner.to_status();
    let run_job = self.run_job.job();
    status.chef = Some(ChefStatus {
      is_running: run_job.is_running(),
      expected_next_run: run_job.expected_next_run(),
      interval: run_job.interval().map(|interval| interval.num_seconds()),
      last_run: run_job.last_run().and_then(|run| run.start_time),
      version: self.install_job.current_version(),
    });
    status
  }

  pub fn find_status_by_id(&self, id: Uuid) -> Option<ScheduledTaskStatus> {
    self.runner.find_status_by_id(id)
  }
}

pub async fn forward_ready_runs(runner: Arc<JobRunner>, mut ready_rx: UnboundedReceiver<JobRun>, shutdown: CancellationToken) {
  loop {
    tokio::select! {
      job_run = ready_rx.recv() => match job_run {
        Some(job_run) => {
          debug!("Adding {} to the queue to run", job_run);
          runner.enqueue(job_run);
        }
        None => break,
      },
      _ = shutdown.cancelled() => break,
    }
  }
  info!("Stopped listening for ready job runs");
}

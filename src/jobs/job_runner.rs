use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::Utc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::jobs::job::{JobRun, ProgressReporter};
use crate::models::ServerStatus;
use crate::status::{ScheduledTaskStatus, TaskResult, TaskState};

/// Statuses of every submitted run, keyed by id.
///
/// Entries are replaced whole, never edited in place, so a reader always gets
/// a complete snapshot.
#[derive(Debug, Default)]
pub struct StatusStore {
  inner: RwLock<StoreInner>,
}

#[derive(Debug, Default)]
struct StoreInner {
  statuses: HashMap<Uuid, Arc<ScheduledTaskStatus>>,
  submitted: Vec<Uuid>,
  finished: VecDeque<Uuid>,
}

impl StatusStore {
  pub fn insert(&self, status: ScheduledTaskStatus) {
    let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
    let id = status.id;
    if inner.statuses.insert(id, Arc::new(status)).is_none() {
      inner.submitted.push(id);
    }
  }

  pub fn replace(&self, status: ScheduledTaskStatus) {
    let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
    let id = status.id;
    let finished = status.is_finished();
    if inner.statuses.insert(id, Arc::new(status)).is_none() {
      inner.submitted.push(id);
    }
    if finished {
      inner.finished.push_back(id);
    }
  }

  pub fn set_message(&self, id: Uuid, message: String) {
    let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
    let updated = match inner.statuses.get(&id) {
      Some(current) if !current.is_finished() => current.as_ref().clone().with_message(message),
      _ => return,
    };
    inner.statuses.insert(id, Arc::new(updated));
  }

  pub fn get(&self, id: Uuid) -> Option<ScheduledTaskStatus> {
    let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
    inner.statuses.get(&id).map(|status| status.as_ref().clone())
  }

  /// All known statuses in submission order.
  pub fn all(&self) -> Vec<ScheduledTaskStatus> {
    let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
    inner
      .submitted
      .iter()
      .filter_map(|id| inner.statuses.get(id))
      .map(|status| status.as_ref().clone())
      .collect()
  }

  /// Drops the oldest finished statuses beyond `limit`. Returns how many
  /// were removed.
  pub fn prune_finished(&self, limit: usize) -> usize {
    let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
    let mut removed = 0;
    while inner.finished.len() > limit {
      if let Some(id) = inner.finished.pop_front() {
        inner.statuses.remove(&id);
        removed += 1;
      }
    }
    if removed > 0 {
      let StoreInner { statuses, submitted, .. } = &mut *inner;
      submitted.retain(|id| statuses.contains_key(id));
    }
    removed
  }
}

/// FIFO queue of job runs drained by a single worker, so at most one run
/// executes at any time.
pub struct JobRunner {
  queue: Mutex<VecDeque<JobRun>>,
  notify: Notify,
  statuses: Arc<StatusStore>,
  history_limit: usize,
}

impl JobRunner {
  /// Keeps at least the latest finished status, so a run that just finished
  /// can always be looked up.
  pub fn new(history_limit: usize) -> Self {
    Self {
      queue: Mutex::new(VecDeque::new()),
      notify: Notify::new(),
      statuses: Arc::new(StatusStore::default()),
      history_limit: history_limit.max(1),
    }
  }

  /// Appends to the tail of the queue; the run's status is visible through
  /// `find_status_by_id` as soon as this returns.
  pub fn enqueue(&self, job_run: JobRun) {
    info!(job_run_id = %job_run.id(), "Adding {} to the queue", job_run);
    self.statuses.insert(job_run.status().clone());
    self.queue.lock().unwrap_or_else(PoisonError::into_inner).push_back(job_run);
    self.notify.notify_one();
  }

  pub fn find_status_by_id(&self, id: Uuid) -> Option<ScheduledTaskStatus> {
    self.statuses.get(id)
  }

  pub fn queue_length(&self) -> usize {
    self.queue.lock().unwrap_or_else(PoisonError::into_inner).len()
  }

  pub fn to_status(&self) -> ServerStatus {
    ServerStatus {
      queue_length: self.queue_length(),
      jobs: self.statuses.all(),
      chef: None,
    }
  }

  pub fn start(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
    let runner = self.clone();
    tokio::spawn(async move { runner.run_worker(shutdown).await })
  }

  pub async fn run_worker(&self, shutdown: CancellationToken) {
    info!("Job runner worker started");
    while let Some(job_run) = self.next(&shutdown).await {
      self.execute(job_run).await;
    }
    info!(pending = self.queue_length(), "Job runner worker stopped");
  }

  async fn next(&self, shutdown: &CancellationToken) -> Option<JobRun> {
    loop {
      if shutdown.is_cancelled() {
        return None;
      }
      if let Some(job_run) = self.queue.lock().unwrap_or_else(PoisonError::into_inner).pop_front() {
        return Some(job_run);
      }
      tokio::select! {
        _ = self.notify.notified() => {}
        _ = shutdown.cancelled() => return None,
      }
    }
  }

  /// Runs one job to completion. The status goes to Running before the work
  /// starts and to Finished exactly once afterwards, whether the work
  /// succeeded, failed or panicked.
  pub async fn execute(&self, job_run: JobRun) -> ScheduledTaskStatus {
    let (status, work, activity) = job_run.into_parts();
    let id = status.id;
    let running = status.to_running_state(Utc::now());
    self.statuses.replace(running.clone());
    if let Some(activity) = &activity {
      activity.started(&running);
    }
    info!(job_run_id = %id, description = %running.description, "Starting job run");

    let reporter = ProgressReporter::new(id, self.statuses.clone());
    let result = match tokio::spawn(async move { work(reporter).await }).await {
      Ok(Ok(())) => TaskResult::Success,
      Ok(Err(e)) => {
        let message = format!("{:#}", e);
        warn!(job_run_id = %id, error = %message, "Job run failed");
        TaskResult::Failure(message)
      }
      Err(e) => {
        error!(job_run_id = %id, error = %e, "Job run panicked");
        TaskResult::Failure(format!("job run panicked: {}", e))
      }
    };

    let current = match self.statuses.get(id) {
      Some(current) if current.state == TaskState::Running => current,
      _ => running,
    };
    let finished = current.to_finished_state(result, Utc::now());
    // The job's bookkeeping is settled before anyone can observe the
    // finished status.
    if let Some(activity) = &activity {
      activity.finished(&finished);
    }
    self.statuses.replace(finished.clone());
    self.statuses.prune_finished(self.history_limit);
    info!(job_run_id = %id, "Finished {}", finished);
    finished
  }
}

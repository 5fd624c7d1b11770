use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::anyhow;
use chrono::{DateTime, Duration, Utc};
use futures::future::{BoxFuture, FutureExt};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;
use uuid::Uuid;

use crate::errors::{CafeError, Result};
use crate::jobs::job_runner::StatusStore;
use crate::jobs::run_policy::RunPolicy;
use crate::status::ScheduledTaskStatus;

pub type JobWork = Box<dyn FnOnce(ProgressReporter) -> BoxFuture<'static, anyhow::Result<()>> + Send>;

/// Writes progress text into a running job's status.
#[derive(Clone)]
pub struct ProgressReporter {
  id: Uuid,
  statuses: Option<Arc<StatusStore>>,
}

impl ProgressReporter {
  pub(crate) fn new(id: Uuid, statuses: Arc<StatusStore>) -> Self {
    Self { id, statuses: Some(statuses) }
  }

  /// A reporter that only logs, for running work outside a runner.
  pub fn detached(id: Uuid) -> Self {
    Self { id, statuses: None }
  }

  pub fn job_run_id(&self) -> Uuid {
    self.id
  }

  pub fn report(&self, message: impl Into<String>) {
    let message = message.into();
    debug!(job_run_id = %self.id, "{}", message);
    if let Some(statuses) = &self.statuses {
      statuses.set_message(self.id, message);
    }
  }
}

/// Bookkeeping a job keeps about its own runs, updated by the runner as a
/// run starts and finishes.
#[derive(Debug)]
pub struct JobActivity {
  running: AtomicBool,
  pending: AtomicUsize,
  last_run: RwLock<Option<ScheduledTaskStatus>>,
  policy: RwLock<RunPolicy>,
}

impl JobActivity {
  fn new(policy: RunPolicy) -> Self {
    Self {
      running: AtomicBool::new(false),
      pending: AtomicUsize::new(0),
      last_run: RwLock::new(None),
      policy: RwLock::new(policy),
    }
  }

  pub(crate) fn started(&self, status: &ScheduledTaskStatus) {
    self.running.store(true, Ordering::SeqCst);
    if let Some(start) = status.start_time {
      self.policy.write().unwrap_or_else(PoisonError::into_inner).record_run(start);
    }
  }

  pub(crate) fn finished(&self, status: &ScheduledTaskStatus) {
    *self.last_run.write().unwrap_or_else(PoisonError::into_inner) = Some(status.clone());
    self.running.store(false, Ordering::SeqCst);
    let _ = self.pending.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
  }
}

/// One execution request: a fresh status plus the work to perform.
pub struct JobRun {
  status: ScheduledTaskStatus,
  work: JobWork,
  activity: Option<Arc<JobActivity>>,
}

impl JobRun {
  pub fn new<F, Fut>(description: impl Into<String>, work: F) -> Self
  where
    F: FnOnce(ProgressReporter) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
  {
    Self {
      status: ScheduledTaskStatus::create(description),
      work: Box::new(move |reporter| work(reporter).boxed()),
      activity: None,
    }
  }

  pub fn id(&self) -> Uuid {
    self.status.id
  }

  pub fn status(&self) -> &ScheduledTaskStatus {
    &self.status
  }

  pub(crate) fn into_parts(self) -> (ScheduledTaskStatus, JobWork, Option<Arc<JobActivity>>) {
    (self.status, self.work, self.activity)
  }
}

impl fmt::Debug for JobRun {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("JobRun").field("status", &self.status).finish_non_exhaustive()
  }
}

impl fmt::Display for JobRun {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.status)
  }
}

/// Schedulable work bound to a run policy. When a job becomes ready it sends
/// a new `JobRun` down its ready channel; where that run is queued is up to
/// whoever holds the receiving end.
pub struct Job {
  name: String,
  activity: Arc<JobActivity>,
  ready_tx: UnboundedSender<JobRun>,
}

impl Job {
  pub fn new(name: impl Into<String>, policy: RunPolicy, ready_tx: UnboundedSender<JobRun>) -> Self {
    Self {
      name: name.into(),
      activity: Arc::new(JobActivity::new(policy)),
      ready_tx,
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// Raises a ready notification carrying a new run and returns its initial
  /// status.
  pub fn submit<F, Fut>(&self, description: impl Into<String>, work: F) -> Result<ScheduledTaskStatus>
  where
    F: FnOnce(ProgressReporter) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
  {
    let mut run = JobRun::new(description, work);
    run.activity = Some(self.activity.clone());
    let status = run.status().clone();

    self.activity.pending.fetch_add(1, Ordering::SeqCst);
    self.ready_tx.send(run).map_err(|_| {
      self.activity.pending.fetch_sub(1, Ordering::SeqCst);
      CafeError::Other(anyhow!("job runner is no longer accepting {} runs", self.name))
    })?;
    debug!(job = %self.name, job_run_id = %status.id, "Job run ready");
    Ok(status)
  }

  pub fn is_running(&self) -> bool {
    self.activity.running.load(Ordering::SeqCst)
  }

  /// True from submission until every submitted run has finished.
  pub fn is_pending(&self) -> bool {
    self.activity.pending.load(Ordering::SeqCst) > 0
  }

  pub fn last_run(&self) -> Option<ScheduledTaskStatus> {
    self.activity.last_run.read().unwrap_or_else(PoisonError::into_inner).clone()
  }

  pub fn run_policy(&self) -> RunPolicy {
    self.activity.policy.read().unwrap_or_else(PoisonError::into_inner).clone()
  }

  pub fn expected_next_run(&self) -> Option<DateTime<Utc>> {
    self.run_policy().expected_next_run()
  }

  pub fn interval(&self) -> Option<Duration> {
    self.run_policy().interval()
  }

  pub fn is_due(&self, now: DateTime<Utc>) -> bool {
    !self.is_pending() && self.run_policy().is_due(now)
  }

  pub fn pause(&self) {
    self.activity.policy.write().unwrap_or_else(PoisonError::into_inner).disable();
  }

  pub fn resume(&self) {
    self.activity.policy.write().unwrap_or_else(PoisonError::into_inner).enable();
  }
}

//! Client-side wait for a job run submitted to the server.
//!
//! The waiter polls the run's status at a fixed interval until it reaches
//! `Finished`, the timeout passes or the caller cancels. Polls never overlap:
//! the next tick is only awaited after the previous poll returned. Errors
//! from the status source count as transient and are retried until the
//! deadline.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::Result;
use crate::status::ScheduledTaskStatus;

#[async_trait]
pub trait StatusSource: Send + Sync {
  /// `Ok(None)` when the server does not know the id.
  async fn job_run_status(&self, id: Uuid) -> Result<Option<ScheduledTaskStatus>>;
}

#[derive(Error, Debug)]
pub enum WaitError {
  /// The run may still be executing on the server.
  #[error("Timed out after {timeout:?} waiting for job run {id}")]
  TimedOut {
    id: Uuid,
    timeout: Duration,
    last_status: Option<ScheduledTaskStatus>,
  },

  #[error("Cancelled while waiting for job run {0}")]
  Cancelled(Uuid),
}

/// `tokio::time::interval` rejects a zero period.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

pub struct SchedulerWaiter<S> {
  source: S,
  poll_interval: Duration,
}

impl<S: StatusSource> SchedulerWaiter<S> {
  pub fn new(source: S, poll_interval: Duration) -> Self {
    Self {
      source,
      poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
    }
  }

  pub fn poll_interval(&self) -> Duration {
    self.poll_interval
  }

  pub fn source(&self) -> &S {
    &self.source
  }

  /// Waits for job run `id` to finish. `on_progress` sees every status that
  /// was successfully polled, including the final one.
  pub async fn wait_for_completion<F>(
    &self,
    id: Uuid,
    timeout: Duration,
    cancel: &CancellationToken,
    mut on_progress: F,
  ) -> std::result::Result<ScheduledTaskStatus, WaitError>
  where
    F: FnMut(&ScheduledTaskStatus) + Send,
  {
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);
    let mut ticker = tokio::time::interval(self.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_status: Option<ScheduledTaskStatus> = None;

    loop {
      tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(WaitError::Cancelled(id)),
        _ = &mut deadline => return Err(WaitError::TimedOut { id, timeout, last_status }),
        _ = ticker.tick() => {}
      }

      let polled = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(WaitError::Cancelled(id)),
        _ = &mut deadline => return Err(WaitError::TimedOut { id, timeout, last_status }),
        polled = self.source.job_run_status(id) => polled,
      };

      match polled {
        Ok(Some(status)) => {
          on_progress(&status);
          if status.is_finished() {
            return Ok(status);
          }
          last_status = Some(status);
        }
        Ok(None) => debug!(job_run_id = %id, "Job run not registered yet"),
        Err(e) => warn!(job_run_id = %id, "Polling failed, retrying: {}", e),
      }
    }
  }
}

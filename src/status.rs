use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a job run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "message", rename_all = "camelCase")]
pub enum TaskResult {
  Success,
  Failure(String),
}

impl TaskResult {
  pub fn failure(message: impl Into<String>) -> Self {
    TaskResult::Failure(message.into())
  }

  pub fn is_success(&self) -> bool {
    matches!(self, TaskResult::Success)
  }
}

impl fmt::Display for TaskResult {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TaskResult::Success => write!(f, "Success"),
      TaskResult::Failure(message) => write!(f, "Failed: {}", message),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaskState {
  NotStarted,
  Running,
  Finished,
}

impl fmt::Display for TaskState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TaskState::NotStarted => write!(f, "not started"),
      TaskState::Running => write!(f, "running"),
      TaskState::Finished => write!(f, "finished"),
    }
  }
}

/// Progress of a single job run, from submission to completion.
///
/// Transitions consume the status and return the next one, so a value that
/// has been handed out (for example through a status lookup) is never changed
/// behind the reader's back. `Clone` is a full, independent snapshot.
///
/// Equality covers every field, `current_message` included, while the
/// `Display` summary leaves the message out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledTaskStatus {
  pub id: Uuid,
  pub description: String,
  pub state: TaskState,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub start_time: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub complete_time: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub current_message: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub result: Option<TaskResult>,
}

impl ScheduledTaskStatus {
  pub fn create(description: impl Into<String>) -> Self {
    Self {
      id: Uuid::new_v4(),
      description: description.into(),
      state: TaskState::NotStarted,
      start_time: None,
      complete_time: None,
      current_message: None,
      result: None,
    }
  }

  /// Panics unless the status is `NotStarted`.
  pub fn to_running_state(mut self, start_time: DateTime<Utc>) -> Self {
    assert!(
      self.state == TaskState::NotStarted,
      "task {} cannot start from state {:?}",
      self.id,
      self.state
    );
    self.state = TaskState::Running;
    self.start_time = Some(start_time);
    self
  }

  /// Panics unless the status is `Running`.
  pub fn to_finished_state(mut self, result: TaskResult, complete_time: DateTime<Utc>) -> Self {
    assert!(
      self.state == TaskState::Running,
      "task {} cannot finish from state {:?}",
      self.id,
      self.state
    );
    self.state = TaskState::Finished;
    self.complete_time = Some(complete_time);
    self.result = Some(result);
    self
  }

  pub fn with_message(mut self, message: impl Into<String>) -> Self {
    self.current_message = Some(message.into());
    self
  }

  pub fn is_finished(&self) -> bool {
    self.state == TaskState::Finished
  }

  /// Elapsed time as seen at `now`. `None` until the task has started; fixed
  /// once it has finished.
  pub fn duration_at(&self, now: DateTime<Utc>) -> Option<Duration> {
    match (self.state, self.start_time, self.complete_time) {
      (TaskState::NotStarted, _, _) => None,
      (TaskState::Running, Some(start), _) => Some(now - start),
      (TaskState::Finished, Some(start), Some(complete)) => Some(complete - start),
      _ => None,
    }
  }

  pub fn duration(&self) -> Option<Duration> {
    self.duration_at(Utc::now())
  }
}

/// Floor of the duration in seconds. `num_seconds` truncates toward zero,
/// which is wrong for negative durations.
fn whole_seconds(duration: Duration) -> i64 {
  duration.num_milliseconds().div_euclid(1000)
}

impl fmt::Display for ScheduledTaskStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Task {} ({}) - ", self.description, self.id)?;
    match (self.state, &self.result) {
      (TaskState::NotStarted, _) => write!(f, "Not yet run"),
      (TaskState::Running, _) => {
        let seconds = self.duration().map(whole_seconds).unwrap_or(0);
        write!(f, "Running for {} seconds", seconds)
      }
      (TaskState::Finished, Some(result)) => write!(f, "{}", result),
      (TaskState::Finished, None) => write!(f, "Finished"),
    }
  }
}

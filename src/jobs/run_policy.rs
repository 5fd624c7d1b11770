use chrono::{DateTime, Duration, Utc};

/// Decides when a job is due on its own. Jobs without an interval only run
/// when someone asks for them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPolicy {
  interval: Option<Duration>,
  enabled: bool,
  last_run_start: Option<DateTime<Utc>>,
}

impl RunPolicy {
  pub fn regularly_every(interval: Duration) -> Self {
    Self {
      interval: Some(interval),
      enabled: true,
      last_run_start: None,
    }
  }

  pub fn on_demand() -> Self {
    Self {
      interval: None,
      enabled: true,
      last_run_start: None,
    }
  }

  pub fn interval(&self) -> Option<Duration> {
    self.interval
  }

  pub fn is_enabled(&self) -> bool {
    self.enabled
  }

  pub fn enable(&mut self) {
    self.enabled = true;
  }

  pub fn disable(&mut self) {
    self.enabled = false;
  }

  pub fn last_run_start(&self) -> Option<DateTime<Utc>> {
    self.last_run_start
  }

  pub fn record_run(&mut self, start: DateTime<Utc>) {
    self.last_run_start = Some(start);
  }

  /// Start of the last run plus the interval. `None` without an interval,
  /// before the first run, or while paused.
  pub fn expected_next_run(&self) -> Option<DateTime<Utc>> {
    if !self.enabled {
      return None;
    }
    match (self.interval, self.last_run_start) {
      (Some(interval), Some(start)) => Some(start + interval),
      _ => None,
    }
  }

  /// An interval policy that has never run is due straight away.
  pub fn is_due(&self, now: DateTime<Utc>) -> bool {
    if !self.enabled || self.interval.is_none() {
      return false;
    }
    match self.expected_next_run() {
      Some(next) => now >= next,
      None => true,
    }
  }
}

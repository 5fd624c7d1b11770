use serde::{Serialize, Deserialize};
use chrono::{DateTime, Utc};

use crate::status::ScheduledTaskStatus;

/// Aggregate view served by `GET /status`, rebuilt on every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatus {
  pub queue_length: usize,
  pub jobs: Vec<ScheduledTaskStatus>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub chef: Option<ChefStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChefStatus {
  pub is_running: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub expected_next_run: Option<DateTime<Utc>>,
  /// Seconds between interval runs.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub interval: Option<i64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub last_run: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionRequest {
  pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapRunListRequest {
  /// Contents of `client.rb`.
  pub config: String,
  /// Validator private key (PEM).
  pub validator: String,
  /// Comma separated, e.g. `recipe[base],role[web]`.
  pub run_list: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapPolicyRequest {
  pub config: String,
  pub validator: String,
  pub policy_name: String,
  pub policy_group: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionResponse {
  pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
  pub message: String,
}

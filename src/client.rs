use async_trait::async_trait;
use reqwest::Response;
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::errors::{CafeError, Result};
use crate::models::{
  BootstrapPolicyRequest, BootstrapRunListRequest, ChefStatus, ServerStatus, VersionRequest, VersionResponse,
};
use crate::scheduler_waiter::StatusSource;
use crate::status::ScheduledTaskStatus;

/// REST client for a cafe server.
#[derive(Debug, Clone)]
pub struct CafeClient {
  http: reqwest::Client,
  base_url: String,
}

impl CafeClient {
  pub fn new(base_url: impl Into<String>) -> Self {
    Self {
      http: reqwest::Client::new(),
      base_url: base_url.into().trim_end_matches('/').to_string(),
    }
  }

  fn url(&self, path: &str) -> String {
    format!("{}/{}", self.base_url, path)
  }

  async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: Option<&B>) -> Result<T> {
    let mut request = self.http.post(self.url(path));
    if let Some(body) = body {
      request = request.json(body);
    }
    parse(request.send().await?).await
  }

  async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
    parse(self.http.get(self.url(path)).send().await?).await
  }

  pub async fn run_chef(&self) -> Result<ScheduledTaskStatus> {
    self.post::<(), _>("chef/run", None).await
  }

  pub async fn bootstrap_run_list(&self, request: &BootstrapRunListRequest) -> Result<ScheduledTaskStatus> {
    self.post("chef/bootstrap/runlist", Some(request)).await
  }

  pub async fn bootstrap_policy(&self, request: &BootstrapPolicyRequest) -> Result<ScheduledTaskStatus> {
    self.post("chef/bootstrap/policy", Some(request)).await
  }

  pub async fn download_chef(&self, version: &str) -> Result<ScheduledTaskStatus> {
    let request = VersionRequest { version: version.to_string() };
    self.post("chef/download", Some(&request)).await
  }

  pub async fn install_chef(&self, version: &str) -> Result<ScheduledTaskStatus> {
    let request = VersionRequest { version: version.to_string() };
    self.post("chef/install", Some(&request)).await
  }

  pub async fn pause_chef(&self) -> Result<Option<ChefStatus>> {
    self.post::<(), _>("chef/pause", None).await
  }

  pub async fn resume_chef(&self) -> Result<Option<ChefStatus>> {
    self.post::<(), _>("chef/resume", None).await
  }

  pub async fn chef_version(&self) -> Result<VersionResponse> {
    self.get("chef/version").await
  }

  pub async fn server_status(&self) -> Result<ServerStatus> {
    self.get("status").await
  }

  pub async fn find_job_run_status(&self, id: Uuid) -> Result<Option<ScheduledTaskStatus>> {
    match self.get(&format!("status/{}", id)).await {
      Ok(status) => Ok(Some(status)),
      Err(CafeError::UnexpectedResponse { status: 404, .. }) => Ok(None),
      Err(e) => Err(e),
    }
  }
}

async fn parse<T: DeserializeOwned>(response: Response) -> Result<T> {
  let status = response.status();
  if status.is_success() {
    return Ok(response.json().await?);
  }
  let body = response.text().await.unwrap_or_default();
  let body = serde_json::from_str::<serde_json::Value>(&body)
    .ok()
    .and_then(|value| value.get("message").and_then(|m| m.as_str()).map(str::to_string))
    .unwrap_or(body);
  Err(CafeError::UnexpectedResponse {
    status: status.as_u16(),
    body: if body.is_empty() {
      status.canonical_reason().unwrap_or("").to_string()
    } else {
      body
    },
  })
}

#[async_trait]
impl StatusSource for CafeClient {
  async fn job_run_status(&self, id: Uuid) -> Result<Option<ScheduledTaskStatus>> {
    self.find_job_run_status(id).await
  }
}

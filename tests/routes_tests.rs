mod common;

use std::time::Duration;

use cafe::models::{ChefStatus, ErrorResponse, ServerStatus, VersionResponse};
use cafe::routes::routes;
use cafe::status::{ScheduledTaskStatus, TaskResult, TaskState};
use common::{FakeAgent, FakeDownloader, start_server, start_server_with, wait_for_finish};
use serde_json::json;
use uuid::Uuid;
use warp::http::StatusCode;

#[tokio::test]
async fn test_post_run_is_accepted_and_queryable() {
  let server = start_server(FakeAgent::default(), FakeDownloader::default());
  let api = routes(server.chef.clone());

  let response = warp::test::request().method("POST").path("/chef/run").reply(&api).await;
  assert_eq!(response.status(), StatusCode::ACCEPTED);
  let submitted: ScheduledTaskStatus = serde_json::from_slice(response.body()).unwrap();
  assert_eq!(submitted.state, TaskState::NotStarted);
  assert_eq!(submitted.description, "Run chef");

  wait_for_finish(server.chef.runner(), submitted.id).await;
  let response = warp::test::request()
    .method("GET")
    .path(&format!("/status/{}", submitted.id))
    .reply(&api)
    .await;
  assert_eq!(response.status(), StatusCode::OK);
  let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
  assert_eq!(body["state"], "Finished");
  assert_eq!(body["result"], json!({ "outcome": "success" }));
  assert!(body["startTime"].is_string());
  assert!(body["completeTime"].is_string());
}

#[tokio::test]
async fn test_unknown_job_run_is_not_found() {
  let server = start_server(FakeAgent::default(), FakeDownloader::default());
  let api = routes(server.chef.clone());
  let id = Uuid::new_v4();

  let response = warp::test::request().method("GET").path(&format!("/status/{}", id)).reply(&api).await;
  assert_eq!(response.status(), StatusCode::NOT_FOUND);
  let error: ErrorResponse = serde_json::from_slice(response.body()).unwrap();
  assert!(error.message.contains(&id.to_string()));

  let response = warp::test::request()
    .method("GET")
    .path(&format!("/status/{}/events", id))
    .reply(&api)
    .await;
  assert_eq!(response.status(), StatusCode::NOT_FOUND);

  let response = warp::test::request().method("GET").path("/status/not-a-uuid").reply(&api).await;
  assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_server_status_lists_jobs_and_chef() {
  let server = start_server_with(FakeAgent::default(), FakeDownloader::default(), |config| {
    config.chef_interval = Some(Duration::from_secs(600));
  });
  let api = routes(server.chef.clone());

  let submitted = server.chef.run_job().run().unwrap();
  wait_for_finish(server.chef.runner(), submitted.id).await;

  let response = warp::test::request().method("GET").path("/status").reply(&api).await;
  assert_eq!(response.status(), StatusCode::OK);
  let status: ServerStatus = serde_json::from_slice(response.body()).unwrap();
  assert!(status.jobs.iter().any(|job| job.id == submitted.id));
  let chef = status.chef.unwrap();
  assert_eq!(chef.interval, Some(600));
  assert!(chef.last_run.is_some());
  assert!(chef.expected_next_run.is_some());
}

#[tokio::test]
async fn test_invalid_requests_are_rejected() {
  let server = start_server(FakeAgent::default(), FakeDownloader::default());
  let api = routes(server.chef.clone());

  let response = warp::test::request()
    .method("POST")
    .path("/chef/install")
    .json(&json!({ "version": "18.2.7 && reboot" }))
    .reply(&api)
    .await;
  assert_eq!(response.status(), StatusCode::BAD_REQUEST);
  let error: ErrorResponse = serde_json::from_slice(response.body()).unwrap();
  assert!(error.message.contains("Invalid chef version"));

  let response = warp::test::request()
    .method("POST")
    .path("/chef/bootstrap/runlist")
    .json(&json!({ "config": "log_level :info", "validator": "key", "runList": "recipe[base];reboot" }))
    .reply(&api)
    .await;
  assert_eq!(response.status(), StatusCode::BAD_REQUEST);

  let response = warp::test::request()
    .method("POST")
    .path("/chef/bootstrap/policy")
    .json(&json!({ "config": "log_level :info", "validator": "key", "policyName": "web" }))
    .reply(&api)
    .await;
  assert_eq!(response.status(), StatusCode::BAD_REQUEST);

  assert!(server.chef.to_status().jobs.is_empty());
}

#[tokio::test]
async fn test_download_and_bootstrap_are_accepted() {
  let server = start_server(FakeAgent::default(), FakeDownloader::missing());
  let api = routes(server.chef.clone());

  let response = warp::test::request()
    .method("POST")
    .path("/chef/download")
    .json(&json!({ "version": "18.2.7" }))
    .reply(&api)
    .await;
  assert_eq!(response.status(), StatusCode::ACCEPTED);
  let download: ScheduledTaskStatus = serde_json::from_slice(response.body()).unwrap();
  let download = wait_for_finish(server.chef.runner(), download.id).await;
  assert!(matches!(download.result, Some(TaskResult::Failure(_))));

  let response = warp::test::request()
    .method("POST")
    .path("/chef/bootstrap/policy")
    .json(&json!({ "config": "log_level :info", "validator": "key", "policyName": "web", "policyGroup": "prod" }))
    .reply(&api)
    .await;
  assert_eq!(response.status(), StatusCode::ACCEPTED);
  let bootstrap: ScheduledTaskStatus = serde_json::from_slice(response.body()).unwrap();
  assert_eq!(bootstrap.description, "Bootstrap chef with policy web (prod)");
  let bootstrap = wait_for_finish(server.chef.runner(), bootstrap.id).await;
  assert_eq!(bootstrap.result, Some(TaskResult::Success));
}

#[tokio::test]
async fn test_pause_and_resume() {
  let server = start_server_with(FakeAgent::default(), FakeDownloader::default(), |config| {
    config.chef_interval = Some(Duration::from_secs(600));
  });
  let api = routes(server.chef.clone());

  let response = warp::test::request().method("POST").path("/chef/pause").reply(&api).await;
  assert_eq!(response.status(), StatusCode::OK);
  let paused: ChefStatus = serde_json::from_slice(response.body()).unwrap();
  assert_eq!(paused.expected_next_run, None);
  assert!(!server.chef.run_job().job().run_policy().is_enabled());

  let response = warp::test::request().method("POST").path("/chef/resume").reply(&api).await;
  assert_eq!(response.status(), StatusCode::OK);
  let resumed: ChefStatus = serde_json::from_slice(response.body()).unwrap();
  assert_eq!(resumed.interval, Some(600));
  assert!(server.chef.run_job().job().run_policy().is_enabled());
}

#[tokio::test]
async fn test_chef_version() {
  let server = start_server(
    FakeAgent {
      version: std::sync::Mutex::new(Some("17.10.0".into())),
      ..Default::default()
    },
    FakeDownloader::default(),
  );
  let api = routes(server.chef.clone());

  let response = warp::test::request().method("GET").path("/chef/version").reply(&api).await;
  let version: VersionResponse = serde_json::from_slice(response.body()).unwrap();
  assert_eq!(version.version, None);

  server.chef.install_job().refresh_version().await;
  let response = warp::test::request().method("GET").path("/chef/version").reply(&api).await;
  assert_eq!(response.status(), StatusCode::OK);
  let version: VersionResponse = serde_json::from_slice(response.body()).unwrap();
  assert_eq!(version.version.as_deref(), Some("17.10.0"));
}

#[tokio::test]
async fn test_wrong_method_is_rejected() {
  let server = start_server(FakeAgent::default(), FakeDownloader::default());
  let api = routes(server.chef.clone());

  let response = warp::test::request().method("GET").path("/chef/run").reply(&api).await;
  assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
  assert!(server.chef.to_status().jobs.is_empty());
}

#[tokio::test]
async fn test_events_stream_ends_with_the_finished_status() {
  let server = start_server(FakeAgent::default(), FakeDownloader::default());
  let api = routes(server.chef.clone());
  let submitted = server.chef.run_job().run().unwrap();
  wait_for_finish(server.chef.runner(), submitted.id).await;

  let response = warp::test::request()
    .method("GET")
    .path(&format!("/status/{}/events", submitted.id))
    .reply(&api)
    .await;

  assert_eq!(response.status(), StatusCode::OK);
  let body = String::from_utf8_lossy(response.body());
  assert_eq!(body.matches("event:status").count(), 1);
  assert!(body.contains(&submitted.id.to_string()));
  assert!(body.contains("\"state\":\"Finished\""));
}

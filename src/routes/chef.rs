use std::sync::Arc;

use tracing::{error, info};
use warp::Filter;
use warp::http::StatusCode;

use crate::chef::bootstrap::BootstrapSettings;
use crate::errors::CafeError;
use crate::jobs::ChefJobRunner;
use crate::models::{BootstrapPolicyRequest, BootstrapRunListRequest, VersionRequest, VersionResponse};
use crate::routes::{reject, with_chef};
use crate::status::ScheduledTaskStatus;

pub fn chef_routes(
  chef: Arc<ChefJobRunner>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
  let run = warp::path!("chef" / "run")
    .and(warp::post())
    .and(with_chef(chef.clone()))
    .and_then(handle_run);
  let bootstrap_run_list = warp::path!("chef" / "bootstrap" / "runlist")
    .and(warp::post())
    .and(warp::body::json())
    .and(with_chef(chef.clone()))
    .and_then(handle_bootstrap_run_list);
  let bootstrap_policy = warp::path!("chef" / "bootstrap" / "policy")
    .and(warp::post())
    .and(warp::body::json())
    .and(with_chef(chef.clone()))
    .and_then(handle_bootstrap_policy);
  let download = warp::path!("chef" / "download")
    .and(warp::post())
    .and(warp::body::json())
    .and(with_chef(chef.clone()))
    .and_then(handle_download);
  let install = warp::path!("chef" / "install")
    .and(warp::post())
    .and(warp::body::json())
    .and(with_chef(chef.clone()))
    .and_then(handle_install);
  let pause = warp::path!("chef" / "pause")
    .and(warp::post())
    .and(with_chef(chef.clone()))
    .and_then(handle_pause);
  let resume = warp::path!("chef" / "resume")
    .and(warp::post())
    .and(with_chef(chef.clone()))
    .and_then(handle_resume);
  let version = warp::path!("chef" / "version")
    .and(warp::get())
    .and(with_chef(chef))
    .and_then(handle_version);

  run
    .or(bootstrap_run_list)
    .or(bootstrap_policy)
    .or(download)
    .or(install)
    .or(pause)
    .or(resume)
    .or(version)
}

fn accepted(
  submitted: Result<ScheduledTaskStatus, CafeError>,
) -> Result<warp::reply::WithStatus<warp::reply::Json>, warp::Rejection> {
  match submitted {
    Ok(status) => {
      info!(job_run_id = %status.id, "Submitted {}", status.description);
      Ok(warp::reply::with_status(warp::reply::json(&status), StatusCode::ACCEPTED))
    }
    Err(e) => {
      error!("Submission failed: {}", e);
      Err(reject(e))
    }
  }
}

async fn handle_run(chef: Arc<ChefJobRunner>) -> Result<impl warp::Reply, warp::Rejection> {
  accepted(chef.run_job().run())
}

async fn handle_bootstrap_run_list(
  request: BootstrapRunListRequest,
  chef: Arc<ChefJobRunner>,
) -> Result<impl warp::Reply, warp::Rejection> {
  let settings = BootstrapSettings::from_run_list(request).map_err(|e| reject(CafeError::InvalidRequest(e)))?;
  accepted(chef.run_job().bootstrap(settings))
}

async fn handle_bootstrap_policy(
  request: BootstrapPolicyRequest,
  chef: Arc<ChefJobRunner>,
) -> Result<impl warp::Reply, warp::Rejection> {
  let settings = BootstrapSettings::from_policy(request).map_err(|e| reject(CafeError::InvalidRequest(e)))?;
  accepted(chef.run_job().bootstrap(settings))
}

async fn handle_download(request: VersionRequest, chef: Arc<ChefJobRunner>) -> Result<impl warp::Reply, warp::Rejection> {
  accepted(chef.download_job().download(&request.version))
}

async fn handle_install(request: VersionRequest, chef: Arc<ChefJobRunner>) -> Result<impl warp::Reply, warp::Rejection> {
  accepted(chef.install_job().install(&request.version))
}

async fn handle_pause(chef: Arc<ChefJobRunner>) -> Result<impl warp::Reply, warp::Rejection> {
  chef.run_job().pause();
  Ok(warp::reply::json(&chef.to_status().chef))
}

async fn handle_resume(chef: Arc<ChefJobRunner>) -> Result<impl warp::Reply, warp::Rejection> {
  chef.run_job().resume();
  Ok(warp::reply::json(&chef.to_status().chef))
}

async fn handle_version(chef: Arc<ChefJobRunner>) -> Result<impl warp::Reply, warp::Rejection> {
  let response = VersionResponse {
    version: chef.install_job().current_version(),
  };
  Ok(warp::reply::json(&response))
}

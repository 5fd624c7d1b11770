use std::sync::Arc;

use uuid::Uuid;
use warp::Filter;

use crate::errors::CafeError;
use crate::jobs::ChefJobRunner;
use crate::routes::{reject, with_chef};

pub fn status_routes(
  chef: Arc<ChefJobRunner>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
  let server_status = warp::path!("status")
    .and(warp::get())
    .and(with_chef(chef.clone()))
    .and_then(handle_server_status);
  let job_run_status = warp::path!("status" / Uuid)
    .and(warp::get())
    .and(with_chef(chef))
    .and_then(handle_job_run_status);

  server_status.or(job_run_status)
}

async fn handle_server_status(chef: Arc<ChefJobRunner>) -> Result<impl warp::Reply, warp::Rejection> {
  Ok(warp::reply::json(&chef.to_status()))
}

async fn handle_job_run_status(id: Uuid, chef: Arc<ChefJobRunner>) -> Result<impl warp::Reply, warp::Rejection> {
  match chef.find_status_by_id(id) {
    Some(status) => Ok(warp::reply::json(&status)),
    None => Err(reject(CafeError::JobRunNotFound(id))),
  }
}

use std::convert::Infallible;
use std::sync::Arc;

use tracing::error;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use crate::errors::CafeError;
use crate::jobs::ChefJobRunner;
use crate::models::ErrorResponse;

pub mod chef;
pub mod sse;
pub mod status;

pub fn routes(
  chef: Arc<ChefJobRunner>,
) -> impl Filter<Extract = impl warp::Reply, Error = Infallible> + Clone {
  chef::chef_routes(chef.clone())
    .or(status::status_routes(chef.clone()))
    .or(sse::sse_route(chef))
    .recover(handle_rejection)
}

pub(crate) fn with_chef(
  chef: Arc<ChefJobRunner>,
) -> impl Filter<Extract = (Arc<ChefJobRunner>,), Error = Infallible> + Clone {
  warp::any().map(move || chef.clone())
}

#[derive(Debug)]
pub struct ApiError {
  status: StatusCode,
  message: String,
}

impl warp::reject::Reject for ApiError {}

pub(crate) fn reject(err: CafeError) -> Rejection {
  let status = match &err {
    CafeError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
    CafeError::JobRunNotFound(_) => StatusCode::NOT_FOUND,
    _ => StatusCode::INTERNAL_SERVER_ERROR,
  };
  if status == StatusCode::INTERNAL_SERVER_ERROR {
    error!("Request failed: {}", err);
  }
  warp::reject::custom(ApiError { status, message: err.to_string() })
}

pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
  let (status, message) = if let Some(e) = err.find::<ApiError>() {
    (e.status, e.message.clone())
  } else if err.is_not_found() {
    (StatusCode::NOT_FOUND, "Not found".to_string())
  } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
    (StatusCode::BAD_REQUEST, e.to_string())
  } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
    (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
  } else {
    error!("Unhandled rejection: {:?}", err);
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
  };
  Ok(warp::reply::with_status(warp::reply::json(&ErrorResponse { message }), status))
}

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::future::ready;
use tokio_stream::wrappers::IntervalStream;
use uuid::Uuid;
use warp::Filter;
use warp::sse::Event;

use crate::errors::CafeError;
use crate::jobs::ChefJobRunner;
use crate::routes::{reject, with_chef};

const EVENT_INTERVAL: Duration = Duration::from_secs(1);

pub fn sse_route(chef: Arc<ChefJobRunner>) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
  warp::path!("status" / Uuid / "events")
    .and(warp::get())
    .and(with_chef(chef))
    .and_then(handle_sse)
}

/// Streams the job run's status once per second and closes after the
/// finished snapshot has been sent.
async fn handle_sse(id: Uuid, chef: Arc<ChefJobRunner>) -> Result<impl warp::Reply, warp::Rejection> {
  if chef.find_status_by_id(id).is_none() {
    return Err(reject(CafeError::JobRunNotFound(id)));
  }

  let stream = IntervalStream::new(tokio::time::interval(EVENT_INTERVAL))
    .map(move |_| chef.find_status_by_id(id))
    .scan(false, |finished, status| {
      let next = match status {
        Some(status) if !*finished => {
          *finished = status.is_finished();
          Some(status)
        }
        _ => None,
      };
      ready(next)
    })
    .map(|status| Event::default().event("status").json_data(&status));

  Ok(warp::sse::reply(warp::sse::keep_alive().stream(stream)))
}

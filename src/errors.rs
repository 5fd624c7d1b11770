//! Crate-wide error type.

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum CafeError {
  #[error("HTTP error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("Unexpected response from server ({status}): {body}")]
  UnexpectedResponse { status: u16, body: String },

  #[error("Job run not found: {0}")]
  JobRunNotFound(Uuid),

  #[error("Invalid request: {0}")]
  InvalidRequest(String),

  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),

  #[error(transparent)]
  Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CafeError>;

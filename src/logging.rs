//! `tracing-subscriber` setup shared by the server and client binaries.
//!
//! The level comes from `CAFE_LOG` (error, warn, info, debug, trace) and
//! defaults to `info`. Output goes to stderr so the client's stdout only
//! carries command output.

use tracing::Level;
use tracing_subscriber::fmt;

pub const LOG_ENV_VAR: &str = "CAFE_LOG";

pub fn init_logging() {
  let level = std::env::var(LOG_ENV_VAR)
    .ok()
    .and_then(|s| parse_level_str(&s))
    .unwrap_or(Level::INFO);

  fmt()
    .with_max_level(level)
    .with_target(true)
    .with_writer(std::io::stderr)
    .init();
}

pub fn parse_level_str(s: &str) -> Option<Level> {
  match s.trim().to_lowercase().as_str() {
    "error" => Some(Level::ERROR),
    "warn" | "warning" => Some(Level::WARN),
    "info" => Some(Level::INFO),
    "debug" => Some(Level::DEBUG),
    "trace" => Some(Level::TRACE),
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_known_levels() {
    assert_eq!(parse_level_str(" Debug "), Some(Level::DEBUG));
    assert_eq!(parse_level_str("warning"), Some(Level::WARN));
    assert_eq!(parse_level_str("loud"), None);
  }
}

use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Returns a token that is cancelled on SIGTERM or SIGINT.
pub fn install_shutdown_handler() -> CancellationToken {
  let token = CancellationToken::new();
  let token_clone = token.clone();

  tokio::spawn(async move {
    let (mut sigterm, mut sigint) = match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
      (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
      (Err(e), _) | (_, Err(e)) => {
        error!("Failed to install signal handlers: {}", e);
        return;
      }
    };

    tokio::select! {
      _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
      _ = sigint.recv() => info!("Received SIGINT, shutting down"),
    }

    token_clone.cancel();
  });

  token
}

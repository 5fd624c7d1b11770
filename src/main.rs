use std::sync::Arc;

use tracing::info;
use cafe::{
  chef::ChefClientProcess, config::ServerConfig, downloader::FileDownloader, logging::init_logging, routes::routes,
  server::CafeServer, shutdown::install_shutdown_handler,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  init_logging();
  let config = ServerConfig::from_env();
  let shutdown = install_shutdown_handler();

  let agent = Arc::new(ChefClientProcess::new(config.chef_client.clone(), config.install_command.clone()));
  let server = CafeServer::start(&config, agent, Arc::new(FileDownloader::new()), shutdown.clone())?;
  match server.chef.install_job().refresh_version().await {
    Some(version) => info!("Chef {} is installed", version),
    None => info!("Chef is not installed"),
  }

  let api = routes(server.chef.clone());
  let (addr, serving) = warp::serve(api).bind_with_graceful_shutdown(([0, 0, 0, 0], config.server_port), {
    let shutdown = shutdown.clone();
    async move { shutdown.cancelled().await }
  });
  info!("Listening on {}", addr);
  serving.await;

  server.join().await;
  info!("Server stopped");
  Ok(())
}

pub mod chef;
pub mod client;
pub mod config;
pub mod downloader;
pub mod errors;
pub mod jobs;
pub mod logging;
pub mod models;
pub mod routes;
pub mod scheduler_waiter;
pub mod server;
pub mod shutdown;
pub mod status;

//! Command-line client: submits chef commands to a cafe server and waits for
//! them to finish, printing progress as it goes.

use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use cafe::client::CafeClient;
use cafe::config::ClientConfig;
use cafe::logging::init_logging;
use cafe::models::{BootstrapPolicyRequest, BootstrapRunListRequest, ChefStatus};
use cafe::scheduler_waiter::{SchedulerWaiter, WaitError};
use cafe::status::{ScheduledTaskStatus, TaskResult};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "cafe", version, about = "Run and manage chef on a node through its cafe server.")]
struct CliArgs {
  /// Server to talk to. Defaults to `CAFE_NODE` or localhost.
  #[arg(long, global = true)]
  node: Option<String>,

  /// Server port. Defaults to `CAFE_PORT` or 59320.
  #[arg(long, global = true)]
  port: Option<u16>,

  /// Seconds to wait for a submitted command before giving up.
  #[arg(long, global = true)]
  timeout: Option<u64>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
  /// Run chef now.
  Run,
  /// Bootstrap chef with a run list, e.g. `recipe[base],role[web]`.
  BootstrapRunList {
    #[arg(long)]
    config: String,
    #[arg(long)]
    validator: String,
    #[arg(long)]
    run_list: String,
  },
  /// Bootstrap chef with a policy name and group.
  BootstrapPolicy {
    #[arg(long)]
    config: String,
    #[arg(long)]
    validator: String,
    #[arg(long)]
    policy_name: String,
    #[arg(long)]
    policy_group: String,
  },
  /// Download the installer for a chef version.
  Download { version: String },
  /// Install a chef version.
  Install { version: String },
  /// Stop interval chef runs.
  Pause,
  /// Resume interval chef runs.
  Resume,
  /// Show the installed chef version.
  Version,
  /// Show the server's queue, history and chef status.
  Status,
  /// Show the status of a single job run.
  Job { id: Uuid },
}

/// Prints a running task's progress whenever the message changes.
#[derive(Default)]
struct TaskStatusPresenter {
  last_message: Option<String>,
}

impl TaskStatusPresenter {
  fn show(&mut self, status: &ScheduledTaskStatus) {
    if status.current_message.is_some() && status.current_message != self.last_message {
      if let Some(message) = &status.current_message {
        println!("  {}", message);
      }
      self.last_message = status.current_message.clone();
    }
  }
}

#[tokio::main]
async fn main() -> ExitCode {
  init_logging();
  let args = CliArgs::parse();
  match run(args).await {
    Ok(code) => code,
    Err(e) => {
      eprintln!("error: {:#}", e);
      ExitCode::FAILURE
    }
  }
}

async fn run(args: CliArgs) -> Result<ExitCode> {
  let mut config = ClientConfig::from_env();
  if let Some(node) = args.node {
    config.node = node;
  }
  if let Some(port) = args.port {
    config.port = port;
  }
  if let Some(timeout) = args.timeout {
    config.timeout = Duration::from_secs(timeout);
  }
  debug!("Talking to {}", config.base_url());
  let client = CafeClient::new(config.base_url());

  let submitted = match args.command {
    Command::Run => client.run_chef().await?,
    Command::BootstrapRunList { config: chef_config, validator, run_list } => {
      let request = BootstrapRunListRequest {
        config: read_file(&chef_config).await?,
        validator: read_file(&validator).await?,
        run_list,
      };
      client.bootstrap_run_list(&request).await?
    }
    Command::BootstrapPolicy { config: chef_config, validator, policy_name, policy_group } => {
      let request = BootstrapPolicyRequest {
        config: read_file(&chef_config).await?,
        validator: read_file(&validator).await?,
        policy_name,
        policy_group,
      };
      client.bootstrap_policy(&request).await?
    }
    Command::Download { version } => client.download_chef(&version).await?,
    Command::Install { version } => client.install_chef(&version).await?,
    Command::Pause => {
      print_chef_status(client.pause_chef().await?.as_ref());
      return Ok(ExitCode::SUCCESS);
    }
    Command::Resume => {
      print_chef_status(client.resume_chef().await?.as_ref());
      return Ok(ExitCode::SUCCESS);
    }
    Command::Version => {
      let version = client.chef_version().await?.version;
      println!("{}", version.as_deref().unwrap_or("chef is not installed"));
      return Ok(ExitCode::SUCCESS);
    }
    Command::Status => {
      let status = client.server_status().await?;
      println!("Queued: {}", status.queue_length);
      for job in &status.jobs {
        println!("{}", job);
      }
      print_chef_status(status.chef.as_ref());
      return Ok(ExitCode::SUCCESS);
    }
    Command::Job { id } => {
      match client.find_job_run_status(id).await? {
        Some(status) => println!("{}", status),
        None => println!("No job run with id {}", id),
      }
      return Ok(ExitCode::SUCCESS);
    }
  };

  println!("{}", submitted);
  wait_for(client, &config, submitted.id).await
}

async fn wait_for(client: CafeClient, config: &ClientConfig, id: Uuid) -> Result<ExitCode> {
  let cancel = CancellationToken::new();
  let ctrl_c = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      ctrl_c.cancel();
    }
  });

  let waiter = SchedulerWaiter::new(client, config.poll_interval);
  let mut presenter = TaskStatusPresenter::default();
  match waiter.wait_for_completion(id, config.timeout, &cancel, |status| presenter.show(status)).await {
    Ok(status) => {
      println!("{}", status);
      Ok(match status.result {
        Some(TaskResult::Success) => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
      })
    }
    Err(WaitError::TimedOut { last_status, .. }) => {
      println!(
        "Gave up waiting after {} seconds; the task may still be running on the server",
        config.timeout.as_secs()
      );
      if let Some(status) = last_status {
        println!("Last known status: {}", status);
      }
      Ok(ExitCode::from(2))
    }
    Err(e @ WaitError::Cancelled(_)) => {
      println!("{}", e);
      Ok(ExitCode::from(130))
    }
  }
}

fn print_chef_status(chef: Option<&ChefStatus>) {
  let Some(chef) = chef else {
    return;
  };
  println!("Chef running: {}", chef.is_running);
  println!("Installed version: {}", chef.version.as_deref().unwrap_or("none"));
  match chef.interval {
    Some(seconds) => println!("Interval: {} seconds", seconds),
    None => println!("Interval: none"),
  }
  if let Some(last_run) = chef.last_run {
    println!("Last run: {}", last_run);
  }
  if let Some(next) = chef.expected_next_run {
    println!("Expected next run: {}", next);
  }
}

async fn read_file(path: &str) -> Result<String> {
  tokio::fs::read_to_string(path)
    .await
    .with_context(|| format!("failed to read {}", path))
}

//! The chef-client agent on this node: running it, installing it and asking
//! it for its version.

pub mod bootstrap;

use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{Context, bail};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::jobs::job::ProgressReporter;

#[async_trait]
pub trait ChefAgent: Send + Sync {
  /// Runs chef-client once with extra arguments.
  async fn run(&self, args: &[String], progress: &ProgressReporter) -> anyhow::Result<()>;

  /// Installs chef from a staged installer.
  async fn install(&self, installer: &Path, progress: &ProgressReporter) -> anyhow::Result<()>;

  /// The installed chef version, `None` when chef is not installed.
  async fn installed_version(&self) -> anyhow::Result<Option<String>>;
}

/// Drives the real `chef-client` binary.
#[derive(Debug, Clone)]
pub struct ChefClientProcess {
  chef_client: PathBuf,
  install_command: String,
}

impl ChefClientProcess {
  pub fn new(chef_client: impl Into<PathBuf>, install_command: impl Into<String>) -> Self {
    Self {
      chef_client: chef_client.into(),
      install_command: install_command.into(),
    }
  }
}

#[async_trait]
impl ChefAgent for ChefClientProcess {
  async fn run(&self, args: &[String], progress: &ProgressReporter) -> anyhow::Result<()> {
    info!(job_run_id = %progress.job_run_id(), "Running {} {}", self.chef_client.display(), args.join(" "));
    let mut command = Command::new(&self.chef_client);
    command.args(args);
    run_streaming(command, "chef-client", progress).await
  }

  async fn install(&self, installer: &Path, progress: &ProgressReporter) -> anyhow::Result<()> {
    let (program, args) = install_command_line(&self.install_command, installer)?;
    info!(job_run_id = %progress.job_run_id(), "Installing chef with {} {}", program, args.join(" "));
    progress.report(format!("Installing {}", installer.display()));
    let mut command = Command::new(&program);
    command.args(&args);
    run_streaming(command, &program, progress).await
  }

  async fn installed_version(&self) -> anyhow::Result<Option<String>> {
    let output = match Command::new(&self.chef_client).arg("--version").output().await {
      Ok(output) => output,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        debug!("{} is not installed", self.chef_client.display());
        return Ok(None);
      }
      Err(e) => return Err(e).context("failed to ask chef-client for its version"),
    };
    if !output.status.success() {
      bail!("chef-client --version exited with {}", output.status);
    }
    Ok(parse_chef_version(&String::from_utf8_lossy(&output.stdout)))
  }
}

/// Spawns the command, feeding each stdout line to `progress`, and fails
/// with the tail of stderr when the process exits non-zero.
async fn run_streaming(mut command: Command, name: &str, progress: &ProgressReporter) -> anyhow::Result<()> {
  let mut child = command
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true)
    .spawn()
    .with_context(|| format!("failed to start {}", name))?;

  let stderr = child.stderr.take();
  let stderr_task = tokio::spawn(async move {
    let mut buffer = String::new();
    if let Some(mut stderr) = stderr {
      let _ = stderr.read_to_string(&mut buffer).await;
    }
    buffer
  });

  if let Some(stdout) = child.stdout.take() {
    // chef output is not always valid UTF-8; decode each line lossily.
    let mut stdout = BufReader::new(stdout);
    let mut line = Vec::new();
    while stdout.read_until(b'\n', &mut line).await? > 0 {
      let text = String::from_utf8_lossy(&line);
      let text = text.trim();
      if !text.is_empty() {
        progress.report(text);
      }
      line.clear();
    }
  }

  let status = child.wait().await?;
  let stderr = stderr_task.await.unwrap_or_default();
  if !status.success() {
    let detail = stderr.lines().rev().find(|line| !line.trim().is_empty()).unwrap_or("").trim();
    match status.code() {
      Some(code) if detail.is_empty() => bail!("{} exited with code {}", name, code),
      Some(code) => bail!("{} exited with code {}: {}", name, code, detail),
      None => bail!("{} was terminated by a signal", name),
    }
  }
  Ok(())
}

fn install_command_line(template: &str, installer: &Path) -> anyhow::Result<(String, Vec<String>)> {
  let file = installer.display().to_string();
  let mut parts = template
    .split_whitespace()
    .map(|part| part.replace("{file}", &file));
  let program = parts.next().context("install command is empty")?;
  Ok((program, parts.collect()))
}

/// Pulls the version out of `chef-client --version` output, which looks like
/// `Chef: 14.1.1` or `Chef Infra Client: 17.9.26`.
pub fn parse_chef_version(output: &str) -> Option<String> {
  output
    .lines()
    .find_map(|line| line.rsplit_once(':').map(|(_, version)| version.trim()))
    .filter(|version| !version.is_empty())
    .map(str::to_string)
}

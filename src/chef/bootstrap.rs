//! First-time registration of this node with a chef server.
//!
//! Bootstrapping writes `client.rb`, the validator key and `first-boot.json`
//! into the chef config directory, then chef-client runs once against that
//! first-boot file.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde_json::json;
use tokio::fs;
use tracing::info;

use crate::models::{BootstrapPolicyRequest, BootstrapRunListRequest};

static RUN_LIST_ITEM: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^(recipe|role)\[[\w.:@-]+\]$").expect("run list pattern is valid"));
static POLICY_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[\w.-]+$").expect("policy pattern is valid"));
static VERSION: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^\d+(\.\d+){1,3}(-\d+)?$").expect("version pattern is valid"));

pub const CLIENT_CONFIG_FILE: &str = "client.rb";
pub const VALIDATOR_FILE: &str = "validator.pem";
pub const FIRST_BOOT_FILE: &str = "first-boot.json";

/// What the node should converge to after bootstrapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapTarget {
  RunList(Vec<String>),
  Policy { name: String, group: String },
}

impl BootstrapTarget {
  pub fn first_boot_json(&self) -> serde_json::Value {
    match self {
      BootstrapTarget::RunList(items) => json!({ "run_list": items }),
      BootstrapTarget::Policy { name, group } => json!({ "policy_name": name, "policy_group": group }),
    }
  }

  pub fn describe(&self) -> String {
    match self {
      BootstrapTarget::RunList(items) => format!("run list {}", items.join(",")),
      BootstrapTarget::Policy { name, group } => format!("policy {} ({})", name, group),
    }
  }
}

#[derive(Debug, Clone)]
pub struct BootstrapSettings {
  pub config: String,
  pub validator: String,
  pub target: BootstrapTarget,
}

impl BootstrapSettings {
  pub fn from_run_list(request: BootstrapRunListRequest) -> Result<Self, String> {
    let items = parse_run_list(&request.run_list)?;
    Self::new(request.config, request.validator, BootstrapTarget::RunList(items))
  }

  pub fn from_policy(request: BootstrapPolicyRequest) -> Result<Self, String> {
    for (field, value) in [("policyName", &request.policy_name), ("policyGroup", &request.policy_group)] {
      if !POLICY_TOKEN.is_match(value) {
        return Err(format!("Invalid or unsafe value for field '{}'", field));
      }
    }
    let target = BootstrapTarget::Policy {
      name: request.policy_name,
      group: request.policy_group,
    };
    Self::new(request.config, request.validator, target)
  }

  fn new(config: String, validator: String, target: BootstrapTarget) -> Result<Self, String> {
    if config.trim().is_empty() {
      return Err("Missing 'config' field".into());
    }
    if validator.trim().is_empty() {
      return Err("Missing 'validator' field".into());
    }
    Ok(Self { config, validator, target })
  }

  /// Writes the bootstrap files and returns the path of `first-boot.json`.
  pub async fn write_files(&self, config_dir: &Path) -> std::io::Result<PathBuf> {
    fs::create_dir_all(config_dir).await?;
    fs::write(config_dir.join(CLIENT_CONFIG_FILE), &self.config).await?;
    fs::write(config_dir.join(VALIDATOR_FILE), &self.validator).await?;
    let first_boot = config_dir.join(FIRST_BOOT_FILE);
    fs::write(&first_boot, self.target.first_boot_json().to_string()).await?;
    info!("Wrote bootstrap files to {}", config_dir.display());
    Ok(first_boot)
  }
}

pub fn parse_run_list(raw: &str) -> Result<Vec<String>, String> {
  let items: Vec<String> = raw
    .split(',')
    .map(str::trim)
    .filter(|item| !item.is_empty())
    .map(str::to_string)
    .collect();
  if items.is_empty() {
    return Err("Missing 'runList' field".into());
  }
  if let Some(bad) = items.iter().find(|item| !RUN_LIST_ITEM.is_match(item)) {
    return Err(format!("Invalid run list item '{}'", bad));
  }
  Ok(items)
}

pub fn validate_version(version: &str) -> Result<(), String> {
  if VERSION.is_match(version) {
    Ok(())
  } else {
    Err(format!("Invalid chef version '{}'", version))
  }
}

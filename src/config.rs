use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

pub const DEFAULT_PORT: u16 = 59320;

#[derive(Debug, Clone)]
pub struct ServerConfig {
  pub server_port: u16,
  pub chef_client: PathBuf,
  pub chef_config_dir: PathBuf,
  pub staging_dir: PathBuf,
  /// Installer location, `{version}` is substituted.
  pub installer_url: String,
  /// Install command line, `{file}` is substituted with the staged installer.
  pub install_command: String,
  pub chef_interval: Option<Duration>,
  pub policy_tick: Duration,
  pub history_limit: usize,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      server_port: DEFAULT_PORT,
      chef_client: PathBuf::from("chef-client"),
      chef_config_dir: PathBuf::from("/etc/chef"),
      staging_dir: PathBuf::from("staging"),
      installer_url: "https://packages.chef.io/files/stable/chef/{version}/ubuntu/22.04/chef_{version}-1_amd64.deb".into(),
      install_command: "dpkg -i {file}".into(),
      chef_interval: None,
      policy_tick: Duration::from_secs(30),
      history_limit: 100,
    }
  }
}

impl ServerConfig {
  pub fn from_env() -> Self {
    Self::from_lookup(|key| env::var(key).ok())
  }

  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
    let defaults = Self::default();
    Self {
      server_port: parse_or(&lookup, "SERVER_PORT", defaults.server_port),
      chef_client: lookup("CAFE_CHEF_CLIENT").map(PathBuf::from).unwrap_or(defaults.chef_client),
      chef_config_dir: lookup("CAFE_CHEF_CONFIG_DIR").map(PathBuf::from).unwrap_or(defaults.chef_config_dir),
      staging_dir: lookup("CAFE_STAGING_DIR").map(PathBuf::from).unwrap_or(defaults.staging_dir),
      installer_url: lookup("CAFE_INSTALLER_URL").unwrap_or(defaults.installer_url),
      install_command: lookup("CAFE_INSTALL_COMMAND").unwrap_or(defaults.install_command),
      chef_interval: match parse_or(&lookup, "CAFE_CHEF_INTERVAL_SECS", 0u64) {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
      },
      policy_tick: Duration::from_secs(parse_or(&lookup, "CAFE_POLICY_TICK_SECS", defaults.policy_tick.as_secs()).max(1)),
      history_limit: parse_or(&lookup, "CAFE_HISTORY_LIMIT", defaults.history_limit).max(1),
    }
  }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
  pub node: String,
  pub port: u16,
  pub poll_interval: Duration,
  pub timeout: Duration,
}

impl Default for ClientConfig {
  fn default() -> Self {
    Self {
      node: "localhost".into(),
      port: DEFAULT_PORT,
      poll_interval: Duration::from_millis(1000),
      timeout: Duration::from_secs(30 * 60),
    }
  }
}

impl ClientConfig {
  pub fn from_env() -> Self {
    Self::from_lookup(|key| env::var(key).ok())
  }

  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
    let defaults = Self::default();
    Self {
      node: lookup("CAFE_NODE").unwrap_or(defaults.node),
      port: parse_or(&lookup, "CAFE_PORT", defaults.port),
      poll_interval: Duration::from_millis(parse_or(&lookup, "CAFE_POLL_INTERVAL_MS", defaults.poll_interval.as_millis() as u64).max(1)),
      timeout: Duration::from_secs(parse_or(&lookup, "CAFE_TIMEOUT_SECS", defaults.timeout.as_secs())),
    }
  }

  pub fn base_url(&self) -> String {
    format!("http://{}:{}", self.node, self.port)
  }
}

fn parse_or<T: FromStr + Copy>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
  match lookup(key) {
    None => default,
    Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
      warn!("Ignoring malformed {}={:?}", key, raw);
      default
    }),
  }
}

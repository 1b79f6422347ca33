use std::{env, path::PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use which::which;

/// Default local path of the kubeconfig file.
pub const DEFAULT_KUBECONFIG_PATH: &str = "~/.kube/config";
pub const KUBECONFIG_ENV: &str = "KUBECONFIG";

pub const ZFS_PATH_ENV: &str = "CSI_ZFS_ZFS_PATH";
pub const TAR_PATH_ENV: &str = "CSI_ZFS_TAR_PATH";
pub const CP_PATH_ENV: &str = "CSI_ZFS_CP_PATH";

const DEFAULT_VERSION: &str = "dev";

/// Executables invoked by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commands {
  pub zfs: String,
  pub tar: String,
  pub cp: String,
}

impl Default for Commands {
  fn default() -> Self {
    Commands {
      zfs: "zfs".into(),
      tar: "tar".into(),
      cp: "cp".into(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
  kubeconfig_path: PathBuf,
  commands: Commands,
}

impl Default for Config {
  fn default() -> Self {
    Config {
      kubeconfig_path: DEFAULT_KUBECONFIG_PATH.into(),
      commands: Commands::default(),
    }
  }
}

fn resolve_command(lookup: &impl Fn(&str) -> Option<String>, env_name: &str, name: &str) -> String {
  if let Some(path) = lookup(env_name).filter(|p| !p.is_empty()) {
    return path;
  }

  match which(name) {
    Ok(path) => path.to_string_lossy().into_owned(),
    Err(_) => {
      debug!("{} not found on PATH, using bare name", name);
      name.to_owned()
    }
  }
}

impl Config {
  /// Read the configuration from the process environment.
  pub fn from_env() -> Self {
    Self::from_lookup(|key| env::var(key).ok())
  }

  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
    let kubeconfig_path = lookup(KUBECONFIG_ENV)
      .filter(|p| !p.is_empty())
      .unwrap_or_else(|| DEFAULT_KUBECONFIG_PATH.to_owned())
      .into();

    let commands = Commands {
      zfs: resolve_command(&lookup, ZFS_PATH_ENV, "zfs"),
      tar: resolve_command(&lookup, TAR_PATH_ENV, "tar"),
      cp: resolve_command(&lookup, CP_PATH_ENV, "cp"),
    };

    let config = Config {
      kubeconfig_path,
      commands,
    };
    info!(?config, "loaded configuration");
    config
  }

  pub fn with_commands(mut self, commands: Commands) -> Self {
    self.commands = commands;
    self
  }

  /// Cluster connection file used to build the metadata store client.
  #[inline]
  pub fn kubeconfig_path(&self) -> &PathBuf {
    &self.kubeconfig_path
  }

  #[inline]
  pub fn commands(&self) -> &Commands {
    &self.commands
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
  #[error("No driver name provided")]
  MissingName,
  #[error("No node id provided")]
  MissingNodeId,
  #[error("No driver endpoint provided")]
  MissingEndpoint,
}

/// Identity of the plugin process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
  pub name: String,
  pub node_id: String,
  pub endpoint: String,
  pub ephemeral: bool,
  pub max_volumes_per_node: u64,
  pub version: String,
}

impl DriverConfig {
  pub fn validate(mut self) -> Result<Self, ConfigError> {
    if self.name.is_empty() {
      return Err(ConfigError::MissingName);
    }

    if self.node_id.is_empty() {
      return Err(ConfigError::MissingNodeId);
    }

    if self.endpoint.is_empty() {
      return Err(ConfigError::MissingEndpoint);
    }

    if self.version.is_empty() {
      self.version = DEFAULT_VERSION.to_owned();
    }

    info!("Driver: {}", self.name);
    info!("Version: {}", self.version);
    Ok(self)
  }
}

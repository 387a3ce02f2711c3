// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    config::{ConfigError, PersistableConfig},
    hosts::HostPool,
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

pub const DEFAULT_SETTINGS_FILE: &str = "settings.yaml";
pub const DEFAULT_SSH_USER: &str = "ubuntu";
pub const DEFAULT_BASE_PORT: u16 = 8000;
pub const DEFAULT_CONFIG_DIR: &str = ".proto";

/// Describes a testbed: how to reach its hosts, which repository they build,
/// and where configuration lives locally and remotely.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub ssh: SshSettings,
    pub repo: RepoSettings,
    /// First port of the range handed out to committee roles.
    pub base_port: u16,
    /// Configuration directory name. Locally it is relative to the working
    /// directory, remotely to the repository checkout.
    pub config_dir: String,
    /// Root of the local checkout, used for local builds.
    pub local_repo_root: PathBuf,
    pub readiness: ReadinessSettings,
    /// Pause between successive launches on shared hosts.
    pub settle_delay_ms: u64,
    pub inventory: HostPool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ssh: SshSettings::default(),
            repo: RepoSettings::default(),
            base_port: DEFAULT_BASE_PORT,
            config_dir: DEFAULT_CONFIG_DIR.into(),
            local_repo_root: PathBuf::from(".."),
            readiness: ReadinessSettings::default(),
            settle_delay_ms: 0,
            inventory: HostPool::default(),
        }
    }
}

impl PersistableConfig for Settings {}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ssh.user.is_empty() {
            return Err(ConfigError::invalid("ssh.user", "must not be empty"));
        }
        if self.repo.name.is_empty() {
            return Err(ConfigError::invalid("repo.name", "must not be empty"));
        }
        if self.base_port == 0 {
            return Err(ConfigError::invalid("base_port", "must be positive"));
        }
        if self.config_dir.is_empty() {
            return Err(ConfigError::invalid("config_dir", "must not be empty"));
        }
        self.inventory.validate()
    }

    pub fn local_config_dir(&self) -> PathBuf {
        PathBuf::from(&self.config_dir)
    }

    /// Remote paths are relative to the ssh user's home directory.
    pub fn remote_config_dir(&self) -> String {
        format!("{}/{}", self.repo.name, self.config_dir)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SshSettings {
    pub user: String,
    pub key_path: PathBuf,
    pub connect_timeout_secs: u64,
    /// Forward the local agent so hosts can clone private repositories.
    pub forward_agent: bool,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            user: DEFAULT_SSH_USER.into(),
            key_path: PathBuf::from("~/.ssh/id_rsa"),
            connect_timeout_secs: 10,
            forward_agent: true,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RepoSettings {
    pub name: String,
    pub url: String,
    pub branch: String,
}

impl Default for RepoSettings {
    fn default() -> Self {
        Self {
            name: "validator-core".into(),
            url: "https://github.com/aptos-labs/validator-core.git".into(),
            branch: "main".into(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReadinessSettings {
    pub timeout_secs: u64,
    pub poll_interval_ms: u64,
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            poll_interval_ms: 500,
        }
    }
}

impl ReadinessSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

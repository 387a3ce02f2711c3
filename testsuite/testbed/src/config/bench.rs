// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    commands::CompileProfile,
    committee::MAX_WORKERS_PER_AUTHORITY,
    config::{ConfigError, PersistableConfig},
    topology::ClusterShape,
};
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf, str::FromStr, time::Duration};

/// Which processes make up an authority.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentMode {
    /// A primary process plus one process per worker, one client per worker.
    #[default]
    Narwhal,
    /// A single validator process per authority, one client per authority.
    Node,
}

impl fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeploymentMode::Narwhal => write!(f, "narwhal"),
            DeploymentMode::Node => write!(f, "node"),
        }
    }
}

impl FromStr for DeploymentMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "narwhal" => Ok(DeploymentMode::Narwhal),
            "node" => Ok(DeploymentMode::Node),
            other => Err(ConfigError::invalid(
                "mode",
                format!("unknown deployment mode {}", other),
            )),
        }
    }
}

/// The load generator started next to each node of a node deployment.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientKind {
    /// Payment transactions between generated accounts.
    #[default]
    Transfer,
    /// Limit orders against an orderbook the first client creates.
    Orderbook,
}

impl fmt::Display for ClientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientKind::Transfer => write!(f, "transfer"),
            ClientKind::Orderbook => write!(f, "orderbook"),
        }
    }
}

impl FromStr for ClientKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transfer" => Ok(ClientKind::Transfer),
            "orderbook" => Ok(ClientKind::Orderbook),
            other => Err(ConfigError::invalid(
                "client",
                format!("unknown client kind {}", other),
            )),
        }
    }
}

/// Parameters of a remote benchmark sweep. Every combination of `nodes`,
/// `rate` and run repetition is benchmarked.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BenchParameters {
    /// Number of authorities left offline, taken from the end of the committee.
    pub faults: usize,
    pub nodes: Vec<usize>,
    pub workers: usize,
    /// Run each primary and its workers on the same machine.
    pub collocate: bool,
    /// Total input rate in transactions per second.
    pub rate: Vec<u64>,
    pub tx_size: usize,
    pub duration_secs: u64,
    pub runs: usize,
    pub mode: DeploymentMode,
    pub client: ClientKind,
    pub profile: CompileProfile,
    pub debug: bool,
}

impl Default for BenchParameters {
    fn default() -> Self {
        Self {
            faults: 0,
            nodes: vec![4],
            workers: 1,
            collocate: true,
            rate: vec![10_000, 110_000],
            tx_size: 512,
            duration_secs: 300,
            runs: 2,
            mode: DeploymentMode::default(),
            client: ClientKind::default(),
            profile: CompileProfile::Release,
            debug: false,
        }
    }
}

impl PersistableConfig for BenchParameters {}

impl BenchParameters {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let Some(min_nodes) = self.nodes.iter().min() else {
            return Err(ConfigError::Missing("nodes".into()));
        };
        if self.rate.is_empty() {
            return Err(ConfigError::Missing("rate".into()));
        }
        if *min_nodes <= self.faults {
            return Err(ConfigError::invalid(
                "faults",
                "there should be more nodes than faults",
            ));
        }
        validate_common(self.workers, self.tx_size, self.duration_secs)?;
        validate_client(self.mode, self.client)?;
        if self.runs == 0 {
            return Err(ConfigError::invalid("runs", "at least one run is required"));
        }
        Ok(())
    }

    pub fn max_nodes(&self) -> usize {
        self.nodes.iter().copied().max().unwrap_or_default()
    }

    /// The shape of the largest cluster of the sweep. Smaller node counts
    /// reuse its committee.
    pub fn shape(&self) -> ClusterShape {
        ClusterShape {
            validators: self.max_nodes(),
            workers: self.workers,
            faults: self.faults,
            collocate: self.collocate,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }
}

/// Parameters of a single benchmark run on the local machine.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LocalBenchParameters {
    pub faults: usize,
    pub nodes: usize,
    pub workers: usize,
    pub rate: u64,
    pub tx_size: usize,
    pub duration_secs: u64,
    pub mode: DeploymentMode,
    pub client: ClientKind,
    pub profile: CompileProfile,
    /// Directory receiving keys, committee and genesis artifacts.
    pub key_dir: PathBuf,
    pub debug: bool,
}

impl Default for LocalBenchParameters {
    fn default() -> Self {
        Self {
            faults: 0,
            nodes: 4,
            workers: 1,
            rate: 50_000,
            tx_size: 512,
            duration_secs: 20,
            mode: DeploymentMode::default(),
            client: ClientKind::default(),
            profile: CompileProfile::Benchmark,
            key_dir: PathBuf::from(".proto"),
            debug: false,
        }
    }
}

impl PersistableConfig for LocalBenchParameters {}

impl LocalBenchParameters {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nodes == 0 {
            return Err(ConfigError::invalid("nodes", "at least one node is required"));
        }
        if self.nodes <= self.faults {
            return Err(ConfigError::invalid(
                "faults",
                "there should be more nodes than faults",
            ));
        }
        validate_common(self.workers, self.tx_size, self.duration_secs)?;
        validate_client(self.mode, self.client)
    }

    pub fn shape(&self) -> ClusterShape {
        ClusterShape {
            validators: self.nodes,
            workers: self.workers,
            faults: self.faults,
            collocate: true,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }
}

fn validate_common(workers: usize, tx_size: usize, duration_secs: u64) -> Result<(), ConfigError> {
    if workers == 0 {
        return Err(ConfigError::invalid("workers", "at least one worker is required"));
    }
    if workers > MAX_WORKERS_PER_AUTHORITY {
        return Err(ConfigError::invalid(
            "workers",
            format!("at most {} workers per authority", MAX_WORKERS_PER_AUTHORITY),
        ));
    }
    if tx_size == 0 {
        return Err(ConfigError::invalid("tx_size", "must be positive"));
    }
    if duration_secs == 0 {
        return Err(ConfigError::invalid("duration_secs", "must be positive"));
    }
    Ok(())
}

fn validate_client(mode: DeploymentMode, client: ClientKind) -> Result<(), ConfigError> {
    if client == ClientKind::Orderbook && mode != DeploymentMode::Node {
        return Err(ConfigError::invalid(
            "client",
            "the orderbook client only drives node deployments",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_parameters_are_valid() {
        BenchParameters::default().validate().unwrap();
        LocalBenchParameters::default().validate().unwrap();
    }

    #[test]
    fn test_faults_must_leave_live_nodes() {
        let parameters = BenchParameters {
            nodes: vec![4, 10],
            faults: 4,
            ..Default::default()
        };
        assert!(matches!(
            parameters.validate(),
            Err(ConfigError::InvalidValue {
                field: "faults",
                ..
            })
        ));

        let parameters = LocalBenchParameters {
            nodes: 3,
            faults: 1,
            ..Default::default()
        };
        parameters.validate().unwrap();
    }

    #[test]
    fn test_missing_and_invalid_fields() {
        let parameters = BenchParameters {
            nodes: vec![],
            ..Default::default()
        };
        assert!(matches!(parameters.validate(), Err(ConfigError::Missing(_))));

        let parameters = BenchParameters {
            workers: MAX_WORKERS_PER_AUTHORITY + 1,
            ..Default::default()
        };
        assert!(parameters.validate().is_err());

        let parameters = BenchParameters {
            runs: 0,
            ..Default::default()
        };
        assert!(parameters.validate().is_err());
    }

    #[test]
    fn test_shape_uses_largest_node_count() {
        let parameters = BenchParameters {
            nodes: vec![4, 10, 7],
            faults: 1,
            collocate: false,
            ..Default::default()
        };
        let shape = parameters.shape();
        assert_eq!(shape.validators, 10);
        assert_eq!(shape.faults, 1);
        assert!(!shape.collocate);
    }

    #[test]
    fn test_parse_parameters() {
        let parameters = BenchParameters::parse_serialized_config(
            "nodes: [4]\nrate: [50000]\nmode: node\nprofile: benchmark\n",
        )
        .unwrap();
        assert_eq!(parameters.mode, DeploymentMode::Node);
        assert_eq!(parameters.profile, CompileProfile::Benchmark);
        assert_eq!(parameters.runs, 2);
        assert_eq!("node".parse::<DeploymentMode>().unwrap(), DeploymentMode::Node);
        assert!("other".parse::<DeploymentMode>().is_err());
    }

    #[test]
    fn test_orderbook_client_needs_node_mode() {
        let parameters = BenchParameters::parse_serialized_config(
            "nodes: [4]\nrate: [1000]\nclient: orderbook\n",
        )
        .unwrap();
        assert_eq!(parameters.client, ClientKind::Orderbook);
        assert!(matches!(
            parameters.validate(),
            Err(ConfigError::InvalidValue {
                field: "client",
                ..
            })
        ));

        let parameters = LocalBenchParameters {
            mode: DeploymentMode::Node,
            client: "orderbook".parse().unwrap(),
            ..Default::default()
        };
        parameters.validate().unwrap();
        assert!("market".parse::<ClientKind>().is_err());
    }
}

// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Committee derivation. Every role of every authority gets an address that
//! is a pure function of its host, the base port, the role and the worker
//! index, so re-deriving a committee from the same placement is reproducible.

use crate::{
    config::{ConfigError, DeploymentMode},
    multiaddr::Multiaddr,
    topology::Placement,
};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::Path,
};
use url::Url;

pub const MAX_WORKERS_PER_AUTHORITY: usize = 30;
pub const DEFAULT_STAKE: u64 = 1;
pub const DEFAULT_BALANCE: u64 = 5_000_000_000_000;
pub const LOCALHOST: &str = "127.0.0.1";

/// Each authority placed on a host owns a slot of this many ports.
pub const PORTS_PER_SLOT: u16 = 100;

// Port offsets within a slot.
const PRIMARY_TO_PRIMARY: u16 = 0;
const WORKER_TO_PRIMARY: u16 = 1;
const NETWORK: u16 = 3;
const RELAYER: u16 = 4;
const JSONRPC: u16 = 5;
const METRICS: u16 = 6;
const FIRST_WORKER: u16 = 10;
const PORTS_PER_WORKER: u16 = 3;

#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct PrimaryAddresses {
    pub primary_to_primary: Multiaddr,
    pub worker_to_primary: Multiaddr,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct WorkerAddresses {
    pub primary_to_worker: Multiaddr,
    /// Where clients submit transactions.
    pub transactions: Multiaddr,
    pub worker_to_worker: Multiaddr,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct AuthorityRecord {
    pub stake: u64,
    pub balance: u64,
    pub primary: PrimaryAddresses,
    pub workers: BTreeMap<u32, WorkerAddresses>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_address: Option<Multiaddr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relayer_address: Option<Multiaddr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsonrpc_address: Option<Multiaddr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_address: Option<Multiaddr>,
}

impl AuthorityRecord {
    pub fn primary_host(&self) -> &str {
        self.primary.primary_to_primary.host()
    }

    /// Every distinct host this authority runs on, primary first.
    pub fn hosts(&self) -> Vec<String> {
        let hosts: IndexSet<&str> = std::iter::once(self.primary_host())
            .chain(self.workers.values().map(|worker| worker.transactions.host()))
            .collect();
        hosts.into_iter().map(str::to_string).collect()
    }

    /// The address clients send transactions to: the validator's network
    /// address in node mode, the first worker otherwise.
    pub fn client_target(&self, mode: DeploymentMode) -> Option<&Multiaddr> {
        match mode {
            DeploymentMode::Node => self.network_address.as_ref(),
            DeploymentMode::Narwhal => self
                .workers
                .values()
                .next()
                .map(|worker| &worker.transactions),
        }
    }

    /// Every address of the authority, used to check for collisions.
    pub fn addresses(&self) -> Vec<&Multiaddr> {
        let mut addresses = vec![
            &self.primary.primary_to_primary,
            &self.primary.worker_to_primary,
        ];
        for worker in self.workers.values() {
            addresses.extend([
                &worker.primary_to_worker,
                &worker.transactions,
                &worker.worker_to_worker,
            ]);
        }
        addresses.extend(
            [
                &self.network_address,
                &self.relayer_address,
                &self.jsonrpc_address,
                &self.metrics_address,
            ]
            .into_iter()
            .flatten(),
        );
        addresses
    }
}

/// Authorities keyed by name, in the order they were built.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
pub struct Committee {
    pub authorities: IndexMap<String, AuthorityRecord>,
}

impl Committee {
    pub fn size(&self) -> usize {
        self.authorities.len()
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.authorities.keys()
    }

    pub fn authority(&self, name: &str) -> Option<&AuthorityRecord> {
        self.authorities.get(name)
    }

    /// A copy without the last `count` authorities. The source is untouched.
    pub fn remove_nodes(&self, count: usize) -> Committee {
        let mut reduced = self.clone();
        reduced
            .authorities
            .truncate(self.size().saturating_sub(count));
        reduced
    }

    /// The authorities that come online: all but the last `faults`.
    pub fn active(&self, faults: usize) -> Committee {
        self.remove_nodes(faults)
    }

    /// Hosts of one authority.
    pub fn ips(&self, name: &str) -> Vec<String> {
        self.authority(name)
            .map(AuthorityRecord::hosts)
            .unwrap_or_default()
    }

    /// Hosts of every authority, each once.
    pub fn all_ips(&self) -> Vec<String> {
        let hosts: IndexSet<String> = self
            .authorities
            .values()
            .flat_map(AuthorityRecord::hosts)
            .collect();
        hosts.into_iter().collect()
    }

    /// Total number of workers across the committee.
    pub fn workers(&self) -> usize {
        self.authorities
            .values()
            .map(|authority| authority.workers.len())
            .sum()
    }

    /// Metrics endpoints of the authorities that expose one.
    pub fn metrics_endpoints(&self) -> IndexMap<String, Url> {
        self.authorities
            .iter()
            .filter_map(|(name, authority)| {
                let url = authority.metrics_address.as_ref()?.to_url().ok()?;
                Some((name.clone(), url))
            })
            .collect()
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self)
            .map_err(|error| ConfigError::Json("committee".into(), error))
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|error| ConfigError::Json("committee".into(), error))
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        fs::write(path, self.to_json()?)
            .map_err(|error| ConfigError::IO(path.display().to_string(), error))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path)
            .map_err(|error| ConfigError::IO(path.display().to_string(), error))?;
        Self::from_json(&json)
    }
}

/// Derives committees from a placement.
#[derive(Clone, Copy, Debug)]
pub struct CommitteeBuilder {
    base_port: u16,
    workers: usize,
    mode: DeploymentMode,
}

impl CommitteeBuilder {
    pub fn new(base_port: u16, workers: usize, mode: DeploymentMode) -> Self {
        Self {
            base_port,
            workers,
            mode,
        }
    }

    /// Builds the committee of `names[i]` placed on `placement`'s i-th hosts.
    ///
    /// Each host hands every authority placed on it its own slot of
    /// [`PORTS_PER_SLOT`] ports, in authority order, so authorities sharing a
    /// machine never collide.
    pub fn build(&self, names: &[String], placement: &Placement) -> Result<Committee, ConfigError> {
        if self.workers == 0 || self.workers > MAX_WORKERS_PER_AUTHORITY {
            return Err(ConfigError::invalid(
                "workers",
                format!("expected 1 to {} workers", MAX_WORKERS_PER_AUTHORITY),
            ));
        }
        if names.len() != placement.len() {
            return Err(ConfigError::invalid(
                "names",
                format!(
                    "{} names for a placement of {} validators",
                    names.len(),
                    placement.len()
                ),
            ));
        }

        let mut next_slot: HashMap<String, u16> = HashMap::new();
        let mut authorities = IndexMap::new();
        for (index, name) in names.iter().enumerate() {
            let hosts = placement
                .hosts_for(index, self.workers)
                .ok_or_else(|| ConfigError::Missing(format!("hosts of validator {}", index)))?;

            // Claim one slot per distinct host of this authority.
            let mut slots: HashMap<&str, u16> = HashMap::new();
            for host in &hosts {
                if !slots.contains_key(host.as_str()) {
                    let slot = next_slot.entry(host.clone()).or_default();
                    slots.insert(host.as_str(), *slot);
                    *slot += 1;
                }
            }
            let address = |host: &str, offset: u16| -> Result<Multiaddr, ConfigError> {
                Ok(Multiaddr::new(host, self.port(slots[host], offset)?))
            };

            let primary_host = hosts[0].as_str();
            let primary = PrimaryAddresses {
                primary_to_primary: address(primary_host, PRIMARY_TO_PRIMARY)?,
                worker_to_primary: address(primary_host, WORKER_TO_PRIMARY)?,
            };
            let mut workers = BTreeMap::new();
            for (id, host) in hosts[1..].iter().enumerate() {
                let base = FIRST_WORKER + id as u16 * PORTS_PER_WORKER;
                workers.insert(id as u32, WorkerAddresses {
                    primary_to_worker: address(host.as_str(), base)?,
                    transactions: address(host.as_str(), base + 1)?,
                    worker_to_worker: address(host.as_str(), base + 2)?,
                });
            }

            let node_address = |offset| match self.mode {
                DeploymentMode::Node => address(primary_host, offset).map(Some),
                DeploymentMode::Narwhal => Ok(None),
            };
            let record = AuthorityRecord {
                stake: DEFAULT_STAKE,
                balance: DEFAULT_BALANCE,
                primary,
                workers,
                network_address: node_address(NETWORK)?,
                relayer_address: node_address(RELAYER)?,
                jsonrpc_address: node_address(JSONRPC)?,
                metrics_address: node_address(METRICS)?,
            };
            authorities.insert(name.clone(), record);
        }
        Ok(Committee { authorities })
    }

    /// Every authority on the local machine.
    pub fn build_local(&self, names: &[String]) -> Result<Committee, ConfigError> {
        let placement = Placement::Collocated(vec![LOCALHOST.to_string(); names.len()]);
        self.build(names, &placement)
    }

    fn port(&self, slot: u16, offset: u16) -> Result<u16, ConfigError> {
        let port = u32::from(self.base_port)
            + u32::from(slot) * u32::from(PORTS_PER_SLOT)
            + u32::from(offset);
        u16::try_from(port).map_err(|_| {
            ConfigError::invalid(
                "base_port",
                format!("port range starting at {} overflows", self.base_port),
            )
        })
    }
}

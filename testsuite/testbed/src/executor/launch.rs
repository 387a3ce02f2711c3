// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Turns an active committee into the processes to start on each host.

use crate::{
    BenchError,
    commands::{CommandBuilder, CompileProfile, NodeArgs},
    committee::Committee,
    config::{ClientKind, ConfigError, DeploymentMode},
    multiaddr::Multiaddr,
    paths::{COMMITTEE_FILE, PARAMETERS_FILE, PathMaker},
};
use indexmap::IndexMap;

/// One detached process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessSpec {
    pub host: String,
    pub command: String,
    pub log_file: String,
}

impl ProcessSpec {
    fn new(host: &str, command: String, log_file: String) -> Self {
        Self {
            host: host.to_string(),
            command,
            log_file,
        }
    }

    pub fn session(&self) -> String {
        PathMaker::session_name(&self.log_file)
    }

    pub fn background_command(&self) -> String {
        CommandBuilder::background(&self.session(), &self.command, &self.log_file)
    }
}

/// Where the artifacts a process reads live, relative to the host's working
/// directory, and how the run is loaded.
#[derive(Clone, Debug)]
pub struct LaunchContext<'a> {
    pub mode: DeploymentMode,
    pub config_dir: &'a str,
    pub execution: &'a str,
    pub tx_size: usize,
    pub rate: u64,
    pub client: ClientKind,
    pub profile: CompileProfile,
    pub debug: bool,
}

impl LaunchContext<'_> {
    fn config_path(&self, file: &str) -> String {
        format!("{}/{}", self.config_dir, file)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchPlan {
    pub nodes: Vec<ProcessSpec>,
    pub clients: Vec<ProcessSpec>,
    /// Addresses polled before clients start.
    pub readiness: Vec<(String, u16)>,
    /// Input rate of each client.
    pub rate_share: u64,
}

impl LaunchPlan {
    pub fn new(active: &Committee, context: &LaunchContext<'_>) -> Result<Self, BenchError> {
        let mut plan = match context.mode {
            DeploymentMode::Narwhal => Self::narwhal(active, context)?,
            DeploymentMode::Node => Self::node(active, context)?,
        };
        if context.profile.records_flamegraph() {
            for node in &mut plan.nodes {
                let output = PathMaker::flamegraph_file(&node.session());
                node.command = CommandBuilder::with_flamegraph(&node.command, &output);
            }
        }
        Ok(plan)
    }

    fn narwhal(active: &Committee, context: &LaunchContext<'_>) -> Result<Self, BenchError> {
        let rate_share = rate_share(context.rate, active.workers())?;
        let committee = context.config_path(COMMITTEE_FILE);
        let parameters = context.config_path(PARAMETERS_FILE);
        let targets: Vec<String> = active
            .authorities
            .values()
            .flat_map(|authority| authority.workers.values())
            .map(|worker| worker.transactions.to_url_data())
            .collect();

        let mut plan = Self::empty(rate_share);
        for (index, authority) in active.authorities.values().enumerate() {
            let keys = context.config_path(&PathMaker::key_file(index));
            plan.nodes.push(ProcessSpec::new(
                authority.primary_host(),
                CommandBuilder::run_primary(
                    &keys,
                    &committee,
                    &PathMaker::db_path(index, None),
                    &parameters,
                    context.execution,
                    context.debug,
                ),
                PathMaker::primary_log_file(index),
            ));
            plan.push_readiness(&authority.primary.primary_to_primary);

            for (id, worker) in &authority.workers {
                let host = worker.transactions.host();
                let worker_index = *id as usize;
                plan.nodes.push(ProcessSpec::new(
                    host,
                    CommandBuilder::run_worker(
                        &keys,
                        &committee,
                        &PathMaker::db_path(index, Some(worker_index)),
                        &parameters,
                        context.execution,
                        *id,
                        context.debug,
                    ),
                    PathMaker::worker_log_file(index, worker_index),
                ));
                plan.push_readiness(&worker.transactions);

                let address = worker.transactions.to_url_data();
                plan.clients.push(ProcessSpec::new(
                    host,
                    CommandBuilder::run_client(
                        &address,
                        context.tx_size,
                        rate_share,
                        context.execution,
                        &peers(&targets, &address),
                    ),
                    PathMaker::client_log_file(index, worker_index),
                ));
            }
        }
        Ok(plan)
    }

    fn node(active: &Committee, context: &LaunchContext<'_>) -> Result<Self, BenchError> {
        let rate_share = rate_share(context.rate, active.size())?;
        let mut addresses = IndexMap::new();
        for (name, authority) in &active.authorities {
            let field = |address: &Option<Multiaddr>, role: &str| {
                address
                    .clone()
                    .ok_or_else(|| ConfigError::Missing(format!("{} address of {}", role, name)))
            };
            addresses.insert(name.as_str(), NodeAddresses {
                network: field(&authority.network_address, "network")?,
                relayer: field(&authority.relayer_address, "relayer")?,
                jsonrpc: field(&authority.jsonrpc_address, "jsonrpc")?,
                metrics: field(&authority.metrics_address, "metrics")?,
            });
        }
        let targets: Vec<String> = addresses
            .values()
            .map(|node| node.network.to_url_data())
            .collect();

        let mut plan = Self::empty(rate_share);
        for (index, (&name, node)) in addresses.iter().enumerate() {
            let host = node.network.host();
            let key_path = context.config_path(&PathMaker::key_file(index));
            let db_dir = PathMaker::db_path(index, None);
            let network = node.network.bind_any().to_string();
            let relayer = node.relayer.bind_any().to_string();
            let metrics = node.metrics.bind_any().to_string();
            let jsonrpc = node.jsonrpc.bind_any().to_string();
            let args = NodeArgs {
                db_dir: &db_dir,
                genesis_dir: context.config_dir,
                key_path: &key_path,
                name,
                network_address: &network,
                relayer_address: &relayer,
                metrics_address: &metrics,
                jsonrpc_address: &jsonrpc,
            };
            plan.nodes.push(ProcessSpec::new(
                host,
                CommandBuilder::run_node(&args, context.debug),
                PathMaker::primary_log_file(index),
            ));
            plan.push_readiness(&node.network);

            let address = node.network.to_url_data();
            let relayer = node.relayer.to_url_data();
            let others = peers(&targets, &address);
            let command = match context.client {
                ClientKind::Transfer => CommandBuilder::run_node_client(
                    &address,
                    &relayer,
                    &key_path,
                    rate_share,
                    &others,
                ),
                ClientKind::Orderbook => CommandBuilder::run_orderbook_client(
                    &address,
                    &relayer,
                    &key_path,
                    rate_share,
                    &others,
                ),
            };
            plan.clients.push(ProcessSpec::new(
                host,
                command,
                PathMaker::client_log_file(index, 0),
            ));
        }
        Ok(plan)
    }

    fn empty(rate_share: u64) -> Self {
        Self {
            nodes: vec![],
            clients: vec![],
            readiness: vec![],
            rate_share,
        }
    }

    fn push_readiness(&mut self, address: &Multiaddr) {
        self.readiness
            .push((address.host().to_string(), address.port()));
    }
}

struct NodeAddresses {
    network: Multiaddr,
    relayer: Multiaddr,
    jsonrpc: Multiaddr,
    metrics: Multiaddr,
}

/// `ceil(rate / clients)`.
fn rate_share(rate: u64, clients: usize) -> Result<u64, BenchError> {
    if clients == 0 {
        return Err(ConfigError::invalid("nodes", "no active client to load").into());
    }
    Ok(rate.div_ceil(clients as u64))
}

fn peers(targets: &[String], own: &str) -> Vec<String> {
    targets
        .iter()
        .filter(|target| target.as_str() != own)
        .cloned()
        .collect()
}

// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

mod metrics;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::{
    path::{Path, PathBuf},
    process,
};
use testbed::{
    BenchError, BenchParameters, ClientKind, Committee, CompileProfile, DeploymentMode, LocalBench,
    LocalBenchParameters, NodeParameters, PersistableConfig, RemoteBench, Settings,
    config::DEFAULT_SETTINGS_FILE,
    display,
    paths::COMMITTEE_FILE,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[clap(name = "testbed", author, version, about = "Validator network benchmark testbed")]
struct Args {
    /// Testbed settings (ssh access, repository, inventory)
    #[clap(long, global = true, default_value = DEFAULT_SETTINGS_FILE)]
    settings: PathBuf,

    /// Log at debug level unless RUST_LOG says otherwise
    #[clap(short, long, global = true)]
    verbose: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Install rust and clone the repository on every host of the inventory
    Install,
    /// Print the inventory and how to reach each host
    Info,
    /// Run one benchmark on this machine
    Local(LocalArgs),
    /// Run a benchmark sweep on the remote testbed
    Remote(RemoteArgs),
    /// Bring up a long-lived network on the remote testbed, without clients
    Deploy(RemoteArgs),
    /// Stop every process on the inventory hosts
    Kill {
        /// Also delete the remote logs
        #[clap(long)]
        delete_logs: bool,
    },
    /// Download and aggregate the logs of the last remote run
    Logs(RemoteArgs),
    /// Scrape validator metrics endpoints
    #[clap(subcommand)]
    Metrics(metrics::MetricsCommand),
}

#[derive(Parser, Debug)]
struct LocalArgs {
    /// Local benchmark parameters (YAML). Defaults apply when omitted
    #[clap(long)]
    parameters: Option<PathBuf>,
    /// Node parameters (JSON) forwarded to the nodes
    #[clap(long)]
    node_parameters: Option<PathBuf>,
    #[clap(long)]
    nodes: Option<usize>,
    #[clap(long)]
    faults: Option<usize>,
    #[clap(long)]
    workers: Option<usize>,
    /// Total input rate in tx/s
    #[clap(long)]
    rate: Option<u64>,
    #[clap(long)]
    duration_secs: Option<u64>,
    #[clap(long)]
    mode: Option<DeploymentMode>,
    /// Load generator of node deployments: transfer or orderbook
    #[clap(long)]
    client: Option<ClientKind>,
    /// release, benchmark, memory_profiling or flamegraph
    #[clap(long)]
    profile: Option<CompileProfile>,
    /// Checkout to build, relative to the working directory
    #[clap(long, default_value = "..")]
    repo_root: PathBuf,
    #[clap(long)]
    debug: bool,
}

impl LocalArgs {
    fn parameters(&self) -> Result<LocalBenchParameters, BenchError> {
        let mut parameters = match &self.parameters {
            Some(path) => LocalBenchParameters::load_config(path)?,
            None => LocalBenchParameters::default(),
        };
        if let Some(nodes) = self.nodes {
            parameters.nodes = nodes;
        }
        if let Some(faults) = self.faults {
            parameters.faults = faults;
        }
        if let Some(workers) = self.workers {
            parameters.workers = workers;
        }
        if let Some(rate) = self.rate {
            parameters.rate = rate;
        }
        if let Some(duration_secs) = self.duration_secs {
            parameters.duration_secs = duration_secs;
        }
        if let Some(mode) = self.mode {
            parameters.mode = mode;
        }
        if let Some(client) = self.client {
            parameters.client = client;
        }
        if let Some(profile) = self.profile {
            parameters.profile = profile;
        }
        parameters.debug |= self.debug;
        Ok(parameters)
    }
}

#[derive(Parser, Debug)]
struct RemoteArgs {
    /// Sweep parameters (YAML). Defaults apply when omitted
    #[clap(long)]
    parameters: Option<PathBuf>,
    /// Node parameters (JSON) forwarded to the nodes
    #[clap(long)]
    node_parameters: Option<PathBuf>,
}

impl RemoteArgs {
    fn parameters(&self) -> Result<BenchParameters, BenchError> {
        Ok(match &self.parameters {
            Some(path) => BenchParameters::load_config(path)?,
            None => BenchParameters::default(),
        })
    }
}

fn node_parameters(path: Option<&Path>) -> Result<NodeParameters, BenchError> {
    Ok(match path {
        Some(path) => NodeParameters::load(path)?,
        None => NodeParameters::default(),
    })
}

fn load_settings(path: &Path) -> Result<Settings, BenchError> {
    let settings = Settings::load_config(path)?;
    settings.validate()?;
    Ok(settings)
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(args).await {
        Ok(()) => Ok(()),
        Err(error) => match error.downcast_ref::<BenchError>() {
            Some(bench_error) => {
                display::error(bench_error);
                if bench_error.is_configuration() {
                    process::exit(1);
                }
                Ok(())
            },
            None => Err(error),
        },
    }
}

async fn run(args: Args) -> Result<()> {
    match args.command {
        Command::Install => {
            let bench = RemoteBench::new(load_settings(&args.settings)?);
            bench.install().await?;
        },
        Command::Info => info(&load_settings(&args.settings)?),
        Command::Local(local) => {
            let bench = LocalBench::new(
                local.parameters()?,
                node_parameters(local.node_parameters.as_deref())?,
                ".",
            )
            .with_repo_root(&local.repo_root);
            let report = bench.run().await?;
            display::info(&report.result());
        },
        Command::Remote(remote) => {
            let bench = RemoteBench::new(load_settings(&args.settings)?);
            let parameters = remote.parameters()?;
            let node_parameters = node_parameters(remote.node_parameters.as_deref())?;
            let report = bench.run(&parameters, &node_parameters).await?;
            display::heading(&format!(
                "\nSweep finished: {} runs succeeded, {} failed",
                report.succeeded(),
                report.failed()
            ));
        },
        Command::Deploy(remote) => {
            let bench = RemoteBench::new(load_settings(&args.settings)?);
            let parameters = remote.parameters()?;
            let node_parameters = node_parameters(remote.node_parameters.as_deref())?;
            let committee = bench.deploy(&parameters, &node_parameters).await?;
            for (name, url) in committee.metrics_endpoints() {
                display::info(&format!("{}: metrics at {}", name, url));
            }
        },
        Command::Kill { delete_logs } => {
            let bench = RemoteBench::new(load_settings(&args.settings)?);
            display::heading("Killing nodes...");
            let result = bench.kill(None, delete_logs).await;
            for (host, failure) in &result.failed {
                display::warn(&format!("{}: {}", host, failure.detail));
            }
        },
        Command::Logs(remote) => {
            let settings = load_settings(&args.settings)?;
            let committee = Committee::load(&settings.local_config_dir().join(COMMITTEE_FILE))
                .map_err(BenchError::from)?;
            let parameters = remote.parameters()?;
            let bench = RemoteBench::new(settings);
            let report = bench.logs(&committee, &parameters).await?;
            display::info(&report.result());
        },
        Command::Metrics(command) => metrics::run(command).await?,
    }
    Ok(())
}

fn info(settings: &Settings) {
    display::heading("Testbed inventory");
    let key = settings.ssh.key_path.display();
    for (region, hosts) in settings.inventory.iter() {
        display::info(&format!("\n {} ({} hosts)", region, hosts.len()));
        for (index, host) in hosts.iter().enumerate() {
            display::info(&format!(
                "  {}\tssh -i {} {}@{}",
                index, key, settings.ssh.user, host
            ));
        }
    }
    display::info(&format!(
        "\n {} hosts across {} regions, repository {} ({})",
        settings.inventory.total_hosts(),
        settings.inventory.region_count(),
        settings.repo.name,
        settings.repo.branch
    ));
}

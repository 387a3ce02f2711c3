// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    BenchError,
    commands::{CommandBuilder, CompileProfile},
    committee::{Committee, CommitteeBuilder},
    config::{BenchParameters, NodeParameters, Settings},
    display,
    executor::{
        FailurePolicy, GenesisCeremony, GroupResult, HostFailure, LaunchContext, LaunchPlan,
        LocalTransport, OutputCheck, ProcessSpec, SshTransport, SweepReport, Transport,
        check_output, fan_out, run_group, run_local, wait_for_all, wait_for_duration,
    },
    logs::{LogAggregator, LogFile, LogInventory, LogReport, LogSet},
    paths::PathMaker,
    topology::{self, InsufficientHosts, Placement},
};
use indexmap::{IndexMap, IndexSet};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::time::sleep;
use tracing::{info, warn};

/// Benchmarks a fleet of remote hosts. Local steps (build, genesis, log
/// parsing) run through `local` from `local_root`; host steps go through
/// `remote`.
pub struct RemoteBench {
    settings: Settings,
    remote: Arc<dyn Transport>,
    local: Arc<dyn Transport>,
    local_root: PathBuf,
    aggregator: Arc<dyn LogAggregator>,
}

impl RemoteBench {
    /// Reaches hosts over ssh and works locally from the current directory.
    pub fn new(settings: Settings) -> Self {
        let remote = Arc::new(SshTransport::new(&settings.ssh));
        let local = Arc::new(LocalTransport::new("."));
        Self::with_transports(settings, remote, local, PathBuf::from("."))
    }

    pub fn with_transports(
        settings: Settings,
        remote: Arc<dyn Transport>,
        local: Arc<dyn Transport>,
        local_root: PathBuf,
    ) -> Self {
        Self {
            settings,
            remote,
            local,
            local_root,
            aggregator: Arc::new(LogInventory),
        }
    }

    pub fn with_aggregator(mut self, aggregator: Arc<dyn LogAggregator>) -> Self {
        self.aggregator = aggregator;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Bootstraps every host of the inventory.
    pub async fn install(&self) -> Result<(), BenchError> {
        display::heading("Installing rust and cloning the repo...");
        let hosts = self.settings.inventory.flat();
        let command = CommandBuilder::chain(&CommandBuilder::install(
            &self.settings.repo.url,
            &self.settings.repo.name,
        ));
        run_group(self.remote.as_ref(), &hosts, &command, OutputCheck::ExitStatusAndErrors)
            .await
            .into_result("Failed to install repo on testbed")?;
        display::info(&format!("Initialized testbed of {} hosts", hosts.len()));
        Ok(())
    }

    /// Stops every process on `hosts`, or on the whole inventory. Never
    /// fails; unreachable hosts are reported in the result.
    pub async fn kill(&self, hosts: Option<&[String]>, delete_logs: bool) -> GroupResult {
        let hosts = hosts
            .map(<[String]>::to_vec)
            .unwrap_or_else(|| self.settings.inventory.flat());
        run_group(
            self.remote.as_ref(),
            &hosts,
            &CommandBuilder::kill_all(delete_logs),
            OutputCheck::ExitStatus,
        )
        .await
        .with_policy(FailurePolicy::BestEffort, "Failed to kill nodes")
        .unwrap_or_default()
    }

    pub fn select_hosts(
        &self,
        parameters: &BenchParameters,
    ) -> Result<Placement, InsufficientHosts> {
        topology::plan(&self.settings.inventory, &parameters.shape())
    }

    /// Checks out the configured branch on the selected hosts and rebuilds.
    pub async fn update(
        &self,
        placement: &Placement,
        profile: CompileProfile,
    ) -> Result<(), BenchError> {
        let hosts = placement.unique_hosts();
        display::info(&format!(
            "Updating {} machines (branch '{}')...",
            hosts.len(),
            self.settings.repo.branch
        ));
        let command = CommandBuilder::chain(&CommandBuilder::update(
            &self.settings.repo.name,
            &self.settings.repo.branch,
            profile,
        ));
        run_group(self.remote.as_ref(), &hosts, &command, OutputCheck::ExitStatusAndErrors)
            .await
            .into_result("Failed to update nodes")?;
        Ok(())
    }

    /// Generates keys, committee and genesis locally, then ships each
    /// non-faulty authority its artifacts. Faulty authorities get nothing.
    pub async fn config(
        &self,
        placement: &Placement,
        parameters: &BenchParameters,
        node_parameters: &NodeParameters,
    ) -> Result<Committee, BenchError> {
        display::info("Generating configuration files...");
        let ceremony = GenesisCeremony::new(
            self.local.as_ref(),
            &self.local_root,
            &self.settings.config_dir,
            parameters.mode,
        );
        ceremony
            .prepare(&self.settings.local_repo_root, parameters.profile)
            .await?;
        let builder =
            CommitteeBuilder::new(self.settings.base_port, parameters.workers, parameters.mode);
        let committee = ceremony.run(placement, &builder, node_parameters).await?;

        display::info("Uploading config files...");
        let active = committee.active(parameters.faults);
        let mut uploads: IndexMap<String, IndexSet<PathBuf>> = IndexMap::new();
        for (index, name) in active.names().enumerate() {
            for host in active.ips(name) {
                uploads
                    .entry(host)
                    .or_default()
                    .extend(ceremony.artifacts(index));
            }
        }
        let hosts: Vec<String> = uploads.keys().cloned().collect();
        let remote_dir = self.settings.remote_config_dir();
        fan_out(&hosts, |host| {
            let files = &uploads[host];
            let remote_dir = remote_dir.as_str();
            async move { self.upload_config(host, files, remote_dir).await }
        })
        .await
        .into_result("Failed to configure nodes")?;
        Ok(committee)
    }

    async fn upload_config(
        &self,
        host: &str,
        files: &IndexSet<PathBuf>,
        remote_dir: &str,
    ) -> Result<(), HostFailure> {
        let reset = self
            .remote
            .execute(host, &CommandBuilder::reset_config_dir(remote_dir))
            .await;
        check_output(reset, OutputCheck::ExitStatus)?;
        for file in files {
            self.remote.upload(host, file, remote_dir).await?;
        }
        Ok(())
    }

    /// One run of `committee` at `rate`: boot nodes, wait for them, boot the
    /// clients, let the benchmark run for its duration and kill everything.
    /// Processes are killed whatever the outcome.
    pub async fn run_single(
        &self,
        committee: &Committee,
        rate: u64,
        parameters: &BenchParameters,
        node_parameters: &NodeParameters,
    ) -> Result<(), BenchError> {
        let hosts = committee.all_ips();
        self.kill(Some(&hosts), true).await;
        let result = self
            .boot_and_run(committee, rate, parameters, node_parameters)
            .await;
        self.kill(Some(&hosts), false).await;
        result
    }

    async fn boot_and_run(
        &self,
        committee: &Committee,
        rate: u64,
        parameters: &BenchParameters,
        node_parameters: &NodeParameters,
    ) -> Result<(), BenchError> {
        let plan = self.plan(committee, rate, parameters, node_parameters)?;
        display::info("Booting nodes...");
        self.boot(&plan.nodes, "Failed to boot nodes").await?;
        self.await_readiness(&plan).await;

        display::info("Booting clients...");
        self.boot(&plan.clients, "Failed to boot clients").await?;

        info!(
            "Running {} clients at {} tx/s each for {:?}",
            plan.clients.len(),
            plan.rate_share,
            parameters.duration()
        );
        wait_for_duration(
            parameters.duration(),
            &format!("Running benchmark ({} sec)", parameters.duration_secs),
        )
        .await;
        Ok(())
    }

    fn plan(
        &self,
        committee: &Committee,
        rate: u64,
        parameters: &BenchParameters,
        node_parameters: &NodeParameters,
    ) -> Result<LaunchPlan, BenchError> {
        let remote_dir = self.settings.remote_config_dir();
        let context = LaunchContext {
            mode: parameters.mode,
            config_dir: &remote_dir,
            execution: node_parameters.execution(),
            tx_size: parameters.tx_size,
            rate,
            client: parameters.client,
            profile: parameters.profile,
            debug: parameters.debug,
        };
        LaunchPlan::new(&committee.active(parameters.faults), &context)
    }

    /// Starts `specs` detached. Hosts boot concurrently; the processes of
    /// one host start in order, `settle_delay` apart.
    async fn boot(&self, specs: &[ProcessSpec], context: &str) -> Result<(), BenchError> {
        let mut by_host: IndexMap<String, Vec<&ProcessSpec>> = IndexMap::new();
        for spec in specs {
            by_host.entry(spec.host.clone()).or_default().push(spec);
        }
        let hosts: Vec<String> = by_host.keys().cloned().collect();
        let delay = self.settings.settle_delay();
        fan_out(&hosts, |host| {
            let specs = &by_host[host];
            async move {
                for (position, spec) in specs.iter().enumerate() {
                    if position > 0 && !delay.is_zero() {
                        sleep(delay).await;
                    }
                    let outcome = self.remote.execute(host, &spec.background_command()).await;
                    check_output(outcome, OutputCheck::ExitStatusAndStderr)?;
                }
                Ok(())
            }
        })
        .await
        .into_result(context)?;
        Ok(())
    }

    async fn await_readiness(&self, plan: &LaunchPlan) {
        let readiness = &self.settings.readiness;
        let missing = wait_for_all(
            &plan.readiness,
            readiness.timeout(),
            readiness.poll_interval(),
        )
        .await;
        if !missing.is_empty() {
            display::warn(&format!(
                "{} of {} node addresses not reachable after {} sec, starting clients anyway",
                missing.len(),
                plan.readiness.len(),
                readiness.timeout_secs
            ));
        }
    }

    /// Downloads the logs of the active authorities of `committee` into the
    /// local logs directory and aggregates them.
    pub async fn logs(
        &self,
        committee: &Committee,
        parameters: &BenchParameters,
    ) -> Result<LogReport, BenchError> {
        run_local(
            self.local.as_ref(),
            "Failed to clean logs",
            &CommandBuilder::clean_logs(),
        )
        .await?;

        let expected = LogSet::expected(&committee.active(parameters.faults), parameters.mode);
        let mut by_host: IndexMap<String, Vec<&LogFile>> = IndexMap::new();
        for file in expected.files() {
            by_host.entry(file.host.clone()).or_default().push(file);
        }
        let hosts: Vec<String> = by_host.keys().cloned().collect();
        display::info(&format!(
            "Downloading {} log files from {} hosts...",
            expected.len(),
            hosts.len()
        ));
        fan_out(&hosts, |host| {
            let files = &by_host[host];
            async move {
                for file in files {
                    let local = self.local_root.join(&file.path);
                    self.remote.download(host, &file.path, &local).await?;
                }
                Ok(())
            }
        })
        .await
        .into_result("Failed to download logs")?;

        display::info("Parsing logs...");
        self.aggregator
            .aggregate(&self.local_root, &expected, parameters.faults)
    }

    /// Runs the whole sweep. A failed run is reported, its hosts killed, and
    /// the sweep moves on; only configuration, update and config failures
    /// abort it.
    pub async fn run(
        &self,
        parameters: &BenchParameters,
        node_parameters: &NodeParameters,
    ) -> Result<SweepReport, BenchError> {
        display::heading("Starting remote benchmark");
        parameters.validate()?;
        node_parameters.validate(parameters.mode)?;

        let placement = match self.select_hosts(parameters) {
            Ok(placement) => placement,
            Err(error) => {
                warn!("{}", error);
                display::warn(&error.to_string());
                return Ok(SweepReport::default());
            },
        };
        self.update(&placement, parameters.profile).await?;
        let committee = self.config(&placement, parameters, node_parameters).await?;
        let hosts = placement.unique_hosts();

        let mut report = SweepReport::default();
        for &nodes in &parameters.nodes {
            let reduced = committee.remove_nodes(committee.size().saturating_sub(nodes));
            for &rate in &parameters.rate {
                display::heading(&format!("\nRunning {} nodes (input rate: {} tx/s)", nodes, rate));
                for run in 0..parameters.runs {
                    display::heading(&format!("Run {}/{}", run + 1, parameters.runs));
                    match self
                        .run_once(&reduced, rate, parameters, node_parameters)
                        .await
                    {
                        Ok(path) => {
                            display::info(&format!("Results written to {}", path.display()));
                            report.record(nodes, rate, run, Ok(path));
                        },
                        Err(error) => {
                            display::error(&error);
                            self.kill(Some(&hosts), false).await;
                            report.record(nodes, rate, run, Err(error.to_string()));
                        },
                    }
                }
            }
        }
        Ok(report)
    }

    async fn run_once(
        &self,
        committee: &Committee,
        rate: u64,
        parameters: &BenchParameters,
        node_parameters: &NodeParameters,
    ) -> Result<PathBuf, BenchError> {
        self.run_single(committee, rate, parameters, node_parameters)
            .await?;
        let report = self.logs(committee, parameters).await?;
        let path = self.local_root.join(PathMaker::result_file(
            parameters.faults,
            committee.size(),
            parameters.workers,
            parameters.collocate,
            rate,
            parameters.tx_size,
        ));
        report.write(&path, &result_header(committee.size(), rate, parameters))?;
        Ok(path)
    }

    /// Brings up a long-lived network of the largest committee of
    /// `parameters`, without clients, and leaves it running.
    pub async fn deploy(
        &self,
        parameters: &BenchParameters,
        node_parameters: &NodeParameters,
    ) -> Result<Committee, BenchError> {
        display::heading("Deploying network");
        parameters.validate()?;
        node_parameters.validate(parameters.mode)?;

        let placement = self.select_hosts(parameters)?;
        self.update(&placement, parameters.profile).await?;
        let committee = self.config(&placement, parameters, node_parameters).await?;

        let hosts = committee.all_ips();
        self.kill(Some(&hosts), true).await;
        let plan = self.plan(&committee, 0, parameters, node_parameters)?;
        if let Err(error) = self.boot(&plan.nodes, "Failed to boot nodes").await {
            self.kill(Some(&hosts), false).await;
            return Err(error);
        }
        self.await_readiness(&plan).await;
        display::info(&format!("Network of {} validators is up", committee.size()));
        Ok(committee)
    }

    pub fn local_root(&self) -> &Path {
        &self.local_root
    }
}

fn result_header(nodes: usize, rate: u64, parameters: &BenchParameters) -> String {
    format!(
        " + PARAMETERS:\n Mode: {}\n Nodes: {}\n Workers per node: {}\n Collocate: {}\n \
         Input rate: {} tx/s\n Transaction size: {} B\n Duration: {} s\n\n",
        parameters.mode,
        nodes,
        parameters.workers,
        parameters.collocate,
        rate,
        parameters.tx_size,
        parameters.duration_secs
    )
}

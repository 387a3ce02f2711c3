// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    BenchError,
    commands::CommandBuilder,
    committee::{Committee, CommitteeBuilder, LOCALHOST},
    config::{LocalBenchParameters, NodeParameters, ReadinessSettings},
    display,
    executor::{
        GenesisCeremony, LOCAL_HOST, LaunchContext, LaunchPlan, LocalTransport, OutputCheck,
        ProcessSpec, Transport, check_output, run_local, wait_for_all, wait_for_duration,
    },
    logs::{LogAggregator, LogInventory, LogReport, LogSet},
    paths::COMMITTEE_FILE,
    topology::Placement,
};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::warn;

/// Benchmarks a committee running entirely on this machine.
pub struct LocalBench {
    parameters: LocalBenchParameters,
    node_parameters: NodeParameters,
    root: PathBuf,
    repo_root: PathBuf,
    transport: Arc<dyn Transport>,
    aggregator: Arc<dyn LogAggregator>,
    readiness: ReadinessSettings,
}

impl LocalBench {
    pub const BASE_PORT: u16 = 3000;

    /// Works from `root`, building the checkout found in its parent.
    pub fn new(
        parameters: LocalBenchParameters,
        node_parameters: NodeParameters,
        root: impl Into<PathBuf>,
    ) -> Self {
        let root = root.into();
        Self {
            parameters,
            node_parameters,
            repo_root: PathBuf::from(".."),
            transport: Arc::new(LocalTransport::new(root.clone())),
            aggregator: Arc::new(LogInventory),
            readiness: ReadinessSettings::default(),
            root,
        }
    }

    /// Relative to the working directory.
    pub fn with_repo_root(mut self, repo_root: impl Into<PathBuf>) -> Self {
        self.repo_root = repo_root.into();
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_aggregator(mut self, aggregator: Arc<dyn LogAggregator>) -> Self {
        self.aggregator = aggregator;
        self
    }

    pub fn with_readiness(mut self, readiness: ReadinessSettings) -> Self {
        self.readiness = readiness;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Runs the benchmark once. Whatever happens, every process it started is
    /// killed before returning.
    pub async fn run(&self) -> Result<LogReport, BenchError> {
        display::heading("Starting local benchmark");
        self.parameters.validate()?;
        self.node_parameters.validate(self.parameters.mode)?;
        self.kill().await;

        let result = self.run_inner().await;
        self.kill().await;
        result
    }

    async fn run_inner(&self) -> Result<LogReport, BenchError> {
        let parameters = &self.parameters;
        display::info("Setting up testbed...");
        run_local(
            self.transport.as_ref(),
            "Failed to clean logs",
            &CommandBuilder::clean_logs(),
        )
        .await?;

        let key_dir = parameters.key_dir.display().to_string();
        let ceremony = GenesisCeremony::new(
            self.transport.as_ref(),
            &self.root,
            &key_dir,
            parameters.mode,
        );
        ceremony.prepare(&self.repo_root, parameters.profile).await?;
        let builder = CommitteeBuilder::new(Self::BASE_PORT, parameters.workers, parameters.mode);
        let placement = Placement::Collocated(vec![LOCALHOST.to_string(); parameters.nodes]);
        let committee = ceremony
            .run(&placement, &builder, &self.node_parameters)
            .await?;
        let active = committee.active(parameters.faults);

        let context = LaunchContext {
            mode: parameters.mode,
            config_dir: &key_dir,
            execution: self.node_parameters.execution(),
            tx_size: parameters.tx_size,
            rate: parameters.rate,
            client: parameters.client,
            profile: parameters.profile,
            debug: parameters.debug,
        };
        let plan = LaunchPlan::new(&active, &context)?;

        display::info("Booting nodes...");
        self.boot(&plan.nodes, "Failed to boot nodes").await?;
        let missing = wait_for_all(
            &plan.readiness,
            self.readiness.timeout(),
            self.readiness.poll_interval(),
        )
        .await;
        if !missing.is_empty() {
            display::warn(&format!(
                "{} node addresses not ready, starting clients anyway",
                missing.len()
            ));
        }

        display::info("Booting clients...");
        self.boot(&plan.clients, "Failed to boot clients").await?;
        wait_for_duration(
            parameters.duration(),
            &format!("Running benchmark ({} sec)", parameters.duration_secs),
        )
        .await;
        self.kill().await;

        display::info("Parsing logs...");
        self.aggregator.aggregate(
            &self.root,
            &LogSet::expected(&active, parameters.mode),
            parameters.faults,
        )
    }

    async fn boot(&self, specs: &[ProcessSpec], context: &str) -> Result<(), BenchError> {
        for spec in specs {
            let outcome = self
                .transport
                .execute(LOCAL_HOST, &spec.background_command())
                .await;
            check_output(outcome, OutputCheck::ExitStatusAndStderr)
                .map_err(|failure| BenchError::local(context, failure.detail))?;
        }
        Ok(())
    }

    /// Kills every local session. A missing tmux server is not an error.
    pub async fn kill(&self) {
        if let Err(error) = run_local(
            self.transport.as_ref(),
            "Failed to kill testbed",
            &CommandBuilder::kill_all(false),
        )
        .await
        {
            warn!("{}", error);
        }
    }

    /// The committee of the last ceremony, as written to the key directory.
    pub fn committee(&self) -> Result<Committee, BenchError> {
        let path = self
            .root
            .join(&self.parameters.key_dir)
            .join(COMMITTEE_FILE);
        Ok(Committee::load(&path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::DeploymentMode, executor::mock::MockTransport};

    fn parameters(mode: DeploymentMode) -> LocalBenchParameters {
        LocalBenchParameters {
            faults: 1,
            nodes: 4,
            workers: 2,
            rate: 60_000,
            duration_secs: 10,
            mode,
            ..Default::default()
        }
    }

    fn bench(dir: &Path, transport: Arc<MockTransport>, mode: DeploymentMode) -> LocalBench {
        LocalBench::new(parameters(mode), NodeParameters::default(), dir)
            .with_transport(transport)
            .with_readiness(ReadinessSettings {
                timeout_secs: 0,
                poll_interval_ms: 10,
            })
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_narwhal_run() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::new().with_root(dir.path()));
        let bench = bench(dir.path(), transport.clone(), DeploymentMode::Narwhal);

        let report = bench.run().await.unwrap();
        // Three active authorities with two workers: a primary, two workers
        // and two clients each.
        assert_eq!(report.files.len(), 15);
        assert_eq!(report.committee_size, 4);
        assert_eq!(bench.committee().unwrap().size(), 4);

        let commands = transport.executed();
        assert_eq!(commands.first().unwrap(), &CommandBuilder::kill_all(false));
        assert_eq!(commands.last().unwrap(), &CommandBuilder::kill_all(false));
        let clients: Vec<_> = commands
            .iter()
            .filter(|c| c.contains("./benchmark-client"))
            .collect();
        assert_eq!(clients.len(), 6);
        assert!(clients.iter().all(|c| c.contains("--rate 10000")));
        assert!(commands.iter().any(|c| c.contains("--keys .proto/validator-2.key")));
        assert!(commands.iter().all(|c| !c.contains("--keys .proto/validator-3.key")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_failure_kills_and_reports() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(
            MockTransport::new()
                .with_root(dir.path())
                .stderr_on("benchmark-node-client", "duplicate session: client-0-0"),
        );
        let bench = bench(dir.path(), transport.clone(), DeploymentMode::Node);

        let error = bench.run().await.unwrap_err();
        assert_eq!(
            error.to_string(),
            "Failed to boot clients: duplicate session: client-0-0"
        );
        assert_eq!(transport.executed().last().unwrap(), &CommandBuilder::kill_all(false));
    }

    #[tokio::test]
    async fn test_invalid_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::new());
        let bench = LocalBench::new(
            LocalBenchParameters {
                faults: 4,
                ..parameters(DeploymentMode::Node)
            },
            NodeParameters::default(),
            dir.path(),
        )
        .with_transport(transport.clone());
        assert!(bench.run().await.unwrap_err().is_configuration());
        assert!(transport.calls().is_empty());
    }
}

// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Every shell command the testbed issues is built here. Nothing else in the
//! crate formats command lines.

use crate::{
    committee::{AuthorityRecord, WorkerAddresses},
    config::{ConfigError, DeploymentMode},
    paths::{COMMITTEE_DIR, LOGS_DIR, RESULTS_DIR, SIGNATURES_DIR},
};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

pub const NODE_BINARY: &str = "validator-node";
pub const NARWHAL_BINARY: &str = "narwhal-node";
pub const CLIENT_BINARY: &str = "benchmark-client";
pub const NODE_CLIENT_BINARY: &str = "benchmark-node-client";
pub const ORDERBOOK_CLIENT_BINARY: &str = "benchmark-orderbook-client";
pub const GENESIS_BINARY: &str = "validator-genesis";

pub const BINARIES: &[&str] = &[
    NODE_BINARY,
    NARWHAL_BINARY,
    CLIENT_BINARY,
    NODE_CLIENT_BINARY,
    ORDERBOOK_CLIENT_BINARY,
    GENESIS_BINARY,
];

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompileProfile {
    #[default]
    Release,
    /// Release build with the `benchmark` feature, which makes nodes log the
    /// events the log aggregator needs.
    Benchmark,
    /// Heap profiling build.
    MemoryProfiling,
    /// Benchmark build with debug symbols. Node processes run under
    /// `flamegraph` and leave an svg per process in the results directory.
    Flamegraph,
}

impl CompileProfile {
    pub fn cargo_args(&self) -> Vec<&'static str> {
        match self {
            CompileProfile::Release => vec!["--release"],
            CompileProfile::Benchmark => vec!["--release", "--features", "benchmark"],
            CompileProfile::MemoryProfiling => vec![
                "--profile",
                "bench-profiling",
                "--features",
                "benchmark dhat-heap",
            ],
            CompileProfile::Flamegraph => {
                vec!["--profile", "bench-profiling", "--features", "benchmark"]
            },
        }
    }

    /// Directory under `target/` holding the build output.
    pub fn target_dir(&self) -> &'static str {
        match self {
            CompileProfile::Release | CompileProfile::Benchmark => "release",
            CompileProfile::MemoryProfiling | CompileProfile::Flamegraph => "bench-profiling",
        }
    }

    pub fn records_flamegraph(&self) -> bool {
        matches!(self, CompileProfile::Flamegraph)
    }
}

impl fmt::Display for CompileProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileProfile::Release => write!(f, "release"),
            CompileProfile::Benchmark => write!(f, "benchmark"),
            CompileProfile::MemoryProfiling => write!(f, "memory_profiling"),
            CompileProfile::Flamegraph => write!(f, "flamegraph"),
        }
    }
}

impl FromStr for CompileProfile {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "release" => Ok(CompileProfile::Release),
            "benchmark" => Ok(CompileProfile::Benchmark),
            "memory_profiling" => Ok(CompileProfile::MemoryProfiling),
            "flamegraph" => Ok(CompileProfile::Flamegraph),
            other => Err(ConfigError::invalid(
                "profile",
                format!("unknown compile profile {}", other),
            )),
        }
    }
}

/// Arguments of a validator node process.
#[derive(Clone, Debug)]
pub struct NodeArgs<'a> {
    pub db_dir: &'a str,
    pub genesis_dir: &'a str,
    pub key_path: &'a str,
    pub name: &'a str,
    pub network_address: &'a str,
    pub relayer_address: &'a str,
    pub metrics_address: &'a str,
    pub jsonrpc_address: &'a str,
}

pub struct CommandBuilder;

impl CommandBuilder {
    /// Removes stores and json configs of a previous run.
    pub fn cleanup() -> String {
        format!("rm -rf .db-* ; rm -f .*.json ; mkdir -p {}", RESULTS_DIR)
    }

    pub fn clean_logs() -> String {
        format!("rm -rf {} ; mkdir -p {}", LOGS_DIR, LOGS_DIR)
    }

    pub fn compile(profile: CompileProfile) -> Vec<String> {
        ["cargo", "build"]
            .into_iter()
            .chain(profile.cargo_args())
            .map(str::to_string)
            .collect()
    }

    /// The compile command as a single shell string.
    pub fn compile_command(profile: CompileProfile) -> String {
        Self::compile(profile)
            .into_iter()
            .map(|arg| if arg.contains(' ') { format!("\"{}\"", arg) } else { arg })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Replaces the binary aliases of the working directory with links to
    /// the binaries of `origin`.
    pub fn alias_binaries(origin: &str) -> String {
        let origin = origin.trim_end_matches('/');
        let remove = BINARIES
            .iter()
            .map(|binary| format!("rm -f {}", binary))
            .collect::<Vec<_>>()
            .join(" ; ");
        let link = BINARIES
            .iter()
            .map(|binary| format!("ln -s {}/{} .", origin, binary))
            .collect::<Vec<_>>()
            .join(" ; ");
        format!("{} ; {}", remove, link)
    }

    pub fn generate_key(mode: DeploymentMode, key_path: &str) -> String {
        match mode {
            DeploymentMode::Narwhal => {
                format!("./{} generate_keys --filename {}", NARWHAL_BINARY, key_path)
            },
            DeploymentMode::Node => {
                format!("./{} generate-key --key-path {}", GENESIS_BINARY, key_path)
            },
        }
    }

    pub fn init_genesis(dir: &str) -> String {
        format!("./{} init --path {}", GENESIS_BINARY, dir)
    }

    /// Registers one validator, its stake, balance and addresses with the
    /// genesis builder. Worker addresses are comma separated, by worker id.
    pub fn add_validator_genesis(
        dir: &str,
        name: &str,
        authority: &AuthorityRecord,
        key_path: &str,
    ) -> String {
        let join = |select: fn(&WorkerAddresses) -> String| {
            authority
                .workers
                .values()
                .map(select)
                .collect::<Vec<_>>()
                .join(",")
        };
        format!(
            "./{} add-validator --path {} --name {} --balance {} --stake {} --key-path {} \
             --primary-to-primary {} --worker-to-primary {} --primary-to-worker {} \
             --worker-to-worker {} --consensus-address {}",
            GENESIS_BINARY,
            dir,
            name,
            authority.balance,
            authority.stake,
            key_path,
            authority.primary.primary_to_primary,
            authority.primary.worker_to_primary,
            join(|worker| worker.primary_to_worker.to_string()),
            join(|worker| worker.worker_to_worker.to_string()),
            join(|worker| worker.transactions.to_string()),
        )
    }

    pub fn add_controllers_genesis(dir: &str) -> String {
        format!("./{} add-controllers --path {}", GENESIS_BINARY, dir)
    }

    pub fn build_genesis(dir: &str) -> String {
        format!("./{} build --path {}", GENESIS_BINARY, dir)
    }

    pub fn verify_and_sign_genesis(dir: &str, key_path: &str) -> String {
        format!(
            "./{} verify-and-sign --path {} --key-path {}",
            GENESIS_BINARY, dir, key_path
        )
    }

    pub fn finalize_genesis(dir: &str) -> String {
        format!("./{} finalize --path {}", GENESIS_BINARY, dir)
    }

    pub fn run_primary(
        keys: &str,
        committee: &str,
        store: &str,
        parameters: &str,
        execution: &str,
        debug: bool,
    ) -> String {
        format!(
            "./{} {} run --keys {} --committee {} --store {} --parameters {} --execution {} \
             primary",
            NARWHAL_BINARY,
            verbosity(debug),
            keys,
            committee,
            store,
            parameters,
            execution
        )
    }

    pub fn run_worker(
        keys: &str,
        committee: &str,
        store: &str,
        parameters: &str,
        execution: &str,
        id: u32,
        debug: bool,
    ) -> String {
        format!(
            "./{} {} run --keys {} --committee {} --store {} --parameters {} --execution {} \
             worker --id {}",
            NARWHAL_BINARY,
            verbosity(debug),
            keys,
            committee,
            store,
            parameters,
            execution,
            id
        )
    }

    /// Load generator of a narwhal worker. `nodes` are the peers the client
    /// waits for before sending.
    pub fn run_client(
        address: &str,
        size: usize,
        rate: u64,
        execution: &str,
        nodes: &[String],
    ) -> String {
        format!(
            "./{} {} --size {} --rate {} --execution {}{}",
            CLIENT_BINARY,
            address,
            size,
            rate,
            execution,
            nodes_flag(nodes)
        )
    }

    pub fn run_node(args: &NodeArgs<'_>, debug: bool) -> String {
        format!(
            "./{} {} run --db-dir {} --genesis-dir {} --key-path {} --name {} \
             --network-address {} --relayer-address {} --metrics-address {} --jsonrpc-address {}",
            NODE_BINARY,
            verbosity(debug),
            args.db_dir,
            args.genesis_dir,
            args.key_path,
            args.name,
            args.network_address,
            args.relayer_address,
            args.metrics_address,
            args.jsonrpc_address
        )
    }

    pub fn run_node_client(
        address: &str,
        relayer: &str,
        key_path: &str,
        rate: u64,
        nodes: &[String],
    ) -> String {
        format!(
            "./{} {} --relayer {} --key-path {} --rate {}{}",
            NODE_CLIENT_BINARY,
            address,
            relayer,
            key_path,
            rate,
            nodes_flag(nodes)
        )
    }

    /// Load generator placing limit orders on the orderbook of a node.
    pub fn run_orderbook_client(
        address: &str,
        relayer: &str,
        key_path: &str,
        rate: u64,
        nodes: &[String],
    ) -> String {
        format!(
            "./{} {} --relayer {} --key-path {} --rate {}{}",
            ORDERBOOK_CLIENT_BINARY,
            address,
            relayer,
            key_path,
            rate,
            nodes_flag(nodes)
        )
    }

    /// Runs `command` under the flamegraph sampler, writing the graph to `output`.
    pub fn with_flamegraph(command: &str, output: &str) -> String {
        format!("flamegraph -o {} -- {}", output, command)
    }

    pub fn kill() -> String {
        "tmux kill-server".to_string()
    }

    /// Never fails, whether or not anything was running.
    pub fn kill_all(delete_logs: bool) -> String {
        let delete_logs = if delete_logs {
            Self::clean_logs()
        } else {
            "true".to_string()
        };
        format!("{} && ({} || true)", delete_logs, Self::kill())
    }

    /// Runs `command` in a detached session that outlives the connection,
    /// with stdout and stderr going to `log_file`.
    pub fn background(name: &str, command: &str, log_file: &str) -> String {
        format!(
            "tmux new -d -s \"{}\" \"{} > {} 2>&1\"",
            name, command, log_file
        )
    }

    pub fn in_dir(dir: &str, command: &str) -> String {
        format!("(cd {} && {})", dir, command)
    }

    /// Recreates a configuration directory empty, with its sub directories.
    pub fn reset_config_dir(dir: &str) -> String {
        format!(
            "rm -rf {dir} && mkdir -p {dir}/{} {dir}/{}",
            COMMITTEE_DIR,
            SIGNATURES_DIR,
            dir = dir
        )
    }

    pub fn chain<S: AsRef<str>>(commands: &[S]) -> String {
        commands
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(" && ")
    }

    /// System packages, toolchain and repository checkout of a fresh host.
    pub fn install(repo_url: &str, repo_name: &str) -> Vec<String> {
        vec![
            "sudo apt-get update".into(),
            "sudo apt-get -y upgrade".into(),
            "sudo apt-get -y autoremove".into(),
            // Linker and build tooling.
            "sudo apt-get -y install build-essential cmake clang pkg-config libssl-dev openssl tmux"
                .into(),
            "curl --proto \"=https\" --tlsv1.2 -sSf https://sh.rustup.rs | sh -s -- -y".into(),
            "source $HOME/.cargo/env".into(),
            "rustup default stable".into(),
            "mkdir -p ~/.ssh && ssh-keyscan -H github.com >> ~/.ssh/known_hosts".into(),
            format!(
                "(git clone {} {} || (cd {} ; git pull))",
                repo_url, repo_name, repo_name
            ),
        ]
    }

    /// Checks out `branch`, rebuilds and re-links the binary aliases.
    pub fn update(repo_name: &str, branch: &str, profile: CompileProfile) -> Vec<String> {
        let mut commands = vec![
            Self::in_dir(repo_name, "git fetch -f"),
            Self::in_dir(repo_name, &format!("git checkout -f {}", branch)),
            Self::in_dir(repo_name, "git pull -f"),
            "source $HOME/.cargo/env".into(),
            Self::in_dir(repo_name, &Self::compile_command(profile)),
            Self::alias_binaries(&format!("./{}/target/{}", repo_name, profile.target_dir())),
        ];
        if profile.records_flamegraph() {
            commands.push("cargo install flamegraph".into());
        }
        commands
    }
}

fn verbosity(debug: bool) -> &'static str {
    if debug { "-vvv" } else { "-vv" }
}

fn nodes_flag(nodes: &[String]) -> String {
    if nodes.is_empty() {
        String::new()
    } else {
        format!(" --nodes {}", nodes.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::committee::CommitteeBuilder;

    #[test]
    fn test_compile() {
        assert_eq!(CommandBuilder::compile(CompileProfile::Release), vec![
            "cargo", "build", "--release"
        ]);
        assert_eq!(
            CommandBuilder::compile_command(CompileProfile::MemoryProfiling),
            "cargo build --profile bench-profiling --features \"benchmark dhat-heap\""
        );
        assert_eq!("benchmark".parse::<CompileProfile>().unwrap(), CompileProfile::Benchmark);
    }

    #[test]
    fn test_narwhal_commands() {
        assert_eq!(
            CommandBuilder::run_primary(
                ".node-0.json",
                ".committee.json",
                ".db-0",
                ".parameters.json",
                "advanced",
                false
            ),
            "./narwhal-node -vv run --keys .node-0.json --committee .committee.json --store .db-0 \
             --parameters .parameters.json --execution advanced primary"
        );
        assert!(
            CommandBuilder::run_worker("k", "c", "s", "p", "advanced", 2, true).ends_with(
                "-vvv run --keys k --committee c --store s --parameters p --execution advanced \
                 worker --id 2"
            )
        );
        assert_eq!(
            CommandBuilder::run_client("http://10.0.0.1:3011", 512, 2500, "advanced", &[
                "http://10.0.0.2:3011".into(),
                "http://10.0.0.3:3011".into()
            ]),
            "./benchmark-client http://10.0.0.1:3011 --size 512 --rate 2500 --execution advanced \
             --nodes http://10.0.0.2:3011 http://10.0.0.3:3011"
        );
        assert_eq!(
            CommandBuilder::run_client("a", 1, 0, "advanced", &[]),
            "./benchmark-client a --size 1 --rate 0 --execution advanced"
        );
    }

    #[test]
    fn test_node_commands() {
        let args = NodeArgs {
            db_dir: ".db-0",
            genesis_dir: ".proto",
            key_path: ".proto/validator-0.key",
            name: "validator-0",
            network_address: "/dns/0.0.0.0/tcp/3003/http",
            relayer_address: "/dns/0.0.0.0/tcp/3004/http",
            metrics_address: "/dns/0.0.0.0/tcp/3006/http",
            jsonrpc_address: "/dns/0.0.0.0/tcp/3005/http",
        };
        let command = CommandBuilder::run_node(&args, false);
        assert!(
            command.starts_with("./validator-node -vv run --db-dir .db-0 --genesis-dir .proto")
        );
        assert!(
            command.contains("--name validator-0 --network-address /dns/0.0.0.0/tcp/3003/http")
        );
        assert_eq!(
            CommandBuilder::run_node_client(
                "http://h:3003",
                "http://h:3004",
                "k",
                10,
                &["http://g:3003".into()]
            ),
            "./benchmark-node-client http://h:3003 --relayer http://h:3004 --key-path k --rate 10 \
             --nodes http://g:3003"
        );
    }

    #[test]
    fn test_genesis_commands() {
        let committee = CommitteeBuilder::new(3000, 2, DeploymentMode::Node)
            .build_local(&["validator-0".to_string()])
            .unwrap();
        let authority = committee.authority("validator-0").unwrap();
        let command = CommandBuilder::add_validator_genesis(
            ".proto",
            "validator-0",
            authority,
            ".proto/validator-0.key",
        );
        assert!(command.starts_with(
            "./validator-genesis add-validator --path .proto --name validator-0 \
             --balance 5000000000000 --stake 1"
        ));
        assert!(command.contains(
            "--consensus-address /dns/127.0.0.1/tcp/3011/http,/dns/127.0.0.1/tcp/3014/http"
        ));
        assert_eq!(
            CommandBuilder::verify_and_sign_genesis(".proto", "k"),
            "./validator-genesis verify-and-sign --path .proto --key-path k"
        );
    }

    #[test]
    fn test_process_control() {
        assert_eq!(
            CommandBuilder::background("primary-0", "./narwhal-node run", "logs/primary-0.log"),
            "tmux new -d -s \"primary-0\" \"./narwhal-node run > logs/primary-0.log 2>&1\""
        );
        assert_eq!(CommandBuilder::kill_all(false), "true && (tmux kill-server || true)");
        assert!(CommandBuilder::kill_all(true).starts_with("rm -rf logs ; mkdir -p logs &&"));
        assert_eq!(
            CommandBuilder::reset_config_dir("repo/.proto"),
            "rm -rf repo/.proto && mkdir -p repo/.proto/committee repo/.proto/signatures"
        );
        assert_eq!(CommandBuilder::chain(&["a", "b"]), "a && b");
    }

    #[test]
    fn test_update_and_alias() {
        let alias = CommandBuilder::alias_binaries("./repo/target/release/");
        assert!(alias.contains("rm -f validator-node"));
        assert!(alias.contains("ln -s ./repo/target/release/benchmark-client ."));

        let update = CommandBuilder::update("repo", "main", CompileProfile::Release);
        assert_eq!(update[1], "(cd repo && git checkout -f main)");
        assert_eq!(update[4], "(cd repo && cargo build --release)");
        let install = CommandBuilder::install("url", "repo");
        assert!(install.last().unwrap().contains("git clone url repo"));
    }

    #[test]
    fn test_flamegraph_profile() {
        let profile: CompileProfile = "flamegraph".parse().unwrap();
        assert!(profile.records_flamegraph());
        assert!(!CompileProfile::MemoryProfiling.records_flamegraph());
        assert_eq!(
            CommandBuilder::compile_command(profile),
            "cargo build --profile bench-profiling --features benchmark"
        );
        assert_eq!(profile.target_dir(), "bench-profiling");
        assert_eq!(
            CommandBuilder::with_flamegraph("./validator-node -vv run", "results/primary-0.svg"),
            "flamegraph -o results/primary-0.svg -- ./validator-node -vv run"
        );

        let update = CommandBuilder::update("repo", "main", profile);
        assert_eq!(update.last().unwrap(), "cargo install flamegraph");
        assert!(update[5].contains("./repo/target/bench-profiling/validator-node"));
        let update = CommandBuilder::update("repo", "main", CompileProfile::Release);
        assert!(update.iter().all(|command| !command.contains("flamegraph")));
    }

    #[test]
    fn test_orderbook_client_command() {
        assert_eq!(
            CommandBuilder::run_orderbook_client(
                "http://h:3003",
                "http://h:3004",
                "k",
                10,
                &["http://g:3003".into()]
            ),
            "./benchmark-orderbook-client http://h:3003 --relayer http://h:3004 --key-path k \
             --rate 10 --nodes http://g:3003"
        );
        assert!(BINARIES.contains(&ORDERBOOK_CLIENT_BINARY));
    }
}

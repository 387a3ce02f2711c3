// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use testbed::{
    BenchParameters, CommitteeBuilder, DeploymentMode, HostPool, NodeParameters, Placement,
    RemoteBench, Settings, Transport,
    config::ReadinessSettings,
    executor::{CommandOutput, TransportError},
    topology,
};

/// Records remote traffic and answers every command successfully. Key
/// generation and log downloads produce the files the orchestrator reads back.
#[derive(Default)]
struct RecordingTransport {
    root: Option<PathBuf>,
    commands: Mutex<Vec<(String, String)>>,
    uploads: Mutex<Vec<(String, PathBuf)>>,
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn execute(&self, host: &str, command: &str) -> Result<CommandOutput, TransportError> {
        self.commands
            .lock()
            .unwrap()
            .push((host.to_string(), command.to_string()));
        if let (Some(root), true) = (&self.root, command.contains("generate_keys")) {
            let path = command.split_whitespace().last().unwrap();
            let name = Path::new(path).file_stem().unwrap().to_string_lossy();
            fs::create_dir_all(root.join(path).parent().unwrap()).unwrap();
            fs::write(root.join(path), format!(r#"{{ "name": "{}" }}"#, name)).unwrap();
        }
        Ok(CommandOutput {
            status: Some(0),
            ..Default::default()
        })
    }

    async fn upload(
        &self,
        host: &str,
        local: &Path,
        _remote_dir: &str,
    ) -> Result<(), TransportError> {
        self.uploads
            .lock()
            .unwrap()
            .push((host.to_string(), local.to_path_buf()));
        Ok(())
    }

    async fn download(
        &self,
        _host: &str,
        _remote: &str,
        local: &Path,
    ) -> Result<(), TransportError> {
        fs::create_dir_all(local.parent().unwrap()).unwrap();
        fs::write(local, "INFO committed\n").unwrap();
        Ok(())
    }
}

fn pool() -> HostPool {
    HostPool::new([
        ("region-a", ["a0", "a1", "a2"]),
        ("region-b", ["b0", "b1", "b2"]),
    ])
}

fn names(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("validator-{}", i)).collect()
}

#[test]
fn test_plan_build_and_reduce() {
    let parameters = BenchParameters {
        nodes: vec![4],
        workers: 1,
        collocate: true,
        ..Default::default()
    };
    let placement = topology::plan(&pool(), &parameters.shape()).unwrap();
    assert_eq!(
        placement,
        Placement::Collocated(vec!["a0".into(), "b0".into(), "a1".into(), "b1".into()])
    );

    let committee = CommitteeBuilder::new(8000, 1, DeploymentMode::Narwhal)
        .build(&names(4), &placement)
        .unwrap();
    assert_eq!(committee.size(), 4);
    let mut seen = HashSet::new();
    for authority in committee.authorities.values() {
        for address in authority.addresses() {
            assert!(seen.insert((address.host().to_string(), address.port())));
        }
    }

    let reduced = committee.remove_nodes(1);
    assert_eq!(reduced.size(), 3);
    assert_eq!(committee.size(), 4);
    assert_eq!(reduced.all_ips(), vec!["a0", "b0", "a1"]);
}

#[tokio::test(start_paused = true)]
async fn test_remote_sweep_over_reduced_committees() {
    let dir = tempfile::tempdir().unwrap();
    let remote = Arc::new(RecordingTransport::default());
    let local = Arc::new(RecordingTransport {
        root: Some(dir.path().to_path_buf()),
        ..Default::default()
    });
    // Addresses rather than names keep readiness checks off the resolver.
    let settings = Settings {
        inventory: HostPool::new([
            ("region-a", ["192.0.2.10", "192.0.2.11", "192.0.2.12"]),
            ("region-b", ["198.51.100.10", "198.51.100.11", "198.51.100.12"]),
        ]),
        readiness: ReadinessSettings {
            timeout_secs: 0,
            poll_interval_ms: 10,
        },
        ..Default::default()
    };
    let bench =
        RemoteBench::with_transports(settings, remote.clone(), local, dir.path().to_path_buf());

    let parameters = BenchParameters {
        faults: 0,
        nodes: vec![4, 3],
        workers: 1,
        collocate: true,
        rate: vec![9_000],
        duration_secs: 60,
        runs: 1,
        mode: DeploymentMode::Narwhal,
        ..Default::default()
    };
    let report = bench.run(&parameters, &NodeParameters::default()).await.unwrap();
    assert_eq!(report.succeeded(), 2);
    assert!(dir.path().join("results/bench-0-4-1-true-9000-512.txt").exists());
    assert!(dir.path().join("results/bench-0-3-1-true-9000-512.txt").exists());

    let commands = remote.commands.lock().unwrap().clone();
    let clients: Vec<&String> = commands
        .iter()
        .map(|(_, command)| command)
        .filter(|command| command.contains("./benchmark-client"))
        .collect();
    // One client per worker: 4 in the first run, 3 in the second.
    assert_eq!(clients.len(), 7);
    assert!(clients[..4].iter().all(|c| c.contains("--rate 2250")));
    assert!(clients[4..].iter().all(|c| c.contains("--rate 3000")));
    // Peers of the reduced committee never include the removed authority.
    assert!(clients[4..].iter().all(|c| !c.contains("198.51.100.11")));

    // Every authority got its key and the shared committee and parameters.
    let uploads = remote.uploads.lock().unwrap().clone();
    assert_eq!(uploads.len(), 12);
    assert!(uploads.iter().any(|(host, path)| {
        host == "198.51.100.11" && path.ends_with(".proto/validator-3.key")
    }));
}

// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{BenchError, committee::Committee, config::DeploymentMode, paths::PathMaker};
use std::{
    fmt,
    fs,
    path::{Path, PathBuf},
};

const PANIC_MARKER: &str = "panicked";
const ERROR_MARKER: &str = "ERROR";
const WARN_MARKER: &str = "WARN";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogRole {
    Primary,
    Worker,
    Client,
}

impl fmt::Display for LogRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogRole::Primary => write!(f, "primary"),
            LogRole::Worker => write!(f, "worker"),
            LogRole::Client => write!(f, "client"),
        }
    }
}

/// A log file written on `host` by one process of the run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogFile {
    pub role: LogRole,
    pub authority: usize,
    pub worker: Option<usize>,
    pub host: String,
    pub path: String,
}

/// The complete set of log files a run produces.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LogSet {
    files: Vec<LogFile>,
}

impl LogSet {
    /// The logs written by the authorities of `active`. Node processes log to
    /// the primary file; clients run next to the process they load.
    pub fn expected(active: &Committee, mode: DeploymentMode) -> Self {
        let mut files = vec![];
        for (index, authority) in active.authorities.values().enumerate() {
            let primary_host = authority.primary_host().to_string();
            files.push(LogFile {
                role: LogRole::Primary,
                authority: index,
                worker: None,
                host: primary_host.clone(),
                path: PathMaker::primary_log_file(index),
            });
            match mode {
                DeploymentMode::Narwhal => {
                    for (id, worker) in &authority.workers {
                        let id = *id as usize;
                        let host = worker.transactions.host().to_string();
                        files.push(LogFile {
                            role: LogRole::Worker,
                            authority: index,
                            worker: Some(id),
                            host: host.clone(),
                            path: PathMaker::worker_log_file(index, id),
                        });
                        files.push(LogFile {
                            role: LogRole::Client,
                            authority: index,
                            worker: Some(id),
                            host,
                            path: PathMaker::client_log_file(index, id),
                        });
                    }
                },
                DeploymentMode::Node => files.push(LogFile {
                    role: LogRole::Client,
                    authority: index,
                    worker: Some(0),
                    host: primary_host,
                    path: PathMaker::client_log_file(index, 0),
                }),
            }
        }
        Self { files }
    }

    pub fn files(&self) -> &[LogFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogSummary {
    pub path: String,
    pub bytes: u64,
    pub errors: usize,
    pub warnings: usize,
}

/// Outcome of aggregating the logs of one run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogReport {
    pub faults: usize,
    pub committee_size: usize,
    pub files: Vec<LogSummary>,
}

impl fmt::Display for LogReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "-".repeat(41);
        writeln!(f, "{}\n SUMMARY:\n{}", rule, rule)?;
        writeln!(f, " + CONFIG:")?;
        writeln!(f, " Faults: {} node(s)", self.faults)?;
        writeln!(f, " Committee size: {} node(s)", self.committee_size)?;
        writeln!(f, " Log files: {}", self.files.len())?;
        writeln!(f, "\n + FILES:")?;
        for file in &self.files {
            writeln!(
                f,
                " {}: {} B, {} errors, {} warnings",
                file.path, file.bytes, file.errors, file.warnings
            )?;
        }
        writeln!(f, "{}", rule)
    }
}

impl LogReport {
    pub fn result(&self) -> String {
        self.to_string()
    }

    /// Writes the result, prefixed by `header`, creating parent directories.
    pub fn write(&self, path: &Path, header: &str) -> Result<(), BenchError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|error| BenchError::io(parent, error))?;
        }
        fs::write(path, format!("{}{}", header, self.result()))
            .map_err(|error| BenchError::io(path, error))
    }
}

/// Turns the harvested logs of a run into a report. Only invoked once every
/// expected file has been retrieved.
pub trait LogAggregator: Send + Sync {
    fn aggregate(
        &self,
        root: &Path,
        expected: &LogSet,
        faults: usize,
    ) -> Result<LogReport, BenchError>;
}

/// Checks the run's logs are complete and that no process crashed, and
/// counts error and warning lines.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogInventory;

impl LogAggregator for LogInventory {
    fn aggregate(
        &self,
        root: &Path,
        expected: &LogSet,
        faults: usize,
    ) -> Result<LogReport, BenchError> {
        let mut files = vec![];
        for file in expected.files() {
            let path: PathBuf = root.join(&file.path);
            if !path.exists() {
                return Err(BenchError::Parse(format!("missing log file {}", file.path)));
            }
            let contents = fs::read_to_string(&path).map_err(|error| BenchError::io(&path, error))?;
            if contents.contains(PANIC_MARKER) {
                return Err(BenchError::Parse(match file.worker {
                    Some(worker) if file.role != LogRole::Primary => format!(
                        "{} {}-{} panicked",
                        file.role, file.authority, worker
                    ),
                    _ => format!("{} {} panicked", file.role, file.authority),
                }));
            }
            files.push(LogSummary {
                path: file.path.clone(),
                bytes: contents.len() as u64,
                errors: contents.lines().filter(|line| line.contains(ERROR_MARKER)).count(),
                warnings: contents.lines().filter(|line| line.contains(WARN_MARKER)).count(),
            });
        }
        let authorities = expected
            .files()
            .iter()
            .filter(|file| file.role == LogRole::Primary)
            .count();
        Ok(LogReport {
            faults,
            committee_size: authorities + faults,
            files,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::committee::CommitteeBuilder;

    fn committee(mode: DeploymentMode, workers: usize) -> Committee {
        let names: Vec<String> = (0..3).map(|i| format!("validator-{}", i)).collect();
        CommitteeBuilder::new(3000, workers, mode)
            .build_local(&names)
            .unwrap()
    }

    fn write_logs(root: &Path, set: &LogSet) {
        fs::create_dir_all(root.join("logs")).unwrap();
        for file in set.files() {
            fs::write(root.join(&file.path), "INFO started\nWARN slow peer\n").unwrap();
        }
    }

    #[test]
    fn test_expected_logs() {
        let narwhal =
            LogSet::expected(&committee(DeploymentMode::Narwhal, 2), DeploymentMode::Narwhal);
        // A primary plus a worker and a client per worker, for 3 authorities.
        assert_eq!(narwhal.len(), 15);
        assert!(narwhal.files().iter().any(|file| file.path == "logs/worker-2-1.log"));

        let node = LogSet::expected(&committee(DeploymentMode::Node, 1), DeploymentMode::Node);
        assert_eq!(node.len(), 6);
        assert!(node.files().iter().all(|file| file.host == "127.0.0.1"));
    }

    #[test]
    fn test_inventory_summarizes_logs() {
        let dir = tempfile::tempdir().unwrap();
        let active = committee(DeploymentMode::Node, 1).active(1);
        let set = LogSet::expected(&active, DeploymentMode::Node);
        write_logs(dir.path(), &set);

        let report = LogInventory.aggregate(dir.path(), &set, 1).unwrap();
        assert_eq!(report.committee_size, 3);
        assert_eq!(report.files.len(), 4);
        assert_eq!(report.files[0].warnings, 1);
        assert!(report.result().contains(" Faults: 1 node(s)"));

        let result_file = dir.path().join("results/bench.txt");
        report.write(&result_file, "header\n").unwrap();
        assert!(fs::read_to_string(result_file).unwrap().starts_with("header\n---"));
    }

    #[test]
    fn test_report_rendering() {
        let report = LogReport {
            faults: 0,
            committee_size: 1,
            files: vec![LogSummary {
                path: "logs/primary-0.log".into(),
                bytes: 12,
                errors: 0,
                warnings: 2,
            }],
        };
        let rule = "-".repeat(41);
        let expected = [
            rule.as_str(),
            " SUMMARY:",
            rule.as_str(),
            " + CONFIG:",
            " Faults: 0 node(s)",
            " Committee size: 1 node(s)",
            " Log files: 1",
            "",
            " + FILES:",
            " logs/primary-0.log: 12 B, 0 errors, 2 warnings",
            rule.as_str(),
            "",
        ]
        .join("\n");
        assert_eq!(report.result(), expected);
    }

    #[test]
    fn test_inventory_detects_crashes_and_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let set = LogSet::expected(&committee(DeploymentMode::Narwhal, 1), DeploymentMode::Narwhal);
        write_logs(dir.path(), &set);
        fs::write(
            dir.path().join("logs/client-1-0.log"),
            "thread 'main' panicked at 'boom'",
        )
        .unwrap();
        assert!(matches!(
            LogInventory.aggregate(dir.path(), &set, 0),
            Err(BenchError::Parse(message)) if message == "client 1-0 panicked"
        ));

        fs::remove_file(dir.path().join("logs/primary-0.log")).unwrap();
        assert!(matches!(
            LogInventory.aggregate(dir.path(), &set, 0),
            Err(BenchError::Parse(message)) if message.contains("missing")
        ));
    }
}
